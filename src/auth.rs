use crate::domain::Account;
use jsonwebtoken::{
    decode, encode, errors::Error as JwtError, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub secret: SecretString,
}

/// Issues and verifies stateless bearer tokens binding a token to an account. Tokens are HS256
/// signed JWTs using a single shared secret and carry no expiry, i.e. they stay valid as long as
/// the secret does.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    pub fn new(config: &Config) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue_token(&self, account: &Account) -> Result<String, IssueTokenError> {
        let claims = Claims {
            account_id: account.id,
            account_number: account.number,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, InvalidTokenError> {
        let token = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token.claims)
    }
}

/// Claims embedded into a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(rename = "id")]
    pub account_id: i64,
    pub account_number: i64,
}

#[derive(Debug, Error)]
#[error("cannot issue token")]
pub struct IssueTokenError(#[from] JwtError);

#[derive(Debug, Error)]
#[error("invalid token")]
pub struct InvalidTokenError(#[from] JwtError);
