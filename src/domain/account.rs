use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Upper bound (exclusive) for generated account numbers.
const MAX_ACCOUNT_NUMBER: i64 = 1_000_000;

/// An account as persisted by an [AccountRepository](super::AccountRepository), carrying its
/// store-assigned ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub number: i64,
    pub balance: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An account which has not yet been persisted and hence has no ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub number: i64,
    pub balance: i64,
    pub created_at: OffsetDateTime,
}

impl NewAccount {
    /// Create a new account with a random account number, a zero balance and the current time
    /// as creation timestamp. Account numbers are not guaranteed to be unique.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            number: rand::rng().random_range(0..MAX_ACCOUNT_NUMBER),
            balance: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Turn this new account into an [Account] with the given store-assigned ID.
    pub fn with_id(self, id: i64) -> Account {
        let NewAccount {
            first_name,
            last_name,
            number,
            balance,
            created_at,
        } = self;

        Account {
            id,
            first_name,
            last_name,
            number,
            balance,
            created_at,
        }
    }
}
