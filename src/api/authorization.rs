use crate::{
    api::{error::ApiError, AppState},
    domain::AccountRepository,
};
use axum::{
    extract::{rejection::PathRejection, Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use error_ext::StdErrorExt;
use tracing::{debug, warn};

/// Request header carrying the raw signed token.
pub const TOKEN_HEADER: &str = "x-jwt-token";

/// Gate for routes with an account ID path parameter: only requests carrying a valid token for
/// that very account are passed on. Denials never tell which check failed.
pub async fn authorize<R>(
    State(app_state): State<AppState<R>>,
    headers: HeaderMap,
    id: Result<Path<String>, PathRejection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: AccountRepository,
{
    let Some(token) = headers.get(TOKEN_HEADER) else {
        warn!("missing token");
        return Err(ApiError::PermissionDenied);
    };

    let token = token.to_str().map_err(|error| {
        warn!(%error, "token header value is not ASCII");
        ApiError::PermissionDenied
    })?;

    let claims = app_state
        .token_authority
        .verify_token(token)
        .map_err(|error| {
            warn!(error = error.as_chain(), "invalid token");
            ApiError::PermissionDenied
        })?;

    let Path(id) = id.map_err(|error| {
        warn!(%error, "missing account ID");
        ApiError::PermissionDenied
    })?;

    let id = id.parse::<i64>().map_err(|error| {
        warn!(%error, %id, "invalid account ID");
        ApiError::PermissionDenied
    })?;

    if claims.account_id != id {
        warn!(
            token_account_id = claims.account_id,
            id, "token issued for another account"
        );
        return Err(ApiError::PermissionDenied);
    }

    debug!(id, "authorized");
    Ok(next.run(request).await)
}
