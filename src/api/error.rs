use crate::{auth::IssueTokenError, domain::AccountRepositoryError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use error_ext::StdErrorExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Errors of the API handlers and the authorization gate. Authorization failures of any kind are
/// reported as the same [ApiError::PermissionDenied]; everything else is an internal error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot decode request body")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] AccountRepositoryError),

    #[error(transparent)]
    IssueToken(#[from] IssueTokenError),

    #[error("permission denied")]
    PermissionDenied,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::PermissionDenied => (StatusCode::FORBIDDEN, self.to_string()),

            ApiError::Decode(_) | ApiError::Repository(_) | ApiError::IssueToken(_) => {
                let error = self.as_chain();
                error!(error, "cannot handle request");
                (StatusCode::INTERNAL_SERVER_ERROR, error)
            }
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Uniform body of error responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
