use crate::{
    api::{
        authorization::authorize,
        error::{ApiError, ErrorResponse},
        AppState,
    },
    domain::{Account, AccountRepository, NewAccount},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    paths(create_account, get_accounts, get_account_by_id, delete_account, transfer),
    components(schemas(
        Account,
        CreateAccountRequest,
        CreateAccountResponse,
        DeleteAccountResponse,
        TransferRequest,
        ErrorResponse
    ))
)]
pub struct ApiDoc;

pub fn app<R>(app_state: AppState<R>) -> Router<AppState<R>>
where
    R: AccountRepository,
{
    let gated = Router::new()
        .route("/account/:id", get(get_account_by_id::<R>).delete(delete_account::<R>))
        .route_layer(middleware::from_fn_with_state(app_state, authorize::<R>));

    Router::new()
        .route("/account", post(create_account::<R>).get(get_accounts::<R>))
        .route("/transfer", post(transfer))
        .merge(gated)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteAccountResponse {
    pub deleted: i64,
}

/// Transfer between accounts; only validated and echoed, balances are not touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub to_account: i64,
    pub amount: i64,
}

/// Create an account and respond with a token for it. Bodies are decoded as JSON regardless of
/// their content type.
#[utoipa::path(
    post,
    path = "/account",
    request_body = CreateAccountRequest,
    responses(
        (status = 200, description = "Account created", body = CreateAccountResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
#[instrument(skip(app_state, body))]
async fn create_account<R>(
    State(app_state): State<AppState<R>>,
    body: Bytes,
) -> Result<Json<CreateAccountResponse>, ApiError>
where
    R: AccountRepository,
{
    let CreateAccountRequest {
        first_name,
        last_name,
    } = serde_json::from_slice(&body)?;

    let account = NewAccount::new(first_name, last_name);
    let id = app_state.account_repository.create_account(&account).await?;
    let account = account.with_id(id);

    let token = app_state.token_authority.issue_token(&account)?;

    info!(id, number = account.number, "account created");
    Ok(Json(CreateAccountResponse { token }))
}

/// List all accounts.
#[utoipa::path(
    get,
    path = "/account",
    responses(
        (status = 200, description = "All accounts", body = [Account]),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
#[instrument(skip(app_state))]
async fn get_accounts<R>(
    State(app_state): State<AppState<R>>,
) -> Result<Json<Vec<Account>>, ApiError>
where
    R: AccountRepository,
{
    let accounts = app_state
        .account_repository
        .accounts()
        .await?
        .try_collect::<Vec<_>>()
        .await?;

    Ok(Json(accounts))
}

#[utoipa::path(
    get,
    path = "/account/{id}",
    params(
        ("id" = i64, Path, description = "Account ID"),
        ("x-jwt-token" = String, Header, description = "Token issued for the account")
    ),
    responses(
        (status = 200, description = "The account", body = Account),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 500, description = "Unknown account or internal error", body = ErrorResponse)
    )
)]
#[instrument(skip(app_state))]
async fn get_account_by_id<R>(
    State(app_state): State<AppState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<Account>, ApiError>
where
    R: AccountRepository,
{
    let account = app_state.account_repository.account_by_id(id).await?;
    Ok(Json(account))
}

#[utoipa::path(
    delete,
    path = "/account/{id}",
    params(
        ("id" = i64, Path, description = "Account ID"),
        ("x-jwt-token" = String, Header, description = "Token issued for the account")
    ),
    responses(
        (status = 200, description = "Account deleted", body = DeleteAccountResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
#[instrument(skip(app_state))]
async fn delete_account<R>(
    State(app_state): State<AppState<R>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteAccountResponse>, ApiError>
where
    R: AccountRepository,
{
    app_state.account_repository.delete_account(id).await?;

    info!(id, "account deleted");
    Ok(Json(DeleteAccountResponse { deleted: id }))
}

/// Echo the given transfer.
#[utoipa::path(
    post,
    path = "/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "The transfer as given", body = TransferRequest),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
#[instrument(skip(body))]
async fn transfer(body: Bytes) -> Result<Json<TransferRequest>, ApiError> {
    let transfer = serde_json::from_slice::<TransferRequest>(&body)?;
    Ok(Json(transfer))
}
