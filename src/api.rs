mod account;
mod authorization;
mod error;

use crate::{auth::TokenAuthority, domain::AccountRepository};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    routing::get,
    Router,
};
use opentelemetry::{global, propagation::Extractor, trace::TraceContextExt};
use serde::Deserialize;
use std::{net::IpAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{field, info, info_span, warn, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    addr: IpAddr,
    port: u16,
}

/// Serve the API on the configured address until SIGTERM or Ctrl-C is received.
pub async fn serve<R>(
    config: Config,
    account_repository: R,
    token_authority: TokenAuthority,
) -> Result<()>
where
    R: AccountRepository,
{
    let Config { addr, port } = config;

    let app_state = AppState::new(account_repository, token_authority);

    let app = app(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(CorsLayer::permissive())
            .map_request(accept_trace)
            .map_request(record_trace_id),
    );

    let listener = TcpListener::bind((addr, port))
        .await
        .context("bind TcpListener")?;
    info!(%addr, port, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run server")
}

/// Dependencies shared by all handlers.
#[derive(Clone)]
pub struct AppState<R> {
    account_repository: R,
    token_authority: Arc<TokenAuthority>,
}

impl<R> AppState<R> {
    pub fn new(account_repository: R, token_authority: TokenAuthority) -> Self {
        Self {
            account_repository,
            token_authority: Arc::new(token_authority),
        }
    }
}

/// The complete application router with the given state applied.
pub fn app<R>(app_state: AppState<R>) -> Router
where
    R: AccountRepository,
{
    Router::new()
        .route("/", get(ready))
        .merge(account::app(app_state.clone()))
        .merge(SwaggerUi::new("/api-doc").url("/openapi.json", account::ApiDoc::openapi()))
        .with_state(app_state)
}

async fn ready() -> StatusCode {
    StatusCode::OK
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for Ctrl-C");
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                warn!(%error, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Tokens must not end up in logs, hence the headers are not recorded.
fn make_span(request: &Request<Body>) -> Span {
    let method = request.method().as_str();
    let path = request.uri().path();
    info_span!("incoming request", method, path, trace_id = field::Empty)
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| {
            let s = v.to_str();
            if let Err(ref error) = s {
                warn!(%error, key, "cannot convert header value to ASCII")
            };
            s.ok()
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

fn accept_trace(request: Request<Body>) -> Request<Body> {
    // Current context, if no or invalid data is received.
    let parent_context = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    Span::current().set_parent(parent_context);

    request
}

fn record_trace_id(request: Request<Body>) -> Request<Body> {
    let span = Span::current();

    let trace_id = span.context().span().span_context().trace_id();
    span.record("trace_id", trace_id.to_string());

    request
}

#[cfg(test)]
mod tests {
    use crate::{
        api::{app, authorization::TOKEN_HEADER, AppState},
        auth::{self, TokenAuthority},
        domain::{AccountRepository, NewAccount},
        infra::SqliteAccountRepository,
        util::in_memory_pool,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        response::Response,
        Router,
    };
    use error_ext::BoxError;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tracing_test::traced_test;

    const SECRET: &str = "shh";

    fn token_authority(secret: &str) -> TokenAuthority {
        TokenAuthority::new(&auth::Config {
            secret: SecretString::new(secret.to_string()),
        })
    }

    async fn test_app() -> Result<(Router, SqliteAccountRepository), BoxError> {
        let account_repository = SqliteAccountRepository::new(in_memory_pool().await?);
        account_repository.init().await?;
        let app = app(AppState::new(
            account_repository.clone(),
            token_authority(SECRET),
        ));
        Ok((app, account_repository))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Response, BoxError> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => request.body(Body::empty())?,
        };

        let response = app.clone().oneshot(request).await?;
        Ok(response)
    }

    async fn json_body(response: Response) -> Result<Value, BoxError> {
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let json = serde_json::from_slice(&body)?;
        Ok(json)
    }

    async fn create_account(
        app: &Router,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, BoxError> {
        let response = send(
            app,
            Method::POST,
            "/account",
            None,
            Some(json!({ "firstName": first_name, "lastName": last_name })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await?;
        let token = json["token"]
            .as_str()
            .ok_or("token missing in response")?
            .to_string();
        Ok(token)
    }

    #[tokio::test]
    async fn test_ready() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let response = send(&app, Method::GET, "/", None, None).await?;
        assert_eq!(response.status(), StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn test_get_accounts_empty() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let response = send(&app, Method::GET, "/account", None, None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, json!([]));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_get_account() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let token = create_account(&app, "A", "B").await?;
        let claims = token_authority(SECRET).verify_token(&token)?;

        let response = send(&app, Method::GET, "/account", None, None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let accounts = json_body(response).await?;
        let accounts = accounts.as_array().ok_or("expected array")?;
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0]["id"], json!(claims.account_id));
        assert_eq!(accounts[0]["number"], json!(claims.account_number));

        let uri = format!("/account/{}", claims.account_id);
        let response = send(&app, Method::GET, &uri, Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let account = json_body(response).await?;
        assert_eq!(account, accounts[0]);
        assert_eq!(account["firstName"], "A");
        assert_eq!(account["lastName"], "B");
        assert_eq!(account["balance"], 0);
        assert!(account["createdAt"].is_string());

        Ok(())
    }

    #[tokio::test]
    async fn test_create_account_invalid_body() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let response = send(
            &app,
            Method::POST,
            "/account",
            None,
            Some(json!({ "firstName": "A" })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error = json_body(response).await?;
        let error = error["error"].as_str().ok_or("error missing in response")?;
        assert!(error.starts_with("cannot decode request body"));

        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_token_for_other_account() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let token_1 = create_account(&app, "Jane", "Doe").await?;
        let token_2 = create_account(&app, "John", "Doe").await?;
        let id_2 = token_authority(SECRET).verify_token(&token_2)?.account_id;

        let uri = format!("/account/{id_2}");
        for method in [Method::GET, Method::DELETE] {
            let response = send(&app, method, &uri, Some(&token_1), None).await?;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(
                json_body(response).await?,
                json!({ "error": "permission denied" })
            );
        }
        assert!(logs_contain("token issued for another account"));

        let response = send(&app, Method::GET, &uri, Some(&token_2), None).await?;
        assert_eq!(response.status(), StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_token() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let token = create_account(&app, "Jane", "Doe").await?;
        let id = token_authority(SECRET).verify_token(&token)?.account_id;

        let uri = format!("/account/{id}");
        let response = send(&app, Method::GET, &uri, None, None).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await?,
            json!({ "error": "permission denied" })
        );

        let response = send(&app, Method::GET, &uri, Some(""), None).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_secret() -> Result<(), BoxError> {
        let (app, account_repository) = test_app().await?;

        let id = account_repository
            .create_account(&NewAccount::new("Jane", "Doe"))
            .await?;
        let account = account_repository.account_by_id(id).await?;
        let token = token_authority("not-shh").issue_token(&account)?;

        let uri = format!("/account/{id}");
        let response = send(&app, Method::GET, &uri, Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::DELETE, &uri, Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(account_repository.account_by_id(id).await.is_ok());

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_id() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let token = create_account(&app, "Jane", "Doe").await?;

        let response = send(&app, Method::GET, "/account/one", Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await?,
            json!({ "error": "permission denied" })
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_account() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let token = create_account(&app, "Jane", "Doe").await?;
        let id = token_authority(SECRET).verify_token(&token)?.account_id;
        let uri = format!("/account/{id}");

        let response = send(&app, Method::DELETE, &uri, Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, json!({ "deleted": id }));

        // Deleting again is fine.
        let response = send(&app, Method::DELETE, &uri, Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, &uri, Some(&token), None).await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await?,
            json!({ "error": format!("account {id} not found") })
        );

        let response = send(&app, Method::GET, "/account", None, None).await?;
        assert_eq!(json_body(response).await?, json!([]));

        Ok(())
    }

    #[tokio::test]
    async fn test_transfer() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        create_account(&app, "Jane", "Doe").await?;
        let response = send(&app, Method::GET, "/account", None, None).await?;
        let accounts_before = json_body(response).await?;

        let transfer = json!({ "toAccount": 5, "amount": 100 });
        let response =
            send(&app, Method::POST, "/transfer", None, Some(transfer.clone())).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, transfer);

        let response = send(&app, Method::GET, "/account", None, None).await?;
        assert_eq!(json_body(response).await?, accounts_before);

        let response = send(
            &app,
            Method::POST,
            "/transfer",
            None,
            Some(json!({ "toAccount": "five" })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        Ok(())
    }

    async fn post_raw(
        app: &Router,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> Result<Response, BoxError> {
        let mut request = Request::builder().method(Method::POST).uri(uri);
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        let request = request.body(Body::from(body.to_string()))?;

        let response = app.clone().oneshot(request).await?;
        Ok(response)
    }

    #[tokio::test]
    async fn test_json_body_without_json_content_type() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        for content_type in [None, Some("application/x-www-form-urlencoded"), Some("text/plain")] {
            let response = post_raw(
                &app,
                "/account",
                content_type,
                r#"{"firstName":"A","lastName":"B"}"#,
            )
            .await?;
            assert_eq!(response.status(), StatusCode::OK);
            let token = json_body(response).await?["token"]
                .as_str()
                .ok_or("token missing in response")?
                .to_string();
            assert!(token_authority(SECRET).verify_token(&token).is_ok());

            let response = post_raw(
                &app,
                "/transfer",
                content_type,
                r#"{"toAccount":5,"amount":100}"#,
            )
            .await?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                json_body(response).await?,
                json!({ "toAccount": 5, "amount": 100 })
            );
        }

        let response = post_raw(
            &app,
            "/transfer",
            Some("application/x-www-form-urlencoded"),
            "toAccount=5&amount=100",
        )
        .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error = json_body(response).await?;
        let error = error["error"].as_str().ok_or("error missing in response")?;
        assert!(error.starts_with("cannot decode request body"));

        Ok(())
    }

    #[tokio::test]
    async fn test_method_not_allowed() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let response = send(&app, Method::PUT, "/account", None, None).await?;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        Ok(())
    }

    #[tokio::test]
    async fn test_openapi() -> Result<(), BoxError> {
        let (app, _) = test_app().await?;

        let response = send(&app, Method::GET, "/openapi.json", None, None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let api_doc = json_body(response).await?;
        assert!(api_doc["paths"]["/account"].is_object());
        assert!(api_doc["paths"]["/account/{id}"].is_object());
        assert!(api_doc["paths"]["/transfer"].is_object());

        Ok(())
    }
}
