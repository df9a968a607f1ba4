//! HTTP routes for the credential service
//!
//! Endpoints:
//! - POST   /auth     form `client_id`, `client_secret` -> signed token
//! - POST   /verify   `Authorization: Bearer <token>` -> claims
//! - POST   /logout   form `token` (or bearer header) -> revoke
//! - POST   /client   bearer admin token + form `client_id`, `client_secret`, `is_admin`
//! - DELETE /client   not implemented
//! - GET    /health   liveness and request counters
//! - GET    /metrics  Prometheus exposition
//!
//! Each handler calls exactly one `CredentialService` operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::Secret;
use credential_core::{CredentialService, NewClient};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: CredentialService,
    pub prometheus: PrometheusHandle,
    pub requests_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: CredentialService, prometheus: PrometheusHandle) -> Self {
        Self {
            service,
            prometheus,
            requests_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// A concurrency limit layer caps in-flight requests at `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/auth", post(authenticate))
        .route("/verify", post(verify))
        .route("/logout", post(logout))
        .route("/client", post(create_client).delete(delete_client))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Record metrics for a finished operation and render its response.
fn finish(
    state: &AppState,
    operation: &'static str,
    started: Instant,
    result: Result<Response, ApiError>,
) -> Response {
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let duration = started.elapsed().as_secs_f64();
    match result {
        Ok(response) => {
            crate::metrics::record_request(operation, "success", duration);
            response
        }
        Err(e) => {
            crate::metrics::record_request(operation, e.kind(), duration);
            let request_id = request_id();
            tracing::debug!(operation, %request_id, outcome = e.kind(), "request rejected");
            e.into_response_with_id(&request_id)
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Map a body that is not a valid urlencoded form to the uniform rejection.
fn form_rejected(rejection: FormRejection) -> ApiError {
    tracing::debug!(status = %rejection.status(), "request body is not a valid form");
    ApiError::InvalidRequest
}

/// Parse a form boolean. Absent or empty means false.
fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Some(false),
        Some("true" | "1" | "on" | "yes") => Some(true),
        Some("false" | "0" | "off" | "no") => Some(false),
        Some(_) => None,
    }
}

/// Non-empty form field.
fn required(value: Option<String>) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::InvalidRequest)
}

#[derive(Deserialize)]
struct AuthForm {
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// POST /auth: exchange client credentials for a token.
async fn authenticate(
    State(state): State<AppState>,
    form: Result<Form<AuthForm>, FormRejection>,
) -> Response {
    let started = Instant::now();
    let result = match form {
        Ok(Form(form)) => issue_token(&state, form).await,
        Err(rejection) => Err(form_rejected(rejection)),
    };
    finish(&state, "authenticate", started, result)
}

/// Missing fields are an authentication failure, same as wrong ones.
async fn issue_token(state: &AppState, form: AuthForm) -> Result<Response, ApiError> {
    let (Some(client_id), Some(secret)) = (form.client_id, form.client_secret) else {
        return Err(credential_core::Error::AuthFailure.into());
    };
    let secret = Secret::new(secret);
    let issued = state
        .service
        .authenticate(&client_id, secret.expose())
        .await?;
    let body = serde_json::to_value(&issued)
        .map_err(|_| ApiError::from(credential_core::Error::Encoding))?;
    Ok(json_response(StatusCode::OK, body))
}

/// POST /verify: validate the bearer token and return its claims.
async fn verify(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let result = verify_bearer(&state, &headers).await;
    finish(&state, "verify", started, result)
}

async fn verify_bearer(state: &AppState, headers: &HeaderMap) -> Result<Response, ApiError> {
    let token = bearer_token(headers).ok_or(credential_core::Error::VerifyFailure)?;
    let claims = state.service.verify(token).await?;
    let body = serde_json::to_value(&claims)
        .map_err(|_| ApiError::from(credential_core::Error::Encoding))?;
    Ok(json_response(StatusCode::OK, body))
}

#[derive(Default, Deserialize)]
struct LogoutForm {
    token: Option<String>,
}

/// POST /logout: revoke a token.
///
/// The token comes from the `token` form field, falling back to the bearer
/// header. A missing or non-form body counts as an empty form. The token is
/// revoked without being decoded.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<LogoutForm>, FormRejection>,
) -> Response {
    let started = Instant::now();
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::debug!(status = %rejection.status(), "logout body ignored");
            LogoutForm::default()
        }
    };
    let result = revoke_token(&state, &headers, form).await;
    finish(&state, "revoke", started, result)
}

async fn revoke_token(
    state: &AppState,
    headers: &HeaderMap,
    form: LogoutForm,
) -> Result<Response, ApiError> {
    let token = match form.token.filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => bearer_token(headers)
            .map(str::to_owned)
            .ok_or(ApiError::InvalidRequest)?,
    };
    state.service.revoke(&token).await?;
    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "success": true }),
    ))
}

#[derive(Deserialize)]
struct CreateClientForm {
    client_id: Option<String>,
    client_secret: Option<String>,
    is_admin: Option<String>,
}

/// POST /client: register a new client (admin token required).
async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<CreateClientForm>, FormRejection>,
) -> Response {
    let started = Instant::now();
    let result = match form {
        Ok(Form(form)) => register_client(&state, &headers, form).await,
        Err(rejection) => Err(form_rejected(rejection)),
    };
    finish(&state, "create_client", started, result)
}

async fn register_client(
    state: &AppState,
    headers: &HeaderMap,
    form: CreateClientForm,
) -> Result<Response, ApiError> {
    let token = bearer_token(headers).ok_or(credential_core::Error::VerifyFailure)?;
    let client_id = required(form.client_id)?;
    let secret = Secret::new(required(form.client_secret)?);
    let is_admin = parse_flag(form.is_admin.as_deref()).ok_or(ApiError::InvalidRequest)?;

    state
        .service
        .create_client(
            token,
            NewClient {
                client_id: client_id.clone(),
                secret,
                is_admin,
            },
        )
        .await?;
    Ok(json_response(
        StatusCode::CREATED,
        serde_json::json!({ "success": true, "client_id": client_id }),
    ))
}

/// DELETE /client: client removal is not supported.
async fn delete_client(State(state): State<AppState>) -> Response {
    finish(
        &state,
        "delete_client",
        Instant::now(),
        Err(ApiError::NotImplemented),
    )
}

/// GET /health: status, store backend, uptime and requests served.
async fn health_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "store": state.service.store_backend(),
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "requests_served": state.requests_total.load(Ordering::Relaxed),
        }),
    )
}

/// GET /metrics: Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
