use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use flows::{Export, Mailer, RequestView, ResourceRegistrar};
use integrations::{KeycloakConfig, KeycloakRegistrar, LocalRegistrar, LogMailer, MailRelay};
use shared::{
    domain::{CallId, RequestId},
    error::{ApiError, ErrorCode},
    protocol::Command,
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

mod api;
mod app_state;
mod config;

use api::{reject, reject_flow, user_from_headers, Rejection};
use app_state::AppState;
use config::{keycloak_base_url, load_schemas, load_settings, prepare_database_url, Settings};

const MAX_COMMAND_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let schemas = load_schemas(settings.schema_path.as_deref())?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState::new(
        storage,
        registrar(&settings)?,
        mailer(&settings)?,
        schemas,
    );
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn registrar(settings: &Settings) -> anyhow::Result<Arc<dyn ResourceRegistrar>> {
    match (&settings.keycloak_url, &settings.keycloak_client_secret) {
        (Some(url), Some(secret)) => Ok(Arc::new(KeycloakRegistrar::new(KeycloakConfig {
            base_url: keycloak_base_url(url)?,
            realm: settings.keycloak_realm.clone(),
            client_id: settings.keycloak_client_id.clone(),
            client_secret: secret.clone(),
        }))),
        _ => {
            warn!("keycloak not configured; request resources are tracked in memory");
            Ok(Arc::new(LocalRegistrar::default()))
        }
    }
}

fn mailer(settings: &Settings) -> anyhow::Result<Arc<dyn Mailer>> {
    match &settings.mail_relay_url {
        Some(endpoint) => Ok(Arc::new(MailRelay::new(
            Url::parse(endpoint)?,
            settings.mail_from.clone(),
        ))),
        None => {
            warn!("mail relay not configured; notifications are only logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/requests/:request_id/commands", post(handle_command))
        .route("/calls/:call_id/export/overview", get(export_overview))
        .route(
            "/calls/:call_id/requests/:request_id/export/comments",
            get(export_comments),
        )
        .layer(RequestBodyLimitLayer::new(MAX_COMMAND_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, Rejection> {
    state.storage.health_check().await.map_err(|e| {
        error!(error = %e, "health check failed");
        reject(ApiError::new(ErrorCode::Internal, "StorageFailure", e.to_string()))
    })?;
    Ok("ok")
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RequestView>, Rejection> {
    let user = user_from_headers(&headers)?;
    let command: Command = serde_json::from_slice(&body).map_err(|e| {
        reject(ApiError::new(
            ErrorCode::Validation,
            "InvalidCommand",
            e.to_string(),
        ))
    })?;
    let view = state
        .flows
        .handle(request_id, &user, command)
        .await
        .map_err(reject_flow)?;
    Ok(Json(view))
}

async fn export_overview(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<CallId>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Rejection> {
    user_from_headers(&headers)?;
    let export = state
        .flows
        .export_overview(call_id)
        .await
        .map_err(reject_flow)?;
    Ok(download(export))
}

async fn export_comments(
    State(state): State<Arc<AppState>>,
    Path((call_id, request_id)): Path<(CallId, RequestId)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Rejection> {
    user_from_headers(&headers)?;
    let export = state
        .flows
        .export_comments(call_id, request_id)
        .await
        .map_err(reject_flow)?;
    Ok(download(export))
}

fn download(export: Export) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&export.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", export.file_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (StatusCode::OK, headers, export.bytes)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
