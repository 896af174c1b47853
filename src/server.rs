use std::{net::SocketAddr, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    analysis::{
        AnalysisOrchestrator, AnalyzeError, ClientInfo, HttpModelClient, PromptBuilder,
        RawAnalysisRequest, ValidationError, credentials::EnvCredentialProvider,
        error::upstream_unavailable, open_record_store,
    },
    config::Config,
};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<AnalysisOrchestrator>,
    started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }

    /// Wires the store, provider client and orchestrator described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = open_record_store(&config.store.url)
            .await
            .with_context(|| format!("failed to open record store {}", config.store.url))?;
        let model_client = HttpModelClient::new(
            config.provider.endpoint.clone(),
            config.provider.credential.clone(),
            Arc::new(EnvCredentialProvider),
            config.provider.timeout(),
        )
        .context("failed to construct provider http client")?;

        let orchestrator = AnalysisOrchestrator::new(
            PromptBuilder::new(config.provider.model.clone()),
            Arc::new(model_client),
            store,
        )
        .with_store_write_timeout(config.store.write_timeout());

        Ok(Self::new(Arc::new(orchestrator)))
    }
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/health", get(health))
        // `body_limit_bytes` is the only cap, including above axum's 2 MB default.
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(body_limit_bytes))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    let listen_addr = config.server.listen_addr()?;
    let state = AppState::from_config(&config).await?;
    let app = router(state, config.server.body_limit_bytes);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("unable to bind {}", listen_addr))?;

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;
    let shutdown = async move {
        let signal_name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        tracing::info!(target: "server", signal = signal_name, "shutdown_requested");
        eprintln!("received {signal_name}; draining in-flight requests");
    };

    tracing::info!(
        target: "server",
        listen_addr = %listen_addr,
        provider_endpoint = %config.provider.endpoint,
        model = %config.provider.model,
        store_url = %config.store.url,
        "server_started"
    );
    eprintln!("code-analyst listening on http://{}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("http server failed")?;

    eprintln!("code-analyst stopped");
    Ok(())
}

async fn analyze(State(state): State<AppState>, request: Request) -> Response {
    let client = client_info(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    // Streamed bodies without a Content-Length only hit the limit while buffering.
    let raw = match Bytes::from_request(request, &state).await {
        Ok(bytes) => match parse_request_body(&bytes) {
            Ok(raw) => raw,
            Err(err) => return AnalyzeError::from(err).into_response(),
        },
        Err(rejection) => {
            tracing::info!(
                target: "server",
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "request_body_read_failed"
            );
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ValidationError::BodyTooLarge
            } else {
                ValidationError::InvalidBody
            };
            return AnalyzeError::from(err).into_response();
        }
    };

    // The pipeline owns its own task: if the caller goes away the drop guard
    // cancels the provider call, but the failure record is still written.
    let cancel = CancellationToken::new();
    let disconnect_guard = cancel.clone().drop_guard();
    let orchestrator = Arc::clone(&state.orchestrator);
    let task = tokio::spawn(async move { orchestrator.handle(raw, client, cancel).await });
    let joined = task.await;
    disconnect_guard.disarm();

    match joined {
        Ok(Ok(success)) => (StatusCode::OK, Json(success)).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(join_err) => {
            tracing::error!(target: "server", error = %join_err, "analysis_task_failed");
            AnalyzeError::from(upstream_unavailable(join_err.to_string())).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(json!({
        "status": "OK",
        "timestamp": timestamp,
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

pub fn parse_request_body(bytes: &[u8]) -> Result<RawAnalysisRequest, ValidationError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RawAnalysisRequest::default());
    }
    serde_json::from_slice(bytes).map_err(|_| ValidationError::InvalidBody)
}

fn client_info(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> ClientInfo {
    let address = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    ClientInfo::new(address, agent)
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}
