//! HTTP boundary for the execution core.
//!
//! ## Endpoints
//!
//! - `GET /api/runtimes` - Supported languages with versions and aliases
//! - `POST /api/execute` - Run a program, returns `{"run": {...}}`
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use codecell::{ExecutionRequest, ExecutionResult, RequestError, Runner, SandboxBackend};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// One supported language as advertised to clients
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Runtime {
    pub language: String,
    pub version: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SourceFile {
    #[serde(default)]
    pub content: String,
}

/// Body of `POST /api/execute`
///
/// Source comes from `source` or, failing that, the first entry of `files`.
#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub language: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub files: Vec<SourceFile>,
}

impl ExecuteBody {
    fn into_request(self) -> ExecutionRequest {
        let source = self
            .source
            .or_else(|| self.files.into_iter().next().map(|file| file.content))
            .unwrap_or_default();
        ExecutionRequest::new(self.language, source)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub run: ExecutionResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Rejection from the boundary
struct ApiError(RequestError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RequestError::EmptySource
            | RequestError::UnsupportedLanguage(_)
            | RequestError::InvalidLimits(_) => StatusCode::BAD_REQUEST,
            RequestError::Workspace(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the HTTP router around a shared runner
pub fn build_router<B>(runner: Arc<Runner<B>>) -> Router
where
    B: SandboxBackend + 'static,
{
    debug!("building HTTP router");

    Router::new()
        .route("/api/runtimes", get(runtimes_handler::<B>))
        .route("/api/execute", post(execute_handler::<B>))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(runner)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "codecell"
    }))
}

async fn runtimes_handler<B: SandboxBackend + 'static>(
    State(runner): State<Arc<Runner<B>>>,
) -> Json<Vec<Runtime>> {
    let runtimes = runner
        .config()
        .languages
        .iter()
        .map(|(id, language)| Runtime {
            language: id.clone(),
            version: language.version.clone(),
            aliases: language.aliases.clone(),
        })
        .collect();
    Json(runtimes)
}

async fn execute_handler<B: SandboxBackend + 'static>(
    State(runner): State<Arc<Runner<B>>>,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let request = body.into_request();

    match runner.submit(&request, None).await {
        Ok(run) => Ok(Json(ExecuteResponse { run })),
        Err(e) => {
            warn!(language = %request.language, error = %e, "request rejected");
            Err(ApiError(e))
        }
    }
}

/// Serve the router until `shutdown` resolves
pub async fn serve<B>(
    runner: Arc<Runner<B>>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error>
where
    B: SandboxBackend + 'static,
{
    let router = build_router(runner);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
