//! HTTP surface: an axum router exposing the extraction pipeline.
//!
//! | Route            | Methods         | Body                               |
//! |------------------|-----------------|------------------------------------|
//! | `/extract`       | POST, OPTIONS   | `{ imageData, mimeType }`          |
//! | `/extract/batch` | POST, OPTIONS   | `{ files: [{ imageData, mimeType }] }` |
//! | `/health`        | GET             | none                               |
//!
//! Every failure, including a wrong method or a body that is not JSON,
//! is answered with the JSON error envelope from [`crate::error`].

mod handler;
mod request;
mod response;

pub use request::{BatchQuery, BatchRequest, OutputFormat};

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::llm::{self, ExtractionBackend};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Default request body cap: 20 files of a few MB each, base64-inflated.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ExtractionConfig>,
    backend: Option<Arc<dyn ExtractionBackend>>,
}

impl AppState {
    /// Backend is resolved from `config` on every request, so a credential
    /// added to the environment after startup is picked up.
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config: Arc::new(config),
            backend: None,
        }
    }

    /// Use a fixed backend for every request.
    pub fn with_backend(config: ExtractionConfig, backend: Arc<dyn ExtractionBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend: Some(backend),
        }
    }

    pub(crate) fn backend(&self) -> Result<Arc<dyn ExtractionBackend>, ExtractError> {
        match self.backend {
            Some(ref backend) => Ok(Arc::clone(backend)),
            None => llm::resolve_backend(&self.config),
        }
    }
}

/// Listener and middleware settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_body_bytes: usize,
    /// Send permissive CORS headers (any origin, POST/OPTIONS, Content-Type).
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: true,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Build the application router.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let app = Router::new()
        .route(
            "/extract",
            post(handler::extract_single)
                .options(handler::preflight)
                .fallback(handler::method_not_allowed),
        )
        .route(
            "/extract/batch",
            post(handler::extract_batch)
                .options(handler::preflight)
                .fallback(handler::method_not_allowed),
        )
        .route("/health", get(handler::health))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if server.cors {
        app.layer(cors_layer())
    } else {
        app
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState, server: ServerConfig) -> io::Result<()> {
    let app = router(state, &server);
    let listener = TcpListener::bind(server.addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening for extraction requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}
