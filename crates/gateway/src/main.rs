//! Wayfarer API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication
//! - Rate limiting
//! - Chat routing (buffered and streamed replies)
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;
mod telemetry;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use wayfarer_common::{
    auth::AuthVerifier,
    chat::TravelAssistant,
    config::AppConfig,
    context::{PromptComposer, SemanticRetriever},
    dataset::CityCatalog,
    embeddings::create_embedder,
    llm::create_model_provider,
    vector_store::create_vector_store,
};

use crate::middleware::rate_limit::{rate_limit_middleware, RateLimit};

/// Maximum concurrent requests (backpressure control)
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub assistant: Arc<TravelAssistant>,
    pub auth: Arc<AuthVerifier>,
}

impl FromRef<AppState> for Arc<AuthVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    let tracer_provider = telemetry::init_tracing(&config.observability)?;

    info!("Starting Wayfarer API Gateway v{}", wayfarer_common::VERSION);

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    telemetry::init_metrics(&config.observability)?;

    let assistant = build_assistant(&config).await?;

    let auth = AuthVerifier::from_config(&config.auth);
    if !auth.is_enabled() {
        warn!("auth.jwt_secret not set; chat endpoints are unauthenticated");
    }

    let state = AppState {
        config: config.clone(),
        assistant: Arc::new(assistant),
        auth: Arc::new(auth),
    };

    let app = create_router(state)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            warn!(error = %e, "Failed to flush traces");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wire the dataset and providers into the assistant
async fn build_assistant(config: &AppConfig) -> anyhow::Result<TravelAssistant> {
    let catalog = CityCatalog::load(&config.dataset.path)?;

    let embedder = create_embedder(&config.embedding)?;
    info!(provider = %config.embedding.provider, model = embedder.model_name(), "Embedder ready");

    let store = create_vector_store(&config.vector_store, embedder.as_ref()).await?;
    info!(backend = store.backend_name(), top_k = config.vector_store.top_k, "Vector store ready");

    let model = create_model_provider(&config.model)?;
    info!(provider = %config.model.provider, model = model.model_name(), "Model provider ready");

    let retriever = SemanticRetriever::new(embedder, store, config.vector_store.top_k);
    Ok(TravelAssistant::new(
        catalog,
        retriever,
        PromptComposer::default(),
        model,
    )
    .with_answer_timeout(config.request_timeout()))
}

/// Create the main application router
fn create_router(state: AppState) -> anyhow::Result<Router> {
    // CORS configuration
    let origins = &state.config.server.cors_allowed_origins;
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed = origins
            .iter()
            .map(|o| HeaderValue::from_str(o))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(parsed)
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Health endpoints (no auth, no rate limit)
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready));

    // Chat endpoints; the buffered deadline is enforced by the assistant so
    // an expiry still produces the structured error body
    let mut chat_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/stream", post(handlers::chat::chat_stream));

    if state.config.rate_limit.enabled {
        let limit = RateLimit::from_config(&state.config.rate_limit)?;
        chat_routes = chat_routes.route_layer(axum::middleware::from_fn_with_state(
            limit,
            rate_limit_middleware,
        ));
    }

    // Compose the app
    Ok(Router::new()
        .nest("/v1", health_routes.merge(chat_routes))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
