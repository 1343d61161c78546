use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::cors::{cors_layer, reject_disallowed_preflight};
use crate::error::Result;
use crate::handlers::{
    health_check, heartbeat, liveness_check, not_found, readiness_check, system_info, AppState,
};
use crate::health::HealthChecker;
use crate::middleware::{
    handle_middleware_error, handle_panic, logging_middleware, rate_limit, request_id,
    RateLimitState,
};
use crate::rate_limiter::LimiterRegistry;
use axum::error_handling::HandleErrorLayer;
use axum::routing::get;
use axum::{middleware, BoxError, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Build the application router using the system clock.
pub fn create_app(config: &Config) -> Router {
    create_app_with_clock(config, Arc::new(SystemClock))
}

/// Build the application router with an explicit time source.
pub fn create_app_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Router {
    let settings = config.rate_limit();
    let registry = Arc::new(
        LimiterRegistry::new(settings.requests_per_minute, settings.window, clock.clone())
            .with_sweep_interval(settings.sweep_interval),
    );
    let state = AppState {
        health: Arc::new(HealthChecker::new(
            registry.clone(),
            settings.enabled,
            clock,
        )),
        rate_limit: RateLimitState { settings, registry },
    };

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/heartbeat", get(heartbeat))
        .route("/system", get(system_info))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check));

    let router = Router::new()
        .nest("/api/v1", api)
        // Legacy health endpoint
        .route("/health", get(health_check))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit,
        ))
        .with_state(state);

    apply_middleware(router, config)
}

/// Wrap `router` in the request pipeline shared by every route.
///
/// Outermost first: request id, tracing, request logging, panic recovery,
/// request timeout, preflight rejection and CORS.
pub fn apply_middleware(router: Router, config: &Config) -> Router {
    let cors = config.cors();
    let timeout = config.request_timeout();
    let allowed_origins: Arc<[String]> = cors.allowed_origins.clone().into();

    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(logging_middleware))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(HandleErrorLayer::new(move |err: BoxError| {
                handle_middleware_error(err, timeout)
            }))
            .layer(TimeoutLayer::new(timeout))
            .layer(middleware::from_fn_with_state(
                allowed_origins,
                reject_disallowed_preflight,
            ))
            .layer(cors_layer(&cors)),
    )
}

pub struct Server {
    app: Router,
    bind_address: String,
    shutdown_timeout: Duration,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        ConfigValidator::validate_bind_address(&config.host, config.port)?;
        let app = create_app(&config);

        Ok(Self {
            app,
            bind_address: config.bind_address(),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Bind and serve until Ctrl+C or SIGTERM. Hostnames are resolved here.
    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_address.as_str()).await?;

        tracing::info!("Server listening on {}", listener.local_addr()?);
        tracing::info!("Health check available at /api/v1/health");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = self.app;
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        tokio::select! {
            result = &mut server => {
                result??;
                return Ok(());
            }
            _ = shutdown_signal() => {}
        }

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(self.shutdown_timeout, &mut server).await {
            Ok(result) => {
                result??;
                tracing::info!("Server exited properly");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Graceful shutdown timed out, aborting in-flight requests"
                );
                server.abort();
            }
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
