//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the binary to finish loading the
//! store (replay, migrations) between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, list_aftermarket_devices, list_privileges, list_rewards, list_stakes,
    list_vehicles, liveness_handler, readiness_handler, AppState,
};
use super::middleware::{admit, build_http_layers};
use super::shutdown::ShutdownController;
use crate::service::ListService;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates shared state (list service, shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    lists: ListService,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, lists: ListService) -> Self {
        Self {
            config,
            listener: None,
            lists,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- Kubernetes liveness probe
    /// - `GET /health/ready` -- Kubernetes readiness probe
    /// - `GET /v1/vehicles`
    /// - `GET /v1/aftermarket-devices`
    /// - `GET /v1/vehicles/{tokenId}/privileges`
    /// - `GET /v1/stakes`
    /// - `GET /v1/rewards`
    ///
    /// Only the `/v1` routes pass through admission control.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            lists: self.lists.clone(),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        let lists = Router::new()
            .route("/v1/vehicles", get(list_vehicles))
            .route("/v1/aftermarket-devices", get(list_aftermarket_devices))
            .route("/v1/vehicles/{token_id}/privileges", get(list_privileges))
            .route("/v1/stakes", get(list_stakes))
            .route("/v1/rewards", get(list_rewards))
            .route_layer(axum::middleware::from_fn_with_state(state.clone(), admit));

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .merge(lists)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining and new list requests get 503
    /// 2. In-flight requests get `drain_timeout` to finish
    /// 3. Requests still running after that are cancelled
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let controller = self.shutdown;
        let drain_timeout = self.config.drain_timeout;

        controller.set_ready();
        info!("Serving HTTP connections");

        let draining = Arc::clone(&controller);
        let signal = async move {
            shutdown.await;
            info!("shutdown signal received, draining");
            draining.trigger_shutdown();
            tokio::spawn(async move {
                if draining.wait_for_drain(drain_timeout).await {
                    info!("all requests drained");
                } else {
                    warn!(
                        in_flight = draining.in_flight_count(),
                        "drain timeout expired, cancelling in-flight requests"
                    );
                }
            });
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        info!(state = controller.health_state().as_str(), "server stopped");
        Ok(())
    }
}
