use crate::{
    component::{Component, RunContext},
    config::HttpConfig,
    error::{panic_text, HttpError, PatronError, Result},
    health::{HealthAggregator, HealthStatus},
};
use async_trait::async_trait;
use axum::{routing::get, Router};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::handlers::{health_handler, info_handler, ServiceInfo};
use super::route::Route;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) health: Arc<HealthAggregator>,
    pub(crate) info: Arc<ServiceInfo>,
}

/// Default HTTP component: user routes plus `/health` and `/info`
pub struct HttpComponent {
    pub(crate) config: HttpConfig,
    pub(crate) routes: Vec<Route>,
    pub(crate) info: Arc<ServiceInfo>,
    status: Mutex<HealthStatus>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpComponent {
    pub const NAME: &'static str = "http";

    pub fn new(config: HttpConfig, routes: Vec<Route>, info: ServiceInfo) -> Self {
        Self {
            config,
            routes,
            info: Arc::new(info),
            status: Mutex::new(HealthStatus::Unknown),
            local_addr: Mutex::new(None),
        }
    }

    /// Address the server is bound to, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Router with the built-in endpoints and every user route
    pub(crate) fn router(&self, health: Arc<HealthAggregator>) -> Router {
        let state = ServerState {
            health,
            info: Arc::clone(&self.info),
        };

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/info", get(info_handler))
            .with_state(state);

        self.routes
            .iter()
            .fold(router, |router, route| router.route(route.path(), route.handler()))
            .layer(TraceLayer::new_for_http())
    }

    /// Mount `routes` next to the built-in endpoints on a scratch router.
    ///
    /// axum panics on conflicting or malformed paths; that panic is turned
    /// into a configuration error here instead of surfacing once the server
    /// is already running.
    pub(crate) fn check_routes(routes: &[Route]) -> Result<()> {
        let mount = AssertUnwindSafe(|| {
            let builtin = Router::<()>::new()
                .route("/health", get(|| async {}))
                .route("/info", get(|| async {}));
            routes
                .iter()
                .fold(builtin, |router, route| router.route(route.path(), route.handler()))
        });

        std::panic::catch_unwind(mount).map(|_| ()).map_err(|panic| {
            PatronError::configuration(format!(
                "invalid route set: {}",
                panic_text(&*panic)
            ))
        })
    }

    fn set_status(&self, status: HealthStatus) {
        *self.status.lock() = status;
    }
}

#[async_trait]
impl Component for HttpComponent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: RunContext) -> Result<()> {
        let addr = self.config.address();
        let app = self.router(Arc::clone(ctx.health()));

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            self.set_status(HealthStatus::Unhealthy);
            HttpError::BindFailed {
                address: addr.clone(),
                source: e,
            }
        })?;

        *self.local_addr.lock() = listener.local_addr().ok();
        self.set_status(HealthStatus::Healthy);
        info!(
            address = %addr,
            routes = self.routes.len(),
            "HTTP component listening"
        );

        let shutdown = ctx.child_token();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        match served {
            Ok(()) => {
                self.set_status(HealthStatus::Unknown);
                info!("HTTP component stopped");
                Ok(())
            }
            Err(e) => {
                self.set_status(HealthStatus::Unhealthy);
                error!("HTTP server error: {}", e);
                Err(HttpError::Serve {
                    details: e.to_string(),
                }
                .into())
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        *self.status.lock()
    }
}
