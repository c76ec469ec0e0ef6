//! Validated service configuration.
//!
//! `ServiceBuilder` collects routes, extra components, a health-check
//! override, documentation and a SIGHUP handler. The first invalid option is
//! remembered and returned by `build`, which produces an immutable `Service`
//! that owns everything the runtime needs.

use crate::component::Component;
use crate::config::{HttpConfig, PatronConfig};
use crate::error::{PatronError, Result};
use crate::health::{HealthCheckFn, HealthStatus};
use crate::http::{HttpComponent, Route, ServiceInfo};
use crate::runtime::{RunSummary, RuntimeSettings, ServiceRuntime};
use crate::signals::HangupHandler;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ServiceBuilder {
    name: String,
    version: String,
    http: HttpConfig,
    routes: Vec<Route>,
    health_override: Option<HealthCheckFn>,
    components: Vec<Arc<dyn Component>>,
    docs_path: Option<PathBuf>,
    hangup: Option<HangupHandler>,
    settings: RuntimeSettings,
    error: Option<PatronError>,
}

impl ServiceBuilder {
    pub fn new<N: Into<String>>(name: N) -> Self {
        let defaults = PatronConfig::default();
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            http: defaults.http,
            routes: Vec::new(),
            health_override: None,
            components: Vec::new(),
            docs_path: None,
            hangup: None,
            settings: RuntimeSettings::default(),
            error: None,
        }
    }

    /// Seed name, listener, docs and timings from loaded configuration
    pub fn from_config(config: &PatronConfig) -> Self {
        let mut builder = Self::new(config.service.name.clone())
            .http(config.http.clone())
            .grace_period(config.runtime.grace_period())
            .health_check_timeout(config.runtime.health_check_timeout());

        if let Some(path) = &config.service.docs_path {
            builder = builder.docs(path);
        }
        builder
    }

    pub fn version<V: Into<String>>(mut self, version: V) -> Self {
        self.version = version.into();
        self
    }

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Add routes to the default HTTP component
    pub fn routes(mut self, routes: Vec<Route>) -> Self {
        if routes.is_empty() {
            return self.fail("routes are required");
        }
        self.routes.extend(routes);
        info!("routes options are set");
        self
    }

    /// Replace the default health reduction
    pub fn health_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> HealthStatus + Send + Sync + 'static,
    {
        self.health_override = Some(Arc::new(check));
        info!("health check func is set");
        self
    }

    /// Add components that run next to the HTTP component
    pub fn components(mut self, components: Vec<Arc<dyn Component>>) -> Self {
        if components.is_empty() {
            return self.fail("components are required");
        }
        self.components.extend(components);
        info!("component options are set");
        self
    }

    pub fn component<C: Component + 'static>(self, component: C) -> Self {
        self.components(vec![Arc::new(component)])
    }

    /// Serve the contents of `path` from the info endpoint
    pub fn docs<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.docs_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Run `handler` on every SIGHUP
    pub fn sighup<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hangup = Some(Arc::new(handler));
        info!("SIGHUP handler set");
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.settings.grace_period = grace_period;
        self
    }

    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.settings.health_check_timeout = timeout;
        self
    }

    /// Disable OS signal subscription, e.g. when embedding or testing
    pub fn install_signal_handlers(mut self, install: bool) -> Self {
        self.settings.install_signal_handlers = install;
        self
    }

    fn fail(mut self, message: &str) -> Self {
        if self.error.is_none() {
            self.error = Some(PatronError::configuration(message));
        }
        self
    }

    pub fn build(self) -> Result<Service> {
        if let Some(error) = self.error {
            return Err(error);
        }

        if self.name.trim().is_empty() {
            return Err(PatronError::configuration("service name is required"));
        }

        let mut paths = HashSet::new();
        for route in &self.routes {
            if !route.path().starts_with('/') {
                return Err(PatronError::configuration(format!(
                    "route path '{}' must start with '/'",
                    route.path()
                )));
            }
            if route.is_reserved() {
                return Err(PatronError::configuration(format!(
                    "route path '{}' is reserved by the HTTP component",
                    route.path()
                )));
            }
            if !paths.insert(route.path()) {
                return Err(PatronError::configuration(format!(
                    "route path '{}' is registered more than once",
                    route.path()
                )));
            }
        }

        HttpComponent::check_routes(&self.routes)?;

        let mut names = HashSet::new();
        for component in &self.components {
            let name = component.name();
            if name == HttpComponent::NAME {
                return Err(PatronError::configuration(format!(
                    "component name '{}' is reserved for the HTTP component",
                    HttpComponent::NAME
                )));
            }
            if !names.insert(name) {
                return Err(PatronError::configuration(format!(
                    "component name '{}' is registered more than once",
                    name
                )));
            }
        }

        if self.settings.grace_period.is_zero() {
            return Err(PatronError::configuration(
                "grace period must be greater than 0",
            ));
        }

        if self.settings.health_check_timeout.is_zero() {
            return Err(PatronError::configuration(
                "health check timeout must be greater than 0",
            ));
        }

        let docs = match &self.docs_path {
            Some(path) => {
                let docs = std::fs::read_to_string(path).map_err(|e| {
                    PatronError::configuration(format!(
                        "failed to import documentation from {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!("documentation is set");
                Some(docs)
            }
            None => None,
        };

        Ok(Service {
            info: ServiceInfo::new(self.name, self.version, docs),
            http: self.http,
            routes: self.routes,
            health_override: self.health_override,
            components: self.components,
            hangup: self.hangup,
            settings: self.settings,
        })
    }
}

impl fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBuilder")
            .field("name", &self.name)
            .field("routes", &self.routes)
            .field("components", &self.components.len())
            .field("error", &self.error)
            .finish()
    }
}

/// Immutable service snapshot, consumed by `run`
pub struct Service {
    info: ServiceInfo,
    http: HttpConfig,
    routes: Vec<Route>,
    health_override: Option<HealthCheckFn>,
    components: Vec<Arc<dyn Component>>,
    hangup: Option<HangupHandler>,
    settings: RuntimeSettings,
}

impl Service {
    pub fn builder<N: Into<String>>(name: N) -> ServiceBuilder {
        ServiceBuilder::new(name)
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    /// Component names in shutdown-report order, HTTP first
    pub fn component_names(&self) -> Vec<&str> {
        std::iter::once(HttpComponent::NAME)
            .chain(self.components.iter().map(|c| c.name()))
            .collect()
    }

    /// Assemble the runtime: the HTTP component first, then the rest in
    /// registration order
    pub fn into_runtime(self) -> Result<ServiceRuntime> {
        let http: Arc<dyn Component> =
            Arc::new(HttpComponent::new(self.http, self.routes, self.info));

        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.push(http);
        components.extend(self.components);

        ServiceRuntime::new(
            components,
            self.health_override,
            self.hangup,
            self.settings,
        )
    }

    /// Run until a stop signal or the first component failure
    pub async fn run(self) -> Result<RunSummary> {
        info!(
            service = %self.info.name,
            version = %self.info.version,
            instance_id = %self.info.instance_id,
            "Starting service"
        );
        self.into_runtime()?.run().await
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("info", &self.info)
            .field("http", &self.http)
            .field("routes", &self.routes)
            .field("components", &self.component_names())
            .field("health_overridden", &self.health_override.is_some())
            .field("hangup_handler", &self.hangup.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
