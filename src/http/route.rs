use axum::routing::MethodRouter;
use std::fmt;

/// Paths served by the HTTP component itself
pub const RESERVED_PATHS: [&str; 2] = ["/health", "/info"];

/// A user route mounted on the default HTTP component
#[derive(Clone)]
pub struct Route {
    path: String,
    handler: MethodRouter,
}

impl Route {
    pub fn new<P: Into<String>>(path: P, handler: MethodRouter) -> Self {
        Self {
            path: path.into(),
            handler,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn handler(&self) -> MethodRouter {
        self.handler.clone()
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_PATHS.contains(&self.path.as_str())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("path", &self.path).finish()
    }
}
