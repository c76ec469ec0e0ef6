use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatronError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid service configuration: {message}")]
    Configuration { message: String },

    #[error("Component {component} failed: {message}")]
    ComponentFailure { component: String, message: String },

    #[error("Component {component} did not stop within the grace period")]
    ShutdownTimeout { component: String },

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Errors raised by the default HTTP component
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {details}")]
    Serve { details: String },
}

impl PatronError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>, M: Into<String>>(component: S, message: M) -> Self {
        Self::ComponentFailure {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether this error was produced by build-time validation
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, PatronError>;

/// Text carried by a caught panic payload
pub(crate) fn panic_text(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
