//! Error taxonomy for the navigation core.
//!
//! Every failure here is local to one navigation session; none of them are
//! fatal to the process.

use thiserror::Error;

use crate::route::SessionState;

/// Navigation core error type.
#[derive(Error, Debug)]
pub enum NavError {
    /// The positioning source refused to start with the configured method.
    #[error("positioning source refused to start with method {method}")]
    PositioningStartFailure { method: String },

    #[error("route calculation failed: {0}")]
    RouteCalculation(#[from] crate::collaborators::RoutingError),

    #[error("reroute failed: {0}")]
    Reroute(String),

    /// A route request was issued while another session is still active.
    #[error("route session is busy ({state:?}); stop it before starting a new one")]
    SessionBusy { state: SessionState },

    #[error("no position fix available to use as route origin")]
    NoOrigin,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("destination directory parse error: {0}")]
    DirectoryParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine not ready after {waited_ms}ms")]
    EngineNotReady { waited_ms: u64 },

    #[error("navigation event loop has stopped")]
    EventLoopStopped,
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::DirectoryParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
