//! Indoor wayfinding core shared by the replay binary and host integrations.

pub mod collaborators;
pub mod config;
pub mod destination;
pub mod error;
pub mod events;
pub mod geo;
mod lock;
pub mod orchestrator;
pub mod position;
pub mod readiness;
pub mod route;
pub mod sim;
pub mod telemetry;
pub mod voice;

pub use error::{NavError, Result};
pub use events::{NavEvent, NavInput};
pub use orchestrator::{NavigationOrchestrator, NavigationRuntime, NavigationSettings};
pub use route::SessionState;
