//! Startup configuration so route options, positioning method, and logging
//! behavior are explicit on the command line.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::collaborators::RouteType;
use crate::destination::DestinationDirectory;
use crate::error::{NavError, Result};
use crate::geo::LocationMethod;
use crate::orchestrator::NavigationSettings;
use crate::voice::VoicePhrases;

pub const DEFAULT_OVERLAY_ID: &str = "DM_15755";
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "wayfinder",
    about = "Voice-guided indoor pedestrian navigation (JSON-lines replay harness)",
    version
)]
pub struct AppConfig {
    /// TOML file mapping destination keys to coordinates
    #[arg(long, env = "WAYFINDER_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Indoor map overlay passed to the router (the directory file may override it)
    #[arg(long = "overlay-id", default_value = DEFAULT_OVERLAY_ID)]
    pub overlay_id: String,

    /// Positioning method requested from the location source
    #[arg(long = "location-method", value_enum, default_value_t = LocationMethod::GpsNetworkIndoor)]
    pub location_method: LocationMethod,

    /// Route optimisation preference
    #[arg(long = "route-type", value_enum, default_value_t = RouteType::Fastest)]
    pub route_type: RouteType,

    /// Enable JSON trace logging
    #[arg(long = "logs", default_value_t = false)]
    pub logs: bool,

    /// Disable all logging (overrides --logs)
    #[arg(long = "no-logs", default_value_t = false)]
    pub no_logs: bool,

    /// Allow transcript text in logs
    #[arg(long = "log-content", default_value_t = false)]
    pub log_content: bool,

    /// How long to wait for the navigation engine to come up (ms)
    #[arg(long = "ready-timeout-ms", default_value_t = DEFAULT_READY_TIMEOUT_MS)]
    pub ready_timeout_ms: u64,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.overlay_id.trim().is_empty() {
            return Err(NavError::Config("--overlay-id must not be empty".to_string()));
        }
        if self.ready_timeout_ms == 0 {
            return Err(NavError::Config(
                "--ready-timeout-ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Load the configured directory, or an empty one when none is set.
    pub fn load_directory(&self) -> Result<DestinationDirectory> {
        match &self.directory {
            Some(path) => DestinationDirectory::load(path),
            None => Ok(DestinationDirectory::default()),
        }
    }

    pub fn navigation_settings(&self, directory: &DestinationDirectory) -> NavigationSettings {
        NavigationSettings {
            location_method: self.location_method,
            route_type: self.route_type,
            overlay_id: directory
                .overlay_id()
                .unwrap_or(&self.overlay_id)
                .to_string(),
            phrases: VoicePhrases::default(),
            log_content: self.log_content,
        }
    }
}
