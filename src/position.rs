//! Position tracking with foreground gating and first-fix detection.
//!
//! The welcome flag is monotonic for the lifetime of the tracker; the
//! position-found flag is cleared on every pause so recentring happens
//! again after a resume.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collaborators::{PositionDisplay, PositioningSource, Subscription};
use crate::error::{NavError, Result};
use crate::events::NavInput;
use crate::geo::{Coordinate, LocationMethod, Position};

/// Tracker flags with explicit reset semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerFlags {
    /// Set by `pause`, cleared by `resume`.
    pub paused: bool,
    /// First foreground fix since start/resume. Cleared on pause.
    pub position_found: bool,
    /// Welcome announcement requested. Never reset.
    pub welcome_spoken: bool,
}

/// What the caller should do after a fix was ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// Fix recorded while paused; no display or voice effect.
    RecordedWhilePaused,
    Updated,
    /// First foreground fix of the process: speak the welcome.
    Welcome,
}

pub struct PositionTracker {
    source: Arc<dyn PositioningSource>,
    display: Arc<dyn PositionDisplay>,
    method: LocationMethod,
    flags: TrackerFlags,
    last: Option<Position>,
    subscription: Option<Subscription>,
}

impl PositionTracker {
    pub fn new(
        source: Arc<dyn PositioningSource>,
        display: Arc<dyn PositionDisplay>,
        method: LocationMethod,
    ) -> Self {
        Self {
            source,
            display,
            method,
            flags: TrackerFlags::default(),
            last: None,
            subscription: None,
        }
    }

    /// Subscribe to the source and start it. A refused start is reported but
    /// the subscription is kept so a later resume can still deliver fixes.
    pub fn start(&mut self, input: NavInput) -> Result<()> {
        if self.subscription.is_none() {
            let subscription = self.source.subscribe(input);
            debug!(subscription = subscription.id(), "positioning subscribed");
            self.subscription = Some(subscription);
        }
        self.start_source()
    }

    fn start_source(&self) -> Result<()> {
        if self.source.start(self.method) {
            info!(method = %self.method, "positioning started");
            Ok(())
        } else {
            warn!(method = %self.method, "positioning source refused to start");
            Err(NavError::PositioningStartFailure {
                method: self.method.to_string(),
            })
        }
    }

    pub fn on_fix(&mut self, position: Position) -> FixOutcome {
        self.display.show_position_info(&position.summary());
        let coordinate = position.coordinate;
        self.last = Some(position);

        if self.flags.paused {
            debug!("fix recorded while paused");
            return FixOutcome::RecordedWhilePaused;
        }

        self.display.recenter(coordinate);
        if self.flags.position_found {
            return FixOutcome::Updated;
        }
        self.flags.position_found = true;
        info!(%coordinate, "position found");
        if self.flags.welcome_spoken {
            FixOutcome::Updated
        } else {
            self.flags.welcome_spoken = true;
            FixOutcome::Welcome
        }
    }

    pub fn current_position(&self) -> Option<&Position> {
        self.last.as_ref()
    }

    pub fn current_coordinate(&self) -> Option<Coordinate> {
        self.last.as_ref().map(|position| position.coordinate)
    }

    pub fn has_fix(&self) -> bool {
        self.flags.position_found && self.last.is_some()
    }

    pub fn flags(&self) -> TrackerFlags {
        self.flags
    }

    pub fn method(&self) -> LocationMethod {
        self.method
    }

    pub fn pause(&mut self) {
        self.source.stop();
        self.flags.paused = true;
        self.flags.position_found = false;
        debug!("positioning paused");
    }

    pub fn resume(&mut self) -> Result<()> {
        self.flags.paused = false;
        self.start_source()
    }

    /// Stop the source and release the subscription. Safe to call twice.
    pub fn destroy(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.source.stop();
            self.source.unsubscribe(subscription);
            debug!("positioning unsubscribed");
        }
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        self.destroy();
    }
}
