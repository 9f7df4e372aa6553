//! Event vocabulary delivered to the navigation event loop.
//!
//! Each collaborator callback surface is one variant; the orchestrator
//! dispatches all of them through a single handler.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::collaborators::{CaptureId, GuidanceEvent, RequestId, RouteResult, RoutingError};
use crate::geo::{LocationMethod, LocationStatus, Position};
use crate::readiness::ReadySignal;

#[derive(Debug, Clone)]
pub enum NavEvent {
    PositionFix(Position),
    LocationMethodChanged {
        method: LocationMethod,
        status: LocationStatus,
    },
    /// Single-finger tap on the map surface.
    Tap,
    /// Global abort gesture.
    DoubleTap,
    Transcript {
        capture_id: CaptureId,
        text: String,
    },
    /// Speech capture finished without producing a transcript.
    CaptureEnded {
        capture_id: CaptureId,
    },
    RouteCalculated {
        request_id: RequestId,
        result: Result<Vec<RouteResult>, RoutingError>,
    },
    Guidance(GuidanceEvent),
    Pause,
    Resume,
    /// Acknowledged once the loop has drained its queue, including any
    /// follow-up events the earlier handlers enqueued.
    Barrier(ReadySignal),
    Shutdown,
}

/// Cloneable, thread-safe entry point into the event loop.
#[derive(Debug, Clone)]
pub struct NavInput {
    tx: Sender<NavEvent>,
}

impl NavInput {
    /// Unbounded so collaborator completions are never dropped under load.
    pub fn channel() -> (Self, Receiver<NavEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Returns false when the event loop has gone away.
    pub fn send(&self, event: NavEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn position_fix(&self, position: Position) -> bool {
        self.send(NavEvent::PositionFix(position))
    }

    pub fn tap(&self) -> bool {
        self.send(NavEvent::Tap)
    }

    pub fn double_tap(&self) -> bool {
        self.send(NavEvent::DoubleTap)
    }

    pub fn guidance(&self, event: GuidanceEvent) -> bool {
        self.send(NavEvent::Guidance(event))
    }
}
