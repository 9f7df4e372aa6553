//! Contracts for the external collaborators the navigation core drives.
//!
//! Every collaborator reports back by pushing events into a [`NavInput`];
//! none of them call into the core directly, so a collaborator may complete
//! synchronously from inside a trait call without re-entering session state.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;

use crate::events::{NavEvent, NavInput};
use crate::geo::{Coordinate, LocationMethod};

/// Identity of one route calculation, used to drop superseded completions.
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Pedestrian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    #[default]
    Fastest,
    Shortest,
    Balanced,
}

/// Immutable description of one route calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub transport_mode: TransportMode,
    pub route_type: RouteType,
    /// Indoor map region the router needs for indoor path computation.
    pub overlay_id: String,
}

impl RouteRequest {
    pub fn pedestrian(
        origin: Coordinate,
        destination: Coordinate,
        route_type: RouteType,
        overlay_id: impl Into<String>,
    ) -> Self {
        Self {
            origin,
            destination,
            transport_mode: TransportMode::Pedestrian,
            route_type,
            overlay_id: overlay_id.into(),
        }
    }
}

/// One instruction within a route's turn-by-turn sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub instruction: String,
    pub at: Coordinate,
    #[serde(default)]
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub geometry: Vec<Coordinate>,
    pub maneuvers: Vec<Maneuver>,
    #[serde(default)]
    pub length_m: f64,
}

/// Error code reported by the router alongside an empty or partial result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no route between origin and destination")]
    NoRoute,
    #[error("invalid route parameters")]
    InvalidParameters,
    #[error("origin and destination are on disconnected graph regions")]
    GraphDisconnected,
    #[error("network communication failure")]
    NetworkCommunication,
    #[error("calculation cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Best-effort cancellation of an in-flight calculation.
pub trait Cancellable: Send {
    fn cancel(&self);
}

/// Shared cancellation flag; the router polls it, the session sets it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Cancellable for CancelToken {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Completion handle handed to the router with each request.
#[derive(Debug)]
pub struct RouteReply {
    request_id: RequestId,
    input: NavInput,
}

impl RouteReply {
    pub(crate) fn new(request_id: RequestId, input: NavInput) -> Self {
        Self { request_id, input }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Deliver the outcome. Returns false when the event loop is gone.
    pub fn send(self, result: Result<Vec<RouteResult>, RoutingError>) -> bool {
        self.input.send(NavEvent::RouteCalculated {
            request_id: self.request_id,
            result,
        })
    }
}

pub trait Router: Send + Sync {
    /// Start an asynchronous calculation; the outcome arrives through `reply`.
    fn calculate_route(&self, request: RouteRequest, reply: RouteReply) -> Box<dyn Cancellable>;
}

/// Owned registration with a positioning source. Released by `unsubscribe`.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

pub trait PositioningSource: Send + Sync {
    /// Register for `PositionFix` and `LocationMethodChanged` events.
    fn subscribe(&self, input: NavInput) -> Subscription;
    fn unsubscribe(&self, subscription: Subscription);
    /// Returns false when the source refuses to start.
    fn start(&self, method: LocationMethod) -> bool;
    fn stop(&self);
}

/// Notification from the turn-by-turn guidance engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuidanceEvent {
    ManeuverChanged { maneuver: Maneuver },
    /// The user left the active route.
    RerouteBegin,
    RerouteEnd {
        #[serde(default)]
        route: Option<RouteResult>,
    },
    Arrival,
    LaneInfo { lanes: Vec<String> },
}

/// Delivery handle a guidance engine uses for the route it was started on.
#[derive(Debug, Clone)]
pub struct GuidanceFeed {
    input: NavInput,
}

impl GuidanceFeed {
    pub(crate) fn new(input: NavInput) -> Self {
        Self { input }
    }

    /// Returns false when the event loop is gone.
    pub fn send(&self, event: GuidanceEvent) -> bool {
        self.input.send(NavEvent::Guidance(event))
    }
}

pub trait GuidanceEngine: Send + Sync {
    /// Follow `route`, reporting maneuvers, deviations, and arrival on `feed`
    /// until stopped.
    fn start(&self, route: &RouteResult, feed: GuidanceFeed);
    fn stop(&self);
    fn is_active(&self) -> bool;
}

/// Identity of one speech capture, used to drop results of a cancelled one.
pub type CaptureId = u64;

/// Result handle handed to speech capture each time listening starts.
/// Consumed by whichever outcome the capture produces.
#[derive(Debug)]
pub struct CaptureReply {
    capture_id: CaptureId,
    input: NavInput,
}

impl CaptureReply {
    pub(crate) fn new(capture_id: CaptureId, input: NavInput) -> Self {
        Self { capture_id, input }
    }

    pub fn capture_id(&self) -> CaptureId {
        self.capture_id
    }

    pub fn transcript(self, text: impl Into<String>) -> bool {
        self.input.send(NavEvent::Transcript {
            capture_id: self.capture_id,
            text: text.into(),
        })
    }

    /// Capture finished without recognising anything.
    pub fn ended(self) -> bool {
        self.input.send(NavEvent::CaptureEnded {
            capture_id: self.capture_id,
        })
    }
}

pub trait SpeechCapture: Send + Sync {
    /// Begin capture; the outcome arrives through `reply`.
    fn start_listening(&self, reply: CaptureReply);
    fn stop_listening(&self);
    /// Best effort. A result already in flight is dropped by capture id.
    fn cancel_if_listening(&self);
}

/// Queued, non-interrupting speech playback.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
}

/// Handle to an object drawn on the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderRef(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolylineStyle {
    /// ARGB color.
    pub color: u32,
    pub width_px: u8,
    pub primary: bool,
}

impl PolylineStyle {
    pub const PRIMARY_ROUTE: Self = Self {
        color: 0xFF00_FF00,
        width_px: 8,
        primary: true,
    };
}

pub trait Renderer: Send + Sync {
    fn draw_polyline(&self, geometry: &[Coordinate], style: PolylineStyle) -> RenderRef;
    fn remove_object(&self, object: RenderRef);
    fn remove_all(&self);
}

/// Position indicator surface; owned exclusively by the position tracker.
pub trait PositionDisplay: Send + Sync {
    fn recenter(&self, at: Coordinate);
    fn show_position_info(&self, summary: &str);
}

/// Every collaborator the orchestrator drives, wired once at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub positioning: Arc<dyn PositioningSource>,
    pub display: Arc<dyn PositionDisplay>,
    pub router: Arc<dyn Router>,
    pub renderer: Arc<dyn Renderer>,
    pub guidance: Arc<dyn GuidanceEngine>,
    pub capture: Arc<dyn SpeechCapture>,
    pub speech: Arc<dyn SpeechOutput>,
}
