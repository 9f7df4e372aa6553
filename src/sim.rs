//! In-memory collaborators for the replay binary and for tests.
//!
//! Every observable side effect is appended to a shared [`SimLog`], so a
//! test (or the replay harness) sees one ordered stream of speech, drawing,
//! and capture activity.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::collaborators::{
    CancelToken, Cancellable, CaptureReply, Collaborators, GuidanceEngine, GuidanceEvent,
    GuidanceFeed, Maneuver, PolylineStyle, PositionDisplay, PositioningSource, RenderRef,
    RouteReply, RouteRequest, RouteResult, Router, RoutingError, SpeechCapture, SpeechOutput,
    Subscription,
};
use crate::events::{NavEvent, NavInput};
use crate::geo::{Coordinate, LocationMethod, Position};
use crate::lock::lock_or_recover;

/// One observable collaborator side effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimOutput {
    Speak { text: String },
    Draw { id: u64, points: usize },
    Remove { id: u64 },
    RemoveAll,
    Recenter { lat: f64, lon: f64 },
    PositionInfo { summary: String },
    ListenStart,
    ListenStop,
    ListenCancel,
    GuidanceStart { maneuvers: usize },
    GuidanceStop,
    PositioningStart { method: String, accepted: bool },
    PositioningStop,
}

type OutputTap = Arc<dyn Fn(&SimOutput) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SimLog {
    entries: Arc<Mutex<Vec<SimOutput>>>,
    tap: Option<OutputTap>,
}

impl SimLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that also forwards every entry to `tap` as it is recorded.
    pub fn with_tap(tap: impl Fn(&SimOutput) + Send + Sync + 'static) -> Self {
        Self {
            entries: Arc::default(),
            tap: Some(Arc::new(tap)),
        }
    }

    pub fn record(&self, output: SimOutput) {
        if let Some(tap) = &self.tap {
            tap(&output);
        }
        lock_or_recover(&self.entries, "sim::SimLog::record").push(output);
    }

    pub fn outputs(&self) -> Vec<SimOutput> {
        lock_or_recover(&self.entries, "sim::SimLog::outputs").clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.outputs()
            .into_iter()
            .filter_map(|output| match output {
                SimOutput::Speak { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&SimOutput) -> bool) -> usize {
        lock_or_recover(&self.entries, "sim::SimLog::count")
            .iter()
            .filter(|output| predicate(output))
            .count()
    }

    pub fn clear(&self) {
        lock_or_recover(&self.entries, "sim::SimLog::clear").clear();
    }
}

impl std::fmt::Debug for SimLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimLog")
            .field("entries", &self.outputs().len())
            .finish()
    }
}

pub struct SimPositioning {
    log: SimLog,
    accept_start: AtomicBool,
    next_subscription: AtomicU64,
    subscribers: Mutex<Vec<(u64, NavInput)>>,
}

impl SimPositioning {
    pub fn new(log: SimLog) -> Self {
        Self {
            log,
            accept_start: AtomicBool::new(true),
            next_subscription: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_accept_start(&self, accept: bool) {
        self.accept_start.store(accept, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.subscribers, "sim::SimPositioning::subscriber_count").len()
    }

    /// Deliver a fix to every subscriber. Returns how many received it.
    pub fn emit_fix(&self, position: Position) -> usize {
        let subscribers = lock_or_recover(&self.subscribers, "sim::SimPositioning::emit_fix");
        subscribers
            .iter()
            .filter(|(_, input)| input.send(NavEvent::PositionFix(position.clone())))
            .count()
    }
}

impl PositioningSource for SimPositioning {
    fn subscribe(&self, input: NavInput) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        lock_or_recover(&self.subscribers, "sim::SimPositioning::subscribe").push((id, input));
        Subscription::new(id)
    }

    fn unsubscribe(&self, subscription: Subscription) {
        lock_or_recover(&self.subscribers, "sim::SimPositioning::unsubscribe")
            .retain(|(id, _)| *id != subscription.id());
    }

    fn start(&self, method: LocationMethod) -> bool {
        let accepted = self.accept_start.load(Ordering::SeqCst);
        self.log.record(SimOutput::PositioningStart {
            method: method.to_string(),
            accepted,
        });
        accepted
    }

    fn stop(&self) {
        self.log.record(SimOutput::PositioningStop);
    }
}

struct HeldRequest {
    request: RouteRequest,
    reply: RouteReply,
    token: CancelToken,
}

/// Router that either answers straight away with a straight-line route or
/// holds requests until the test completes them.
pub struct SimRouter {
    hold: bool,
    fail_next: AtomicBool,
    held: Mutex<VecDeque<HeldRequest>>,
    history: Mutex<Vec<(RouteRequest, CancelToken)>>,
}

impl SimRouter {
    pub fn immediate() -> Self {
        Self::with_hold(false)
    }

    pub fn manual() -> Self {
        Self::with_hold(true)
    }

    fn with_hold(hold: bool) -> Self {
        Self {
            hold,
            fail_next: AtomicBool::new(false),
            held: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Make the next calculation fail with `NoRoute`.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        lock_or_recover(&self.history, "sim::SimRouter::requests")
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn cancelled_count(&self) -> usize {
        lock_or_recover(&self.history, "sim::SimRouter::cancelled_count")
            .iter()
            .filter(|(_, token)| token.is_cancelled())
            .count()
    }

    pub fn held_count(&self) -> usize {
        lock_or_recover(&self.held, "sim::SimRouter::held_count").len()
    }

    /// Complete the oldest held request with a straight-line route, even if
    /// it was cancelled. Returns its request id.
    pub fn complete_next(&self) -> Option<u64> {
        let held = lock_or_recover(&self.held, "sim::SimRouter::complete_next").pop_front()?;
        let id = held.reply.request_id();
        held.reply.send(Ok(vec![straight_line_route(&held.request)]));
        Some(id)
    }

    pub fn fail_held(&self, error: RoutingError) -> Option<u64> {
        let held = lock_or_recover(&self.held, "sim::SimRouter::fail_held").pop_front()?;
        let id = held.reply.request_id();
        held.reply.send(Err(error));
        Some(id)
    }

    /// Whether the oldest held request has been cancelled by the session.
    pub fn next_held_cancelled(&self) -> Option<bool> {
        lock_or_recover(&self.held, "sim::SimRouter::next_held_cancelled")
            .front()
            .map(|held| held.token.is_cancelled())
    }
}

impl Router for SimRouter {
    fn calculate_route(&self, request: RouteRequest, reply: RouteReply) -> Box<dyn Cancellable> {
        let token = CancelToken::new();
        lock_or_recover(&self.history, "sim::SimRouter::calculate_route")
            .push((request.clone(), token.clone()));

        if self.hold {
            lock_or_recover(&self.held, "sim::SimRouter::calculate_route").push_back(
                HeldRequest {
                    request,
                    reply,
                    token: token.clone(),
                },
            );
        } else if self.fail_next.swap(false, Ordering::SeqCst) {
            reply.send(Err(RoutingError::NoRoute));
        } else {
            reply.send(Ok(vec![straight_line_route(&request)]));
        }
        Box::new(token)
    }
}

/// Two-point route with a departure and an arrival maneuver.
pub fn straight_line_route(request: &RouteRequest) -> RouteResult {
    let (from, to) = (request.origin, request.destination);
    let length_m = approximate_distance_m(from, to);
    RouteResult {
        geometry: vec![from, to],
        maneuvers: vec![
            Maneuver {
                instruction: "Head straight toward your destination".to_string(),
                at: from,
                distance_m: length_m,
            },
            Maneuver {
                instruction: "Arrive at your destination".to_string(),
                at: to,
                distance_m: 0.0,
            },
        ],
        length_m,
    }
}

fn approximate_distance_m(a: Coordinate, b: Coordinate) -> f64 {
    const METERS_PER_DEGREE: f64 = 111_320.0;
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let dx = (b.lon - a.lon) * METERS_PER_DEGREE * mean_lat.cos();
    let dy = (b.lat - a.lat) * METERS_PER_DEGREE;
    (dx * dx + dy * dy).sqrt()
}

/// Guidance that stays silent until the driver reports progress through
/// [`SimGuidance::emit`].
pub struct SimGuidance {
    log: SimLog,
    feed: Mutex<Option<GuidanceFeed>>,
}

impl SimGuidance {
    pub fn new(log: SimLog) -> Self {
        Self {
            log,
            feed: Mutex::new(None),
        }
    }

    /// Report `event` for the route being followed. Returns false when
    /// guidance is stopped or the event loop is gone.
    pub fn emit(&self, event: GuidanceEvent) -> bool {
        lock_or_recover(&self.feed, "sim::SimGuidance::emit")
            .as_ref()
            .is_some_and(|feed| feed.send(event))
    }
}

impl GuidanceEngine for SimGuidance {
    fn start(&self, route: &RouteResult, feed: GuidanceFeed) {
        *lock_or_recover(&self.feed, "sim::SimGuidance::start") = Some(feed);
        self.log.record(SimOutput::GuidanceStart {
            maneuvers: route.maneuvers.len(),
        });
    }

    fn stop(&self) {
        lock_or_recover(&self.feed, "sim::SimGuidance::stop").take();
        self.log.record(SimOutput::GuidanceStop);
    }

    fn is_active(&self) -> bool {
        lock_or_recover(&self.feed, "sim::SimGuidance::is_active").is_some()
    }
}

/// Capture that holds its reply until the driver says what was heard.
pub struct SimSpeechCapture {
    log: SimLog,
    pending: Mutex<Option<CaptureReply>>,
}

impl SimSpeechCapture {
    pub fn new(log: SimLog) -> Self {
        Self {
            log,
            pending: Mutex::new(None),
        }
    }

    pub fn is_listening(&self) -> bool {
        lock_or_recover(&self.pending, "sim::SimSpeechCapture::is_listening").is_some()
    }

    /// Finish the current capture with `text`. Returns false when nothing
    /// is listening.
    pub fn hear(&self, text: impl Into<String>) -> bool {
        let reply = lock_or_recover(&self.pending, "sim::SimSpeechCapture::hear").take();
        reply.is_some_and(|reply| reply.transcript(text))
    }

    /// Finish the current capture without a transcript, as on silence.
    pub fn hear_nothing(&self) -> bool {
        let reply = lock_or_recover(&self.pending, "sim::SimSpeechCapture::hear_nothing").take();
        reply.is_some_and(CaptureReply::ended)
    }
}

impl SpeechCapture for SimSpeechCapture {
    fn start_listening(&self, reply: CaptureReply) {
        *lock_or_recover(&self.pending, "sim::SimSpeechCapture::start_listening") = Some(reply);
        self.log.record(SimOutput::ListenStart);
    }

    fn stop_listening(&self) {
        let reply = lock_or_recover(&self.pending, "sim::SimSpeechCapture::stop_listening").take();
        self.log.record(SimOutput::ListenStop);
        if let Some(reply) = reply {
            reply.ended();
        }
    }

    fn cancel_if_listening(&self) {
        let reply =
            lock_or_recover(&self.pending, "sim::SimSpeechCapture::cancel_if_listening").take();
        if reply.is_some() {
            self.log.record(SimOutput::ListenCancel);
        }
    }
}

pub struct SimSpeechOutput {
    log: SimLog,
}

impl SimSpeechOutput {
    pub fn new(log: SimLog) -> Self {
        Self { log }
    }
}

impl SpeechOutput for SimSpeechOutput {
    fn speak(&self, text: &str) {
        self.log.record(SimOutput::Speak {
            text: text.to_string(),
        });
    }
}

pub struct SimRenderer {
    log: SimLog,
    next_id: AtomicU64,
    visible: Mutex<Vec<RenderRef>>,
}

impl SimRenderer {
    pub fn new(log: SimLog) -> Self {
        Self {
            log,
            next_id: AtomicU64::new(1),
            visible: Mutex::new(Vec::new()),
        }
    }

    /// Objects currently on the map surface.
    pub fn visible(&self) -> Vec<RenderRef> {
        lock_or_recover(&self.visible, "sim::SimRenderer::visible").clone()
    }
}

impl crate::collaborators::Renderer for SimRenderer {
    fn draw_polyline(&self, geometry: &[Coordinate], _style: PolylineStyle) -> RenderRef {
        let object = RenderRef(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock_or_recover(&self.visible, "sim::SimRenderer::draw_polyline").push(object);
        self.log.record(SimOutput::Draw {
            id: object.0,
            points: geometry.len(),
        });
        object
    }

    fn remove_object(&self, object: RenderRef) {
        lock_or_recover(&self.visible, "sim::SimRenderer::remove_object")
            .retain(|visible| *visible != object);
        self.log.record(SimOutput::Remove { id: object.0 });
    }

    fn remove_all(&self) {
        lock_or_recover(&self.visible, "sim::SimRenderer::remove_all").clear();
        self.log.record(SimOutput::RemoveAll);
    }
}

pub struct SimDisplay {
    log: SimLog,
}

impl SimDisplay {
    pub fn new(log: SimLog) -> Self {
        Self { log }
    }
}

impl PositionDisplay for SimDisplay {
    fn recenter(&self, at: Coordinate) {
        self.log.record(SimOutput::Recenter {
            lat: at.lat,
            lon: at.lon,
        });
    }

    fn show_position_info(&self, summary: &str) {
        self.log.record(SimOutput::PositionInfo {
            summary: summary.to_string(),
        });
    }
}

/// Full set of simulated collaborators sharing one log.
pub struct SimCollaborators {
    pub log: SimLog,
    pub positioning: Arc<SimPositioning>,
    pub router: Arc<SimRouter>,
    pub guidance: Arc<SimGuidance>,
    pub capture: Arc<SimSpeechCapture>,
    pub speech: Arc<SimSpeechOutput>,
    pub renderer: Arc<SimRenderer>,
    pub display: Arc<SimDisplay>,
}

impl SimCollaborators {
    pub fn new(log: SimLog, router: SimRouter) -> Self {
        Self {
            positioning: Arc::new(SimPositioning::new(log.clone())),
            router: Arc::new(router),
            guidance: Arc::new(SimGuidance::new(log.clone())),
            capture: Arc::new(SimSpeechCapture::new(log.clone())),
            speech: Arc::new(SimSpeechOutput::new(log.clone())),
            renderer: Arc::new(SimRenderer::new(log.clone())),
            display: Arc::new(SimDisplay::new(log.clone())),
            log,
        }
    }

    pub fn bundle(&self) -> Collaborators {
        Collaborators {
            positioning: self.positioning.clone(),
            display: self.display.clone(),
            router: self.router.clone(),
            renderer: self.renderer.clone(),
            guidance: self.guidance.clone(),
            capture: self.capture.clone(),
            speech: self.speech.clone(),
        }
    }
}
