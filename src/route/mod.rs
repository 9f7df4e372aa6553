//! Route session state machine: request lifecycle, cancellation, rerouting,
//! and render hand-off.
//!
//! At most one calculation is pending at a time. Completions are matched
//! against the pending request id, so a result that races a `stop()` or a
//! newer request is dropped even if the router ignored the cancellation.

mod state;

pub use state::{SessionOutcome, SessionState};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collaborators::{
    Cancellable, GuidanceEngine, GuidanceFeed, PolylineStyle, RenderRef, Renderer, RequestId, RouteReply,
    RouteRequest, RouteResult, RouteType, Router, RoutingError,
};
use crate::error::{NavError, Result};
use crate::events::NavInput;
use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Initial,
    Reroute,
}

struct PendingRequest {
    id: RequestId,
    kind: RequestKind,
    handle: Box<dyn Cancellable>,
}

/// The most recent successfully calculated route and its drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRoute {
    pub route: RouteResult,
    pub rendered: RenderRef,
}

/// Result of feeding a route completion into the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    RouteReady,
    RouteFailed(RoutingError),
    Rerouted,
    RerouteFailed(RoutingError),
    /// Completion belonged to a superseded request and was dropped.
    Stale,
}

pub struct RouteSession {
    router: Arc<dyn Router>,
    renderer: Arc<dyn Renderer>,
    guidance: Arc<dyn GuidanceEngine>,
    input: NavInput,
    route_type: RouteType,
    overlay_id: String,
    state: SessionState,
    next_request_id: RequestId,
    pending: Option<PendingRequest>,
    trip: Option<RouteRequest>,
    active: Option<ActiveRoute>,
    last_outcome: Option<SessionOutcome>,
}

impl RouteSession {
    pub fn new(
        router: Arc<dyn Router>,
        renderer: Arc<dyn Renderer>,
        guidance: Arc<dyn GuidanceEngine>,
        input: NavInput,
        route_type: RouteType,
        overlay_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            renderer,
            guidance,
            input,
            route_type,
            overlay_id: overlay_id.into(),
            state: SessionState::Idle,
            next_request_id: 1,
            pending: None,
            trip: None,
            active: None,
            last_outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_route(&self) -> Option<&ActiveRoute> {
        self.active.as_ref()
    }

    /// The request the current session was started with.
    pub fn trip(&self) -> Option<&RouteRequest> {
        self.trip.as_ref()
    }

    pub fn pending_request(&self) -> Option<(RequestId, RequestKind)> {
        self.pending.as_ref().map(|pending| (pending.id, pending.kind))
    }

    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.last_outcome
    }

    /// Begin a new session. Rejected unless the session is idle.
    pub fn start(&mut self, origin: Coordinate, destination: Coordinate) -> Result<RequestId> {
        if self.state != SessionState::Idle {
            return Err(NavError::SessionBusy { state: self.state });
        }
        let request =
            RouteRequest::pedestrian(origin, destination, self.route_type, self.overlay_id.clone());
        self.trip = Some(request.clone());
        let id = self.issue(request, RequestKind::Initial);
        self.transition(SessionState::Calculating);
        Ok(id)
    }

    fn issue(&mut self, request: RouteRequest, kind: RequestKind) -> RequestId {
        if let Some(previous) = self.pending.take() {
            debug!(request_id = previous.id, "cancelling superseded route request");
            previous.handle.cancel();
        }
        let id = self.next_request_id;
        self.next_request_id += 1;
        info!(
            request_id = id,
            ?kind,
            origin = %request.origin,
            destination = %request.destination,
            overlay = %request.overlay_id,
            "requesting route"
        );
        let handle = self
            .router
            .calculate_route(request, RouteReply::new(id, self.input.clone()));
        self.pending = Some(PendingRequest { id, kind, handle });
        id
    }

    pub fn on_route_calculated(
        &mut self,
        request_id: RequestId,
        result: std::result::Result<Vec<RouteResult>, RoutingError>,
    ) -> SessionNotice {
        let kind = match &self.pending {
            Some(pending) if pending.id == request_id => pending.kind,
            _ => {
                debug!(request_id, state = %self.state, "dropping stale route completion");
                return SessionNotice::Stale;
            }
        };
        self.pending = None;

        let outcome = result.and_then(|routes| routes.into_iter().next().ok_or(RoutingError::NoRoute));
        match (kind, outcome) {
            (RequestKind::Initial, Ok(route)) => {
                self.install(route);
                self.transition(SessionState::Navigating);
                SessionNotice::RouteReady
            }
            (RequestKind::Initial, Err(error)) => {
                warn!(request_id, %error, "route calculation failed");
                self.trip = None;
                self.last_outcome = Some(SessionOutcome::Failed);
                self.transition(SessionState::Idle);
                SessionNotice::RouteFailed(error)
            }
            (RequestKind::Reroute, Ok(route)) => {
                self.install(route);
                self.transition(SessionState::Navigating);
                SessionNotice::Rerouted
            }
            (RequestKind::Reroute, Err(error)) => {
                warn!(request_id, %error, "reroute failed; keeping previous route");
                self.transition(SessionState::Navigating);
                SessionNotice::RerouteFailed(error)
            }
        }
    }

    /// Replace the drawn route and (re)start guidance on it.
    fn install(&mut self, route: RouteResult) {
        if let Some(old) = self.active.take() {
            self.renderer.remove_object(old.rendered);
        }
        let rendered = self
            .renderer
            .draw_polyline(&route.geometry, PolylineStyle::PRIMARY_ROUTE);
        if self.guidance.is_active() {
            self.guidance.stop();
        }
        self.guidance
            .start(&route, GuidanceFeed::new(self.input.clone()));
        debug!(
            points = route.geometry.len(),
            maneuvers = route.maneuvers.len(),
            length_m = route.length_m,
            "route installed"
        );
        self.active = Some(ActiveRoute { route, rendered });
    }

    /// Recalculate from `origin` to the original destination. Returns true
    /// when a reroute was issued.
    pub fn on_deviation_detected(&mut self, origin: Option<Coordinate>) -> bool {
        if self.state != SessionState::Navigating {
            debug!(state = %self.state, "ignoring deviation outside navigation");
            return false;
        }
        let Some(destination) = self.trip.as_ref().map(|trip| trip.destination) else {
            return false;
        };
        let Some(origin) = origin else {
            warn!("deviation detected without a position fix; staying on current route");
            return false;
        };
        let request =
            RouteRequest::pedestrian(origin, destination, self.route_type, self.overlay_id.clone());
        self.issue(request, RequestKind::Reroute);
        self.transition(SessionState::Rerouting);
        true
    }

    /// Returns true the first time arrival is reported for a live session.
    pub fn on_arrival(&mut self) -> bool {
        if !matches!(self.state, SessionState::Navigating | SessionState::Rerouting) {
            debug!(state = %self.state, "ignoring arrival outside navigation");
            return false;
        }
        self.teardown();
        self.last_outcome = Some(SessionOutcome::Arrived);
        self.transition(SessionState::Arrived);
        self.transition(SessionState::Idle);
        true
    }

    /// Cancel everything and return to idle. Returns false if already idle.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        self.teardown();
        self.last_outcome = Some(SessionOutcome::Cancelled);
        self.transition(SessionState::Cancelled);
        self.transition(SessionState::Idle);
        true
    }

    fn teardown(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(request_id = pending.id, "cancelling in-flight route request");
            pending.handle.cancel();
        }
        if self.guidance.is_active() {
            self.guidance.stop();
        }
        if let Some(active) = self.active.take() {
            self.renderer.remove_object(active.rendered);
        }
        self.trip = None;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "session transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::GuidanceEvent;
    use crate::events::NavEvent;
    use crate::sim::{SimGuidance, SimLog, SimOutput, SimRenderer, SimRouter};
    use crossbeam_channel::Receiver;

    const ORIGIN: Coordinate = Coordinate::new(35.6150, -82.5660);
    const ROOM_114: Coordinate = Coordinate::new(35.61533, -82.56592);

    struct Harness {
        session: RouteSession,
        router: Arc<SimRouter>,
        renderer: Arc<SimRenderer>,
        guidance: Arc<SimGuidance>,
        log: SimLog,
        rx: Receiver<NavEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let log = SimLog::new();
            let (input, rx) = NavInput::channel();
            let router = Arc::new(SimRouter::manual());
            let renderer = Arc::new(SimRenderer::new(log.clone()));
            let guidance = Arc::new(SimGuidance::new(log.clone()));
            let session = RouteSession::new(
                router.clone(),
                renderer.clone(),
                guidance.clone(),
                input,
                RouteType::Fastest,
                "DM_15755",
            );
            Self {
                session,
                router,
                renderer,
                guidance,
                log,
                rx,
            }
        }

        /// Feed every queued completion into the session.
        fn deliver(&mut self) -> Vec<SessionNotice> {
            let events: Vec<NavEvent> = self.rx.try_iter().collect();
            events
                .into_iter()
                .filter_map(|event| match event {
                    NavEvent::RouteCalculated { request_id, result } => {
                        Some(self.session.on_route_calculated(request_id, result))
                    }
                    _ => None,
                })
                .collect()
        }

        fn navigate(&mut self) {
            self.session.start(ORIGIN, ROOM_114).expect("start");
            self.router.complete_next();
            assert_eq!(self.deliver(), vec![SessionNotice::RouteReady]);
        }
    }

    #[test]
    fn start_then_success_renders_and_navigates() {
        let mut h = Harness::new();
        let id = h.session.start(ORIGIN, ROOM_114).expect("start");
        assert_eq!(h.session.state(), SessionState::Calculating);
        assert_eq!(h.session.pending_request(), Some((id, RequestKind::Initial)));

        h.router.complete_next();
        assert_eq!(h.deliver(), vec![SessionNotice::RouteReady]);
        assert_eq!(h.session.state(), SessionState::Navigating);
        assert_eq!(h.renderer.visible().len(), 1);
        assert!(h.guidance.is_active());

        let request = &h.router.requests()[0];
        assert_eq!(request.destination, ROOM_114);
        assert_eq!(request.overlay_id, "DM_15755");
    }

    #[test]
    fn guidance_reports_into_the_session_queue() {
        let mut h = Harness::new();
        h.navigate();
        assert!(h.guidance.emit(GuidanceEvent::Arrival));
        assert!(matches!(
            h.rx.try_recv(),
            Ok(NavEvent::Guidance(GuidanceEvent::Arrival))
        ));

        assert!(h.session.on_arrival());
        assert!(!h.guidance.emit(GuidanceEvent::Arrival));
    }

    #[test]
    fn start_is_rejected_while_not_idle() {
        let mut h = Harness::new();
        h.session.start(ORIGIN, ROOM_114).expect("start");
        let err = h.session.start(ORIGIN, ROOM_114).unwrap_err();
        assert!(matches!(
            err,
            NavError::SessionBusy {
                state: SessionState::Calculating
            }
        ));
        assert_eq!(h.router.requests().len(), 1);
    }

    #[test]
    fn completion_after_stop_is_a_no_op() {
        let mut h = Harness::new();
        h.session.start(ORIGIN, ROOM_114).expect("start");
        assert!(h.session.stop());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.router.next_held_cancelled(), Some(true));

        h.router.complete_next();
        assert_eq!(h.deliver(), vec![SessionNotice::Stale]);
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.session.active_route().is_none());
        assert_eq!(h.log.count(|o| matches!(o, SimOutput::Draw { .. })), 0);
    }

    #[test]
    fn completion_for_superseded_request_is_dropped() {
        let mut h = Harness::new();
        h.session.start(ORIGIN, ROOM_114).expect("first start");
        h.session.stop();
        let second = h.session.start(ORIGIN, ROOM_114).expect("second start");

        // Oldest held request is the superseded one.
        h.router.complete_next();
        assert_eq!(h.deliver(), vec![SessionNotice::Stale]);
        assert_eq!(h.session.state(), SessionState::Calculating);

        assert_eq!(h.router.complete_next(), Some(second));
        assert_eq!(h.deliver(), vec![SessionNotice::RouteReady]);
        assert_eq!(h.renderer.visible().len(), 1);
    }

    #[test]
    fn failed_calculation_returns_to_idle() {
        let mut h = Harness::new();
        h.session.start(ORIGIN, ROOM_114).expect("start");
        h.router.fail_held(RoutingError::GraphDisconnected);
        assert_eq!(
            h.deliver(),
            vec![SessionNotice::RouteFailed(RoutingError::GraphDisconnected)]
        );
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.session.trip().is_none());
        assert_eq!(h.session.last_outcome(), Some(SessionOutcome::Failed));
    }

    #[test]
    fn empty_route_list_counts_as_failure() {
        let mut h = Harness::new();
        let id = h.session.start(ORIGIN, ROOM_114).expect("start");
        assert_eq!(
            h.session.on_route_calculated(id, Ok(Vec::new())),
            SessionNotice::RouteFailed(RoutingError::NoRoute)
        );
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn reroute_replaces_the_drawn_route() {
        let mut h = Harness::new();
        h.navigate();
        let first = h.session.active_route().expect("route").rendered;

        let off_route = Coordinate::new(35.6149, -82.5662);
        assert!(h.session.on_deviation_detected(Some(off_route)));
        assert_eq!(h.session.state(), SessionState::Rerouting);
        assert!(!h.session.on_deviation_detected(Some(off_route)));

        h.router.complete_next();
        assert_eq!(h.deliver(), vec![SessionNotice::Rerouted]);
        assert_eq!(h.session.state(), SessionState::Navigating);
        let second = h.session.active_route().expect("route").rendered;
        assert_ne!(first, second);
        assert_eq!(h.renderer.visible(), vec![second]);
        assert_eq!(h.router.requests()[1].origin, off_route);
        assert_eq!(h.router.requests()[1].destination, ROOM_114);
    }

    #[test]
    fn failed_reroute_keeps_previous_route() {
        let mut h = Harness::new();
        h.navigate();
        let before = h.session.active_route().cloned();

        assert!(h.session.on_deviation_detected(Some(ORIGIN)));
        h.router.fail_held(RoutingError::NetworkCommunication);
        assert!(matches!(
            h.deliver().as_slice(),
            [SessionNotice::RerouteFailed(RoutingError::NetworkCommunication)]
        ));
        assert_eq!(h.session.state(), SessionState::Navigating);
        assert_eq!(h.session.active_route().cloned(), before);
        assert_eq!(h.router.requests().len(), 2);
    }

    #[test]
    fn deviation_without_fix_stays_on_route() {
        let mut h = Harness::new();
        h.navigate();
        assert!(!h.session.on_deviation_detected(None));
        assert_eq!(h.session.state(), SessionState::Navigating);
    }

    #[test]
    fn arrival_is_reported_once_and_clears_the_route() {
        let mut h = Harness::new();
        h.navigate();
        assert!(h.session.on_arrival());
        assert!(!h.session.on_arrival());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.session.last_outcome(), Some(SessionOutcome::Arrived));
        assert!(h.renderer.visible().is_empty());
        assert!(!h.guidance.is_active());
    }

    #[test]
    fn arrival_during_reroute_cancels_the_reroute() {
        let mut h = Harness::new();
        h.navigate();
        h.session.on_deviation_detected(Some(ORIGIN));
        assert!(h.session.on_arrival());
        assert_eq!(h.router.next_held_cancelled(), Some(true));
        h.router.complete_next();
        assert_eq!(h.deliver(), vec![SessionNotice::Stale]);
        assert!(h.renderer.visible().is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut h = Harness::new();
        assert!(!h.session.stop());
        h.navigate();
        assert!(h.session.stop());
        assert!(!h.session.stop());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.renderer.visible().is_empty());
        assert_eq!(h.log.count(|o| matches!(o, SimOutput::GuidanceStop)), 1);
    }
}
