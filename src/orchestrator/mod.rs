//! Navigation orchestrator: the single owner of tracker, session, and voice
//! state. Every collaborator callback arrives as a [`NavEvent`] and is
//! dispatched through [`NavigationOrchestrator::handle`].

mod runtime;

pub use runtime::NavigationRuntime;

use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collaborators::{
    CaptureId, CaptureReply, Collaborators, GuidanceEvent, RouteType, SpeechCapture,
};
use crate::config::DEFAULT_OVERLAY_ID;
use crate::destination::{resolve, DestinationDirectory, Resolution};
use crate::error::{NavError, Result};
use crate::events::{NavEvent, NavInput};
use crate::geo::{Coordinate, LocationMethod};
use crate::position::{FixOutcome, PositionTracker};
use crate::route::{RouteSession, SessionNotice, SessionState};
use crate::voice::{Announcement, VoiceGuidanceGate, VoicePhrases};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationSettings {
    pub location_method: LocationMethod,
    pub route_type: RouteType,
    pub overlay_id: String,
    pub phrases: VoicePhrases,
    /// Allow transcript text in logs.
    pub log_content: bool,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            location_method: LocationMethod::default(),
            route_type: RouteType::default(),
            overlay_id: DEFAULT_OVERLAY_ID.to_string(),
            phrases: VoicePhrases::default(),
            log_content: false,
        }
    }
}

/// Called with the new state whenever handling an event changes it.
pub type StateObserver = Box<dyn FnMut(SessionState) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Shutdown,
}

pub struct NavigationOrchestrator {
    tracker: PositionTracker,
    directory: Arc<DestinationDirectory>,
    session: RouteSession,
    voice: VoiceGuidanceGate,
    capture: Arc<dyn SpeechCapture>,
    input: NavInput,
    events: Receiver<NavEvent>,
    /// Capture whose result is still wanted.
    active_capture: Option<CaptureId>,
    next_capture_id: CaptureId,
    log_content: bool,
    observer: Option<StateObserver>,
}

impl NavigationOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        directory: Arc<DestinationDirectory>,
        settings: NavigationSettings,
    ) -> Self {
        let (input, events) = NavInput::channel();
        let tracker = PositionTracker::new(
            collaborators.positioning,
            collaborators.display,
            settings.location_method,
        );
        let session = RouteSession::new(
            collaborators.router,
            collaborators.renderer,
            collaborators.guidance,
            input.clone(),
            settings.route_type,
            settings.overlay_id,
        );
        Self {
            tracker,
            directory,
            session,
            voice: VoiceGuidanceGate::new(collaborators.speech, settings.phrases),
            capture: collaborators.capture,
            input,
            events,
            active_capture: None,
            next_capture_id: 1,
            log_content: settings.log_content,
            observer: None,
        }
    }

    pub fn with_state_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle for collaborators and other threads to submit events.
    pub fn input(&self) -> NavInput {
        self.input.clone()
    }

    /// Subscribe to positioning and start the source. A refusal is announced
    /// and returned; the orchestrator stays usable.
    pub fn start(&mut self) -> Result<()> {
        let result = self.tracker.start(self.input.clone());
        if result.is_err() {
            self.voice.announce(Announcement::PositioningFailed);
        }
        result
    }

    pub fn state(&self) -> SessionState {
        match self.session.state() {
            SessionState::Idle if self.active_capture.is_some() => {
                SessionState::AwaitingDestination
            }
            state => state,
        }
    }

    pub fn has_fix(&self) -> bool {
        self.tracker.has_fix()
    }

    pub fn is_capturing(&self) -> bool {
        self.active_capture.is_some()
    }

    pub fn current_coordinate(&self) -> Option<Coordinate> {
        self.tracker.current_coordinate()
    }

    pub fn session(&self) -> &RouteSession {
        &self.session
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    /// Handle everything already queued without blocking. Stops early on
    /// `Shutdown`. Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            handled += 1;
            if self.handle(event) == LoopControl::Shutdown {
                break;
            }
        }
        handled
    }

    /// Block on the queue until `Shutdown` arrives.
    pub fn run(&mut self) {
        while let Ok(event) = self.events.recv() {
            if self.handle(event) == LoopControl::Shutdown {
                break;
            }
        }
        debug!("navigation event loop finished");
    }

    pub fn handle(&mut self, event: NavEvent) -> LoopControl {
        let before = self.state();
        let control = self.dispatch(event);
        let after = self.state();
        if after != before {
            if let Some(observer) = self.observer.as_mut() {
                observer(after);
            }
        }
        control
    }

    fn dispatch(&mut self, event: NavEvent) -> LoopControl {
        match event {
            NavEvent::PositionFix(position) => {
                if self.tracker.on_fix(position) == FixOutcome::Welcome {
                    self.voice.announce(Announcement::PositionFound);
                }
            }
            NavEvent::LocationMethodChanged { method, status } => {
                info!(%method, ?status, "location method changed");
                self.voice
                    .announce(Announcement::LocationMethodChanged(method));
            }
            NavEvent::Tap => self.on_tap(),
            NavEvent::DoubleTap => {
                self.cancel_capture();
                if self.session.stop() {
                    info!("navigation aborted by double tap");
                }
            }
            NavEvent::Transcript { capture_id, text } => self.on_transcript(capture_id, &text),
            NavEvent::CaptureEnded { capture_id } => {
                if self.finish_capture(capture_id) {
                    debug!(capture_id, "speech capture ended without a transcript");
                }
            }
            NavEvent::RouteCalculated { request_id, result } => {
                match self.session.on_route_calculated(request_id, result) {
                    SessionNotice::RouteReady | SessionNotice::Rerouted => {
                        self.voice.reset_maneuvers();
                    }
                    SessionNotice::RouteFailed(_) => {
                        self.voice.announce(Announcement::RouteError);
                    }
                    SessionNotice::RerouteFailed(_) | SessionNotice::Stale => {}
                }
            }
            NavEvent::Guidance(event) => self.on_guidance(event),
            NavEvent::Pause => self.tracker.pause(),
            NavEvent::Resume => {
                if let Err(err) = self.tracker.resume() {
                    warn!(error = %err, "positioning did not restart on resume");
                    self.voice.announce(Announcement::PositioningFailed);
                }
            }
            NavEvent::Barrier(signal) => {
                if self.events.is_empty() {
                    signal.ready();
                } else {
                    self.input.send(NavEvent::Barrier(signal));
                }
            }
            NavEvent::Shutdown => return LoopControl::Shutdown,
        }
        LoopControl::Continue
    }

    fn on_tap(&mut self) {
        if !self.tracker.has_fix() {
            self.voice.announce(Announcement::WaitingForPosition);
            return;
        }
        if self.cancel_capture() {
            return;
        }
        let capture_id = self.next_capture_id;
        self.next_capture_id += 1;
        debug!(capture_id, state = %self.session.state(), "starting speech capture");
        self.active_capture = Some(capture_id);
        self.capture
            .start_listening(CaptureReply::new(capture_id, self.input.clone()));
    }

    fn cancel_capture(&mut self) -> bool {
        let Some(capture_id) = self.active_capture.take() else {
            return false;
        };
        debug!(capture_id, "cancelling speech capture");
        self.capture.cancel_if_listening();
        true
    }

    /// Close the active capture if `capture_id` is it. Results from any
    /// other capture arrived after it was cancelled or replaced.
    fn finish_capture(&mut self, capture_id: CaptureId) -> bool {
        if self.active_capture == Some(capture_id) {
            self.active_capture = None;
            return true;
        }
        debug!(
            capture_id,
            active = ?self.active_capture,
            "dropping result of an inactive speech capture"
        );
        false
    }

    fn on_transcript(&mut self, capture_id: CaptureId, text: &str) {
        if !self.finish_capture(capture_id) {
            return;
        }
        if self.log_content {
            debug!(transcript = %text, "transcript received");
        } else {
            debug!(chars = text.chars().count(), "transcript received");
        }

        match resolve(text, &self.directory) {
            Resolution::Cancelled => debug!("destination request cancelled by user"),
            Resolution::NoMatch => self.voice.announce(Announcement::NoDestination),
            Resolution::Destination { key, coordinate } => {
                info!(destination = %key, %coordinate, "destination resolved");
                if let Err(err) = self.navigate_to(coordinate) {
                    warn!(error = %err, "could not start navigation");
                    if matches!(err, NavError::NoOrigin) {
                        self.voice.announce(Announcement::WaitingForPosition);
                    }
                }
            }
        }
    }

    /// Cancel any live session, then start a new one from the current fix.
    fn navigate_to(&mut self, destination: Coordinate) -> Result<()> {
        let origin = self.tracker.current_coordinate().ok_or(NavError::NoOrigin)?;
        if self.session.state() != SessionState::Idle {
            self.session.stop();
        }
        self.session.start(origin, destination).map(|_| ())
    }

    fn on_guidance(&mut self, event: GuidanceEvent) {
        match event {
            GuidanceEvent::ManeuverChanged { maneuver } => {
                if self.session.state() == SessionState::Navigating {
                    self.voice.announce_maneuver(&maneuver.instruction);
                }
            }
            GuidanceEvent::RerouteBegin => {
                let origin = self.tracker.current_coordinate();
                if self.session.on_deviation_detected(origin) {
                    self.voice.announce(Announcement::Rerouting);
                }
            }
            GuidanceEvent::RerouteEnd { route } => {
                debug!(with_route = route.is_some(), "guidance reroute finished");
            }
            GuidanceEvent::Arrival => {
                if self.session.on_arrival() {
                    self.voice.announce(Announcement::Arrived);
                }
            }
            GuidanceEvent::LaneInfo { lanes } => {
                debug!(lanes = lanes.len(), "lane information");
            }
        }
    }

    /// Stop navigation, cancel capture, and release positioning.
    pub fn destroy(&mut self) {
        self.session.stop();
        self.cancel_capture();
        self.tracker.destroy();
    }
}
