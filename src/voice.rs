//! Spoken output gate: maneuver text filtering and semantic announcements.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::collaborators::SpeechOutput;
use crate::geo::LocationMethod;

static ON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\b").expect("on-word pattern is valid"));

/// Event-driven cues, each spoken at the point its event is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    PositionFound,
    WaitingForPosition,
    Rerouting,
    Arrived,
    NoDestination,
    RouteError,
    PositioningFailed,
    LocationMethodChanged(LocationMethod),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePhrases {
    pub position_found: String,
    pub waiting_for_position: String,
    pub rerouting: String,
    pub arrived: String,
    pub no_destination: String,
    pub route_error: String,
    pub positioning_failed: String,
    /// Prefix; the method name is appended.
    pub location_method_changed: String,
}

impl Default for VoicePhrases {
    fn default() -> Self {
        Self {
            position_found: "Position found".to_string(),
            waiting_for_position: "Waiting for position".to_string(),
            rerouting: "Rerouting".to_string(),
            arrived: "You have arrived".to_string(),
            no_destination: "No destination found".to_string(),
            route_error: "Route calculation error".to_string(),
            positioning_failed: "Positioning failed to start".to_string(),
            location_method_changed: "Location method changed to".to_string(),
        }
    }
}

impl VoicePhrases {
    pub fn text_for(&self, announcement: Announcement) -> String {
        match announcement {
            Announcement::PositionFound => self.position_found.clone(),
            Announcement::WaitingForPosition => self.waiting_for_position.clone(),
            Announcement::Rerouting => self.rerouting.clone(),
            Announcement::Arrived => self.arrived.clone(),
            Announcement::NoDestination => self.no_destination.clone(),
            Announcement::RouteError => self.route_error.clone(),
            Announcement::PositioningFailed => self.positioning_failed.clone(),
            Announcement::LocationMethodChanged(method) => {
                format!("{} {method}", self.location_method_changed)
            }
        }
    }
}

/// Strip the trailing "on <street>" clause from a maneuver instruction.
/// Arrival instructions are kept whole.
pub fn filter_maneuver_text(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.to_lowercase().contains("arrive") {
        return trimmed;
    }
    match ON_WORD.find(trimmed) {
        Some(found) => trimmed[..found.start()].trim_end(),
        None => trimmed,
    }
}

pub struct VoiceGuidanceGate {
    speech: Arc<dyn SpeechOutput>,
    phrases: VoicePhrases,
    last_maneuver: Option<String>,
}

impl VoiceGuidanceGate {
    pub fn new(speech: Arc<dyn SpeechOutput>, phrases: VoicePhrases) -> Self {
        Self {
            speech,
            phrases,
            last_maneuver: None,
        }
    }

    pub fn phrases(&self) -> &VoicePhrases {
        &self.phrases
    }

    pub fn announce(&self, announcement: Announcement) {
        let text = self.phrases.text_for(announcement);
        debug!(?announcement, "announcing");
        self.speech.speak(&text);
    }

    /// Speak a maneuver instruction after filtering. Returns true when the
    /// prompt was consumed, including a filtered prompt that left nothing to
    /// say. Blank input and an exact repeat of the previous prompt return
    /// false.
    pub fn announce_maneuver(&mut self, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }
        if self.last_maneuver.as_deref() == Some(raw) {
            debug!("suppressing repeated maneuver prompt");
            return false;
        }
        self.last_maneuver = Some(raw.to_string());

        let spoken = filter_maneuver_text(raw);
        if spoken.is_empty() {
            debug!("maneuver prompt filtered to nothing");
        } else {
            self.speech.speak(spoken);
        }
        true
    }

    /// Forget the previous maneuver so a new route may repeat it.
    pub fn reset_maneuvers(&mut self) {
        self.last_maneuver = None;
    }
}
