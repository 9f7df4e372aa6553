//! Wire shapes for the replay harness so stdin and stdout stay line-delimited JSON.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use wayfinder::geo::{LocationMethod, LocationStatus};
use wayfinder::sim::SimOutput;
use wayfinder::SessionState;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub(crate) enum ReplayCommand {
    Fix {
        lat: f64,
        lon: f64,
        #[serde(default)]
        accuracy: Option<f64>,
    },
    Method {
        method: LocationMethod,
        #[serde(default = "available")]
        status: LocationStatus,
    },
    Tap,
    DoubleTap,
    /// What the speech engine heard for the capture in progress.
    Transcript {
        text: String,
    },
    /// The capture in progress ends without a transcript.
    Silence,
    Deviation,
    Arrival,
    Maneuver {
        text: String,
    },
    Pause,
    Resume,
    FailNextRoute,
}

fn available() -> LocationStatus {
    LocationStatus::Available
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum HarnessOutput {
    Speak { text: String },
    Draw { id: u64, points: usize },
    Remove { id: u64 },
    State { state: SessionState },
    ListenStart,
    ListenCancel,
    Error { message: String },
}

impl HarnessOutput {
    /// Map the collaborator side effects a script author cares about.
    pub(crate) fn from_sim(output: &SimOutput) -> Option<Self> {
        match output {
            SimOutput::Speak { text } => Some(Self::Speak { text: text.clone() }),
            SimOutput::Draw { id, points } => Some(Self::Draw {
                id: *id,
                points: *points,
            }),
            SimOutput::Remove { id } => Some(Self::Remove { id: *id }),
            SimOutput::ListenStart => Some(Self::ListenStart),
            SimOutput::ListenCancel => Some(Self::ListenCancel),
            _ => None,
        }
    }
}

pub(crate) fn emit(output: &HarnessOutput) {
    if let Ok(line) = serde_json::to_string(output) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let fix: ReplayCommand =
            serde_json::from_str(r#"{"cmd":"fix","lat":35.615,"lon":-82.566}"#).expect("fix");
        assert_eq!(
            fix,
            ReplayCommand::Fix {
                lat: 35.615,
                lon: -82.566,
                accuracy: None
            }
        );
        let method: ReplayCommand =
            serde_json::from_str(r#"{"cmd":"method","method":"gps-network"}"#).expect("method");
        assert_eq!(
            method,
            ReplayCommand::Method {
                method: LocationMethod::GpsNetwork,
                status: LocationStatus::Available
            }
        );
        let fail: ReplayCommand =
            serde_json::from_str(r#"{"cmd":"fail_next_route"}"#).expect("fail");
        assert_eq!(fail, ReplayCommand::FailNextRoute);
        let silence: ReplayCommand =
            serde_json::from_str(r#"{"cmd":"silence"}"#).expect("silence");
        assert_eq!(silence, ReplayCommand::Silence);
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<ReplayCommand>(r#"{"cmd":"teleport"}"#).is_err());
        assert!(serde_json::from_str::<ReplayCommand>(r#"{"cmd":"transcript"}"#).is_err());
    }

    #[test]
    fn outputs_serialize_with_event_tag() {
        let json = serde_json::to_string(&HarnessOutput::State {
            state: SessionState::Navigating,
        })
        .expect("serialize");
        assert_eq!(json, r#"{"event":"state","state":"navigating"}"#);
        assert_eq!(
            HarnessOutput::from_sim(&SimOutput::Draw { id: 1, points: 2 }),
            Some(HarnessOutput::Draw { id: 1, points: 2 })
        );
        assert_eq!(HarnessOutput::from_sim(&SimOutput::GuidanceStop), None);
    }
}
