//! JSON-lines replay harness: drives the navigation core with simulated
//! collaborators so sessions can be scripted and inspected from a terminal.

mod protocol;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use wayfinder::collaborators::{GuidanceEvent, Maneuver};
use wayfinder::config::AppConfig;
use wayfinder::geo::{Coordinate, Position};
use wayfinder::sim::{SimCollaborators, SimLog, SimRouter};
use wayfinder::telemetry::init_tracing;
use wayfinder::{NavEvent, NavigationOrchestrator, NavigationRuntime, SessionState};

use protocol::{emit, HarnessOutput, ReplayCommand};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const ENGINE_GONE: &str = "navigation engine is not accepting events";
const NOT_LISTENING: &str = "speech capture is not listening";
const NOT_GUIDING: &str = "guidance is not active";

fn main() -> Result<()> {
    let config = AppConfig::parse();
    config.validate()?;
    if let Some(path) = init_tracing(&config) {
        info!(path = %path.display(), "trace logging enabled");
    }

    let directory = config
        .load_directory()
        .context("failed to load destination directory")?;
    info!(destinations = directory.len(), "destination directory loaded");
    let settings = config.navigation_settings(&directory);

    let log = SimLog::with_tap(|output| {
        if let Some(line) = HarnessOutput::from_sim(output) {
            emit(&line);
        }
    });
    let sim = SimCollaborators::new(log, SimRouter::immediate());
    let orchestrator = NavigationOrchestrator::new(sim.bundle(), Arc::new(directory), settings)
        .with_state_observer(Box::new(|state: SessionState| {
            emit(&HarnessOutput::State { state })
        }));

    let runtime = NavigationRuntime::spawn(orchestrator)?;
    runtime
        .wait_ready(config.ready_timeout())
        .context("navigation engine did not become ready")?;

    replay(&runtime, &sim, io::stdin().lock(), config.ready_timeout())?;

    let mut orchestrator = runtime.shutdown(SHUTDOWN_TIMEOUT)?;
    orchestrator.destroy();
    io::stdout().flush()?;
    Ok(())
}

fn replay(
    runtime: &NavigationRuntime,
    sim: &SimCollaborators,
    input: impl BufRead,
    step_timeout: Duration,
) -> Result<()> {
    let nav = runtime.input();
    let mut last_fix = Coordinate::new(0.0, 0.0);

    for line in input.lines() {
        let line = line.context("failed to read stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command = match serde_json::from_str::<ReplayCommand>(trimmed) {
            Ok(command) => command,
            Err(err) => {
                emit(&HarnessOutput::Error {
                    message: format!("invalid command: {err}"),
                });
                continue;
            }
        };
        debug!(?command, "replay command");

        let delivered = match command {
            ReplayCommand::Fix { lat, lon, accuracy } => {
                last_fix = Coordinate::new(lat, lon);
                let mut position = Position::at(last_fix);
                position.accuracy_m = accuracy;
                deliver(sim.positioning.emit_fix(position) > 0, "positioning has no subscriber")
            }
            ReplayCommand::Method { method, status } => deliver(
                nav.send(NavEvent::LocationMethodChanged { method, status }),
                ENGINE_GONE,
            ),
            ReplayCommand::Tap => deliver(nav.tap(), ENGINE_GONE),
            ReplayCommand::DoubleTap => deliver(nav.double_tap(), ENGINE_GONE),
            ReplayCommand::Transcript { text } => {
                deliver(sim.capture.hear(text), NOT_LISTENING)
            }
            ReplayCommand::Silence => deliver(sim.capture.hear_nothing(), NOT_LISTENING),
            ReplayCommand::Deviation => {
                deliver(sim.guidance.emit(GuidanceEvent::RerouteBegin), NOT_GUIDING)
            }
            ReplayCommand::Arrival => deliver(sim.guidance.emit(GuidanceEvent::Arrival), NOT_GUIDING),
            ReplayCommand::Maneuver { text } => deliver(
                sim.guidance.emit(GuidanceEvent::ManeuverChanged {
                    maneuver: Maneuver {
                        instruction: text,
                        at: last_fix,
                        distance_m: 0.0,
                    },
                }),
                NOT_GUIDING,
            ),
            ReplayCommand::Pause => deliver(nav.send(NavEvent::Pause), ENGINE_GONE),
            ReplayCommand::Resume => deliver(nav.send(NavEvent::Resume), ENGINE_GONE),
            ReplayCommand::FailNextRoute => {
                sim.router.fail_next();
                Ok(())
            }
        };
        if let Err(message) = delivered {
            emit(&HarnessOutput::Error {
                message: message.to_string(),
            });
            continue;
        }
        runtime
            .sync(step_timeout)
            .context("navigation engine stopped responding")?;
    }
    Ok(())
}

fn deliver(accepted: bool, refusal: &'static str) -> std::result::Result<(), &'static str> {
    if accepted {
        Ok(())
    } else {
        Err(refusal)
    }
}
