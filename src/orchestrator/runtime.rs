//! Dedicated event-loop thread for a [`NavigationOrchestrator`].

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::NavigationOrchestrator;
use crate::error::{NavError, Result};
use crate::events::{NavEvent, NavInput};
use crate::readiness::{ready_pair, ReadyWaiter};

const THREAD_JOIN_POLL_MS: u64 = 5;

pub struct NavigationRuntime {
    input: NavInput,
    ready: ReadyWaiter,
    handle: Option<JoinHandle<NavigationOrchestrator>>,
}

impl NavigationRuntime {
    /// Move the orchestrator onto its own thread, start positioning there,
    /// and begin consuming events. Readiness fires once positioning has been
    /// started, whether or not the source accepted.
    pub fn spawn(mut orchestrator: NavigationOrchestrator) -> Result<Self> {
        let input = orchestrator.input();
        let (signal, ready) = ready_pair();
        let handle = thread::Builder::new()
            .name("wayfinder-nav".to_string())
            .spawn(move || {
                if let Err(err) = orchestrator.start() {
                    warn!(error = %err, "positioning unavailable at startup");
                }
                signal.ready();
                orchestrator.run();
                orchestrator
            })?;
        Ok(Self {
            input,
            ready,
            handle: Some(handle),
        })
    }

    pub fn input(&self) -> NavInput {
        self.input.clone()
    }

    pub fn wait_ready(&self, timeout: Duration) -> Result<()> {
        self.ready.wait(timeout)
    }

    /// Wait until everything submitted so far has been handled, along with
    /// the follow-up events those handlers enqueued (such as an immediate
    /// route completion).
    pub fn sync(&self, timeout: Duration) -> Result<()> {
        let (signal, waiter) = ready_pair();
        if !self.input.send(NavEvent::Barrier(signal)) {
            return Err(NavError::EventLoopStopped);
        }
        waiter.wait(timeout)
    }

    /// Ask the loop to stop and hand the orchestrator back. Events queued
    /// before the shutdown request are handled first.
    pub fn shutdown(mut self, timeout: Duration) -> Result<NavigationOrchestrator> {
        let handle = self.handle.take().ok_or(NavError::EventLoopStopped)?;
        if !self.input.send(NavEvent::Shutdown) {
            debug!("event loop already closed before shutdown request");
        }

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "navigation thread did not exit in time; detaching"
                );
                return Err(NavError::EventLoopStopped);
            }
            thread::sleep(Duration::from_millis(THREAD_JOIN_POLL_MS));
        }
        handle.join().map_err(|err| {
            warn!(?err, "navigation thread panicked");
            NavError::EventLoopStopped
        })
    }
}

impl Drop for NavigationRuntime {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.input.send(NavEvent::Shutdown);
        }
    }
}
