//! One-shot readiness handshake between the event-loop thread and its owner.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::{NavError, Result};

/// Sending half; consumed by [`ReadySignal::ready`].
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Sender<()>,
}

#[derive(Debug)]
pub struct ReadyWaiter {
    rx: Receiver<()>,
}

pub fn ready_pair() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = bounded(1);
    (ReadySignal { tx }, ReadyWaiter { rx })
}

impl ReadySignal {
    pub fn ready(self) {
        // The waiter may already have timed out and gone away.
        let _ = self.tx.send(());
    }
}

impl ReadyWaiter {
    /// Block until ready or `timeout` elapses. A signal dropped without
    /// firing means the engine thread died before it became ready.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(NavError::EngineNotReady {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(NavError::EventLoopStopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_returns_once_signalled_from_another_thread() {
        let (signal, waiter) = ready_pair();
        let handle = thread::spawn(move || signal.ready());
        waiter.wait(Duration::from_secs(2)).expect("ready");
        handle.join().expect("join");
    }

    #[test]
    fn wait_times_out_when_never_signalled() {
        let (_signal, waiter) = ready_pair();
        let err = waiter.wait(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, NavError::EngineNotReady { waited_ms: 20 }));
    }

    #[test]
    fn dropped_signal_reports_stopped_loop() {
        let (signal, waiter) = ready_pair();
        drop(signal);
        assert!(matches!(
            waiter.wait(Duration::from_millis(20)),
            Err(NavError::EventLoopStopped)
        ));
    }

    #[test]
    fn ready_after_waiter_dropped_is_harmless() {
        let (signal, waiter) = ready_pair();
        drop(waiter);
        signal.ready();
    }
}
