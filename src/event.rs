//! Events consumed by the controller loop, and the timer scheduler that feeds them
//!
//! Everything that can change controller state (control calls, host signals,
//! child exits, timer firings) arrives through a single queue, so handlers
//! never run concurrently with each other.

use crate::control::{ControlReply, ControlRequest};
use crate::types::{HostSignal, Slot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

#[derive(Debug)]
pub enum Event {
    /// A call on the control surface
    Control {
        request: ControlRequest,
        reply: oneshot::Sender<ControlReply>,
    },

    /// Normalized host lifecycle change
    Host(HostSignal),

    /// A supervised child exited with the given raw wait status
    ChildExited { slot: Slot, pid: u32, raw_status: i32 },

    /// A scheduled timer fired
    Timer { generation: u64, kind: TimerKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Shutdown request armed by a soft detach
    DeferredShutdown,
    /// Next check whether the shared audio device is free
    DevicePoll,
    /// Driver-owned retry (e.g. waiting for a stream server)
    DriverRetry(Slot),
    /// Outgoing child did not exit in time during a switch
    ReleaseTimeout,
}

/// Posts events onto the controller queue and arms timers
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Event>,
    next_generation: Arc<AtomicU64>,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its queue
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next_generation: Arc::new(AtomicU64::new(1)),
            },
            rx,
        )
    }

    /// Queue an event; returns false once the controller has gone away
    pub fn post(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the receiving controller has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Fire `kind` after `delay`
    ///
    /// The returned timer aborts itself when dropped. Its generation lets the
    /// receiver discard a firing that was already queued before cancellation.
    pub fn after(&self, delay: Duration, kind: TimerKind) -> Timer {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Timer { generation, kind });
        });
        Timer {
            generation,
            handle: handle.abort_handle(),
        }
    }
}

/// A pending timer; dropping it cancels the firing
#[derive(Debug)]
pub struct Timer {
    generation: u64,
    handle: AbortHandle,
}

impl Timer {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a fired event belongs to this timer
    pub fn matches(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timer_fires_with_generation() {
        let (scheduler, mut rx) = Scheduler::channel();
        let timer = scheduler.after(Duration::from_millis(5), TimerKind::DevicePoll);

        match rx.recv().await {
            Some(Event::Timer { generation, kind }) => {
                assert!(timer.matches(generation));
                assert_eq!(kind, TimerKind::DevicePoll);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_timer_never_fires() {
        let (scheduler, mut rx) = Scheduler::channel();
        let timer = scheduler.after(Duration::from_millis(20), TimerKind::DeferredShutdown);
        drop(timer);

        let result = tokio::time::timeout(Duration::from_millis(80), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn test_generations_are_distinct() {
        let (scheduler, _rx) = Scheduler::channel();
        let a = scheduler.after(Duration::from_secs(60), TimerKind::DevicePoll);
        let b = scheduler.after(Duration::from_secs(60), TimerKind::DevicePoll);
        assert_ne!(a.generation(), b.generation());
        assert!(!a.matches(b.generation()));
    }
}
