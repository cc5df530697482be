//! Forwarding of user interrupts to the stages of the foreground run.
//!
//! The controller is armed only while the interpreter is collecting the
//! statuses of a foreground pipeline. A trigger then pushes one stop token into
//! every launched stage's single-slot channel and wakes the driving thread,
//! which stops waiting. Stages notice the token at their next checked I/O
//! point. A stage blocked in a call that never reaches such a point keeps its
//! thread until the call returns.

use crate::command::StopHandle;
use crate::status::Event;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of a launched stage as seen by the driving thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Running,
    StopRequested,
    Finished,
}

struct Armed {
    stops: Vec<StopHandle>,
    wake: SyncSender<Event>,
}

/// Cloneable handle used to deliver interrupts, e.g. from a Ctrl+C handler.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    armed: Arc<Mutex<Option<Armed>>>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an interrupt to the current foreground run.
    ///
    /// Returns false when nothing is armed (no run in progress, or a
    /// background run). A stage whose stop slot is still occupied by an
    /// earlier, unconsumed request ignores the new one.
    pub fn trigger(&self) -> bool {
        let armed = lock(&self.armed);
        let Some(armed) = armed.as_ref() else {
            tracing::trace!("interrupt ignored, nothing in the foreground");
            return false;
        };
        let delivered = armed.stops.iter().filter(|s| s.request_stop()).count();
        tracing::info!(
            stages = armed.stops.len(),
            delivered,
            "interrupt forwarded to foreground stages"
        );
        // a full channel means every stage already reported
        let _ = armed.wake.try_send(Event::Interrupt);
        true
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.armed).is_some()
    }

    /// Arms the controller until the returned guard is dropped.
    pub(crate) fn arm(&self, stops: Vec<StopHandle>, wake: SyncSender<Event>) -> ArmGuard {
        *lock(&self.armed) = Some(Armed { stops, wake });
        ArmGuard {
            armed: Arc::clone(&self.armed),
        }
    }
}

pub(crate) struct ArmGuard {
    armed: Arc<Mutex<Option<Armed>>>,
}

impl Drop for ArmGuard {
    fn drop(&mut self) {
        lock(&self.armed).take();
    }
}

fn lock(armed: &Mutex<Option<Armed>>) -> MutexGuard<'_, Option<Armed>> {
    armed.lock().unwrap_or_else(PoisonError::into_inner)
}
