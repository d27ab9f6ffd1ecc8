//! Cancellable delayed tasks owned by a call

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Holds at most one pending task; scheduling replaces (aborts) the previous one
///
/// Never schedule into a slot from the task that slot is running, or the
/// task aborts itself.
#[derive(Debug, Default)]
pub struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Run `task` after `delay`, cancelling whatever was pending
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        }));
    }

    /// Abort the pending task; true if one was still running
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Every timer a call can have in flight
#[derive(Debug, Default)]
pub struct CallTasks {
    /// Endpoint (debounce) timer
    pub debounce: TaskSlot,
    /// Agent turn in flight
    pub dispatch: TaskSlot,
    /// Pacing delay and the reply playback it leads into
    pub pacing: TaskSlot,
    /// Pending proactive steering injection
    pub steering: TaskSlot,
    /// Delayed greeting
    pub greeting: TaskSlot,
    /// Forwards recognizer frames into the call
    pub stt_pump: TaskSlot,
}

impl CallTasks {
    /// Cancel the tasks the caller's voice should interrupt
    pub fn cancel_for_barge_in(&mut self) {
        self.pacing.cancel();
        self.steering.cancel();
    }

    /// Cancel everything
    pub fn cancel_all(&mut self) {
        self.debounce.cancel();
        self.dispatch.cancel();
        self.pacing.cancel();
        self.steering.cancel();
        self.greeting.cancel();
        self.stt_pump.cancel();
    }
}
