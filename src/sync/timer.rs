use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Holds at most one scheduled task. Scheduling a new one aborts the
/// previous; dropping the slot aborts whatever is pending.
#[derive(Default)]
pub struct TaskSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task`, cancelling the one already scheduled.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(task));
    }

    /// Abort the pending task, if any. Returns true when one was still running.
    pub fn cancel(&self) -> bool {
        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        match handle {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        let slot = self.handle.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
