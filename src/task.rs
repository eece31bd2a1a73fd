// ============================================================================
// BACKGROUND JOBS: cancellation token + latest-wins work slot
// ============================================================================
//
// Long operations (filter previews, transform previews) run on the rayon pool.
// Each target owns a `TaskSlot`; submitting a new job cancels the previous one
// so only the most recent request ever delivers a result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;

use parking_lot::Mutex;

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Terminal state of a job. Cancellation is a normal outcome, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(v) => Some(v),
            TaskOutcome::Cancelled => None,
        }
    }
}

/// Receiving end of a submitted job.
pub struct TaskHandle<T> {
    receiver: mpsc::Receiver<TaskOutcome<T>>,
    token: CancelToken,
    generation: u64,
}

impl<T> TaskHandle<T> {
    /// Block until the job finishes. A job that died without reporting counts
    /// as cancelled.
    pub fn wait(self) -> TaskOutcome<T> {
        self.receiver.recv().unwrap_or(TaskOutcome::Cancelled)
    }

    /// Non-blocking poll.
    pub fn try_result(&self) -> Option<TaskOutcome<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(TaskOutcome::Cancelled),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Submission counter of the owning slot when this job was queued.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Single-item queue: at most one live job per slot.
#[derive(Default)]
pub struct TaskSlot {
    current: Mutex<Option<CancelToken>>,
    generation: AtomicU64,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever is in flight and run `job` on the rayon pool.
    /// The job returns `None` when it noticed the token and bailed.
    pub fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> Option<T> + Send + 'static,
    {
        let token = CancelToken::new();
        {
            let mut current = self.current.lock();
            if let Some(prev) = current.replace(token.clone()) {
                prev.cancel();
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);

        let (sender, receiver) = mpsc::channel();
        let job_token = token.clone();
        rayon::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job(&job_token)));
            let outcome = match result {
                Ok(Some(value)) if !job_token.is_cancelled() => TaskOutcome::Completed(value),
                Ok(_) => TaskOutcome::Cancelled,
                Err(panic_info) => {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    crate::log_err!("background job {} panicked: {}", generation, msg);
                    TaskOutcome::Cancelled
                }
            };
            let _ = sender.send(outcome);
        });

        TaskHandle { receiver, token, generation }
    }

    /// Cancel the in-flight job, if any.
    pub fn cancel_current(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_job_delivers_value() {
        let slot = TaskSlot::new();
        let handle = slot.submit(|_| Some(21 * 2));
        assert_eq!(handle.wait(), TaskOutcome::Completed(42));
    }

    #[test]
    fn newer_submission_cancels_older() {
        let slot = TaskSlot::new();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let first = slot.submit(move |token| {
            let _ = gate_rx.recv();
            if token.is_cancelled() { None } else { Some(1) }
        });
        let second = slot.submit(|_| Some(2));
        gate_tx.send(()).unwrap();
        assert_eq!(first.wait(), TaskOutcome::Cancelled);
        assert_eq!(second.wait(), TaskOutcome::Completed(2));
        assert_eq!(slot.generation(), 2);
    }
}
