//! Observer trait for job state transitions.
//!
//! Inject an [`Arc<dyn JobObserver>`] via
//! [`crate::job::PrintServiceBuilder::observer`] to follow jobs as they move
//! through the pipeline: forward events to a progress bar, a metrics sink or
//! a websocket without the library knowing about any of them.
//!
//! # Example
//!
//! ```rust
//! use print_relay::{JobObserver, JobState};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     dispatched: AtomicUsize,
//! }
//!
//! impl JobObserver for CountingObserver {
//!     fn on_transition(&self, _job_id: &str, state: JobState) {
//!         if state == JobState::Dispatched {
//!             self.dispatched.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::error::PrintJobError;
use crate::job::{JobReport, JobState};

/// Called by the orchestrator as a job moves between states.
///
/// Jobs run concurrently, so the same observer is called from several tasks
/// at once. All methods default to no-ops.
pub trait JobObserver: Send + Sync {
    /// Called on every state change, including the initial `Received` and a
    /// final `Completed` or `Failed`.
    fn on_transition(&self, job_id: &str, state: JobState) {
        let _ = (job_id, state);
    }

    /// Called once after a job completed, with its final report.
    fn on_job_complete(&self, report: &JobReport) {
        let _ = report;
    }

    /// Called once when a job fails.
    fn on_job_failed(&self, job_id: &str, error: &PrintJobError) {
        let _ = (job_id, error);
    }
}

/// The default observer.
pub struct NoopJobObserver;

impl JobObserver for NoopJobObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<(String, JobState)>>,
        failures: Mutex<Vec<String>>,
    }

    impl JobObserver for Recorder {
        fn on_transition(&self, job_id: &str, state: JobState) {
            self.states.lock().unwrap().push((job_id.to_string(), state));
        }

        fn on_job_failed(&self, _job_id: &str, error: &PrintJobError) {
            self.failures.lock().unwrap().push(error.kind().to_string());
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopJobObserver;
        obs.on_transition("j", JobState::Received);
        obs.on_job_failed("j", &PrintJobError::Internal("boom".into()));
    }

    #[test]
    fn recorder_sees_events_through_trait_object() {
        let rec = Arc::new(Recorder::default());
        let shared: Arc<dyn JobObserver> = rec.clone();

        shared.on_transition("j1", JobState::Received);
        shared.on_transition("j1", JobState::Fetched);
        shared.on_job_failed("j1", &PrintJobError::validation("bad"));

        assert_eq!(
            *rec.states.lock().unwrap(),
            vec![
                ("j1".to_string(), JobState::Received),
                ("j1".to_string(), JobState::Fetched)
            ]
        );
        assert_eq!(*rec.failures.lock().unwrap(), vec!["ValidationError".to_string()]);
    }
}
