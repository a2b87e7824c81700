//! Progress Reporting Protocol
//!
//! A pre-check or install worker reports what it is doing through a
//! [`ProgressSession`]; the presentation layer attached to the run
//! implements [`ProgressClient`] and renders the events.
//!
//! # Design Principles
//!
//! - **No Global State**: the session is passed explicitly into the worker
//!   and every nested step. There is no process-wide "current client".
//! - **One Run at a Time**: an [`Orchestrator`] hands out at most one live
//!   session; a second `begin_session` fails with `Busy` until the first
//!   session is dropped.
//! - **Validated Events**: every event goes through a [`StepTracker`] before
//!   it reaches the client, so clients never see a `Success` without a
//!   described step.
//!
//! # Sequencing
//!
//! ```text
//! desc("A")  desc("B")  success()
//!    │          │           │
//!    ▼          ▼           ▼
//!  A active   A completed  B succeeded
//!             B active
//! ```

pub mod clients;
pub mod steps;

use crate::error::{InstallerError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub use clients::{ChannelClient, JsonLinesClient, LogClient, RecordingClient};
pub use steps::{Step, StepState, StepTracker};

/// Pause between activity pulses while a long operation runs
pub const DEFAULT_LOOP_WAIT: Duration = Duration::from_millis(200);

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A new step starts; the previous one is implicitly complete
    Describe { text: String },
    /// Determinate progress of the current step
    Partial { total: u64, step: u64 },
    /// Indeterminate activity on the current step
    Pulse,
    Success,
    Failure,
}

impl ProgressEvent {
    /// Deliver this event to `client`.
    pub fn dispatch(&self, client: &mut dyn ProgressClient) {
        match self {
            ProgressEvent::Describe { text } => client.desc(text),
            ProgressEvent::Partial { total, step } => client.partial(*total, *step),
            ProgressEvent::Pulse => client.step(),
            ProgressEvent::Success => client.success(),
            ProgressEvent::Failure => client.failure(),
        }
    }
}

/// Events that break the reporting protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("no step has been described")]
    NoActiveStep,

    #[error("step '{0}' is already finished")]
    StepFinalized(String),

    #[error("partial progress {step}/{total} is out of range")]
    StepOutOfRange { step: u64, total: u64 },

    #[error("partial progress total must be positive")]
    ZeroTotal,
}

/// Capability a presentation layer implements to receive progress.
///
/// Calls arrive sequentially from the worker thread, in protocol order.
pub trait ProgressClient: Send {
    /// Start a new step described by `text`.
    fn desc(&mut self, text: &str);

    /// Report `step` of `total` units done on the current step.
    fn partial(&mut self, total: u64, step: u64);

    /// Report activity on a step with no known length.
    fn step(&mut self);

    fn success(&mut self);

    fn failure(&mut self);

    /// How long the worker waits between pulses.
    fn loop_wait_duration(&self) -> Duration {
        DEFAULT_LOOP_WAIT
    }
}

/// Hands out the single live progress session.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    active: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run reporting to `client`.
    ///
    /// Fails with [`InstallerError::Busy`] while another session is alive.
    pub fn begin_session(&self, client: Box<dyn ProgressClient>) -> Result<ProgressSession> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(InstallerError::Busy);
        }

        tracing::debug!("Progress session started");
        Ok(ProgressSession {
            client,
            tracker: StepTracker::new(),
            _guard: SessionGuard {
                active: Arc::clone(&self.active),
            },
        })
    }

    /// True while a session is alive.
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Releases the orchestrator when the session goes away.
struct SessionGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        tracing::debug!("Progress session released");
    }
}

/// The typed owner of one run's progress client.
pub struct ProgressSession {
    client: Box<dyn ProgressClient>,
    tracker: StepTracker,
    _guard: SessionGuard,
}

impl std::fmt::Debug for ProgressSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSession")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl ProgressSession {
    fn record(&mut self, event: ProgressEvent) -> std::result::Result<(), ProgressError> {
        self.tracker.apply(&event)?;
        event.dispatch(self.client.as_mut());
        Ok(())
    }

    pub fn desc(&mut self, text: impl Into<String>) -> std::result::Result<(), ProgressError> {
        self.record(ProgressEvent::Describe { text: text.into() })
    }

    pub fn partial(&mut self, total: u64, step: u64) -> std::result::Result<(), ProgressError> {
        self.record(ProgressEvent::Partial { total, step })
    }

    pub fn step(&mut self) -> std::result::Result<(), ProgressError> {
        self.record(ProgressEvent::Pulse)
    }

    pub fn success(&mut self) -> std::result::Result<(), ProgressError> {
        self.record(ProgressEvent::Success)
    }

    pub fn failure(&mut self) -> std::result::Result<(), ProgressError> {
        self.record(ProgressEvent::Failure)
    }

    pub fn loop_wait_duration(&self) -> Duration {
        self.client.loop_wait_duration()
    }

    /// Steps reported so far.
    pub fn steps(&self) -> &[Step] {
        self.tracker.steps()
    }

    /// Describe a step, run `op`, then report its outcome.
    pub fn run_step<T, F>(&mut self, text: impl Into<String>, op: F) -> Result<T>
    where
        F: FnOnce(&mut ProgressSession) -> Result<T>,
    {
        self.desc(text)?;
        let outcome = op(self);
        self.finish(outcome)
    }

    /// Describe a step and pulse every loop wait while `op` runs on a
    /// scoped thread.
    pub fn pulse_while<T, F>(&mut self, text: impl Into<String>, op: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        self.desc(text)?;
        let wait = self.loop_wait_duration();

        let outcome: Result<T> = thread::scope(|scope| {
            let handle = scope.spawn(op);
            while !handle.is_finished() {
                self.step()?;
                thread::sleep(wait);
            }
            handle
                .join()
                .unwrap_or_else(|_| Err(InstallerError::worker("step panicked")))
        });

        self.finish(outcome)
    }

    fn finish<T>(&mut self, outcome: Result<T>) -> Result<T> {
        // A nested step may already have finalized the step.
        if self.tracker.active().is_none() {
            return outcome;
        }
        match &outcome {
            Ok(_) => self.success()?,
            Err(err) => {
                tracing::debug!("Step failed: {}", err);
                self.failure()?;
            }
        }
        outcome
    }
}
