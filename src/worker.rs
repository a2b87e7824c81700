//! Worker coordination
//!
//! Pre-check and install run on a worker thread so the control thread stays
//! free to render progress. The worker owns the [`ProgressSession`] for the
//! whole run and signals its terminal result exactly once over a one-shot
//! channel.
//!
//! # Lifecycle
//!
//! ```text
//! Idle
//!   ↓
//! Running
//!   ↓
//! Succeeded | Failed
//!   ↓
//! Signaled
//! ```
//!
//! A [`WorkerRun`] enforces this order; it is never reused after `Signaled`.

use crate::error::{InstallerError, Result};
use crate::progress::ProgressSession;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use strum::Display;
use thiserror::Error;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum WorkerState {
    Idle,
    Running,
    Succeeded,
    Failed,
    /// Terminal result delivered to the control thread
    Signaled,
}

impl WorkerState {
    /// Returns true once the outcome has been delivered
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Signaled)
    }

    /// Returns true if the worker has produced its result
    #[inline]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Signaled)
    }
}

/// Errors that can occur during worker state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerTransitionError {
    #[error("Cannot move worker from {from} to {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    #[error("Worker already signaled; a run cannot be reused")]
    FromTerminalState,

    #[error("Worker is already {state}")]
    AlreadyAtState { state: WorkerState },
}

/// Lifecycle of one worker run.
#[derive(Debug, Clone)]
pub struct WorkerRun {
    state: WorkerState,
}

impl Default for WorkerRun {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRun {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn transition_to(&mut self, next: WorkerState) -> std::result::Result<(), WorkerTransitionError> {
        use WorkerState::*;

        if self.state.is_terminal() {
            return Err(WorkerTransitionError::FromTerminalState);
        }
        if self.state == next {
            return Err(WorkerTransitionError::AlreadyAtState { state: next });
        }

        let allowed = matches!(
            (self.state, next),
            (Idle, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Succeeded, Signaled)
                | (Failed, Signaled)
        );
        if !allowed {
            return Err(WorkerTransitionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!("Worker transition: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn start(&mut self) -> std::result::Result<(), WorkerTransitionError> {
        self.transition_to(WorkerState::Running)
    }

    pub fn finish(&mut self, success: bool) -> std::result::Result<(), WorkerTransitionError> {
        self.transition_to(if success {
            WorkerState::Succeeded
        } else {
            WorkerState::Failed
        })
    }

    /// Mark the outcome delivered and return it.
    pub fn signal(&mut self) -> std::result::Result<bool, WorkerTransitionError> {
        let success = self.state == WorkerState::Succeeded;
        self.transition_to(WorkerState::Signaled)?;
        Ok(success)
    }
}

/// Control-thread side of a running worker.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    done: Receiver<bool>,
    outcome: Option<bool>,
    join: JoinHandle<Result<T>>,
}

impl<T> WorkerHandle<T> {
    /// Non-blocking poll for the outcome, for event loops.
    ///
    /// A worker that died without signaling counts as failed.
    pub fn try_outcome(&mut self) -> Option<bool> {
        if self.outcome.is_none() {
            self.outcome = match self.done.try_recv() {
                Ok(success) => Some(success),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(false),
            };
        }
        self.outcome
    }

    /// Block until the worker signals.
    pub fn wait(&mut self) -> bool {
        if let Some(success) = self.outcome {
            return success;
        }
        let success = self.done.recv().unwrap_or(false);
        self.outcome = Some(success);
        success
    }

    /// Join the worker and take its result for diagnostics.
    pub fn join(self) -> Result<T> {
        self.join
            .join()
            .unwrap_or_else(|_| Err(InstallerError::worker("worker thread panicked")))
    }
}

/// Run `op` on a worker thread that owns `session`.
///
/// The session is released before the outcome is signaled, so a caller
/// woken by the signal can start the next run immediately.
pub fn spawn<T, F>(name: &str, mut session: ProgressSession, op: F) -> Result<WorkerHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(&mut ProgressSession) -> Result<T> + Send + 'static,
{
    let (tx, done) = mpsc::sync_channel::<bool>(1);

    let join = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut run = WorkerRun::new();
            let result = run
                .start()
                .map_err(InstallerError::from)
                .and_then(|_| op(&mut session));
            drop(session);

            if let Err(e) = &result {
                tracing::debug!("Worker failed: {}", e);
            }
            let success = run
                .finish(result.is_ok())
                .and_then(|_| run.signal())
                .unwrap_or(false);
            if tx.send(success).is_err() {
                tracing::debug!("Worker outcome receiver dropped");
            }
            result
        })?;

    Ok(WorkerHandle {
        done,
        outcome: None,
        join,
    })
}
