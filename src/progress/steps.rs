//! Step bookkeeping for one progress run
//!
//! Every event is applied through [`StepTracker::apply`], the only place a
//! step changes state:
//!
//! ```text
//! Describe ──► Active ──Describe──► Completed
//!                │
//!                ├──Success──► Succeeded
//!                └──Failure──► Failed
//! ```
//!
//! `Partial` and `Pulse` annotate the active step without changing its state.

use super::{ProgressError, ProgressEvent};

/// State of one described step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Most recently described, not yet finalized
    Active,
    /// Superseded by a later description without an explicit result
    Completed,
    Succeeded,
    Failed,
}

impl StepState {
    pub fn is_final(&self) -> bool {
        !matches!(self, StepState::Active)
    }
}

/// One described step and what has been reported about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub description: String,
    pub state: StepState,
    /// Last `(step, total)` reported through `Partial`
    pub progress: Option<(u64, u64)>,
    /// Indeterminate activity ticks
    pub pulses: u64,
}

impl Step {
    fn new(description: String) -> Self {
        Self {
            description,
            state: StepState::Active,
            progress: None,
            pulses: 0,
        }
    }

    /// Completed fraction in `0.0..=1.0`, if a partial count was reported.
    pub fn fraction(&self) -> Option<f64> {
        self.progress
            .map(|(step, total)| step as f64 / total as f64)
    }
}

/// Ordered record of the steps of one run.
#[derive(Debug, Clone, Default)]
pub struct StepTracker {
    steps: Vec<Step>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, rejecting events that break the protocol.
    pub fn apply(&mut self, event: &ProgressEvent) -> Result<(), ProgressError> {
        match event {
            ProgressEvent::Describe { text } => {
                if let Some(last) = self.steps.last_mut() {
                    if last.state == StepState::Active {
                        last.state = StepState::Completed;
                    }
                }
                self.steps.push(Step::new(text.clone()));
            }
            ProgressEvent::Partial { total, step } => {
                if *total == 0 {
                    return Err(ProgressError::ZeroTotal);
                }
                if step > total {
                    return Err(ProgressError::StepOutOfRange {
                        step: *step,
                        total: *total,
                    });
                }
                self.active_mut()?.progress = Some((*step, *total));
            }
            ProgressEvent::Pulse => {
                self.active_mut()?.pulses += 1;
            }
            ProgressEvent::Success => {
                self.active_mut()?.state = StepState::Succeeded;
            }
            ProgressEvent::Failure => {
                self.active_mut()?.state = StepState::Failed;
            }
        }
        Ok(())
    }

    fn active_mut(&mut self) -> Result<&mut Step, ProgressError> {
        let last = self.steps.last_mut().ok_or(ProgressError::NoActiveStep)?;
        if last.state.is_final() {
            return Err(ProgressError::StepFinalized(last.description.clone()));
        }
        Ok(last)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The step currently accepting events.
    pub fn active(&self) -> Option<&Step> {
        self.steps.last().filter(|s| s.state == StepState::Active)
    }

    /// True once any step has failed.
    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.state == StepState::Failed)
    }
}
