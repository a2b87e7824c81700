//! Stock progress clients.

use super::{DEFAULT_LOOP_WAIT, ProgressClient, ProgressEvent, StepTracker};
use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Forwards events to a control thread over a channel.
///
/// A dropped receiver is not an error for the worker: the run continues and
/// events are discarded.
#[derive(Debug)]
pub struct ChannelClient {
    tx: Sender<ProgressEvent>,
    loop_wait: Duration,
}

impl ChannelClient {
    /// Create a client and the receiver the control thread drains.
    pub fn channel() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                tx,
                loop_wait: DEFAULT_LOOP_WAIT,
            },
            rx,
        )
    }

    pub fn with_loop_wait(mut self, loop_wait: Duration) -> Self {
        self.loop_wait = loop_wait;
        self
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Progress receiver gone; event dropped");
        }
    }
}

impl ProgressClient for ChannelClient {
    fn desc(&mut self, text: &str) {
        self.send(ProgressEvent::Describe {
            text: text.to_string(),
        });
    }

    fn partial(&mut self, total: u64, step: u64) {
        self.send(ProgressEvent::Partial { total, step });
    }

    fn step(&mut self) {
        self.send(ProgressEvent::Pulse);
    }

    fn success(&mut self) {
        self.send(ProgressEvent::Success);
    }

    fn failure(&mut self) {
        self.send(ProgressEvent::Failure);
    }

    fn loop_wait_duration(&self) -> Duration {
        self.loop_wait
    }
}

/// Headless renderer writing each step to the tracing log.
#[derive(Debug, Default)]
pub struct LogClient {
    tracker: StepTracker,
    loop_wait: Option<Duration>,
}

impl LogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop_wait(mut self, loop_wait: Duration) -> Self {
        self.loop_wait = Some(loop_wait);
        self
    }

    fn apply(&mut self, event: &ProgressEvent) -> Option<String> {
        if let Err(e) = self.tracker.apply(event) {
            tracing::warn!("Ignoring progress event {:?}: {}", event, e);
            return None;
        }
        self.tracker
            .steps()
            .last()
            .map(|step| step.description.clone())
    }
}

impl ProgressClient for LogClient {
    fn desc(&mut self, text: &str) {
        let index = self.tracker.steps().len() + 1;
        if self
            .apply(&ProgressEvent::Describe {
                text: text.to_string(),
            })
            .is_some()
        {
            tracing::info!("[{}] {}", index, text);
        }
    }

    fn partial(&mut self, total: u64, step: u64) {
        if let Some(desc) = self.apply(&ProgressEvent::Partial { total, step }) {
            tracing::info!("{}: {}/{}", desc, step, total);
        }
    }

    fn step(&mut self) {
        if let Some(desc) = self.apply(&ProgressEvent::Pulse) {
            tracing::trace!("{}: still working", desc);
        }
    }

    fn success(&mut self) {
        if let Some(desc) = self.apply(&ProgressEvent::Success) {
            tracing::info!("{}: done", desc);
        }
    }

    fn failure(&mut self) {
        if let Some(desc) = self.apply(&ProgressEvent::Failure) {
            tracing::error!("{}: failed", desc);
        }
    }

    fn loop_wait_duration(&self) -> Duration {
        self.loop_wait.unwrap_or(DEFAULT_LOOP_WAIT)
    }
}

/// Writes one JSON object per event, one per line.
pub struct JsonLinesClient<W: Write + Send> {
    writer: W,
    loop_wait: Duration,
}

impl<W: Write + Send> JsonLinesClient<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            loop_wait: DEFAULT_LOOP_WAIT,
        }
    }

    pub fn with_loop_wait(mut self, loop_wait: Duration) -> Self {
        self.loop_wait = loop_wait;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, event: ProgressEvent) {
        let written = serde_json::to_string(&event)
            .map_err(std::io::Error::from)
            .and_then(|line| {
                writeln!(self.writer, "{}", line)?;
                self.writer.flush()
            });
        if let Err(e) = written {
            tracing::warn!("Failed to write progress event: {}", e);
        }
    }
}

impl<W: Write + Send> ProgressClient for JsonLinesClient<W> {
    fn desc(&mut self, text: &str) {
        self.emit(ProgressEvent::Describe {
            text: text.to_string(),
        });
    }

    fn partial(&mut self, total: u64, step: u64) {
        self.emit(ProgressEvent::Partial { total, step });
    }

    fn step(&mut self) {
        self.emit(ProgressEvent::Pulse);
    }

    fn success(&mut self) {
        self.emit(ProgressEvent::Success);
    }

    fn failure(&mut self) {
        self.emit(ProgressEvent::Failure);
    }

    fn loop_wait_duration(&self) -> Duration {
        self.loop_wait
    }
}

/// Records every event; clones share the same record.
#[derive(Debug, Clone)]
pub struct RecordingClient {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
    loop_wait: Duration,
}

impl Default for RecordingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::with_loop_wait(DEFAULT_LOOP_WAIT)
    }

    pub fn with_loop_wait(loop_wait: Duration) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            loop_wait,
        }
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Descriptions in the order they were reported.
    pub fn descriptions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Describe { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressClient for RecordingClient {
    fn desc(&mut self, text: &str) {
        self.push(ProgressEvent::Describe {
            text: text.to_string(),
        });
    }

    fn partial(&mut self, total: u64, step: u64) {
        self.push(ProgressEvent::Partial { total, step });
    }

    fn step(&mut self) {
        self.push(ProgressEvent::Pulse);
    }

    fn success(&mut self) {
        self.push(ProgressEvent::Success);
    }

    fn failure(&mut self) {
        self.push(ProgressEvent::Failure);
    }

    fn loop_wait_duration(&self) -> Duration {
        self.loop_wait
    }
}
