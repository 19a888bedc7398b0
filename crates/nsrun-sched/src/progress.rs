use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::job::JobSpec;

/// One completed (or skipped, or failed) job of a method group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Label of the method group.
    pub method_group: String,
    /// Jobs of the group finished so far.
    pub completed: usize,
    /// Jobs in the group.
    pub total: usize,
}

/// Append-only consumer of progress events.
pub trait ProgressSink: Send + Sync {
    /// Receives one event; must not block for long.
    fn emit(&self, event: ProgressEvent);
}

/// Logs each event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        tracing::info!(
            method_group = %event.method_group,
            completed = event.completed,
            total = event.total,
            "progress"
        );
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to a channel; a dropped receiver is ignored.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: Mutex<Sender<ProgressEvent>>,
}

impl ChannelProgress {
    /// Sink writing into `sender`.
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event);
        }
    }
}

/// Per-group completion counters.
///
/// Events are emitted while the counter lock is held so every sink sees
/// strictly increasing `completed` values per group.
#[derive(Debug)]
pub(crate) struct GroupCounters {
    counts: Mutex<BTreeMap<String, (usize, usize)>>,
}

impl GroupCounters {
    pub(crate) fn for_jobs<'j>(jobs: impl IntoIterator<Item = &'j JobSpec>) -> Self {
        let mut counts = BTreeMap::new();
        for job in jobs {
            counts
                .entry(job.method_group.clone())
                .or_insert((0usize, 0usize))
                .1 += 1;
        }
        Self {
            counts: Mutex::new(counts),
        }
    }

    pub(crate) fn complete(&self, method_group: &str, sink: &dyn ProgressSink) {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((completed, total)) = counts.get_mut(method_group) {
            *completed += 1;
            sink.emit(ProgressEvent {
                method_group: method_group.to_string(),
                completed: *completed,
                total: *total,
            });
        }
    }
}
