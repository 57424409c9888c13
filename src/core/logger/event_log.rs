use crate::core::logger::sink::{EventSink, SinkRecord};
use crate::core::types::{Event, EventKind, ProcessId, ResourceId, now_timestamp};
use std::sync::Arc;

/// Append-only, sequence-numbered event stream
///
/// Entries are never changed once recorded. When a sink is attached every
/// entry is also queued for the log file.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
    sink: Option<Arc<EventSink>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: EventSink) -> Self {
        EventLog {
            events: Vec::new(),
            sink: Some(Arc::new(sink)),
        }
    }

    /// Append an event stamped with the current time
    pub fn record(
        &mut self,
        process: impl Into<ProcessId>,
        kind: EventKind,
        resource: Option<ResourceId>,
    ) -> &Event {
        let event = Event {
            seq: self.events.len() as u64,
            process: process.into(),
            timestamp: now_timestamp(),
            kind,
            resource,
        };
        if let Some(sink) = &self.sink {
            sink.write(SinkRecord::Event(event.clone()));
        }
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn sink(&self) -> Option<&EventSink> {
        self.sink.as_deref()
    }

    /// Shared handle to the sink, usable after the log itself is unlocked
    pub fn sink_handle(&self) -> Option<Arc<EventSink>> {
        self.sink.clone()
    }

    pub fn all(&self) -> &[Event] {
        &self.events
    }

    /// The last `n` events, oldest first
    pub fn recent(&self, n: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Events with a sequence number of at least `seq`
    pub fn since(&self, seq: u64) -> &[Event] {
        let start = usize::try_from(seq).map_or(self.events.len(), |s| s.min(self.events.len()));
        &self.events[start..]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(n: usize) -> EventLog {
        let mut log = EventLog::new();
        for i in 0..n {
            log.record(format!("P{i}"), EventKind::Requesting, Some("Disk".into()));
        }
        log
    }

    #[test]
    fn test_sequence_numbers_follow_append_order() {
        let log = log_with(3);
        let seqs: Vec<u64> = log.all().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(log.all().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_recent_and_since() {
        let log = log_with(5);
        assert_eq!(log.recent(2).len(), 2);
        assert_eq!(log.recent(2)[0].process, "P3");
        assert_eq!(log.recent(10).len(), 5);
        assert_eq!(log.since(4).len(), 1);
        assert!(log.since(99).is_empty());
    }
}
