//! Append-only event log.

use parley_core::Event;

/// Ordered events of one session.
///
/// Sequences are assigned on append and strictly increase. The only rewrite
/// allowed is replacing a prefix with a single summary event, which the
/// compaction engine does through [`EventLog::replace_prefix`].
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    next_sequence: u64,
}

/// A contiguous run of events sharing an invocation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSpan {
    /// Index of the first event of the turn in the log
    pub start: usize,
    /// Index one past the last event of the turn
    pub end: usize,
}

impl TurnSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted events.
    pub fn from_parts(events: Vec<Event>, next_sequence: u64) -> Self {
        let floor = events.last().map(|e| e.sequence + 1).unwrap_or(0);
        Self {
            events,
            next_sequence: next_sequence.max(floor),
        }
    }

    /// Push an event at the tail, assigning its sequence.
    pub fn append(&mut self, mut event: Event) -> &Event {
        event.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    /// Events in order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Sequence the next appended event will get.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// The summary event, if the log has been compacted.
    pub fn summary(&self) -> Option<&Event> {
        self.events.iter().find(|e| e.is_compaction())
    }

    /// Turn boundaries, oldest first. Summary events are not turns.
    pub fn turns(&self) -> Vec<TurnSpan> {
        let mut spans: Vec<TurnSpan> = Vec::new();
        let mut current: Option<(usize, &str)> = None;

        for (idx, event) in self.events.iter().enumerate() {
            if event.is_compaction() {
                if let Some((start, _)) = current.take() {
                    spans.push(TurnSpan { start, end: idx });
                }
                continue;
            }
            match current {
                Some((_, inv)) if inv == event.invocation_id => {}
                Some((start, _)) => {
                    spans.push(TurnSpan { start, end: idx });
                    current = Some((idx, event.invocation_id.as_str()));
                }
                None => current = Some((idx, event.invocation_id.as_str())),
            }
        }
        if let Some((start, _)) = current {
            spans.push(TurnSpan {
                start,
                end: self.events.len(),
            });
        }
        spans
    }

    /// Replace `events[..end]` with `summary`.
    pub(crate) fn replace_prefix(&mut self, end: usize, summary: Event) {
        let end = end.min(self.events.len());
        self.events.splice(..end, std::iter::once(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{Content, EventCompaction};

    fn log_with(invocations: &[&str]) -> EventLog {
        let mut log = EventLog::new();
        for inv in invocations {
            log.append(Event::user(*inv, format!("msg in {inv}")));
        }
        log
    }

    #[test]
    fn test_append_assigns_increasing_sequences() {
        let log = log_with(&["a", "a", "b"]);
        let seqs: Vec<u64> = log.events().iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(log.next_sequence(), 3);
    }

    #[test]
    fn test_turns_group_by_invocation() {
        let log = log_with(&["a", "a", "b", "c", "c", "c"]);
        let turns = log.turns();
        assert_eq!(
            turns,
            vec![
                TurnSpan { start: 0, end: 2 },
                TurnSpan { start: 2, end: 3 },
                TurnSpan { start: 3, end: 6 },
            ]
        );
    }

    #[test]
    fn test_replace_prefix_keeps_tail_order() {
        let mut log = log_with(&["a", "b", "c", "d"]);
        let record = EventCompaction {
            start_sequence: 0,
            end_sequence: 1,
            events_compacted: 2,
            turns_compacted: 2,
        };
        log.replace_prefix(2, Event::compaction(Content::system("sum"), record));

        assert_eq!(log.len(), 3);
        assert!(log.events()[0].is_compaction());
        assert_eq!(log.events()[1].invocation_id, "c");
        assert_eq!(log.events()[2].invocation_id, "d");
        assert_eq!(log.turns().len(), 2);

        log.append(Event::user("e", "later"));
        assert_eq!(log.last().map(|e| e.sequence), Some(4));
    }

    #[test]
    fn test_from_parts_never_reuses_sequences() {
        let log = log_with(&["a", "b"]);
        let rebuilt = EventLog::from_parts(log.events().to_vec(), 0);
        assert_eq!(rebuilt.next_sequence(), 2);
    }
}
