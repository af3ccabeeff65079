//! Interleaves the events of several traces on one timeline.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::{StreamEvent, TraceTransition};
use crate::simulation::Trace;

#[derive(Debug)]
struct Pending {
    timestamp: i64,
    order: u64,
    key: String,
    event: StreamEvent,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        (self.timestamp, self.order) == (other.timestamp, other.order)
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestamp, self.order).cmp(&(other.timestamp, other.order))
    }
}

/// The most recently enqueued trace, after shifting
#[derive(Debug, Clone)]
struct Playing {
    case_id: String,
    start: i64,
    duration: i64,
}

/// Events of the traces in flight, ordered by (shifted) timestamp.
///
/// A new trace starts once `timeFractionBeforeNewTrace` of the most recently enqueued
/// trace has passed, and never before the last event already streamed.
#[derive(Debug)]
pub struct StreamBuffer {
    fraction: f64,
    mark_beginning_end: bool,
    queue: BinaryHeap<Reverse<Pending>>,
    next_order: u64,
    remaining: HashMap<String, usize, ahash::RandomState>,
    playing: Option<Playing>,
    clock: Option<i64>,
}

impl StreamBuffer {
    pub fn new(time_fraction_before_new_trace: f64, mark_trace_beginning_end: bool) -> Self {
        StreamBuffer {
            fraction: time_fraction_before_new_trace.clamp(0.0, 1.0),
            mark_beginning_end: mark_trace_beginning_end,
            queue: BinaryHeap::new(),
            next_order: 0,
            remaining: HashMap::default(),
            playing: None,
            clock: None,
        }
    }

    /// Number of traces with events still waiting
    pub fn in_flight(&self) -> usize {
        self.remaining.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Timestamp of the last event popped
    pub fn clock(&self) -> Option<i64> {
        self.clock
    }

    pub fn peek_timestamp(&self) -> Option<i64> {
        self.queue.peek().map(|Reverse(p)| p.timestamp)
    }

    /// Shift the trace into the stream timeline and enqueue its events.
    /// Returns the timestamp the trace starts at, `None` for empty traces.
    pub fn enqueue(&mut self, trace: Trace) -> Option<i64> {
        let start = trace.start_time()?;
        let duration = trace.duration();

        let anchor = match &self.playing {
            Some(playing) if self.remaining.contains_key(&playing.case_id) => {
                playing.start + (playing.duration as f64 * self.fraction) as i64
            }
            _ => self.clock.unwrap_or(start),
        };
        let anchor = self.clock.map_or(anchor, |clock| anchor.max(clock));
        let offset = anchor - start;

        let Trace { case_id, attributes, events } = trace;
        let last = events.len() - 1;
        // Cases can repeat when a source restarts numbering, keep them apart
        let key = if self.remaining.contains_key(&case_id) {
            format!("{}#{}", case_id, self.next_order)
        } else {
            case_id.clone()
        };
        for (index, event) in events.into_iter().enumerate() {
            let mut stream_event = StreamEvent::new(&case_id, &attributes, event);
            stream_event.timestamp += offset;
            if self.mark_beginning_end {
                if index == 0 {
                    stream_event.trace_transition = Some(TraceTransition::Start);
                } else if index == last {
                    stream_event.trace_transition = Some(TraceTransition::Complete);
                }
            }
            self.push(key.clone(), stream_event);
        }
        self.remaining.insert(key.clone(), last + 1);
        self.playing = Some(Playing { case_id: key, start: anchor, duration });
        Some(anchor)
    }

    fn push(&mut self, key: String, event: StreamEvent) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Reverse(Pending { timestamp: event.timestamp, order, key, event }));
    }

    /// Remove the earliest event
    pub fn pop(&mut self) -> Option<StreamEvent> {
        let Reverse(Pending { timestamp, key, event, .. }) = self.queue.pop()?;
        if let Some(count) = self.remaining.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.remaining.remove(&key);
            }
        }
        self.clock = Some(self.clock.map_or(timestamp, |clock| clock.max(timestamp)));
        Some(event)
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::simulation::{Event, EventKind};

    fn trace(case_id: &str, timestamps: &[i64]) -> Trace {
        let last = timestamps.len() - 1;
        let events = timestamps
            .iter()
            .enumerate()
            .map(|(index, &timestamp)| Event {
                node: None,
                label: format!("e{}", index),
                kind: match index {
                    0 => EventKind::Start,
                    i if i == last => EventKind::End,
                    _ => EventKind::Task,
                },
                timestamp,
                lifecycle: None,
                data: BTreeMap::new(),
            })
            .collect();
        Trace { case_id: case_id.into(), attributes: BTreeMap::new(), events }
    }

    fn drain(buffer: &mut StreamBuffer) -> Vec<(String, i64)> {
        std::iter::from_fn(|| buffer.pop()).map(|e| (e.case_id, e.timestamp)).collect()
    }

    #[test]
    fn test_first_trace_keeps_its_timestamps() {
        let mut buffer = StreamBuffer::new(0.5, false);
        assert_eq!(buffer.enqueue(trace("a", &[100, 200, 300])), Some(100));
        assert_eq!(buffer.in_flight(), 1);
        assert_eq!(drain(&mut buffer), vec![("a".into(), 100), ("a".into(), 200), ("a".into(), 300)]);
        assert_eq!(buffer.in_flight(), 0);
        assert_eq!(buffer.clock(), Some(300));
    }

    #[test]
    fn test_new_trace_starts_after_fraction() {
        let mut buffer = StreamBuffer::new(0.5, false);
        buffer.enqueue(trace("a", &[0, 1_000]));
        // Starts halfway through "a", whatever its own timestamps are
        assert_eq!(buffer.enqueue(trace("b", &[50_000, 50_800])), Some(500));
        assert_eq!(
            drain(&mut buffer),
            vec![("a".into(), 0), ("b".into(), 500), ("a".into(), 1_000), ("b".into(), 1_300)]
        );
    }

    #[test]
    fn test_never_before_clock() {
        let mut buffer = StreamBuffer::new(0.0, false);
        buffer.enqueue(trace("a", &[0, 1_000]));
        assert_eq!(buffer.pop().map(|e| e.timestamp), Some(0));
        assert_eq!(buffer.pop().map(|e| e.timestamp), Some(1_000));
        // "a" is done, the next trace continues from the clock
        assert_eq!(buffer.enqueue(trace("b", &[0, 10])), Some(1_000));
        assert_eq!(buffer.peek_timestamp(), Some(1_000));
    }

    #[test]
    fn test_marks_beginning_and_end() {
        let mut buffer = StreamBuffer::new(0.5, true);
        buffer.enqueue(trace("a", &[0, 10, 20]));
        let transitions: Vec<_> = std::iter::from_fn(|| buffer.pop()).map(|e| e.trace_transition).collect();
        assert_eq!(transitions, vec![Some(TraceTransition::Start), None, Some(TraceTransition::Complete)]);
    }

    #[test]
    fn test_empty_trace_is_ignored() {
        let mut buffer = StreamBuffer::new(0.5, false);
        assert_eq!(buffer.enqueue(Trace { case_id: "a".into(), attributes: BTreeMap::new(), events: vec![] }), None);
        assert!(buffer.is_empty());
        assert_eq!(buffer.in_flight(), 0);
    }

    #[test]
    fn test_repeated_case_ids_are_tracked_apart() {
        let mut buffer = StreamBuffer::new(1.0, false);
        buffer.enqueue(trace("a", &[0, 100]));
        buffer.enqueue(trace("a", &[0, 100]));
        assert_eq!(buffer.in_flight(), 2);
        assert_eq!(buffer.len(), 4);
        drain(&mut buffer);
        assert_eq!(buffer.in_flight(), 0);
    }
}
