//! Bounded most-recent-first buffer of tag reads
//!
//! Holds the last [`DISPLAY_CAPACITY`] reads and the most recently received
//! payload. New reads go to the front in payload order; overflow is evicted
//! from the back without reordering the survivors.

use crate::domain::{Payload, TagRead};
use std::collections::VecDeque;
use std::sync::Arc;

/// Number of reads kept for display
pub const DISPLAY_CAPACITY: usize = 50;

/// Emitted by [`IngestionBuffer::ingest`] for the run-state tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalSignal {
    /// A payload carrying at least one read was ingested
    ReadsArrived { count: usize },
}

#[derive(Debug)]
pub struct IngestionBuffer {
    reads: VecDeque<TagRead>,
    latest: Option<Arc<Payload>>,
    capacity: usize,
}

impl Default for IngestionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DISPLAY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { reads: VecDeque::with_capacity(capacity), latest: None, capacity }
    }

    /// Prepend the payload's reads and make it the latest payload
    ///
    /// An empty `tag_reads` only replaces the latest payload and emits no signal.
    pub fn ingest(&mut self, payload: Payload) -> Option<ArrivalSignal> {
        let count = payload.tag_reads().len();

        if count >= self.capacity {
            self.reads.clear();
            self.reads.extend(payload.tag_reads()[..self.capacity].iter().cloned());
        } else {
            for read in payload.tag_reads().iter().rev() {
                self.reads.push_front(read.clone());
            }
            self.reads.truncate(self.capacity);
        }

        self.latest = Some(Arc::new(payload));

        (count > 0).then_some(ArrivalSignal::ReadsArrived { count })
    }

    pub fn clear(&mut self) {
        self.reads.clear();
        self.latest = None;
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    pub fn latest(&self) -> Option<&Arc<Payload>> {
        self.latest.as_ref()
    }

    /// Copy of the current contents, front (newest) first
    pub fn snapshot(&self) -> (Vec<TagRead>, Option<Arc<Payload>>) {
        (self.reads.iter().cloned().collect(), self.latest.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::TimeStamp;

    pub(crate) fn read(epc: &str) -> TagRead {
        TagRead {
            epc: epc.to_string(),
            antenna_port: 1,
            peak_rssi: -55,
            seen_count: 1,
            channel_index: 3,
            time_stamp: TimeStamp::Text(format!("ts-{}", epc)),
        }
    }

    pub(crate) fn payload_of(epcs: &[&str]) -> Payload {
        Payload::from_reads(epcs.iter().map(|e| read(e)).collect())
    }

    fn epcs(buffer: &IngestionBuffer) -> Vec<String> {
        buffer.snapshot().0.into_iter().map(|r| r.epc).collect()
    }

    #[test]
    fn test_new_reads_go_to_front_in_payload_order() {
        let mut buffer = IngestionBuffer::new();
        buffer.ingest(payload_of(&["a", "b"]));
        buffer.ingest(payload_of(&["c", "d", "e"]));
        assert_eq!(epcs(&buffer), vec!["c", "d", "e", "a", "b"]);
    }

    #[test]
    fn test_sixty_single_reads_keep_fifty_most_recent() {
        let mut buffer = IngestionBuffer::new();
        for i in 0..60 {
            buffer.ingest(payload_of(&[&format!("r{}", i)]));
            assert!(buffer.len() <= DISPLAY_CAPACITY);
        }
        let contents = epcs(&buffer);
        assert_eq!(contents.len(), 50);
        assert_eq!(contents[0], "r59");
        assert_eq!(contents[49], "r10");
        let expected: Vec<String> = (10..60).rev().map(|i| format!("r{}", i)).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_length_is_min_of_capacity_and_total() {
        let mut buffer = IngestionBuffer::new();
        let mut total = 0;
        for batch in [3usize, 7, 0, 12, 20, 9, 4] {
            let names: Vec<String> = (0..batch).map(|i| format!("{}-{}", total, i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            buffer.ingest(payload_of(&refs));
            total += batch;
            assert_eq!(buffer.len(), total.min(DISPLAY_CAPACITY));
        }
    }

    #[test]
    fn test_oversized_payload_keeps_its_first_fifty() {
        let mut buffer = IngestionBuffer::new();
        buffer.ingest(payload_of(&["old"]));
        let names: Vec<String> = (0..70).map(|i| format!("n{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        buffer.ingest(payload_of(&refs));

        let contents = epcs(&buffer);
        assert_eq!(contents.len(), 50);
        assert_eq!(contents[0], "n0");
        assert_eq!(contents[49], "n49");
    }

    #[test]
    fn test_empty_payload_updates_latest_only() {
        let mut buffer = IngestionBuffer::new();
        buffer.ingest(payload_of(&["a"]));
        let empty = Payload::parse(r#"{"tag_reads": [], "heartbeat": true}"#).unwrap();
        let signal = buffer.ingest(empty.clone());

        assert_eq!(signal, None);
        assert_eq!(epcs(&buffer), vec!["a"]);
        assert_eq!(buffer.latest().map(|p| p.as_ref()), Some(&empty));
    }

    #[test]
    fn test_signal_carries_read_count() {
        let mut buffer = IngestionBuffer::new();
        assert_eq!(
            buffer.ingest(payload_of(&["a", "b"])),
            Some(ArrivalSignal::ReadsArrived { count: 2 })
        );
    }

    #[test]
    fn test_clear() {
        let mut buffer = IngestionBuffer::new();
        buffer.ingest(payload_of(&["a", "b"]));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }
}
