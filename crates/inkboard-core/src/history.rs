//! Ordered, append-only stroke log with removal by id.
//!
//! Segments live in an arena in insertion order. Removal tombstones the
//! entry instead of splicing, so ids stay valid under concurrent appends.

use crate::segment::{OwnerId, SegmentId, StrokeSegment};
use kurbo::Point;
use std::collections::HashMap;

/// Tombstones are compacted away once they make up this share of the arena.
const COMPACT_RATIO: usize = 2;

#[derive(Debug, Clone)]
struct Entry {
    segment: StrokeSegment,
    removed: bool,
}

/// The board's ordered segment log.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Entry>,
    /// Arena position of every entry, removed or not.
    index: HashMap<SegmentId, usize>,
    next_seq: u64,
    live: usize,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from an ordered list, e.g. a snapshot or a persisted log.
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn from_segments(segments: impl IntoIterator<Item = StrokeSegment>) -> Self {
        let mut history = Self::new();
        for segment in segments {
            history.next_seq = history.next_seq.max(segment.seq.saturating_add(1));
            history.insert(segment);
        }
        history
    }

    /// Accept a segment as the authority, assigning the next position.
    pub fn append(&mut self, mut segment: StrokeSegment) -> &StrokeSegment {
        segment.seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let position = self.entries.len();
        self.index.insert(segment.id, position);
        self.entries.push(Entry {
            segment,
            removed: false,
        });
        self.live += 1;
        &self.entries[position].segment
    }

    /// Mirror a segment received from elsewhere, keeping its stamps.
    ///
    /// Returns false if a segment with the same id is already known.
    pub fn insert(&mut self, segment: StrokeSegment) -> bool {
        if self.index.contains_key(&segment.id) {
            return false;
        }
        self.index.insert(segment.id, self.entries.len());
        self.entries.push(Entry {
            segment,
            removed: false,
        });
        self.live += 1;
        true
    }

    /// Whether an id has ever been seen, including removed segments.
    pub fn contains_id(&self, id: &SegmentId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &SegmentId) -> Option<&StrokeSegment> {
        let entry = &self.entries[*self.index.get(id)?];
        (!entry.removed).then_some(&entry.segment)
    }

    /// Tombstone a segment. Returns true if it was live.
    pub fn remove(&mut self, id: &SegmentId) -> bool {
        let Some(&position) = self.index.get(id) else {
            return false;
        };
        let entry = &mut self.entries[position];
        if entry.removed {
            return false;
        }
        entry.removed = true;
        self.live -= 1;
        true
    }

    /// Tombstone several segments. Returns how many were live.
    pub fn remove_many(&mut self, ids: &[SegmentId]) -> usize {
        let removed = ids.iter().filter(|id| self.remove(id)).count();
        self.maybe_compact();
        removed
    }

    /// Remove every live segment owned by `owner` whose painted area
    /// touches the circle. Returns the removed ids in history order.
    pub fn erase_owned(&mut self, center: Point, radius: f64, owner: &OwnerId) -> Vec<SegmentId> {
        let mut removed = Vec::new();
        for entry in &mut self.entries {
            if entry.removed || entry.segment.owner_id != *owner {
                continue;
            }
            if entry.segment.intersects_circle(center, radius) {
                entry.removed = true;
                removed.push(entry.segment.id);
            }
        }
        self.live -= removed.len();
        self.maybe_compact();
        removed
    }

    /// Live segments in history order.
    pub fn iter(&self) -> impl Iterator<Item = &StrokeSegment> {
        self.entries
            .iter()
            .filter(|entry| !entry.removed)
            .map(|entry| &entry.segment)
    }

    /// Clone the live segments in history order.
    pub fn to_vec(&self) -> Vec<StrokeSegment> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Sequence number the next appended segment will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Drop tombstoned entries. Removed ids are forgotten afterwards.
    pub fn compact(&mut self) {
        self.entries.retain(|entry| !entry.removed);
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.segment.id, position))
            .collect();
    }

    fn maybe_compact(&mut self) {
        let dead = self.entries.len() - self.live;
        if dead > 0 && dead * COMPACT_RATIO >= self.entries.len() {
            self.compact();
        }
    }
}
