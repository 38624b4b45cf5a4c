//! In-memory sorted QuadKey index with streaming range scans.
//!
//! [`QuadIndex`] is immutable after construction: build it from a batch
//! of entries, then scan it from as many threads as needed. Writes are
//! rebuild-only.

use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread;

use crate::quadkey::QuadKey;
use crate::range::QuadKeyRange;

/// Entries buffered between the scan thread and the consumer.
const STREAM_BUFFER: usize = 256;

/// An application value stored against a QuadKey.
///
/// The `id` is the payload's stable identity: search results are
/// deduplicated by it, so every tile row written for one application
/// object must report the same id.
pub trait Payload: Clone + Send + Sync + 'static {
    type Id: Eq + std::hash::Hash;

    fn id(&self) -> Self::Id;
}

/// A `(QuadKey, payload)` pair owned by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<P> {
    pub key: QuadKey,
    pub payload: P,
}

impl<P> Entry<P> {
    pub fn new(key: QuadKey, payload: P) -> Self {
        Self { key, payload }
    }
}

/// An immutable container of entries sorted by raw QuadKey.
///
/// Duplicate keys are preserved in insertion order. `get` streams every
/// entry whose key falls into a list of ranges; concurrent `get` calls
/// are safe because the entry vector is shared read-only.
#[derive(Debug, Clone)]
pub struct QuadIndex<P> {
    entries: Arc<Vec<Entry<P>>>,
}

impl<P: Payload> QuadIndex<P> {
    /// Build an index from an arbitrary batch of entries.
    pub fn new(entries: impl IntoIterator<Item = Entry<P>>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by_key(|e| e.key);
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in key order.
    pub fn entries(&self) -> &[Entry<P>] {
        &self.entries
    }

    /// Stream every entry whose key falls inside `ranges`.
    ///
    /// `ranges` must be sorted and disjoint (as produced by
    /// [`search_ranges`]). Entries arrive in range order, ascending by
    /// key within each range. The scan runs on its own thread behind a
    /// bounded channel: a slow consumer backpressures the scan, and
    /// dropping the stream stops it.
    ///
    /// [`search_ranges`]: crate::search::search_ranges
    pub fn get(&self, ranges: &[QuadKeyRange]) -> EntryStream<P> {
        let (tx, rx) = sync_channel(STREAM_BUFFER);
        let entries = Arc::clone(&self.entries);
        let ranges = ranges.to_vec();

        thread::spawn(move || {
            'scan: for range in ranges {
                let from = entries.partition_point(|e| e.key.raw() < range.start);
                for entry in &entries[from..] {
                    if entry.key.raw() > range.end {
                        break;
                    }
                    // A send error means the consumer dropped the stream.
                    if tx.send(entry.clone()).is_err() {
                        break 'scan;
                    }
                }
            }
        });

        EntryStream { rx }
    }
}

impl<P: Payload> FromIterator<Entry<P>> for QuadIndex<P> {
    fn from_iter<I: IntoIterator<Item = Entry<P>>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// A finite, single-use stream of entries produced by [`QuadIndex::get`].
///
/// Drain it or drop it; dropping cancels the backing scan.
pub struct EntryStream<P> {
    rx: Receiver<Entry<P>>,
}

impl<P> Iterator for EntryStream<P> {
    type Item = Entry<P>;

    fn next(&mut self) -> Option<Entry<P>> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal payload for index tests: the id doubles as the value.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Tag(u32);

    impl Payload for Tag {
        type Id = u32;

        fn id(&self) -> u32 {
            self.0
        }
    }

    fn key(x: u32, y: u32, z: u8) -> QuadKey {
        QuadKey::from_slippy(x, y, z).unwrap()
    }

    #[test]
    fn test_entries_are_sorted_on_build() {
        let index = QuadIndex::new([
            Entry::new(key(3, 3, 2), Tag(1)),
            Entry::new(key(0, 0, 2), Tag(2)),
            Entry::new(key(1, 2, 2), Tag(3)),
        ]);
        let keys: Vec<_> = index.entries().iter().map(|e| e.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_get_scans_ranges_in_order() {
        let parent = key(1, 1, 1);
        let other = key(0, 0, 1);
        let index = QuadIndex::new([
            Entry::new(other, Tag(10)),
            Entry::new(parent, Tag(20)),
            Entry::new(parent.child(2).unwrap(), Tag(30)),
        ]);

        let hits: Vec<_> = index
            .get(&[other.single_range(), parent.range()])
            .map(|e| e.payload.0)
            .collect();
        assert_eq!(hits, vec![10, 20, 30]);
    }

    #[test]
    fn test_get_never_yields_outside_the_ranges() {
        let entries: Vec<_> = (0u32..64)
            .map(|i| Entry::new(key(i % 8, i / 8, 3), Tag(i)))
            .collect();
        let index = QuadIndex::new(entries);

        let range = key(3, 3, 3).single_range();
        for entry in index.get(&[range]) {
            assert!(range.contains(entry.key));
        }
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let k = key(5, 5, 4);
        let index = QuadIndex::new([Entry::new(k, Tag(1)), Entry::new(k, Tag(2))]);
        let hits: Vec<_> = index.get(&[k.single_range()]).map(|e| e.payload.0).collect();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_dropping_the_stream_cancels_the_scan() {
        let entries: Vec<_> = (0u32..4096)
            .map(|i| Entry::new(key(i % 64, i / 64, 6), Tag(i)))
            .collect();
        let index = QuadIndex::new(entries);

        let mut stream = index.get(&[QuadKeyRange::new(0, u64::MAX)]);
        assert!(stream.next().is_some());
        drop(stream);
        // The scan thread exits on its next blocked send; nothing to
        // observe here beyond not hanging.
    }

    #[test]
    fn test_empty_ranges_yield_nothing() {
        let index = QuadIndex::new([Entry::new(key(1, 1, 1), Tag(1))]);
        assert_eq!(index.get(&[]).count(), 0);
    }

    #[test]
    fn test_concurrent_readers() {
        let entries: Vec<_> = (0u32..256)
            .map(|i| Entry::new(key(i % 16, i / 16, 4), Tag(i)))
            .collect();
        let index = QuadIndex::new(entries);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                thread::spawn(move || index.get(&[QuadKeyRange::new(0, u64::MAX)]).count())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 256);
        }
    }
}
