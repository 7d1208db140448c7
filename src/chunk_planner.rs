//! Chunk Planner
//!
//! Pure arithmetic translating an HTTP byte range into the remote store's
//! fixed-size, index-aligned chunk addressing.

use crate::models::{ByteRange, ChunkPlan};
use tracing::debug;

/// Translator from byte ranges to chunk plans
pub struct ChunkPlanner {
    /// Size of each chunk in bytes, fixed by the remote store
    chunk_size: u64,
}

impl ChunkPlanner {
    /// Create a new ChunkPlanner
    ///
    /// # Arguments
    /// * `chunk_size` - Size of each chunk in bytes; must be non-zero
    pub fn new(chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk_size must be non-zero");
        ChunkPlanner { chunk_size }
    }

    /// The configured chunk size
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Total number of chunks needed to cover an object
    pub fn total_chunks(&self, object_size: u64) -> u64 {
        if object_size == 0 {
            return 0;
        }
        (object_size + self.chunk_size - 1) / self.chunk_size
    }

    /// Translate an inclusive byte range into a `ChunkPlan`.
    ///
    /// # Arguments
    /// * `range` - Requested byte range, already validated (`start <= end`)
    /// * `object_size` - Declared size of the object in bytes
    ///
    /// # Behavior
    /// * The range is clamped so `end < object_size` before translation.
    /// * A range starting at or past `object_size` yields an empty plan:
    ///   clients legitimately probe just past end-of-object when seeking,
    ///   and that must produce a zero-length successful stream, not an error.
    /// * `lead_trim` applies only to the first fetched chunk, `tail_trim`
    ///   only to the last; with a single chunk both apply to it.
    pub fn plan(&self, range: ByteRange, object_size: u64) -> ChunkPlan {
        if range.start >= object_size || object_size == 0 {
            debug!(
                "Range {}-{} starts at or past object size {}, returning empty plan",
                range.start, range.end, object_size
            );
            return ChunkPlan::empty();
        }

        let start = range.start;
        let end = std::cmp::min(range.end, object_size - 1);

        let offset = start - (start % self.chunk_size);
        let first_chunk_index = offset / self.chunk_size;
        let lead_trim = start - offset;
        let tail_trim = self.chunk_size - 1 - (end % self.chunk_size);
        let chunk_count = (end + self.chunk_size) / self.chunk_size - first_chunk_index;
        let requested_length = end - start + 1;

        debug!(
            "Planned {} chunk(s) from index {} for range {}-{} (lead_trim={}, tail_trim={})",
            chunk_count, first_chunk_index, start, end, lead_trim, tail_trim
        );

        ChunkPlan {
            first_chunk_index,
            chunk_count,
            lead_trim,
            tail_trim,
            requested_length,
        }
    }
}
