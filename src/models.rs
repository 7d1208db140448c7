//! Core data models for the streaming gateway

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Represents an inclusive byte range from an HTTP Range request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(GatewayError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(GatewayError::RangeNotSatisfiable(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Number of bytes covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a ByteRange covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Interpret a Range header against an object of the given size.
    ///
    /// Accepts a single `bytes=START-END` window; an omitted START means the
    /// first byte, an omitted END the last byte of the object. Anything the
    /// gateway cannot satisfy (wrong unit, multiple windows, non-numeric
    /// positions, empty object) comes back as a 416-class error.
    pub fn from_header(header: &str, object_size: u64) -> Result<Self> {
        let header = header.trim();

        let Some(range_part) = header.strip_prefix("bytes=") else {
            return Err(GatewayError::RangeNotSatisfiable(format!(
                "only byte ranges are served, not {:?}",
                header
            )));
        };
        if object_size == 0 {
            return Err(GatewayError::RangeNotSatisfiable(
                "object has no bytes to range over".to_string(),
            ));
        }

        let parts: Vec<&str> = range_part.split('-').collect();

        if parts.len() != 2 {
            return Err(GatewayError::RangeNotSatisfiable(format!(
                "expected one start-end window, got {:?}",
                range_part
            )));
        }

        let start = if parts[0].trim().is_empty() {
            0
        } else {
            parts[0].trim().parse::<u64>().map_err(|e| {
                GatewayError::RangeNotSatisfiable(format!("bad range start: {}", e))
            })?
        };

        let end = if parts[1].trim().is_empty() {
            object_size - 1
        } else {
            parts[1].trim().parse::<u64>().map_err(|e| {
                GatewayError::RangeNotSatisfiable(format!("bad range end: {}", e))
            })?
        };

        ByteRange::new(start, end)
    }

    /// Format this range as a `Content-Range` header value
    pub fn to_content_range(&self, object_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, object_size)
    }
}

/// Opaque reference the remote store uses to identify a stored item.
///
/// Handles may expire; the object resolver issues fresh ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub String);

impl ObjectHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metadata about a stored object, as returned by the object resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Numeric locator of the object (e.g. a message sequence number)
    pub locator: u64,
    /// Handle the remote store addresses the object by
    pub handle: ObjectHandle,
    /// Declared size in bytes
    pub size: u64,
    /// MIME type as stored
    pub mime_type: String,
    /// Content-unique id; its prefix is the capability short hash
    pub unique_id: String,
    /// Client-facing file name
    pub file_name: String,
}

/// Translated form of an HTTP byte range in the store's chunk addressing.
///
/// Produced once per request by the chunk planner, consumed by the stream
/// executor. Pure data, no ownership concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Index of the first chunk to fetch
    pub first_chunk_index: u64,
    /// Number of chunks to fetch; zero means an empty (past-EOF) plan
    pub chunk_count: u64,
    /// Bytes to drop from the front of the first fetched chunk
    pub lead_trim: u64,
    /// Bytes to drop from the back of the last fetched chunk
    pub tail_trim: u64,
    /// Exact number of bytes the client asked for
    pub requested_length: u64,
}

impl ChunkPlan {
    /// An empty plan: the requested range lies entirely past end-of-object
    pub fn empty() -> Self {
        ChunkPlan {
            first_chunk_index: 0,
            chunk_count: 0,
            lead_trim: 0,
            tail_trim: 0,
            requested_length: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

/// Everything the stream executor needs to serve one request
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Numeric locator, needed to re-resolve the handle on expiry
    pub locator: u64,
    /// Current (possibly stale) handle
    pub handle: ObjectHandle,
    /// Declared object size in bytes
    pub object_size: u64,
    /// First requested byte (inclusive)
    pub start: u64,
    /// Last requested byte (inclusive)
    pub end: u64,
}

/// Client-facing links generated for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLinks {
    /// URL that streams the object inline
    pub stream_url: String,
    /// Same URL with forced download disposition
    pub download_url: String,
    /// File name the links point at
    pub file_name: String,
    /// Object size in bytes
    pub size: u64,
}
