//! Integration tests for the stream executor
//!
//! Drives the executor against an in-memory remote session and resolver,
//! covering clean streaming, handle expiry recovery, the out-of-bounds
//! rescan fallback, transient retries and lease accounting.

use async_trait::async_trait;
use blobgate::{
    ByteRange, ChunkFetch, ChunkPlanner, GatewayError, GatewayMetrics, ObjectHandle, ObjectInfo,
    ObjectResolver, RemoteSession, Result, SessionPool, StreamExecutor, StreamRequest,
};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CHUNK: u64 = 1024;

fn content(size: usize) -> Bytes {
    Bytes::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

/// In-memory remote session. A fetch succeeds only when the presented handle
/// matches the currently valid one; chunk indexes past the stored content are
/// rejected as end-of-object.
struct FakeSession {
    content: Bytes,
    valid_handle: Mutex<String>,
    /// While the presented handle equals this value, chunk indexes at or
    /// beyond `reject_from` are rejected as out of bounds
    reject_handle: Mutex<Option<(String, u64)>>,
    /// Chunk indexes that fail transiently exactly once
    transient_once: Mutex<Vec<u64>>,
    /// After this many chunks have been served, the valid handle rotates to
    /// the paired value (modelling credentials lapsing mid-stream)
    rotate_after: Mutex<Option<(u64, String)>>,
    fetches: AtomicU64,
    serves: AtomicU64,
}

impl FakeSession {
    fn new(content: Bytes, valid_handle: &str) -> Arc<Self> {
        Arc::new(FakeSession {
            content,
            valid_handle: Mutex::new(valid_handle.to_string()),
            reject_handle: Mutex::new(None),
            transient_once: Mutex::new(Vec::new()),
            rotate_after: Mutex::new(None),
            fetches: AtomicU64::new(0),
            serves: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn fetch_chunk(&self, handle: &ObjectHandle, index: u64) -> ChunkFetch {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if handle.as_str() != self.valid_handle.lock().unwrap().as_str() {
            return ChunkFetch::CredentialExpired;
        }

        if let Some((bad_handle, reject_from)) = self.reject_handle.lock().unwrap().clone() {
            if handle.as_str() == bad_handle && index >= reject_from {
                return ChunkFetch::EndOfObject;
            }
        }

        {
            let mut transient = self.transient_once.lock().unwrap();
            if let Some(pos) = transient.iter().position(|&i| i == index) {
                transient.remove(pos);
                return ChunkFetch::Transient("simulated hiccup".to_string());
            }
        }

        let start = (index * CHUNK) as usize;
        if start >= self.content.len() {
            return ChunkFetch::EndOfObject;
        }
        let end = (start + CHUNK as usize).min(self.content.len());

        let served = self.serves.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, next)) = self.rotate_after.lock().unwrap().clone() {
            if served == after {
                *self.valid_handle.lock().unwrap() = next;
            }
        }
        ChunkFetch::Chunk(self.content.slice(start..end))
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Resolver that hands out a configured fresh handle and, as a side effect,
/// marks that handle valid on the session (modelling the store reissuing
/// access).
struct FakeResolver {
    info: ObjectInfo,
    fresh_handle: String,
    session: Arc<FakeSession>,
    resolves: AtomicU64,
    /// When false, the reissued handle is never marked valid on the session
    reissue_works: AtomicBool,
}

#[async_trait]
impl ObjectResolver for FakeResolver {
    async fn resolve(&self, locator: u64) -> Result<ObjectInfo> {
        if locator != self.info.locator {
            return Err(GatewayError::NotFound(format!("locator {}", locator)));
        }
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.reissue_works.load(Ordering::SeqCst) {
            *self.session.valid_handle.lock().unwrap() = self.fresh_handle.clone();
        }
        let mut info = self.info.clone();
        info.handle = ObjectHandle(self.fresh_handle.clone());
        Ok(info)
    }
}

struct Harness {
    pool: Arc<SessionPool>,
    session: Arc<FakeSession>,
    resolver: Arc<FakeResolver>,
    metrics: Arc<GatewayMetrics>,
    executor: StreamExecutor,
    size: u64,
}

fn harness(data: Bytes, declared_size: u64, current_handle: &str) -> Harness {
    let session = FakeSession::new(data, "valid");
    let pool = Arc::new(SessionPool::new(
        8,
        Duration::from_secs(5),
        Duration::from_secs(120),
    ));
    pool.initialize(session.clone(), Vec::new());

    let resolver = Arc::new(FakeResolver {
        info: ObjectInfo {
            locator: 42,
            handle: ObjectHandle(current_handle.to_string()),
            size: declared_size,
            mime_type: "video/mp4".to_string(),
            unique_id: "abcdefXYZ".to_string(),
            file_name: "clip.mp4".to_string(),
        },
        fresh_handle: "valid".to_string(),
        session: session.clone(),
        resolves: AtomicU64::new(0),
        reissue_works: AtomicBool::new(true),
    });
    let metrics = Arc::new(GatewayMetrics::new());
    let executor = StreamExecutor::new(
        pool.clone(),
        resolver.clone() as Arc<dyn ObjectResolver>,
        metrics.clone(),
        CHUNK,
        Duration::from_secs(5),
        Duration::from_millis(5),
    );
    Harness {
        pool,
        session,
        resolver,
        metrics,
        executor,
        size: declared_size,
    }
}

async fn run(h: &Harness, handle: &str, start: u64, end: u64) -> Result<Vec<u8>> {
    let range = ByteRange::new(start, end)?;
    let plan = ChunkPlanner::new(CHUNK).plan(range, h.size);
    let request = StreamRequest {
        locator: 42,
        handle: ObjectHandle(handle.to_string()),
        object_size: h.size,
        start,
        end,
    };
    let mut stream = h.executor.execute(request, plan)?;
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.extend_from_slice(&item?);
    }
    Ok(out)
}

#[tokio::test]
async fn full_object_download() {
    let data = content(10 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");

    let out = run(&h, "valid", 0, data.len() as u64 - 1).await.unwrap();
    assert_eq!(out, data.to_vec());
    assert_eq!(h.metrics.snapshot().bytes_streamed, data.len() as u64);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn mid_file_seek_returns_exact_window() {
    let data = content(10 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");

    // Unaligned on both ends, spanning three chunks
    let out = run(&h, "valid", 1500, 3499).await.unwrap();
    assert_eq!(out, data[1500..=3499].to_vec());
    assert_eq!(out.len(), 2000);
}

#[tokio::test]
async fn expired_handle_is_refreshed_exactly_once() {
    let data = content(4 * 1024);
    let h = harness(data.clone(), data.len() as u64, "stale");

    // Request arrives with a stale handle; first fetch trips the refresh
    let out = run(&h, "stale", 0, data.len() as u64 - 1).await.unwrap();
    assert_eq!(out, data.to_vec());
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.snapshot().credential_refreshes, 1);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn expiry_mid_stream_resumes_without_gaps() {
    let data = content(5 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");
    // The store rotates credentials after the first chunk is served, so the
    // second of five fetches fails with an expired handle
    *h.session.rotate_after.lock().unwrap() = Some((1, "rotated".to_string()));

    let out = run(&h, "valid", 0, data.len() as u64 - 1).await.unwrap();
    // Byte-exact across the resume: nothing duplicated, nothing dropped
    assert_eq!(out, data.to_vec());
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(h.metrics.snapshot().credential_refreshes, 1);
    assert_eq!(h.metrics.snapshot().failed_streams, 0);
    // Five served chunks plus the one rejected fetch
    assert_eq!(h.session.fetches.load(Ordering::SeqCst), 6);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn second_expiry_after_refresh_is_fatal() {
    let data = content(4 * 1024);
    let h = harness(data.clone(), data.len() as u64, "stale");
    // The reissued handle never becomes valid either
    h.resolver.reissue_works.store(false, Ordering::SeqCst);
    *h.session.valid_handle.lock().unwrap() = "rotated".to_string();

    let result = run(&h, "stale", 0, data.len() as u64 - 1).await;
    match result {
        Err(GatewayError::FatalStream(_)) => {}
        other => panic!("expected fatal stream error, got {:?}", other),
    }
    assert_eq!(h.metrics.snapshot().credential_refreshes, 1);
    assert_eq!(h.metrics.snapshot().failed_streams, 1);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    let data = content(6 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");
    h.session.transient_once.lock().unwrap().push(3);

    let out = run(&h, "valid", 0, data.len() as u64 - 1).await.unwrap();
    assert_eq!(out, data.to_vec());
    assert_eq!(h.metrics.snapshot().transient_retries, 1);
    assert_eq!(h.metrics.snapshot().failed_streams, 0);
}

#[tokio::test]
async fn repeated_transient_failures_are_fatal() {
    let data = content(6 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");
    // Same chunk fails twice in a row
    {
        let mut transient = h.session.transient_once.lock().unwrap();
        transient.push(2);
        transient.push(2);
    }

    let result = run(&h, "valid", 0, data.len() as u64 - 1).await;
    assert!(matches!(result, Err(GatewayError::FatalStream(_))));
    assert_eq!(h.metrics.snapshot().transient_retries, 1);
    assert_eq!(h.metrics.snapshot().failed_streams, 1);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn eof_probe_near_end_completes_empty() {
    // Declared size overstates the stored content; a read in the final
    // chunk window hits the store's end-of-object rejection
    let data = content(9 * 1024);
    let declared = 10 * 1024;
    let h = harness(data, declared as u64, "valid");

    let out = run(&h, "valid", 9 * 1024 + 100, declared as u64 - 1)
        .await
        .unwrap();
    assert!(out.is_empty());
    assert_eq!(h.metrics.snapshot().failed_streams, 0);
    assert_eq!(h.metrics.snapshot().offset_fallbacks, 0);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn request_past_declared_size_yields_nothing() {
    let data = content(4 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");

    let out = run(&h, "valid", 100 * 1024, 101 * 1024).await.unwrap();
    assert!(out.is_empty());
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn unexpected_rejection_falls_back_to_rescan() {
    let data = content(10 * 1024);
    let h = harness(data.clone(), data.len() as u64, "old");
    // The "old" handle starts rejecting from chunk 2 even though the object
    // is far longer; the reissued "valid" handle serves everything
    *h.session.valid_handle.lock().unwrap() = "old".to_string();
    *h.session.reject_handle.lock().unwrap() = Some(("old".to_string(), 2));

    let out = run(&h, "old", 0, 5 * 1024 - 1).await.unwrap();
    assert_eq!(out, data[..5 * 1024].to_vec());
    assert_eq!(h.metrics.snapshot().offset_fallbacks, 1);
    assert_eq!(h.resolver.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn dropping_stream_releases_the_session() {
    let data = content(10 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");

    let range = ByteRange::new(0, data.len() as u64 - 1).unwrap();
    let plan = ChunkPlanner::new(CHUNK).plan(range, h.size);
    let request = StreamRequest {
        locator: 42,
        handle: ObjectHandle("valid".to_string()),
        object_size: h.size,
        start: 0,
        end: data.len() as u64 - 1,
    };
    let mut stream = h.executor.execute(request, plan).unwrap();

    // Consume one chunk, then abandon the stream mid-flight
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.len(), CHUNK as usize);
    assert_eq!(h.pool.stats().total_load, 1);

    drop(stream);
    assert_eq!(h.pool.stats().total_load, 0);
}

#[tokio::test]
async fn pulls_are_lazy() {
    let data = content(10 * 1024);
    let h = harness(data.clone(), data.len() as u64, "valid");

    let range = ByteRange::new(0, data.len() as u64 - 1).unwrap();
    let plan = ChunkPlanner::new(CHUNK).plan(range, h.size);
    let request = StreamRequest {
        locator: 42,
        handle: ObjectHandle("valid".to_string()),
        object_size: h.size,
        start: 0,
        end: data.len() as u64 - 1,
    };
    let mut stream = h.executor.execute(request, plan).unwrap();

    stream.next().await.unwrap().unwrap();
    stream.next().await.unwrap().unwrap();
    // Only the chunks actually polled for have been fetched upstream
    assert_eq!(h.session.fetches.load(Ordering::SeqCst), 2);
}
