//! Stream executor
//!
//! Drives chunk-by-chunk retrieval against a pooled session, enforces the
//! chunk plan's trims, and recovers from the remote store's two expected
//! failure modes (stale handles and out-of-bounds chunk indexes at
//! end-of-object) without restarting the client-visible response.
//!
//! The executor emits a pull-based byte stream: the next chunk is only
//! fetched when the consumer polls for it, so a slow HTTP client throttles
//! upstream reads instead of buffering unboundedly. Dropping the stream
//! (client disconnect) drops the session lease, which releases the pool slot.

use crate::error::{GatewayError, Result};
use crate::metrics::GatewayMetrics;
use crate::models::{ChunkPlan, StreamRequest};
use crate::resolver::ObjectResolver;
use crate::session_pool::{ChunkFetch, SessionLease, SessionPool};
use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Lazy sequence of byte chunks flowing back to the HTTP adapter
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// How many chunk widths before end-of-object an out-of-bounds rejection is
/// considered an expected seek probe rather than a failure
const NEAR_EOF_CHUNKS: u64 = 2;

/// Orchestrates session acquisition, chunk fetching and failure recovery for
/// one request at a time
pub struct StreamExecutor {
    pool: Arc<SessionPool>,
    resolver: Arc<dyn ObjectResolver>,
    metrics: Arc<GatewayMetrics>,
    chunk_size: u64,
    chunk_fetch_timeout: Duration,
    retry_backoff: Duration,
}

impl StreamExecutor {
    pub fn new(
        pool: Arc<SessionPool>,
        resolver: Arc<dyn ObjectResolver>,
        metrics: Arc<GatewayMetrics>,
        chunk_size: u64,
        chunk_fetch_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        StreamExecutor {
            pool,
            resolver,
            metrics,
            chunk_size,
            chunk_fetch_timeout,
            retry_backoff,
        }
    }

    /// Execute one stream request against its chunk plan.
    ///
    /// Acquires a session up front so pool exhaustion surfaces before any
    /// response bytes are committed. An empty plan (request entirely past
    /// end-of-object) completes immediately with zero bytes - clients
    /// legitimately probe that region when seeking.
    pub fn execute(&self, request: StreamRequest, plan: ChunkPlan) -> Result<ByteStream> {
        let lease = self.pool.acquire()?;

        if plan.is_empty() {
            debug!(
                "Empty chunk plan for object {}, emitting zero bytes",
                request.locator
            );
            lease.report_success();
            drop(lease);
            return Ok(Box::pin(futures::stream::empty()));
        }

        let pool = Arc::clone(&self.pool);
        let resolver = Arc::clone(&self.resolver);
        let metrics = Arc::clone(&self.metrics);
        let chunk_size = self.chunk_size;
        let fetch_timeout = self.chunk_fetch_timeout;
        let backoff = self.retry_backoff;

        let stream = try_stream! {
            let mut lease = lease;
            let mut handle = request.handle.clone();
            let end_index = plan.first_chunk_index + plan.chunk_count;
            let mut index = plan.first_chunk_index;
            let mut emitted: u64 = 0;
            let mut refreshed_credential = false;
            let mut retried_transient = false;

            'fetching: while index < end_index && emitted < plan.requested_length {
                let outcome = match timeout(
                    fetch_timeout,
                    lease.session().fetch_chunk(&handle, index),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => ChunkFetch::Transient(format!(
                        "chunk {} fetch timed out after {:?}",
                        index, fetch_timeout
                    )),
                };

                match outcome {
                    ChunkFetch::Chunk(chunk) => {
                        retried_transient = false;
                        let piece = trim_chunk(chunk, index, &plan, emitted);
                        if !piece.is_empty() {
                            emitted += piece.len() as u64;
                            metrics.record_bytes(piece.len() as u64);
                            yield piece;
                        }
                        index += 1;
                    }
                    ChunkFetch::EndOfObject => {
                        if near_end_of_object(request.start, request.object_size, chunk_size) {
                            // Expected boundary probe while seeking near the
                            // end; terminate cleanly with what was emitted.
                            debug!(
                                "Chunk {} past end of object {} near EOF, ending stream",
                                index, request.locator
                            );
                            break 'fetching;
                        }

                        // Unexpected out-of-bounds rejection: discard this
                        // session, re-resolve the handle and restart as a
                        // skip-and-trim read from the beginning.
                        warn!(
                            "Chunk {} rejected as out of bounds for object {} (size {}), \
                             falling back to full rescan",
                            index, request.locator, request.object_size
                        );
                        metrics.record_offset_fallback();
                        lease.report_error();

                        let fresh = resolver.resolve(request.locator).await.map_err(|e| {
                            metrics.record_failed_stream();
                            GatewayError::FatalStream(format!(
                                "re-resolve after invalid offset failed: {}",
                                e
                            ))
                        })?;
                        handle = fresh.handle;
                        lease = pool.acquire()?;

                        let skip_target = request.start + emitted;
                        let mut skipped: u64 = 0;
                        let mut rescan_index: u64 = 0;
                        while emitted < plan.requested_length {
                            let outcome = match timeout(
                                fetch_timeout,
                                lease.session().fetch_chunk(&handle, rescan_index),
                            )
                            .await
                            {
                                Ok(outcome) => outcome,
                                Err(_) => ChunkFetch::Transient(format!(
                                    "rescan chunk {} timed out",
                                    rescan_index
                                )),
                            };

                            match outcome {
                                ChunkFetch::Chunk(mut chunk) => {
                                    if skipped < skip_target {
                                        let skip = std::cmp::min(
                                            chunk.len() as u64,
                                            skip_target - skipped,
                                        );
                                        skipped += skip;
                                        chunk = chunk.slice(skip as usize..);
                                    }
                                    if !chunk.is_empty() {
                                        let remaining = plan.requested_length - emitted;
                                        if chunk.len() as u64 > remaining {
                                            chunk = chunk.slice(..remaining as usize);
                                        }
                                        emitted += chunk.len() as u64;
                                        metrics.record_bytes(chunk.len() as u64);
                                        yield chunk;
                                    }
                                    rescan_index += 1;
                                }
                                ChunkFetch::EndOfObject => break,
                                other => {
                                    abort(&lease, &metrics, format!(
                                        "rescan fallback failed at chunk {}: {:?}",
                                        rescan_index, other
                                    ))?;
                                }
                            }
                        }
                        break 'fetching;
                    }
                    ChunkFetch::CredentialExpired => {
                        if refreshed_credential {
                            abort(&lease, &metrics, format!(
                                "handle for object {} expired again after refresh",
                                request.locator
                            ))?;
                        }
                        refreshed_credential = true;
                        metrics.record_credential_refresh();
                        debug!(
                            "Handle for object {} expired at chunk {}, refreshing",
                            request.locator, index
                        );
                        match resolver.resolve(request.locator).await {
                            Ok(fresh) => {
                                // Resume from the exact chunk that failed
                                handle = fresh.handle;
                            }
                            Err(e) => {
                                abort(&lease, &metrics, format!(
                                    "handle refresh for object {} failed: {}",
                                    request.locator, e
                                ))?;
                            }
                        }
                    }
                    ChunkFetch::Transient(msg) => {
                        if retried_transient {
                            abort(&lease, &metrics, format!(
                                "chunk {} failed twice: {}",
                                index, msg
                            ))?;
                        }
                        retried_transient = true;
                        metrics.record_transient_retry();
                        warn!(
                            "Transient failure on chunk {} of object {}: {}, retrying in {:?}",
                            index, request.locator, msg, backoff
                        );
                        sleep(backoff).await;
                    }
                    ChunkFetch::Fatal(msg) => {
                        abort(&lease, &metrics, format!(
                            "chunk {} of object {} failed: {}",
                            index, request.locator, msg
                        ))?;
                    }
                }
            }

            lease.report_success();
        };

        Ok(Box::pin(stream))
    }
}

/// Report the failure on the lease and metrics, then surface it as the
/// stream's terminal error
fn abort(lease: &SessionLease, metrics: &GatewayMetrics, msg: String) -> Result<Bytes> {
    lease.report_error();
    metrics.record_failed_stream();
    Err(GatewayError::FatalStream(msg))
}

/// Trim a fetched chunk to the requested byte window.
///
/// The lead trim applies only to the first planned chunk; the tail is
/// enforced by capping at the plan's remaining requested length, which also
/// guards against over-read when the store's final chunk is short.
fn trim_chunk(chunk: Bytes, index: u64, plan: &ChunkPlan, emitted: u64) -> Bytes {
    let mut piece = chunk;
    if index == plan.first_chunk_index && plan.lead_trim > 0 {
        let lead = std::cmp::min(plan.lead_trim as usize, piece.len());
        piece = piece.slice(lead..);
    }
    let remaining = plan.requested_length - emitted;
    if piece.len() as u64 > remaining {
        piece = piece.slice(..remaining as usize);
    }
    piece
}

/// True when a requested start lies within the last two chunk widths of the
/// object, where stores routinely reject the final index
fn near_end_of_object(start: u64, object_size: u64, chunk_size: u64) -> bool {
    start >= object_size.saturating_sub(NEAR_EOF_CHUNKS * chunk_size)
}
