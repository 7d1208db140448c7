//! Session pool for authenticated remote-store sessions
//!
//! Owns every session to the remote store and hands out the least-loaded,
//! healthiest one via bounded round-robin. Sessions that fail repeatedly are
//! quarantined (never removed) and re-admitted on the first success. The pool
//! never refuses to hand out a session while one exists: when everything is
//! overloaded or unhealthy it degrades to the primary session, because losing
//! the whole gateway is worse than an overloaded single session.

use crate::error::{GatewayError, Result};
use crate::models::ObjectHandle;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Consecutive failures before a session is quarantined
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Upper bound on round-robin rotations per acquire
const MAX_ROTATION_ATTEMPTS: usize = 3;

/// Pool size above which health probes run concurrently
const CONCURRENT_PROBE_THRESHOLD: usize = 10;

/// Outcome of a single chunk fetch from the remote store.
///
/// The stream executor's recovery state machine pattern-matches on this
/// instead of intercepting transport exceptions.
#[derive(Debug, Clone)]
pub enum ChunkFetch {
    /// The chunk's bytes, in index order
    Chunk(Bytes),
    /// The store rejected the chunk index as past its last valid index
    EndOfObject,
    /// The store's reference to the object has gone stale
    CredentialExpired,
    /// A failure worth one retry (network hiccup, flood control, timeout)
    Transient(String),
    /// A failure retries will not fix
    Fatal(String),
}

/// One authenticated connection to the remote store.
///
/// The pool only depends on this interface; a concrete adapter exists per
/// underlying transport.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Fetch one fixed-size chunk of the object by index
    async fn fetch_chunk(&self, handle: &ObjectHandle, index: u64) -> ChunkFetch;

    /// Lightweight "who am I" round trip used by health checks
    async fn probe(&self) -> Result<()>;
}

/// Per-session bookkeeping, mutated only through the pool's methods
struct SessionEntry {
    session: Arc<dyn RemoteSession>,
    load: u32,
    consecutive_errors: u32,
    healthy: bool,
    last_latency: Duration,
}

impl SessionEntry {
    fn new(session: Arc<dyn RemoteSession>) -> Self {
        SessionEntry {
            session,
            load: 0,
            consecutive_errors: 0,
            healthy: true,
            last_latency: Duration::ZERO,
        }
    }
}

struct PoolInner {
    entries: HashMap<usize, SessionEntry>,
    ring: VecDeque<usize>,
    primary: Option<usize>,
    next_id: usize,
    initialized: bool,
    last_health_check: Option<Instant>,
}

/// Statistics for one session, exposed on the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub id: usize,
    pub load: u32,
    pub consecutive_errors: u32,
    pub healthy: bool,
    pub last_latency_ms: u64,
    pub is_primary: bool,
}

/// Aggregate pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total_sessions: usize,
    pub healthy_sessions: usize,
    pub total_load: u64,
    pub sessions: Vec<SessionStats>,
}

/// Pool of remote-store sessions with load- and health-aware selection
pub struct SessionPool {
    inner: Mutex<PoolInner>,
    load_ceiling: u32,
    probe_timeout: Duration,
    health_check_interval: Duration,
}

impl SessionPool {
    /// Create an empty, uninitialized pool
    pub fn new(
        load_ceiling: u32,
        probe_timeout: Duration,
        health_check_interval: Duration,
    ) -> Self {
        SessionPool {
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                ring: VecDeque::new(),
                primary: None,
                next_id: 0,
                initialized: false,
                last_health_check: None,
            }),
            load_ceiling,
            probe_timeout,
            health_check_interval,
        }
    }

    /// Register the primary session plus zero or more secondaries.
    ///
    /// Idempotent: a second call is a logged no-op so a concurrent
    /// reconfiguration never drops live sessions. Use
    /// [`register_secondary`](Self::register_secondary) to add sessions after
    /// initialization.
    pub fn initialize(
        &self,
        primary: Arc<dyn RemoteSession>,
        secondaries: Vec<Arc<dyn RemoteSession>>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if inner.initialized {
            info!(
                "Session pool already initialized with {} sessions, ignoring",
                inner.entries.len()
            );
            return;
        }

        let primary_id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(primary_id, SessionEntry::new(primary));
        inner.ring.push_back(primary_id);
        inner.primary = Some(primary_id);

        let mut secondary_count = 0;
        for session in secondaries {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(id, SessionEntry::new(session));
            inner.ring.push_back(id);
            secondary_count += 1;
        }

        inner.initialized = true;
        info!(
            "Session pool initialized: {} sessions (1 primary + {} secondaries)",
            inner.entries.len(),
            secondary_count
        );
    }

    /// Add a newly discovered session at runtime
    ///
    /// # Returns
    /// The id assigned to the new session
    pub fn register_secondary(&self, session: Arc<dyn RemoteSession>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(id, SessionEntry::new(session));
        inner.ring.push_back(id);
        info!("Registered new secondary session {}", id);
        id
    }

    /// Acquire a session for one streaming request.
    ///
    /// Selection order:
    /// 1. bounded round-robin: rotate the ring up to `min(pool, 3)` times and
    ///    take the first healthy candidate below the load ceiling;
    /// 2. full scan for the healthy session with the globally minimal load;
    /// 3. the primary session unconditionally (degraded mode).
    ///
    /// Errors only when the pool holds no sessions at all. The returned lease
    /// releases the load slot exactly once when dropped, on every path.
    pub fn acquire(self: &Arc<Self>) -> Result<SessionLease> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.is_empty() {
            return Err(GatewayError::ServiceUnavailable(
                "session pool is not initialized".to_string(),
            ));
        }

        let mut chosen: Option<usize> = None;

        // Phase 1: bounded round-robin
        let attempts = std::cmp::min(inner.ring.len(), MAX_ROTATION_ATTEMPTS);
        for _ in 0..attempts {
            if let Some(id) = inner.ring.pop_front() {
                inner.ring.push_back(id);
                if let Some(entry) = inner.entries.get(&id) {
                    if entry.healthy && entry.load < self.load_ceiling {
                        chosen = Some(id);
                        break;
                    }
                }
            }
        }

        // Phase 2: least-loaded healthy session
        if chosen.is_none() {
            chosen = inner
                .entries
                .iter()
                .filter(|(_, e)| e.healthy)
                .min_by_key(|(_, e)| e.load)
                .map(|(id, _)| *id);
        }

        // Phase 3: primary, unconditionally
        let id = match chosen.or(inner.primary) {
            Some(id) => id,
            None => {
                // No primary recorded means initialize was never called,
                // even though entries exist via register_secondary.
                *inner.entries.keys().next().unwrap()
            }
        };

        let entry = inner.entries.get_mut(&id).unwrap();
        entry.load += 1;
        let session = Arc::clone(&entry.session);
        debug!("Acquired session {} (load now {})", id, entry.load);

        Ok(SessionLease {
            pool: Arc::clone(self),
            id,
            session,
        })
    }

    /// Decrement a session's load, floored at zero
    pub fn release(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.load = entry.load.saturating_sub(1);
            debug!("Released session {} (load now {})", id, entry.load);
        }
    }

    /// Record a failed operation; quarantines the session on the third
    /// consecutive failure
    pub fn report_error(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.consecutive_errors += 1;
            if entry.consecutive_errors >= MAX_CONSECUTIVE_ERRORS && entry.healthy {
                entry.healthy = false;
                warn!(
                    "Session {} quarantined after {} consecutive errors",
                    id, entry.consecutive_errors
                );
            }
        }
    }

    /// Record a successful operation; resets the error counter and re-admits
    /// the session if it was quarantined
    pub fn report_success(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.consecutive_errors = 0;
            if !entry.healthy {
                info!("Session {} re-admitted after successful operation", id);
            }
            entry.healthy = true;
        }
    }

    /// Probe every session and update health state.
    ///
    /// Rate-limited to once per configured interval; calls inside the window
    /// return immediately. Pools larger than 10 sessions are probed
    /// concurrently, smaller ones sequentially to bound connection-setup
    /// overhead.
    pub async fn health_check_all(&self) {
        let snapshot: Vec<(usize, Arc<dyn RemoteSession>)> = {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();
            if let Some(last) = inner.last_health_check {
                if now.duration_since(last) < self.health_check_interval {
                    return;
                }
            }
            inner.last_health_check = Some(now);
            inner
                .entries
                .iter()
                .map(|(id, e)| (*id, Arc::clone(&e.session)))
                .collect()
        };

        if snapshot.len() > CONCURRENT_PROBE_THRESHOLD {
            let probes = snapshot
                .iter()
                .map(|(id, session)| self.probe_one(*id, Arc::clone(session)));
            join_all(probes).await;
        } else {
            for (id, session) in snapshot {
                self.probe_one(id, session).await;
            }
        }
    }

    async fn probe_one(&self, id: usize, session: Arc<dyn RemoteSession>) {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, session.probe()).await;
        let latency = started.elapsed();

        match outcome {
            Ok(Ok(())) => {
                debug!("Health probe for session {} ok in {:?}", id, latency);
                self.record_probe(id, latency, true);
            }
            Ok(Err(e)) => {
                warn!("Health probe for session {} failed: {}", id, e);
                self.record_probe(id, latency, false);
            }
            Err(_) => {
                warn!(
                    "Health probe for session {} timed out after {:?}",
                    id, self.probe_timeout
                );
                self.record_probe(id, latency, false);
            }
        }
    }

    fn record_probe(&self, id: usize, latency: Duration, ok: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.last_latency = latency;
            if ok {
                entry.consecutive_errors = 0;
                if !entry.healthy {
                    info!("Session {} re-admitted after passing health probe", id);
                }
                entry.healthy = true;
            } else {
                entry.consecutive_errors += 1;
                if entry.consecutive_errors >= MAX_CONSECUTIVE_ERRORS && entry.healthy {
                    entry.healthy = false;
                    warn!("Session {} quarantined by health probe", id);
                }
            }
        }
    }

    /// Current pool statistics for the status endpoint
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<SessionStats> = inner
            .entries
            .iter()
            .map(|(id, e)| SessionStats {
                id: *id,
                load: e.load,
                consecutive_errors: e.consecutive_errors,
                healthy: e.healthy,
                last_latency_ms: e.last_latency.as_millis() as u64,
                is_primary: inner.primary == Some(*id),
            })
            .collect();
        sessions.sort_by_key(|s| s.id);

        PoolStats {
            total_sessions: sessions.len(),
            healthy_sessions: sessions.iter().filter(|s| s.healthy).count(),
            total_load: sessions.iter().map(|s| s.load as u64).sum(),
            sessions,
        }
    }
}

/// RAII lease over one acquired session.
///
/// Dropping the lease releases the pool slot, so the release happens exactly
/// once whether a stream completes, fails, or is cancelled mid-flight.
pub struct SessionLease {
    pool: Arc<SessionPool>,
    id: usize,
    session: Arc<dyn RemoteSession>,
}

impl SessionLease {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn session(&self) -> &Arc<dyn RemoteSession> {
        &self.session
    }

    pub fn report_error(&self) {
        self.pool.report_error(self.id);
    }

    pub fn report_success(&self) {
        self.pool.report_success(self.id);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}
