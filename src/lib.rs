//! Blobgate
//!
//! A streaming gateway that exposes a chunk-oriented remote blob store as
//! plain HTTP byte-range resources. Clients fetch objects with ordinary GET
//! and Range requests; the gateway translates each request into the store's
//! fixed-size chunk addressing, streams the chunks back with lead and tail
//! trims applied, and hides the store's quirks (expiring handles, per-session
//! load limits, end-of-object index rejections) behind standard HTTP
//! semantics.
//!
//! # Overview
//!
//! - **Capability links**: objects are addressed by an identifier that embeds
//!   a short capability hash, so possession of the link is possession of
//!   access
//! - **Range translation**: HTTP byte ranges become chunk plans (first chunk,
//!   chunk count, lead/tail trims) against the store's fixed chunk size
//! - **Session pooling**: concurrent streams are spread over a pool of store
//!   sessions with load ceilings, error quarantine and periodic health probes
//! - **Mid-stream recovery**: expired handles are refreshed once and the
//!   stream resumes; unexpected out-of-bounds rejections fall back to a full
//!   rescan with skip-and-trim
//! - **Caching**: bounded LRU + TTL caches keep metadata and link lookups off
//!   the resolver's hot path
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use blobgate::{Gateway, GatewayConfig, ObjectResolver, SessionPool};
//! use std::sync::Arc;
//!
//! # async fn run(resolver: Arc<dyn blobgate::ObjectResolver>,
//! #              primary: Arc<dyn blobgate::RemoteSession>) -> blobgate::Result<()> {
//! let config = GatewayConfig::from_file("blobgate.yaml")?;
//! let gateway = Arc::new(Gateway::new(config, resolver)?);
//! gateway.pool().initialize(primary, Vec::new());
//! gateway.serve().await
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`Gateway`]: HTTP adapter and composition root
//! - [`ChunkPlanner`]: byte range to chunk plan translation
//! - [`StreamExecutor`]: chunk fetch loop with trims and failure recovery
//! - [`SessionPool`] / [`RemoteSession`]: load- and health-aware session
//!   selection over the deployment's store client
//! - [`ObjectResolver`]: authoritative locator-to-metadata lookup, supplied
//!   by the deployment
//! - [`CacheRegistry`]: the four bounded cache classes
//! - [`GatewayMetrics`]: counters surfaced by the status endpoint

pub mod cache;
pub mod capability;
pub mod chunk_planner;
pub mod config;
pub mod error;
pub mod http_server;
pub mod links;
pub mod logging;
pub mod metrics;
pub mod mime;
pub mod models;
pub mod resolver;
pub mod session_pool;
pub mod stream_executor;

pub use cache::{CacheRegistry, CacheStats, RegistryStats, TtlLruCache};
pub use capability::{CapabilityId, SHORT_HASH_LEN};
pub use chunk_planner::ChunkPlanner;
pub use config::{CacheClassConfig, GatewayConfig};
pub use error::{GatewayError, Result};
pub use http_server::Gateway;
pub use links::links_for;
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use models::{
    ByteRange, ChunkPlan, ObjectHandle, ObjectInfo, StreamLinks, StreamRequest,
};
pub use resolver::ObjectResolver;
pub use session_pool::{
    ChunkFetch, PoolStats, RemoteSession, SessionLease, SessionPool, SessionStats,
};
pub use stream_executor::{ByteStream, StreamExecutor};
