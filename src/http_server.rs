//! HTTP adapter
//!
//! Maps the gateway's internals onto plain HTTP/1.1: capability identifiers
//! in the path, byte ranges in headers, chunk streams as response bodies.
//! Routing is deliberately small, one object route plus a status endpoint
//! and CORS preflight.

use crate::cache::CacheRegistry;
use crate::capability::CapabilityId;
use crate::chunk_planner::ChunkPlanner;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::links;
use crate::metrics::GatewayMetrics;
use crate::mime;
use crate::models::{ByteRange, ObjectInfo, StreamLinks, StreamRequest};
use crate::resolver::ObjectResolver;
use crate::session_pool::SessionPool;
use crate::stream_executor::{ByteStream, StreamExecutor};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Response body: either a buffered payload or a live chunk stream.
///
/// Unsync boxing because the chunk stream is `Send` but not `Sync`; each
/// body is polled from the one connection task that owns it.
pub type GatewayBody = UnsyncBoxBody<Bytes, GatewayError>;

fn full_body(data: impl Into<Bytes>) -> GatewayBody {
    Full::new(data.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

fn empty_body() -> GatewayBody {
    Empty::new()
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

fn stream_body(stream: ByteStream) -> GatewayBody {
    StreamBody::new(stream.map(|item| item.map(Frame::data))).boxed_unsync()
}

/// Extract a single query parameter from a request URI.
///
/// Capability hashes and flags are plain URL-safe tokens, so no percent
/// decoding is performed.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            return Some(parts.next().unwrap_or("").to_string());
        }
    }
    None
}

/// The assembled gateway: pool, resolver, caches, planner and executor
/// behind one HTTP surface
pub struct Gateway {
    config: GatewayConfig,
    pool: Arc<SessionPool>,
    resolver: Arc<dyn ObjectResolver>,
    caches: Arc<CacheRegistry>,
    planner: ChunkPlanner,
    executor: StreamExecutor,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    /// Build a gateway from a validated configuration and a resolver.
    ///
    /// Sessions are registered on the returned pool (via
    /// [`SessionPool::initialize`]) before calling [`Gateway::serve`].
    pub fn new(config: GatewayConfig, resolver: Arc<dyn ObjectResolver>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(SessionPool::new(
            config.load_ceiling,
            config.probe_timeout(),
            config.health_check_interval(),
        ));
        let caches = Arc::new(CacheRegistry::from_config(&config));
        let planner = ChunkPlanner::new(config.chunk_size);
        let metrics = Arc::new(GatewayMetrics::new());
        let executor = StreamExecutor::new(
            Arc::clone(&pool),
            Arc::clone(&resolver),
            Arc::clone(&metrics),
            config.chunk_size,
            config.chunk_fetch_timeout(),
            config.retry_backoff(),
        );

        Ok(Gateway {
            config,
            pool,
            resolver,
            caches,
            planner,
            executor,
            metrics,
        })
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Generate the client-facing stream and download links for an object
    pub fn links_for(&self, info: &ObjectInfo) -> StreamLinks {
        links::links_for(&self.config.base_url, info, &self.caches)
    }

    /// Accept loop. Spawns one task per connection and a background health
    /// check ticker for the session pool.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = self.config.bind_address.parse().map_err(|e| {
            GatewayError::ConfigError(format!(
                "invalid bind address {:?}: {}",
                self.config.bind_address, e
            ))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::ConfigError(format!("failed to bind {}: {}", addr, e))
        })?;
        info!("Gateway listening on http://{}", addr);

        let pool = Arc::clone(&self.pool);
        let interval = self.config.health_check_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pool.health_check_all().await;
            }
        });

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let gateway = Arc::clone(&self);

            tokio::task::spawn(async move {
                let result = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            let gateway = gateway.clone();
                            async move { Ok::<_, Infallible>(gateway.handle(req).await) }
                        }),
                    )
                    .await;

                if let Err(err) = result {
                    debug!("Connection from {} ended with error: {:?}", peer, err);
                }
            });
        }
    }

    /// Route a single request. Never returns an error; failures become
    /// status-coded responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<GatewayBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(|q| q.to_string());
        let range_header = req
            .headers()
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        debug!("{} {} range={:?}", method, path, range_header);

        if method == Method::OPTIONS {
            return preflight_response();
        }

        if path == "/status" && method == Method::GET {
            return self.status_response();
        }

        if method != Method::GET && method != Method::HEAD {
            return error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "only GET, HEAD and OPTIONS are supported",
            );
        }

        let identifier = path.trim_start_matches('/');
        if identifier.is_empty() {
            return error_response(StatusCode::NOT_FOUND, "no such resource");
        }

        self.metrics.record_request(range_header.is_some());

        match self
            .handle_object(&method, identifier, query.as_deref(), range_header.as_deref())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let status = StatusCode::from_u16(e.to_http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!("Request for {} failed: {}", path, e);
                } else {
                    debug!("Request for {} rejected: {}", path, e);
                }
                error_response(status, &e.to_string())
            }
        }
    }

    async fn handle_object(
        &self,
        method: &Method,
        identifier: &str,
        query: Option<&str>,
        range_header: Option<&str>,
    ) -> Result<Response<GatewayBody>> {
        let cap = CapabilityId::parse(identifier)?;

        // The hash query parameter must repeat the identifier's own prefix;
        // a mismatch means a tampered or mis-copied link.
        match query_param(query, "hash") {
            Some(h) if h == cap.short_hash => {}
            _ => {
                return Err(GatewayError::Forbidden(
                    "capability hash missing or mismatched".to_string(),
                ))
            }
        }

        let info = self.resolve_cached(cap.locator).await?;

        if !self
            .resolver
            .validate_capability(&cap.short_hash, &info.unique_id)
        {
            return Err(GatewayError::Forbidden(format!(
                "capability hash does not match object {}",
                cap.locator
            )));
        }

        let force_download = query_param(query, "download").as_deref() == Some("1");
        let content_type = effective_mime(&info);
        let streamable = mime::is_streamable(content_type);

        if *method == Method::HEAD {
            let mut builder = Response::builder().status(StatusCode::OK);
            builder = common_headers(builder, &info, content_type, streamable, force_download);
            builder = builder.header(header::CONTENT_LENGTH, info.size);
            return Ok(builder.body(empty_body()).map_err(http_build_error)?);
        }

        match range_header {
            Some(raw) => {
                // Malformed ranges and start > end both surface here as 416
                let range = match ByteRange::from_header(raw, info.size) {
                    Ok(range) => range,
                    Err(e) => {
                        return Ok(range_not_satisfiable(info.size, &e.to_string())?);
                    }
                };
                self.serve_range(&info, range, StatusCode::PARTIAL_CONTENT, force_download)
            }
            None => {
                if info.size == 0 {
                    let mut builder = Response::builder().status(StatusCode::OK);
                    builder = common_headers(
                        builder,
                        &info,
                        content_type,
                        streamable,
                        force_download,
                    );
                    builder = builder.header(header::CONTENT_LENGTH, 0);
                    return Ok(builder.body(empty_body()).map_err(http_build_error)?);
                }
                let range = ByteRange::new(0, info.size - 1)?;
                self.serve_range(&info, range, StatusCode::OK, force_download)
            }
        }
    }

    fn serve_range(
        &self,
        info: &ObjectInfo,
        range: ByteRange,
        status: StatusCode,
        force_download: bool,
    ) -> Result<Response<GatewayBody>> {
        let plan = self.planner.plan(range, info.size);
        let request = StreamRequest {
            locator: info.locator,
            handle: info.handle.clone(),
            object_size: info.size,
            start: range.start,
            end: range.end,
        };
        let stream = self.executor.execute(request, plan)?;

        let content_type = effective_mime(info);
        let streamable = mime::is_streamable(content_type);

        let mut builder = Response::builder().status(status);
        builder = common_headers(builder, info, content_type, streamable, force_download);
        builder = builder.header(header::CONTENT_LENGTH, plan.requested_length);
        if status == StatusCode::PARTIAL_CONTENT && !plan.is_empty() {
            // An open-ended or overlong end is satisfied up to the last byte;
            // the header must report what is actually sent, not what was asked.
            let served = ByteRange::new(range.start, range.end.min(info.size - 1))?;
            builder = builder.header(header::CONTENT_RANGE, served.to_content_range(info.size));
        }

        let body = if plan.is_empty() {
            empty_body()
        } else {
            stream_body(stream)
        };
        builder.body(body).map_err(http_build_error)
    }

    /// Resolve through the metadata cache, falling back to the resolver
    async fn resolve_cached(&self, locator: u64) -> Result<ObjectInfo> {
        let key = locator.to_string();
        if let Some(info) = self.caches.metadata.get(&key) {
            return Ok(info);
        }
        let info = self.resolver.resolve(locator).await?;
        self.caches.metadata.set(key, info.clone());
        Ok(info)
    }

    fn status_response(&self) -> Response<GatewayBody> {
        let status = serde_json::json!({
            "sessions": self.pool.stats(),
            "caches": self.caches.stats(),
            "metrics": self.metrics.snapshot(),
        });
        match serde_json::to_vec(&status) {
            Ok(body) => {
                let builder = Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/json");
                cors_headers(builder)
                    .body(full_body(body))
                    .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "status"))
            }
            Err(e) => {
                error!("Failed to serialize status: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "status serialization failed")
            }
        }
    }
}

/// MIME type to serve: the stored one, or a guess from the file name when
/// the store recorded none
fn effective_mime(info: &ObjectInfo) -> &str {
    if info.mime_type.is_empty() {
        mime::from_file_name(&info.file_name)
    } else {
        mime::browser_compatible(&info.mime_type)
    }
}

fn cors_headers(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, OPTIONS")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Range, Content-Type")
}

fn common_headers(
    builder: hyper::http::response::Builder,
    info: &ObjectInfo,
    content_type: &str,
    streamable: bool,
    force_download: bool,
) -> hyper::http::response::Builder {
    let disposition = if force_download || !streamable {
        format!("attachment; filename=\"{}\"", info.file_name)
    } else {
        format!("inline; filename=\"{}\"", info.file_name)
    };
    let cache_control = if streamable {
        "public, max-age=3600"
    } else {
        "no-cache"
    };

    let mut builder = cors_headers(builder)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, cache_control);

    if streamable {
        builder = builder
            .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
            .header(header::X_FRAME_OPTIONS, "SAMEORIGIN");
    }
    builder
}

fn preflight_response() -> Response<GatewayBody> {
    cors_headers(Response::builder().status(StatusCode::NO_CONTENT))
        .header(header::ACCESS_CONTROL_MAX_AGE, "86400")
        .body(empty_body())
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "preflight"))
}

fn error_response(status: StatusCode, message: &str) -> Response<GatewayBody> {
    let body = serde_json::json!({ "error": message }).to_string();
    let response = cors_headers(Response::builder().status(status))
        .header(header::CONTENT_TYPE, "application/json")
        .body(full_body(body));
    match response {
        Ok(response) => response,
        Err(_) => {
            // Builder failures here would mean a malformed constant header
            let mut fallback = Response::new(empty_body());
            *fallback.status_mut() = status;
            fallback
        }
    }
}

fn range_not_satisfiable(object_size: u64, message: &str) -> Result<Response<GatewayBody>> {
    let body = serde_json::json!({ "error": message }).to_string();
    cors_headers(Response::builder().status(StatusCode::RANGE_NOT_SATISFIABLE))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_RANGE, format!("bytes */{}", object_size))
        .body(full_body(body))
        .map_err(http_build_error)
}

fn http_build_error(e: hyper::http::Error) -> GatewayError {
    GatewayError::FatalStream(format!("failed to build response: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        let q = Some("hash=a1b2c3&download=1");
        assert_eq!(query_param(q, "hash").as_deref(), Some("a1b2c3"));
        assert_eq!(query_param(q, "download").as_deref(), Some("1"));
        assert_eq!(query_param(q, "missing"), None);
        assert_eq!(query_param(None, "hash"), None);
    }

    #[test]
    fn test_query_param_empty_value() {
        assert_eq!(query_param(Some("hash="), "hash").as_deref(), Some(""));
        assert_eq!(query_param(Some("hash"), "hash").as_deref(), Some(""));
    }

    #[test]
    fn test_effective_mime_falls_back_to_file_name() {
        let info = ObjectInfo {
            locator: 1,
            handle: crate::models::ObjectHandle("h".into()),
            size: 10,
            mime_type: String::new(),
            unique_id: "abcdef123".into(),
            file_name: "song.mp3".into(),
        };
        assert_eq!(effective_mime(&info), "audio/mpeg");
    }

    #[test]
    fn test_effective_mime_remaps_stored_type() {
        let info = ObjectInfo {
            locator: 1,
            handle: crate::models::ObjectHandle("h".into()),
            size: 10,
            mime_type: "video/x-matroska".into(),
            unique_id: "abcdef123".into(),
            file_name: "movie.mkv".into(),
        };
        assert_eq!(effective_mime(&info), "video/mp4");
    }

    #[test]
    fn test_preflight_headers() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_MAX_AGE)
                .unwrap(),
            "86400"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }
}
