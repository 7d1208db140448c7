//! Object resolver collaborator interface
//!
//! The resolver is external to the gateway: given a numeric locator it
//! returns the object's current handle, declared size, MIME type and
//! content-unique id. The gateway calls it once per request (through the
//! metadata cache) and again whenever a handle goes stale mid-stream.

use crate::capability;
use crate::error::Result;
use crate::models::ObjectInfo;
use async_trait::async_trait;

/// Authoritative object lookup
#[async_trait]
pub trait ObjectResolver: Send + Sync {
    /// Resolve a locator to the object's current metadata and a fresh handle.
    ///
    /// # Returns
    /// * `Ok(ObjectInfo)` on success
    /// * `Err(GatewayError::NotFound)` if the locator names nothing
    /// * `Err(GatewayError::ResolverError)` if the resolver itself is down
    async fn resolve(&self, locator: u64) -> Result<ObjectInfo>;

    /// Verify the capability short hash embedded in an identifier against the
    /// object's content-unique id. The default compares the hash against the
    /// id's prefix; deployments with their own hash authority override this.
    fn validate_capability(&self, short_hash: &str, unique_id: &str) -> bool {
        capability::validate_capability(short_hash, unique_id)
    }
}
