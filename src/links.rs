//! Client-facing link generation
//!
//! Builds the stream and forced-download URLs for a resolved object. Results
//! are cached in the generated-link cache keyed by locator, so repeated link
//! requests for a hot object never touch the resolver.

use crate::cache::CacheRegistry;
use crate::capability;
use crate::models::{ObjectInfo, StreamLinks};

/// Generate (or fetch from cache) the links for one object.
///
/// The identifier embeds the capability short hash, so possession of the link
/// is possession of access. The `hash` query parameter repeats the prefix the
/// HTTP adapter checks before resolving.
pub fn links_for(base_url: &str, info: &ObjectInfo, caches: &CacheRegistry) -> StreamLinks {
    let key = info.locator.to_string();
    if let Some(cached) = caches.links.get(&key) {
        return cached;
    }

    let base = base_url.trim_end_matches('/');
    let short_hash = capability::short_hash_of(&info.unique_id);
    let identifier = format!("{}{}", short_hash, info.locator);
    let stream_url = format!("{}/{}?hash={}", base, identifier, short_hash);
    let download_url = format!("{}&download=1", stream_url);

    let links = StreamLinks {
        stream_url,
        download_url,
        file_name: info.file_name.clone(),
        size: info.size,
    };
    caches.links.set(key, links.clone());
    links
}
