//! Capability identifier parsing and validation
//!
//! A capability identifier both names an object and authorizes access to it:
//! a fixed-length short hash derived from the object's content-unique id,
//! followed by the decimal object locator, e.g. `a1b2c3482913`.

use crate::error::{GatewayError, Result};

/// Length of the short capability hash prefix
pub const SHORT_HASH_LEN: usize = 6;

/// A parsed capability identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityId {
    /// The 6-character short hash prefix
    pub short_hash: String,
    /// Numeric object locator
    pub locator: u64,
}

impl CapabilityId {
    /// Parse an identifier of the form `{short_hash}{locator}` with an
    /// optional trailing `/{filename}` segment, which is accepted for
    /// friendlier links and ignored for addressing.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.split('/').next().unwrap_or("");

        if raw.len() <= SHORT_HASH_LEN {
            return Err(GatewayError::InvalidIdentifier(format!(
                "identifier too short: {:?}",
                raw
            )));
        }

        let (hash_part, locator_part) = raw.split_at(SHORT_HASH_LEN);

        if !is_valid_short_hash(hash_part) {
            return Err(GatewayError::InvalidIdentifier(format!(
                "malformed short hash: {:?}",
                hash_part
            )));
        }

        if !locator_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GatewayError::InvalidIdentifier(format!(
                "locator must be decimal digits, got {:?}",
                locator_part
            )));
        }

        let locator = locator_part.parse::<u64>().map_err(|e| {
            GatewayError::InvalidIdentifier(format!("locator out of range: {}", e))
        })?;
        if locator == 0 {
            return Err(GatewayError::InvalidIdentifier(
                "locator must be positive".to_string(),
            ));
        }

        Ok(CapabilityId {
            short_hash: hash_part.to_string(),
            locator,
        })
    }

    /// Render back to the identifier string form
    pub fn to_identifier(&self) -> String {
        format!("{}{}", self.short_hash, self.locator)
    }
}

/// Check short-hash shape: exactly `SHORT_HASH_LEN` characters from
/// `[A-Za-z0-9_-]`.
pub fn is_valid_short_hash(hash: &str) -> bool {
    hash.len() == SHORT_HASH_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Verify a short hash against an object's content-unique id.
///
/// The unique id is an opaque digest-equivalent token issued by the store;
/// the capability hash is its first `SHORT_HASH_LEN` characters. The gateway
/// verifies, it never derives.
pub fn validate_capability(short_hash: &str, unique_id: &str) -> bool {
    if !is_valid_short_hash(short_hash) {
        return false;
    }
    unique_id.len() >= SHORT_HASH_LEN && unique_id[..SHORT_HASH_LEN] == *short_hash
}

/// Derive the short hash for an object's unique id (used when generating
/// links, never when authorizing).
pub fn short_hash_of(unique_id: &str) -> String {
    unique_id.chars().take(SHORT_HASH_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let cap = CapabilityId::parse("a1b2c3482913").unwrap();
        assert_eq!(cap.short_hash, "a1b2c3");
        assert_eq!(cap.locator, 482913);
    }

    #[test]
    fn test_parse_with_filename_suffix() {
        let cap = CapabilityId::parse("a1b2c3482913/movie.mp4").unwrap();
        assert_eq!(cap.short_hash, "a1b2c3");
        assert_eq!(cap.locator, 482913);
    }

    #[test]
    fn test_parse_roundtrip() {
        let cap = CapabilityId::parse("Zz_-0912345").unwrap();
        assert_eq!(cap.to_identifier(), "Zz_-0912345");
    }

    #[test]
    fn test_parse_rejects_short_input() {
        assert!(CapabilityId::parse("abc12").is_err());
        assert!(CapabilityId::parse("abcdef").is_err());
        assert!(CapabilityId::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_locator() {
        assert!(CapabilityId::parse("abcdefxyz").is_err());
        assert!(CapabilityId::parse("abcdef12a4").is_err());
        assert!(CapabilityId::parse("abcdef0").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_hash_chars() {
        assert!(CapabilityId::parse("ab!def123").is_err());
        assert!(CapabilityId::parse("ab cde123").is_err());
    }

    #[test]
    fn test_validate_capability() {
        assert!(validate_capability("AgADBQ", "AgADBQADb6wxG2PeEUfixs0wAg"));
        assert!(!validate_capability("AgADBX", "AgADBQADb6wxG2PeEUfixs0wAg"));
        assert!(!validate_capability("AgADB", "AgADBQADb6wxG2PeEUfixs0wAg"));
        assert!(!validate_capability("AgADBQ", "AgAD"));
    }

    #[test]
    fn test_short_hash_of() {
        assert_eq!(short_hash_of("AgADBQADb6wx"), "AgADBQ");
        assert_eq!(short_hash_of("abc"), "abc");
    }
}
