//! Subresource integrity metadata (`sha256-`, `sha384-`, `sha512-`).

use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntegrityAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntegrityMetadata {
    pub algorithm: IntegrityAlgorithm,
    /// Base64 digest as written in the attribute.
    pub digest: String,
}

/// Parsed integrity attribute. Unknown algorithms and malformed tokens are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityMetadataSet {
    entries: Vec<IntegrityMetadata>,
}

impl IntegrityMetadataSet {
    pub fn parse(attribute: &str) -> Self {
        let mut entries: Vec<IntegrityMetadata> = attribute
            .split_ascii_whitespace()
            .filter_map(|token| {
                let (algorithm, rest) = token.split_once('-')?;
                let algorithm = match algorithm.to_ascii_lowercase().as_str() {
                    "sha256" => IntegrityAlgorithm::Sha256,
                    "sha384" => IntegrityAlgorithm::Sha384,
                    "sha512" => IntegrityAlgorithm::Sha512,
                    _ => return None,
                };
                // Options after '?' are reserved and ignored.
                let digest = rest.split('?').next().unwrap_or("").to_string();
                (!digest.is_empty()).then_some(IntegrityMetadata { algorithm, digest })
            })
            .collect();
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check `data` against the strongest algorithms present. An empty set
    /// always matches.
    pub fn matches(&self, data: &[u8]) -> bool {
        let Some(strongest) = self.entries.iter().map(|m| m.algorithm).max() else {
            return true;
        };
        let actual = digest(strongest, data);
        self.entries
            .iter()
            .filter(|m| m.algorithm == strongest)
            .any(|m| normalize(&m.digest) == normalize(&actual))
    }
}

fn digest(algorithm: IntegrityAlgorithm, data: &[u8]) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    match algorithm {
        IntegrityAlgorithm::Sha256 => engine.encode(Sha256::digest(data)),
        IntegrityAlgorithm::Sha384 => engine.encode(Sha384::digest(data)),
        IntegrityAlgorithm::Sha512 => engine.encode(Sha512::digest(data)),
    }
}

/// Accept base64url digests and missing padding.
fn normalize(digest: &str) -> String {
    digest
        .trim_end_matches('=')
        .replace('-', "+")
        .replace('_', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_digest() {
        let data = b"alert('hi');";
        let attribute = format!("sha256-{}", digest(IntegrityAlgorithm::Sha256, data));
        let set = IntegrityMetadataSet::parse(&attribute);
        assert!(set.matches(data));
        assert!(!set.matches(b"alert('bye');"));
    }

    #[test]
    fn test_strongest_algorithm_wins() {
        let data = b"body{}";
        let attribute = format!(
            "sha256-{} sha512-AAAA",
            digest(IntegrityAlgorithm::Sha256, data)
        );
        // Only the sha512 entry is consulted, and it does not match.
        assert!(!IntegrityMetadataSet::parse(&attribute).matches(data));
    }

    #[test]
    fn test_unknown_tokens_are_ignored() {
        let set = IntegrityMetadataSet::parse("md5-abc  garbage");
        assert!(set.is_empty());
        assert!(set.matches(b"anything"));
    }

    #[test]
    fn test_sets_compare_order_independently() {
        let a = IntegrityMetadataSet::parse("sha256-abc sha384-def");
        let b = IntegrityMetadataSet::parse("sha384-def sha256-abc");
        assert_eq!(a, b);
    }
}
