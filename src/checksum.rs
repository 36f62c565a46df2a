//! Checksum utilities for snapshot integrity verification

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::Snapshot;

/// SHA256 checksum of a snapshot's canonical JSON
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum of a snapshot.
    ///
    /// Object keys serialize in sorted order, so equal snapshots always hash
    /// the same regardless of how their props were built.
    pub fn of_snapshot(snapshot: &Snapshot) -> serde_json::Result<Self> {
        let canonical = serde_json::to_vec(snapshot)?;
        Ok(Self::from_bytes(&canonical))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a snapshot matches this checksum
    pub fn verify(&self, snapshot: &Snapshot) -> bool {
        Self::of_snapshot(snapshot)
            .map(|computed| computed == *self)
            .unwrap_or(false)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, VersionVector};
    use serde_json::json;

    fn snapshot(name: &str) -> Snapshot {
        Snapshot::new(
            vec![Record::new("page:1", "page", json!({"name": name, "index": "a1"}))],
            VersionVector::new(2).with_type("page", 0),
        )
    }

    #[test]
    fn test_checksum_consistency() {
        let a = Checksum::of_snapshot(&snapshot("Page 1")).unwrap();
        let b = Checksum::of_snapshot(&snapshot("Page 1")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_checksum_key_order_independent() {
        let a = Snapshot::new(
            vec![Record::new("page:1", "page", json!({"name": "x", "index": "a1"}))],
            VersionVector::default(),
        );
        let b = Snapshot::new(
            vec![Record::new("page:1", "page", json!({"index": "a1", "name": "x"}))],
            VersionVector::default(),
        );
        assert_eq!(Checksum::of_snapshot(&a).unwrap(), Checksum::of_snapshot(&b).unwrap());
    }

    #[test]
    fn test_checksum_verification() {
        let checksum = Checksum::of_snapshot(&snapshot("Page 1")).unwrap();
        assert!(checksum.verify(&snapshot("Page 1")));
        assert!(!checksum.verify(&snapshot("Page 2")));
    }
}
