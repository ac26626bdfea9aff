//! Content fingerprints for lineage
//!
//! Observed key sets are hashed so a ledger entry can tell whether two runs
//! saw the same extract. Only the algorithm named in the expectations
//! `defaults.hash_algorithm` is used.

use courtdb_common::db::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
}

impl HashAlgorithm {
    /// Lenient name lookup; unknown names fall back to sha256 with a warning
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => HashAlgorithm::Sha256,
            other => {
                warn!("Unsupported hash algorithm '{}', using sha256", other);
                HashAlgorithm::Sha256
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Hash a sequence of key tuples, order-sensitive
pub fn fingerprint_keys(algorithm: HashAlgorithm, keys: &[Vec<Value>]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            for key in keys {
                for part in key {
                    hasher.update(part.key_repr().as_bytes());
                    hasher.update([0x1f]);
                }
                hasher.update([0x1e]);
            }
            format!("{:x}", hasher.finalize())
        }
    }
}
