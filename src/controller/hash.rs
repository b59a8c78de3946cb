//! # Correlation Hash
//!
//! Stable, content-derived keys for component routes.
//!
//! The hash of a route's `namespace/name` is stored as a label on every
//! derived Role and RoleBinding, so derived objects can be found again no
//! matter what the objects themselves are named.

use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digest bytes kept; hex encoding doubles it (32 chars fits a label value)
const HASH_BYTES: usize = 16;

/// Logical identity of a component route
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey {
    pub namespace: String,
    pub name: String,
}

impl LogicalKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Correlation hash of this key
    #[must_use]
    pub fn hash(&self) -> String {
        hash_str(&self.to_string())
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Hash a `(namespace, name)` pair
#[must_use]
pub fn hash_key(namespace: &str, name: &str) -> String {
    hash_str(&format!("{namespace}/{name}"))
}

/// Hash an arbitrary string into a label-safe lowercase hex digest
#[must_use]
pub fn hash_str(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..HASH_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
