use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Cache key for a logical query.
///
/// A key is built from human-readable, **stable** metadata naming the
/// query and all of its inputs (e.g. `users:list` with `page=2`). The
/// metadata is SHA-256 hashed; equality and hashing operate on the digest.
///
/// Two logically distinct queries must never serialize to the same
/// metadata; the caching layer does not detect collisions.
#[derive(Debug, Clone, Eq)]
pub struct QueryKey {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for QueryKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl QueryKey {
    /// Creates a key for a query without parameters.
    pub fn new(name: &str) -> Self {
        Self::builder(name).build()
    }

    /// Creates a [`QueryKeyBuilder`] for the named query, to which all
    /// contributing inputs should be written.
    pub fn builder(name: &str) -> QueryKeyBuilder {
        QueryKeyBuilder {
            metadata: format!("query: {name}\n"),
        }
    }

    /// Returns the human-readable metadata that forms the basis of this
    /// key. Useful for debugging which inputs produced it.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }
}

/// A builder for [`QueryKey`]s.
///
/// Implements [`fmt::Write`]; the intention is to accept human-readable,
/// but most importantly **stable**, input. Unstable input (addresses,
/// random ordering of parameters) leads to bad cache reuse.
pub struct QueryKeyBuilder {
    metadata: String,
}

impl QueryKeyBuilder {
    /// Writes one named query input into the key.
    pub fn write_param(&mut self, name: &str, value: impl fmt::Display) -> fmt::Result {
        self.metadata.write_fmt(format_args!("{name}={value}\n"))
    }

    /// Finalize the [`QueryKey`].
    pub fn build(self) -> QueryKey {
        let hash = Sha256::digest(&self.metadata);
        let hash = <[u8; 32]>::try_from(hash.as_slice()).expect("sha256 outputs 32 bytes");

        QueryKey {
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl fmt::Write for QueryKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}
