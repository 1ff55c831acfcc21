//! Core hash minting
//!
//! The subject mapper is the only place a `core_hash` is computed. Hashes are
//! memoised per mapper so each canonical signature is hashed once.

use crate::error::SnapshotError;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;

/// Deterministic short-hash service
#[async_trait]
pub trait HashService: Send + Sync {
    /// Short hash of a canonical signature, stable across runs
    async fn short_hash(&self, canonical_signature: &str) -> Result<String, SnapshotError>;
}

/// Blake3 short hash: hex of the first 8 digest bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3ShortHash;

impl Blake3ShortHash {
    /// Hash synchronously
    #[inline]
    #[must_use]
    pub fn compute(canonical_signature: &str) -> String {
        let digest = blake3::hash(canonical_signature.as_bytes());
        hex::encode(&digest.as_bytes()[..8])
    }
}

#[async_trait]
impl HashService for Blake3ShortHash {
    async fn short_hash(&self, canonical_signature: &str) -> Result<String, SnapshotError> {
        Ok(Self::compute(canonical_signature))
    }
}

/// Memoising wrapper around another hash service
#[derive(Clone)]
pub struct MemoizedHashService {
    inner: Arc<dyn HashService>,
    cache: Cache<String, String>,
}

impl std::fmt::Debug for MemoizedHashService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoizedHashService")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl MemoizedHashService {
    /// Wrap `inner` with a cache of `max_capacity` entries
    #[must_use]
    pub fn new(inner: Arc<dyn HashService>, max_capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(max_capacity),
        }
    }
}

#[async_trait]
impl HashService for MemoizedHashService {
    async fn short_hash(&self, canonical_signature: &str) -> Result<String, SnapshotError> {
        if let Some(hit) = self.cache.get(canonical_signature).await {
            return Ok(hit);
        }
        let hash = self.inner.short_hash(canonical_signature).await?;
        self.cache
            .insert(canonical_signature.to_string(), hash.clone())
            .await;
        Ok(hash)
    }
}
