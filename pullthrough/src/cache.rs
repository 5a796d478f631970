//! Digest-to-repository cache
//!
//! A bounded reverse index remembering which repositories recently
//! answered for a digest, so repeated pull-through resolutions skip the
//! candidate search. Entries expire on a TTL; distinct digests are
//! bounded by an LRU policy independent of the per-entry TTLs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use registry_core::Digest;

use crate::config::PullthroughConfig;

/// One remembered association between a digest and a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BucketEntry {
    repository: String,
    evict_on: Option<DateTime<Utc>>,
}

impl BucketEntry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        // No expiry means already stale: evict first, never report.
        match self.evict_on {
            Some(evict_on) => evict_on <= now,
            None => true,
        }
    }
}

/// An ordered sequence of entries for one digest, capacity
/// `bucket_size`, ascending by expiry with stale entries first.
#[derive(Debug, Default)]
struct RepositoryBucket {
    entries: Vec<BucketEntry>,
}

impl RepositoryBucket {
    /// Merge `repositories` into the bucket with a fresh expiry. An
    /// already-present repository has its expiry replaced. On overflow
    /// the soonest-expiring entries are dropped, keeping the
    /// longest-lived associations.
    fn add(
        &mut self,
        now: DateTime<Utc>,
        ttl: Duration,
        bucket_size: usize,
        repositories: &[&str],
    ) {
        if repositories.is_empty() {
            return;
        }

        let evict_on = Some(now + ttl);
        for repository in repositories {
            self.entries.retain(|entry| entry.repository != *repository);
            self.entries.push(BucketEntry {
                repository: repository.to_string(),
                evict_on,
            });
        }

        // Stable sort keeps batch order among entries sharing an expiry,
        // so an oversized batch retains its most recent members.
        self.entries.sort_by_key(|entry| entry.evict_on);
        if self.entries.len() > bucket_size {
            let excess = self.entries.len() - bucket_size;
            self.entries.drain(..excess);
        }
    }

    /// Non-expired repository names, soonest expiry first.
    fn copy(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.expired(now))
            .map(|entry| entry.repository.clone())
            .collect()
    }

    fn remove(&mut self, repositories: &[&str]) {
        self.entries
            .retain(|entry| !repositories.contains(&entry.repository.as_str()));
    }
}

#[derive(Debug, Default)]
struct CacheIndex {
    buckets: HashMap<Digest, Arc<Mutex<RepositoryBucket>>>,
    last_used: HashMap<Digest, u64>,
    clock: u64,
}

impl CacheIndex {
    fn touch(&mut self, digest: &Digest) {
        self.clock += 1;
        self.last_used.insert(digest.clone(), self.clock);
    }

    fn evict_lru(&mut self, max_digests: usize) {
        while self.buckets.len() > max_digests {
            let Some(oldest) = self
                .last_used
                .iter()
                .min_by_key(|(_, used)| **used)
                .map(|(digest, _)| digest.clone())
            else {
                break;
            };
            self.buckets.remove(&oldest);
            self.last_used.remove(&oldest);
        }
    }
}

/// Process-wide cache mapping digests to the repositories that recently
/// answered for them.
///
/// Constructed once at startup and shared by reference across all
/// request-handling components. The index lock is held only long enough
/// to locate a bucket; each bucket has its own lock, so lookups for
/// unrelated digests do not contend.
#[derive(Debug)]
pub struct RepositoryCache {
    bucket_size: usize,
    max_digests: usize,
    index: Mutex<CacheIndex>,
}

impl RepositoryCache {
    /// Create a cache sized by the pull-through configuration.
    pub fn new(config: &PullthroughConfig) -> Self {
        RepositoryCache {
            bucket_size: config.bucket_size,
            max_digests: config.max_digests,
            index: Mutex::new(CacheIndex::default()),
        }
    }

    fn bucket(&self, digest: &Digest, create: bool) -> Option<Arc<Mutex<RepositoryBucket>>> {
        let mut index = self.index.lock();
        if create {
            index.touch(digest);
            let bucket = index
                .buckets
                .entry(digest.clone())
                .or_default()
                .clone();
            index.evict_lru(self.max_digests);
            Some(bucket)
        } else {
            let bucket = index.buckets.get(digest).cloned();
            if bucket.is_some() {
                index.touch(digest);
            }
            bucket
        }
    }

    /// Remember that `repositories` were seen to hold `digest` for the
    /// next `ttl`.
    pub fn remember(&self, digest: &Digest, ttl: Duration, repositories: &[&str]) {
        self.remember_at(Utc::now(), digest, ttl, repositories)
    }

    /// [`RepositoryCache::remember`] against an explicit clock.
    pub fn remember_at(
        &self,
        now: DateTime<Utc>,
        digest: &Digest,
        ttl: Duration,
        repositories: &[&str],
    ) {
        if repositories.is_empty() {
            return;
        }
        tracing::trace!(%digest, ?repositories, "remember digest repositories");
        let bucket = self
            .bucket(digest, true)
            .expect("bucket is created on remember");
        bucket.lock().add(now, ttl, self.bucket_size, repositories);
    }

    /// The non-expired repositories remembered for `digest`, soonest
    /// expiry first; empty if the digest is unseen or fully expired.
    pub fn repositories_for_digest(&self, digest: &Digest) -> Vec<String> {
        self.repositories_for_digest_at(Utc::now(), digest)
    }

    /// [`RepositoryCache::repositories_for_digest`] against an explicit
    /// clock. Expired entries are filtered at read time; the bucket is
    /// not mutated.
    pub fn repositories_for_digest_at(&self, now: DateTime<Utc>, digest: &Digest) -> Vec<String> {
        match self.bucket(digest, false) {
            Some(bucket) => bucket.lock().copy(now),
            None => Vec::new(),
        }
    }

    /// Whether any non-expired association exists for `digest`.
    pub fn has(&self, digest: &Digest) -> bool {
        self.has_at(Utc::now(), digest)
    }

    /// [`RepositoryCache::has`] against an explicit clock.
    pub fn has_at(&self, now: DateTime<Utc>, digest: &Digest) -> bool {
        !self.repositories_for_digest_at(now, digest).is_empty()
    }

    /// Drop the named repositories from the bucket for `digest`,
    /// leaving the remaining entries' expiries untouched.
    pub fn forget(&self, digest: &Digest, repositories: &[&str]) {
        if let Some(bucket) = self.bucket(digest, false) {
            bucket.lock().remove(repositories);
        }
    }
}
