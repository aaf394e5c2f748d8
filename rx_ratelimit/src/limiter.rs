use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use tracing::warn;

use crate::bucket::Bucket;
use crate::key::RouteKey;

const GLOBAL_BUCKET: &str = "global";

/// Rate-limit feedback extracted from one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketReport {
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u32>,

    /// `X-RateLimit-Reset-After`, or the 429 body's `retry_after`
    pub reset_after: Option<Duration>,

    /// `X-RateLimit-Bucket`
    pub bucket: Option<String>,

    /// `X-RateLimit-Global` (429 only)
    pub global: bool,

    /// Response was a 429
    pub limited: bool,
}

/// Two-level limiter: one global bucket plus lazily discovered route buckets
///
/// State is owned by the limiter instance, so independent clients never share
/// buckets. Route buckets are never evicted while the limiter lives.
#[derive(Debug)]
pub struct BucketLimiter {
    global: Arc<Bucket>,

    /// Bucket state keyed by provisional or shared key
    buckets: DashMap<String, Arc<Bucket>>,

    /// Provisional key -> server bucket token learned from responses
    tokens: DashMap<String, String>,
}

impl BucketLimiter {
    pub fn new() -> Self {
        Self { global: Arc::new(Bucket::new(GLOBAL_BUCKET)), buckets: DashMap::new(), tokens: DashMap::new() }
    }

    pub fn global(&self) -> &Arc<Bucket> {
        &self.global
    }

    /// Wait for the global bucket to be open
    pub async fn acquire_global(&self) {
        self.global.acquire().await;
    }

    /// Resolve the bucket for `key` and wait for it to be open
    pub async fn acquire(&self, key: &RouteKey) -> Arc<Bucket> {
        let bucket = self.resolve(key);
        bucket.acquire().await;
        bucket
    }

    /// Find or create the bucket a call on `key` is governed by
    ///
    /// A server-assigned token learned from an earlier response wins over the
    /// provisional route key.
    pub fn resolve(&self, key: &RouteKey) -> Arc<Bucket> {
        let provisional = key.provisional();
        let name = match self.tokens.get(&provisional) {
            Some(token) => key.shared(token.value()),
            None => provisional,
        };

        self.buckets
            .entry(name.clone())
            .or_insert_with(|| {
                debug!(bucket = %name, "Creating bucket");
                Arc::new(Bucket::new(name.clone()))
            })
            .clone()
    }

    /// Server bucket token learned for `key`, if any
    pub fn token(&self, key: &RouteKey) -> Option<String> {
        self.tokens.get(&key.provisional()).map(|token| token.value().clone())
    }

    /// Apply the rate-limit feedback of a response to the right bucket
    pub fn report(&self, key: &RouteKey, report: &BucketReport) {
        if let Some(token) = &report.bucket {
            self.learn(key, token);
        }

        if report.limited && report.global {
            let window = report.reset_after.unwrap_or_default();
            warn!(reset_after_secs = window.as_secs_f64(), "Global rate limit hit, locking down all requests");
            self.global.close_for(window);
            return;
        }

        let bucket = self.resolve(key);
        if report.limited {
            let window = report.reset_after.unwrap_or_default();
            warn!(bucket = %bucket.name(), reset_after_secs = window.as_secs_f64(), "Route rate limit hit, locking down bucket");
            bucket.close_for(window);
            bucket.record(report.remaining, None);
        } else {
            bucket.record(report.remaining, report.reset_after);
        }
    }

    /// Number of bucket keys tracked; an aliased bucket appears under both of its keys
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Alias the route onto the server's shared bucket
    ///
    /// The first time a token is seen the route's provisional bucket is re-keyed so
    /// its state carries over; if another route already created the shared bucket,
    /// that one wins.
    fn learn(&self, key: &RouteKey, token: &str) {
        let provisional = key.provisional();
        if self.tokens.get(&provisional).is_some_and(|known| known.value() == token) {
            return;
        }

        let shared = key.shared(token);
        if !self.buckets.contains_key(&shared) {
            let current = self.buckets.get(&provisional).map(|bucket| Arc::clone(bucket.value()));
            if let Some(bucket) = current {
                self.buckets.entry(shared.clone()).or_insert(bucket);
            }
        }

        debug!(route = %provisional, bucket = %shared, "Learned server bucket");
        self.tokens.insert(provisional, token.to_string());
    }
}

impl Default for BucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}
