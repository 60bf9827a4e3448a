//! Host hash classification
//!
//! Maps request hosts onto threat lists using hashed lookups so that the
//! remote service never sees a plain host. A host is checked together with
//! its parent domains down to the registrable apex; each candidate is hashed
//! with SHA-256 and only short hash prefixes leave the machine. Responses are
//! cached with a TTL so repeat navigation stays local.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::LruCache;
use crate::url;

/// Hard cap on an accepted lookup response body.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024;

/// Length of the hash prefix sent to the lookup service.
pub const HASH_PREFIX_LEN: usize = 8;

/// How long a verdict stays cached.
pub const CACHE_TTL: Duration = Duration::from_secs(40 * 60);

/// Cache entry value marking a host known to be clean.
const ALLOW_LIST: &str = "allowlist";

/// A positive classification: which list flagged which checked host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbMatch {
    pub list: String,
    pub host: String,
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("lookup response exceeds {MAX_RESPONSE_BYTES} bytes")]
    Oversized,
    #[error("malformed lookup record: {0:?}")]
    MalformedRecord(String),
}

// =============================================================================
// Host expansion and hashing
// =============================================================================

/// Expand a host into the candidates to check: the host itself plus each
/// parent domain down to the two-label apex. IP literals are returned as-is.
pub fn extract_hosts(host: &str) -> Vec<String> {
    if host.is_empty() {
        return Vec::new();
    }
    if url::is_ip_address(host) {
        return vec![host.to_string()];
    }

    let mut hosts = vec![host.to_string()];
    let mut rest = host;
    while rest.matches('.').count() >= 2 {
        match rest.split_once('.') {
            Some((_, parent)) => {
                hosts.push(parent.to_string());
                rest = parent;
            }
            None => break,
        }
    }
    hosts
}

/// SHA-256 of the lower-cased host with a trailing slash, upper-case hex.
pub fn compute_hash(host: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(host.to_ascii_lowercase().as_bytes());
    hasher.update(b"/");
    hex::encode_upper(hasher.finalize())
}

/// Hash every candidate host, keyed by hash for response correlation.
pub fn build_hash_index(hosts: &[String]) -> HashMap<String, String> {
    hosts
        .iter()
        .map(|h| (compute_hash(h), h.clone()))
        .collect()
}

/// The short prefixes actually sent over the wire.
pub fn hash_prefixes(index: &HashMap<String, String>) -> Vec<String> {
    index.keys().map(|h| h[..HASH_PREFIX_LEN].to_string()).collect()
}

// =============================================================================
// Response classification
// =============================================================================

/// Classify a lookup response against the hash index built for a request.
///
/// Oversized responses are discarded whole; a malformed record is logged and
/// skipped so a garbled line never hides a valid one after it.
/// Classification must never turn a service hiccup into a block.
pub fn classify(response: &str, index: &HashMap<String, String>) -> Option<SbMatch> {
    if response.len() > MAX_RESPONSE_BYTES {
        log::warn!("discarding lookup response: {}", ResponseError::Oversized);
        return None;
    }

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (list, hashes) = match parse_record(line) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("skipping lookup record: {err}");
                continue;
            }
        };

        for hash in hashes.split_whitespace() {
            if let Some(host) = index.get(hash) {
                // First matching record wins.
                return Some(SbMatch {
                    list: list.to_string(),
                    host: host.clone(),
                });
            }
        }
    }
    None
}

/// Split a "list-name:expiry:HASH" record. The hash field may hold several
/// full hashes, but in practice one per record.
fn parse_record(line: &str) -> Result<(&str, &str), ResponseError> {
    let malformed = || ResponseError::MalformedRecord(line.to_string());
    let mut fields = line.splitn(3, ':');
    let list = fields.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let _expiry = fields.next().ok_or_else(malformed)?;
    let hashes = fields.next().ok_or_else(malformed)?;
    Ok((list, hashes))
}

// =============================================================================
// Verdict cache
// =============================================================================

#[derive(Debug, Clone)]
struct SbEntry {
    list: String,
    expires: Instant,
}

/// Outcome of a cache probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheVerdict {
    /// No usable cached verdict; the service must be asked.
    Unknown,
    /// Cached as clean.
    Clean,
    /// Cached as listed, with the list name.
    Listed(String),
}

/// TTL cache of per-host verdicts, keyed by host hash.
pub struct SbCache {
    cache: LruCache<String, SbEntry>,
    ttl: Duration,
}

impl SbCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, CACHE_TTL)
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: LruCache::new(capacity),
            ttl,
        }
    }

    /// Probe the cache for a host.
    pub fn verdict(&mut self, host: &str) -> CacheVerdict {
        let key = compute_hash(host);
        match self.cache.get(&key) {
            Some(entry) if entry.expires > Instant::now() => {
                if entry.list == ALLOW_LIST {
                    CacheVerdict::Clean
                } else {
                    CacheVerdict::Listed(entry.list.clone())
                }
            }
            Some(_) => {
                self.cache.remove(&key);
                CacheVerdict::Unknown
            }
            None => CacheVerdict::Unknown,
        }
    }

    /// Record a positive classification.
    pub fn mark_listed(&mut self, host: &str, list: &str) {
        self.insert(host, list.to_string());
    }

    /// Record a clean result so the host is not re-queried until the TTL
    /// expires.
    pub fn mark_clean(&mut self, host: &str) {
        self.insert(host, ALLOW_LIST.to_string());
    }

    fn insert(&mut self, host: &str, list: String) {
        let entry = SbEntry {
            list,
            expires: Instant::now() + self.ttl,
        };
        self.cache.insert(compute_hash(host), entry);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
