//! Result cache with TTL eviction and query-frequency tracking.
//!
//! Content-addressed: the key is the hex SHA-256 of the *raw* question —
//! case and whitespace sensitive, so "Hola" and "hola " are distinct
//! entries. Entries expire after the configured TTL and are evicted on the
//! read path; frequency counters never expire.
//!
//! Shared across request tasks via `Arc`. Entry state lives behind a single
//! `RwLock` so `clear` is atomic relative to readers; the hit/miss/store
//! counters are lock-free atomics, which keeps lookup cheap at the cost of
//! exact counts under concurrency — monotonic, eventually consistent
//! statistics are the contract, not exactness.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::models::{CacheStats, UnifiedResult};

struct CacheEntry {
    result: UnifiedResult,
    stored_at: Instant,
}

struct FreqEntry {
    /// Original question text, kept for reporting.
    question: String,
    count: u64,
    /// Insertion sequence; breaks frequency ties deterministically.
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    frequency: HashMap<String, FreqEntry>,
    next_seq: u64,
}

pub struct ResultCache {
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            ttl,
        }
    }

    fn key(question: &str) -> String {
        hex::encode(Sha256::digest(question.as_bytes()))
    }

    /// Look up a cached result. Expired entries are evicted here; reads
    /// have no other side effect.
    pub fn get(&self, question: &str) -> Option<UnifiedResult> {
        let key = Self::key(question);

        let expired = {
            let state = self.state.read().unwrap();
            match state.entries.get(&key) {
                Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(question, "cache hit");
                    return Some(entry.result.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut state = self.state.write().unwrap();
            // Re-check under the write lock: a racing put may have
            // refreshed the entry.
            if let Some(entry) = state.entries.get(&key) {
                if entry.stored_at.elapsed() > self.ttl {
                    state.entries.remove(&key);
                    debug!(question, "evicted expired cache entry");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(question, "cache miss");
        None
    }

    /// Store a result, overwriting any existing entry with a fresh
    /// timestamp. Callers only cache successful resolutions — failures are
    /// never stored, so a transient error cannot poison the cache.
    pub fn put(&self, question: &str, result: &UnifiedResult) {
        let key = Self::key(question);
        let mut state = self.state.write().unwrap();
        state.entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                stored_at: Instant::now(),
            },
        );
        self.stores.fetch_add(1, Ordering::Relaxed);
        debug!(question, size = state.entries.len(), "stored cache entry");
    }

    /// Increment the popularity counter for a question. Counters never
    /// expire and are independent of the TTL'd entries.
    pub fn bump_frequency(&self, question: &str) {
        let key = Self::key(question);
        let mut state = self.state.write().unwrap();
        let seq = state.next_seq;
        let entry = state.frequency.entry(key).or_insert_with(|| {
            FreqEntry {
                question: question.to_string(),
                count: 0,
                seq,
            }
        });
        let was_new = entry.count == 0;
        entry.count += 1;
        if was_new {
            state.next_seq += 1;
        }
    }

    /// Most frequently answered questions, descending; ties keep insertion
    /// order.
    pub fn top_frequent(&self, limit: usize) -> Vec<String> {
        let state = self.state.read().unwrap();
        self.top_frequent_locked(&state, limit)
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let stores = self.stores.load(Ordering::Relaxed);

        let lookups = hits + misses;
        let hit_rate = if lookups > 0 {
            ((hits as f64 / lookups as f64) * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };

        let state = self.state.read().unwrap();
        let approx_size_bytes: u64 = state
            .entries
            .values()
            .map(|e| {
                serde_json::to_string(&e.result)
                    .map(|s| s.len() as u64)
                    .unwrap_or(0)
            })
            .sum();
        let oldest_entry_age_secs = state
            .entries
            .values()
            .map(|e| e.stored_at.elapsed().as_secs())
            .max()
            .unwrap_or(0);

        CacheStats {
            hits,
            misses,
            stores,
            hit_rate,
            current_size: state.entries.len(),
            top_queries: self.top_frequent_locked(&state, 5),
            approx_size_bytes,
            oldest_entry_age_secs,
        }
    }

    fn top_frequent_locked(&self, state: &CacheState, limit: usize) -> Vec<String> {
        let mut entries: Vec<&FreqEntry> = state.frequency.values().collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.seq.cmp(&b.seq)));
        entries
            .into_iter()
            .take(limit)
            .map(|f| f.question.clone())
            .collect()
    }

    /// Reset entries, counters, and statistics. Readers see either the
    /// full pre-clear state or the empty post-clear state, never a mix.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        state.entries.clear();
        state.frequency.clear();
        state.next_seq = 0;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stores.store(0, Ordering::Relaxed);
        info!("cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Intent;

    fn result(question: &str, answer: &str) -> UnifiedResult {
        UnifiedResult {
            original_question: question.to_string(),
            intent: Intent::Structured,
            answer: answer.to_string(),
            suggestions: Vec::new(),
            generated_sql: Some("SELECT 1".to_string()),
            raw_rows: Some(Vec::new()),
            sources: None,
            success: true,
            error_message: None,
        }
    }

    #[test]
    fn test_round_trip() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let r = result("cuántas aplicaciones hay", "4");
        cache.put("cuántas aplicaciones hay", &r);
        let got = cache.get("cuántas aplicaciones hay").unwrap();
        assert_eq!(got, r);
    }

    #[test]
    fn test_key_is_raw_question_sensitive() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put("Hola", &result("Hola", "x"));
        assert!(cache.get("hola").is_none());
        assert!(cache.get("Hola ").is_none());
        assert!(cache.get("Hola").is_some());
    }

    #[test]
    fn test_get_is_idempotent() {
        let cache = ResultCache::new(Duration::from_secs(60));
        assert!(cache.get("missing").is_none());
        assert!(cache.get("missing").is_none());

        cache.put("present", &result("present", "x"));
        assert!(cache.get("present").is_some());
        assert!(cache.get("present").is_some());
    }

    #[test]
    fn test_expired_entry_evicted_on_read() {
        let cache = ResultCache::new(Duration::from_millis(10));
        cache.put("q", &result("q", "x"));
        assert_eq!(cache.stats().current_size, 1);

        std::thread::sleep(Duration::from_millis(25));

        assert!(cache.get("q").is_none());
        assert_eq!(cache.stats().current_size, 0);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put("q", &result("q", "first"));
        cache.put("q", &result("q", "second"));
        assert_eq!(cache.get("q").unwrap().answer, "second");
        assert_eq!(cache.stats().current_size, 1);
    }

    #[test]
    fn test_frequency_ordering() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.bump_frequency("q1");
        cache.bump_frequency("q1");
        cache.bump_frequency("q1");
        cache.bump_frequency("q2");
        assert_eq!(cache.top_frequent(2), vec!["q1".to_string(), "q2".to_string()]);
    }

    #[test]
    fn test_frequency_tie_keeps_insertion_order() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.bump_frequency("first");
        cache.bump_frequency("second");
        cache.bump_frequency("third");
        assert_eq!(
            cache.top_frequent(3),
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn test_frequency_survives_expiry() {
        let cache = ResultCache::new(Duration::from_millis(10));
        cache.put("q", &result("q", "x"));
        cache.bump_frequency("q");
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get("q").is_none());
        assert_eq!(cache.top_frequent(1), vec!["q".to_string()]);
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = ResultCache::new(Duration::from_secs(60));
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.put("q", &result("q", "x"));
        cache.get("q");
        cache.get("nope");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert!(stats.approx_size_bytes > 0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.put("q", &result("q", "x"));
        cache.get("q");
        cache.bump_frequency("q");

        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.current_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.stores, 0);
        assert!(stats.top_queries.is_empty());
        assert!(cache.get("q").is_none());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let cache = Arc::new(ResultCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();

        for t in 0..8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let q = format!("question-{}-{}", t, i);
                    cache.put(&q, &result(&q, "x"));
                    assert!(cache.get(&q).is_some());
                    cache.bump_frequency(&q);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.current_size, 400);
        assert_eq!(stats.hits, 400);
    }
}
