use super::ScoreCache;
use crate::model::CandidateScore;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Entry {
    score: Arc<CandidateScore>,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    // Insertion order. A (key, seq) pair is stale once its entry was removed
    // or replaced; stale pairs never outnumber live ones by more than 2x.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl State {
    fn is_live(&self, key: &str, seq: u64) -> bool {
        self.entries.get(key).is_some_and(|e| e.seq == seq)
    }

    fn compact_order(&mut self) {
        while let Some((key, seq)) = self.order.front() {
            if self.is_live(key, *seq) {
                break;
            }
            self.order.pop_front();
        }
        if self.order.len() > 2 * self.entries.len().max(1) {
            let entries = &self.entries;
            self.order
                .retain(|(key, seq)| entries.get(key).is_some_and(|e| e.seq == *seq));
        }
    }
}

/// In-process score cache with first-in-first-out eviction once `capacity`
/// is reached, and an optional time-to-live.
pub struct InMemoryScoreCache {
    state: Mutex<State>,
    capacity: Option<usize>,
    ttl: Option<Duration>,
}

impl InMemoryScoreCache {
    pub fn new(capacity: Option<usize>, ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity: capacity.map(|c| c.max(1)),
            ttl,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Some(capacity), None)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.inserted_at) >= ttl)
    }

    fn evict_over_capacity(&self, state: &mut State) {
        state.compact_order();
        let Some(cap) = self.capacity else {
            return;
        };
        while state.entries.len() > cap {
            let Some((key, seq)) = state.order.pop_front() else {
                break;
            };
            if state.is_live(&key, seq) {
                state.entries.remove(&key);
                tracing::debug!(key = %key, "score cache evicted oldest entry");
            }
        }
    }
}

impl ScoreCache for InMemoryScoreCache {
    fn get(&self, key: &str) -> Option<Arc<CandidateScore>> {
        let now = Instant::now();
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            state.entries.remove(key);
            state.compact_order();
            return None;
        }
        state.entries.get(key).map(|e| e.score.clone())
    }

    fn put_if_absent(&self, key: &str, score: CandidateScore) -> Arc<CandidateScore> {
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(existing) = state.entries.get(key) {
            if !self.is_expired(existing, now) {
                return existing.score.clone();
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let published = Arc::new(score);
        state.entries.insert(
            key.to_string(),
            Entry {
                score: published.clone(),
                inserted_at: now,
                seq,
            },
        );
        state.order.push_back((key.to_string(), seq));
        self.evict_over_capacity(&mut state);
        published
    }

    fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.compact_order();
        }
        removed
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
impl InMemoryScoreCache {
    fn order_len(&self) -> usize {
        self.lock().order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(id: &str, v: f64) -> CandidateScore {
        CandidateScore {
            candidate_id: id.to_string(),
            overall_score: v,
            process_time: 0.5,
            user_rating: 0.0,
        }
    }

    #[test]
    fn put_if_absent_keeps_first_publication() {
        let cache = InMemoryScoreCache::unbounded();
        let first = cache.put_if_absent("k", score("a", 10.0));
        let second = cache.put_if_absent("k", score("a", 99.0));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.get("k").unwrap().overall_score, 10.0);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = InMemoryScoreCache::with_capacity(2);
        cache.put_if_absent("a", score("a", 1.0));
        cache.put_if_absent("b", score("b", 2.0));
        cache.put_if_absent("c", score("c", 3.0));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn invalidate_allows_wholesale_replacement() {
        let cache = InMemoryScoreCache::with_capacity(2);
        cache.put_if_absent("a", score("a", 1.0));
        assert!(cache.invalidate("a"));
        cache.put_if_absent("a", score("a", 5.0));
        cache.put_if_absent("b", score("b", 2.0));
        assert_eq!(cache.get("a").unwrap().overall_score, 5.0);
        assert_eq!(cache.len(), 2);
        assert!(!cache.invalidate("zzz"));
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = InMemoryScoreCache::new(None, Some(Duration::from_millis(20)));
        cache.put_if_absent("a", score("a", 1.0));
        assert!(cache.get("a").is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());

        let fresh = cache.put_if_absent("a", score("a", 7.0));
        assert_eq!(fresh.overall_score, 7.0);
    }

    #[test]
    fn invalidate_churn_keeps_order_bounded() {
        let cache = InMemoryScoreCache::with_capacity(10);
        for i in 0..10_000 {
            cache.invalidate("a");
            cache.put_if_absent("a", score("a", f64::from(i % 100)));
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.order_len() <= 2, "order_len = {}", cache.order_len());
    }

    #[test]
    fn ttl_churn_keeps_order_bounded() {
        let cache = InMemoryScoreCache::new(Some(10), Some(Duration::from_nanos(1)));
        for _ in 0..5_000 {
            let _ = cache.get("a");
            cache.put_if_absent("a", score("a", 1.0));
        }
        assert!(cache.len() <= 1);
        assert!(cache.order_len() <= 2, "order_len = {}", cache.order_len());

        let unbounded = InMemoryScoreCache::new(None, Some(Duration::from_nanos(1)));
        for i in 0..5_000 {
            unbounded.put_if_absent(&format!("k{}", i % 3), score("x", 1.0));
        }
        assert!(unbounded.order_len() <= 2 * unbounded.len().max(1) + 1);
    }
}
