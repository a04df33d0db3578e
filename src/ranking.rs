use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
struct Ranking {
    scores: HashMap<String, u64>,
    deadline: Option<Instant>,
}

impl Ranking {
    fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.scores.clear();
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Access counter with one expiry deadline shared by every entry.
///
/// The deadline is armed by the first access into an empty ledger and is
/// never extended; once it passes the whole ranking is dropped.
pub struct PopularityLedger {
    ranking: Mutex<Ranking>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PopularityLedger {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ranking: Mutex::new(Ranking::default()), ttl, clock }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ranking> {
        self.ranking.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds one visit and returns the new score.
    pub fn record_access(&self, identifier: &str) -> u64 {
        let now = self.clock.now();
        let mut ranking = self.lock();
        ranking.expire(now);

        if ranking.scores.is_empty() {
            ranking.deadline = Some(now + self.ttl);
        }
        let score = ranking.scores.entry(identifier.to_string()).or_insert(0);
        *score += 1;
        *score
    }

    /// Highest scores first; equal scores in reverse identifier order.
    pub fn top_k(&self, k: usize) -> Vec<(String, u64)> {
        let now = self.clock.now();
        let mut ranking = self.lock();
        ranking.expire(now);

        let mut entries: Vec<(String, u64)> = ranking.scores.iter().map(|(id, s)| (id.clone(), *s)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        entries.truncate(k);
        entries
    }

    /// Drops one identifier. The shared deadline is left alone.
    pub fn remove(&self, identifier: &str) -> bool {
        self.lock().scores.remove(identifier).is_some()
    }

    pub fn score(&self, identifier: &str) -> Option<u64> {
        let now = self.clock.now();
        let mut ranking = self.lock();
        ranking.expire(now);
        ranking.scores.get(identifier).copied()
    }

    /// Clears the ranking if its deadline has passed. Returns whether it did.
    pub fn expire_check(&self) -> bool {
        let now = self.clock.now();
        self.lock().expire(now)
    }

    /// Time left in the current epoch, `None` when no deadline is armed.
    pub fn time_to_live(&self) -> Option<Duration> {
        let now = self.clock.now();
        let ranking = self.lock();
        ranking.deadline.map(|d| d.saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.lock().scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (PopularityLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (PopularityLedger::with_clock(DEFAULT_TTL, clock.clone()), clock)
    }

    #[test]
    fn counts_accumulate() {
        let (ledger, _) = ledger();
        for _ in 0..5 {
            ledger.record_access("JFK");
        }
        ledger.record_access("LAX");
        assert_eq!(ledger.top_k(1), vec![("JFK".to_string(), 5)]);
        assert_eq!(ledger.top_k(DEFAULT_TOP_K).len(), 2);
    }

    #[test]
    fn deadline_is_not_extended() {
        let (ledger, clock) = ledger();
        ledger.record_access("JFK");
        clock.advance(Duration::from_secs(80_000));
        ledger.record_access("JFK");
        assert_eq!(ledger.time_to_live(), Some(Duration::from_secs(6_400)));

        clock.advance(Duration::from_secs(6_400));
        assert!(ledger.top_k(10).is_empty());
        assert_eq!(ledger.record_access("JFK"), 1);
        assert_eq!(ledger.time_to_live(), Some(DEFAULT_TTL));
    }

    #[test]
    fn expire_check_drops_everything_at_once() {
        let (ledger, clock) = ledger();
        ledger.record_access("A");
        ledger.record_access("B");
        assert!(!ledger.expire_check());
        clock.advance(DEFAULT_TTL);
        assert!(ledger.expire_check());
        assert!(ledger.is_empty());
        assert_eq!(ledger.time_to_live(), None);
    }

    #[test]
    fn remove_keeps_deadline() {
        let (ledger, clock) = ledger();
        ledger.record_access("A");
        ledger.record_access("B");
        clock.advance(Duration::from_secs(100));

        assert!(ledger.remove("A"));
        assert!(!ledger.remove("A"));
        assert_eq!(ledger.time_to_live(), Some(DEFAULT_TTL - Duration::from_secs(100)));
        assert_eq!(ledger.score("B"), Some(1));
    }

    #[test]
    fn ties_order_by_identifier_descending() {
        let (ledger, _) = ledger();
        ledger.record_access("AAA");
        ledger.record_access("BBB");
        ledger.record_access("CCC");
        ledger.record_access("AAA");

        let ids: Vec<_> = ledger.top_k(3).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["AAA", "CCC", "BBB"]);
    }
}
