/// Keyed TTL cache with single-flight fetching.
///
/// Every aggregator request goes through one `TtlCache<String>` owned by the
/// monitor, keyed by URL. A fresh entry (age < TTL) is returned without
/// touching the network. Otherwise the first caller for a key becomes the
/// leader and runs the fetch; concurrent callers for the same key block on
/// the leader's flight and receive a clone of its outcome, so a burst of
/// refreshes produces one request per URL.
///
/// Failures are handed to the waiters of that flight but never stored; the
/// next call after a failure fetches again. If a leader's fetch panics, the
/// flight is resolved with `SourceError::Network` so waiters never hang.
///
/// # Clock injection
/// `get_or_fetch_at` takes `now` explicitly for deterministic TTL tests;
/// `get_or_fetch` uses `Utc::now()`.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::model::SourceError;

/// Default freshness window: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

type FlightResult<V> = Result<V, SourceError>;

/// One in-progress fetch that other callers can wait on.
struct Flight<V> {
    result: Mutex<Option<FlightResult<V>>>,
    done: Condvar,
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, result: FlightResult<V>) {
        let mut slot = lock(&self.result);
        *slot = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> FlightResult<V> {
        let guard = lock(&self.result);
        let guard = self
            .done
            .wait_while(guard, |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(result) => result.clone(),
            None => Err(SourceError::Network("fetch ended without a result".to_string())),
        }
    }
}

enum Slot<V> {
    Ready { value: V, fetched_at: DateTime<Utc> },
    InFlight(Arc<Flight<V>>),
}

/// Thread-safe keyed cache; share it behind an `Arc` or a reference.
pub struct TtlCache<V> {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `key` if it is fresh, otherwise fetches it.
    pub fn get_or_fetch<F>(&self, key: &str, fetch: F) -> FlightResult<V>
    where
        F: FnOnce() -> FlightResult<V>,
    {
        self.get_or_fetch_at(key, Utc::now(), fetch)
    }

    /// As [`get_or_fetch`](Self::get_or_fetch), with an injected clock.
    pub fn get_or_fetch_at<F>(&self, key: &str, now: DateTime<Utc>, fetch: F) -> FlightResult<V>
    where
        F: FnOnce() -> FlightResult<V>,
    {
        let flight = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(Slot::Ready { value, fetched_at }) if self.is_fresh(*fetched_at, now) => {
                    trace!(key, "cache hit");
                    return Ok(value.clone());
                }
                Some(Slot::InFlight(flight)) => {
                    let flight = Arc::clone(flight);
                    drop(slots);
                    debug!(key, "joining in-flight fetch");
                    return flight.wait();
                }
                _ => {
                    let flight = Arc::new(Flight::new());
                    slots.insert(key.to_string(), Slot::InFlight(Arc::clone(&flight)));
                    flight
                }
            }
        };

        debug!(key, "cache miss, fetching");
        let mut guard = LeaderGuard {
            cache: self,
            key,
            flight: &flight,
            finished: false,
        };
        let result = fetch();
        guard.finish(result.clone(), now);
        result
    }

    /// Returns a fresh cached value without fetching.
    pub fn peek_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        match lock(&self.slots).get(key) {
            Some(Slot::Ready { value, fetched_at }) if self.is_fresh(*fetched_at, now) => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Drops the entry for `key`. An in-flight fetch for it still resolves
    /// its waiters but its result is not stored.
    pub fn invalidate(&self, key: &str) {
        if lock(&self.slots).remove(key).is_some() {
            debug!(key, "cache entry invalidated");
        }
    }

    /// Drops every entry (user-requested full refresh).
    pub fn clear(&self) {
        let mut slots = lock(&self.slots);
        let count = slots.len();
        slots.clear();
        debug!(count, "cache cleared");
    }

    /// Number of stored entries, including in-flight ones.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - fetched_at).to_std() {
            Ok(age) => age < self.ttl,
            // fetched_at after now: clock went backwards, keep the entry
            Err(_) => true,
        }
    }

    /// Stores the leader's outcome, but only if the slot still belongs to
    /// this flight (it may have been invalidated or cleared meanwhile).
    fn settle(&self, key: &str, flight: &Arc<Flight<V>>, result: &FlightResult<V>, now: DateTime<Utc>) {
        let mut slots = lock(&self.slots);
        let owned = matches!(slots.get(key), Some(Slot::InFlight(f)) if Arc::ptr_eq(f, flight));
        if !owned {
            return;
        }
        match result {
            Ok(value) => {
                slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        value: value.clone(),
                        fetched_at: now,
                    },
                );
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }
}

/// Resolves the flight even if the fetch closure unwinds.
struct LeaderGuard<'a, V: Clone> {
    cache: &'a TtlCache<V>,
    key: &'a str,
    flight: &'a Arc<Flight<V>>,
    finished: bool,
}

impl<V: Clone> LeaderGuard<'_, V> {
    fn finish(&mut self, result: FlightResult<V>, now: DateTime<Utc>) {
        self.cache.settle(self.key, self.flight, &result, now);
        self.flight.complete(result);
        self.finished = true;
    }
}

impl<V: Clone> Drop for LeaderGuard<'_, V> {
    fn drop(&mut self) {
        if !self.finished {
            let failure: FlightResult<V> =
                Err(SourceError::Network("fetch panicked".to_string()));
            self.cache.settle(self.key, self.flight, &failure, Utc::now());
            self.flight.complete(failure);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    #[test]
    fn test_fresh_entry_served_without_fetching() {
        let cache: TtlCache<String> = TtlCache::default();
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("payload".to_string())
        };

        assert_eq!(cache.get_or_fetch_at("k", t0(), fetch).unwrap(), "payload");
        let second = cache.get_or_fetch_at("k", t0() + minutes(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("newer".to_string())
        });
        assert_eq!(second.unwrap(), "payload", "4 minutes old is still fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_entry_is_refetched() {
        let cache: TtlCache<String> = TtlCache::default();
        cache.get_or_fetch_at("k", t0(), || Ok("old".to_string())).unwrap();

        let at_ttl = cache.get_or_fetch_at("k", t0() + minutes(5), || Ok("new".to_string()));
        assert_eq!(at_ttl.unwrap(), "new", "age == TTL is no longer fresh");
        assert_eq!(cache.peek_at("k", t0() + minutes(6)).as_deref(), Some("new"));
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache: TtlCache<String> = TtlCache::default();
        let err = cache.get_or_fetch_at("k", t0(), || Err(SourceError::HttpStatus(503)));
        assert_eq!(err, Err(SourceError::HttpStatus(503)));
        assert!(cache.is_empty(), "failed fetch must leave no entry");

        let ok = cache.get_or_fetch_at("k", t0(), || Ok("recovered".to_string()));
        assert_eq!(ok.unwrap(), "recovered");
    }

    #[test]
    fn test_keys_are_independent() {
        let cache: TtlCache<String> = TtlCache::default();
        cache.get_or_fetch_at("a", t0(), || Ok("A".to_string())).unwrap();
        cache.get_or_fetch_at("b", t0(), || Ok("B".to_string())).unwrap();
        assert_eq!(cache.peek_at("a", t0()).as_deref(), Some("A"));
        assert_eq!(cache.peek_at("b", t0()).as_deref(), Some("B"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_and_clear_force_refetch() {
        let cache: TtlCache<String> = TtlCache::default();
        cache.get_or_fetch_at("a", t0(), || Ok("A1".to_string())).unwrap();
        cache.get_or_fetch_at("b", t0(), || Ok("B1".to_string())).unwrap();

        cache.invalidate("a");
        assert_eq!(cache.peek_at("a", t0()), None);
        assert_eq!(cache.peek_at("b", t0()).as_deref(), Some("B1"));
        let a = cache.get_or_fetch_at("a", t0(), || Ok("A2".to_string()));
        assert_eq!(a.unwrap(), "A2");

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_callers_share_one_fetch() {
        let cache: Arc<TtlCache<String>> = Arc::new(TtlCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_fetch_at("shared", t0(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        Ok("once".to_string())
                    })
                })
            })
            .collect();

        for handle in handles {
            let result = handle.join().expect("worker thread should not panic");
            assert_eq!(result.unwrap(), "once");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "fetcher must run exactly once");
    }

    #[test]
    fn test_waiters_receive_leader_failure() {
        let cache: Arc<TtlCache<String>> = Arc::new(TtlCache::default());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_fetch_at("down", t0(), || {
                        thread::sleep(Duration::from_millis(50));
                        Err(SourceError::Network("connection refused".to_string()))
                    })
                })
            })
            .collect();

        for handle in handles {
            let result = handle.join().expect("worker thread should not panic");
            assert!(matches!(result, Err(SourceError::Network(_))));
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_panicking_leader_resolves_flight() {
        let cache: Arc<TtlCache<String>> = Arc::new(TtlCache::default());
        let leader_cache = Arc::clone(&cache);
        let leader = thread::spawn(move || {
            leader_cache.get_or_fetch_at("boom", t0(), || -> FlightResult<String> {
                thread::sleep(Duration::from_millis(50));
                panic!("fetch blew up");
            })
        });
        assert!(leader.join().is_err(), "leader thread propagates its panic");

        assert!(cache.is_empty(), "panicked flight leaves no entry");
        let retry = cache.get_or_fetch_at("boom", t0(), || Ok("fine".to_string()));
        assert_eq!(retry.unwrap(), "fine");
    }

    #[test]
    fn test_invalidate_during_flight_discards_result() {
        let cache: TtlCache<String> = TtlCache::default();
        let result = cache.get_or_fetch_at("k", t0(), || {
            cache.invalidate("k");
            Ok("in flight".to_string())
        });
        assert_eq!(result.unwrap(), "in flight", "caller still gets its value");
        assert_eq!(cache.peek_at("k", t0()), None, "but it is not stored");
    }
}
