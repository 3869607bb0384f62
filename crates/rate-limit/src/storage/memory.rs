//! In-memory sliding-window log storage for a single process.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use tokio::time::Instant;

use super::{Counter, CounterState, RateLimitStorage, StorageError};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Event log of one counter.
struct Window {
    events: VecDeque<Instant>,
    expires_at: Instant,
}

struct State {
    windows: HashMap<String, Window>,
    next_sweep: Instant,
}

/// In-memory storage implementation.
///
/// All counters of one evaluation are handled under a single lock, so
/// concurrent evaluations on the same key are linearized. Timestamps come
/// from tokio's clock, which tests can pause and advance.
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                windows: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
        }
    }

    /// Number of live counters.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().map(|state| state.windows.len()).unwrap_or_default()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitStorage for InMemoryStorage {
    async fn evaluate(&self, counters: &[Counter]) -> Result<Vec<CounterState>, StorageError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::Internal("counter lock poisoned".to_string()))?;

        let now = Instant::now();

        if now >= state.next_sweep {
            let before = state.windows.len();
            state.windows.retain(|_, window| window.expires_at > now);
            state.next_sweep = now + SWEEP_INTERVAL;

            log::debug!("Swept {} expired counter(s)", before - state.windows.len());
        }

        let mut states = Vec::with_capacity(counters.len());

        for counter in counters {
            let window_length = Duration::from_secs(counter.window);

            let window = state.windows.entry(counter.key.clone()).or_insert_with(|| Window {
                events: VecDeque::new(),
                expires_at: now,
            });

            // Expired keys behave as if the store had dropped them.
            if window.expires_at <= now {
                window.events.clear();
            }

            while window
                .events
                .front()
                .is_some_and(|event| now.duration_since(*event) >= window_length)
            {
                window.events.pop_front();
            }

            let mut count = window.events.len() as u32;
            let counted = count < counter.capacity;

            if counted {
                window.events.push_back(now);
                count += 1;
            }

            window.expires_at = now + window_length;

            states.push(CounterState { count, counted });
        }

        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn counter(key: &str, capacity: u32, window: u64) -> Counter {
        Counter {
            key: key.to_string(),
            capacity,
            window,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_capacity_then_denies() {
        let storage = InMemoryStorage::new();
        let counters = [counter("k", 3, 10)];

        for expected in 1..=3 {
            let states = storage.evaluate(&counters).await.unwrap();
            assert_eq!(states, [CounterState { count: expected, counted: true }]);
        }

        let states = storage.evaluate(&counters).await.unwrap();
        assert_eq!(states, [CounterState { count: 3, counted: false }]);
    }

    #[tokio::test(start_paused = true)]
    async fn events_exactly_one_window_old_are_pruned() {
        let storage = InMemoryStorage::new();
        let counters = [counter("k", 1, 10)];

        assert!(storage.evaluate(&counters).await.unwrap()[0].counted);

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(!storage.evaluate(&counters).await.unwrap()[0].counted);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(
            storage.evaluate(&counters).await.unwrap(),
            [CounterState { count: 1, counted: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn denied_requests_are_not_recorded() {
        let storage = InMemoryStorage::new();
        let counters = [counter("k", 2, 10)];

        storage.evaluate(&counters).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        storage.evaluate(&counters).await.unwrap();

        for _ in 0..10 {
            assert!(!storage.evaluate(&counters).await.unwrap()[0].counted);
        }

        // Only the first event has left the window; the denials left no trace.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(
            storage.evaluate(&counters).await.unwrap(),
            [CounterState { count: 2, counted: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn counters_of_one_call_are_independent() {
        let storage = InMemoryStorage::new();
        let counters = [counter("short", 1, 10), counter("long", 5, 3600)];

        let states = storage.evaluate(&counters).await.unwrap();
        assert_eq!(
            states,
            [
                CounterState { count: 1, counted: true },
                CounterState { count: 1, counted: true }
            ]
        );

        let states = storage.evaluate(&counters).await.unwrap();
        assert_eq!(
            states,
            [
                CounterState { count: 1, counted: false },
                CounterState { count: 2, counted: true }
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_counters_are_swept() {
        let storage = InMemoryStorage::new();

        storage.evaluate(&[counter("a", 1, 1)]).await.unwrap();
        storage.evaluate(&[counter("b", 1, 1)]).await.unwrap();
        assert_eq!(storage.len(), 2);

        tokio::time::advance(SWEEP_INTERVAL).await;
        storage.evaluate(&[counter("c", 1, 1)]).await.unwrap();

        assert_eq!(storage.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_exceed_capacity() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut handles = Vec::new();

        for _ in 0..64 {
            let storage = storage.clone();

            handles.push(tokio::spawn(async move {
                storage.evaluate(&[counter("shared", 10, 60)]).await.unwrap()[0].counted
            }));
        }

        let mut admitted = 0;

        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 10);
    }
}
