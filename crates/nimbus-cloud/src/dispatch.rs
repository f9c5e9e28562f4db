//! Rate-limited fan-out of adapter calls
//!
//! Calls are started on a fixed stagger (`interval = ceil(60000 / limit)` ms)
//! without waiting for earlier calls to answer, then joined. Results come back
//! in input order, one per item.

use crate::region::DEFAULT_RATE_PER_MINUTE;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Staggered dispatcher for one operation class of one region
///
/// Clones share the same schedule: a batch started while another is still
/// being dispatched gets start slots after the other batch's last slot, so
/// the per-minute budget holds across concurrent batches.
#[derive(Debug, Clone)]
pub struct RateLimitedDispatcher {
    interval: Duration,
    next_free: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitedDispatcher {
    /// `None` or `0` falls back to 20 per minute
    pub fn new(per_minute: Option<u32>) -> Self {
        Self {
            interval: Self::interval_for(per_minute),
            next_free: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval_for(per_minute: Option<u32>) -> Duration {
        let limit = match per_minute {
            Some(0) | None => DEFAULT_RATE_PER_MINUTE,
            Some(limit) => limit,
        };
        Duration::from_millis(60_000u64.div_ceil(u64::from(limit)))
    }

    /// Same schedule, different stagger
    ///
    /// Slots already reserved through `self` stay reserved; the returned
    /// dispatcher spaces its own batches at `per_minute`.
    pub fn with_rate(&self, per_minute: Option<u32>) -> Self {
        Self {
            interval: Self::interval_for(per_minute),
            next_free: Arc::clone(&self.next_free),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reserve `count` consecutive slots and return the first one
    async fn reserve(&self, count: usize) -> Instant {
        let now = Instant::now();
        let mut next_free = self.next_free.lock().await;
        let start = match *next_free {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next_free = Some(start + self.interval * count as u32);
        start
    }

    /// Run `op` once per item, item `i` starting at `start + i * interval`
    ///
    /// Every item yields exactly one result at its own index; `op` is
    /// expected to fold failures into its output rather than abort.
    pub async fn dispatch<'a, T, R, F, Fut>(&self, items: &'a [T], op: F) -> Vec<R>
    where
        F: Fn(usize, &'a T) -> Fut,
        Fut: Future<Output = R>,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let start = self.reserve(items.len()).await;
        debug!(
            items = items.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Dispatching staggered calls"
        );

        let calls = items.iter().enumerate().map(|(index, item)| {
            let at = start + self.interval * index as u32;
            let op = &op;
            async move {
                sleep_until(at).await;
                op(index, item).await
            }
        });

        join_all(calls).await
    }
}

impl Default for RateLimitedDispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_one_result_per_item_in_order(
            outcomes in proptest::collection::vec((any::<bool>(), 0u64..5_000), 0..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let results = rt.block_on(async {
                RateLimitedDispatcher::new(Some(6000))
                    .dispatch(&outcomes, |i, (ok, delay)| {
                        let (ok, delay) = (*ok, *delay);
                        async move {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            if ok { Ok(i) } else { Err(i) }
                        }
                    })
                    .await
            });

            prop_assert_eq!(results.len(), outcomes.len());
            for (i, result) in results.iter().enumerate() {
                let index = match result {
                    Ok(index) | Err(index) => *index,
                };
                prop_assert_eq!(index, i);
                prop_assert_eq!(result.is_ok(), outcomes[i].0);
            }
        }
    }
}
