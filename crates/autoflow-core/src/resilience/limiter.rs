//! Fixed-window rate limiter for one external dependency.
//!
//! At most `max_calls` callers are admitted per window. Excess callers wait
//! in arrival order on a fair semaphore until the window rolls over. Admitted
//! permits are forgotten rather than returned, so they count against the
//! window in which they were taken; rollover tops the semaphore back up to
//! `max_calls`.
//!
//! Windows are anchored at the first admission and advance in whole multiples
//! of `window_ms`. There is no background task: the waiter at the head of the
//! queue sleeps until the window boundary and performs the rollover itself,
//! keeping its queue position while it sleeps.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autoflow_types::config::RateLimitConfig;
use autoflow_types::resilience::LimiterStatus;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::error::{RateLimitRejection, ResilienceError};

/// Caps calls into one dependency to a fixed quota per window.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    window: Duration,
    permits: Semaphore,
    /// Start of the current window; `None` until the first admission.
    window_start: Mutex<Option<Instant>>,
    queued: AtomicUsize,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self {
            name: name.into(),
            window: Duration::from_millis(config.window_ms),
            permits: Semaphore::new(config.max_calls as usize),
            window_start: Mutex::new(None),
            queued: AtomicUsize::new(0),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait for capacity in the current or a later window.
    ///
    /// Fails without consuming quota when the queue bound is reached or the
    /// maximum wait elapses.
    pub async fn acquire(&self) -> Result<(), RateLimitRejection> {
        let arrived = Instant::now();
        self.roll_window(arrived);

        if let Ok(permit) = self.permits.try_acquire() {
            permit.forget();
            self.anchor_window(arrived);
            return Ok(());
        }

        let _slot = match QueueSlot::reserve(&self.queued, self.config.max_queue) {
            Ok(slot) => slot,
            Err(depth) => {
                tracing::warn!(dependency = %self.name, depth, "rate limit queue full");
                return Err(RateLimitRejection::QueueFull { depth });
            }
        };
        tracing::debug!(
            dependency = %self.name,
            depth = self.queued.load(Ordering::SeqCst),
            "waiting for rate limit capacity"
        );

        let deadline = self
            .config
            .max_wait_ms
            .map(|ms| arrived + Duration::from_millis(ms));

        let acquire = self.permits.acquire();
        tokio::pin!(acquire);

        loop {
            let now = Instant::now();
            self.roll_window(now);
            let boundary = self.next_boundary(now);

            tokio::select! {
                biased;

                permit = &mut acquire => {
                    // The semaphore is never closed.
                    let Ok(permit) = permit else {
                        return Err(RateLimitRejection::WaitExceeded {
                            waited_ms: elapsed_ms(arrived),
                        });
                    };
                    permit.forget();
                    self.anchor_window(Instant::now());
                    return Ok(());
                }
                _ = tokio::time::sleep_until(boundary) => {}
                _ = wait_until(deadline) => {
                    let waited_ms = elapsed_ms(arrived);
                    tracing::warn!(dependency = %self.name, waited_ms, "rate limit wait exceeded");
                    return Err(RateLimitRejection::WaitExceeded { waited_ms });
                }
            }
        }
    }

    /// Run `operation` once capacity is available.
    ///
    /// A refused admission is reported as `RateLimited` and the operation is
    /// never invoked. Failures of the operation itself are returned as
    /// `Operation` and are not retried.
    pub async fn schedule<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.acquire()
            .await
            .map_err(|reason| ResilienceError::RateLimited {
                dependency: self.name.clone(),
                reason,
            })?;
        operation().await.map_err(|error| ResilienceError::Operation {
            dependency: self.name.clone(),
            error,
        })
    }

    /// Snapshot for status displays.
    pub fn status(&self) -> LimiterStatus {
        let now = Instant::now();
        let window_start = *self.lock_window();
        let expired = window_start.is_some_and(|start| now.duration_since(start) >= self.window);
        let admitted_in_window = if expired {
            0
        } else {
            self.config
                .max_calls
                .saturating_sub(self.permits.available_permits() as u32)
        };

        LimiterStatus {
            admitted_in_window,
            max_calls: self.config.max_calls,
            window_ms: self.config.window_ms,
            queued: self.queued.load(Ordering::SeqCst),
        }
    }

    fn lock_window(&self) -> MutexGuard<'_, Option<Instant>> {
        self.window_start.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn anchor_window(&self, now: Instant) {
        let mut start = self.lock_window();
        if start.is_none() {
            *start = Some(now);
        }
    }

    /// Advance to the window containing `now` and restore its quota.
    ///
    /// Permits can only shrink concurrently (admissions), never grow, so
    /// topping up from a stale `available_permits` reading may under-fill the
    /// new window but never over-fill it.
    fn roll_window(&self, now: Instant) {
        let mut start = self.lock_window();
        let Some(current) = *start else {
            return;
        };
        let elapsed = now.duration_since(current);
        if elapsed < self.window {
            return;
        }

        // Offset into the window containing `now`; never exceeds `elapsed`.
        let offset = elapsed.as_nanos() % self.window.as_nanos();
        let offset = Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX));
        *start = Some(now - offset);

        let max = self.config.max_calls as usize;
        let missing = max.saturating_sub(self.permits.available_permits());
        if missing > 0 {
            self.permits.add_permits(missing);
            tracing::debug!(dependency = %self.name, restored = missing, "rate limit window rolled over");
        }
    }

    fn next_boundary(&self, now: Instant) -> Instant {
        match *self.lock_window() {
            Some(start) => start + self.window,
            None => now + self.window,
        }
    }
}

/// Counts a caller as queued for as long as it is waiting.
struct QueueSlot<'a>(&'a AtomicUsize);

impl<'a> QueueSlot<'a> {
    /// Take a queue position unless `max` callers are already waiting.
    /// On refusal returns the observed depth.
    fn reserve(counter: &'a AtomicUsize, max: Option<usize>) -> Result<Self, usize> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                match max {
                    Some(max) if depth >= max => None,
                    _ => Some(depth + 1),
                }
            })
            .map(|_| Self(counter))
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use futures_util::future::join_all;

    fn limiter(config: RateLimitConfig) -> RateLimiter {
        RateLimiter::new("twitter", config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_callers_wait_for_next_window_in_order() {
        let limiter = limiter(RateLimitConfig::per_minute(3));
        let started = Instant::now();
        let admitted = Mutex::new(Vec::new());

        join_all((0..5).map(|id| {
            let limiter = &limiter;
            let admitted = &admitted;
            async move {
                limiter.acquire().await.unwrap();
                admitted.lock().unwrap().push((id, started.elapsed()));
            }
        }))
        .await;

        let admitted = admitted.into_inner().unwrap();
        let order: Vec<_> = admitted.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        for (_, elapsed) in &admitted[..3] {
            assert!(*elapsed < Duration::from_secs(60));
        }
        for (_, elapsed) in &admitted[3..] {
            assert!(*elapsed >= Duration::from_secs(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_windows_admit_in_arrival_order() {
        let limiter = limiter(RateLimitConfig::per_minute(1));
        let started = Instant::now();

        let waits = join_all((0..3).map(|_| {
            let limiter = &limiter;
            async move {
                limiter.acquire().await.unwrap();
                started.elapsed().as_secs()
            }
        }))
        .await;

        assert_eq!(waits, vec![0, 60, 120]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_exceeded_never_runs_operation() {
        let limiter = limiter(RateLimitConfig::per_minute(1).with_max_wait_ms(1_000));
        limiter.acquire().await.unwrap();

        let invoked = AtomicBool::new(false);
        let flag = &invoked;
        let started = Instant::now();
        let result = limiter
            .schedule(move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::RateLimited {
                reason: RateLimitRejection::WaitExceeded { .. },
                ..
            })
        ));
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(limiter.status().queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_bound_rejects_immediately() {
        let limiter = limiter(RateLimitConfig::per_minute(1).with_max_queue(1));
        let started = Instant::now();

        let (first, second, third) = tokio::join!(
            limiter.acquire(),
            limiter.acquire(),
            async {
                let result = limiter.acquire().await;
                (result, started.elapsed())
            },
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        let (third, rejected_after) = third;
        assert_eq!(third, Err(RateLimitRejection::QueueFull { depth: 1 }));
        assert_eq!(rejected_after, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_rolls_window_lazily() {
        let limiter = limiter(RateLimitConfig::per_minute(2));
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert_eq!(limiter.status().admitted_in_window, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.status().admitted_in_window, 0);

        let started = Instant::now();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(limiter.status().admitted_in_window, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_failure_is_not_a_rejection() {
        let limiter = limiter(RateLimitConfig::per_minute(5));
        let result = limiter
            .schedule(|| async { Err::<(), _>("HTTP 429 from upstream".to_string()) })
            .await;

        match result {
            Err(err @ ResilienceError::Operation { .. }) => assert!(!err.is_rejection()),
            other => panic!("expected operation error, got {other:?}"),
        }
        assert_eq!(limiter.status().admitted_in_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_at_boundary_queues_behind_waiters() {
        let limiter = limiter(RateLimitConfig::per_minute(2));
        let started = Instant::now();
        let admitted = Mutex::new(Vec::new());

        // Callers 0..4 arrive at t=0; caller 4 arrives exactly at the boundary.
        join_all((0..5).map(|id| {
            let limiter = &limiter;
            let admitted = &admitted;
            async move {
                if id == 4 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                limiter.acquire().await.unwrap();
                admitted.lock().unwrap().push((id, started.elapsed().as_secs()));
            }
        }))
        .await;

        let admitted = admitted.into_inner().unwrap();
        assert_eq!(admitted, vec![(0, 0), (1, 0), (2, 60), (3, 60), (4, 120)]);
    }

    #[test]
    fn test_queue_reservation_respects_bound() {
        let counter = AtomicUsize::new(0);
        let first = QueueSlot::reserve(&counter, Some(2)).unwrap();
        let _second = QueueSlot::reserve(&counter, Some(2)).unwrap();
        assert_eq!(QueueSlot::reserve(&counter, Some(2)).err(), Some(2));

        drop(first);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(QueueSlot::reserve(&counter, Some(2)).is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_arrivals_never_exceed_queue_bound() {
        let limiter = Arc::new(limiter(
            RateLimitConfig::per_minute(1)
                .with_max_queue(2)
                .with_max_wait_ms(1_000),
        ));
        limiter.acquire().await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut queue_full = 0;
        let mut wait_exceeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Err(RateLimitRejection::QueueFull { depth }) => {
                    assert!(depth <= 2);
                    queue_full += 1;
                }
                Err(RateLimitRejection::WaitExceeded { .. }) => wait_exceeded += 1,
                Ok(()) => panic!("window quota already spent"),
            }
        }

        assert!(wait_exceeded <= 2);
        assert_eq!(queue_full + wait_exceeded, 16);
        assert_eq!(limiter.status().queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_idle_gap_keeps_window_quota() {
        let limiter = limiter(RateLimitConfig {
            max_calls: 1,
            window_ms: 1,
            ..RateLimitConfig::default()
        });
        limiter.acquire().await.unwrap();

        // Far more 1ms windows than fit in a u32.
        tokio::time::advance(Duration::from_secs(60 * 86_400)).await;

        let started = Instant::now();
        limiter.acquire().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(limiter.status().admitted_in_window, 1);

        limiter.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1));
    }
}
