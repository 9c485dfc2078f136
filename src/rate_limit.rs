//! Per-endpoint sliding-window admission control.
//!
//! Each endpoint key owns its own async mutex around the window of admission instants, so a
//! saturated endpoint never stalls unrelated ones. Waiters on one key queue on that mutex and
//! are admitted roughly in arrival order. A saturated caller sleeps while holding its key's
//! lock until the oldest admission leaves the window; dropping the caller's future releases
//! the lock and cancels only that caller's wait.
//!
//! Windows that emptied out and have no waiter are dropped whenever a key is looked up, so
//! the key map only holds endpoints seen within the last window.

// self
use crate::{_prelude::*, config::RateLimitConfig, obs};

type RateWindow = Arc<AsyncMutex<VecDeque<Instant>>>;

/// Bounds how many requests per endpoint key are admitted within a trailing window.
#[derive(Debug)]
pub struct RateLimiter {
	burst: usize,
	window: Duration,
	windows: Mutex<HashMap<String, RateWindow>>,
}
impl RateLimiter {
	/// Creates a limiter admitting at most `burst` requests per key within `window`.
	pub fn new(burst: usize, window: Duration) -> Self {
		Self { burst: burst.max(1), window, windows: Default::default() }
	}

	/// Creates a limiter from configuration.
	pub fn from_config(config: &RateLimitConfig) -> Self {
		Self::new(config.burst, config.window)
	}

	/// Returns the per-key burst limit.
	pub fn burst(&self) -> usize {
		self.burst
	}

	/// Returns the trailing window length.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Waits until the request may proceed, then records its admission instant.
	pub async fn admit(&self, key: &str) {
		let window = self.window_for(key);
		let mut admitted = window.lock().await;

		loop {
			let now = Instant::now();

			Self::prune(&mut admitted, now, self.window);

			if admitted.len() < self.burst {
				admitted.push_back(now);

				return;
			}

			let oldest = admitted.front().copied().unwrap_or(now);
			let wait = self.window.saturating_sub(now.duration_since(oldest));

			obs::rate_limit_wait(key, wait);
			tokio::time::sleep(wait).await;
		}
	}

	/// Number of endpoint keys currently tracked.
	pub fn tracked_keys(&self) -> usize {
		self.windows.lock().len()
	}

	/// Returns how many admissions for `key` still fall inside the trailing window.
	pub async fn in_window(&self, key: &str) -> usize {
		let window = self.window_for(key);
		let mut admitted = window.lock().await;

		Self::prune(&mut admitted, Instant::now(), self.window);

		admitted.len()
	}

	fn window_for(&self, key: &str) -> RateWindow {
		let mut windows = self.windows.lock();
		let now = Instant::now();

		// A window only this map references cannot gain a holder while the map is locked.
		windows.retain(|_, window| {
			if Arc::strong_count(window) > 1 {
				return true;
			}

			match window.try_lock() {
				Some(mut admitted) => {
					Self::prune(&mut admitted, now, self.window);

					!admitted.is_empty()
				},
				None => true,
			}
		});

		windows.entry(key.to_owned()).or_default().clone()
	}

	fn prune(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
		while admitted.front().is_some_and(|oldest| now.duration_since(*oldest) >= window) {
			admitted.pop_front();
		}
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self::from_config(&RateLimitConfig::default())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures_util::future;
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn burst_is_admitted_immediately_and_the_next_request_waits() {
		let limiter = RateLimiter::new(10, Duration::from_secs(1));
		let start = Instant::now();

		for _ in 0..10 {
			limiter.admit("/orders").await;
		}

		assert_eq!(start.elapsed(), Duration::ZERO);

		limiter.admit("/orders").await;

		assert_eq!(start.elapsed(), Duration::from_secs(1));
		assert_eq!(limiter.in_window("/orders").await, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn no_trailing_window_ever_exceeds_the_burst() {
		let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(1)));
		let start = Instant::now();
		let admitted = future::join_all((0..35).map(|_| {
			let limiter = limiter.clone();

			async move {
				limiter.admit("/catalog").await;

				Instant::now()
			}
		}))
		.await;
		let mut instants = admitted;

		instants.sort();

		for (idx, instant) in instants.iter().enumerate() {
			let in_window = instants[idx..]
				.iter()
				.take_while(|later| later.duration_since(*instant) < Duration::from_secs(1))
				.count();

			assert!(in_window <= 10, "{in_window} admissions within one second");
		}

		assert_eq!(instants.len(), 35);
		assert_eq!(
			instants.last().map(|last| last.duration_since(start)),
			Some(Duration::from_secs(3))
		);
	}

	#[tokio::test(start_paused = true)]
	async fn keys_do_not_contend() {
		let limiter = RateLimiter::new(1, Duration::from_secs(1));
		let start = Instant::now();

		limiter.admit("/a").await;
		limiter.admit("/b").await;

		assert_eq!(start.elapsed(), Duration::ZERO);

		limiter.admit("/a").await;

		assert_eq!(start.elapsed(), Duration::from_secs(1));
	}

	#[tokio::test(start_paused = true)]
	async fn idle_keys_are_forgotten() {
		let limiter = RateLimiter::new(10, Duration::from_secs(1));

		for i in 0..1_000 {
			limiter.admit(&format!("/orders/{i}")).await;
		}

		assert_eq!(limiter.tracked_keys(), 1_000);

		tokio::time::advance(Duration::from_secs(3_600)).await;
		limiter.admit("/orders/new").await;

		assert_eq!(limiter.tracked_keys(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_waiter_hands_the_window_to_the_next_one() {
		let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(1)));
		let start = Instant::now();

		limiter.admit("/a").await;

		let spawn_waiter = || {
			let limiter = limiter.clone();

			tokio::spawn(async move {
				limiter.admit("/a").await;

				Instant::now()
			})
		};
		let first = spawn_waiter();

		for _ in 0..4 {
			tokio::task::yield_now().await;
		}

		let second = spawn_waiter();

		for _ in 0..4 {
			tokio::task::yield_now().await;
		}

		first.abort();

		assert!(first.await.is_err_and(|e| e.is_cancelled()));

		let admitted = second.await.expect("Second waiter should be admitted.");

		assert_eq!(admitted.duration_since(start), Duration::from_secs(1));
		assert_eq!(limiter.in_window("/a").await, 1);
	}
}
