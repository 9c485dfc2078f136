//! Bounded retry with exponential backoff.
//!
//! Only transient failures are retried: transport timeouts, connection resets, and 5xx
//! responses. Everything else, including 401 and 429, is handed back after the first attempt.
//! Once the budget is spent the last observed outcome is returned unchanged.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, config::RetryConfig, obs, request::RawResponse, transport::TransportFault};

/// Outcome of a single transport attempt.
pub type AttemptResult = Result<RawResponse, TransportFault>;

/// Returns `true` for statuses the retry stage re-issues (`500..=599`).
pub fn is_retryable_status(status: StatusCode) -> bool {
	status.is_server_error()
}

/// Retry verdict for one attempt outcome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryDecision {
	/// Sleep for the delay, then re-issue.
	RetryAfter(Duration),
	/// Hand the outcome to the caller.
	Stop,
}

/// Retry budget and backoff schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
	max_attempts: u32,
	base_delay: Duration,
	multiplier: f64,
	jitter: f64,
}
impl RetryPolicy {
	/// Creates a policy allowing `max_attempts` total attempts (at least one).
	pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
		Self { max_attempts: max_attempts.max(1), base_delay, multiplier, jitter: 0.0 }
	}

	/// Creates a policy from configuration.
	pub fn from_config(config: &RetryConfig) -> Self {
		Self::new(config.max_attempts, config.base_delay, config.multiplier)
			.with_jitter(config.jitter)
	}

	/// Sets the random extra delay fraction, clamped to `0.0..=1.0`.
	pub fn with_jitter(mut self, jitter: f64) -> Self {
		self.jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };

		self
	}

	/// Total attempts including the first.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// Delay before attempt `attempt` (1-based): `base * multiplier^(attempt - 2)`.
	pub fn delay_before(&self, attempt: u32) -> Duration {
		if attempt < 2 {
			return Duration::ZERO;
		}

		let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
		let mut secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);

		if self.jitter > 0.0 {
			secs *= 1.0 + rand::rng().random_range(0.0..=self.jitter);
		}

		Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
	}

	/// Decides whether the outcome of attempt `attempt` (1-based) warrants another try.
	pub fn decide(&self, attempt: u32, outcome: &AttemptResult) -> RetryDecision {
		let transient = match outcome {
			Ok(response) => is_retryable_status(response.status),
			Err(fault) => fault.is_transient(),
		};

		if transient && attempt < self.max_attempts {
			RetryDecision::RetryAfter(self.delay_before(attempt + 1))
		} else {
			RetryDecision::Stop
		}
	}

	/// Drives `attempt` until it succeeds, fails permanently, or the budget is spent.
	///
	/// The closure receives the 1-based attempt number. Dropping the returned future cancels a
	/// pending backoff sleep.
	pub async fn run<F, Fut>(&self, mut attempt: F) -> AttemptResult
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = AttemptResult>,
	{
		let mut n = 1;

		loop {
			let outcome = attempt(n).await;

			match self.decide(n, &outcome) {
				RetryDecision::Stop => return outcome,
				RetryDecision::RetryAfter(delay) => {
					n += 1;

					obs::retry_scheduled(n, delay);
					tokio::time::sleep(delay).await;
				},
			}
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_config(&RetryConfig::default())
	}
}
