// self
use crate::{
	_prelude::*,
	auth::RefreshError,
	cache::CacheDirective,
	connectivity::{ConnectivityState, ProbeError},
	obs::{AttemptOutcome, Stage},
	store::StoreError,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRequest<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRequest<F> = F;

/// Span wrapping one pipeline call.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Creates a span tagged with the request method and redacted URL.
	pub fn new(method: &Method, url: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"resilient_pipeline.request",
				method = method.as_str(),
				url,
				stage = tracing::field::Empty
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, url);

			Self {}
		}
	}

	/// Records the stage the request is currently in.
	pub fn stage(&self, stage: Stage) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("stage", stage.as_str());
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRequest<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs one transport attempt with its latency and status or fault.
pub fn attempt_finished(
	attempt: u32,
	elapsed: Duration,
	outcome: AttemptOutcome,
	status: Option<StatusCode>,
	fault: Option<&str>,
	headers: &HeaderMap,
) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			attempt,
			duration_ms = elapsed.as_millis() as u64,
			outcome = outcome.as_str(),
			status = status.map(|status| status.as_u16()),
			fault,
			headers = ?crate::obs::redact_headers(headers),
			"transport attempt finished"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, elapsed, outcome, status, fault, headers);
	}
}

/// Logs a scheduled retry.
pub fn retry_scheduled(next_attempt: u32, delay: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(next_attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (next_attempt, delay);
	}
}

/// Logs a cache hit served without a network call.
pub fn cache_hit(directive: CacheDirective) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(directive = %directive, "served from cache");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = directive;
	}
}

/// Logs a caller joining an in-flight refresh.
pub fn refresh_joined(generation: u64) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(generation, "joined in-flight token refresh");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = generation;
	}
}

/// Logs the start of a refresh call.
pub fn refresh_started(generation: u64) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(generation, "token refresh started");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = generation;
	}
}

/// Logs the end of a refresh call.
pub fn refresh_finished(generation: u64, error: Option<&RefreshError>) {
	#[cfg(feature = "tracing")]
	{
		match error {
			None => tracing::info!(generation, "token refresh succeeded"),
			Some(e) => tracing::warn!(generation, error = %e, "token refresh failed"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (generation, error);
	}
}

/// Logs a credential store failure that could not be surfaced to a caller.
pub fn store_failed(operation: &'static str, error: &StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(operation, error = %error, "credential store operation failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, error);
	}
}

/// Logs a connectivity transition.
pub fn connectivity_changed(previous: ConnectivityState, next: ConnectivityState) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(
			from = previous.transport.as_str(),
			to = next.transport.as_str(),
			online = next.online,
			"connectivity changed"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (previous, next);
	}
}

/// Logs a failed platform probe; the monitor falls back to offline.
pub fn probe_failed(error: &ProbeError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(error = %error, "network probe failed; assuming offline");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

/// Logs a caller suspended by the rate limiter.
pub fn rate_limit_wait(key: &str, wait: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(key, wait_ms = wait.as_millis() as u64, "rate limit reached; waiting");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, wait);
	}
}
