//! Optional observability helpers for pipeline stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `resilient_pipeline.request` with the
//!   `method`, `url`, and `stage` fields, plus debug/warn events for attempts, refreshes,
//!   connectivity transitions, and rate-limit waits.
//! - Enable `metrics` to increment `resilient_pipeline_attempt_total` (labeled by `method` +
//!   `outcome`) for every transport attempt and `resilient_pipeline_result_total` (labeled by
//!   `outcome`) for every classified result.
//!
//! Without either feature every helper compiles down to a no-op.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by spans and events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Connectivity gate.
	Gate,
	/// Rate-limit admission.
	Admission,
	/// Bearer token injection or refresh.
	Auth,
	/// Cache lookup or store.
	Cache,
	/// Transport call, including retries.
	Transport,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Gate => "gate",
			Stage::Admission => "admission",
			Stage::Auth => "auth",
			Stage::Cache => "cache",
			Stage::Transport => "transport",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each transport attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
	/// The transport returned a 2xx/3xx response.
	Success,
	/// The transport returned a 4xx/5xx response.
	Status,
	/// The transport failed before a response arrived.
	Fault,
}
impl AttemptOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AttemptOutcome::Success => "success",
			AttemptOutcome::Status => "status",
			AttemptOutcome::Fault => "fault",
		}
	}
}
impl Display for AttemptOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Headers whose values never reach logs.
pub const REDACTED_HEADERS: [&str; 4] =
	["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// Renders `headers` for logging with credential values replaced by `<redacted>`.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
	headers
		.iter()
		.map(|(name, value)| {
			let rendered = if REDACTED_HEADERS.contains(&name.as_str()) || value.is_sensitive() {
				"<redacted>".to_owned()
			} else {
				value.to_str().unwrap_or("<binary>").to_owned()
			};

			(name.as_str().to_owned(), rendered)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credential_headers_are_redacted() {
		let mut headers = HeaderMap::new();

		headers.insert(::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
		headers.insert(::http::header::COOKIE, HeaderValue::from_static("sid=1"));
		headers.insert(::http::header::ACCEPT, HeaderValue::from_static("application/json"));

		let rendered = redact_headers(&headers);

		assert!(rendered.iter().all(|(_, value)| !value.contains("secret")));
		assert!(rendered.contains(&("accept".into(), "application/json".into())));
		assert!(rendered.contains(&("authorization".into(), "<redacted>".into())));
	}
}
