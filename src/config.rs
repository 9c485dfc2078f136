//! Construction-time knobs for the pipeline, all with defaults.
//!
//! Every struct derives serde with `#[serde(default)]`, so a JSON document only needs the keys it
//! overrides. Durations are written as (fractional) seconds.

// self
use crate::{_prelude::*, error::ConfigError};

/// Header carrying the fixed tenant/company identifier.
pub const COMPANY_ID_HEADER: &str = "x-company-id";

/// Top-level pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
	/// Base URL every request path is resolved against (one backend host per process).
	pub base_url: String,
	/// Transport timeouts.
	pub timeouts: TimeoutConfig,
	/// Retry budget and backoff.
	pub retry: RetryConfig,
	/// Per-endpoint admission limits.
	pub rate_limit: RateLimitConfig,
	/// Response cache freshness policy.
	pub cache: CacheConfig,
	/// Policy headers injected into every request.
	pub headers: PolicyHeaders,
}
impl PipelineConfig {
	/// Creates a configuration with defaults for the given backend host.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self { base_url: base_url.into(), ..Default::default() }
	}

	/// Parses a JSON document, reporting the path of the first invalid key.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(json);

		Ok(serde_path_to_error::deserialize(de)?)
	}

	/// Parses and validates [`Self::base_url`].
	pub fn base_url(&self) -> Result<Url, ConfigError> {
		Url::parse(&self.base_url)
			.map_err(|source| ConfigError::InvalidBaseUrl { url: self.base_url.clone(), source })
	}

	/// Overrides the transport timeouts.
	pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
		self.timeouts = timeouts;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the rate-limit policy.
	pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.rate_limit = rate_limit;

		self
	}

	/// Overrides the cache policy.
	pub fn with_cache(mut self, cache: CacheConfig) -> Self {
		self.cache = cache;

		self
	}

	/// Overrides the policy headers.
	pub fn with_headers(mut self, headers: PolicyHeaders) -> Self {
		self.headers = headers;

		self
	}
}

/// Transport timeouts (defaults: 30s connect, 60s read, 60s write).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
	/// TCP/TLS connect timeout.
	#[serde(with = "secs")]
	pub connect: Duration,
	/// Read timeout between response chunks.
	#[serde(with = "secs")]
	pub read: Duration,
	/// Write timeout for the request.
	#[serde(with = "secs")]
	pub write: Duration,
}
impl Default for TimeoutConfig {
	fn default() -> Self {
		Self {
			connect: Duration::from_secs(30),
			read: Duration::from_secs(60),
			write: Duration::from_secs(60),
		}
	}
}

/// Retry budget (defaults: 3 attempts, 1s base delay, multiplier 2, no jitter).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Total attempts including the first.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	#[serde(with = "secs")]
	pub base_delay: Duration,
	/// Growth factor applied per further attempt.
	pub multiplier: f64,
	/// Random extra delay as a fraction of the computed delay (`0.0..=1.0`).
	pub jitter: f64,
}
impl RetryConfig {
	/// Overrides the attempt budget.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Overrides the base delay.
	pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
		self.base_delay = base_delay;

		self
	}

	/// Overrides the jitter fraction, clamped to `0.0..=1.0`.
	pub fn with_jitter(mut self, jitter: f64) -> Self {
		self.jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };

		self
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self { max_attempts: 3, base_delay: Duration::from_secs(1), multiplier: 2.0, jitter: 0.0 }
	}
}

/// Sliding-window limits (defaults: 10 requests per second per endpoint).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Maximum admissions per key inside one window.
	pub burst: usize,
	/// Trailing window length.
	#[serde(with = "secs")]
	pub window: Duration,
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { burst: 10, window: Duration::from_secs(1) }
	}
}

/// Cache freshness (defaults: 5 minutes online, 7 days stale while offline).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Age up to which a cached response is served while online.
	#[serde(with = "secs")]
	pub max_age: Duration,
	/// Age up to which a cached response is served while offline.
	#[serde(with = "secs")]
	pub max_stale: Duration,
	/// Request headers that partition cache entries.
	pub vary: Vec<String>,
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			max_age: Duration::from_secs(5 * 60),
			max_stale: Duration::from_secs(7 * 24 * 60 * 60),
			vary: vec!["accept-language".into(), COMPANY_ID_HEADER.into()],
		}
	}
}

/// Fixed headers injected into every request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyHeaders {
	/// Tenant/company identifier; omitted when empty.
	pub company_id: String,
	/// `Accept-Language` value.
	pub language: String,
}
impl PolicyHeaders {
	/// Creates policy headers for a company and language.
	pub fn new(company_id: impl Into<String>, language: impl Into<String>) -> Self {
		Self { company_id: company_id.into(), language: language.into() }
	}

	/// Renders the header map injected into every request.
	pub fn to_header_map(&self) -> Result<HeaderMap, ConfigError> {
		let mut headers = HeaderMap::new();

		headers.insert(::http::header::ACCEPT, HeaderValue::from_static("application/json"));

		if !self.language.is_empty() {
			headers.insert(
				::http::header::ACCEPT_LANGUAGE,
				header_value("accept-language", &self.language)?,
			);
		}
		if !self.company_id.is_empty() {
			headers.insert(
				HeaderName::from_static(COMPANY_ID_HEADER),
				header_value(COMPANY_ID_HEADER, &self.company_id)?,
			);
		}

		Ok(headers)
	}
}
impl Default for PolicyHeaders {
	fn default() -> Self {
		Self { company_id: String::new(), language: "en".into() }
	}
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
	HeaderValue::from_str(value)
		.map_err(|source| ConfigError::InvalidHeaderValue { name: name.to_owned(), source })
}

mod secs {
	// crates.io
	use serde::{Deserializer, Serializer, de::Error as _};
	// self
	use crate::_prelude::*;

	pub(super) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_f64(value.as_secs_f64())
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = f64::deserialize(deserializer)?;

		Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
	}
}
