//! Transport seam between the pipeline and an HTTP client.
//!
//! [`Transport`] is the pipeline's only dependency on an HTTP stack. The default
//! [`ReqwestTransport`] (behind the `reqwest` feature) applies the configured timeouts and
//! classifies client errors into [`TransportFault`] values that the retry stage and the
//! result mapper understand.

// std
#[cfg(feature = "reqwest")] use std::io::ErrorKind;
// crates.io
use ::http::header::RETRY_AFTER;
use time::format_description::well_known::Rfc2822;
// self
#[cfg(feature = "reqwest")] use crate::config::TimeoutConfig;
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::{
	_prelude::*,
	request::{self, RawResponse, RequestBody},
};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportFault>> + 'a + Send>>;

/// Abstraction over HTTP clients capable of executing one prepared request.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` once; retries are the pipeline's job.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Fully prepared request handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL.
	pub url: Url,
	/// Headers, including the injected policy and authorization headers.
	pub headers: HeaderMap,
	/// Optional body.
	pub body: Option<RequestBody>,
}
impl TransportRequest {
	/// Whether the request may be cached.
	pub fn is_idempotent(&self) -> bool {
		request::is_idempotent(&self.method)
	}
}

/// Returns `url` without query or fragment, for logging.
pub fn redacted_url(url: &Url) -> String {
	let mut url = url.clone();

	url.set_query(None);
	url.set_fragment(None);

	url.into()
}

/// Transport-layer failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TransportFault {
	/// Connect, read, or write timeout exceeded.
	#[error("The request timed out.")]
	Timeout,
	/// The connection was reset or closed mid-exchange.
	#[error("The connection was reset.")]
	ConnectionReset,
	/// DNS resolution failed or the host refused the connection.
	#[error("Host is unreachable: {message}.")]
	HostUnreachable {
		/// Transport-specific detail.
		message: String,
	},
	/// TLS negotiation or certificate validation failed.
	#[error("TLS failure: {message}.")]
	Tls {
		/// Transport-specific detail.
		message: String,
	},
	/// Anything else reported by the client.
	#[error("Transport failure: {message}.")]
	Other {
		/// Transport-specific detail.
		message: String,
	},
}
impl TransportFault {
	/// Whether re-issuing the request may succeed (timeouts and connection resets only).
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Timeout | Self::ConnectionReset)
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Timeout => "timeout",
			Self::ConnectionReset => "connection_reset",
			Self::HostUnreachable { .. } => "host_unreachable",
			Self::Tls { .. } => "tls",
			Self::Other { .. } => "other",
		}
	}
}

/// Reqwest-backed [`Transport`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client with connect/read timeouts and a whole-request bound of write + read.
	pub fn from_config(timeouts: &TimeoutConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.connect_timeout(timeouts.connect)
			.read_timeout(timeouts.read)
			.timeout(timeouts.write + timeouts.read)
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client.request(request.method, request.url).headers(request.headers);

			if let Some(body) = request.body {
				builder = builder
					.header(::http::header::CONTENT_TYPE, body.content_type)
					.body(body.bytes);
			}

			let response = builder.send().await.map_err(classify_reqwest_error)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(classify_reqwest_error)?;

			Ok(RawResponse::new(status, headers, body.to_vec()))
		})
	}
}

/// Maps a reqwest failure onto a [`TransportFault`] by inspecting the error and its sources.
#[cfg(feature = "reqwest")]
pub fn classify_reqwest_error(err: ReqwestError) -> TransportFault {
	if err.is_timeout() {
		return TransportFault::Timeout;
	}

	let mut source = err.source();

	while let Some(cause) = source {
		if let Some(io) = cause.downcast_ref::<std::io::Error>() {
			match io.kind() {
				ErrorKind::TimedOut => return TransportFault::Timeout,
				ErrorKind::ConnectionReset
				| ErrorKind::ConnectionAborted
				| ErrorKind::BrokenPipe
				| ErrorKind::UnexpectedEof => return TransportFault::ConnectionReset,
				_ => {},
			}
		}

		let text = cause.to_string().to_ascii_lowercase();

		if text.contains("dns") || text.contains("lookup address") || text.contains("resolve") {
			return TransportFault::HostUnreachable { message: cause.to_string() };
		}
		if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
			return TransportFault::Tls { message: cause.to_string() };
		}

		source = cause.source();
	}

	if err.is_connect() {
		return TransportFault::HostUnreachable { message: err.to_string() };
	}

	TransportFault::Other { message: err.to_string() }
}

/// Parses `Retry-After` as delta-seconds or an HTTP date, rounded up to whole seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(secs);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			let whole = delta.whole_seconds().max(0) as u64;

			return Some(if delta.subsec_nanoseconds() > 0 { whole + 1 } else { whole });
		}

		return Some(0);
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn headers(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_str(value).expect("Valid header fixture."));

		headers
	}

	#[test]
	fn retry_after_accepts_delta_seconds_and_dates() {
		assert_eq!(parse_retry_after(&headers("120")), Some(120));
		assert_eq!(parse_retry_after(&headers("Wed, 21 Oct 2015 07:28:00 +0000")), Some(0));

		let future = (OffsetDateTime::now_utc() + time::Duration::minutes(10))
			.format(&Rfc2822)
			.expect("RFC 2822 formatting should succeed.");
		let parsed = parse_retry_after(&headers(&future)).expect("Future dates should parse.");

		assert!((590..=600).contains(&parsed), "unexpected retry hint {parsed}");
		assert_eq!(parse_retry_after(&headers("soon")), None);
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}

	#[test]
	fn only_timeouts_and_resets_are_transient() {
		assert!(TransportFault::Timeout.is_transient());
		assert!(TransportFault::ConnectionReset.is_transient());
		assert!(!TransportFault::HostUnreachable { message: "dns".into() }.is_transient());
		assert!(!TransportFault::Tls { message: "bad cert".into() }.is_transient());
	}

	#[test]
	fn redacted_url_drops_query() {
		let url = Url::parse("https://api.example.com/items?token=secret#frag")
			.expect("Fixture URL should parse.");

		assert_eq!(redacted_url(&url), "https://api.example.com/items");
	}
}
