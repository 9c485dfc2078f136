//! Pipeline-level error types: the closed [`ApiError`] taxonomy handed back to callers and the
//! construction-time [`ConfigError`].

// self
use crate::{_prelude::*, store::StoreError};

/// Result of every pipeline call; `Ok` is the success arm, `Err` the classified failure.
pub type PipelineResult<T, E = ApiError> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Closed error taxonomy surfaced by [`crate::pipeline::RequestPipeline::execute`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ApiError {
	/// Offline and the request cannot be served from cache.
	#[error("No network connection is available.")]
	NoConnectivity,
	/// Connect, read, or write timeout exceeded after the retry budget.
	#[error("The request timed out.")]
	Timeout,
	/// Server returned 429; carries the `Retry-After` hint in seconds when one was sent.
	#[error("The server is throttling requests{}.", fmt_retry_after(.0))]
	RateLimited(Option<u64>),
	/// 401 after a refresh attempt also failed, or no credentials are available.
	#[error("The session is not authorized.")]
	Unauthorized,
	/// Server returned 403.
	#[error("Access to the resource is forbidden.")]
	Forbidden,
	/// Server returned 404.
	#[error("The resource was not found.")]
	NotFound,
	/// Server returned 422, or 400 with a structured body.
	#[error("The request was rejected as invalid: {0}.")]
	Validation(String),
	/// Server returned 5xx after the retry budget was exhausted.
	#[error("The server failed with status {0}.")]
	ServerError(u16),
	/// Successful status but the payload was missing or could not be decoded.
	#[error("The response body was empty or could not be decoded.")]
	EmptyBody,
	/// Anything not covered by the other variants.
	#[error("Unexpected failure: {0}.")]
	Unknown(String),
}
impl ApiError {
	/// Returns the message category the UI layer renders for this error.
	pub const fn category(&self) -> MessageCategory {
		match self {
			Self::NoConnectivity => MessageCategory::Connectivity,
			Self::Timeout => MessageCategory::Timeout,
			Self::RateLimited(_) => MessageCategory::Throttled,
			Self::Unauthorized => MessageCategory::SessionExpired,
			Self::Forbidden => MessageCategory::AccessDenied,
			Self::NotFound => MessageCategory::NotFound,
			Self::Validation(_) => MessageCategory::InvalidInput,
			Self::ServerError(_) => MessageCategory::ServerUnavailable,
			Self::EmptyBody => MessageCategory::UnexpectedResponse,
			Self::Unknown(_) => MessageCategory::Unknown,
		}
	}
}
impl From<ConfigError> for ApiError {
	fn from(e: ConfigError) -> Self {
		Self::Unknown(e.to_string())
	}
}

/// Human-readable message category, one per [`ApiError`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageCategory {
	/// "You appear to be offline."
	Connectivity,
	/// "The request took too long."
	Timeout,
	/// "Too many requests, try again shortly."
	Throttled,
	/// "Please sign in again."
	SessionExpired,
	/// "You do not have access."
	AccessDenied,
	/// "Not found."
	NotFound,
	/// "Please check your input."
	InvalidInput,
	/// "The service is unavailable."
	ServerUnavailable,
	/// "Unexpected response from the server."
	UnexpectedResponse,
	/// "Something went wrong."
	Unknown,
}
impl MessageCategory {
	/// Returns a stable label suitable for logs or translation keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Connectivity => "connectivity",
			Self::Timeout => "timeout",
			Self::Throttled => "throttled",
			Self::SessionExpired => "session_expired",
			Self::AccessDenied => "access_denied",
			Self::NotFound => "not_found",
			Self::InvalidInput => "invalid_input",
			Self::ServerUnavailable => "server_unavailable",
			Self::UnexpectedResponse => "unexpected_response",
			Self::Unknown => "unknown",
		}
	}
}
impl Display for MessageCategory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and construction failures raised before any request is sent.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot be parsed.
	#[error("Base URL `{url}` is invalid.")]
	InvalidBaseUrl {
		/// Raw base URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request path cannot be joined onto the base URL.
	#[error("Request path `{path}` cannot be resolved against the base URL.")]
	InvalidPath {
		/// Raw request path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A policy header carries a value that is not a valid HTTP header value.
	#[error("Policy header `{name}` has an invalid value.")]
	InvalidHeaderValue {
		/// Header name.
		name: String,
		/// Underlying validation failure.
		#[source]
		source: ::http::header::InvalidHeaderValue,
	},
	/// A configured vary header is not a valid HTTP header name.
	#[error("Vary header `{name}` is not a valid header name.")]
	InvalidHeaderName {
		/// Raw header name.
		name: String,
		/// Underlying validation failure.
		#[source]
		source: ::http::header::InvalidHeaderName,
	},
	/// Configuration JSON could not be parsed.
	#[error("Configuration JSON is invalid.")]
	InvalidJson(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Credential store failed while loading the initial token state.
	#[error(transparent)]
	Storage(#[from] StoreError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

fn fmt_retry_after(retry_after: &Option<u64>) -> String {
	match retry_after {
		Some(secs) => format!(" (retry after {secs} seconds)"),
		None => String::new(),
	}
}
