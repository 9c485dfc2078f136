//! Folds raw pipeline outcomes into [`PipelineResult`] values.
//!
//! Mapping is pure: the same outcome always yields a structurally equal result.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	request::RawResponse,
	transport::{self, TransportFault},
};

/// Failures raised by the pipeline before or instead of an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum PipelineFault {
	/// Offline and the request could not be served from cache.
	#[error("Device is offline.")]
	Offline,
	/// Transport fault left after the retry budget.
	#[error(transparent)]
	Transport(#[from] TransportFault),
	/// No usable credentials remain after a refresh attempt.
	#[error("Session expired.")]
	SessionExpired,
	/// The request could not be prepared.
	#[error("Request could not be prepared: {0}.")]
	InvalidRequest(String),
}

/// Raw pipeline outcome before classification.
pub type RawOutcome = Result<RawResponse, PipelineFault>;

/// Decodes a JSON body, reporting the path of the first mismatch.
pub fn json<V>(bytes: &[u8]) -> Result<V, serde_path_to_error::Error<serde_json::Error>>
where
	V: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(de)
}

/// Stateless classifier turning [`RawOutcome`] values into [`PipelineResult`] values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResultMapper;
impl ResultMapper {
	/// Classifies `outcome`, decoding successful bodies with `decode`.
	///
	/// A 2xx response whose body is empty or fails to decode maps to [`ApiError::EmptyBody`].
	pub fn map<V, E, F>(&self, outcome: RawOutcome, decode: F) -> PipelineResult<V>
	where
		F: FnOnce(&[u8]) -> Result<V, E>,
	{
		let response = outcome.map_err(|fault| self.classify_fault(fault))?;

		if !response.is_success() {
			return Err(self.classify_status(&response));
		}
		if response.body.iter().all(u8::is_ascii_whitespace) {
			return Err(ApiError::EmptyBody);
		}

		decode(&response.body).map_err(|_| ApiError::EmptyBody)
	}

	/// Maps a non-2xx response onto the error taxonomy.
	pub fn classify_status(&self, response: &RawResponse) -> ApiError {
		match response.status {
			StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
			StatusCode::FORBIDDEN => ApiError::Forbidden,
			StatusCode::NOT_FOUND => ApiError::NotFound,
			StatusCode::REQUEST_TIMEOUT => ApiError::Timeout,
			StatusCode::TOO_MANY_REQUESTS =>
				ApiError::RateLimited(transport::parse_retry_after(&response.headers)),
			StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation(
				validation_details(&response.body)
					.unwrap_or_else(|| String::from_utf8_lossy(&response.body).trim().to_owned()),
			),
			StatusCode::BAD_REQUEST => match validation_details(&response.body) {
				Some(details) => ApiError::Validation(details),
				None => ApiError::Unknown(format!("status {}", response.status.as_u16())),
			},
			status if status.is_server_error() => ApiError::ServerError(status.as_u16()),
			status => ApiError::Unknown(format!("status {}", status.as_u16())),
		}
	}

	/// Maps a pipeline fault onto the error taxonomy.
	pub fn classify_fault(&self, fault: PipelineFault) -> ApiError {
		match fault {
			PipelineFault::Offline => ApiError::NoConnectivity,
			PipelineFault::SessionExpired => ApiError::Unauthorized,
			PipelineFault::InvalidRequest(cause) => ApiError::Unknown(cause),
			PipelineFault::Transport(TransportFault::Timeout) => ApiError::Timeout,
			PipelineFault::Transport(TransportFault::HostUnreachable { .. }) =>
				ApiError::NoConnectivity,
			PipelineFault::Transport(fault) => ApiError::Unknown(fault.to_string()),
		}
	}
}

// Structured bodies are JSON objects; prefer their `message`/`error` field.
fn validation_details(body: &[u8]) -> Option<String> {
	let value = serde_json::from_slice::<serde_json::Value>(body).ok()?;
	let object = value.as_object()?;

	for key in ["message", "error", "detail"] {
		if let Some(text) = object.get(key).and_then(serde_json::Value::as_str) {
			return Some(text.to_owned());
		}
	}

	Some(value.to_string())
}
