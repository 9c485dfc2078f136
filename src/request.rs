//! Request and response values that flow through the pipeline.

// self
use crate::_prelude::*;

/// Returns `true` for methods that are safe to cache (`GET`, `HEAD`).
pub fn is_idempotent(method: &Method) -> bool {
	*method == Method::GET || *method == Method::HEAD
}

/// Request payload with its media type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBody {
	/// Raw payload bytes.
	pub bytes: Vec<u8>,
	/// `Content-Type` header value.
	pub content_type: String,
}

/// Application-level description of one call.
///
/// A spec is immutable once handed to the pipeline; stages derive new values from it.
#[derive(Clone, Debug)]
pub struct RequestSpec {
	method: Method,
	path: String,
	headers: HeaderMap,
	body: Option<RequestBody>,
}
impl RequestSpec {
	/// Creates a spec for `method` against a path relative to the pipeline's base URL.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a header value (headers form a multimap).
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Appends every entry of `headers`.
	pub fn with_headers(mut self, headers: HeaderMap) -> Self {
		for (name, value) in headers.iter() {
			self.headers.append(name.clone(), value.clone());
		}

		self
	}

	/// Attaches a raw body.
	pub fn with_body(mut self, bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
		self.body = Some(RequestBody { bytes: bytes.into(), content_type: content_type.into() });

		self
	}

	/// Serializes `value` as the JSON body.
	pub fn with_json<T>(self, value: &T) -> Result<Self, serde_json::Error>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(value)?;

		Ok(self.with_body(bytes, "application/json"))
	}

	/// Returns the HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Returns the path (and optional query) relative to the base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Returns the path without its query string; used as the rate-limit key.
	pub fn endpoint_key(&self) -> &str {
		self.path.split(['?', '#']).next().unwrap_or_default()
	}

	/// Returns the caller-supplied headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Returns the body, if any.
	pub fn body(&self) -> Option<&RequestBody> {
		self.body.as_ref()
	}

	/// Whether the request may be cached (derived from the method).
	pub fn is_idempotent(&self) -> bool {
		is_idempotent(&self.method)
	}
}

/// Raw transport outcome before classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body bytes.
	pub body: Vec<u8>,
	/// Whether the response was served from the local cache.
	pub from_cache: bool,
}
impl RawResponse {
	/// Builds a network response.
	pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers, body: body.into(), from_cache: false }
	}

	/// Builds a response with no headers; convenient for transports and tests.
	pub fn status(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self::new(status, HeaderMap::new(), body)
	}

	/// Whether the status is in `200..=299`.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn idempotence_is_derived_from_the_method() {
		assert!(RequestSpec::get("/items").is_idempotent());
		assert!(RequestSpec::new(Method::HEAD, "/items").is_idempotent());
		assert!(!RequestSpec::post("/items").is_idempotent());
		assert!(!RequestSpec::delete("/items/1").is_idempotent());
	}

	#[test]
	fn headers_form_a_multimap_and_keys_drop_queries() {
		let spec = RequestSpec::get("/items?page=2")
			.with_header(HeaderName::from_static("x-tag"), HeaderValue::from_static("a"))
			.with_header(HeaderName::from_static("x-tag"), HeaderValue::from_static("b"));

		assert_eq!(spec.headers().get_all("x-tag").iter().count(), 2);
		assert_eq!(spec.endpoint_key(), "/items");
	}

	#[test]
	fn json_bodies_carry_their_content_type() {
		let spec = RequestSpec::post("/login")
			.with_json(&serde_json::json!({ "user": "ada" }))
			.expect("JSON bodies should serialize.");
		let body = spec.body().expect("Body should be attached.");

		assert_eq!(body.content_type, "application/json");
		assert_eq!(body.bytes, br#"{"user":"ada"}"#);
	}
}
