//! Refresh endpoint contract plus the default RFC 6749 `refresh_token` grant implementation.

// crates.io
#[cfg(feature = "reqwest")]
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, HttpRequest, HttpResponse, RefreshToken, RequestTokenError, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenPair, RefreshError>> + 'a + Send>>;

/// Performs the single network call that trades a refresh token for a new pair.
///
/// The coordinator guarantees that at most one call is outstanding at a time, so implementations
/// do not need their own deduplication.
pub trait TokenRefresher
where
	Self: 'static + Send + Sync,
{
	/// Exchanges `refresh_token` for a new access token (and optionally a rotated refresh token).
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a>;
}

/// Failure outcomes of a refresh attempt, shared by every waiter of the in-flight job.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// Backend explicitly rejected the refresh token.
	#[error("Refresh token was rejected: {reason}.")]
	Rejected {
		/// Backend-supplied reason string.
		reason: String,
	},
	/// Network failure while calling the refresh endpoint.
	#[error("Refresh endpoint could not be reached: {message}.")]
	Network {
		/// Transport-specific error message.
		message: String,
	},
	/// Refresh endpoint answered with a payload that could not be parsed.
	#[error("Refresh endpoint returned a malformed response: {message}.")]
	Malformed {
		/// Parser error message.
		message: String,
	},
	/// No refresh token is available; a new sign-in is required.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// A sign-in or sign-out replaced the session while the refresh was in flight.
	#[error("Session changed while the refresh was in flight.")]
	Superseded,
	/// The refresh task stopped before producing an outcome.
	#[error("Refresh task was aborted: {message}.")]
	Aborted {
		/// Runtime-supplied reason.
		message: String,
	},
}

#[cfg(feature = "reqwest")]
type RefreshClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// [`TokenRefresher`] that runs the OAuth 2.0 `refresh_token` grant against a token endpoint.
///
/// Token endpoints answer directly, so the default HTTP client never follows redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct OAuth2Refresher {
	oauth_client: RefreshClient,
	http: RefreshHttpHandle,
}
#[cfg(feature = "reqwest")]
impl OAuth2Refresher {
	/// Creates a refresher for a public client.
	pub fn new(token_endpoint: Url, client_id: impl Into<String>) -> Result<Self, ConfigError> {
		let http = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self::with_http_client(token_endpoint, client_id, http))
	}

	/// Creates a refresher that reuses the caller-provided reqwest client.
	pub fn with_http_client(
		token_endpoint: Url,
		client_id: impl Into<String>,
		http: ReqwestClient,
	) -> Self {
		let oauth_client = BasicClient::new(ClientId::new(client_id.into()))
			.set_token_uri(TokenUrl::from_url(token_endpoint));

		Self { oauth_client, http: RefreshHttpHandle(http) }
	}

	/// Authenticates the client with a secret (HTTP Basic by default).
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.oauth_client = self.oauth_client.set_client_secret(ClientSecret::new(secret.into()));

		self
	}

	/// Sends client credentials in the form body instead of the `Authorization` header.
	pub fn with_credentials_in_body(mut self) -> Self {
		self.oauth_client = self.oauth_client.set_auth_type(AuthType::RequestBody);

		self
	}
}
#[cfg(feature = "reqwest")]
impl TokenRefresher for OAuth2Refresher {
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async move {
			let secret = RefreshToken::new(refresh_token.expose().to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&secret)
				.request_async(&self.http)
				.await
				.map_err(map_request_error)?;

			Ok(TokenPair {
				access_token: TokenSecret::new(response.access_token().secret().to_owned()),
				refresh_token: response
					.refresh_token()
					.map(|token| TokenSecret::new(token.secret().to_owned())),
			})
		})
	}
}
#[cfg(feature = "reqwest")]
impl Debug for OAuth2Refresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Refresher")
			.field("token_endpoint", &self.oauth_client.token_uri().url().as_str())
			.finish()
	}
}

/// Adapter that lets the `oauth2` crate drive requests through reqwest.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
struct RefreshHttpHandle(ReqwestClient);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for RefreshHttpHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_request_error(err: BasicRequestTokenError<HttpClientError<ReqwestError>>) -> RefreshError {
	match err {
		RequestTokenError::ServerResponse(response) => RefreshError::Rejected {
			reason: response
				.error_description()
				.cloned()
				.unwrap_or_else(|| response.error().as_ref().to_owned()),
		},
		RequestTokenError::Request(HttpClientError::Reqwest(inner)) =>
			RefreshError::Network { message: inner.to_string() },
		RequestTokenError::Request(error) => RefreshError::Network { message: error.to_string() },
		RequestTokenError::Parse(error, _body) =>
			RefreshError::Malformed { message: error.to_string() },
		RequestTokenError::Other(message) => RefreshError::Rejected { reason: message },
	}
}
