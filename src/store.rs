//! Credential store contract and built-in implementations.
//!
//! The pipeline never persists tokens itself. [`crate::auth::TokenCoordinator`] delegates every
//! durable read and write to a [`CredentialStore`], which stays the source of truth across
//! process restarts.

pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for the current access/refresh token pair.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the persisted access token, if any.
	fn access_token(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Returns the persisted refresh token, if any.
	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Persists or replaces the token pair.
	fn save_tokens(&self, pair: TokenPair) -> StoreFuture<'_, ()>;

	/// Removes every persisted token (logout semantics).
	fn clear_tokens(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Serialized snapshot shared by the built-in stores.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredCredentials {
	pub(crate) access_token: Option<TokenSecret>,
	pub(crate) refresh_token: Option<TokenSecret>,
	#[serde(with = "time::serde::rfc3339::option", default)]
	pub(crate) saved_at: Option<OffsetDateTime>,
}
impl StoredCredentials {
	pub(crate) fn from_pair(pair: TokenPair) -> Self {
		Self {
			access_token: Some(pair.access_token),
			refresh_token: pair.refresh_token,
			saved_at: Some(OffsetDateTime::now_utc()),
		}
	}
}
