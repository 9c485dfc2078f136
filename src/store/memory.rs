//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	store::{CredentialStore, StoreFuture, StoredCredentials},
};

type StoreCell = Arc<RwLock<StoredCredentials>>;

/// Credential store that keeps the token pair in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore(StoreCell);
impl MemoryCredentialStore {
	/// Creates a store pre-seeded with the provided pair.
	pub fn with_tokens(pair: TokenPair) -> Self {
		Self(Arc::new(RwLock::new(StoredCredentials::from_pair(pair))))
	}

	/// Returns the instant the current pair was saved, if any.
	pub fn saved_at(&self) -> Option<OffsetDateTime> {
		self.0.read().saved_at
	}

	/// Returns `true` when neither token is present.
	pub fn is_empty(&self) -> bool {
		let guard = self.0.read();

		guard.access_token.is_none() && guard.refresh_token.is_none()
	}

	fn read_now(cell: &StoreCell, refresh: bool) -> Option<TokenSecret> {
		let guard = cell.read();

		if refresh { guard.refresh_token.clone() } else { guard.access_token.clone() }
	}
}
impl CredentialStore for MemoryCredentialStore {
	fn access_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let cell = self.0.clone();

		Box::pin(async move { Ok(Self::read_now(&cell, false)) })
	}

	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let cell = self.0.clone();

		Box::pin(async move { Ok(Self::read_now(&cell, true)) })
	}

	fn save_tokens(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move {
			*cell.write() = StoredCredentials::from_pair(pair);

			Ok(())
		})
	}

	fn clear_tokens(&self) -> StoreFuture<'_, ()> {
		let cell = self.0.clone();

		Box::pin(async move {
			*cell.write() = StoredCredentials::default();

			Ok(())
		})
	}
}
