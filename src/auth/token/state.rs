//! Token pair and the in-memory token state owned by the coordinator.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access token plus the optional refresh token issued alongside it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the backend issued or rotated one.
	pub refresh_token: Option<TokenSecret>,
}
impl TokenPair {
	/// Builds a pair from raw strings.
	pub fn new(access_token: impl Into<String>, refresh_token: Option<impl Into<String>>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: refresh_token.map(TokenSecret::new),
		}
	}

	/// Keeps `previous` as the refresh token when the backend did not rotate it.
	pub fn or_keep_refresh(mut self, previous: TokenSecret) -> Self {
		if self.refresh_token.is_none() {
			self.refresh_token = Some(previous);
		}

		self
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token_set", &self.refresh_token.is_some())
			.finish()
	}
}

/// Snapshot of the coordinator's current tokens.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenState {
	/// Last known access token.
	pub access_token: Option<TokenSecret>,
	/// Last known refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Instant of the last successful refresh; `None` until one happens in this process.
	pub refreshed_at: Option<OffsetDateTime>,
}
impl TokenState {
	/// Builds state from tokens loaded out of a credential store.
	pub fn loaded(access_token: Option<TokenSecret>, refresh_token: Option<TokenSecret>) -> Self {
		Self { access_token, refresh_token, refreshed_at: None }
	}

	/// Builds state from a freshly refreshed pair.
	pub fn refreshed(pair: TokenPair, at: OffsetDateTime) -> Self {
		Self {
			access_token: Some(pair.access_token),
			refresh_token: pair.refresh_token,
			refreshed_at: Some(at),
		}
	}

	/// Returns `true` when a refresh can be attempted.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}
}
impl Debug for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenState")
			.field("access_token_set", &self.access_token.is_some())
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("refreshed_at", &self.refreshed_at)
			.finish()
	}
}
