//! Single-flight bearer token coordination.
//!
//! [`TokenCoordinator`] owns the current [`TokenState`] and an explicit `Idle → Refreshing →
//! Idle | Failed` lifecycle. State transitions and token reads/writes happen inside one short
//! synchronous critical section. The refresh network call runs on a spawned task after the
//! `Refreshing` phase and its shared outcome are published, so:
//!
//! - concurrent callers await the same outcome instead of starting a duplicate refresh;
//! - a caller that is cancelled while waiting never cancels the refresh other waiters need.
//!
//! Credential store writes from the refresh task, [`TokenCoordinator::sign_in`],
//! [`TokenCoordinator::sign_out`], and [`TokenCoordinator::reload`] are serialized. A refresh
//! that finishes after the session was replaced writes nothing and resolves to
//! [`RefreshError::Superseded`].

// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{RefreshError, RefreshMetrics, TokenPair, TokenRefresher, TokenSecret, TokenState},
	obs,
	store::{CredentialStore, StoreError},
};

type RefreshOutcome = Result<TokenSecret, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Observable lifecycle phase of a [`TokenCoordinator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoordinatorState {
	/// No refresh is in flight.
	Idle,
	/// A refresh call is outstanding; new callers join it.
	Refreshing,
	/// The last refresh failed and the session was cleared.
	Failed,
}
impl CoordinatorState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Refreshing => "refreshing",
			Self::Failed => "failed",
		}
	}
}
impl Display for CoordinatorState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// The in-flight refresh; at most one exists at any time.
struct RefreshJob {
	generation: u64,
	outcome: SharedRefresh,
}

enum Phase {
	Idle,
	Refreshing(RefreshJob),
	Failed,
}
impl Phase {
	fn state(&self) -> CoordinatorState {
		match self {
			Self::Idle => CoordinatorState::Idle,
			Self::Refreshing(_) => CoordinatorState::Refreshing,
			Self::Failed => CoordinatorState::Failed,
		}
	}

	fn is_current(&self, generation: u64) -> bool {
		matches!(self, Self::Refreshing(job) if job.generation == generation)
	}
}

struct Inner {
	tokens: TokenState,
	phase: Phase,
	generation: u64,
	session: u64,
}

/// Single source of truth for the current bearer token.
#[derive(Clone)]
pub struct TokenCoordinator {
	inner: Arc<Mutex<Inner>>,
	writes: Arc<AsyncMutex<()>>,
	store: Arc<dyn CredentialStore>,
	refresher: Arc<dyn TokenRefresher>,
	metrics: Arc<RefreshMetrics>,
}
impl TokenCoordinator {
	/// Builds a coordinator whose initial state is read from `store`.
	pub async fn load(
		store: Arc<dyn CredentialStore>,
		refresher: Arc<dyn TokenRefresher>,
	) -> Result<Self, StoreError> {
		let access = store.access_token().await?;
		let refresh = store.refresh_token().await?;

		Ok(Self::with_state(store, refresher, TokenState::loaded(access, refresh)))
	}

	/// Builds a coordinator from an explicit initial state.
	pub fn with_state(
		store: Arc<dyn CredentialStore>,
		refresher: Arc<dyn TokenRefresher>,
		tokens: TokenState,
	) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner {
				tokens,
				phase: Phase::Idle,
				generation: 0,
				session: 0,
			})),
			writes: Default::default(),
			store,
			refresher,
			metrics: Default::default(),
		}
	}

	/// Returns the last known access token without blocking on a refresh.
	pub fn current_token(&self) -> Option<TokenSecret> {
		self.inner.lock().tokens.access_token.clone()
	}

	/// Returns a snapshot of the token state.
	pub fn tokens(&self) -> TokenState {
		self.inner.lock().tokens.clone()
	}

	/// Returns the current lifecycle phase.
	pub fn state(&self) -> CoordinatorState {
		self.inner.lock().phase.state()
	}

	/// Returns a counter that changes whenever [`Self::sign_in`] or [`Self::sign_out`] replaces
	/// the session. Refreshes keep the session.
	pub fn session(&self) -> u64 {
		self.inner.lock().session
	}

	/// Returns the shared refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns a usable access token, refreshing it first when necessary.
	///
	/// `stale` is the token the caller saw rejected (or `None` when it had no token). If a
	/// refresh is already in flight the caller awaits its outcome. If another caller already
	/// replaced `stale`, the replacement is returned without a network call. Otherwise exactly
	/// one refresh is started and awaited.
	pub async fn ensure_fresh_token(
		&self,
		stale: Option<&TokenSecret>,
	) -> Result<TokenSecret, RefreshError> {
		let outcome = {
			let mut inner = self.inner.lock();

			match &inner.phase {
				Phase::Refreshing(job) => {
					self.metrics.record_join();
					obs::refresh_joined(job.generation);

					job.outcome.clone()
				},
				phase => {
					if matches!(phase, Phase::Idle) {
						if let Some(current) = inner.tokens.access_token.as_ref() {
							if stale != Some(current) {
								return Ok(current.clone());
							}
						}
					}

					let Some(refresh_token) = inner.tokens.refresh_token.clone() else {
						return Err(RefreshError::MissingRefreshToken);
					};

					inner.generation += 1;

					let generation = inner.generation;
					let outcome = self.spawn_refresh(generation, refresh_token);

					inner.phase =
						Phase::Refreshing(RefreshJob { generation, outcome: outcome.clone() });

					outcome
				},
			}
		};

		outcome.await
	}

	/// Persists a freshly issued pair (e.g. after sign-in) and returns to `Idle`.
	pub async fn sign_in(&self, pair: TokenPair) -> Result<(), StoreError> {
		let _writes = self.writes.lock().await;

		self.store.save_tokens(pair.clone()).await?;

		let mut inner = self.inner.lock();

		inner.tokens = TokenState::refreshed(pair, OffsetDateTime::now_utc());
		inner.generation += 1;
		inner.session += 1;
		inner.phase = Phase::Idle;

		Ok(())
	}

	/// Clears the persisted and in-memory session.
	pub async fn sign_out(&self) -> Result<(), StoreError> {
		let _writes = self.writes.lock().await;

		self.store.clear_tokens().await?;

		let mut inner = self.inner.lock();

		inner.tokens = TokenState::default();
		inner.generation += 1;
		inner.session += 1;
		inner.phase = Phase::Idle;

		Ok(())
	}

	/// Re-reads the credential store, picking up tokens written by another component.
	///
	/// A `Failed` coordinator becomes `Idle` again once the store holds a refresh token.
	pub async fn reload(&self) -> Result<CoordinatorState, StoreError> {
		let _writes = self.writes.lock().await;
		let access = self.store.access_token().await?;
		let refresh = self.store.refresh_token().await?;
		let mut inner = self.inner.lock();

		if matches!(inner.phase, Phase::Refreshing(_)) {
			return Ok(CoordinatorState::Refreshing);
		}

		let refreshed_at = inner.tokens.refreshed_at;

		inner.tokens = TokenState { refreshed_at, ..TokenState::loaded(access, refresh) };

		if matches!(inner.phase, Phase::Failed) && inner.tokens.can_refresh() {
			inner.phase = Phase::Idle;
		}

		Ok(inner.phase.state())
	}

	fn spawn_refresh(&self, generation: u64, refresh_token: TokenSecret) -> SharedRefresh {
		let inner = self.inner.clone();
		let writes = self.writes.clone();
		let store = self.store.clone();
		let refresher = self.refresher.clone();
		let metrics = self.metrics.clone();

		obs::refresh_started(generation);

		let task = tokio::spawn(async move {
			metrics.record_attempt();

			let result = refresher
				.refresh(&refresh_token)
				.await
				.map(|pair| pair.or_keep_refresh(refresh_token));
			// Held until the outcome is published; the job stays current while it is held.
			let _writes = writes.lock().await;
			let current = inner.lock().phase.is_current(generation);

			if !current {
				obs::refresh_finished(generation, Some(&RefreshError::Superseded));

				return Err(RefreshError::Superseded);
			}

			let persisted = match &result {
				Ok(pair) => store.save_tokens(pair.clone()).await.map_err(|e| ("save_tokens", e)),
				Err(_) => store.clear_tokens().await.map_err(|e| ("clear_tokens", e)),
			};

			if let Err((operation, e)) = persisted {
				obs::store_failed(operation, &e);
			}

			let mut guard = inner.lock();

			match result {
				Ok(pair) => {
					let access = pair.access_token.clone();

					guard.tokens = TokenState::refreshed(pair, OffsetDateTime::now_utc());
					guard.phase = Phase::Idle;

					metrics.record_success();
					obs::refresh_finished(generation, None);

					Ok(access)
				},
				Err(e) => {
					guard.tokens = TokenState::default();
					guard.phase = Phase::Failed;

					metrics.record_failure();
					obs::refresh_finished(generation, Some(&e));

					Err(e)
				},
			}
		});
		let inner = self.inner.clone();

		async move {
			match task.await {
				Ok(outcome) => outcome,
				Err(e) => {
					let mut guard = inner.lock();

					if guard.phase.is_current(generation) {
						guard.phase = Phase::Failed;
					}

					Err(RefreshError::Aborted { message: e.to_string() })
				},
			}
		}
		.boxed()
		.shared()
	}
}
impl Debug for TokenCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.inner.lock();

		f.debug_struct("TokenCoordinator")
			.field("state", &inner.phase.state())
			.field("tokens", &inner.tokens)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use futures_util::future;
	use tokio::sync::Notify;
	// self
	use super::*;
	use crate::{auth::RefreshFuture, store::MemoryCredentialStore};

	struct ScriptedRefresher {
		calls: AtomicUsize,
		gate: Option<Arc<Notify>>,
		outcome: Result<TokenPair, RefreshError>,
	}
	impl ScriptedRefresher {
		fn succeeding(access: &str, refresh: Option<&str>) -> Self {
			Self {
				calls: AtomicUsize::new(0),
				gate: None,
				outcome: Ok(TokenPair::new(access, refresh)),
			}
		}

		fn failing(error: RefreshError) -> Self {
			Self { calls: AtomicUsize::new(0), gate: None, outcome: Err(error) }
		}

		fn gated(mut self, gate: Arc<Notify>) -> Self {
			self.gate = Some(gate);

			self
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl TokenRefresher for ScriptedRefresher {
		fn refresh<'a>(&'a self, _refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				match &self.gate {
					Some(gate) => gate.notified().await,
					None => tokio::time::sleep(Duration::from_millis(50)).await,
				}

				self.outcome.clone()
			})
		}
	}

	fn coordinator(
		store: &MemoryCredentialStore,
		refresher: &Arc<ScriptedRefresher>,
	) -> TokenCoordinator {
		let access = Some(TokenSecret::new("expired"));
		let refresh = Some(TokenSecret::new("refresh-1"));

		TokenCoordinator::with_state(
			Arc::new(store.clone()),
			refresher.clone(),
			TokenState::loaded(access, refresh),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_callers_share_one_refresh() {
		let store = MemoryCredentialStore::default();
		let refresher = Arc::new(ScriptedRefresher::succeeding("fresh", Some("refresh-2")));
		let coordinator = coordinator(&store, &refresher);
		let stale = TokenSecret::new("expired");
		let results =
			future::join_all((0..8).map(|_| coordinator.ensure_fresh_token(Some(&stale)))).await;

		assert_eq!(refresher.calls(), 1);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert_eq!(coordinator.metrics().joined(), 7);

		for result in results {
			let token = result.expect("Every waiter should receive the new token.");

			assert_eq!(token.expose(), "fresh");
		}

		assert_eq!(coordinator.state(), CoordinatorState::Idle);
		assert_eq!(coordinator.current_token().as_ref().map(TokenSecret::expose), Some("fresh"));
		assert!(coordinator.tokens().refreshed_at.is_some());

		let stored = store.refresh_token().await.expect("Store read should succeed.");

		assert_eq!(stored.as_ref().map(TokenSecret::expose), Some("refresh-2"));
	}

	#[tokio::test(start_paused = true)]
	async fn late_caller_with_rotated_token_skips_refresh() {
		let store = MemoryCredentialStore::default();
		let refresher = Arc::new(ScriptedRefresher::succeeding("fresh", None));
		let coordinator = coordinator(&store, &refresher);
		let stale = TokenSecret::new("expired");

		coordinator.ensure_fresh_token(Some(&stale)).await.expect("First refresh should succeed.");

		let again = coordinator
			.ensure_fresh_token(Some(&stale))
			.await
			.expect("Second caller should reuse the rotated token.");

		assert_eq!(again.expose(), "fresh");
		assert_eq!(refresher.calls(), 1);

		let kept = store.refresh_token().await.expect("Store read should succeed.");

		assert_eq!(kept.as_ref().map(TokenSecret::expose), Some("refresh-1"));
	}

	#[tokio::test(start_paused = true)]
	async fn failure_clears_session_and_releases_every_waiter() {
		let store =
			MemoryCredentialStore::with_tokens(TokenPair::new("expired", Some("refresh-1")));
		let refresher = Arc::new(ScriptedRefresher::failing(RefreshError::Rejected {
			reason: "invalid_grant".into(),
		}));
		let coordinator = coordinator(&store, &refresher);
		let stale = TokenSecret::new("expired");
		let results =
			future::join_all((0..4).map(|_| coordinator.ensure_fresh_token(Some(&stale)))).await;

		assert_eq!(refresher.calls(), 1);

		for result in results {
			assert!(matches!(result, Err(RefreshError::Rejected { .. })));
		}

		assert_eq!(coordinator.state(), CoordinatorState::Failed);
		assert!(coordinator.current_token().is_none());
		assert!(store.is_empty());

		let retry = coordinator.ensure_fresh_token(None).await;

		assert_eq!(retry, Err(RefreshError::MissingRefreshToken));
		assert_eq!(refresher.calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_session_recovers_after_sign_in() {
		let store = MemoryCredentialStore::default();
		let refresher = Arc::new(ScriptedRefresher::failing(RefreshError::Network {
			message: "connection refused".into(),
		}));
		let coordinator = coordinator(&store, &refresher);

		let _ = coordinator.ensure_fresh_token(Some(&TokenSecret::new("expired"))).await;

		assert_eq!(coordinator.state(), CoordinatorState::Failed);

		coordinator
			.sign_in(TokenPair::new("signed-in", Some("refresh-9")))
			.await
			.expect("Sign-in should persist the new pair.");

		assert_eq!(coordinator.state(), CoordinatorState::Idle);
		assert_eq!(
			coordinator.current_token().as_ref().map(TokenSecret::expose),
			Some("signed-in")
		);

		store.clear_tokens().await.expect("Clearing the store should succeed.");
		coordinator.sign_out().await.expect("Sign-out should clear the session.");

		assert!(coordinator.current_token().is_none());

		store
			.save_tokens(TokenPair::new("external", Some("refresh-ext")))
			.await
			.expect("External save should succeed.");

		assert_eq!(
			coordinator.reload().await.expect("Reload should read the store."),
			CoordinatorState::Idle
		);
		assert_eq!(coordinator.current_token().as_ref().map(TokenSecret::expose), Some("external"));
	}

	#[tokio::test]
	async fn cancelled_waiter_does_not_cancel_shared_refresh() {
		let store = MemoryCredentialStore::default();
		let gate = Arc::new(Notify::new());
		let refresher =
			Arc::new(ScriptedRefresher::succeeding("fresh", None).gated(gate.clone()));
		let coordinator = coordinator(&store, &refresher);
		let first = {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator.ensure_fresh_token(Some(&TokenSecret::new("expired"))).await
			})
		};

		while coordinator.state() != CoordinatorState::Refreshing {
			tokio::task::yield_now().await;
		}

		first.abort();

		let _ = first.await;

		assert_eq!(coordinator.state(), CoordinatorState::Refreshing);

		let second = {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator.ensure_fresh_token(Some(&TokenSecret::new("expired"))).await
			})
		};

		while coordinator.metrics().joined() == 0 {
			tokio::task::yield_now().await;
		}

		gate.notify_one();

		let token = second
			.await
			.expect("Second waiter should not panic.")
			.expect("Second waiter should receive the refreshed token.");

		assert_eq!(token.expose(), "fresh");
		assert_eq!(refresher.calls(), 1);
	}

	async fn start_gated_refresh(
		coordinator: &TokenCoordinator,
	) -> tokio::task::JoinHandle<Result<TokenSecret, RefreshError>> {
		let waiter = {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator.ensure_fresh_token(Some(&TokenSecret::new("expired"))).await
			})
		};

		while coordinator.state() != CoordinatorState::Refreshing {
			tokio::task::yield_now().await;
		}

		waiter
	}

	#[tokio::test]
	async fn sign_out_during_refresh_is_not_undone() {
		let store =
			MemoryCredentialStore::with_tokens(TokenPair::new("expired", Some("refresh-1")));
		let gate = Arc::new(Notify::new());
		let refresher =
			Arc::new(ScriptedRefresher::succeeding("refreshed", None).gated(gate.clone()));
		let coordinator = coordinator(&store, &refresher);
		let waiter = start_gated_refresh(&coordinator).await;
		let session = coordinator.session();

		coordinator.sign_out().await.expect("Sign-out should clear the store.");
		gate.notify_one();

		let outcome = waiter.await.expect("Waiter should not panic.");

		assert_eq!(outcome, Err(RefreshError::Superseded));
		assert_ne!(coordinator.session(), session);
		assert_eq!(coordinator.state(), CoordinatorState::Idle);
		assert!(coordinator.current_token().is_none());
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn failed_refresh_does_not_wipe_a_newer_sign_in() {
		let store =
			MemoryCredentialStore::with_tokens(TokenPair::new("expired", Some("refresh-1")));
		let gate = Arc::new(Notify::new());
		let refresher = Arc::new(
			ScriptedRefresher::failing(RefreshError::Rejected { reason: "invalid_grant".into() })
				.gated(gate.clone()),
		);
		let coordinator = coordinator(&store, &refresher);
		let waiter = start_gated_refresh(&coordinator).await;

		coordinator
			.sign_in(TokenPair::new("new-login", Some("refresh-9")))
			.await
			.expect("Sign-in should persist the new pair.");
		gate.notify_one();

		let outcome = waiter.await.expect("Waiter should not panic.");
		let stored = store.access_token().await.expect("Store read should succeed.");

		assert_eq!(outcome, Err(RefreshError::Superseded));
		assert_eq!(coordinator.state(), CoordinatorState::Idle);
		assert_eq!(
			coordinator.current_token().as_ref().map(TokenSecret::expose),
			Some("new-login")
		);
		assert_eq!(stored.as_ref().map(TokenSecret::expose), Some("new-login"));
	}
}
