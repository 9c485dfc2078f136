//! Fixed-order request pipeline.
//!
//! Every call passes through the same stages:
//!
//! 1. connectivity gate (offline mutations fail without a transport attempt);
//! 2. per-endpoint rate-limit admission;
//! 3. bearer token injection, refreshing first only after this pipeline saw the token rejected;
//! 4. cache directive and lookup for idempotent requests, after dropping every entry cached
//!    under an earlier session;
//! 5. the transport call, wrapped by the retry policy;
//! 6. one refresh-and-replay when the server answers 401;
//! 7. response cache normalization and storage.
//!
//! [`RequestPipeline::run`] returns the raw outcome; [`RequestPipeline::execute`] folds it through
//! [`ResultMapper`] so callers only ever see a [`PipelineResult`].

// crates.io
use ::http::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;
use crate::{
	_prelude::*,
	auth::{CoordinatorState, TokenCoordinator, TokenSecret},
	cache::{CacheLookup, CachePolicyStage, CacheStore},
	config::PipelineConfig,
	connectivity::ConnectivityMonitor,
	error::ConfigError,
	mapper::{self, PipelineFault, RawOutcome, ResultMapper},
	obs::{self, AttemptOutcome, Stage, StageSpan},
	rate_limit::RateLimiter,
	request::{RawResponse, RequestSpec},
	retry::RetryPolicy,
	transport::{self, Transport, TransportRequest},
};

/// Resilient wrapper around one backend host.
///
/// Cloning is cheap; clones share the rate windows, cache, token coordinator, and the
/// rejected-token marker.
#[derive(Clone)]
pub struct RequestPipeline {
	base_url: Url,
	policy_headers: HeaderMap,
	transport: Arc<dyn Transport>,
	connectivity: ConnectivityMonitor,
	rate_limiter: Arc<RateLimiter>,
	tokens: TokenCoordinator,
	cache: CachePolicyStage,
	retry: RetryPolicy,
	mapper: ResultMapper,
	rejected: Arc<Mutex<Option<TokenSecret>>>,
	cache_session: Arc<Mutex<u64>>,
}
impl RequestPipeline {
	/// Builds a pipeline backed by [`ReqwestTransport`] configured with `config.timeouts`.
	#[cfg(feature = "reqwest")]
	pub fn new(
		config: &PipelineConfig,
		connectivity: ConnectivityMonitor,
		tokens: TokenCoordinator,
	) -> Result<Self, ConfigError> {
		let transport = ReqwestTransport::from_config(&config.timeouts)?;

		Self::with_transport(config, Arc::new(transport), connectivity, tokens)
	}

	/// Builds a pipeline around a caller-supplied transport.
	pub fn with_transport(
		config: &PipelineConfig,
		transport: Arc<dyn Transport>,
		connectivity: ConnectivityMonitor,
		tokens: TokenCoordinator,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			base_url: config.base_url()?,
			policy_headers: config.headers.to_header_map()?,
			transport,
			cache: CachePolicyStage::new(&config.cache, connectivity.clone())?,
			connectivity,
			rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
			retry: RetryPolicy::from_config(&config.retry),
			mapper: ResultMapper,
			rejected: Default::default(),
			cache_session: Arc::new(Mutex::new(tokens.session())),
			tokens,
		})
	}

	/// Shares a rate limiter with other pipelines.
	pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
		self.rate_limiter = rate_limiter;

		self
	}

	/// Shares a response cache with other pipelines.
	pub fn with_cache_store(mut self, store: Arc<CacheStore>) -> Self {
		self.cache = self.cache.with_store(store);

		self
	}

	/// Returns the token coordinator.
	pub fn tokens(&self) -> &TokenCoordinator {
		&self.tokens
	}

	/// Returns the connectivity monitor.
	pub fn connectivity(&self) -> &ConnectivityMonitor {
		&self.connectivity
	}

	/// Returns the rate limiter.
	pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
		&self.rate_limiter
	}

	/// Returns the response cache.
	pub fn cache(&self) -> &Arc<CacheStore> {
		self.cache.store()
	}

	/// Runs `request` through every stage and classifies the outcome.
	///
	/// `decode` only sees bodies of 2xx responses; an empty body or a decode error yields
	/// [`ApiError::EmptyBody`].
	pub async fn execute<V, E, F>(&self, request: RequestSpec, decode: F) -> PipelineResult<V>
	where
		F: FnOnce(&[u8]) -> Result<V, E>,
	{
		let outcome = self.run(&request).await;
		let result = self.mapper.map(outcome, decode);

		obs::record_result(result.as_ref().err().map(ApiError::category));

		result
	}

	/// [`Self::execute`] with a JSON decoder.
	pub async fn execute_json<V>(&self, request: RequestSpec) -> PipelineResult<V>
	where
		V: DeserializeOwned,
	{
		self.execute(request, mapper::json::<V>).await
	}

	/// Runs `request` through every stage and returns the unclassified outcome.
	pub async fn run(&self, request: &RequestSpec) -> RawOutcome {
		let url = self.resolve(request.path())?;
		let span = StageSpan::new(request.method(), &transport::redacted_url(&url));

		span.instrument(self.run_stages(request, url, &span)).await
	}

	async fn run_stages(&self, spec: &RequestSpec, url: Url, span: &StageSpan) -> RawOutcome {
		span.stage(Stage::Gate);

		if !spec.is_idempotent() && !self.connectivity.is_online() {
			return Err(PipelineFault::Offline);
		}

		span.stage(Stage::Admission);
		self.rate_limiter.admit(spec.endpoint_key()).await;
		span.stage(Stage::Auth);

		let token = self.bearer_token().await?;
		let mut request = TransportRequest {
			method: spec.method().clone(),
			url,
			headers: self.prepare_headers(spec),
			body: spec.body().cloned(),
		};

		if let Some(token) = &token {
			authorize(&mut request, token)?;
		}

		span.stage(Stage::Cache);

		let session = self.sync_cache_session();

		if let Some(directive) = self.cache.apply_request(&mut request) {
			match self.cache.lookup(&request, directive) {
				CacheLookup::Hit(response) => {
					obs::cache_hit(directive);

					return Ok(response);
				},
				CacheLookup::Miss => {},
				CacheLookup::Unsatisfiable => return Err(PipelineFault::Offline),
			}
		}

		span.stage(Stage::Transport);

		let mut response = self.send_with_retry(&request).await?;

		if response.status == StatusCode::UNAUTHORIZED {
			response = self.reauthenticate(&mut request, token).await?;
		}

		span.stage(Stage::Cache);

		let response = self.cache.on_response(&request, response);

		if self.tokens.session() != session {
			self.cache.store().invalidate(&self.cache.fingerprint(&request));
		}

		Ok(response)
	}

	// Entries written under another session are dropped before the cache is consulted.
	fn sync_cache_session(&self) -> u64 {
		let session = self.tokens.session();
		let mut seen = self.cache_session.lock();

		if *seen != session {
			self.cache.store().clear();

			*seen = session;
		}

		session
	}

	// Refreshes up front only when a refresh is in flight or this pipeline saw the token rejected.
	async fn bearer_token(&self) -> Result<Option<TokenSecret>, PipelineFault> {
		let rejected = self.rejected.lock().clone();
		let current = self.tokens.current_token();
		let refresh_first = self.tokens.state() == CoordinatorState::Refreshing
			|| (rejected.is_some() && rejected == current);

		if !refresh_first {
			return Ok(current);
		}

		let fresh = self
			.tokens
			.ensure_fresh_token(rejected.as_ref())
			.await
			.map_err(|_| PipelineFault::SessionExpired)?;

		self.clear_rejected(rejected.as_ref());

		Ok(Some(fresh))
	}

	// Authenticator: one refresh (or join) and one replay per request.
	async fn reauthenticate(
		&self,
		request: &mut TransportRequest,
		sent: Option<TokenSecret>,
	) -> Result<RawResponse, PipelineFault> {
		*self.rejected.lock() = sent.clone();

		let fresh = self
			.tokens
			.ensure_fresh_token(sent.as_ref())
			.await
			.map_err(|_| PipelineFault::SessionExpired)?;

		self.clear_rejected(sent.as_ref());
		authorize(request, &fresh)?;

		let replayed = self.send_with_retry(request).await?;

		if replayed.status == StatusCode::UNAUTHORIZED {
			*self.rejected.lock() = Some(fresh);
		}

		Ok(replayed)
	}

	async fn send_with_retry(
		&self,
		request: &TransportRequest,
	) -> Result<RawResponse, PipelineFault> {
		let outcome = self
			.retry
			.run(|attempt| async move {
				let started = Instant::now();
				let outcome = self.transport.send(request.clone()).await;
				let elapsed = started.elapsed();
				let (label, status, fault) = match &outcome {
					Ok(response) if response.status.is_client_error()
						|| response.status.is_server_error() =>
						(AttemptOutcome::Status, Some(response.status), None),
					Ok(response) => (AttemptOutcome::Success, Some(response.status), None),
					Err(fault) => (AttemptOutcome::Fault, None, Some(fault.as_str())),
				};

				obs::attempt_finished(attempt, elapsed, label, status, fault, &request.headers);
				obs::record_attempt(&request.method, label);

				outcome
			})
			.await;

		outcome.map_err(PipelineFault::from)
	}

	fn resolve(&self, path: &str) -> Result<Url, PipelineFault> {
		self.base_url.join(path).map_err(|source| {
			PipelineFault::InvalidRequest(
				ConfigError::InvalidPath { path: path.to_owned(), source }.to_string(),
			)
		})
	}

	// Caller headers first; policy headers always win.
	fn prepare_headers(&self, spec: &RequestSpec) -> HeaderMap {
		let mut headers = spec.headers().clone();

		for (name, value) in &self.policy_headers {
			headers.insert(name.clone(), value.clone());
		}

		headers
	}

	fn clear_rejected(&self, seen: Option<&TokenSecret>) {
		let mut rejected = self.rejected.lock();

		if rejected.as_ref() == seen {
			*rejected = None;
		}
	}
}
impl Debug for RequestPipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("base_url", &self.base_url.as_str())
			.field("connectivity", &self.connectivity)
			.field("tokens", &self.tokens)
			.field("retry", &self.retry)
			.finish()
	}
}

fn authorize(request: &mut TransportRequest, token: &TokenSecret) -> Result<(), PipelineFault> {
	let value = token.bearer_header().map_err(|_| {
		PipelineFault::InvalidRequest("access token is not a valid header value".into())
	})?;

	request.headers.insert(AUTHORIZATION, value);

	Ok(())
}
