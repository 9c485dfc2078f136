//! Offline-aware response caching for idempotent requests.
//!
//! While online a cached response is served until it is `max_age` old; while offline it is
//! served until it is `max_stale` old and never after, so an offline request with no usable entry
//! fails fast instead of reaching for the network. Only idempotent requests are ever looked up or
//! stored.

// crates.io
use ::http::header::{CACHE_CONTROL, PRAGMA};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	config::CacheConfig,
	connectivity::ConnectivityMonitor,
	error::ConfigError,
	request::{self, RawResponse},
	transport::TransportRequest,
};

/// Cache directive attached to an idempotent request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheDirective {
	/// Online: serve a cached entry younger than the given age, otherwise forward.
	MaxAge(Duration),
	/// Offline: serve a cached entry no older than `max_stale`, never the network.
	OnlyIfCached {
		/// Oldest entry still acceptable.
		max_stale: Duration,
	},
}
impl CacheDirective {
	/// Renders the `Cache-Control` request value.
	pub fn header_value(&self) -> String {
		match self {
			Self::MaxAge(age) => format!("max-age={}", age.as_secs()),
			Self::OnlyIfCached { max_stale } =>
				format!("only-if-cached, max-stale={}", max_stale.as_secs()),
		}
	}
}
impl Display for CacheDirective {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.header_value())
	}
}

/// Stable cache key derived from method, URL, and the configured vary headers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);
impl Fingerprint {
	/// Hashes the request identity into a URL-safe key.
	pub fn of(request: &TransportRequest, vary: &[HeaderName]) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(request.method.as_str().as_bytes());
		hasher.update(b"\n");
		hasher.update(request.url.as_str().as_bytes());

		for name in vary {
			hasher.update(b"\n");
			hasher.update(name.as_str().as_bytes());
			hasher.update(b":");

			for value in request.headers.get_all(name) {
				hasher.update(value.as_bytes());
				hasher.update(b",");
			}
		}

		Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
	}

	/// Returns the encoded key.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Stored response plus the instant it was written.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	/// Stored status.
	pub status: StatusCode,
	/// Normalized response headers.
	pub headers: HeaderMap,
	/// Stored body.
	pub body: Vec<u8>,
	/// Monotonic write time.
	pub stored_at: Instant,
}
impl CacheEntry {
	/// Age of the entry at `now`.
	pub fn age(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.stored_at)
	}

	fn to_response(&self) -> RawResponse {
		RawResponse {
			status: self.status,
			headers: self.headers.clone(),
			body: self.body.clone(),
			from_cache: true,
		}
	}
}

/// Result of consulting the cache for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheLookup {
	/// A usable entry; the response is marked `from_cache`.
	Hit(RawResponse),
	/// Nothing usable; forward to the network.
	Miss,
	/// Offline and nothing usable; the request must fail without a network attempt.
	Unsatisfiable,
}

/// In-memory response store with concurrent reads and serialized writes.
#[derive(Debug, Default)]
pub struct CacheStore {
	entries: RwLock<HashMap<Fingerprint, Arc<CacheEntry>>>,
}
impl CacheStore {
	/// Returns the entry for `key`, if any.
	pub fn get(&self, key: &Fingerprint) -> Option<Arc<CacheEntry>> {
		self.entries.read().get(key).cloned()
	}

	/// Stores or replaces the entry for `key`.
	pub fn insert(&self, key: Fingerprint, entry: CacheEntry) {
		self.entries.write().insert(key, Arc::new(entry));
	}

	/// Drops the entry for `key`; returns whether one existed.
	pub fn invalidate(&self, key: &Fingerprint) -> bool {
		self.entries.write().remove(key).is_some()
	}

	/// Drops every entry older than `max_age` at `now`; returns how many were dropped.
	pub fn evict_older_than(&self, max_age: Duration, now: Instant) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, entry| entry.age(now) <= max_age);

		before - entries.len()
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Whether the store is empty.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}

/// Request/response cache stage driven by the current connectivity.
#[derive(Clone, Debug)]
pub struct CachePolicyStage {
	store: Arc<CacheStore>,
	max_age: Duration,
	max_stale: Duration,
	vary: Vec<HeaderName>,
	connectivity: ConnectivityMonitor,
}
impl CachePolicyStage {
	/// Builds the stage from configuration, validating the vary header names.
	pub fn new(
		config: &CacheConfig,
		connectivity: ConnectivityMonitor,
	) -> Result<Self, ConfigError> {
		let vary = config
			.vary
			.iter()
			.map(|name| {
				HeaderName::try_from(name.as_str())
					.map_err(|source| ConfigError::InvalidHeaderName { name: name.clone(), source })
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			store: Default::default(),
			max_age: config.max_age,
			max_stale: config.max_stale,
			vary,
			connectivity,
		})
	}

	/// Shares an existing store (e.g. between pipelines for the same host).
	pub fn with_store(mut self, store: Arc<CacheStore>) -> Self {
		self.store = store;

		self
	}

	/// Returns the backing store.
	pub fn store(&self) -> &Arc<CacheStore> {
		&self.store
	}

	/// Chooses the directive for `method` given the current connectivity; `None` for mutations.
	pub fn directive(&self, method: &Method) -> Option<CacheDirective> {
		if !request::is_idempotent(method) {
			return None;
		}

		Some(if self.connectivity.is_online() {
			CacheDirective::MaxAge(self.max_age)
		} else {
			CacheDirective::OnlyIfCached { max_stale: self.max_stale }
		})
	}

	/// Attaches the directive as a `Cache-Control` header; mutations pass through untouched.
	pub fn apply_request(&self, request: &mut TransportRequest) -> Option<CacheDirective> {
		let directive = self.directive(&request.method)?;

		if let Ok(value) = HeaderValue::from_str(&directive.header_value()) {
			request.headers.insert(CACHE_CONTROL, value);
		}

		Some(directive)
	}

	/// Derives the cache key for `request`.
	pub fn fingerprint(&self, request: &TransportRequest) -> Fingerprint {
		Fingerprint::of(request, &self.vary)
	}

	/// Consults the store under `directive`.
	///
	/// An entry too old to be served under any directive is dropped.
	pub fn lookup(&self, request: &TransportRequest, directive: CacheDirective) -> CacheLookup {
		let key = self.fingerprint(request);
		let now = Instant::now();
		let entry = match self.store.get(&key) {
			Some(entry) if entry.age(now) > self.max_stale => {
				self.store.invalidate(&key);

				None
			},
			entry => entry,
		};

		match directive {
			CacheDirective::MaxAge(max_age) => match entry {
				Some(entry) if entry.age(now) < max_age => CacheLookup::Hit(entry.to_response()),
				_ => CacheLookup::Miss,
			},
			CacheDirective::OnlyIfCached { max_stale } => match entry {
				Some(entry) if entry.age(now) <= max_stale => CacheLookup::Hit(entry.to_response()),
				_ => CacheLookup::Unsatisfiable,
			},
		}
	}

	/// Normalizes the response cache headers and stores successful idempotent responses.
	///
	/// Non-idempotent requests get their response back untouched and are never stored.
	pub fn on_response(
		&self,
		request: &TransportRequest,
		mut response: RawResponse,
	) -> RawResponse {
		if !request.is_idempotent() || response.from_cache {
			return response;
		}

		response.headers.remove(CACHE_CONTROL);
		response.headers.remove(PRAGMA);

		let normalized = format!("public, max-age={}", self.max_age.as_secs());

		if let Ok(value) = HeaderValue::from_str(&normalized) {
			response.headers.insert(CACHE_CONTROL, value);
		}

		if response.is_success() {
			self.store.evict_older_than(self.max_stale, Instant::now());
			self.store.insert(
				self.fingerprint(request),
				CacheEntry {
					status: response.status,
					headers: response.headers.clone(),
					body: response.body.clone(),
					stored_at: Instant::now(),
				},
			);
		}

		response
	}
}
