//! Shared fakes for the pipeline integration tests.

#![allow(dead_code)]

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
use tokio::time::Instant;
// self
use resilient_pipeline::{
	auth::{
		RefreshError, RefreshFuture, TokenCoordinator, TokenPair, TokenRefresher, TokenSecret,
	},
	config::PipelineConfig,
	connectivity::{ConnectivityMonitor, TransportKind},
	pipeline::RequestPipeline,
	request::RawResponse,
	store::MemoryCredentialStore,
	transport::{Transport, TransportFault, TransportFuture, TransportRequest},
};

pub const BASE_URL: &str = "https://api.example.com/v1/";

type Responder =
	Box<dyn Fn(&TransportRequest, usize) -> Result<RawResponse, TransportFault> + Send + Sync>;

/// Transport driven by a closure that sees every request and its 1-based call number.
pub struct FakeTransport {
	responder: Responder,
	calls: Mutex<Vec<(Instant, TransportRequest)>>,
}
impl FakeTransport {
	pub fn new<F>(responder: F) -> Arc<Self>
	where
		F: 'static
			+ Fn(&TransportRequest, usize) -> Result<RawResponse, TransportFault>
			+ Send
			+ Sync,
	{
		Arc::new(Self { responder: Box::new(responder), calls: Default::default() })
	}

	pub fn always(response: RawResponse) -> Arc<Self> {
		Self::new(move |_, _| Ok(response.clone()))
	}

	pub fn calls(&self) -> usize {
		self.calls.lock().len()
	}

	pub fn call_instants(&self) -> Vec<Instant> {
		self.calls.lock().iter().map(|(at, _)| *at).collect()
	}

	pub fn requests(&self) -> Vec<TransportRequest> {
		self.calls.lock().iter().map(|(_, request)| request.clone()).collect()
	}
}
impl Transport for FakeTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		let n = {
			let mut calls = self.calls.lock();

			calls.push((Instant::now(), request.clone()));

			calls.len()
		};
		let outcome = (self.responder)(&request, n);

		Box::pin(async move { outcome })
	}
}

/// Refresher that counts calls, waits `delay`, then issues `next` (or fails when `None`).
pub struct FakeRefresher {
	next: Option<TokenPair>,
	delay: Duration,
	calls: AtomicUsize,
}
impl FakeRefresher {
	pub fn issuing(access: &str, delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			next: Some(TokenPair::new(access, None::<String>)),
			delay,
			calls: AtomicUsize::new(0),
		})
	}

	pub fn rejecting(delay: Duration) -> Arc<Self> {
		Arc::new(Self { next: None, delay, calls: AtomicUsize::new(0) })
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl TokenRefresher for FakeRefresher {
	fn refresh<'a>(&'a self, _: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(self.delay).await;

			self.next
				.clone()
				.ok_or_else(|| RefreshError::Rejected { reason: "invalid_grant".into() })
		})
	}
}

pub struct Harness {
	pub pipeline: RequestPipeline,
	pub store: MemoryCredentialStore,
	pub connectivity: ConnectivityMonitor,
}

pub async fn harness(
	config: PipelineConfig,
	transport: Arc<FakeTransport>,
	refresher: Arc<FakeRefresher>,
	access: &str,
) -> Harness {
	let store = MemoryCredentialStore::with_tokens(TokenPair::new(access, Some("refresh-1")));
	let tokens = TokenCoordinator::load(Arc::new(store.clone()), refresher)
		.await
		.expect("Memory store should load.");
	let connectivity = ConnectivityMonitor::new(TransportKind::Wifi);
	let pipeline =
		RequestPipeline::with_transport(&config, transport, connectivity.clone(), tokens)
			.expect("Test configuration should be valid.");

	Harness { pipeline, store, connectivity }
}

pub fn config() -> PipelineConfig {
	PipelineConfig::new(BASE_URL)
}

pub fn bearer(request: &TransportRequest) -> Option<String> {
	request
		.headers
		.get(http::header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.map(ToOwned::to_owned)
}
