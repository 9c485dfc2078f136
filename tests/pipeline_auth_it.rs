mod support;

// std
use std::time::Duration;
// crates.io
use futures_util::future;
use http::StatusCode;
// self
use resilient_pipeline::{
	auth::{CoordinatorState, TokenPair},
	error::ApiError,
	request::{RawResponse, RequestSpec},
	store::CredentialStore,
};
use support::{FakeRefresher, FakeTransport};

fn accepting(token: &'static str) -> std::sync::Arc<FakeTransport> {
	FakeTransport::new(move |request, _| {
		if support::bearer(request).as_deref() == Some(&format!("Bearer {token}")) {
			Ok(RawResponse::status(StatusCode::OK, br#"{"ok":true}"#.to_vec()))
		} else {
			Ok(RawResponse::status(StatusCode::UNAUTHORIZED, Vec::new()))
		}
	})
}

#[tokio::test(start_paused = true)]
async fn concurrent_rejections_share_one_refresh() {
	let transport = accepting("access-2");
	let refresher = FakeRefresher::issuing("access-2", Duration::from_millis(250));
	let h = support::harness(support::config(), transport.clone(), refresher.clone(), "access-1")
		.await;
	let results = future::join_all((0..8).map(|i| {
		let pipeline = h.pipeline.clone();

		async move {
			pipeline.execute_json::<serde_json::Value>(RequestSpec::get(format!("feed/{i}"))).await
		}
	}))
	.await;

	assert!(results.iter().all(Result::is_ok), "{results:?}");
	assert_eq!(refresher.calls(), 1);
	assert_eq!(h.pipeline.tokens().state(), CoordinatorState::Idle);
	assert_eq!(h.pipeline.tokens().metrics().attempts(), 1);
	assert_eq!(
		h.store
			.access_token()
			.await
			.expect("Memory store should read.")
			.map(|t| t.expose().to_owned()),
		Some("access-2".into())
	);
	assert_eq!(
		h.store
			.refresh_token()
			.await
			.expect("Memory store should read.")
			.map(|t| t.expose().to_owned()),
		Some("refresh-1".into())
	);
}

#[tokio::test(start_paused = true)]
async fn later_requests_use_the_refreshed_token_directly() {
	let transport = accepting("access-2");
	let refresher = FakeRefresher::issuing("access-2", Duration::ZERO);
	let h = support::harness(support::config(), transport.clone(), refresher.clone(), "access-1")
		.await;

	h.pipeline
		.execute_json::<serde_json::Value>(RequestSpec::post("orders"))
		.await
		.expect("Replay after refresh should succeed.");
	h.pipeline
		.execute_json::<serde_json::Value>(RequestSpec::post("orders"))
		.await
		.expect("Refreshed token should be accepted.");

	let tokens = transport.requests().iter().map(support::bearer).collect::<Vec<_>>();

	assert_eq!(
		tokens,
		vec![
			Some("Bearer access-1".into()),
			Some("Bearer access-2".into()),
			Some("Bearer access-2".into()),
		]
	);
	assert_eq!(refresher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_ends_the_session() {
	let transport = accepting("never");
	let refresher = FakeRefresher::rejecting(Duration::from_millis(50));
	let h = support::harness(support::config(), transport.clone(), refresher.clone(), "access-1")
		.await;
	let results = future::join_all((0..4).map(|_| {
		let pipeline = h.pipeline.clone();

		async move { pipeline.execute_json::<serde_json::Value>(RequestSpec::post("cart")).await }
	}))
	.await;

	assert!(results.iter().all(|result| *result == Err(ApiError::Unauthorized)), "{results:?}");
	assert_eq!(refresher.calls(), 1);
	assert_eq!(h.pipeline.tokens().state(), CoordinatorState::Failed);
	assert!(h.store.is_empty());

	assert_eq!(
		h.pipeline.execute_json::<serde_json::Value>(RequestSpec::post("cart")).await,
		Err(ApiError::Unauthorized)
	);
	assert_eq!(refresher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn sign_in_restores_a_failed_session() {
	let transport = accepting("access-9");
	let refresher = FakeRefresher::rejecting(Duration::ZERO);
	let h = support::harness(support::config(), transport.clone(), refresher.clone(), "access-1")
		.await;

	assert_eq!(
		h.pipeline.execute_json::<serde_json::Value>(RequestSpec::get("me")).await,
		Err(ApiError::Unauthorized)
	);

	h.pipeline
		.tokens()
		.sign_in(TokenPair::new("access-9", Some("refresh-9")))
		.await
		.expect("Memory store should save.");

	assert_eq!(h.pipeline.tokens().state(), CoordinatorState::Idle);
	assert!(h.pipeline.execute_json::<serde_json::Value>(RequestSpec::get("me")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn policy_headers_accompany_every_request() {
	let transport = accepting("access-1");
	let config = support::config()
		.with_headers(resilient_pipeline::config::PolicyHeaders::new("acme", "fr-FR"));
	let h = support::harness(
		config,
		transport.clone(),
		FakeRefresher::rejecting(Duration::ZERO),
		"access-1",
	)
	.await;

	h.pipeline
		.execute_json::<serde_json::Value>(RequestSpec::get("me"))
		.await
		.expect("Valid token should be accepted.");

	let sent = &transport.requests()[0];
	let header = |name: &str| sent.headers.get(name).and_then(|v| v.to_str().ok());

	assert_eq!(header("authorization"), Some("Bearer access-1"));
	assert_eq!(header("accept"), Some("application/json"));
	assert_eq!(header("accept-language"), Some("fr-FR"));
	assert_eq!(header("x-company-id"), Some("acme"));
}
