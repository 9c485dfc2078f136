//! Resilient outbound HTTP request pipeline: connectivity gating, per-endpoint sliding-window
//! throttling, single-flight bearer token refresh, offline-aware response caching, and bounded
//! retry with exponential backoff, all folded into one closed result type.
//!
//! Application code builds a [`pipeline::RequestPipeline`] once per backend host and calls
//! [`pipeline::RequestPipeline::execute`] for every request. Every outcome, including transport
//! faults and session expiry, comes back as a [`error::PipelineResult`] value.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod mapper;
pub mod obs;
pub mod pipeline;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod store;
pub mod transport;

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{ApiError, PipelineResult};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
