// self
use crate::{
	_prelude::*,
	error::MessageCategory,
	obs::AttemptOutcome,
};

/// Records one transport attempt via the global metrics recorder (when enabled).
pub fn record_attempt(method: &Method, outcome: AttemptOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"resilient_pipeline_attempt_total",
			"method" => method.as_str().to_owned(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (method, outcome);
	}
}

/// Records the classified result of one pipeline call; `None` means success.
pub fn record_result(category: Option<MessageCategory>) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"resilient_pipeline_result_total",
			"outcome" => category.map(MessageCategory::as_str).unwrap_or("success")
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = category;
	}
}
