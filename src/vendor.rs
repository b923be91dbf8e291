//! Vendor status codes, the error-code registry, and classified errors.

mod code;
mod registry;

pub use code::*;
pub use registry::*;

// self
use crate::{_prelude::*, gateway::RequestSummary};

/// Synthetic code attached to local admission denials; never collides with vendor codes.
pub const LOCAL_RATE_LIMIT_CODE: &str = "local.rate_limited";

/// Where a classified error originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
	/// Raised by the local admission controller before any network call.
	Local,
	/// Returned by the vendor in a response envelope.
	Vendor,
}
impl Display for ErrorOrigin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Local => "local",
			Self::Vendor => "vendor",
		})
	}
}

/// Error carrying the retry policy metadata the gateway acts on.
#[derive(Clone, Debug, ThisError)]
#[error("Request failed with {origin} code {code}: {message}.")]
pub struct ApiError {
	/// Canonical code.
	pub code: VendorCode,
	/// Human-readable message from the registry (or the vendor for unknown codes).
	pub message: String,
	/// Message the vendor sent alongside the code, if any.
	pub vendor_message: Option<String>,
	/// Whether the gateway may transparently retry.
	pub retryable: bool,
	/// Whether the cached access token must be discarded before retrying.
	pub refresh_token: bool,
	/// Whether the refresh token itself was rejected.
	pub refresh_token_invalid: bool,
	/// Suggested wait before retrying (local rate limiting only).
	pub retry_after: Option<StdDuration>,
	/// Origin of the failure.
	pub origin: ErrorOrigin,
	/// Parsed response body, when the vendor sent one.
	pub response: Option<Value>,
	/// Equivalent request description.
	pub request: Option<RequestSummary>,
}
impl ApiError {
	/// Builds the error raised when the local admission bucket is exhausted.
	pub fn local_rate_limited(retry_after: StdDuration) -> Self {
		Self {
			code: VendorCode::new(LOCAL_RATE_LIMIT_CODE),
			message: "Local concurrency limit reached for this endpoint".into(),
			vendor_message: None,
			retryable: true,
			refresh_token: false,
			refresh_token_invalid: false,
			retry_after: Some(retry_after),
			origin: ErrorOrigin::Local,
			response: None,
			request: None,
		}
	}

	/// Returns `true` for local admission denials.
	pub fn is_local_rate_limit(&self) -> bool {
		self.origin == ErrorOrigin::Local && self.code.as_str() == LOCAL_RATE_LIMIT_CODE
	}

	/// Attaches an equivalent request description.
	pub fn with_request(mut self, request: RequestSummary) -> Self {
		self.request = Some(request);

		self
	}

	/// Attaches the parsed response body.
	pub fn with_response(mut self, response: Value) -> Self {
		self.response = Some(response);

		self
	}
}
