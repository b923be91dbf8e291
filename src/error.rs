//! Gateway-level error types shared across admission, credentials, signing, and dispatch.

// self
use crate::{_prelude::*, gateway::RequestSummary, vendor::ApiError};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Unexpected upstream response without a classifiable vendor code.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Signature computation failed.
	#[error(transparent)]
	Sign(#[from] crate::sign::SignError),
	/// Classified failure (local admission denial or vendor business error).
	#[error(transparent)]
	Api(Box<ApiError>),

	/// Full re-authentication failed, so the call never reached dispatch.
	#[error("Authentication failed for app `{app_id}`.")]
	Authentication {
		/// Identity whose credentials could not be obtained.
		app_id: String,
		/// Underlying failure raised by the token endpoint.
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Returns the classified error, if this is one.
	pub fn as_api(&self) -> Option<&ApiError> {
		match self {
			Self::Api(err) => Some(err.as_ref()),
			_ => None,
		}
	}

	/// Returns `true` when the gateway may transparently retry the failed attempt.
	pub fn is_retryable(&self) -> bool {
		self.as_api().is_some_and(|err| err.retryable)
	}

	/// Attaches an equivalent request description to errors that carry one.
	pub(crate) fn with_request(self, request: &RequestSummary) -> Self {
		match self {
			Self::Api(mut err) => {
				err.request = Some(request.clone());

				Self::Api(err)
			},
			Self::Transient(err) => Self::Transient(err.with_request(Box::new(request.clone()))),
			Self::Transport(err) => Self::Transport(err.with_request(Box::new(request.clone()))),
			other => other,
		}
	}
}

impl From<ApiError> for Error {
	fn from(e: ApiError) -> Self {
		Self::Api(Box::new(e))
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot carry endpoint paths.
	#[error("Base URL `{url}` cannot be used as a base for endpoint paths.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// Endpoint path could not be joined onto the base URL.
	#[error("Endpoint path `{path}` is invalid.")]
	InvalidEndpoint {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A capacity rule or the default capacity is zero.
	#[error("Capacity for `{pattern}` must be at least 1.")]
	ZeroCapacity {
		/// Pattern of the offending rule (`*` for the default).
		pattern: String,
	},
	/// A duration setting is zero.
	#[error("The {setting} setting must be greater than zero.")]
	ZeroDuration {
		/// Name of the offending setting.
		setting: &'static str,
	},
	/// The account store has no record for the identity.
	#[error("No account is registered for app `{app_id}`.")]
	UnknownAccount {
		/// Identity that was looked up.
		app_id: String,
	},
	/// A refresh was requested but no refresh token is cached.
	#[error("No refresh token is cached for this app.")]
	MissingRefreshToken,
	/// Token endpoint response omitted the access token.
	#[error("Token endpoint response is missing access_token.")]
	MissingAccessToken,
	/// Token endpoint returned a non-positive lifetime.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Token endpoint returned a lifetime that overflows the supported calendar range.
	#[error("The expires_in value {expires_in} is out of range.")]
	ExpiresInOutOfRange {
		/// Lifetime in seconds as returned by the vendor.
		expires_in: i64,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Unexpected upstream responses that carry no vendor code.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream answered with a non-success HTTP status and an unparseable body.
	#[error("Upstream returned HTTP {status}: {body_preview}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Leading part of the response body.
		body_preview: String,
		/// Equivalent request description.
		request: Option<Box<RequestSummary>>,
	},
	/// Business endpoint responded with a body that is not JSON.
	#[error("Upstream returned a body that is not valid JSON.")]
	MalformedBody {
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
		/// HTTP status code.
		status: u16,
		/// Equivalent request description.
		request: Option<Box<RequestSummary>>,
	},
	/// Token endpoint responded with an envelope that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
}
impl TransientError {
	fn with_request(self, summary: Box<RequestSummary>) -> Self {
		match self {
			Self::UnexpectedStatus { status, body_preview, .. } =>
				Self::UnexpectedStatus { status, body_preview, request: Some(summary) },
			Self::MalformedBody { source, status, .. } =>
				Self::MalformedBody { source, status, request: Some(summary) },
			other => other,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the vendor API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
		/// Equivalent request description.
		request: Option<Box<RequestSummary>>,
	},
	/// The request exceeded the transport timeout.
	#[error("Request timed out while calling the vendor API.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
		/// Equivalent request description.
		request: Option<Box<RequestSummary>>,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the vendor API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src), request: None }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src), request: None }
	}

	/// Returns the attached request description, if any.
	pub fn request(&self) -> Option<&RequestSummary> {
		match self {
			Self::Network { request, .. } | Self::Timeout { request, .. } => request.as_deref(),
			Self::Io(_) => None,
		}
	}

	fn with_request(self, summary: Box<RequestSummary>) -> Self {
		match self {
			Self::Network { source, .. } => Self::Network { source, request: Some(summary) },
			Self::Timeout { source, .. } => Self::Timeout { source, request: Some(summary) },
			other => other,
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}
