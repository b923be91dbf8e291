//! Transport seam between the gateway and an HTTP stack.
//!
//! The gateway only needs to send one request and read back the status and raw body, so the
//! contract is a single [`GatewayHttpClient::execute`] call. Transport-specific failures are
//! normalized into [`TransportError`] by a [`TransportErrorMapper`], which keeps custom stacks
//! pluggable without teaching the gateway about their error types.

// self
use crate::{_prelude::*, error::TransportError};

/// HTTP verbs the vendor API accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
	/// `GET`; every parameter travels in the query string.
	Get,
	/// `POST`; business parameters travel as a JSON body.
	Post,
	/// `PUT`; business parameters travel as a JSON body.
	Put,
	/// `DELETE`; business parameters travel as a JSON body.
	Delete,
}
impl ApiMethod {
	/// Returns the uppercase verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
		}
	}

	/// Returns `true` when business parameters are sent as a JSON body.
	pub const fn has_body(self) -> bool {
		!matches!(self, Self::Get)
	}
}
impl Display for ApiMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Request payload variants.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
	/// No body.
	Empty,
	/// `application/x-www-form-urlencoded` pairs (token endpoints).
	Form(Vec<(String, String)>),
	/// JSON document (business calls).
	Json(Value),
}

/// Fully prepared request handed to the transport.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// Verb.
	pub method: ApiMethod,
	/// Absolute URL including the query string.
	pub url: Url,
	/// Payload.
	pub body: RequestBody,
}

/// Raw response returned by the transport.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Undecoded body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Lossy UTF-8 preview of the body, capped at `max` characters.
	pub fn body_preview(&self, max: usize) -> String {
		String::from_utf8_lossy(&self.body).chars().take(max).collect()
	}
}

/// Boxed future returned by [`GatewayHttpClient::execute`].
pub type HttpFuture<'a, E> = Pin<Box<dyn Future<Output = Result<HttpResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP transports able to execute gateway requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back many gateways,
/// and the returned futures must be `Send` so calls can hop executors.
pub trait GatewayHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` and resolves with the raw response, whatever its status.
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_, Self::TransportError>;
}

/// Maps transport-specific failures into [`TransportError`].
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
{
	/// Converts `error` into the gateway's transport error.
	fn map_transport_error(&self, error: E) -> TransportError;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with a whole-request timeout.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, crate::error::ConfigError> {
		Ok(Self(ReqwestClient::builder().timeout(timeout).build()?))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl GatewayHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestError;

	fn execute(&self, request: HttpRequest) -> HttpFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				ApiMethod::Get => reqwest::Method::GET,
				ApiMethod::Post => reqwest::Method::POST,
				ApiMethod::Put => reqwest::Method::PUT,
				ApiMethod::Delete => reqwest::Method::DELETE,
			};
			let builder = client.request(method, request.url);
			let builder = match request.body {
				RequestBody::Empty => builder,
				RequestBody::Form(pairs) => builder.form(&pairs),
				RequestBody::Json(value) => builder.json(&value),
			};
			let response = builder.send().await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, body })
		})
	}
}

/// Default mapper for reqwest failures; timeouts are kept distinct from other network errors.
#[cfg(feature = "reqwest")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(&self, error: ReqwestError) -> TransportError {
		TransportError::from(error)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn only_get_travels_without_a_body() {
		assert!(!ApiMethod::Get.has_body());
		assert!(ApiMethod::Post.has_body());
		assert!(ApiMethod::Delete.has_body());
		assert_eq!(ApiMethod::Put.to_string(), "PUT");
	}

	#[test]
	fn response_preview_is_bounded() {
		let response = HttpResponse { status: 502, body: b"<html>bad gateway</html>".to_vec() };

		assert!(!response.is_success());
		assert_eq!(response.body_preview(6), "<html>");
	}
}
