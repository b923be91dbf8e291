// self
use crate::{
	_prelude::*,
	http::ApiMethod,
	sign::{ACCESS_TOKEN_PARAM, SIGN_PARAM},
};

const REDACTED: &str = "<redacted>";

/// Equivalent description of a dispatched request, attached to errors for diagnostics.
///
/// The access token and the signature are redacted from the URL at construction time, so the
/// summary is safe to log. [`Display`] renders it as a `curl` command line.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSummary {
	/// Verb.
	pub method: ApiMethod,
	/// Redacted URL including the query string.
	pub url: Url,
	/// JSON body, when one was sent.
	pub body: Option<Value>,
}
impl RequestSummary {
	/// Builds a summary, redacting credential-bearing query parameters.
	pub fn new(method: ApiMethod, url: Url, body: Option<Value>) -> Self {
		Self { method, url: redact(url), body }
	}

	/// Renders the request as a `curl` command line.
	pub fn to_curl(&self) -> String {
		let mut buf = format!("curl -X {} '{}'", self.method, self.url);

		if let Some(body) = &self.body {
			buf.push_str(" -H 'Content-Type: application/json' -d '");
			buf.push_str(&body.to_string().replace('\'', "'\\''"));
			buf.push('\'');
		}

		buf
	}
}
impl Display for RequestSummary {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.to_curl())
	}
}

fn redact(mut url: Url) -> Url {
	if url.query().is_none() {
		return url;
	}

	let pairs = url
		.query_pairs()
		.map(|(key, value)| {
			let value = if key == ACCESS_TOKEN_PARAM || key == SIGN_PARAM {
				REDACTED.to_owned()
			} else {
				value.into_owned()
			};

			(key.into_owned(), value)
		})
		.collect::<Vec<_>>();

	url.query_pairs_mut().clear().extend_pairs(pairs);

	url
}
