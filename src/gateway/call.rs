//! Business calls: the retry loop and the single-attempt pipeline it drives.

// self
use crate::{
	_prelude::*,
	admission::AdmissionPermit,
	auth::{AppId, TokenSecret},
	error::TransientError,
	gateway::{Gateway, RequestSummary},
	http::{
		ApiMethod, GatewayHttpClient, HttpRequest, HttpResponse, RequestBody, TransportErrorMapper,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	sign::{self, ACCESS_TOKEN_PARAM, APP_KEY_PARAM, Params, SIGN_PARAM, TIMESTAMP_PARAM},
	vendor::{ApiError, SuccessCodes, VendorCode},
};

const COMMON_PARAMS: [&str; 3] = [ACCESS_TOKEN_PARAM, APP_KEY_PARAM, TIMESTAMP_PARAM];
const BODY_PREVIEW_CHARS: usize = 256;

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
	/// Retries allowed after the first attempt; falls back to the gateway configuration.
	pub max_retries: Option<u32>,
	/// Vendor codes treated as success.
	pub success_codes: SuccessCodes,
	/// Bypasses the admission controller entirely.
	pub skip_rate_limit: bool,
}
impl CallOptions {
	/// Overrides the retry ceiling for this call.
	pub fn max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = Some(max_retries);

		self
	}

	/// Replaces the success code set.
	pub fn success_codes(mut self, success_codes: SuccessCodes) -> Self {
		self.success_codes = success_codes;

		self
	}

	/// Skips local admission for this call.
	pub fn skip_rate_limit(mut self) -> Self {
		self.skip_rate_limit = true;

		self
	}
}

impl<C, M> Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Sends a signed business call and returns the decoded response envelope.
	///
	/// Classified retryable failures are retried up to the configured ceiling, so one call makes
	/// at most `max_retries + 1` attempts. Each attempt takes its own admission grant, resolves
	/// credentials, and signs with a fresh timestamp. Anything else propagates immediately.
	pub async fn call(
		&self,
		app_id: &AppId,
		method: ApiMethod,
		path: &str,
		params: Params,
		options: CallOptions,
	) -> Result<Value> {
		const KIND: FlowKind = FlowKind::Call;

		let span = FlowSpan::new(KIND, "call", app_id);
		let max_retries = options.max_retries.unwrap_or(self.config.max_retries);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let mut attempt = 0_u32;

				loop {
					let mut used_token = None;

					span.record_attempt(attempt);

					let outcome =
						self.attempt(app_id, method, path, &params, &options, &mut used_token).await;

					match outcome {
						Err(Error::Api(err)) if err.retryable && attempt < max_retries => {
							obs::record_flow_outcome(KIND, FlowOutcome::Retry);
							crate::obs_event!(
								debug,
								app_id = %app_id,
								path,
								attempt,
								code = %err.code,
								"Retrying classified failure."
							);

							self.prepare_retry(app_id, &err, used_token.as_ref()).await?;

							attempt += 1;
						},
						outcome => return outcome,
					}
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	// Token mutations are compare-and-swap on the token the failed attempt sent, so a token
	// stored meanwhile by a concurrent call survives.
	async fn prepare_retry(
		&self,
		app_id: &AppId,
		err: &ApiError,
		used_token: Option<&TokenSecret>,
	) -> Result<()> {
		match used_token {
			Some(token) if err.refresh_token_invalid => {
				self.store.clear_tokens(app_id, Some(token)).await?;
			},
			Some(token) if err.refresh_token => {
				self.store.invalidate_access_token(app_id, token).await?;
			},
			_ => {},
		}
		if let Some(wait) = err.retry_after.filter(|_| err.is_local_rate_limit()) {
			tokio::time::sleep(wait).await;
		}

		Ok(())
	}

	async fn attempt(
		&self,
		app_id: &AppId,
		method: ApiMethod,
		path: &str,
		params: &Params,
		options: &CallOptions,
		used_token: &mut Option<TokenSecret>,
	) -> Result<Value> {
		let _permit = self.admit(app_id, path, options)?;
		let access_token = used_token.insert(self.access_token(app_id).await?);
		let mut signed = params.clone();

		signed.remove(SIGN_PARAM);
		sign::merge_common(&mut signed, app_id, sign::unix_timestamp());
		signed.insert(ACCESS_TOKEN_PARAM.to_owned(), access_token.expose().into());

		let signature = sign::sign(app_id, &signed)?;
		let request = self.build_request(method, path, &signed, &signature)?;
		let body = match &request.body {
			RequestBody::Json(value) => Some(value.clone()),
			_ => None,
		};
		let summary = RequestSummary::new(method, request.url.clone(), body);
		let response = self.http_client.execute(request).await.map_err(|err| {
			Error::from(self.transport_mapper.map_transport_error(err)).with_request(&summary)
		})?;

		self.classify(response, &options.success_codes).map_err(|err| err.with_request(&summary))
	}

	fn admit(
		&self,
		app_id: &AppId,
		path: &str,
		options: &CallOptions,
	) -> Result<Option<AdmissionPermit>> {
		if options.skip_rate_limit {
			return Ok(None);
		}

		match self.admission.try_admit(app_id, path) {
			Some(permit) => Ok(Some(permit)),
			None => Err(ApiError::local_rate_limited(self.config.local_retry_after).into()),
		}
	}

	fn build_request(
		&self,
		method: ApiMethod,
		path: &str,
		signed: &Params,
		signature: &str,
	) -> Result<HttpRequest> {
		let mut url = self.config.endpoint_url(path)?;
		let mut query = Vec::new();
		let mut business = Params::new();

		for (key, value) in signed.iter().collect::<BTreeMap<_, _>>() {
			if method.has_body() && !COMMON_PARAMS.contains(&key.as_str()) {
				business.insert(key.clone(), value.clone());
			} else {
				query.push(format!(
					"{}={}",
					urlencoding::encode(key),
					urlencoding::encode(&sign::value_text(value))
				));
			}
		}

		// The signature is already percent-encoded.
		query.push(format!("{SIGN_PARAM}={signature}"));
		url.set_query(Some(&query.join("&")));

		let body = if method.has_body() {
			RequestBody::Json(Value::Object(business))
		} else {
			RequestBody::Empty
		};

		Ok(HttpRequest { method, url, body })
	}

	fn classify(&self, response: HttpResponse, success_codes: &SuccessCodes) -> Result<Value> {
		let body = match serde_json::from_slice::<Value>(&response.body) {
			Ok(body) => body,
			Err(source) if response.is_success() =>
				return Err(TransientError::MalformedBody {
					source,
					status: response.status,
					request: None,
				}
				.into()),
			Err(_) =>
				return Err(TransientError::UnexpectedStatus {
					status: response.status,
					body_preview: response.body_preview(BODY_PREVIEW_CHARS),
					request: None,
				}
				.into()),
		};

		match VendorCode::from_envelope(&body) {
			Some(code) if success_codes.contains(&code) => Ok(body),
			Some(code) => {
				let vendor_message = body
					.get("msg")
					.or_else(|| body.get("message"))
					.and_then(Value::as_str)
					.map(str::to_owned);

				Err(self.registry.classify(code, vendor_message).with_response(body).into())
			},
			None if response.is_success() => Ok(body),
			None => Err(TransientError::UnexpectedStatus {
				status: response.status,
				body_preview: response.body_preview(BODY_PREVIEW_CHARS),
				request: None,
			}
			.into()),
		}
	}
}
