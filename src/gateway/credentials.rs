//! Access-token resolution with single-flight refresh and re-authentication.
//!
//! Resolution is serialized per identity: the first caller that finds the cached token expired
//! performs the exchange while concurrent callers wait on the same guard and then reuse the
//! freshly stored token.

// self
use crate::{
	_prelude::*,
	auth::{Account, AppId, CredentialState, TokenGrant, TokenSecret},
	error::{ConfigError, TransientError},
	gateway::Gateway,
	http::{ApiMethod, GatewayHttpClient, HttpRequest, RequestBody, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	vendor::{SuccessCodes, VendorCode},
};

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
	#[serde(default)]
	code: Option<VendorCode>,
	#[serde(default, alias = "message")]
	msg: Option<String>,
	#[serde(default)]
	data: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

impl<C, M> Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a usable access token for `app_id`, refreshing or re-authenticating as needed.
	pub async fn access_token(&self, app_id: &AppId) -> Result<TokenSecret> {
		let guard = self.flow_guard(app_id);
		let _singleflight = guard.lock().await;
		let account = self.load_account(app_id).await?;
		let now = OffsetDateTime::now_utc();

		if let Some(token) = account.usable_access_token(now) {
			return Ok(token.clone());
		}
		if let CredentialState::Expired { refreshable: true } = account.state_at(now) {
			match self.refresh_locked(&account).await {
				Ok(refreshed) => return Self::issued_token(refreshed),
				Err(err) => {
					crate::obs_event!(
						warn,
						app_id = %app_id,
						error = %err,
						"Refresh failed; falling back to full authentication."
					);

					if err.as_api().is_some_and(|api| api.refresh_token_invalid) {
						self.store.clear_tokens(app_id, account.access_token.as_ref()).await?;
					}
				},
			}
		}

		let account = self.authenticate_locked(&account).await.map_err(|source| {
			Error::Authentication { app_id: app_id.to_string(), source: Box::new(source) }
		})?;

		Self::issued_token(account)
	}

	/// Exchanges the app secret for a fresh token pair and stores it.
	pub async fn authenticate(&self, app_id: &AppId) -> Result<Account> {
		let guard = self.flow_guard(app_id);
		let _singleflight = guard.lock().await;
		let account = self.load_account(app_id).await?;

		self.authenticate_locked(&account).await
	}

	/// Exchanges the cached refresh token for a new access token and stores it.
	pub async fn refresh(&self, app_id: &AppId) -> Result<Account> {
		let guard = self.flow_guard(app_id);
		let _singleflight = guard.lock().await;
		let account = self.load_account(app_id).await?;

		self.refresh_locked(&account).await
	}

	async fn load_account(&self, app_id: &AppId) -> Result<Account> {
		self.store
			.fetch(app_id)
			.await?
			.ok_or_else(|| ConfigError::UnknownAccount { app_id: app_id.to_string() }.into())
	}

	async fn authenticate_locked(&self, account: &Account) -> Result<Account> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let span = FlowSpan::new(KIND, "authenticate", &account.app_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.credential_metrics.record_authentication_attempt();

		let result = span
			.instrument(async {
				let form = vec![
					("appId".to_owned(), account.app_id.to_string()),
					("appSecret".to_owned(), account.app_secret.expose().to_owned()),
				];
				let grant = self.request_grant(&self.config.access_token_path, form).await?;

				self.persist_grant(&account.app_id, grant).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => {
				self.credential_metrics.record_authentication_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn refresh_locked(&self, account: &Account) -> Result<Account> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh", &account.app_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.credential_metrics.record_refresh_attempt();

		let result = span
			.instrument(async {
				let refresh_token = account
					.refresh_token
					.as_ref()
					.ok_or(ConfigError::MissingRefreshToken)?;
				let form = vec![
					("appId".to_owned(), account.app_id.to_string()),
					("refreshToken".to_owned(), refresh_token.expose().to_owned()),
				];
				let mut grant = self.request_grant(&self.config.refresh_token_path, form).await?;

				if grant.refresh_token.is_none() {
					grant.refresh_token = Some(refresh_token.clone());
				}

				self.persist_grant(&account.app_id, grant).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => {
				self.credential_metrics.record_refresh_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn persist_grant(&self, app_id: &AppId, grant: TokenGrant) -> Result<Account> {
		self.store
			.save_tokens(app_id, grant)
			.await?
			.ok_or_else(|| ConfigError::UnknownAccount { app_id: app_id.to_string() }.into())
	}

	async fn request_grant(&self, path: &str, form: Vec<(String, String)>) -> Result<TokenGrant> {
		let request = HttpRequest {
			method: ApiMethod::Post,
			url: self.config.endpoint_url(path)?,
			body: RequestBody::Form(form),
		};
		let response = self
			.http_client
			.execute(request)
			.await
			.map_err(|err| self.transport_mapper.map_transport_error(err))?;
		let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
		let envelope: TokenEnvelope = match serde_path_to_error::deserialize(&mut deserializer) {
			Ok(envelope) => envelope,
			Err(_) if !response.is_success() =>
				return Err(TransientError::UnexpectedStatus {
					status: response.status,
					body_preview: response.body_preview(256),
					request: None,
				}
				.into()),
			Err(source) =>
				return Err(TransientError::TokenResponseParse { source, status: response.status }
					.into()),
		};

		match envelope.code {
			Some(code) if !SuccessCodes::default().contains(&code) =>
				return Err(self.registry.classify(code, envelope.msg).into()),
			_ => {},
		}

		let payload = envelope.data.ok_or(ConfigError::MissingAccessToken)?;
		let access_token = payload
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(ConfigError::MissingAccessToken)?;
		let lifetime = match payload.expires_in {
			Some(secs) if secs <= 0 => return Err(ConfigError::NonPositiveExpiresIn.into()),
			Some(secs) => Duration::seconds(secs),
			None => self.config.default_token_lifetime,
		};
		let refresh_token = payload.refresh_token.filter(|token| !token.is_empty());
		let issued_at = OffsetDateTime::now_utc();

		if issued_at.checked_add(lifetime).is_none() {
			return Err(ConfigError::ExpiresInOutOfRange { expires_in: lifetime.whole_seconds() }
				.into());
		}

		Ok(TokenGrant::issued_at(access_token, refresh_token, issued_at, lifetime))
	}

	fn issued_token(account: Account) -> Result<TokenSecret> {
		account.access_token.ok_or_else(|| ConfigError::MissingAccessToken.into())
	}
}
