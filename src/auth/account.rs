//! Credential records, token grants, and the lifecycle state derived from them.

// self
use crate::{_prelude::*, auth::AppId};

/// Redacting wrapper for app secrets and bearer tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Where a credential record stands relative to a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialState {
	/// Access token present and strictly before its expiry.
	Valid,
	/// Access token present but expired (or missing its expiry).
	Expired {
		/// A refresh token is available to renew the access token.
		refreshable: bool,
	},
	/// No access token is cached.
	Absent,
}

/// Tokens issued by the vendor auth endpoints, ready to overwrite a credential record.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Bearer token attached to business calls.
	pub access_token: TokenSecret,
	/// Refresh token, when the vendor issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the access token stops being usable.
	pub expires_at: OffsetDateTime,
}
impl TokenGrant {
	/// Builds a grant that expires `lifetime` after `issued_at`.
	///
	/// The expiry saturates at the calendar bounds; vendor-supplied lifetimes are range-checked
	/// before they get here.
	pub fn issued_at(
		access_token: impl Into<String>,
		refresh_token: Option<String>,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: refresh_token.map(TokenSecret::new),
			expires_at: issued_at.saturating_add(lifetime),
		}
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Persisted credential record for one identity.
///
/// Records are registered out-of-band and only mutated by the gateway: overwritten after every
/// successful token fetch or refresh, and cleared when the vendor rejects the refresh token.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
	/// Vendor application id.
	pub app_id: AppId,
	/// Long-lived application secret used for full authentication.
	pub app_secret: TokenSecret,
	/// Cached access token, if any.
	pub access_token: Option<TokenSecret>,
	/// Cached refresh token, if any.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry of the cached access token.
	pub expires_at: Option<OffsetDateTime>,
}
impl Account {
	/// Registers an identity without cached tokens.
	pub fn new(app_id: AppId, app_secret: impl Into<String>) -> Self {
		Self {
			app_id,
			app_secret: TokenSecret::new(app_secret),
			access_token: None,
			refresh_token: None,
			expires_at: None,
		}
	}

	/// Returns the record with the provided grant applied.
	pub fn with_grant(mut self, grant: TokenGrant) -> Self {
		self.apply_grant(grant);

		self
	}

	/// Computes the credential state at a given instant.
	pub fn state_at(&self, instant: OffsetDateTime) -> CredentialState {
		if self.access_token.is_none() {
			return CredentialState::Absent;
		}

		match self.expires_at {
			Some(expires_at) if instant < expires_at => CredentialState::Valid,
			_ => CredentialState::Expired { refreshable: self.refresh_token.is_some() },
		}
	}

	/// Convenience helper that checks the state using the current UTC instant.
	pub fn state(&self) -> CredentialState {
		self.state_at(OffsetDateTime::now_utc())
	}

	/// Returns the access token only while it is usable at `instant`.
	pub fn usable_access_token(&self, instant: OffsetDateTime) -> Option<&TokenSecret> {
		match self.state_at(instant) {
			CredentialState::Valid => self.access_token.as_ref(),
			_ => None,
		}
	}

	/// Overwrites access token, refresh token, and expiry with a freshly issued grant.
	pub fn apply_grant(&mut self, grant: TokenGrant) {
		self.access_token = Some(grant.access_token);
		self.refresh_token = grant.refresh_token;
		self.expires_at = Some(grant.expires_at);
	}

	/// Drops the cached access token and its expiry, keeping the refresh token.
	pub fn invalidate_access_token(&mut self) {
		self.access_token = None;
		self.expires_at = None;
	}

	/// Clears every cached token so the next call re-authenticates from the app secret.
	pub fn clear_tokens(&mut self) {
		self.access_token = None;
		self.refresh_token = None;
		self.expires_at = None;
	}
}
impl Debug for Account {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Account")
			.field("app_id", &self.app_id)
			.field("app_secret", &"<redacted>")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn account() -> Account {
		Account::new(AppId::new("ak_account").expect("App identifier fixture should be valid."), "s")
	}

	#[test]
	fn state_transitions_cover_all_branches() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let mut record = account();

		assert_eq!(record.state_at(issued), CredentialState::Absent);

		record.apply_grant(TokenGrant::issued_at(
			"access",
			Some("refresh".into()),
			issued,
			Duration::hours(2),
		));

		assert_eq!(record.state_at(macros::datetime!(2025-01-01 01:59 UTC)), CredentialState::Valid);
		assert_eq!(
			record.state_at(macros::datetime!(2025-01-01 02:00 UTC)),
			CredentialState::Expired { refreshable: true }
		);

		record.refresh_token = None;

		assert_eq!(
			record.state_at(macros::datetime!(2025-01-01 03:00 UTC)),
			CredentialState::Expired { refreshable: false }
		);
	}

	#[test]
	fn token_without_expiry_is_never_valid() {
		let mut record = account();

		record.access_token = Some(TokenSecret::new("orphan"));

		assert_eq!(record.state(), CredentialState::Expired { refreshable: false });
		assert!(record.usable_access_token(OffsetDateTime::now_utc()).is_none());
	}

	#[test]
	fn invalidate_keeps_refresh_but_clear_drops_everything() {
		let now = OffsetDateTime::now_utc();
		let mut record = account().with_grant(TokenGrant::issued_at(
			"access",
			Some("refresh".into()),
			now,
			Duration::seconds(7199),
		));

		assert_eq!(record.usable_access_token(now).map(TokenSecret::expose), Some("access"));

		record.invalidate_access_token();

		assert!(record.access_token.is_none());
		assert!(record.expires_at.is_none());
		assert!(record.refresh_token.is_some());

		record.clear_tokens();

		assert!(record.refresh_token.is_none());
		assert_eq!(record.state_at(now), CredentialState::Absent);
	}

	#[test]
	fn oversized_lifetime_saturates_instead_of_overflowing() {
		let grant = TokenGrant::issued_at(
			"access",
			None,
			OffsetDateTime::now_utc(),
			Duration::seconds(1_000_000_000_000),
		);

		assert!(grant.expires_at.year() >= 9999);
	}

	#[test]
	fn formatters_redact_secrets() {
		let record = account().with_grant(TokenGrant::issued_at(
			"top-secret-access",
			None,
			OffsetDateTime::now_utc(),
			Duration::minutes(5),
		));
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("top-secret-access"));
		assert_eq!(format!("{}", record.app_secret), "<redacted>");
	}
}
