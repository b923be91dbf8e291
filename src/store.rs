//! Storage contracts and built-in store implementations for identity credential records.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Account, AppId, TokenGrant, TokenSecret},
};

/// Boxed future returned by every [`AccountStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for per-identity credential records.
///
/// Mutations that target an unregistered identity resolve to `Ok(None)` (or
/// [`CompareAndSwapOutcome::Missing`]) and leave the store untouched; registration always happens
/// out-of-band through [`AccountStore::register`].
pub trait AccountStore
where
	Self: Send + Sync,
{
	/// Fetches the record registered for `app_id`, if present.
	fn fetch<'a>(&'a self, app_id: &'a AppId) -> StoreFuture<'a, Option<Account>>;

	/// Inserts or replaces a full record.
	fn register(&self, account: Account) -> StoreFuture<'_, ()>;

	/// Overwrites the cached tokens with a freshly issued grant and returns the updated record.
	fn save_tokens<'a>(
		&'a self,
		app_id: &'a AppId,
		grant: TokenGrant,
	) -> StoreFuture<'a, Option<Account>>;

	/// Drops the access token and its expiry, keeping the refresh token, but only while the
	/// cached access token still equals `expected_access`.
	fn invalidate_access_token<'a>(
		&'a self,
		app_id: &'a AppId,
		expected_access: &'a TokenSecret,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Drops every cached token, keeping only the app secret, but only while the cached access
	/// token still equals `expected_access` (`None` expects no cached access token).
	fn clear_tokens<'a>(
		&'a self,
		app_id: &'a AppId,
		expected_access: Option<&'a TokenSecret>,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;
}

/// Result of a guarded token mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The cached access token matched and the record was updated.
	Updated,
	/// The record exists but its access token changed since the caller read it.
	TokenMismatch,
	/// No record is registered for the identity.
	Missing,
}

/// Error type produced by [`AccountStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Mutation applied to a stored record.
#[derive(Clone, Debug)]
pub(crate) enum AccountUpdate {
	Grant(TokenGrant),
	InvalidateAccess { expected: TokenSecret },
	Clear { expected: Option<TokenSecret> },
}
impl AccountUpdate {
	pub(crate) fn invalidate_access(expected: &TokenSecret) -> Self {
		Self::InvalidateAccess { expected: expected.clone() }
	}

	pub(crate) fn clear(expected: Option<&TokenSecret>) -> Self {
		Self::Clear { expected: expected.cloned() }
	}

	/// Applies the mutation; guarded variants leave the record untouched on a token mismatch.
	pub(crate) fn apply(self, account: &mut Account) -> CompareAndSwapOutcome {
		match self {
			Self::Grant(grant) => account.apply_grant(grant),
			Self::InvalidateAccess { expected } => {
				if account.access_token.as_ref() != Some(&expected) {
					return CompareAndSwapOutcome::TokenMismatch;
				}

				account.invalidate_access_token();
			},
			Self::Clear { expected } => {
				if account.access_token != expected {
					return CompareAndSwapOutcome::TokenMismatch;
				}

				account.clear_tokens();
			},
		}

		CompareAndSwapOutcome::Updated
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let gateway_error: Error = store_error.clone().into();

		assert!(matches!(gateway_error, Error::Storage(_)));
		assert!(gateway_error.to_string().contains("database unreachable"));

		let source = StdError::source(&gateway_error)
			.expect("Gateway error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn updates_mutate_only_their_fields() {
		let app_id = AppId::new("ak_update").expect("App identifier fixture should be valid.");
		let mut account = Account::new(app_id, "secret");

		AccountUpdate::Grant(TokenGrant::issued_at(
			"access",
			Some("refresh".into()),
			OffsetDateTime::now_utc(),
			Duration::hours(1),
		))
		.apply(&mut account);

		assert_eq!(account.access_token.as_ref().map(TokenSecret::expose), Some("access"));
		assert_eq!(
			AccountUpdate::invalidate_access(&TokenSecret::new("access")).apply(&mut account),
			CompareAndSwapOutcome::Updated
		);
		assert!(account.access_token.is_none());
		assert_eq!(account.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert_eq!(AccountUpdate::clear(None).apply(&mut account), CompareAndSwapOutcome::Updated);
		assert!(account.refresh_token.is_none());
		assert_eq!(account.app_secret.expose(), "secret");
	}

	#[test]
	fn guarded_updates_skip_records_holding_a_newer_token() {
		let app_id = AppId::new("ak_guarded").expect("App identifier fixture should be valid.");
		let mut account = Account::new(app_id, "secret").with_grant(TokenGrant::issued_at(
			"fresh",
			Some("refresh".into()),
			OffsetDateTime::now_utc(),
			Duration::hours(1),
		));
		let stale = TokenSecret::new("stale");

		assert_eq!(
			AccountUpdate::invalidate_access(&stale).apply(&mut account),
			CompareAndSwapOutcome::TokenMismatch
		);
		assert_eq!(
			AccountUpdate::clear(Some(&stale)).apply(&mut account),
			CompareAndSwapOutcome::TokenMismatch
		);
		assert_eq!(account.access_token.as_ref().map(TokenSecret::expose), Some("fresh"));
		assert_eq!(account.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
	}
}
