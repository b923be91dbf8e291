//! Simple file-backed [`AccountStore`] so cached tokens survive process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Account, AppId, TokenGrant, TokenSecret},
	store::{AccountStore, AccountUpdate, CompareAndSwapOutcome, StoreError, StoreFuture},
};

/// Persists credential records to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<AppId, Account>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<AppId, Account>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		let accounts: Vec<Account> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(accounts.into_iter().map(|account| (account.app_id.clone(), account)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<AppId, Account>) -> Result<(), StoreError> {
		let mut snapshot = contents.values().collect::<Vec<_>>();

		snapshot.sort_by(|a, b| a.app_id.cmp(&b.app_id));

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn update(
		&self,
		app_id: &AppId,
		update: AccountUpdate,
	) -> Result<Option<(CompareAndSwapOutcome, Account)>, StoreError> {
		let mut guard = self.inner.write();
		let Some(account) = guard.get_mut(app_id) else {
			return Ok(None);
		};
		let outcome = update.apply(account);
		let updated = account.clone();

		if outcome == CompareAndSwapOutcome::Updated {
			self.persist_locked(&guard)?;
		}

		Ok(Some((outcome, updated)))
	}

	fn swap(
		&self,
		app_id: &AppId,
		update: AccountUpdate,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let outcome = self.update(app_id, update)?;

		Ok(outcome.map_or(CompareAndSwapOutcome::Missing, |(outcome, _)| outcome))
	}
}
impl AccountStore for FileStore {
	fn fetch<'a>(&'a self, app_id: &'a AppId) -> StoreFuture<'a, Option<Account>> {
		Box::pin(async move { Ok(self.inner.read().get(app_id).cloned()) })
	}

	fn register(&self, account: Account) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.insert(account.app_id.clone(), account);
			self.persist_locked(&guard)
		})
	}

	fn save_tokens<'a>(
		&'a self,
		app_id: &'a AppId,
		grant: TokenGrant,
	) -> StoreFuture<'a, Option<Account>> {
		Box::pin(async move {
			Ok(self.update(app_id, AccountUpdate::Grant(grant))?.map(|(_, account)| account))
		})
	}

	fn invalidate_access_token<'a>(
		&'a self,
		app_id: &'a AppId,
		expected_access: &'a TokenSecret,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { self.swap(app_id, AccountUpdate::invalidate_access(expected_access)) })
	}

	fn clear_tokens<'a>(
		&'a self,
		app_id: &'a AppId,
		expected_access: Option<&'a TokenSecret>,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { self.swap(app_id, AccountUpdate::clear(expected_access)) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::auth::TokenSecret;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"openapi_gateway_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn app_id() -> AppId {
		AppId::new("ak_file_store").expect("App identifier fixture should be valid.")
	}

	#[test]
	fn tokens_survive_reopen() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let app_id = app_id();

		rt.block_on(store.register(Account::new(app_id.clone(), "secret")))
			.expect("Failed to register fixture account.");
		rt.block_on(store.save_tokens(
			&app_id,
			TokenGrant::issued_at(
				"access-token",
				Some("refresh-token".into()),
				OffsetDateTime::now_utc(),
				Duration::hours(1),
			),
		))
		.expect("Failed to save tokens.")
		.expect("Registered account should be updated.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.fetch(&app_id))
			.expect("Failed to fetch fixture account from file store.")
			.expect("File store lost account after reopen.");

		assert_eq!(fetched.access_token.as_ref().map(TokenSecret::expose), Some("access-token"));
		assert_eq!(fetched.app_secret.expose(), "secret");

		let stale = TokenSecret::new("stale-token");

		assert_eq!(
			rt.block_on(reopened.clear_tokens(&app_id, Some(&stale)))
				.expect("Guarded clear should not fail."),
			CompareAndSwapOutcome::TokenMismatch
		);
		assert_eq!(
			rt.block_on(reopened.clear_tokens(&app_id, fetched.access_token.as_ref()))
				.expect("Failed to clear tokens."),
			CompareAndSwapOutcome::Updated
		);

		drop(reopened);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let cleared = rt
			.block_on(reopened.fetch(&app_id))
			.expect("Failed to fetch cleared account.")
			.expect("File store lost account after clearing.");

		assert!(cleared.refresh_token.is_none());
		assert!(cleared.access_token.is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn updates_to_unknown_identities_are_ignored() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		assert_eq!(
			rt.block_on(store.invalidate_access_token(&app_id(), &TokenSecret::new("any")))
				.expect("Invalidation should not fail."),
			CompareAndSwapOutcome::Missing
		);
		assert!(!path.exists());
	}
}
