//! Thread-safe in-memory [`AccountStore`] implementation for single-process deployments and
//! tests.

// self
use crate::{
	_prelude::*,
	auth::{Account, AppId, TokenGrant, TokenSecret},
	store::{AccountStore, AccountUpdate, CompareAndSwapOutcome, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<AppId, Account>>>;

/// Thread-safe storage backend that keeps records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Registers (or replaces) a record synchronously; handy when seeding a store.
	pub fn insert(&self, account: Account) {
		self.0.write().insert(account.app_id.clone(), account);
	}

	/// Returns a synchronous copy of the record for `app_id`.
	pub fn get(&self, app_id: &AppId) -> Option<Account> {
		self.0.read().get(app_id).cloned()
	}

	fn update_now(
		map: StoreMap,
		app_id: AppId,
		update: AccountUpdate,
	) -> Option<(CompareAndSwapOutcome, Account)> {
		let mut guard = map.write();
		let account = guard.get_mut(&app_id)?;
		let outcome = update.apply(account);

		Some((outcome, account.clone()))
	}

	fn swap_now(map: StoreMap, app_id: AppId, update: AccountUpdate) -> CompareAndSwapOutcome {
		Self::update_now(map, app_id, update)
			.map_or(CompareAndSwapOutcome::Missing, |(outcome, _)| outcome)
	}
}
impl AccountStore for MemoryStore {
	fn fetch<'a>(&'a self, app_id: &'a AppId) -> StoreFuture<'a, Option<Account>> {
		let map = self.0.clone();
		let app_id = app_id.to_owned();

		Box::pin(async move { Ok(map.read().get(&app_id).cloned()) })
	}

	fn register(&self, account: Account) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(account.app_id.clone(), account);

			Ok(())
		})
	}

	fn save_tokens<'a>(
		&'a self,
		app_id: &'a AppId,
		grant: TokenGrant,
	) -> StoreFuture<'a, Option<Account>> {
		let map = self.0.clone();
		let app_id = app_id.to_owned();

		Box::pin(async move {
			Ok(Self::update_now(map, app_id, AccountUpdate::Grant(grant)).map(|(_, account)| account))
		})
	}

	fn invalidate_access_token<'a>(
		&'a self,
		app_id: &'a AppId,
		expected_access: &'a TokenSecret,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let map = self.0.clone();
		let app_id = app_id.to_owned();
		let update = AccountUpdate::invalidate_access(expected_access);

		Box::pin(async move { Ok(Self::swap_now(map, app_id, update)) })
	}

	fn clear_tokens<'a>(
		&'a self,
		app_id: &'a AppId,
		expected_access: Option<&'a TokenSecret>,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let map = self.0.clone();
		let app_id = app_id.to_owned();
		let update = AccountUpdate::clear(expected_access);

		Box::pin(async move { Ok(Self::swap_now(map, app_id, update)) })
	}
}
