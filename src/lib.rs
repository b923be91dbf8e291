//! Resilient gateway client for rate-limited, signed, token-authenticated vendor OpenAPIs.
//!
//! Calls pass through per-(identity, endpoint) admission buckets, resolve credentials with
//! single-flight refresh, get signed with the vendor's MD5 + AES-ECB scheme, and are retried
//! according to a registry of classified vendor codes.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod admission;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod sign;
pub mod store;
pub mod vendor;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{Account, AppId, TokenGrant},
		config::{CapacityTable, GatewayConfig},
		gateway::Gateway,
		http::ReqwestHttpClient,
		store::{AccountStore, MemoryStore},
	};

	/// Gateway type alias used by reqwest-backed integration tests.
	pub type ReqwestTestGateway = crate::gateway::ReqwestGateway;

	/// Builds a configuration pointing at `base_url` with millisecond-scale backoff so retry
	/// tests stay fast.
	pub fn test_config(base_url: &str, capacities: CapacityTable) -> GatewayConfig {
		GatewayConfig::builder(
			Url::parse(base_url).expect("Mock server URL should parse successfully."),
		)
		.capacities(capacities)
		.max_retries(2)
		.local_retry_after(StdDuration::from_millis(10))
		.build()
		.expect("Test gateway configuration should be valid.")
	}

	/// Constructs a [`Gateway`] backed by an in-memory account store seeded with `account`.
	pub fn build_reqwest_test_gateway(
		config: GatewayConfig,
		account: Account,
	) -> (ReqwestTestGateway, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());

		store_backend.insert(account);

		let store: Arc<dyn AccountStore> = store_backend.clone();
		let gateway = Gateway::new(store, config);

		(gateway, store_backend)
	}

	/// Returns a registered account without any cached tokens.
	pub fn fresh_account(app_id: &str, app_secret: &str) -> Account {
		Account::new(
			AppId::new(app_id).expect("App identifier fixture should be valid."),
			app_secret,
		)
	}

	/// Returns an account holding `access`, expiring `remaining` from now (negative means
	/// already expired).
	pub fn seeded_account(
		app_id: &str,
		app_secret: &str,
		access: &str,
		refresh: Option<&str>,
		remaining: Duration,
	) -> Account {
		fresh_account(app_id, app_secret).with_grant(TokenGrant::issued_at(
			access,
			refresh.map(str::to_owned),
			OffsetDateTime::now_utc(),
			remaining,
		))
	}

	/// Builds a successful token endpoint envelope.
	pub fn token_envelope(access: &str, refresh: &str, expires_in: i64) -> Value {
		serde_json::json!({
			"code": "200",
			"msg": "OK",
			"data": {
				"access_token": access,
				"refresh_token": refresh,
				"expires_in": expires_in,
			},
		})
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::{Arc, Weak},
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map, Value};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
