//! Demonstrates how the admission controller bounds concurrent calls per endpoint.
//!
//! 1. Implement [`GatewayHttpClient`] with an in-process transport that answers after a delay.
//! 2. Provide a [`TransportErrorMapper`] for its error type.
//! 3. Fire more concurrent calls than the endpoint capacity allows, with retries disabled, and
//!    watch the surplus fail fast with the local rate-limit error.

// std
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};
// crates.io
use color_eyre::Result;
use serde_json::{Map, json};
use tokio::task::JoinSet;
use url::Url;
// self
use openapi_gateway::{
	auth::{Account, AppId, TokenGrant},
	config::{CapacityRule, CapacityTable, GatewayConfig},
	error::TransportError,
	gateway::{ApiMethod, CallOptions, Gateway},
	http::{GatewayHttpClient, HttpFuture, HttpRequest, HttpResponse, TransportErrorMapper},
	store::MemoryStore,
};

const ENDPOINT: &str = "/erp/sc/routing/storage";

#[derive(Debug)]
struct SimulatedError;
impl Display for SimulatedError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("simulated transport failure")
	}
}
impl std::error::Error for SimulatedError {}

#[derive(Default)]
struct SlowVendor {
	in_flight: AtomicU32,
	peak: AtomicU32,
}
impl GatewayHttpClient for SlowVendor {
	type TransportError = SimulatedError;

	fn execute(&self, _request: HttpRequest) -> HttpFuture<'_, Self::TransportError> {
		Box::pin(async move {
			let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.peak.fetch_max(now, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_millis(50)).await;
			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			let body = serde_json::to_vec(&json!({ "code": 0, "data": [] }))
				.map_err(|_| SimulatedError)?;

			Ok(HttpResponse { status: 200, body })
		})
	}
}

struct SimulatedErrorMapper;
impl TransportErrorMapper<SimulatedError> for SimulatedErrorMapper {
	fn map_transport_error(&self, error: SimulatedError) -> TransportError {
		TransportError::network(error)
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let app_id = AppId::new("demo-pressure")?;
	let store = Arc::new(MemoryStore::default());

	store.insert(Account::new(app_id.clone(), "secret").with_grant(TokenGrant::issued_at(
		"pre-issued",
		None,
		time::OffsetDateTime::now_utc(),
		time::Duration::hours(2),
	)));

	let config = GatewayConfig::builder(Url::parse("https://vendor.invalid/")?)
		.capacities(CapacityTable::new([CapacityRule::new(ENDPOINT, 3)], 1))
		.build()?;
	let vendor = Arc::new(SlowVendor::default());
	let gateway = <Gateway<SlowVendor, SimulatedErrorMapper>>::with_http_client(
		store,
		config,
		Arc::clone(&vendor),
		Arc::new(SimulatedErrorMapper),
	);
	let gateway = Arc::new(gateway);
	let mut calls = JoinSet::new();

	for _ in 0..8 {
		let gateway = Arc::clone(&gateway);
		let app_id = app_id.clone();

		calls.spawn(async move {
			let options = CallOptions::default().max_retries(0);

			gateway.call(&app_id, ApiMethod::Get, ENDPOINT, Map::new(), options).await
		});
	}

	let mut admitted = 0;
	let mut denied = 0;

	while let Some(joined) = calls.join_next().await {
		match joined? {
			Ok(_) => admitted += 1,
			Err(err) if err.as_api().is_some_and(|api| api.is_local_rate_limit()) => denied += 1,
			Err(err) => return Err(err.into()),
		}
	}

	println!(
		"{admitted} calls admitted, {denied} denied locally, peak concurrency {}.",
		vendor.peak.load(Ordering::SeqCst),
	);

	Ok(())
}
