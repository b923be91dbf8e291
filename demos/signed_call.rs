//! Demonstrates a signed business call with the default reqwest transport: the gateway
//! authenticates with the app secret, signs the request, and reuses the cached token afterwards.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use openapi_gateway::{
	auth::{Account, AppId},
	config::{ACCESS_TOKEN_PATH, GatewayConfig},
	gateway::{ApiMethod, CallOptions, Gateway},
	store::{AccountStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let auth_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(ACCESS_TOKEN_PATH);
			then.status(200).json_body(json!({
				"code": "200",
				"msg": "OK",
				"data": {
					"access_token": "demo-access",
					"refresh_token": "demo-refresh",
					"expires_in": 7199,
				},
			}));
		})
		.await;
	let orders_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/erp/sc/data/mws/orders")
				.query_param("access_token", "demo-access")
				.query_param_exists("sign");
			then.status(200).json_body(json!({ "code": 0, "msg": "success", "total": 1 }));
		})
		.await;
	let app_id = AppId::new("demo-app-id")?;
	let store = Arc::new(MemoryStore::default());

	store.register(Account::new(app_id.clone(), "demo-app-secret")).await?;

	let config = GatewayConfig::builder(Url::parse(&server.base_url())?).build()?;
	let gateway = Gateway::new(store, config);
	let params = json!({ "sid": 101, "start_date": "2025-01-01", "end_date": "2025-01-31" });
	let params = params.as_object().cloned().unwrap_or_default();

	for _ in 0..2 {
		let body = gateway
			.call(
				&app_id,
				ApiMethod::Post,
				"/erp/sc/data/mws/orders",
				params.clone(),
				CallOptions::default(),
			)
			.await?;

		println!("Vendor answered: {body}.");
	}

	auth_mock.assert_async().await;
	orders_mock.assert_calls_async(2).await;

	Ok(())
}
