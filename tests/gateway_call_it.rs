#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use openapi_gateway::{
	_preludet::*,
	auth::{Account, AppId},
	config::{ACCESS_TOKEN_PATH, CapacityRule, CapacityTable},
	error::TransientError,
	gateway::{ApiMethod, CallOptions},
	sign::{self, Params},
	vendor::{ErrorOrigin, LOCAL_RATE_LIMIT_CODE, SuccessCodes},
};

const APP_ID: &str = "ABCDEFGHIJKLMNOP";
const APP_SECRET: &str = "secret-call";

fn app_id() -> AppId {
	AppId::new(APP_ID).expect("App identifier fixture should be valid.")
}

fn params(value: Value) -> Params {
	match value {
		Value::Object(map) => map,
		other => panic!("Parameter fixture must be an object, got {other}."),
	}
}

fn valid_account() -> Account {
	seeded_account(APP_ID, APP_SECRET, "tok", Some("refresh"), Duration::hours(1))
}

fn capacities() -> CapacityTable {
	CapacityTable::new([CapacityRule::new("/erp/single", 1)], 5)
}

#[tokio::test]
async fn get_sends_every_parameter_with_a_valid_signature() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let expected = params(json!({
		"foo": "bar",
		"baz": [1, 2],
		"timestamp": 1_700_000_000,
		"app_key": APP_ID,
		"access_token": "tok",
	}));
	let expected_sign = sign::encrypt_digest(
		APP_ID,
		&sign::digest(&sign::canonical_string(&expected)),
	)
	.expect("Expected signature should compute.");

	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/erp/list")
				.query_param("foo", "bar")
				.query_param("baz", "[1,2]")
				.query_param("app_key", APP_ID)
				.query_param("access_token", "tok")
				.query_param("timestamp", "1700000000")
				.query_param("sign", expected_sign.as_str());
			then.status(200).json_body(json!({ "code": 0, "msg": "success", "data": [1] }));
		})
		.await;
	let body = gateway
		.call(
			&app_id(),
			ApiMethod::Get,
			"/erp/list",
			params(json!({ "foo": "bar", "baz": [1, 2], "timestamp": 1_700_000_000 })),
			CallOptions::default(),
		)
		.await
		.expect("Signed GET should succeed.");

	mock.assert_async().await;

	assert_eq!(body["data"], json!([1]));
	assert_eq!(gateway.admission.snapshot(&app_id(), "/erp/list").map(|s| s.available), Some(5));
}

#[tokio::test]
async fn post_sends_business_params_as_json_body() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/erp/create")
				.query_param("access_token", "tok")
				.query_param("app_key", APP_ID)
				.query_param_exists("timestamp")
				.query_param_exists("sign")
				.json_body(json!({ "sku": "A-1", "qty": 3 }));
			then.status(200).json_body(json!({ "code": "200", "data": { "id": 7 } }));
		})
		.await;
	let body = gateway
		.call(
			&app_id(),
			ApiMethod::Post,
			"/erp/create",
			params(json!({ "sku": "A-1", "qty": 3 })),
			CallOptions::default(),
		)
		.await
		.expect("Signed POST should succeed.");

	mock.assert_async().await;

	assert_eq!(body["data"]["id"], json!(7));
}

#[tokio::test]
async fn retryable_vendor_errors_stop_after_max_retries_plus_one() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/erp/busy");
			then.status(200).json_body(json!({ "code": 3001008, "msg": "too many requests" }));
		})
		.await;
	let err = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/busy", Params::new(), CallOptions::default())
		.await
		.expect_err("Persistent vendor throttling should fail the call.");

	mock.assert_calls_async(3).await;

	let api = err.as_api().expect("Failure should be classified.");

	assert_eq!(api.code.as_str(), "3001008");
	assert_eq!(api.origin, ErrorOrigin::Vendor);
	assert!(api.retryable);
	assert!(api.request.as_ref().is_some_and(|summary| !summary.to_curl().contains("tok")));
	assert_eq!(gateway.admission.snapshot(&app_id(), "/erp/busy").map(|s| s.available), Some(5));

	let err = gateway
		.call(
			&app_id(),
			ApiMethod::Get,
			"/erp/busy",
			Params::new(),
			CallOptions::default().max_retries(0),
		)
		.await
		.expect_err("A zero retry ceiling should fail after one attempt.");

	assert!(err.is_retryable());

	mock.assert_calls_async(4).await;
}

#[tokio::test]
async fn non_retryable_vendor_errors_propagate_immediately() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/erp/forbidden");
			then.status(200).json_body(json!({ "code": 3001002, "msg": "ip not allowed" }));
		})
		.await;
	let err = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/forbidden", Params::new(), CallOptions::default())
		.await
		.expect_err("IP rejection should fail the call.");

	mock.assert_calls_async(1).await;

	let api = err.as_api().expect("Failure should be classified.");

	assert!(!api.retryable);
	assert_eq!(api.vendor_message.as_deref(), Some("ip not allowed"));
	assert_eq!(api.response.as_ref().map(|body| body["code"].clone()), Some(json!(3001002)));
}

#[tokio::test]
async fn custom_success_codes_are_honored() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/erp/partial");
			then.status(200).json_body(json!({ "code": 1, "msg": "partial" }));
		})
		.await;

	assert!(
		gateway
			.call(&app_id(), ApiMethod::Get, "/erp/partial", Params::new(), CallOptions::default())
			.await
			.is_err()
	);

	let options = CallOptions::default().success_codes(SuccessCodes::default().with("1"));
	let body = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/partial", Params::new(), options)
		.await
		.expect("Code 1 should be accepted when listed as success.");

	assert_eq!(body["msg"], json!("partial"));

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn local_denial_is_retried_then_surfaced_without_dispatch() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/erp/single");
			then.status(200).json_body(json!({ "code": 0 }));
		})
		.await;
	let held = gateway
		.admission
		.try_admit(&app_id(), "/erp/single")
		.expect("Test should hold the only slot.");
	let err = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/single", Params::new(), CallOptions::default())
		.await
		.expect_err("Exhausted bucket should deny the call.");
	let api = err.as_api().expect("Denial should be classified.");

	assert_eq!(api.origin, ErrorOrigin::Local);
	assert_eq!(api.code.as_str(), LOCAL_RATE_LIMIT_CODE);
	assert_eq!(api.retry_after, Some(StdDuration::from_millis(10)));

	mock.assert_calls_async(0).await;

	gateway
		.call(
			&app_id(),
			ApiMethod::Get,
			"/erp/single",
			Params::new(),
			CallOptions::default().skip_rate_limit(),
		)
		.await
		.expect("Skipping admission should bypass the exhausted bucket.");

	drop(held);

	gateway
		.call(&app_id(), ApiMethod::Get, "/erp/single", Params::new(), CallOptions::default())
		.await
		.expect("Released slot should admit the call.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn unparseable_failures_become_transient_errors() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());

	server
		.mock_async(|when, then| {
			when.method(GET).path("/erp/gateway");
			then.status(502).body("<html>bad gateway</html>");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/erp/garbled");
			then.status(200).body("not json");
		})
		.await;

	let err = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/gateway", Params::new(), CallOptions::default())
		.await
		.expect_err("HTML error page should fail the call.");

	match err {
		Error::Transient(TransientError::UnexpectedStatus { status, body_preview, request }) => {
			assert_eq!(status, 502);
			assert!(body_preview.contains("bad gateway"));
			assert!(request.is_some());
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	let err = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/garbled", Params::new(), CallOptions::default())
		.await
		.expect_err("Non-JSON success body should fail the call.");

	assert!(matches!(err, Error::Transient(TransientError::MalformedBody { status: 200, .. })));
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn transport_failures_carry_request_context_and_release_the_grant() {
	let (gateway, _) =
		build_reqwest_test_gateway(test_config("http://127.0.0.1:9/", capacities()), valid_account());
	let err = gateway
		.call(&app_id(), ApiMethod::Get, "/erp/single", Params::new(), CallOptions::default())
		.await
		.expect_err("Unreachable vendor should fail the call.");

	match &err {
		Error::Transport(inner) => {
			let request = inner.request().expect("Transport error should carry the request.");

			assert!(request.url.path().ends_with("/erp/single"));
			assert!(!request.to_curl().contains("=tok"));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(gateway.admission.snapshot(&app_id(), "/erp/single").map(|s| s.available), Some(1));
}

#[tokio::test]
async fn unknown_identities_fail_before_dispatch() {
	let server = MockServer::start_async().await;
	let (gateway, _) =
		build_reqwest_test_gateway(test_config(&server.base_url(), capacities()), valid_account());
	let auth = server
		.mock_async(|when, then| {
			when.method(POST).path(ACCESS_TOKEN_PATH);
			then.status(200).json_body(token_envelope("never", "never", 7199));
		})
		.await;
	let stranger = AppId::new("ak_stranger").expect("App identifier fixture should be valid.");
	let err = gateway
		.call(&stranger, ApiMethod::Get, "/erp/list", Params::new(), CallOptions::default())
		.await
		.expect_err("Unregistered identity should fail.");

	assert!(err.to_string().contains("ak_stranger"));

	auth.assert_calls_async(0).await;
}
