//! Request lifecycle manager: admission, credentials, signing, dispatch, classification, retry.
//!
//! [`Gateway::call`] drives one business call through an explicit retry loop. Every attempt
//! re-runs the whole pipeline (a fresh admission grant, credential resolution, a new timestamp
//! and signature) so a retry never reuses state that caused the previous failure.

mod call;
mod credentials;
mod metrics;
mod request;

pub use call::CallOptions;
pub use metrics::CredentialMetrics;
pub use request::RequestSummary;
pub use crate::http::ApiMethod;

// self
use crate::{
	_prelude::*,
	admission::AdmissionController,
	auth::AppId,
	config::GatewayConfig,
	http::{GatewayHttpClient, TransportErrorMapper},
	store::AccountStore,
	vendor::ErrorRegistry,
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport stack.
pub type ReqwestGateway = Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Resilient client for one vendor deployment.
///
/// The gateway owns the transport, the account store handle, and an [`AdmissionController`]
/// built from the configuration's capacity table and reclamation timings. Gateways that talk to
/// the same vendor account should share one controller through [`Gateway::with_admission`] so
/// their calls are accounted against the same buckets.
#[derive(Clone)]
pub struct Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Credential store shared with whatever registers identities.
	pub store: Arc<dyn AccountStore>,
	/// Shared per-(identity, endpoint) admission buckets.
	pub admission: AdmissionController,
	/// Validated gateway settings.
	pub config: GatewayConfig,
	/// Vendor code classification table.
	pub registry: Arc<ErrorRegistry>,
	/// Counters for token issuance and refresh outcomes.
	pub credential_metrics: Arc<CredentialMetrics>,
	flow_guards: Arc<Mutex<HashMap<AppId, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a gateway that reuses the caller-provided transport + mapper pair.
	///
	/// The admission controller is built from [`GatewayConfig::admission_config`].
	pub fn with_http_client(
		store: Arc<dyn AccountStore>,
		config: GatewayConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			admission: AdmissionController::new(config.admission_config()),
			config,
			registry: Default::default(),
			credential_metrics: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Replaces the admission controller with a shared one.
	///
	/// The shared controller keeps its own capacity table and timings; the admission settings
	/// of this gateway's configuration no longer apply.
	pub fn with_admission(mut self, admission: AdmissionController) -> Self {
		self.admission = admission;

		self
	}

	/// Replaces the vendor code classification table.
	pub fn with_registry(mut self, registry: ErrorRegistry) -> Self {
		self.registry = Arc::new(registry);

		self
	}

	// Returns (and creates on demand) the single-flight credential guard for an identity.
	fn flow_guard(&self, app_id: &AppId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(app_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a gateway backed by a default reqwest client.
	pub fn new(store: Arc<dyn AccountStore>, config: GatewayConfig) -> Self {
		Self::with_http_client(
			store,
			config,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Debug for Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("base_url", &self.config.base_url.as_str())
			.field("admission", &self.admission.config())
			.field("max_retries", &self.config.max_retries)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{
		config::{CapacityRule, CapacityTable},
		store::MemoryStore,
	};

	fn config() -> GatewayConfig {
		GatewayConfig::builder(
			Url::parse("https://vendor.example.com/").expect("Base URL fixture should parse."),
		)
		.capacities(CapacityTable::new([CapacityRule::new("/a", 1)], 7))
		.grant_timeout(StdDuration::from_secs(30))
		.build()
		.expect("Gateway configuration fixture should be valid.")
	}

	fn app_id() -> AppId {
		AppId::new("ak_gateway").expect("App identifier fixture should be valid.")
	}

	#[test]
	fn admission_follows_the_configured_capacity_table() {
		let gateway = ReqwestGateway::new(Arc::new(MemoryStore::default()), config());

		assert_eq!(gateway.admission.capacity("/a/list"), 1);
		assert_eq!(gateway.admission.capacity("/other"), 7);
		assert_eq!(gateway.admission.config().grant_timeout, StdDuration::from_secs(30));
		assert!(gateway.admission.acquire(&app_id(), "/a/list").is_granted());
		assert!(!gateway.admission.acquire(&app_id(), "/a/list").is_granted());
	}

	#[test]
	fn shared_controller_spans_gateways() {
		let shared = AdmissionController::new(config().admission_config());
		let store: Arc<dyn AccountStore> = Arc::new(MemoryStore::default());
		let first = ReqwestGateway::new(store.clone(), config()).with_admission(shared.clone());
		let second = ReqwestGateway::new(store, config()).with_admission(shared);

		assert!(first.admission.acquire(&app_id(), "/a/list").is_granted());
		assert!(!second.admission.acquire(&app_id(), "/a/list").is_granted());
	}
}
