//! Gateway configuration: base URL, per-endpoint concurrency ceilings, timers, and retry policy.

// self
use crate::{_prelude::*, admission::AdmissionConfig, error::ConfigError};

/// Path of the token issuance endpoint (`appId` + `appSecret`).
pub const ACCESS_TOKEN_PATH: &str = "/api/auth-server/oauth/access-token";
/// Path of the token refresh endpoint (`appId` + `refreshToken`).
pub const REFRESH_TOKEN_PATH: &str = "/api/auth-server/oauth/refresh";

/// Ordered `pattern -> capacity` rule; the pattern matches any endpoint containing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRule {
	/// Substring tested against the endpoint path.
	pub pattern: String,
	/// Concurrent grants allowed for matching endpoints.
	pub capacity: u32,
}
impl CapacityRule {
	/// Creates a new rule.
	pub fn new(pattern: impl Into<String>, capacity: u32) -> Self {
		Self { pattern: pattern.into(), capacity }
	}
}

/// Per-endpoint concurrency ceilings mirroring the vendor's documented limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityTable {
	/// Rules evaluated in order; the first match wins.
	pub rules: Vec<CapacityRule>,
	/// Capacity applied when no rule matches.
	pub default_capacity: u32,
}
impl CapacityTable {
	/// Global fallback used by [`CapacityTable::default`].
	pub const DEFAULT_CAPACITY: u32 = 1;

	/// Creates a table from explicit rules.
	pub fn new<I>(rules: I, default_capacity: u32) -> Self
	where
		I: IntoIterator<Item = CapacityRule>,
	{
		Self { rules: rules.into_iter().collect(), default_capacity }
	}

	/// Looks up the capacity for `endpoint`; first substring match wins.
	pub fn capacity(&self, endpoint: &str) -> u32 {
		self.rules
			.iter()
			.find(|rule| endpoint.contains(rule.pattern.as_str()))
			.map_or(self.default_capacity, |rule| rule.capacity)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.default_capacity == 0 {
			return Err(ConfigError::ZeroCapacity { pattern: "*".into() });
		}
		if let Some(rule) = self.rules.iter().find(|rule| rule.capacity == 0) {
			return Err(ConfigError::ZeroCapacity { pattern: rule.pattern.clone() });
		}

		Ok(())
	}
}
impl Default for CapacityTable {
	fn default() -> Self {
		Self::new(
			[
				CapacityRule::new("/erp/sc/data/mws_report/allOrders", 1),
				CapacityRule::new("/erp/sc/data/sales_report", 1),
				CapacityRule::new("/erp/sc/routing/data/local_inventory", 1),
				CapacityRule::new("/bd/profit/report", 1),
				CapacityRule::new("/erp/sc/data/mws/orders", 2),
				CapacityRule::new("/erp/sc/routing/storage", 3),
				CapacityRule::new("/erp/sc/data/seller/lists", 5),
				CapacityRule::new("/erp/sc/data/local_inventory/category", 10),
			],
			Self::DEFAULT_CAPACITY,
		)
	}
}

/// Validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Vendor API origin every endpoint path is joined onto.
	pub base_url: Url,
	/// Token issuance endpoint path.
	pub access_token_path: String,
	/// Token refresh endpoint path.
	pub refresh_token_path: String,
	/// Per-endpoint concurrency ceilings.
	pub capacities: CapacityTable,
	/// Age after which an unreleased grant is reclaimed.
	pub grant_timeout: StdDuration,
	/// Interval of the background stale-grant sweep.
	pub sweep_interval: StdDuration,
	/// Lifetime assumed when the vendor omits `expires_in`.
	pub default_token_lifetime: Duration,
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Wait suggested to callers after a local admission denial.
	pub local_retry_after: StdDuration,
}
impl GatewayConfig {
	/// Default forced-release timeout (2 minutes).
	pub const DEFAULT_GRANT_TIMEOUT: StdDuration = StdDuration::from_secs(120);
	/// Default retry ceiling.
	pub const DEFAULT_MAX_RETRIES: u32 = 3;
	/// Default local rate-limit backoff.
	pub const DEFAULT_LOCAL_RETRY_AFTER: StdDuration = StdDuration::from_secs(1);
	/// Default stale-grant sweep interval (60 seconds).
	pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);
	/// Default access-token lifetime fallback (7199 seconds).
	pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::seconds(7199);

	/// Creates a builder targeting `base_url`.
	pub fn builder(base_url: Url) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Resolves an endpoint path against the base URL.
	pub fn endpoint_url(&self, path: &str) -> Result<Url, ConfigError> {
		let trimmed = path.trim_start_matches('/');

		self.base_url
			.join(trimmed)
			.map_err(|source| ConfigError::InvalidEndpoint { path: path.to_owned(), source })
	}

	/// Extracts the admission controller settings.
	pub fn admission_config(&self) -> AdmissionConfig {
		AdmissionConfig {
			capacities: self.capacities.clone(),
			grant_timeout: self.grant_timeout,
			sweep_interval: self.sweep_interval,
		}
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	base_url: Url,
	access_token_path: String,
	refresh_token_path: String,
	capacities: CapacityTable,
	grant_timeout: StdDuration,
	sweep_interval: StdDuration,
	default_token_lifetime: Duration,
	max_retries: u32,
	local_retry_after: StdDuration,
}
impl GatewayConfigBuilder {
	/// Creates a new builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			access_token_path: ACCESS_TOKEN_PATH.into(),
			refresh_token_path: REFRESH_TOKEN_PATH.into(),
			capacities: CapacityTable::default(),
			grant_timeout: GatewayConfig::DEFAULT_GRANT_TIMEOUT,
			sweep_interval: GatewayConfig::DEFAULT_SWEEP_INTERVAL,
			default_token_lifetime: GatewayConfig::DEFAULT_TOKEN_LIFETIME,
			max_retries: GatewayConfig::DEFAULT_MAX_RETRIES,
			local_retry_after: GatewayConfig::DEFAULT_LOCAL_RETRY_AFTER,
		}
	}

	/// Overrides the token endpoint paths.
	pub fn auth_paths(mut self, access_token: impl Into<String>, refresh: impl Into<String>) -> Self {
		self.access_token_path = access_token.into();
		self.refresh_token_path = refresh.into();

		self
	}

	/// Replaces the capacity table.
	pub fn capacities(mut self, capacities: CapacityTable) -> Self {
		self.capacities = capacities;

		self
	}

	/// Overrides the forced-release timeout.
	pub fn grant_timeout(mut self, timeout: StdDuration) -> Self {
		self.grant_timeout = timeout;

		self
	}

	/// Overrides the stale-grant sweep interval.
	pub fn sweep_interval(mut self, interval: StdDuration) -> Self {
		self.sweep_interval = interval;

		self
	}

	/// Overrides the token lifetime fallback.
	pub fn default_token_lifetime(mut self, lifetime: Duration) -> Self {
		self.default_token_lifetime = lifetime;

		self
	}

	/// Overrides the retry ceiling.
	pub fn max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the backoff suggested after a local admission denial.
	pub fn local_retry_after(mut self, wait: StdDuration) -> Self {
		self.local_retry_after = wait;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidBaseUrl { url: self.base_url.to_string() });
		}

		self.capacities.validate()?;

		if self.grant_timeout.is_zero() {
			return Err(ConfigError::ZeroDuration { setting: "grant_timeout" });
		}
		if self.sweep_interval.is_zero() {
			return Err(ConfigError::ZeroDuration { setting: "sweep_interval" });
		}
		if !self.default_token_lifetime.is_positive() {
			return Err(ConfigError::ZeroDuration { setting: "default_token_lifetime" });
		}

		let mut base_url = self.base_url;

		// `Url::join` drops the last segment unless the base ends with a slash.
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		Ok(GatewayConfig {
			base_url,
			access_token_path: self.access_token_path,
			refresh_token_path: self.refresh_token_path,
			capacities: self.capacities,
			grant_timeout: self.grant_timeout,
			sweep_interval: self.sweep_interval,
			default_token_lifetime: self.default_token_lifetime,
			max_retries: self.max_retries,
			local_retry_after: self.local_retry_after,
		})
	}
}
