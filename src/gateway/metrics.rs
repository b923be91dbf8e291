// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for credential acquisition.
#[derive(Debug, Default)]
pub struct CredentialMetrics {
	refresh_attempts: AtomicU64,
	refresh_failures: AtomicU64,
	authentication_attempts: AtomicU64,
	authentication_failures: AtomicU64,
}
impl CredentialMetrics {
	/// Returns the number of refresh-token exchanges started.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh-token exchanges that failed.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of full authentications started.
	pub fn authentication_attempts(&self) -> u64 {
		self.authentication_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of full authentications that failed.
	pub fn authentication_failures(&self) -> u64 {
		self.authentication_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_authentication_attempt(&self) {
		self.authentication_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_authentication_failure(&self) {
		self.authentication_failures.fetch_add(1, Ordering::Relaxed);
	}
}
