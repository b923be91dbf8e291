//! Optional observability helpers for gateway calls and admission buckets.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `openapi_gateway.flow` with the `flow` and
//!   `stage` fields, plus debug/warn events for denials, retries, credential fallbacks, and
//!   reclaimed grants.
//! - Enable `metrics` to increment `openapi_gateway_flow_total` (labeled by `flow` + `outcome`)
//!   and `openapi_gateway_admission_total` (labeled by `outcome`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Emits a `tracing` event when the `tracing` feature is enabled; expands to nothing otherwise.
#[doc(hidden)]
#[macro_export]
macro_rules! obs_event {
	($level:ident, $($arg:tt)+) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!($($arg)+);
		}
	};
}

/// Gateway operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// A business call through [`Gateway::call`](crate::gateway::Gateway::call).
	Call,
	/// Full authentication with the app secret.
	Authenticate,
	/// Access token renewal with the refresh token.
	Refresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Call => "call",
			FlowKind::Authenticate => "authenticate",
			FlowKind::Refresh => "refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a gateway operation.
	Attempt,
	/// Successful completion.
	Success,
	/// A classified failure is being retried.
	Retry,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Retry => "retry",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Admission bucket events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdmissionOutcome {
	/// A slot was granted.
	Granted,
	/// The bucket was exhausted.
	Denied,
	/// A holder returned its slot.
	Released,
	/// A stale slot was reclaimed by the timer or the sweep.
	Reclaimed,
}
impl AdmissionOutcome {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AdmissionOutcome::Granted => "granted",
			AdmissionOutcome::Denied => "denied",
			AdmissionOutcome::Released => "released",
			AdmissionOutcome::Reclaimed => "reclaimed",
		}
	}
}
