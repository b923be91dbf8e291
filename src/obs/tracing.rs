// self
use crate::{_prelude::*, auth::AppId, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span attached to one gateway flow, tagged with the flow kind, call site, and identity.
///
/// Business calls additionally record the attempt number as retries happen.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span for `app_id`.
	pub fn new(kind: FlowKind, stage: &'static str, app_id: &AppId) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"openapi_gateway.flow",
				flow = kind.as_str(),
				stage,
				app_id = app_id.as_str(),
				attempt = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, app_id);

			Self {}
		}
	}

	/// Records the zero-based attempt number currently in flight.
	pub fn record_attempt(&self, attempt: u32) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("attempt", attempt);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = attempt;
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
