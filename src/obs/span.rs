// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

#[cfg(feature = "tracing")]
type Instrumented<F> = tracing::instrument::Instrumented<F>;
#[cfg(not(feature = "tracing"))]
type Instrumented<F> = F;

/// Span around one bridge operation.
#[derive(Clone, Debug)]
pub(crate) struct FlowSpan {
	kind: FlowKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	pub(crate) fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		let span = tracing::info_span!("oauth2_bridge.flow", flow = kind.as_str(), stage);
		#[cfg(not(feature = "tracing"))]
		let _ = stage;

		Self {
			kind,
			#[cfg(feature = "tracing")]
			span,
		}
	}

	/// Runs `fut` inside the span without recording outcomes.
	pub(crate) fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
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

	/// Records an attempt, runs `fut` inside the span, then records its outcome.
	pub(crate) async fn run<T, Fut>(self, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		obs::record_flow_outcome(self.kind, FlowOutcome::Attempt);

		let result = self.instrument(fut).await;

		obs::observe(self.kind, result)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn run_returns_the_operation_result() {
		let ok = FlowSpan::new(FlowKind::Authorize, "ok").run(async { Ok(42) }).await;
		let err = FlowSpan::new(FlowKind::Revoke, "err")
			.run(async { Err::<(), _>(Error::SessionNotFound) })
			.await;

		assert_eq!(ok.expect("Successful flow should return its value."), 42);
		assert!(matches!(err, Err(Error::SessionNotFound)));
	}
}
