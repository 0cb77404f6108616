//! Flow observability for the bridge.
//!
//! Every downstream-facing operation runs inside a [`FlowSpan`] and reports one `attempt` plus
//! one `success` or `failure`. Both sinks are optional:
//!
//! - `tracing` emits `oauth2_bridge.flow` spans (fields `flow`, `stage`) and a warn-level event
//!   for each failure, including revocations that are swallowed.
//! - `metrics` increments `oauth2_bridge_flow_total{flow, outcome}`.
//!
//! With both features off every hook compiles to nothing.

mod span;

pub(crate) use span::FlowSpan;

// self
use crate::_prelude::*;

/// Bridge operations that report outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Downstream authorization start.
	Authorize,
	/// Upstream callback handling (includes the upstream code exchange).
	Callback,
	/// Downstream authorization-code exchange.
	CodeExchange,
	/// Downstream refresh-token exchange.
	TokenRefresh,
	/// Transparent refresh of a session's upstream credential.
	UpstreamRefresh,
	/// Token revocation.
	Revoke,
}
impl FlowKind {
	/// Label used for the `flow` span field and metric label.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authorize => "authorize",
			FlowKind::Callback => "callback",
			FlowKind::CodeExchange => "code_exchange",
			FlowKind::TokenRefresh => "token_refresh",
			FlowKind::UpstreamRefresh => "upstream_refresh",
			FlowKind::Revoke => "revoke",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// `outcome` label values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// The operation was entered.
	Attempt,
	/// The operation returned `Ok`.
	Success,
	/// The operation failed, or a revocation was swallowed.
	Failure,
}
impl FlowOutcome {
	/// Label used for the `outcome` metric label.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}

/// Bumps `oauth2_bridge_flow_total` for `kind` and `outcome`.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"oauth2_bridge_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Emits a warn-level event for a failed or swallowed flow step.
pub fn warn_flow(kind: FlowKind, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(flow = kind.as_str(), %error, "Bridge flow failed.");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, error);
}

/// Records the outcome of `result` for `kind` and passes it through.
pub(crate) fn observe<T>(kind: FlowKind, result: Result<T>) -> Result<T> {
	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(e) => {
			record_flow_outcome(kind, FlowOutcome::Failure);
			warn_flow(kind, e);
		},
	}

	result
}
