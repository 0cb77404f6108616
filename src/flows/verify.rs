//! Bearer verification, revocation, and upstream token access for protected calls.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, SessionId, TokenSecret},
	flows::Bridge,
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	signer::TokenKind,
};

/// Identity attached to a verified access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthInfo {
	/// The presented token.
	pub token: String,
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
	/// Resource indicator (audience), when one was bound.
	pub resource: Option<String>,
	/// Session whose upstream credential backs the token.
	pub session_id: SessionId,
}

impl<C> Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Verifies a downstream access token.
	///
	/// This is a pure signature and claims check; it does not consult the session store, so a
	/// token stays valid until expiry even after its session is revoked.
	pub fn verify_access_token(&self, token: &str) -> Result<AuthInfo> {
		let verified = self.signer.verify_kind(token, TokenKind::Access)?;

		Ok(AuthInfo {
			token: token.to_owned(),
			client_id: verified.client_id,
			scopes: verified.scopes,
			expires_at: verified.expires_at,
			resource: verified.audience,
			session_id: verified.session_id,
		})
	}

	/// Revokes the session behind an access or refresh token.
	///
	/// Tokens that fail verification are ignored; there is nothing to revoke.
	pub async fn revoke(&self, token: &str) -> Result<()> {
		let span = FlowSpan::new(FlowKind::Revoke, "revoke");

		obs::record_flow_outcome(FlowKind::Revoke, FlowOutcome::Attempt);

		span.instrument(async move {
			let verified = match self.signer.verify(token) {
				Ok(verified) => verified,
				Err(e) => {
					obs::record_flow_outcome(FlowKind::Revoke, FlowOutcome::Failure);
					obs::warn_flow(FlowKind::Revoke, &e);

					return Ok(());
				},
			};
			let removed = self.sessions.delete(&verified.session_id).await.map(|_| ());

			obs::observe(FlowKind::Revoke, removed)
		})
		.await
	}

	/// Returns a live upstream access token for the session behind a verified access token,
	/// refreshing the upstream credential first when it is about to expire.
	pub async fn upstream_access_token(&self, auth: &AuthInfo) -> Result<TokenSecret> {
		self.sessions.live_upstream_access_token(&auth.session_id).await
	}
}
