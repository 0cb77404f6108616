//! Authorization start, upstream callback, and PKCE challenge lookup.

// self
use crate::{
	_prelude::*,
	auth::{AuthCode, Nonce},
	client::ClientInformation,
	flows::{Bridge, common},
	http::TokenHttpClient,
	obs::{FlowKind, FlowSpan},
	registry::{CodeGrant, PendingAuthorization},
};

impl<C> Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Parks the downstream request under a fresh nonce and returns the upstream authorization
	/// URL the user agent should be sent to.
	///
	/// `redirect_uri` must exactly match one the client registered; a client without registered
	/// redirect URIs cannot authorize. Expired entries of both registries are swept on every call.
	pub async fn begin_authorization(
		&self,
		client: &ClientInformation,
		redirect_uri: Url,
		code_challenge: impl Into<String>,
		state: Option<String>,
	) -> Result<Url> {
		let code_challenge = code_challenge.into();

		FlowSpan::new(FlowKind::Authorize, "begin_authorization")
			.run(async move {
				self.sweep_registries().await?;

				if !client.allows_redirect(&redirect_uri) {
					return Err(Error::InvalidRedirectUri { uri: redirect_uri.to_string() });
				}

				let nonce = Nonce::generate();
				let pending = PendingAuthorization {
					client_id: client.client_id.clone(),
					redirect_uri,
					code_challenge,
					state,
				};

				self.pending.put(nonce.as_str(), pending).await?;

				Ok(self.upstream.authorization_url(&self.callback_url, &nonce))
			})
			.await
	}

	/// Completes the upstream leg: consumes the pending authorization for `nonce`, exchanges
	/// `upstream_code`, and returns the downstream redirect carrying a fresh code.
	///
	/// The nonce is spent even when the upstream exchange fails.
	pub async fn handle_upstream_callback(&self, upstream_code: &str, nonce: &str) -> Result<Url> {
		FlowSpan::new(FlowKind::Callback, "handle_upstream_callback")
			.run(async move {
				let pending =
					self.pending.consume(nonce).await?.ok_or(Error::UnknownOrExpiredState)?;
				let upstream = self.upstream.exchange_code(upstream_code).await?;
				let code = AuthCode::generate();
				let redirect =
					common::redirect_with_code(&pending.redirect_uri, &code, pending.state.as_deref());
				let grant = CodeGrant {
					client_id: pending.client_id,
					redirect_uri: pending.redirect_uri,
					code_challenge: pending.code_challenge,
					upstream,
				};

				self.codes.put(code.as_str(), grant).await?;

				Ok(redirect)
			})
			.await
	}

	/// Returns the PKCE challenge bound to an issued code without consuming it.
	pub async fn challenge_for_authorization_code(&self, code: &str) -> Result<String> {
		self.codes
			.peek(code)
			.await?
			.map(|grant| grant.code_challenge)
			.ok_or(Error::UnknownOrExpiredCode)
	}

	/// Evicts expired pending authorizations and codes, returning how many were removed.
	pub async fn sweep_registries(&self) -> Result<usize> {
		Ok(self.pending.sweep().await? + self.codes.sweep().await?)
	}
}
