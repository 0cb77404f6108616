//! Token endpoint grants: authorization-code and refresh-token exchanges.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, SessionId},
	flows::{Bridge, common},
	http::TokenHttpClient,
	obs::{FlowKind, FlowSpan},
	signer::TokenKind,
};

/// Downstream token endpoint response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Signed access token.
	pub access_token: String,
	/// Always `Bearer`.
	pub token_type: String,
	/// Access-token lifetime in seconds.
	pub expires_in: i64,
	/// Signed refresh token.
	pub refresh_token: String,
}

impl<C> Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Redeems a downstream authorization code for a signed token pair.
	///
	/// The code is consumed before any other check, so it is single-use even when the PKCE proof
	/// fails. `code_verifier` is optional because an outer layer may already have checked it
	/// against [`Bridge::challenge_for_authorization_code`]. `resource` becomes the tokens'
	/// audience.
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		code_verifier: Option<&str>,
		resource: Option<&str>,
	) -> Result<TokenResponse> {
		FlowSpan::new(FlowKind::CodeExchange, "exchange_authorization_code")
			.run(async move {
				let grant = self.codes.consume(code).await?.ok_or(Error::UnknownOrExpiredCode)?;

				if code_verifier.is_some_and(|verifier| {
					!common::pkce_verifier_matches(verifier, &grant.code_challenge)
				}) {
					return Err(Error::InvalidGrant {
						reason: "PKCE verifier does not match the code challenge".into(),
					});
				}

				let session_id = self.sessions.create(grant.upstream).await?;

				self.issue_pair(&session_id, &grant.client_id, &self.granted_scope, resource)
			})
			.await
	}

	/// Mints a new signed pair for the session behind `refresh_token`.
	///
	/// `scopes`, when given, must be a subset of the scopes the refresh token carries. The
	/// audience defaults to the one bound to the presented refresh token.
	pub async fn exchange_refresh_token(
		&self,
		refresh_token: &str,
		scopes: Option<&ScopeSet>,
		resource: Option<&str>,
	) -> Result<TokenResponse> {
		FlowSpan::new(FlowKind::TokenRefresh, "exchange_refresh_token")
			.run(async move {
				let verified = self.signer.verify_kind(refresh_token, TokenKind::Refresh)?;
				let scopes = match scopes {
					Some(requested) => {
						if let Some(scope) = requested.first_outside(&verified.scopes) {
							return Err(Error::InvalidScope { scope: scope.to_owned() });
						}

						requested.clone()
					},
					None => verified.scopes.clone(),
				};

				if !self.sessions.exists(&verified.session_id).await? {
					return Err(Error::SessionNotFound);
				}

				let audience = resource.or(verified.audience.as_deref());

				self.issue_pair(&verified.session_id, &verified.client_id, &scopes, audience)
			})
			.await
	}

	pub(super) fn issue_pair(
		&self,
		session_id: &SessionId,
		client_id: &ClientId,
		scopes: &ScopeSet,
		audience: Option<&str>,
	) -> Result<TokenResponse> {
		let now = OffsetDateTime::now_utc();
		let access_token =
			self.signer.mint_at(TokenKind::Access, session_id, client_id, scopes, audience, now)?;
		let refresh_token =
			self.signer.mint_at(TokenKind::Refresh, session_id, client_id, scopes, audience, now)?;

		Ok(TokenResponse {
			access_token,
			token_type: "Bearer".into(),
			expires_in: TokenKind::Access.ttl().whole_seconds(),
			refresh_token,
		})
	}
}
