//! The provider façade: every downstream-facing operation of the bridge.
//!
//! [`Bridge`] wires the signer, the upstream client, the session manager, both correlation
//! registries, and the client registry together. A downstream authorization moves through
//! `started` (pending entry stored) → `callback-received` (code grant stored) → `exchanged`
//! (session created, tokens minted) → `active`, and ends `revoked` or `expired`.

pub mod authorize;
pub mod common;
pub mod token;
pub mod verify;

pub use authorize::*;
pub use common::*;
pub use token::*;
pub use verify::*;

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	client::ClientRegistry,
	config::BridgeConfig,
	error::ConfigError,
	http::TokenHttpClient,
	registry::{CodeGrant, CodeRegistry, PendingAuthorization, PendingRegistry},
	session::SessionManager,
	signer::Signer,
	store::{GrantStore, SessionStore},
	upstream::{UpstreamClient, UpstreamDescriptor},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// The single capability string granted to every session.
pub const BITBUCKET_SCOPE: &str = "bitbucket";

#[cfg(feature = "reqwest")]
/// Bridge specialized for the crate's default reqwest transport.
pub type ReqwestBridge = Bridge<ReqwestHttpClient>;

/// Mediating OAuth provider in front of a single upstream.
pub struct Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	signer: Signer,
	upstream: Arc<UpstreamClient<C>>,
	sessions: SessionManager<C>,
	pending: PendingRegistry,
	codes: CodeRegistry,
	clients: ClientRegistry,
	callback_url: Url,
	granted_scope: ScopeSet,
}
impl<C> Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a bridge that reuses the caller-provided transport.
	///
	/// Sessions, registries, and clients start out in memory; swap backends with the `with_*`
	/// methods.
	pub fn with_http_client(
		config: &BridgeConfig,
		descriptor: UpstreamDescriptor,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		let callback_url = config.callback_url()?;
		let upstream = Arc::new(UpstreamClient::<C>::new(
			descriptor,
			config.upstream_client_id.clone(),
			&config.upstream_client_secret,
			&callback_url,
			http_client,
		)?);
		let signer = Signer::new(config.issuer(), config.signing_secret.expose().as_bytes())?;
		let granted_scope = ScopeSet::new([BITBUCKET_SCOPE]).map_err(ConfigError::from)?;

		Ok(Self {
			signer,
			sessions: SessionManager::new(upstream.clone()),
			upstream,
			pending: PendingRegistry::in_memory(),
			codes: CodeRegistry::in_memory(),
			clients: ClientRegistry::default(),
			callback_url,
			granted_scope,
		})
	}

	/// Replaces the session backend.
	pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
		self.sessions = self.sessions.with_store(store);

		self
	}

	/// Replaces the pending-authorization backend.
	pub fn with_pending_store(mut self, store: Arc<dyn GrantStore<PendingAuthorization>>) -> Self {
		self.pending = PendingRegistry::new(store).with_ttl(self.pending.ttl());

		self
	}

	/// Replaces the authorization-code backend.
	pub fn with_code_store(mut self, store: Arc<dyn GrantStore<CodeGrant>>) -> Self {
		self.codes = CodeRegistry::new(store).with_ttl(self.codes.ttl());

		self
	}

	/// Shares an existing client registry.
	pub fn with_client_registry(mut self, clients: ClientRegistry) -> Self {
		self.clients = clients;

		self
	}

	/// Overrides the window before upstream expiry that triggers a refresh.
	pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
		self.sessions = self.sessions.with_refresh_skew(skew);

		self
	}

	/// Restricts which token audiences verification accepts.
	pub fn with_accepted_audiences<I, S>(mut self, audiences: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.signer = self.signer.with_accepted_audiences(audiences);

		self
	}

	/// Token signer.
	pub fn signer(&self) -> &Signer {
		&self.signer
	}

	/// Upstream OAuth client.
	pub fn upstream(&self) -> &UpstreamClient<C> {
		&self.upstream
	}

	/// Session manager.
	pub fn sessions(&self) -> &SessionManager<C> {
		&self.sessions
	}

	/// Pending-authorization registry.
	pub fn pending(&self) -> &PendingRegistry {
		&self.pending
	}

	/// Authorization-code registry.
	pub fn codes(&self) -> &CodeRegistry {
		&self.codes
	}

	/// Dynamic client registry.
	pub fn clients(&self) -> &ClientRegistry {
		&self.clients
	}

	/// Callback URL registered with the upstream.
	pub fn callback_url(&self) -> &Url {
		&self.callback_url
	}

	/// Scopes granted to every session.
	pub fn granted_scope(&self) -> &ScopeSet {
		&self.granted_scope
	}
}
#[cfg(feature = "reqwest")]
impl Bridge<ReqwestHttpClient> {
	/// Creates a Bitbucket bridge with its own reqwest transport.
	///
	/// The transport never follows redirects and aborts token requests after
	/// [`BridgeConfig::upstream_timeout`].
	pub fn new(config: &BridgeConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.upstream_timeout)?;

		Self::with_http_client(config, UpstreamDescriptor::bitbucket()?, http_client)
	}
}
impl<C> Debug for Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Bridge")
			.field("signer", &self.signer)
			.field("upstream", &self.upstream)
			.field("callback_url", &self.callback_url)
			.field("granted_scope", &self.granted_scope)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::ClientId, client::ClientMetadata, signer::TokenKind};

	fn offline_bridge() -> ReqwestTestBridge {
		let descriptor =
			test_descriptor("https://idp.example.com/authorize", "https://idp.example.com/token");

		build_reqwest_test_bridge(descriptor).0
	}

	async fn seeded_pair(bridge: &ReqwestTestBridge) -> TokenResponse {
		let session_id = bridge
			.sessions()
			.create(upstream_tokens("bb-access", "bb-refresh", Duration::hours(2)))
			.await
			.expect("Session should be created.");
		let client_id = ClientId::new("client-1").expect("Client id fixture should be valid.");

		bridge
			.issue_pair(&session_id, &client_id, bridge.granted_scope(), Some("https://mcp.example.com"))
			.expect("Token pair should be minted.")
	}

	#[tokio::test]
	async fn unknown_nonce_is_rejected_before_any_exchange() {
		let bridge = offline_bridge();

		assert!(matches!(
			bridge.handle_upstream_callback("bb-code", "missing").await,
			Err(Error::UnknownOrExpiredState)
		));
		assert!(matches!(
			bridge.exchange_authorization_code("missing", None, None).await,
			Err(Error::UnknownOrExpiredCode)
		));
	}

	#[tokio::test]
	async fn clients_without_registered_redirects_cannot_authorize() {
		let bridge = offline_bridge();
		let client = bridge.clients().register(ClientMetadata::default());
		let redirect =
			Url::parse("https://evil.example.com/steal").expect("Redirect fixture should parse.");

		assert!(matches!(
			bridge.begin_authorization(&client, redirect, "challenge", None).await,
			Err(Error::InvalidRedirectUri { ref uri }) if uri == "https://evil.example.com/steal"
		));
	}

	#[tokio::test]
	async fn refresh_exchange_keeps_session_and_audience() {
		let bridge = offline_bridge();
		let pair = seeded_pair(&bridge).await;
		let next = bridge
			.exchange_refresh_token(&pair.refresh_token, None, None)
			.await
			.expect("Refresh exchange should succeed.");
		let before = bridge.verify_access_token(&pair.access_token).expect("Token should verify.");
		let after = bridge.verify_access_token(&next.access_token).expect("Token should verify.");

		assert_eq!(before.session_id, after.session_id);
		assert_eq!(after.resource.as_deref(), Some("https://mcp.example.com"));
		assert_eq!(after.scopes, *bridge.granted_scope());
	}

	#[tokio::test]
	async fn refresh_exchange_rejects_widened_scopes() {
		let bridge = offline_bridge();
		let pair = seeded_pair(&bridge).await;
		let widened =
			ScopeSet::new([BITBUCKET_SCOPE, "admin"]).expect("Scope fixture should be valid.");
		let err = bridge
			.exchange_refresh_token(&pair.refresh_token, Some(&widened), None)
			.await
			.expect_err("Widened scopes should be rejected.");

		assert!(matches!(err, Error::InvalidScope { ref scope } if scope == "admin"));
	}

	#[tokio::test]
	async fn token_kinds_are_not_interchangeable() {
		let bridge = offline_bridge();
		let pair = seeded_pair(&bridge).await;

		assert!(matches!(
			bridge.verify_access_token(&pair.refresh_token),
			Err(Error::InvalidToken { .. })
		));
		assert!(matches!(
			bridge.exchange_refresh_token(&pair.access_token, None, None).await,
			Err(Error::InvalidToken { .. })
		));
		assert_eq!(pair.expires_in, TokenKind::Access.ttl().whole_seconds());
	}

	#[tokio::test]
	async fn revocation_ends_the_session_but_not_the_signature() {
		let bridge = offline_bridge();
		let pair = seeded_pair(&bridge).await;

		bridge.revoke(&pair.refresh_token).await.expect("Revocation should succeed.");

		let auth = bridge
			.verify_access_token(&pair.access_token)
			.expect("Access token should still verify.");

		assert!(matches!(bridge.upstream_access_token(&auth).await, Err(Error::SessionNotFound)));

		bridge.revoke(&pair.access_token).await.expect("Revoking twice should succeed.");
	}
}
