//! Single-use, TTL-bounded registries correlating the legs of an authorization.
//!
//! Two registries share one implementation: pending authorizations keyed by the nonce sent
//! upstream as `state`, and code grants keyed by the downstream authorization code. An entry is
//! consumable iff it exists and `now - created_at <= ttl`. Expiry is lazy and authoritative; a
//! stale entry behaves as absent whether or not a sweep has evicted it yet.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	store::{GrantStore, MemoryGrantStore, Stamped},
	upstream::UpstreamTokens,
};

/// Lifetime of pending authorizations and authorization codes.
pub const PENDING_TTL: Duration = Duration::minutes(5);

/// Registry of authorizations awaiting the upstream callback, keyed by nonce.
pub type PendingRegistry = Registry<PendingAuthorization>;
/// Registry of issued downstream authorization codes, keyed by code.
pub type CodeRegistry = Registry<CodeGrant>;

/// Downstream request parked while the user authenticates upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAuthorization {
	/// Client that started the authorization.
	pub client_id: ClientId,
	/// Downstream redirect URI the code is delivered to.
	pub redirect_uri: Url,
	/// PKCE challenge supplied by the client.
	pub code_challenge: String,
	/// Opaque client state echoed back on the redirect.
	pub state: Option<String>,
}

/// Downstream authorization code together with the upstream credential it unlocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeGrant {
	/// Client the code was issued to.
	pub client_id: ClientId,
	/// Redirect URI the code was delivered to.
	pub redirect_uri: Url,
	/// PKCE challenge carried over from the pending authorization.
	pub code_challenge: String,
	/// Upstream tokens obtained on the callback.
	pub upstream: UpstreamTokens,
}

/// TTL-checked view over a [`GrantStore`].
pub struct Registry<V>
where
	V: 'static + Clone + Send + Sync,
{
	store: Arc<dyn GrantStore<V>>,
	ttl: Duration,
}
impl<V> Registry<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Creates a registry over `store` with [`PENDING_TTL`].
	pub fn new(store: Arc<dyn GrantStore<V>>) -> Self {
		Self { store, ttl: PENDING_TTL }
	}

	/// Creates a registry over a fresh in-memory store.
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryGrantStore::<V>::default()))
	}

	/// Overrides the entry lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Entry lifetime.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Stores `value` under `key`, created now.
	pub async fn put(&self, key: impl Into<String>, value: V) -> Result<()> {
		self.put_at(key, value, OffsetDateTime::now_utc()).await
	}

	/// Stores `value` under `key` as if created at `created_at`.
	pub async fn put_at(
		&self,
		key: impl Into<String>,
		value: V,
		created_at: OffsetDateTime,
	) -> Result<()> {
		self.store.put(key.into(), Stamped::new(value, created_at)).await?;

		Ok(())
	}

	/// Returns a copy of the live entry without consuming it.
	pub async fn peek(&self, key: &str) -> Result<Option<V>> {
		self.peek_at(key, OffsetDateTime::now_utc()).await
	}

	/// [`Registry::peek`] against an explicit clock.
	pub async fn peek_at(&self, key: &str, now: OffsetDateTime) -> Result<Option<V>> {
		let Some(entry) = self.store.get(key).await? else {
			return Ok(None);
		};

		Ok(entry.is_live_at(now, self.ttl).then_some(entry.value))
	}

	/// Removes and returns the live entry; at most one caller ever receives it.
	pub async fn consume(&self, key: &str) -> Result<Option<V>> {
		self.consume_at(key, OffsetDateTime::now_utc()).await
	}

	/// [`Registry::consume`] against an explicit clock.
	pub async fn consume_at(&self, key: &str, now: OffsetDateTime) -> Result<Option<V>> {
		let Some(entry) = self.store.take(key).await? else {
			return Ok(None);
		};

		Ok(entry.is_live_at(now, self.ttl).then_some(entry.value))
	}

	/// Evicts expired entries, returning how many were removed.
	pub async fn sweep(&self) -> Result<usize> {
		self.sweep_at(OffsetDateTime::now_utc()).await
	}

	/// [`Registry::sweep`] against an explicit clock.
	pub async fn sweep_at(&self, now: OffsetDateTime) -> Result<usize> {
		Ok(self.store.remove_created_before(now - self.ttl).await?)
	}
}
impl<V> Debug for Registry<V>
where
	V: 'static + Clone + Send + Sync,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Registry").field("ttl", &self.ttl).finish()
	}
}
