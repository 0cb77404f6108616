//! Server-side sessions holding the live upstream credential behind each signed token pair.
//!
//! A session is the only mutable entity in the bridge. Its three token fields are replaced in
//! place whenever [`SessionManager::live_upstream_access_token`] finds the credential inside the
//! refresh skew window. Refreshes are serialized per session through a singleflight guard, so
//! concurrent callers observe exactly one upstream call and the same resulting token.

mod metrics;

pub use metrics::*;

// self
use crate::{
	_prelude::*,
	auth::{SessionId, TokenSecret},
	error::ConfigError,
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{MemorySessionStore, SessionStore},
	upstream::{UpstreamClient, UpstreamTokens},
};

/// Window before upstream expiry inside which a lookup refreshes the credential first.
pub const REFRESH_SKEW: Duration = Duration::seconds(60);

/// Stored upstream credential for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
	/// Current upstream access token.
	pub access_token: TokenSecret,
	/// Current upstream refresh token.
	pub refresh_token: TokenSecret,
	/// Instant the upstream access token expires.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl SessionRecord {
	/// Builds a record from an upstream exchange performed at `now`.
	///
	/// Fails with [`ConfigError::ExpiresInOutOfRange`] when `now + expires_in` is not
	/// representable.
	pub fn from_upstream(tokens: UpstreamTokens, now: OffsetDateTime) -> Result<Self, ConfigError> {
		let expires_at =
			now.checked_add(tokens.expires_in).ok_or(ConfigError::ExpiresInOutOfRange)?;

		Ok(Self { access_token: tokens.access_token, refresh_token: tokens.refresh_token, expires_at })
	}

	/// Returns `true` when fewer than `skew` remain before expiry at `now`.
	pub fn needs_refresh_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		self.expires_at - now < skew
	}
}

/// Owns the session store and keeps upstream credentials fresh.
pub struct SessionManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	store: Arc<dyn SessionStore>,
	upstream: Arc<UpstreamClient<C>>,
	refresh_skew: Duration,
	metrics: Arc<RefreshMetrics>,
	guards: Arc<Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>>,
}
impl<C> SessionManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a manager over an in-memory store.
	pub fn new(upstream: Arc<UpstreamClient<C>>) -> Self {
		Self {
			store: Arc::new(MemorySessionStore::default()),
			upstream,
			refresh_skew: REFRESH_SKEW,
			metrics: Default::default(),
			guards: Default::default(),
		}
	}

	/// Replaces the session backend.
	pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
		self.store = store;

		self
	}

	/// Overrides the refresh skew window (defaults to [`REFRESH_SKEW`]).
	pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
		self.refresh_skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	/// Refresh counters shared by every lookup.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Stores a fresh session for `tokens` and returns its identifier.
	pub async fn create(&self, tokens: UpstreamTokens) -> Result<SessionId> {
		let id = SessionId::generate();
		let record = SessionRecord::from_upstream(tokens, OffsetDateTime::now_utc())?;

		self.store.insert(id.clone(), record).await?;

		Ok(id)
	}

	/// Deletes the session; returns `true` if it existed.
	pub async fn delete(&self, id: &SessionId) -> Result<bool> {
		let removed = self.store.remove(id).await?;

		self.guards.lock().remove(id);

		Ok(removed.is_some())
	}

	/// Returns `true` while the session exists.
	pub async fn exists(&self, id: &SessionId) -> Result<bool> {
		Ok(self.store.fetch(id).await?.is_some())
	}

	/// Fetches the stored record.
	pub async fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
		Ok(self.store.fetch(id).await?)
	}

	/// Returns an upstream access token valid for at least the refresh skew, refreshing the
	/// session first when needed.
	///
	/// Fails with [`Error::SessionNotFound`] when the session does not exist, including when it
	/// is deleted while a refresh is in flight (the refreshed credential is then discarded).
	pub async fn live_upstream_access_token(&self, id: &SessionId) -> Result<TokenSecret> {
		let record = self.store.fetch(id).await?.ok_or(Error::SessionNotFound)?;

		if !record.needs_refresh_at(OffsetDateTime::now_utc(), self.refresh_skew) {
			return Ok(record.access_token);
		}

		let span = FlowSpan::new(FlowKind::UpstreamRefresh, "live_upstream_access_token");

		span.instrument(async move {
			let guard = self.guard(id);
			let _lock = guard.lock().await;
			// Another caller may have refreshed while this one waited on the guard.
			let current = self.store.fetch(id).await?.ok_or(Error::SessionNotFound)?;

			if !current.needs_refresh_at(OffsetDateTime::now_utc(), self.refresh_skew) {
				return Ok(current.access_token);
			}

			obs::record_flow_outcome(FlowKind::UpstreamRefresh, FlowOutcome::Attempt);
			self.metrics.record_attempt();

			let result = self.refresh_locked(id, &current).await;

			match &result {
				Ok(_) => self.metrics.record_success(),
				Err(_) => self.metrics.record_failure(),
			}

			obs::observe(FlowKind::UpstreamRefresh, result)
		})
		.await
	}

	async fn refresh_locked(&self, id: &SessionId, current: &SessionRecord) -> Result<TokenSecret> {
		let tokens = self.upstream.refresh(&current.refresh_token).await?;
		let next = SessionRecord::from_upstream(tokens, OffsetDateTime::now_utc())?;
		let access_token = next.access_token.clone();

		if !self.store.replace(id, next).await? {
			return Err(Error::SessionNotFound);
		}

		Ok(access_token)
	}

	fn guard(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl<C> Debug for SessionManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("refresh_skew", &self.refresh_skew)
			.field("metrics", &self.metrics)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn tokens(expires_in: Duration) -> UpstreamTokens {
		UpstreamTokens {
			access_token: TokenSecret::new("bb-access"),
			refresh_token: TokenSecret::new("bb-refresh"),
			expires_in,
		}
	}

	#[test]
	fn record_expiry_is_relative_to_exchange_time() {
		let now = OffsetDateTime::UNIX_EPOCH + Duration::days(1);
		let record = SessionRecord::from_upstream(tokens(Duration::hours(2)), now)
			.expect("Two hours should be representable.");

		assert_eq!(record.expires_at, now + Duration::hours(2));
	}

	#[test]
	fn skew_window_is_exclusive_at_the_boundary() {
		let now = OffsetDateTime::UNIX_EPOCH;
		let record =
			SessionRecord::from_upstream(tokens(REFRESH_SKEW), now).expect("Skew should fit.");

		assert!(!record.needs_refresh_at(now, REFRESH_SKEW));
		assert!(record.needs_refresh_at(now + Duration::seconds(1), REFRESH_SKEW));

		let nearly_expired = SessionRecord::from_upstream(tokens(Duration::seconds(30)), now)
			.expect("Thirty seconds should fit.");

		assert!(nearly_expired.needs_refresh_at(now, REFRESH_SKEW));
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let record =
			SessionRecord::from_upstream(tokens(Duration::hours(1)), OffsetDateTime::UNIX_EPOCH)
				.expect("One hour should fit.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("bb-access"));
		assert!(!rendered.contains("bb-refresh"));
	}

	#[test]
	fn unrepresentable_expiry_is_a_typed_failure() {
		let result = SessionRecord::from_upstream(
			tokens(Duration::seconds(100_000_000_000_000)),
			OffsetDateTime::now_utc(),
		);

		assert!(matches!(result, Err(ConfigError::ExpiresInOutOfRange)));
	}
}
