//! Storage contracts and in-memory implementations for correlation records and sessions.
//!
//! The bridge's state machine depends only on these traits, so deployments can substitute
//! their own backends. Futures are boxed to keep the traits object safe.

pub mod memory;

pub use memory::*;

// self
use crate::{_prelude::*, auth::SessionId, session::SessionRecord};

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key-value backend for single-use, TTL-bounded grants (pending authorizations and
/// authorization codes).
///
/// Implementations never interpret the TTL themselves; callers compare
/// [`Stamped::created_at`] against their own clock. `take` must be an atomic get-and-delete so
/// a key is handed out at most once under concurrency.
pub trait GrantStore<V>
where
	Self: Send + Sync,
	V: 'static + Clone + Send + Sync,
{
	/// Inserts or replaces the entry under `key`.
	fn put(&self, key: String, entry: Stamped<V>) -> StoreFuture<'_, ()>;

	/// Returns a copy of the entry under `key` without removing it.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Stamped<V>>>;

	/// Removes and returns the entry under `key`.
	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Stamped<V>>>;

	/// Removes every entry created strictly before `cutoff`, returning how many were dropped.
	fn remove_created_before(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Backend for live sessions keyed by [`SessionId`].
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Stores a new session record.
	fn insert(&self, id: SessionId, record: SessionRecord) -> StoreFuture<'_, ()>;

	/// Fetches the record for `id`, if present.
	fn fetch<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<SessionRecord>>;

	/// Overwrites the record for `id` only if the session still exists.
	///
	/// Returns `false` (and stores nothing) when the session was deleted in the meantime.
	fn replace<'a>(&'a self, id: &'a SessionId, record: SessionRecord) -> StoreFuture<'a, bool>;

	/// Deletes the session, returning the removed record.
	fn remove<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<SessionRecord>>;
}

/// Error type produced by [`GrantStore`] and [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures (e.g., serde) surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// A stored value together with its creation instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stamped<V> {
	/// Stored payload.
	pub value: V,
	/// Instant the entry was created.
	pub created_at: OffsetDateTime,
}
impl<V> Stamped<V> {
	/// Wraps `value` with its creation instant.
	pub fn new(value: V, created_at: OffsetDateTime) -> Self {
		Self { value, created_at }
	}

	/// Returns `true` while `now - created_at <= ttl`.
	pub fn is_live_at(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.created_at <= ttl
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_bridge_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let bridge_error: Error = store_error.clone().into();

		assert!(matches!(bridge_error, Error::Storage(_)));
		assert!(bridge_error.to_string().contains("database unreachable"));
		assert_eq!(bridge_error.http_status(), 500);

		let source = StdError::source(&bridge_error)
			.expect("Bridge error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn stamped_liveness_is_inclusive_of_the_ttl_boundary() {
		let created = OffsetDateTime::UNIX_EPOCH;
		let entry = Stamped::new("value", created);
		let ttl = Duration::minutes(5);

		assert!(entry.is_live_at(created, ttl));
		assert!(entry.is_live_at(created + ttl, ttl));
		assert!(!entry.is_live_at(created + ttl + Duration::seconds(1), ttl));
	}
}
