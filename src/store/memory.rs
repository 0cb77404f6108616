//! Thread-safe in-memory store implementations for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	auth::SessionId,
	session::SessionRecord,
	store::{GrantStore, SessionStore, Stamped, StoreError, StoreFuture},
};

type GrantMap<V> = Arc<RwLock<HashMap<String, Stamped<V>>>>;
type SessionMap = Arc<RwLock<HashMap<SessionId, SessionRecord>>>;

/// In-process [`GrantStore`] backed by a hash map under a read-write lock.
pub struct MemoryGrantStore<V>(GrantMap<V>);
impl<V> MemoryGrantStore<V> {
	/// Number of entries currently held, expired ones included.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when the store holds no entries.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn take_now(map: GrantMap<V>, key: &str) -> Option<Stamped<V>> {
		map.write().remove(key)
	}

	fn sweep_now(map: GrantMap<V>, cutoff: OffsetDateTime) -> usize {
		let mut guard = map.write();
		let before = guard.len();

		guard.retain(|_, entry| entry.created_at >= cutoff);

		before - guard.len()
	}
}
impl<V> Default for MemoryGrantStore<V> {
	fn default() -> Self {
		Self(Default::default())
	}
}
impl<V> Clone for MemoryGrantStore<V> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}
impl<V> Debug for MemoryGrantStore<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryGrantStore").field("len", &self.len()).finish()
	}
}
impl<V> GrantStore<V> for MemoryGrantStore<V>
where
	V: 'static + Clone + Send + Sync,
{
	fn put(&self, key: String, entry: Stamped<V>) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key, entry);

			Ok(())
		})
	}

	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Stamped<V>>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Stamped<V>>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::take_now(map, key)) })
	}

	fn remove_created_before(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, usize> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::sweep_now(map, cutoff)) })
	}
}

/// In-process [`SessionStore`] backed by a hash map under a read-write lock.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore(SessionMap);
impl MemorySessionStore {
	/// Number of live sessions.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no session is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn replace_now(map: SessionMap, id: &SessionId, record: SessionRecord) -> bool {
		let mut guard = map.write();

		match guard.get_mut(id) {
			Some(slot) => {
				*slot = record;

				true
			},
			None => false,
		}
	}
}
impl SessionStore for MemorySessionStore {
	fn insert(&self, id: SessionId, record: SessionRecord) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			let mut guard = map.write();

			if guard.contains_key(&id) {
				return Err(StoreError::Backend { message: format!("session {id} already exists") });
			}

			guard.insert(id, record);

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<SessionRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(id).cloned()) })
	}

	fn replace<'a>(&'a self, id: &'a SessionId, record: SessionRecord) -> StoreFuture<'a, bool> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::replace_now(map, id, record)) })
	}

	fn remove<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<SessionRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(id)) })
	}
}
