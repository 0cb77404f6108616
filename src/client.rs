//! In-memory dynamic client registration.

// self
use crate::{_prelude::*, auth::ClientId};

/// Metadata a client submits when registering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
	/// Redirect URIs the client may receive codes on.
	#[serde(default)]
	pub redirect_uris: Vec<Url>,
	/// Human-readable client name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_name: Option<String>,
	/// Any further registration fields, kept verbatim.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl ClientMetadata {
	/// Metadata with a single redirect URI.
	pub fn with_redirect_uri(redirect_uri: Url) -> Self {
		Self { redirect_uris: vec![redirect_uri], ..Default::default() }
	}

	/// Sets the client name.
	pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
		self.client_name = Some(name.into());

		self
	}
}

/// A registered client as returned by registration and lookups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientInformation {
	/// Identifier assigned at registration.
	pub client_id: ClientId,
	/// Registration instant, serialized as Unix seconds.
	#[serde(with = "time::serde::timestamp")]
	pub client_id_issued_at: OffsetDateTime,
	/// Submitted metadata.
	#[serde(flatten)]
	pub metadata: ClientMetadata,
}
impl ClientInformation {
	/// Returns `true` when `redirect_uri` exactly matches a registered URI.
	pub fn allows_redirect(&self, redirect_uri: &Url) -> bool {
		self.metadata.redirect_uris.iter().any(|registered| registered == redirect_uri)
	}
}

/// Thread-safe registry of dynamically registered clients.
#[derive(Clone, Debug, Default)]
pub struct ClientRegistry(Arc<RwLock<HashMap<ClientId, ClientInformation>>>);
impl ClientRegistry {
	/// Registers a client under a freshly generated identifier.
	pub fn register(&self, metadata: ClientMetadata) -> ClientInformation {
		let information = ClientInformation {
			client_id: ClientId::generate(),
			client_id_issued_at: OffsetDateTime::now_utc(),
			metadata,
		};

		self.0.write().insert(information.client_id.clone(), information.clone());

		information
	}

	/// Looks up a registered client.
	pub fn get(&self, client_id: &str) -> Option<ClientInformation> {
		self.0.read().get(client_id).cloned()
	}

	/// Number of registered clients.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no client is registered.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn redirect() -> Url {
		Url::parse("https://client.example.com/callback").expect("Redirect fixture should parse.")
	}

	#[test]
	fn registration_assigns_identifier_and_is_retrievable() {
		let registry = ClientRegistry::default();
		let info = registry
			.register(ClientMetadata::with_redirect_uri(redirect()).with_client_name("cli"));
		let fetched = registry.get(info.client_id.as_str()).expect("Client should be registered.");

		assert_eq!(fetched, info);
		assert_eq!(info.client_id.len(), 32);
		assert!(registry.get("unknown").is_none());
	}

	#[test]
	fn redirects_must_match_exactly() {
		let registry = ClientRegistry::default();
		let info = registry.register(ClientMetadata::with_redirect_uri(redirect()));
		let other = Url::parse("https://client.example.com/callback?x=1")
			.expect("Redirect fixture should parse.");

		assert!(info.allows_redirect(&redirect()));
		assert!(!info.allows_redirect(&other));
	}

	#[test]
	fn metadata_round_trips_unknown_fields() {
		let json = r#"{
			"client_id": "abc",
			"client_id_issued_at": 1700000000,
			"redirect_uris": ["https://client.example.com/callback"],
			"client_name": "cli",
			"token_endpoint_auth_method": "none"
		}"#;
		let info: ClientInformation =
			serde_json::from_str(json).expect("Client information should deserialize.");

		assert_eq!(info.client_id.as_str(), "abc");
		assert_eq!(info.client_id_issued_at.unix_timestamp(), 1_700_000_000);
		assert_eq!(
			info.metadata.extra.get("token_endpoint_auth_method"),
			Some(&serde_json::Value::String("none".into()))
		);
	}
}
