//! OAuth 2.0 mediating provider: downstream clients receive self-verifying bearer tokens while the
//! bridge privately holds, and transparently refreshes, their upstream Bitbucket credentials.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod registry;
pub mod session;
pub mod signer;
pub mod store;
pub mod upstream;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenSecret,
		config::BridgeConfig,
		flows::Bridge,
		http::ReqwestHttpClient,
		store::{MemorySessionStore, SessionStore},
		upstream::{UpstreamDescriptor, UpstreamTokens},
	};

	/// Bridge type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBridge = Bridge<ReqwestHttpClient>;

	/// Public base URL used as the issuer for test bridges.
	pub const TEST_SERVER_URL: &str = "https://bridge.example.com";
	/// Upstream client identifier configured on test bridges.
	pub const TEST_UPSTREAM_CLIENT_ID: &str = "bb-client";
	/// Upstream client secret configured on test bridges.
	pub const TEST_UPSTREAM_CLIENT_SECRET: &str = "bb-secret";
	/// Signing secret configured on test bridges.
	pub const TEST_SIGNING_SECRET: &str = "test-signing-secret-with-enough-entropy";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Configuration shared by every test bridge.
	pub fn test_config() -> BridgeConfig {
		BridgeConfig::new(
			Url::parse(TEST_SERVER_URL).expect("Test server URL should parse."),
			TEST_UPSTREAM_CLIENT_ID,
			TEST_UPSTREAM_CLIENT_SECRET,
			TEST_SIGNING_SECRET,
		)
		.expect("Test bridge configuration should be valid.")
	}

	/// Upstream descriptor pointing at a mock server's `/authorize` and `/token` routes.
	pub fn test_descriptor(authorize: &str, token: &str) -> UpstreamDescriptor {
		UpstreamDescriptor::builder()
			.authorization_endpoint(Url::parse(authorize).expect("Mock authorize URL should parse."))
			.token_endpoint(Url::parse(token).expect("Mock token URL should parse."))
			.build()
			.expect("Mock upstream descriptor should be valid.")
	}

	/// Constructs a [`Bridge`] backed by in-memory stores and the reqwest transport used across
	/// integration tests.
	pub fn build_reqwest_test_bridge(
		descriptor: UpstreamDescriptor,
	) -> (ReqwestTestBridge, Arc<MemorySessionStore>) {
		let store_backend = Arc::new(MemorySessionStore::default());
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let bridge = Bridge::with_http_client(&test_config(), descriptor, test_reqwest_http_client())
			.expect("Test bridge should build.")
			.with_session_store(store);

		(bridge, store_backend)
	}

	/// Upstream tokens expiring `expires_in` from now.
	pub fn upstream_tokens(access: &str, refresh: &str, expires_in: Duration) -> UpstreamTokens {
		UpstreamTokens {
			access_token: TokenSecret::new(access),
			refresh_token: TokenSecret::new(refresh),
			expires_in,
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
