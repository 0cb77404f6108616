//! Bridge configuration, built programmatically or from the process environment.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Path (relative to the server URL) the upstream redirects the user agent back to.
pub const CALLBACK_PATH: &str = "/oauth/bb/callback";
/// Port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 3000;
/// Default bound on every upstream token request.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::seconds(10);

/// Public base URL of the bridge; also the token issuer.
pub const ENV_SERVER_URL: &str = "SERVER_URL";
/// Upstream OAuth consumer key.
pub const ENV_UPSTREAM_CLIENT_ID: &str = "BITBUCKET_CLIENT_ID";
/// Upstream OAuth consumer secret.
pub const ENV_UPSTREAM_CLIENT_SECRET: &str = "BITBUCKET_CLIENT_SECRET";
/// HS256 signing secret.
pub const ENV_SIGNING_SECRET: &str = "JWT_SECRET";
/// Listen port for the outer HTTP layer.
pub const ENV_PORT: &str = "PORT";

/// Settings shared by every bridge component.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
	/// Public base URL; used as the issuer and to derive the callback URL.
	pub server_url: Url,
	/// Upstream client identifier.
	pub upstream_client_id: String,
	/// Upstream client secret.
	pub upstream_client_secret: TokenSecret,
	/// Secret used to sign and verify bridge tokens.
	pub signing_secret: TokenSecret,
	/// Listen port for the outer HTTP layer.
	pub port: u16,
	/// Timeout applied to upstream token requests.
	pub upstream_timeout: Duration,
}
impl BridgeConfig {
	/// Builds a configuration with default port and timeout.
	pub fn new(
		server_url: Url,
		upstream_client_id: impl Into<String>,
		upstream_client_secret: impl Into<String>,
		signing_secret: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let upstream_client_id = upstream_client_id.into();
		let upstream_client_secret = TokenSecret::new(upstream_client_secret);
		let signing_secret = TokenSecret::new(signing_secret);

		if upstream_client_id.is_empty() {
			return Err(ConfigError::MissingEnv { name: ENV_UPSTREAM_CLIENT_ID });
		}
		if upstream_client_secret.is_empty() {
			return Err(ConfigError::EmptySecret { name: "upstream client" });
		}
		if signing_secret.is_empty() {
			return Err(ConfigError::EmptySecret { name: "signing" });
		}

		Ok(Self {
			server_url,
			upstream_client_id,
			upstream_client_secret,
			signing_secret,
			port: DEFAULT_PORT,
			upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
		})
	}

	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads the configuration through `lookup`, treating empty values as unset.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let required = |name: &'static str| {
			lookup(name).filter(|value| !value.is_empty()).ok_or(ConfigError::MissingEnv { name })
		};
		let server_url = required(ENV_SERVER_URL)?;
		let server_url = Url::parse(&server_url)
			.map_err(|source| ConfigError::InvalidUrl { name: ENV_SERVER_URL, source })?;
		let port = match lookup(ENV_PORT).filter(|value| !value.is_empty()) {
			Some(raw) => raw
				.parse::<u16>()
				.map_err(|_| ConfigError::InvalidEnv { name: ENV_PORT, value: raw.clone() })?,
			None => DEFAULT_PORT,
		};

		Ok(Self::new(
			server_url,
			required(ENV_UPSTREAM_CLIENT_ID)?,
			required(ENV_UPSTREAM_CLIENT_SECRET)?,
			required(ENV_SIGNING_SECRET)?,
		)?
		.with_port(port))
	}

	/// Overrides the listen port.
	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;

		self
	}

	/// Overrides the upstream request timeout.
	pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
		self.upstream_timeout = timeout;

		self
	}

	/// Issuer stamped into tokens: the server URL without a trailing slash.
	pub fn issuer(&self) -> String {
		self.server_url.as_str().trim_end_matches('/').to_owned()
	}

	/// Absolute callback URL registered with the upstream.
	pub fn callback_url(&self) -> Result<Url, ConfigError> {
		let raw = format!("{}{CALLBACK_PATH}", self.issuer());

		Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { name: "callback", source })
	}
}
