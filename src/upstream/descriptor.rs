//! Validated endpoint metadata for the upstream identity provider.

// self
use crate::{_prelude::*, error::ConfigError};

/// Bitbucket Cloud authorization endpoint.
pub const BITBUCKET_AUTHORIZATION_ENDPOINT: &str = "https://bitbucket.org/site/oauth2/authorize";
/// Bitbucket Cloud token endpoint.
pub const BITBUCKET_TOKEN_ENDPOINT: &str = "https://bitbucket.org/site/oauth2/access_token";

/// Endpoints the bridge talks to on the upstream provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamDescriptor {
	/// Authorization endpoint the user agent is sent to.
	pub authorization_endpoint: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token_endpoint: Url,
}
impl UpstreamDescriptor {
	/// Creates a new builder.
	pub fn builder() -> UpstreamDescriptorBuilder {
		UpstreamDescriptorBuilder::default()
	}

	/// Bitbucket Cloud preset.
	pub fn bitbucket() -> Result<Self, ConfigError> {
		let parse = |name, raw| Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source });

		Self::builder()
			.authorization_endpoint(parse("authorization endpoint", BITBUCKET_AUTHORIZATION_ENDPOINT)?)
			.token_endpoint(parse("token endpoint", BITBUCKET_TOKEN_ENDPOINT)?)
			.build()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("authorization", &self.authorization_endpoint)?;
		validate_endpoint("token", &self.token_endpoint)?;

		Ok(())
	}
}

/// Builder for [`UpstreamDescriptor`] values.
#[derive(Debug, Default)]
pub struct UpstreamDescriptorBuilder {
	/// Authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint.
	pub token_endpoint: Option<Url>,
}
impl UpstreamDescriptorBuilder {
	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<UpstreamDescriptor, ConfigError> {
		let authorization_endpoint = self
			.authorization_endpoint
			.ok_or(ConfigError::MissingEndpoint { endpoint: "authorization" })?;
		let token_endpoint =
			self.token_endpoint.ok_or(ConfigError::MissingEndpoint { endpoint: "token" })?;
		let descriptor = UpstreamDescriptor { authorization_endpoint, token_endpoint };

		descriptor.validate()?;

		Ok(descriptor)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
		Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
		None => false,
	}
}
