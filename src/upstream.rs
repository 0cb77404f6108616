//! Upstream OAuth client: authorization URLs plus code and refresh-token exchanges.
//!
//! Token requests are executed through an [`oauth2`] client over a pluggable
//! [`TokenHttpClient`] transport. Client credentials travel in an `Authorization: Basic`
//! header and every request body is form encoded. Any non-success answer, malformed body, or
//! transport failure (timeouts included) surfaces as
//! [`Error::UpstreamTokenExchangeFailed`]; nothing is retried.

pub mod descriptor;

pub use descriptor::*;

// crates.io
use oauth2::{
	AccessToken, AuthUrl, AuthorizationCode, Client, ClientId as OAuthClientId, ClientSecret,
	EndpointNotSet, EndpointSet, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError,
	Scope, StandardRevocableToken, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient, body_preview},
};

type ConfiguredClient = Client<
	BasicErrorResponse,
	UpstreamTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// Grants the bridge performs against the upstream token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Exchange of the upstream authorization code received on the callback.
	AuthorizationCode,
	/// Rotation of a session's upstream credential.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Upstream credential triple returned by a successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamTokens {
	/// Upstream bearer token.
	pub access_token: TokenSecret,
	/// Upstream refresh token.
	pub refresh_token: TokenSecret,
	/// Remaining lifetime reported by the upstream.
	pub expires_in: Duration,
}

/// Client for the upstream provider's authorization and token endpoints.
pub struct UpstreamClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	descriptor: UpstreamDescriptor,
	client_id: String,
}
impl<C> UpstreamClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a client that authenticates as `client_id`/`client_secret` and sends
	/// `callback_url` as the `redirect_uri` of code exchanges.
	pub fn new(
		descriptor: UpstreamDescriptor,
		client_id: impl Into<String>,
		client_secret: &TokenSecret,
		callback_url: &Url,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self, ConfigError> {
		let client_id = client_id.into();

		if client_secret.is_empty() {
			return Err(ConfigError::EmptySecret { name: "upstream client" });
		}

		let oauth_client: ConfiguredClient = Client::new(OAuthClientId::new(client_id.clone()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_auth_uri(AuthUrl::from_url(descriptor.authorization_endpoint.clone()))
			.set_token_uri(TokenUrl::from_url(descriptor.token_endpoint.clone()))
			.set_redirect_uri(RedirectUrl::from_url(callback_url.clone()));

		Ok(Self { oauth_client, http_client: http_client.into(), descriptor, client_id })
	}

	/// Endpoints this client talks to.
	pub fn descriptor(&self) -> &UpstreamDescriptor {
		&self.descriptor
	}

	/// Builds the URL the user agent is sent to, carrying `correlation` as the `state`.
	pub fn authorization_url(&self, callback: &Url, correlation: &str) -> Url {
		let mut url = self.descriptor.authorization_endpoint.clone();

		url.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", &self.client_id)
			.append_pair("redirect_uri", callback.as_str())
			.append_pair("state", correlation);

		url
	}

	/// Exchanges the authorization code delivered to the callback for upstream tokens.
	pub async fn exchange_code(&self, code: &str) -> Result<UpstreamTokens> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|e| map_request_error(GrantType::AuthorizationCode, meta.take(), e))?;
		let refresh_token = response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned()))
			.ok_or(ConfigError::MissingRefreshToken)?;

		Ok(UpstreamTokens {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			refresh_token,
			expires_in: expires_in(&response)?,
		})
	}

	/// Redeems `refresh_token` for a fresh credential.
	///
	/// When the upstream does not rotate the refresh token, the presented one is carried over.
	pub async fn refresh(&self, refresh_token: &TokenSecret) -> Result<UpstreamTokens> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&secret)
			.request_async(&instrumented)
			.await
			.map_err(|e| map_request_error(GrantType::RefreshToken, meta.take(), e))?;
		let rotated = response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned()))
			.unwrap_or_else(|| refresh_token.clone());

		Ok(UpstreamTokens {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			refresh_token: rotated,
			expires_in: expires_in(&response)?,
		})
	}
}
impl<C> Debug for UpstreamClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UpstreamClient")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.finish()
	}
}

/// Token endpoint body. Bitbucket-style answers without `token_type` are read as bearer tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct UpstreamTokenResponse {
	access_token: AccessToken,
	#[serde(default = "bearer")]
	token_type: BasicTokenType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	expires_in: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<RefreshToken>,
}
impl TokenResponse for UpstreamTokenResponse {
	type TokenType = BasicTokenType;

	fn access_token(&self) -> &AccessToken {
		&self.access_token
	}

	fn token_type(&self) -> &Self::TokenType {
		&self.token_type
	}

	fn expires_in(&self) -> Option<std::time::Duration> {
		self.expires_in.map(std::time::Duration::from_secs)
	}

	fn refresh_token(&self) -> Option<&RefreshToken> {
		self.refresh_token.as_ref()
	}

	fn scopes(&self) -> Option<&Vec<Scope>> {
		None
	}
}

fn bearer() -> BasicTokenType {
	BasicTokenType::Bearer
}

fn expires_in(response: &UpstreamTokenResponse) -> Result<Duration> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let expires_in = Duration::seconds(expires_in);

	// The expiry instant must be representable when the session record is built.
	if OffsetDateTime::now_utc().checked_add(expires_in).is_none() {
		return Err(ConfigError::ExpiresInOutOfRange.into());
	}

	Ok(expires_in)
}

fn map_request_error<E>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.as_ref().and_then(|m| m.status);
	let preview = meta.and_then(|m| m.body_preview);
	let body = match err {
		RequestTokenError::ServerResponse(response) => preview.unwrap_or_else(|| {
			serde_json::to_string(&response).unwrap_or_else(|_| response.to_string())
		}),
		RequestTokenError::Request(error) => error_chain(&error),
		RequestTokenError::Parse(error, body) if body.is_empty() => error.to_string(),
		RequestTokenError::Parse(_, body) => preview.unwrap_or_else(|| body_preview(&body)),
		RequestTokenError::Other(message) => preview.unwrap_or(message),
	};

	Error::UpstreamTokenExchangeFailed { grant, status, body }
}

fn error_chain(err: &dyn StdError) -> String {
	let mut buf = err.to_string();
	let mut source = err.source();

	while let Some(inner) = source {
		buf.push_str(": ");
		buf.push_str(&inner.to_string());

		source = inner.source();
	}

	buf
}
