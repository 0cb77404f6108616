//! Bridge-level error types shared across flows, registries, sessions, and stores.

// self
use crate::{_prelude::*, upstream::GrantType};

/// Bridge-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical bridge error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The correlation nonce carried in the upstream `state` is missing or expired.
	#[error("Unknown or expired authorization state.")]
	UnknownOrExpiredState,
	/// The downstream authorization code is missing, expired, or already used.
	#[error("Unknown or expired authorization code.")]
	UnknownOrExpiredCode,
	/// A signed token failed signature, algorithm, issuer, audience, expiry, or kind checks.
	#[error("Invalid token: {reason}.")]
	InvalidToken {
		/// Short description of the failed check.
		reason: String,
	},
	/// The session was revoked or never existed.
	#[error("Session not found.")]
	SessionNotFound,
	/// The upstream token endpoint rejected a code or refresh exchange, or could not be reached.
	#[error("Upstream {grant} exchange failed ({}): {body}.", status_label(.status))]
	UpstreamTokenExchangeFailed {
		/// Grant that was being exchanged.
		grant: GrantType,
		/// HTTP status returned by the upstream, when a response was received.
		status: Option<u16>,
		/// Response body (truncated) or transport diagnostic.
		body: String,
	},
	/// A refresh requested a scope outside the session's granted scopes.
	#[error("Scope `{scope}` was not granted to this session.")]
	InvalidScope {
		/// Offending scope value.
		scope: String,
	},
	/// The requested redirect URI is not registered for the client.
	#[error("Redirect URI `{uri}` is not registered for this client.")]
	InvalidRedirectUri {
		/// Offending redirect URI.
		uri: String,
	},
	/// The downstream grant failed a proof check (e.g., PKCE verifier mismatch).
	#[error("Authorization grant rejected: {reason}.")]
	InvalidGrant {
		/// Bridge-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// HTTP status an outer routing layer should answer with for this error.
	///
	/// Client and correlation problems map to 4xx. Upstream failures, unusable upstream token
	/// responses included, map to 502. Local storage and configuration failures map to 500.
	pub fn http_status(&self) -> u16 {
		match self {
			Self::UnknownOrExpiredState
			| Self::UnknownOrExpiredCode
			| Self::InvalidScope { .. }
			| Self::InvalidRedirectUri { .. }
			| Self::InvalidGrant { .. } => 400,
			Self::InvalidToken { .. } | Self::SessionNotFound => 401,
			Self::UpstreamTokenExchangeFailed { .. } => 502,
			Self::Config(e) if e.is_upstream_response() => 502,
			Self::Storage(_) | Self::Config(_) => 500,
		}
	}

	/// Returns `true` when the caller (not the bridge or upstream) is at fault.
	pub fn is_client_error(&self) -> bool {
		(400..500).contains(&self.http_status())
	}

	pub(crate) fn invalid_token(reason: impl Into<String>) -> Self {
		Self::InvalidToken { reason: reason.into() }
	}
}

/// Configuration and validation failures raised by the bridge.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required environment variable is unset or empty.
	#[error("Missing required environment variable: {name}.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds a value that cannot be parsed.
	#[error("Environment variable {name} holds an invalid value: {value}.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Raw value that failed to parse.
		value: String,
	},
	/// A configured URL cannot be parsed.
	#[error("The {name} URL is invalid.")]
	InvalidUrl {
		/// Which URL failed to parse.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Upstream endpoints must use HTTPS (plain HTTP is tolerated on loopback hosts only).
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// An upstream endpoint was not supplied to the descriptor builder.
	#[error("Missing {endpoint} endpoint.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		endpoint: &'static str,
	},
	/// A secret was configured as an empty string.
	#[error("The {name} secret cannot be empty.")]
	EmptySecret {
		/// Which secret is empty.
		name: &'static str,
	},
	/// Signed token could not be encoded.
	#[error("Unable to sign token.")]
	Signing(#[from] jsonwebtoken::errors::Error),
	/// Scope values cannot be normalized.
	#[error("Scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Upstream authorization-code response omitted the refresh token.
	#[error("Upstream token response is missing a refresh token.")]
	MissingRefreshToken,
	/// Token endpoint response omitted `expires_in`.
	#[error("Upstream token response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Returns `true` when the upstream answered with a token response the bridge cannot use.
	pub fn is_upstream_response(&self) -> bool {
		matches!(
			self,
			Self::MissingRefreshToken
				| Self::MissingExpiresIn
				| Self::ExpiresInOutOfRange
				| Self::NonPositiveExpiresIn
		)
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

fn status_label(status: &Option<u16>) -> String {
	match status {
		Some(code) => format!("status {code}"),
		None => "no response".into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn upstream_failure_reports_status_and_body() {
		let err = Error::UpstreamTokenExchangeFailed {
			grant: GrantType::RefreshToken,
			status: Some(400),
			body: "{\"error\":\"invalid_grant\"}".into(),
		};

		assert_eq!(
			err.to_string(),
			"Upstream refresh_token exchange failed (status 400): {\"error\":\"invalid_grant\"}."
		);
		assert_eq!(err.http_status(), 502);
		assert!(!err.is_client_error());

		let timeout = Error::UpstreamTokenExchangeFailed {
			grant: GrantType::AuthorizationCode,
			status: None,
			body: "operation timed out".into(),
		};

		assert!(timeout.to_string().contains("no response"));
	}

	#[test]
	fn correlation_failures_are_client_errors() {
		assert_eq!(Error::UnknownOrExpiredState.http_status(), 400);
		assert_eq!(Error::UnknownOrExpiredCode.http_status(), 400);
		assert_eq!(Error::SessionNotFound.http_status(), 401);
		assert!(Error::invalid_token("expired").is_client_error());
		assert_eq!(Error::from(ConfigError::MissingRefreshToken).http_status(), 502);
		assert_eq!(Error::from(ConfigError::ExpiresInOutOfRange).http_status(), 502);
		assert_eq!(Error::from(ConfigError::MissingEnv { name: "JWT_SECRET" }).http_status(), 500);
	}
}
