//! Minting and verification of the bridge's self-contained HS256 bearer tokens.
//!
//! Tokens carry the session identifier as `sub`, the downstream client, the granted scopes,
//! an optional audience (the resource indicator), and a `typ` claim distinguishing access from
//! refresh tokens. Verification is an explicit claims step: the algorithm is pinned to HS256,
//! the issuer must equal the bridge's base URL, `exp`/`iss`/`sub` are required and checked with
//! zero leeway, and an audience is compared against the accepted set when one is configured.
//! A token that verifies says nothing about whether its session still exists.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind as JwtErrorKind,
};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, SessionId},
	error::ConfigError,
};

/// Distinguishes short-lived access tokens from long-lived refresh tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Bearer token presented on protected calls.
	Access,
	/// Token exchanged for a fresh pair at the token endpoint.
	Refresh,
}
impl TokenKind {
	/// Returns the claim value used for this kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Access => "access",
			TokenKind::Refresh => "refresh",
		}
	}

	/// Lifetime applied when minting a token of this kind.
	pub const fn ttl(self) -> Duration {
		match self {
			TokenKind::Access => Duration::hours(1),
			TokenKind::Refresh => Duration::hours(24),
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Claims recovered from a token that passed verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedToken {
	/// Session the token is bound to (`sub`).
	pub session_id: SessionId,
	/// Downstream client the token was issued to.
	pub client_id: ClientId,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Access or refresh.
	pub kind: TokenKind,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
	/// Audience (resource indicator), when one was bound at mint time.
	pub audience: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	iss: String,
	sub: String,
	client_id: String,
	scope: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	aud: Option<String>,
	iat: i64,
	exp: i64,
	typ: TokenKind,
}

/// Stateless token signer keyed by a single shared secret.
#[derive(Clone)]
pub struct Signer {
	issuer: String,
	encoding: EncodingKey,
	decoding: DecodingKey,
	accepted_audiences: Vec<String>,
}
impl Signer {
	const ALGORITHM: Algorithm = Algorithm::HS256;

	/// Creates a signer that stamps and expects `issuer` on every token.
	pub fn new(issuer: impl Into<String>, secret: &[u8]) -> Result<Self, ConfigError> {
		if secret.is_empty() {
			return Err(ConfigError::EmptySecret { name: "signing" });
		}

		Ok(Self {
			issuer: issuer.into(),
			encoding: EncodingKey::from_secret(secret),
			decoding: DecodingKey::from_secret(secret),
			accepted_audiences: Vec::new(),
		})
	}

	/// Restricts which audiences verification accepts.
	///
	/// With an empty set (the default) any audience is accepted; tokens without an audience are
	/// always accepted.
	pub fn with_accepted_audiences<I, S>(mut self, audiences: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.accepted_audiences = audiences.into_iter().map(Into::into).collect();

		self
	}

	/// Issuer stamped into every token.
	pub fn issuer(&self) -> &str {
		&self.issuer
	}

	/// Mints a token issued now.
	pub fn mint(
		&self,
		kind: TokenKind,
		session_id: &SessionId,
		client_id: &ClientId,
		scopes: &ScopeSet,
		audience: Option<&str>,
	) -> Result<String> {
		self.mint_at(kind, session_id, client_id, scopes, audience, OffsetDateTime::now_utc())
	}

	/// Mints a token as if issued at `issued_at`.
	pub fn mint_at(
		&self,
		kind: TokenKind,
		session_id: &SessionId,
		client_id: &ClientId,
		scopes: &ScopeSet,
		audience: Option<&str>,
		issued_at: OffsetDateTime,
	) -> Result<String> {
		let claims = Claims {
			iss: self.issuer.clone(),
			sub: session_id.to_string(),
			client_id: client_id.to_string(),
			scope: scopes.normalized(),
			aud: audience.map(str::to_owned),
			iat: issued_at.unix_timestamp(),
			exp: (issued_at + kind.ttl()).unix_timestamp(),
			typ: kind,
		};

		jsonwebtoken::encode(&Header::new(Self::ALGORITHM), &claims, &self.encoding)
			.map_err(|e| ConfigError::from(e).into())
	}

	/// Verifies signature, algorithm, issuer, expiry, and audience policy.
	pub fn verify(&self, token: &str) -> Result<VerifiedToken> {
		let mut validation = Validation::new(Self::ALGORITHM);

		validation.set_issuer(&[&self.issuer]);
		validation.set_required_spec_claims(&["exp", "iss", "sub"]);
		validation.leeway = 0;
		// Audience is checked below against the configured set.
		validation.validate_aud = false;

		let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
			.map_err(|e| Error::invalid_token(describe(e.kind())))?
			.claims;

		let audience_rejected = match claims.aud.as_deref() {
			Some(aud) =>
				!self.accepted_audiences.is_empty()
					&& !self.accepted_audiences.iter().any(|accepted| accepted == aud),
			None => false,
		};

		if audience_rejected {
			return Err(Error::invalid_token("audience not accepted"));
		}

		let session_id =
			SessionId::new(&claims.sub).map_err(|e| Error::invalid_token(e.to_string()))?;
		let client_id =
			ClientId::new(&claims.client_id).map_err(|e| Error::invalid_token(e.to_string()))?;
		let scopes =
			ScopeSet::from_str(&claims.scope).map_err(|e| Error::invalid_token(e.to_string()))?;
		let issued_at = timestamp(claims.iat)?;
		let expires_at = timestamp(claims.exp)?;

		Ok(VerifiedToken {
			session_id,
			client_id,
			scopes,
			kind: claims.typ,
			issued_at,
			expires_at,
			audience: claims.aud,
		})
	}

	/// Verifies the token and requires it to be of `kind`.
	pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<VerifiedToken> {
		let verified = self.verify(token)?;

		if verified.kind != kind {
			return Err(Error::invalid_token(format!("expected {kind} token, got {}", verified.kind)));
		}

		Ok(verified)
	}
}
impl Debug for Signer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Signer")
			.field("issuer", &self.issuer)
			.field("key", &"<redacted>")
			.field("accepted_audiences", &self.accepted_audiences)
			.finish()
	}
}

fn timestamp(value: i64) -> Result<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp(value)
		.map_err(|_| Error::invalid_token("timestamp out of range"))
}

fn describe(kind: &JwtErrorKind) -> String {
	match kind {
		JwtErrorKind::InvalidSignature => "signature mismatch".into(),
		JwtErrorKind::ExpiredSignature => "token expired".into(),
		JwtErrorKind::InvalidIssuer => "issuer mismatch".into(),
		JwtErrorKind::InvalidAlgorithm => "algorithm not allowed".into(),
		JwtErrorKind::MissingRequiredClaim(claim) => format!("missing `{claim}` claim"),
		_ => "malformed token".into(),
	}
}
