//! Shared helpers for flow implementations (PKCE proofs, redirect construction).

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::AuthCode};

/// Computes the RFC 7636 `S256` challenge for `verifier`.
pub fn pkce_s256_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Returns `true` when `verifier` proves possession of `challenge` under `S256`.
pub fn pkce_verifier_matches(verifier: &str, challenge: &str) -> bool {
	pkce_s256_challenge(verifier) == challenge
}

/// Appends the downstream `code` (and the client's `state`, when present) to its redirect URI.
pub(crate) fn redirect_with_code(redirect_uri: &Url, code: &AuthCode, state: Option<&str>) -> Url {
	let mut url = redirect_uri.clone();

	{
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("code", code.as_str());

		if let Some(state) = state {
			pairs.append_pair("state", state);
		}
	}

	url
}
