//! Adapter between the raw upstream callback request and [`Bridge::handle_upstream_callback`].
//!
//! Routing stays outside the crate; an HTTP layer parses the query into a [`CallbackQuery`],
//! calls [`Bridge::handle_callback`], and renders the [`CallbackResponse`] as-is.

// self
use crate::{_prelude::*, flows::Bridge, http::TokenHttpClient, obs};

/// Query parameters the upstream appends to the callback URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
	/// Upstream authorization code.
	pub code: Option<String>,
	/// Correlation nonce echoed as `state`.
	pub state: Option<String>,
	/// OAuth error code when the user denied access or the upstream failed.
	pub error: Option<String>,
	/// Human-readable error description.
	pub error_description: Option<String>,
}
impl CallbackQuery {
	/// Extracts the callback parameters from a full request URL; empty values count as absent.
	pub fn from_url(url: &Url) -> Self {
		let mut query = Self::default();

		for (key, value) in url.query_pairs() {
			if value.is_empty() {
				continue;
			}

			let slot = match key.as_ref() {
				"code" => &mut query.code,
				"state" => &mut query.state,
				"error" => &mut query.error,
				"error_description" => &mut query.error_description,
				_ => continue,
			};

			*slot = Some(value.into_owned());
		}

		query
	}
}

/// What the HTTP layer should answer the user agent with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackResponse {
	/// `302 Found` to the downstream redirect URI.
	Redirect {
		/// Downstream redirect carrying `code` (and `state`).
		location: Url,
	},
	/// Plain-text failure.
	Failure {
		/// HTTP status code.
		status: u16,
		/// Response body.
		body: String,
	},
}
impl CallbackResponse {
	/// HTTP status code of the response.
	pub fn status(&self) -> u16 {
		match self {
			Self::Redirect { .. } => 302,
			Self::Failure { status, .. } => *status,
		}
	}

	fn failure(status: u16, body: impl Into<String>) -> Self {
		Self::Failure { status, body: body.into() }
	}

	fn from_error(error: &Error) -> Self {
		let status = error.http_status();
		let body = match status {
			400..=499 => error.to_string(),
			502 => "Upstream token exchange failed.".into(),
			_ => "Internal error during upstream OAuth callback.".into(),
		};

		Self::failure(status, body)
	}
}

impl<C> Bridge<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Handles the upstream callback end to end.
	///
	/// Missing parameters or an unknown state answer `400`; an upstream exchange failure
	/// answers `502`; storage or configuration failures answer `500`. When the upstream reports
	/// an error, the nonce is spent on a best-effort basis and a storage failure is only logged.
	pub async fn handle_callback(&self, query: &CallbackQuery) -> CallbackResponse {
		if let Some(error) = &query.error {
			// Spend the nonce so the abandoned authorization cannot be resumed.
			let spent = match &query.state {
				Some(state) => self.pending().consume(state).await.map(|_| ()),
				None => Ok(()),
			};

			if let Err(e) = spent {
				obs::warn_flow(obs::FlowKind::Callback, &e);
			}

			let body = match &query.error_description {
				Some(description) =>
					format!("Upstream authorization failed: {error}: {description}."),
				None => format!("Upstream authorization failed: {error}."),
			};

			obs::warn_flow(obs::FlowKind::Callback, &body);

			return CallbackResponse::failure(400, body);
		}

		let (Some(code), Some(state)) = (&query.code, &query.state) else {
			return CallbackResponse::failure(400, "Missing code or state from upstream.");
		};

		match self.handle_upstream_callback(code, state).await {
			Ok(location) => CallbackResponse::Redirect { location },
			Err(e) => CallbackResponse::from_error(&e),
		}
	}
}
