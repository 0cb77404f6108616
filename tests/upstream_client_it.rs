#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_bridge::{
	_preludet::*,
	auth::TokenSecret,
	error::ConfigError,
	http::ReqwestHttpClient,
	upstream::{GrantType, UpstreamClient, UpstreamDescriptor},
};

const BASIC_AUTH: &str = "Basic YmItY2xpZW50OmJiLXNlY3JldA==";
const UPSTREAM_CALLBACK: &str = "https://bridge.example.com/oauth/bb/callback";

fn upstream_client(descriptor: UpstreamDescriptor) -> UpstreamClient<ReqwestHttpClient> {
	let callback = test_config().callback_url().expect("Callback URL should build.");

	UpstreamClient::new(
		descriptor,
		TEST_UPSTREAM_CLIENT_ID,
		&TokenSecret::new(TEST_UPSTREAM_CLIENT_SECRET),
		&callback,
		test_reqwest_http_client(),
	)
	.expect("Upstream client should build.")
}

#[tokio::test]
async fn code_exchange_authenticates_with_basic_credentials() {
	let server = MockServer::start_async().await;
	let client = upstream_client(test_descriptor(&server.url("/authorize"), &server.url("/token")));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("authorization", BASIC_AUTH)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", "bb-code")
				.form_urlencoded_tuple("redirect_uri", UPSTREAM_CALLBACK);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"bb-access\",\"refresh_token\":\"bb-refresh\",\"token_type\":\"bearer\",\"expires_in\":7200,\"scopes\":\"repository\"}",
			);
		})
		.await;
	let tokens = client.exchange_code("bb-code").await.expect("Code exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(tokens, upstream_tokens("bb-access", "bb-refresh", Duration::hours(2)));
}

#[tokio::test]
async fn code_exchange_without_refresh_token_is_rejected() {
	let server = MockServer::start_async().await;
	let client = upstream_client(test_descriptor(&server.url("/authorize"), &server.url("/token")));
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"bb-access\",\"token_type\":\"bearer\",\"expires_in\":7200}");
		})
		.await;
	let err = client.exchange_code("bb-code").await.expect_err("Missing refresh token should fail.");

	assert!(matches!(err, Error::Config(ConfigError::MissingRefreshToken)));
}

#[tokio::test]
async fn refresh_rotates_when_the_upstream_returns_a_new_refresh_token() {
	let server = MockServer::start_async().await;
	let client = upstream_client(test_descriptor(&server.url("/authorize"), &server.url("/token")));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("authorization", BASIC_AUTH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "bb-refresh");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"bb-next\",\"refresh_token\":\"bb-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let tokens = client
		.refresh(&TokenSecret::new("bb-refresh"))
		.await
		.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(tokens, upstream_tokens("bb-next", "bb-refresh-2", Duration::hours(1)));
}

#[tokio::test]
async fn responses_without_token_type_are_accepted() {
	let server = MockServer::start_async().await;
	let client = upstream_client(test_descriptor(&server.url("/authorize"), &server.url("/token")));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"bb-access\",\"refresh_token\":\"bb-refresh\",\"expires_in\":3600}");
		})
		.await;
	let tokens = client
		.refresh(&TokenSecret::new("bb-refresh"))
		.await
		.expect("A response without token_type should be accepted.");

	mock.assert_async().await;

	assert_eq!(tokens, upstream_tokens("bb-access", "bb-refresh", Duration::hours(1)));
}

#[tokio::test]
async fn non_json_failures_keep_a_bounded_body_preview() {
	let server = MockServer::start_async().await;
	let client = upstream_client(test_descriptor(&server.url("/authorize"), &server.url("/token")));
	let page = format!("<html>{}</html>", "x".repeat(2_048));
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503).header("content-type", "text/html").body(page.clone());
		})
		.await;
	let err = client
		.refresh(&TokenSecret::new("bb-refresh"))
		.await
		.expect_err("Upstream outage should fail the refresh.");

	match err {
		Error::UpstreamTokenExchangeFailed { grant, status, body } => {
			assert_eq!(grant, GrantType::RefreshToken);
			assert_eq!(status, Some(503));
			assert!(body.starts_with("<html>"));
			assert!(body.chars().count() < page.len());
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn unreachable_upstream_reports_no_status() {
	let client =
		upstream_client(test_descriptor("http://127.0.0.1:9/authorize", "http://127.0.0.1:9/token"));
	let err = client.exchange_code("bb-code").await.expect_err("Connection failure should surface.");

	match err {
		Error::UpstreamTokenExchangeFailed { grant, status, body } => {
			assert_eq!(grant, GrantType::AuthorizationCode);
			assert_eq!(status, None);
			assert!(!body.is_empty());
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}
