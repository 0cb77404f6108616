#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_bridge::{_preludet::*, error::ConfigError, store::SessionStore, upstream::GrantType};

const BASIC_AUTH: &str = "Basic YmItY2xpZW50OmJiLXNlY3JldA==";

async fn mock_refresh<'a>(server: &'a MockServer, body: &'static str) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("authorization", BASIC_AUTH)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "bb-refresh");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await
}

#[tokio::test]
async fn fresh_sessions_are_served_without_upstream_calls() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.url("/authorize"), &server.url("/token"));
	let (bridge, _) = build_reqwest_test_bridge(descriptor);
	let mock = mock_refresh(
		&server,
		"{\"access_token\":\"bb-next\",\"token_type\":\"bearer\",\"expires_in\":7200}",
	)
	.await;
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::hours(2)))
		.await
		.expect("Session should be created.");
	let token = bridge
		.sessions()
		.live_upstream_access_token(&session_id)
		.await
		.expect("Fresh session should yield its access token.");

	assert_eq!(token.expose(), "bb-access");
	assert_eq!(bridge.sessions().metrics().attempts(), 0);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expiring_sessions_refresh_and_persist_the_new_credential() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.url("/authorize"), &server.url("/token"));
	let (bridge, sessions) = build_reqwest_test_bridge(descriptor);
	let mock = mock_refresh(
		&server,
		"{\"access_token\":\"bb-next\",\"refresh_token\":\"bb-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":7200}",
	)
	.await;
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::seconds(30)))
		.await
		.expect("Session should be created.");
	let token = bridge
		.sessions()
		.live_upstream_access_token(&session_id)
		.await
		.expect("Expiring session should refresh.");

	mock.assert_async().await;

	assert_eq!(token.expose(), "bb-next");

	let record = sessions
		.fetch(&session_id)
		.await
		.expect("Fetch should succeed.")
		.expect("Session should still exist.");

	assert_eq!(record.access_token.expose(), "bb-next");
	assert_eq!(record.refresh_token.expose(), "bb-refresh-2");
	assert!(record.expires_at > OffsetDateTime::now_utc() + Duration::hours(1));

	let metrics = bridge.sessions().metrics();

	assert_eq!(metrics.attempts(), 1);
	assert_eq!(metrics.successes(), 1);
}

#[tokio::test]
async fn refresh_without_rotation_keeps_the_previous_refresh_token() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.url("/authorize"), &server.url("/token"));
	let (bridge, sessions) = build_reqwest_test_bridge(descriptor);
	let _mock = mock_refresh(
		&server,
		"{\"access_token\":\"bb-next\",\"token_type\":\"bearer\",\"expires_in\":7200}",
	)
	.await;
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::ZERO))
		.await
		.expect("Session should be created.");

	bridge
		.sessions()
		.live_upstream_access_token(&session_id)
		.await
		.expect("Expired session should refresh.");

	let record = sessions
		.fetch(&session_id)
		.await
		.expect("Fetch should succeed.")
		.expect("Session should still exist.");

	assert_eq!(record.refresh_token.expose(), "bb-refresh");
}

#[tokio::test]
async fn concurrent_lookups_share_a_single_refresh() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.url("/authorize"), &server.url("/token"));
	let (bridge, _) = build_reqwest_test_bridge(descriptor);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(200))
				.body(
					"{\"access_token\":\"bb-next\",\"refresh_token\":\"bb-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":7200}",
				);
		})
		.await;
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::seconds(10)))
		.await
		.expect("Session should be created.");
	let (first, second) = tokio::join!(
		bridge.sessions().live_upstream_access_token(&session_id),
		bridge.sessions().live_upstream_access_token(&session_id),
	);
	let first = first.expect("First lookup should succeed.");
	let second = second.expect("Second lookup should succeed.");

	assert_eq!(first, second);
	assert_eq!(first.expose(), "bb-next");
	assert_eq!(bridge.sessions().metrics().attempts(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn upstream_refresh_failure_keeps_the_session_untouched() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.url("/authorize"), &server.url("/token"));
	let (bridge, sessions) = build_reqwest_test_bridge(descriptor);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"refresh token revoked\"}");
		})
		.await;
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::seconds(5)))
		.await
		.expect("Session should be created.");
	let err = bridge
		.sessions()
		.live_upstream_access_token(&session_id)
		.await
		.expect_err("Upstream rejection should surface.");

	mock.assert_async().await;

	match err {
		Error::UpstreamTokenExchangeFailed { grant, status, body } => {
			assert_eq!(grant, GrantType::RefreshToken);
			assert_eq!(status, Some(400));
			assert!(body.contains("invalid_grant"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	let record = sessions
		.fetch(&session_id)
		.await
		.expect("Fetch should succeed.")
		.expect("Session should still exist.");

	assert_eq!(record.access_token.expose(), "bb-access");
	assert_eq!(bridge.sessions().metrics().failures(), 1);
}

#[tokio::test]
async fn unrepresentable_upstream_lifetimes_fail_without_touching_the_session() {
	let server = MockServer::start_async().await;
	let descriptor = test_descriptor(&server.url("/authorize"), &server.url("/token"));
	let (bridge, sessions) = build_reqwest_test_bridge(descriptor);
	let mock = mock_refresh(
		&server,
		"{\"access_token\":\"bb-next\",\"token_type\":\"bearer\",\"expires_in\":100000000000000}",
	)
	.await;
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::seconds(5)))
		.await
		.expect("Session should be created.");
	let err = bridge
		.sessions()
		.live_upstream_access_token(&session_id)
		.await
		.expect_err("An out-of-range expires_in should fail the refresh.");

	mock.assert_async().await;

	assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)));
	assert_eq!(err.http_status(), 502);

	let record = sessions
		.fetch(&session_id)
		.await
		.expect("Fetch should succeed.")
		.expect("Session should still exist.");

	assert_eq!(record.access_token.expose(), "bb-access");
	assert_eq!(record.refresh_token.expose(), "bb-refresh");
}

#[tokio::test]
async fn unknown_sessions_are_reported_as_missing() {
	let descriptor =
		test_descriptor("https://idp.example.com/authorize", "https://idp.example.com/token");
	let (bridge, _) = build_reqwest_test_bridge(descriptor);
	let session_id = bridge
		.sessions()
		.create(upstream_tokens("bb-access", "bb-refresh", Duration::hours(1)))
		.await
		.expect("Session should be created.");

	assert!(bridge.sessions().delete(&session_id).await.expect("Delete should succeed."));
	assert!(!bridge.sessions().delete(&session_id).await.expect("Delete should succeed."));
	assert!(matches!(
		bridge.sessions().live_upstream_access_token(&session_id).await,
		Err(Error::SessionNotFound)
	));
}
