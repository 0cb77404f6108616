//! Registers a downstream client, starts an authorization against Bitbucket, and shows how an
//! outer HTTP layer would answer a denied upstream callback.

// crates.io
use color_eyre::Result;
use url::Url;
// self
use oauth2_bridge::{
	callback::{CallbackQuery, CallbackResponse},
	client::ClientMetadata,
	config::BridgeConfig,
	flows::{ReqwestBridge, pkce_s256_challenge},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = match BridgeConfig::from_env() {
		Ok(config) => config,
		Err(_) => BridgeConfig::new(
			Url::parse("http://localhost:3000")?,
			"demo-consumer-key",
			"demo-consumer-secret",
			"demo-signing-secret",
		)?,
	};
	let bridge = ReqwestBridge::new(&config)?;
	let redirect = Url::parse("https://app.example.com/oauth/callback")?;
	let client = bridge.clients().register(
		ClientMetadata::with_redirect_uri(redirect.clone()).with_client_name("demo-app"),
	);
	let verifier = "demo-verifier-0123456789abcdefghijklmnopqrstuvwxyz";
	let authorize_url = bridge
		.begin_authorization(&client, redirect, pkce_s256_challenge(verifier), Some("demo".into()))
		.await?;

	println!("Registered client {}.", client.client_id);
	println!("Send your user to {authorize_url}.");
	println!("Bitbucket will call back {}.", bridge.callback_url());

	let mut callback = bridge.callback_url().clone();

	callback
		.query_pairs_mut()
		.append_pair("error", "access_denied")
		.append_pair("state", "demo-state");

	match bridge.handle_callback(&CallbackQuery::from_url(&callback)).await {
		CallbackResponse::Redirect { location } => println!("302 Found -> {location}."),
		CallbackResponse::Failure { status, body } => println!("{status}: {body}"),
	}

	Ok(())
}
