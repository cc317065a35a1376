use std::sync::Arc;

use dashapi_http::{
    resources, ApiClient, ApiConfig, JsonFileStore, SessionTokenProvider, AUTH_TOKEN_KEY,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Wallet {
    id: u64,
    name: String,
    balance: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    let store = JsonFileStore::load(
        std::env::var("DASHAPI_TOKEN_FILE").unwrap_or_else(|_| "secrets.json".to_owned()),
    )?;
    let tokens = SessionTokenProvider::new()
        .with_store(Arc::new(store))
        .with_key(AUTH_TOKEN_KEY);

    let api = ApiClient::new(config).with_token_provider(Arc::new(tokens));

    let status = api.check_connection().await;
    println!("connected: {} ({:?})", status.connected, status.message.or(status.error));

    let wallets = api.resource(resources::WALLETS);
    let created: Wallet = wallets
        .create(&json!({ "name": "Cash", "balance": 120.0 }))
        .await?;
    println!("created {created:?}");

    let all: Vec<Wallet> = wallets.list().await?;
    for wallet in all {
        println!("{} {} {:.2}", wallet.id, wallet.name, wallet.balance);
    }

    Ok(())
}
