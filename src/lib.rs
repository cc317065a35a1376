//! `dashapi-http` is a resilient async HTTP client for the TaskFlow and SpendWise REST APIs.
//!
//! One [`ApiClient`] instance handles, for every call:
//! - bearer token injection from a pluggable [`TokenProvider`]
//! - capped exponential retry of transport failures and 5xx responses
//! - a login redirect through [`Navigator`] on 401
//! - exactly one [`Notifier`] message per failed logical call
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dashapi_http::{resources, ApiClient, ApiConfig, MemoryStore, SessionTokenProvider};
//!
//! # async fn run() -> dashapi_http::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.insert(dashapi_http::AUTH_TOKEN_KEY, "abc123");
//!
//! let api = ApiClient::new(ApiConfig::from_env()?)
//!     .with_token_provider(Arc::new(SessionTokenProvider::new().with_store(store)));
//!
//! let wallets: Vec<serde_json::Value> = api.resource(resources::WALLETS).list().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod hooks;
mod options;
mod request;
mod resource;
mod response;
pub mod retry;
mod token;

pub use client::ApiClient;
pub use config::{ApiConfig, Environment, DEFAULT_LOGIN_PATH};
pub use error::ApiError;
pub use hooks::{LogNavigator, LogNotifier, Navigator, Notifier};
pub use options::ClientOptions;
pub use request::ApiRequest;
pub use resource::{resources, Resource};
pub use response::{ApiResponse, ConnectionStatus};
pub use retry::RetryPolicy;
pub use token::{
    JsonFileStore, KeyValueStore, MemoryStore, SessionError, SessionSource,
    SessionTokenProvider, StaticTokenProvider, Token, TokenProvider, AUTH_TOKEN_KEY,
    DEFAULT_SESSION_TIMEOUT,
};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ApiError>;
