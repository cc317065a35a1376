//! Bearer token resolution.
//!
//! A [`TokenProvider`] only ever reads credentials. Refreshing them belongs to
//! whatever owns the session (an auth SDK, a login flow), never to this crate.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::{ApiError, Result};

/// Storage key the fallback token is persisted under.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// How long a [`SessionSource`] may take before the storage fallback is used.
///
/// Half the default request timeout, so the fallback runs before the client gives up.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Error raised by a [`SessionSource`]. Always swallowed by [`SessionTokenProvider`].
pub type SessionError = Box<dyn std::error::Error + Send + Sync>;

/// Bearer credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Returns `None` for blank input so empty strings read as "unauthenticated".
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Raw credential, for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Supplies the current credential, if any.
///
/// `None` means "unauthenticated", not an error.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Option<Token>;
}

/// External session holder, e.g. an auth SDK that may hit the network.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn current_token(&self) -> std::result::Result<Option<String>, SessionError>;
}

/// Read-only persisted key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Always returns the same token (or none).
#[derive(Clone, Debug, Default)]
pub struct StaticTokenProvider {
    token: Option<Token>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token::new(token),
        }
    }

    /// Provider for unauthenticated clients.
    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Option<Token> {
        self.token.clone()
    }
}

/// Session first, persisted storage second.
///
/// A session that fails or does not answer within its timeout is logged and
/// treated like an absent one.
#[derive(Clone)]
pub struct SessionTokenProvider {
    session: Option<Arc<dyn SessionSource>>,
    store: Option<Arc<dyn KeyValueStore>>,
    key: String,
    session_timeout: Duration,
}

impl SessionTokenProvider {
    pub fn new() -> Self {
        Self {
            session: None,
            store: None,
            key: AUTH_TOKEN_KEY.to_owned(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Sets the session consulted first.
    pub fn with_session(mut self, session: Arc<dyn SessionSource>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the storage consulted when the session yields nothing.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the fallback storage key (default [`AUTH_TOKEN_KEY`]).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Bounds each session lookup (default [`DEFAULT_SESSION_TIMEOUT`]).
    ///
    /// Keep it below the client's request timeout so the storage fallback still runs.
    pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self
    }

    async fn from_session(&self) -> Option<Token> {
        let session = self.session.as_ref()?;
        match tokio::time::timeout(self.session_timeout, session.current_token()).await {
            Ok(Ok(token)) => token.and_then(Token::new),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "session token lookup failed; falling back to storage");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.session_timeout.as_millis() as u64,
                    "session token lookup timed out; falling back to storage"
                );
                None
            }
        }
    }

    fn from_store(&self) -> Option<Token> {
        self.store.as_ref()?.get(&self.key).and_then(Token::new)
    }
}

impl Default for SessionTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenProvider")
            .field("session", &self.session.is_some())
            .field("store", &self.store.is_some())
            .field("key", &self.key)
            .field("session_timeout", &self.session_timeout)
            .finish()
    }
}

#[async_trait]
impl TokenProvider for SessionTokenProvider {
    async fn get_token(&self) -> Option<Token> {
        match self.from_session().await {
            Some(token) => Some(token),
            None => self.from_store(),
        }
    }
}

/// In-process map, mostly for tests and embedding apps that own their own persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

/// Flat JSON object of string values loaded once from disk.
///
/// ```json
/// { "authToken": "eyJhbGciOi..." }
/// ```
#[derive(Debug, Default)]
pub struct JsonFileStore {
    entries: HashMap<String, String>,
}

impl JsonFileStore {
    /// Reads and parses `path`. Non-string values are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            ApiError::Config(format!("could not read {}: {err}", path.display()))
        })?;
        let parsed: HashMap<String, serde_json::Value> = serde_json::from_str(&content)
            .map_err(|err| {
                ApiError::Config(format!("{} could not be parsed: {err}", path.display()))
            })?;
        let entries = parsed
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(value) => Some((key, value)),
                _ => None,
            })
            .collect();
        Ok(Self { entries })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}
