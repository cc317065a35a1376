use std::fmt;

use reqwest::Url;

use crate::{ApiError, Result};

/// Login surface used when the caller does not configure one.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Deployment environment that selects which base URL variable is read.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn base_url_var(self) -> &'static str {
        match self {
            Environment::Development => "DASHAPI_BASE_URL_DEV",
            Environment::Production => "DASHAPI_BASE_URL_PROD",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(ApiError::Config(format!(
                "unknown DASHAPI_ENV value '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Where the client sends requests and where it sends users on 401.
///
/// Resolved once and handed to [`crate::ApiClient::new`]; never re-read per request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiConfig {
    base_url: Url,
    environment: Environment,
    login_path: String,
}

impl ApiConfig {
    /// Validates `base_url` and builds a development config with the default login path.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let raw = base_url.as_ref().trim();
        if raw.is_empty() {
            return Err(ApiError::Config("base URL is empty".to_owned()));
        }
        let base_url = Url::parse(raw)
            .map_err(|err| ApiError::Config(format!("invalid base URL '{raw}': {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Config(format!("base URL '{raw}' cannot be a base")));
        }
        if base_url.query().is_some() || base_url.fragment().is_some() {
            return Err(ApiError::Config(format!(
                "base URL '{raw}' must not carry a query or fragment"
            )));
        }
        Ok(Self {
            base_url,
            environment: Environment::Development,
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
        })
    }

    /// Creates a config from environment variables.
    ///
    /// Reads:
    /// - `DASHAPI_ENV`: `development` (default) or `production`
    /// - `DASHAPI_BASE_URL_DEV` / `DASHAPI_BASE_URL_PROD`: base URL for that environment
    /// - `DASHAPI_LOGIN_PATH`: optional, defaults to `/login`
    ///
    /// Returns [`ApiError::Config`] if the selected base URL is missing, empty or invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment = match lookup("DASHAPI_ENV") {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };
        let var = environment.base_url_var();
        let base_url = lookup(var)
            .ok_or_else(|| ApiError::Config(format!("missing {var} environment variable")))?;
        if base_url.trim().is_empty() {
            return Err(ApiError::Config(format!("{var} is set but empty")));
        }

        let mut config = Self::new(base_url)?.with_environment(environment);
        if let Some(path) = lookup("DASHAPI_LOGIN_PATH").filter(|path| !path.trim().is_empty()) {
            config = config.with_login_path(path);
        }
        Ok(config)
    }

    /// Records which deployment the base URL belongs to.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the path handed to the navigator on 401.
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Joins `path` onto the base URL, keeping any path prefix the base carries.
    ///
    /// Example: base `https://api.example.com/v1/` + `/wallets/3` → `https://api.example.com/v1/wallets/3`
    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = if path.is_empty() {
            format!("{base}/")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined)
            .map_err(|err| ApiError::Config(format!("invalid request URL '{joined}': {err}")))
    }
}
