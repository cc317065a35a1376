use std::fmt;
use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    error::body_message,
    hooks::{LogNavigator, LogNotifier, Navigator, Notifier},
    retry::{Disposition, RequestDescriptor, RetryPolicy, TerminalReason},
    token::{StaticTokenProvider, TokenProvider},
    ApiConfig, ApiError, ApiRequest, ApiResponse, ClientOptions, ConnectionStatus, Resource,
    Result,
};

#[derive(Clone)]
/// HTTP client for the dashboard REST APIs.
///
/// Every attempt carries a freshly resolved bearer token. Transport failures and
/// 5xx responses are retried with capped exponential backoff; 401 redirects to
/// the login surface; any other terminal failure is reported once through the
/// [`Notifier`].
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    options: ClientOptions,
    policy: RetryPolicy,
    tokens: Arc<dyn TokenProvider>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url().as_str())
            .field("environment", &self.config.environment())
            .field("tokens", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl ApiClient {
    /// Creates an unauthenticated client with default options and log-only hooks.
    pub fn new(config: ApiConfig) -> Self {
        let options = ClientOptions::default();
        Self {
            http: reqwest::Client::new(),
            config,
            policy: RetryPolicy::from_options(&options),
            options,
            tokens: Arc::new(StaticTokenProvider::none()),
            notifier: Arc::new(LogNotifier),
            navigator: Arc::new(LogNavigator),
        }
    }

    /// Creates a client from environment variables, see [`ApiConfig::from_env`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dashapi_http::ApiClient;
    ///
    /// let api = ApiClient::from_env().expect("missing DASHAPI_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ApiConfig::from_env()?))
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.policy = RetryPolicy::from_options(&opts);
        self.options = opts;
        self
    }

    /// Sets where each attempt's bearer token comes from.
    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Shorthand for a [`StaticTokenProvider`]. A missing `Bearer ` prefix is added on send.
    pub fn with_bearer(self, token: impl Into<String>) -> Self {
        self.with_token_provider(Arc::new(StaticTokenProvider::new(token)))
    }

    /// Sets the surface that receives one message per failed call.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the collaborator that handles the login redirect on 401.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Replaces the underlying `reqwest` client (proxies, custom TLS).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Returns the configuration the client was built with.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Returns the active timeout and retry options.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// CRUD helper rooted at `path`, e.g. `api.resource("/api/wallets")`.
    pub fn resource(&self, path: impl Into<String>) -> Resource<'_> {
        Resource::new(self, path)
    }

    /// Sends a `GET` to `path`.
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(&ApiRequest::get(path)).await
    }

    /// Sends a `POST` with `body` serialized as JSON.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(&ApiRequest::post(path).json(body)?).await
    }

    /// Sends a `PUT` with `body` serialized as JSON.
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(&ApiRequest::put(path).json(body)?).await
    }

    /// Sends a `PATCH` with `body` serialized as JSON.
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(&ApiRequest::patch(path).json(body)?).await
    }

    /// Sends a `DELETE` to `path`.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(&ApiRequest::delete(path)).await
    }

    /// Sends `request`, retrying transient failures.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.send_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Like [`ApiClient::send`], but gives up with [`ApiError::Cancelled`] as soon as
    /// `cancel` fires, whether an attempt is in flight or a backoff is pending.
    ///
    /// Cancellation raises neither a notification nor a redirect.
    pub async fn send_with_cancellation(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let mut descriptor = RequestDescriptor::new();
        loop {
            descriptor.dispatch();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ApiError::Cancelled),
                outcome = self.dispatch_once(request) => outcome,
            };

            let err = match outcome {
                Ok(mut response) => {
                    descriptor.succeed();
                    response.attempts = descriptor.dispatches();
                    return Ok(response);
                }
                Err(ApiError::Cancelled) => {
                    descriptor.abandon();
                    return Err(ApiError::Cancelled);
                }
                Err(err) => err,
            };

            match descriptor.fail(&self.policy, &err) {
                Disposition::RetryAfter(delay) => {
                    tracing::debug!(
                        method = %request.method,
                        path = %request.path,
                        retry = descriptor.attempt_count(),
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            descriptor.abandon();
                            return Err(ApiError::Cancelled);
                        }
                        _ = sleep(delay) => {}
                    }
                }
                Disposition::Terminal(reason) => {
                    return Err(self.surface(reason, err, descriptor.dispatches()));
                }
            }
        }
    }

    /// Sends `GET /` once, without retries or hooks.
    pub async fn check_connection(&self) -> ConnectionStatus {
        match self.dispatch_once(&ApiRequest::get("/")).await {
            Ok(response) => ConnectionStatus {
                connected: true,
                message: body_message(&response.body),
                error: None,
            },
            Err(err) => ConnectionStatus {
                connected: false,
                message: None,
                error: Some(err.user_message()),
            },
        }
    }

    async fn dispatch_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.config.endpoint_url(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(self.options.timeout());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(authorization) = self.authorization().await {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        if status.is_success() {
            Ok(ApiResponse::new(status.as_u16(), body))
        } else {
            Err(ApiError::from_status(status.as_u16(), body))
        }
    }

    /// Resolves the header value once per attempt.
    ///
    /// A provider that does not answer within the request timeout, or a token that
    /// is not a valid header value, is skipped and the request goes out unauthenticated.
    async fn authorization(&self) -> Option<HeaderValue> {
        match timeout(self.options.timeout(), self.tokens.get_token()).await {
            Ok(token) => {
                let authorization = normalize_bearer_authorization(token?.expose());
                match HeaderValue::from_str(&authorization) {
                    Ok(mut value) => {
                        value.set_sensitive(true);
                        Some(value)
                    }
                    Err(_) => {
                        tracing::warn!(
                            "token is not a valid header value; sending request without authorization"
                        );
                        None
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.options.timeout_ms,
                    "token provider timed out; sending request without authorization"
                );
                None
            }
        }
    }

    fn surface(&self, reason: TerminalReason, err: ApiError, attempts: u32) -> ApiError {
        match reason {
            TerminalReason::Unauthorized => {
                self.navigator.redirect(self.config.login_path());
                err
            }
            TerminalReason::NotRetryable => {
                self.notifier.notify_error(&err.user_message());
                err
            }
            TerminalReason::Exhausted => {
                let err = ApiError::RetriesExhausted {
                    attempts,
                    source: Box::new(err),
                };
                self.notifier.notify_error(&err.user_message());
                err
            }
        }
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
