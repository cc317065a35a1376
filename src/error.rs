/// Fallback text shown to the user when the server gave no message.
pub(crate) const GENERIC_MESSAGE: &str = "An error occurred";
/// Text shown to the user when no response arrived at all.
pub(crate) const NO_RESPONSE_MESSAGE: &str = "No response received from the server";

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network or request execution error from `reqwest` (connect, timeout, body).
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// HTTP 401. Never retried; triggers the login redirect.
    #[error("unauthorized: {body}")]
    Unauthorized { body: String },
    /// HTTP 429. Never retried.
    #[error("rate limited: {body}")]
    RateLimited { body: String },
    /// A retryable failure persisted past the retry budget.
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total dispatches, initial attempt included.
        attempts: u32,
        /// Failure observed on the last attempt.
        #[source]
        source: Box<ApiError>,
    },
    /// Response body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// The call was cancelled through its cancellation token.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Maps a non-success status and its body onto the matching variant.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => ApiError::Unauthorized { body },
            429 => ApiError::RateLimited { body },
            _ => ApiError::Http { status, body },
        }
    }

    /// HTTP status of the failure, looking through [`ApiError::RetriesExhausted`].
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::RetriesExhausted { source, .. } => source.status(),
            ApiError::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Human-readable text suitable for a toast or status line.
    ///
    /// Server errors prefer the `message` field of a JSON body.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, .. }
            | ApiError::Unauthorized { body }
            | ApiError::RateLimited { body } => {
                body_message(body).unwrap_or_else(|| GENERIC_MESSAGE.to_owned())
            }
            ApiError::Transport(_) => NO_RESPONSE_MESSAGE.to_owned(),
            ApiError::RetriesExhausted { source, .. } => source.user_message(),
            other => other.to_string(),
        }
    }
}

/// Extracts `{"message": "..."}` from an error body.
pub(crate) fn body_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(str::to_owned)
}
