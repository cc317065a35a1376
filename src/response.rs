use serde::de::DeserializeOwned;

use crate::{ApiError, Result};

/// Successful (2xx) response of a logical call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    /// Dispatches it took, initial attempt included.
    pub attempts: u32,
}

impl ApiResponse {
    pub(crate) fn new(status: u16, body: String) -> Self {
        Self {
            status,
            body,
            attempts: 1,
        }
    }

    /// Decodes the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|err| {
            ApiError::Decode(format!("invalid response JSON: {err}; body: {}", self.body))
        })
    }
}

/// Result of [`crate::ApiClient::check_connection`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// `message` field of the root endpoint's JSON reply.
    pub message: Option<String>,
    /// User-facing reason when not connected.
    pub error: Option<String>,
}
