pub mod middleware;

use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        format!("{} (code: {})", self.error.message, self.error.code)
    }
}

/// A non-success response from one of the Google REST APIs.
///
/// The body is read once so callers can both branch on the error code and
/// format a message for logging.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub body: Option<FirebaseErrorResponse>,
    pub raw: String,
}

impl ApiFailure {
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<FirebaseErrorResponse>(&raw).ok();
        Self { status, body, raw }
    }

    /// Identity Toolkit reports error codes in `message`, sometimes with a
    /// trailing description ("USER_NOT_FOUND : ...").
    pub fn has_message_code(&self, code: &str) -> bool {
        self.body
            .as_ref()
            .map(|b| b.error.message == code || b.error.message.starts_with(&format!("{} ", code)))
            .unwrap_or(false)
    }

    /// Matches the canonical gRPC status string (e.g. `NOT_FOUND`).
    pub fn has_status(&self, status: &str) -> bool {
        self.body
            .as_ref()
            .and_then(|b| b.error.status.as_deref())
            .map(|s| s == status)
            .unwrap_or(false)
    }

    pub fn message(&self, default_msg: &str) -> String {
        match &self.body {
            Some(body) => format!("{}: {}", default_msg, body.display_message()),
            None => format!("{} {}: {}", default_msg, self.status, self.raw),
        }
    }
}

/// Builds the shared HTTP client used by every service: transient failures
/// retried with exponential backoff, then the bearer token attached.
pub(crate) fn authorized_client(middleware: middleware::AuthMiddleware) -> reqwest_middleware::ClientWithMiddleware {
    use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

    reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(middleware)
        .build()
}
