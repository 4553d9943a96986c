//! Firebase Authentication (Identity Toolkit) client.
//!
//! Only the account operations the lifecycle jobs need are exposed: creating,
//! looking up and deleting a user by uid.

pub mod models;

use crate::auth::models::{
    CreateUserRequest, CreateUserResponse, DeleteAccountRequest, GetAccountInfoRequest,
    GetAccountInfoResponse, UserRecord,
};
use crate::core::middleware::AuthMiddleware;
use crate::core::{authorized_client, ApiFailure};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

#[cfg(test)]
mod tests;

const IDENTITY_TOOLKIT_V1_API: &str = "https://identitytoolkit.googleapis.com/v1/projects";
const USER_NOT_FOUND: &str = "USER_NOT_FOUND";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
}

impl FirebaseAuth {
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();
        let base_url = format!("{}/{}", IDENTITY_TOOLKIT_V1_API, project_id);

        Self {
            client: authorized_client(middleware),
            base_url,
        }
    }

    /// Creates a client against a custom base URL (an emulator or a mock server).
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn post<T: serde::Serialize>(
        &self,
        action: &str,
        request: &T,
    ) -> Result<reqwest::Response, AuthError> {
        let url = format!("{}/{}", self.base_url, action);

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(request)?)
            .send()
            .await?;

        Ok(response)
    }

    /// Creates a user. An empty request creates an anonymous account.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<String, AuthError> {
        let response = self.post("accounts", &request).await?;

        if !response.status().is_success() {
            let failure = ApiFailure::from_response(response).await;
            return Err(AuthError::ApiError(failure.message("Create user failed")));
        }

        let created: CreateUserResponse = response.json().await?;
        Ok(created.local_id)
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        let request = GetAccountInfoRequest {
            local_id: vec![uid.to_string()],
        };
        let response = self.post("accounts:lookup", &request).await?;

        if !response.status().is_success() {
            let failure = ApiFailure::from_response(response).await;
            if failure.has_message_code(USER_NOT_FOUND) {
                return Err(AuthError::UserNotFound);
            }
            return Err(AuthError::ApiError(failure.message("Get user failed")));
        }

        let result: GetAccountInfoResponse = response.json().await?;

        result
            .users
            .and_then(|mut users| users.pop())
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn delete_user(&self, uid: &str) -> Result<(), AuthError> {
        let request = DeleteAccountRequest {
            local_id: uid.to_string(),
        };
        let response = self.post("accounts:delete", &request).await?;

        if !response.status().is_success() {
            let failure = ApiFailure::from_response(response).await;
            if failure.has_message_code(USER_NOT_FOUND) {
                return Err(AuthError::UserNotFound);
            }
            return Err(AuthError::ApiError(failure.message("Delete user failed")));
        }

        Ok(())
    }
}
