//! HTTP client for the Agent Workbench API
//!
//! Attaches the bearer credential to every outgoing request and reacts to
//! server-declared credential rejection. It does not retry, classify, or
//! suppress other errors.

use super::storage::{CredentialStore, TOKEN_KEY};
use super::types::{
    AuthError, GENERIC_ERROR_MESSAGE, LoginResponse, SignUpRequest, UserDetailResponse,
};
use log::{debug, error, warn};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

/// Hook the session side implements so a rejected credential clears the
/// session no matter which feature made the call.
pub trait ForcedLogout: Send + Sync {
    fn force_logout(&self);
}

/// HTTP client for API calls. The token is read from the credential store on
/// every request, not from in-memory state, so a credential written by
/// another process instance is honored.
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<CredentialStore>,
    on_unauthorized: Option<Arc<dyn ForcedLogout>>,
}

impl ApiClient {
    /// Create a new ApiClient
    pub fn new(config: &crate::config::ApiConfig, store: Arc<CredentialStore>) -> Self {
        let client = Client::builder()
            .user_agent("AgentWorkbench-Desktop/0.1.0")
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
            on_unauthorized: None,
        }
    }

    /// Install the forced-logout hook. Wired once at session construction.
    pub fn set_forced_logout(&mut self, hook: Arc<dyn ForcedLogout>) {
        self.on_unauthorized = Some(hook);
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send one request: bearer attached when a token is stored, 401 forces
    /// logout before the error reaches the caller, non-2xx surfaces the
    /// backend message. Returns the raw body text on success.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, AuthError> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("Content-Type", "application/json");

        // Absence of a token never blocks the request; login and signup are
        // unauthenticated calls through this same path.
        if let Some(token) = self.store.get_secret(TOKEN_KEY) {
            if !token.is_empty() {
                request = request.bearer_auth(token);
            }
        }

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if status == StatusCode::UNAUTHORIZED {
            let message = extract_error_message(&text);
            warn!("Credential rejected ({}): {}", url, message);
            if let Some(hook) = &self.on_unauthorized {
                hook.force_logout();
            }
            return Err(AuthError::Unauthorized(message));
        }

        if !status.is_success() {
            let message = extract_error_message(&text);
            error!("Request failed: {} {} - {}", status, url, message);
            return Err(AuthError::ApiError(message));
        }

        Ok(text)
    }

    fn parse<T: DeserializeOwned>(text: &str) -> Result<T, AuthError> {
        serde_json::from_str(text).map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }

    /// GET a JSON resource with the session credential attached
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let text = self.send(Method::GET, path, None).await?;
        Self::parse(&text)
    }

    /// POST a JSON body and parse the JSON response
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let value = serde_json::to_value(body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        let text = self.send(Method::POST, path, Some(value)).await?;
        Self::parse(&text)
    }

    /// Call the login endpoint
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        self.post_json(
            "auth/login",
            &json!({
                "email": email,
                "password": password,
            }),
        )
        .await
    }

    /// Call the registration endpoint
    pub async fn create_user(&self, request: &SignUpRequest) -> Result<LoginResponse, AuthError> {
        self.post_json("auth/create-user", request).await
    }

    /// Fetch user details for a user id
    pub async fn user_details(&self, user_id: &str) -> Result<UserDetailResponse, AuthError> {
        self.get_json(&format!("auth/user/list-user-details/{}", user_id))
            .await
    }

    /// Tell the server about a logout. Best-effort; local logout never
    /// depends on this succeeding.
    pub async fn notify_logout(&self, user_id: &str) -> Result<(), AuthError> {
        self.send(
            Method::POST,
            "auth/user/logout",
            Some(json!({ "user_id": user_id })),
        )
        .await?;
        Ok(())
    }
}

fn map_transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::NetworkError(e.to_string())
    }
}

/// Pull the backend's `{message}` out of an error body, falling back to the
/// generic message when the body has no usable one.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string())
}

/// Classify a registration-failure message from the backend.
///
/// Returns `true` when the message says the email is already registered, so
/// callers can special-case "you already signed up". The session manager
/// itself only passes the message through.
pub fn is_already_registered(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already exist")
        || message.contains("already register")
        || message.contains("already signed up")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_from_json_body() {
        assert_eq!(
            extract_error_message(r#"{"message": "Invalid credentials"}"#),
            "Invalid credentials"
        );
    }

    #[test]
    fn test_extract_message_fallback_for_unusable_bodies() {
        assert_eq!(extract_error_message(""), GENERIC_ERROR_MESSAGE);
        assert_eq!(extract_error_message("<html>502</html>"), GENERIC_ERROR_MESSAGE);
        assert_eq!(extract_error_message(r#"{"message": ""}"#), GENERIC_ERROR_MESSAGE);
        assert_eq!(extract_error_message(r#"{"error": "nope"}"#), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_detects_already_registered_messages() {
        assert!(is_already_registered("This email already exists"));
        assert!(is_already_registered("User already registered"));
        assert!(is_already_registered("You have already signed up"));
    }

    #[test]
    fn test_other_failures_are_not_already_registered() {
        assert!(!is_already_registered("Invalid credentials"));
        assert!(!is_already_registered("Internal Server Error"));
        assert!(!is_already_registered(""));
    }

    #[test]
    fn test_url_joining_tolerates_slashes() {
        let store = Arc::new(CredentialStore::inert());
        let config = crate::config::ApiConfig::new("http://localhost:8000/");
        let client = ApiClient::new(&config, store);
        assert_eq!(client.url("/auth/login"), "http://localhost:8000/auth/login");
        assert_eq!(client.url("auth/login"), "http://localhost:8000/auth/login");
    }
}
