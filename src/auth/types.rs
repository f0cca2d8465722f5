//! Session types and backend wire shapes

use serde::{Deserialize, Serialize};

/// Fallback shown when the backend gives no structured message
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Profile fields for the signed-in user. The backend populates these
/// inconsistently across endpoints, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// An authenticated session. A `Session` value always carries a token;
/// "logged in without a token" is not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user: UserProfile,
}

/// Authentication phase. Folding the token and the authenticated flag into
/// one enum keeps `is_authenticated == token.is_some()` true by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthPhase {
    #[default]
    Anonymous,
    Authenticated(Session),
}

impl AuthPhase {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthPhase::Anonymous => None,
            AuthPhase::Authenticated(session) => Some(session),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.session().map(|s| s.token.as_str())
    }
}

/// Externally observable session state. `last_error` records the most recent
/// failed operation and coexists with either phase: a failed login never
/// implicitly logs the user out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub auth: AuthPhase,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn token(&self) -> Option<&str> {
        self.auth.token()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.auth.session().map(|s| &s.user)
    }

    pub fn role(&self) -> Option<&str> {
        self.user().and_then(|u| u.role.as_deref())
    }
}

/// Signup form fields sent to the registration endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

fn default_true() -> bool {
    true
}

/// User object inside the nested `data.user` envelope; also the shape of
/// `userDetail` on the profile endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl UserPayload {
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            role: self.role,
        }
    }
}

/// The `data` envelope of the nested login response shape
#[derive(Debug, Deserialize)]
pub struct NestedPayload {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Login/registration response. The backend answers with one of two shapes
/// (a nested `data.user` envelope or flat top-level fields), or with a bare
/// failure envelope carrying only `success`/`message`. Each shape is its own
/// variant so a third shape is a compiler-checked addition, not another
/// optional-chain fallback.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Nested {
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default)]
        message: Option<String>,
        data: NestedPayload,
    },
    Flat {
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default)]
        message: Option<String>,
        token: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        phone: Option<String>,
        #[serde(default)]
        role: Option<String>,
    },
    Bare {
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
}

impl LoginResponse {
    /// Normalize any accepted response shape into a [`Session`].
    ///
    /// Authentication succeeds only when the success flag holds (it defaults
    /// to true when absent) and the shape carried a token; everything else
    /// surfaces the backend message, or the generic fallback.
    pub fn normalize(self) -> Result<Session, AuthError> {
        match self {
            LoginResponse::Nested {
                success,
                message,
                data,
            } => {
                if !success || data.token.is_empty() {
                    return Err(AuthError::ApiError(failure_message(message)));
                }
                let user = data.user.map(UserPayload::into_profile).unwrap_or_default();
                let user_id = user.id.clone().or(data.user_id);
                Ok(Session {
                    token: data.token,
                    user_id,
                    user,
                })
            }
            LoginResponse::Flat {
                success,
                message,
                token,
                user_id,
                email,
                name,
                phone,
                role,
            } => {
                if !success || token.is_empty() {
                    return Err(AuthError::ApiError(failure_message(message)));
                }
                let user = UserProfile {
                    id: user_id.clone(),
                    name,
                    email,
                    phone,
                    role,
                };
                Ok(Session {
                    token,
                    user_id,
                    user,
                })
            }
            LoginResponse::Bare { message, .. } => {
                // No token means no session, even when success claims otherwise
                Err(AuthError::ApiError(failure_message(message)))
            }
        }
    }
}

fn failure_message(message: Option<String>) -> String {
    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string())
}

/// Response from the user-details endpoint
#[derive(Debug, Deserialize)]
pub struct UserDetailResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "userDetail", default)]
    pub user_detail: UserPayload,
}

/// Error types for the session subsystem
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    /// Backend-reported failure; the message is surfaced verbatim
    #[error("{0}")]
    ApiError(String),

    /// The server rejected the session credential (HTTP 401)
    #[error("{0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_and_flat_shapes_normalize_identically() {
        let nested = r#"{
            "success": true,
            "data": {
                "token": "T1",
                "user": {"id": "42", "name": "Ann", "email": "a@b.com", "phone": "555"}
            }
        }"#;
        let flat = r#"{
            "token": "T1",
            "user_id": "42",
            "name": "Ann",
            "email": "a@b.com",
            "phone": "555"
        }"#;

        let from_nested: LoginResponse = serde_json::from_str(nested).unwrap();
        let from_flat: LoginResponse = serde_json::from_str(flat).unwrap();

        let a = from_nested.normalize().unwrap();
        let b = from_flat.normalize().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.token, "T1");
        assert_eq!(a.user_id.as_deref(), Some("42"));
        assert_eq!(a.user.name.as_deref(), Some("Ann"));
        assert_eq!(a.user.email.as_deref(), Some("a@b.com"));
        assert_eq!(a.user.phone.as_deref(), Some("555"));
    }

    #[test]
    fn test_success_defaults_to_true_when_absent() {
        let json = r#"{"data": {"token": "T2", "user": {"id": "7"}}}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let session = response.normalize().unwrap();
        assert_eq!(session.token, "T2");
        assert_eq!(session.user_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_explicit_failure_surfaces_backend_message() {
        let json = r#"{"success": false, "message": "Invalid credentials"}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let err = response.normalize().unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_missing_token_is_a_failure_even_when_success_claims_otherwise() {
        let json = r#"{"success": true, "message": "welcome"}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let err = response.normalize().unwrap_err();
        assert_eq!(err.to_string(), "welcome");
    }

    #[test]
    fn test_failure_without_message_uses_generic_fallback() {
        let json = r#"{"success": false}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let err = response.normalize().unwrap_err();
        assert_eq!(err.to_string(), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_nested_user_id_falls_back_to_data_user_id() {
        let json = r#"{"data": {"token": "T3", "user_id": "91"}}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let session = response.normalize().unwrap();
        assert_eq!(session.user_id.as_deref(), Some("91"));
        assert!(session.user.id.is_none());
    }

    #[test]
    fn test_auth_phase_invariant_by_construction() {
        let anonymous = AuthPhase::Anonymous;
        assert_eq!(anonymous.is_authenticated(), anonymous.token().is_some());

        let authenticated = AuthPhase::Authenticated(Session {
            token: "T".to_string(),
            user_id: None,
            user: UserProfile::default(),
        });
        assert_eq!(
            authenticated.is_authenticated(),
            authenticated.token().is_some()
        );
        assert!(authenticated.is_authenticated());
    }

    #[test]
    fn test_snapshot_error_coexists_with_authenticated_phase() {
        let snapshot = SessionSnapshot {
            auth: AuthPhase::Authenticated(Session {
                token: "T".to_string(),
                user_id: Some("1".to_string()),
                user: UserProfile::default(),
            }),
            last_error: Some("Invalid credentials".to_string()),
        };
        assert!(snapshot.is_authenticated());
        assert!(snapshot.last_error.is_some());
    }

    #[test]
    fn test_user_detail_response_rename() {
        let json = r#"{"message": "ok", "userDetail": {"id": "5", "role": "admin"}}"#;
        let response: UserDetailResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.user_detail.id.as_deref(), Some("5"));
        assert_eq!(response.user_detail.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_sign_up_request_skips_absent_fields() {
        let request = SignUpRequest {
            name: "Ann".to_string(),
            email: "a@b.com".to_string(),
            password: "x".to_string(),
            phone: None,
            role: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("phone").is_none());
        assert!(json.get("role").is_none());
        assert_eq!(json["email"], "a@b.com");
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::NetworkError("unreachable".to_string()).to_string(),
            "Network error: unreachable"
        );
        assert_eq!(AuthError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            AuthError::ApiError("Invalid credentials".to_string()).to_string(),
            "Invalid credentials"
        );
        assert_eq!(
            AuthError::Unauthorized("Token expired".to_string()).to_string(),
            "Token expired"
        );
    }
}
