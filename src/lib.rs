//! Agent Workbench Client Core
//!
//! Client-side session subsystem for the Agent Workbench desktop app:
//! credential storage, session state, authenticated API access, and
//! route-guard decisions. Used by the desktop shell.

pub mod auth;
pub mod config;

// Re-export commonly used items
pub use auth::guards::{RouteDecision, authentication_gate, role_gate};
pub use auth::http_client::ApiClient;
pub use auth::manager::SessionManager;
pub use auth::storage::CredentialStore;
pub use auth::types::{AuthError, Session, SessionSnapshot, UserProfile};
pub use config::{ApiConfig, ApiEnvironment};
