//! Route guards
//!
//! Pure decision functions over a [`SessionSnapshot`]. The shell re-applies
//! the relevant gate to every snapshot published by
//! [`SessionManager::subscribe`](super::manager::SessionManager::subscribe),
//! so a login or logout while a guarded view is mounted changes the decision
//! on the next evaluation.

use super::types::SessionSnapshot;

/// What navigation should do with an attempted route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Render the guarded content unchanged
    Allow,
    /// Not signed in; send to the anonymous landing area, keeping the
    /// attempted location for a post-login return
    RedirectToLanding { attempted: String },
    /// Not signed in on a role-gated route; send to login
    RedirectToLogin { attempted: String },
    /// Signed in, but the role is not on the allow-list. A distinct variant
    /// so navigation can show "not authorized" instead of a plain redirect.
    NotAuthorized { attempted: String },
}

/// Plain authentication gate: any signed-in user passes.
pub fn authentication_gate(snapshot: &SessionSnapshot, attempted: &str) -> RouteDecision {
    if snapshot.is_authenticated() {
        RouteDecision::Allow
    } else {
        RouteDecision::RedirectToLanding {
            attempted: attempted.to_string(),
        }
    }
}

/// Role gate: signed-in users whose role is on the allow-list pass. An empty
/// allow-list admits any signed-in user.
pub fn role_gate(
    snapshot: &SessionSnapshot,
    allowed_roles: &[&str],
    attempted: &str,
) -> RouteDecision {
    if !snapshot.is_authenticated() {
        return RouteDecision::RedirectToLogin {
            attempted: attempted.to_string(),
        };
    }

    if allowed_roles.is_empty() {
        return RouteDecision::Allow;
    }

    match snapshot.role() {
        Some(role) if allowed_roles.contains(&role) => RouteDecision::Allow,
        _ => RouteDecision::NotAuthorized {
            attempted: attempted.to_string(),
        },
    }
}
