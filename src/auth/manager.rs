//! Session manager - owns the session state machine
//!
//! One manager per client process, constructed explicitly at startup and
//! passed to consumers (no ambient global). The snapshot is rehydrated from
//! the credential store at construction and mutated only by login, signup,
//! logout, and the forced logout triggered from the request client.
//!
//! The credential store is shared with any other client instance on the same
//! machine. This manager does not watch for external changes: a logout
//! performed by another instance is only noticed here at the next
//! rehydration or the next 401. Known gap, kept deliberately.

use super::http_client::{ApiClient, ForcedLogout};
use super::storage::{
    CredentialStore, NAME_KEY, ROLE_KEY, TOKEN_KEY, USER_EMAIL_KEY, USER_ID_KEY,
};
use super::types::{
    AuthError, AuthPhase, Session, SessionSnapshot, SignUpRequest, UserProfile,
};
use crate::config::ApiConfig;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Shared state behind the manager. Also the forced-logout target the
/// request client calls into, so both paths clear through the same code.
struct SessionCore {
    snapshot: Mutex<SessionSnapshot>,
    publisher: watch::Sender<SessionSnapshot>,
    store: Arc<CredentialStore>,
}

impl SessionCore {
    /// Apply one synchronous mutation and publish the result. The phase and
    /// the token change together inside the guard; observers never see a
    /// token without the authenticated phase or vice versa.
    fn mutate(&self, apply: impl FnOnce(&mut SessionSnapshot)) {
        let mut guard = self.snapshot.lock().unwrap();
        apply(&mut guard);
        let _ = self.publisher.send(guard.clone());
    }

    /// Clear memory and storage. Idempotent; used by logout and forced logout.
    fn clear(&self) {
        self.store.clear_session();
        self.mutate(|snapshot| {
            snapshot.auth = AuthPhase::Anonymous;
            snapshot.last_error = None;
        });
    }

    /// Persist every session field through the store. Entries are written
    /// individually (token and user id obfuscated, profile fields plain);
    /// the in-memory flip in `mutate` is what observers treat as the commit.
    fn persist(&self, session: &Session) {
        self.store.set_secret(TOKEN_KEY, &session.token);
        match &session.user_id {
            Some(id) => self.store.set_secret(USER_ID_KEY, id),
            None => self.store.remove(USER_ID_KEY),
        }
        self.persist_profile(&session.user);
    }

    fn persist_profile(&self, user: &UserProfile) {
        let plain_entries = [
            (USER_EMAIL_KEY, &user.email),
            (NAME_KEY, &user.name),
            (ROLE_KEY, &user.role),
        ];
        for (key, value) in plain_entries {
            match value {
                Some(value) => self.store.set_plain(key, value),
                None => self.store.remove(key),
            }
        }
    }
}

impl ForcedLogout for SessionCore {
    fn force_logout(&self) {
        info!("Forced logout: server rejected the session credential");
        self.clear();
    }
}

/// Session manager
pub struct SessionManager {
    core: Arc<SessionCore>,
    client: ApiClient,
}

impl SessionManager {
    /// Create a manager backed by the platform credential store
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_store(config, CredentialStore::open_default())
    }

    /// Create a manager over an explicit store (tests inject a scratch root)
    pub fn with_store(config: &ApiConfig, store: CredentialStore) -> Self {
        let store = Arc::new(store);

        let initial = rehydrate(&store);
        match initial.auth.session() {
            Some(session) => info!(
                "Restored session for user {}",
                session.user_id.as_deref().unwrap_or("<unknown>")
            ),
            None => info!("No stored session; starting anonymous"),
        }

        let (publisher, _) = watch::channel(initial.clone());
        let core = Arc::new(SessionCore {
            snapshot: Mutex::new(initial),
            publisher,
            store: Arc::clone(&store),
        });

        let mut client = ApiClient::new(config, store);
        client.set_forced_logout(core.clone());

        Self { core, client }
    }

    /// The request client, for feature calls that need the session credential
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Current state, cloned out of the guard
    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.snapshot.lock().unwrap().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().token().map(str::to_string)
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.snapshot().user().cloned()
    }

    /// Watch the snapshot; every mutation publishes a new value. Guards and
    /// UI re-evaluate from here.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.core.publisher.subscribe()
    }

    /// Log in with email and password.
    ///
    /// On success all fields are persisted and the snapshot flips to
    /// authenticated in one mutation. On failure the previous phase is
    /// untouched and the backend message lands in `last_error`.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        debug!("Logging in {}", email);

        let result = self
            .client
            .login(email, password)
            .await
            .and_then(|response| response.normalize());

        match result {
            Ok(session) => {
                self.core.persist(&session);
                self.core.mutate(|snapshot| {
                    snapshot.auth = AuthPhase::Authenticated(session.clone());
                    snapshot.last_error = None;
                });
                info!(
                    "Login successful for user {}",
                    session.user_id.as_deref().unwrap_or("<unknown>")
                );
                Ok(session)
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                self.core
                    .mutate(|snapshot| snapshot.last_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Register a new account; same contract as [`login`](Self::login).
    ///
    /// An "already registered" rejection is passed through verbatim; callers
    /// special-case it with
    /// [`is_already_registered`](super::http_client::is_already_registered).
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Session, AuthError> {
        debug!("Signing up {}", request.email);

        let result = self
            .client
            .create_user(request)
            .await
            .and_then(|response| response.normalize());

        match result {
            Ok(session) => {
                self.core.persist(&session);
                self.core.mutate(|snapshot| {
                    snapshot.auth = AuthPhase::Authenticated(session.clone());
                    snapshot.last_error = None;
                });
                info!("Signup successful for {}", request.email);
                Ok(session)
            }
            Err(e) => {
                warn!("Signup failed: {}", e);
                self.core
                    .mutate(|snapshot| snapshot.last_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Log out locally: clear the snapshot and every persisted entry in the
    /// same call. Unconditional and idempotent; logging out while anonymous
    /// is a no-op success.
    pub fn logout(&self) {
        info!("Logging out");
        self.core.clear();
    }

    /// Log out and tell the server. The local clear happens first and never
    /// depends on the notification; a server failure is logged and dropped.
    pub async fn sign_out(&self) {
        let user_id = self
            .snapshot()
            .auth
            .session()
            .and_then(|s| s.user_id.clone());

        self.logout();

        if let Some(user_id) = user_id {
            if let Err(e) = self.client.notify_logout(&user_id).await {
                warn!("Logout notification failed (ignored): {}", e);
            }
        }
    }

    /// Re-fetch the user's details and fold changed fields into the session.
    ///
    /// No-op when anonymous or when the session has no user id. A logout
    /// that lands while the fetch is in flight wins; the stale profile is
    /// discarded.
    pub async fn refresh_profile(&self) -> Result<(), AuthError> {
        let user_id = match self.snapshot().auth.session() {
            Some(session) => match session.user_id.clone() {
                Some(id) => id,
                None => {
                    debug!("Session has no user id; skipping profile refresh");
                    return Ok(());
                }
            },
            None => return Ok(()),
        };

        let detail = self.client.user_details(&user_id).await?;
        let incoming = detail.user_detail.into_profile();

        let mut updated = None;
        self.core.mutate(|snapshot| {
            if let AuthPhase::Authenticated(session) = &mut snapshot.auth {
                merge_profile(&mut session.user, incoming);
                updated = Some(session.user.clone());
            }
        });

        if let Some(user) = updated {
            self.core.persist_profile(&user);
            info!("Profile refreshed for user {}", user_id);
        }

        Ok(())
    }

    /// Clear the last recorded error only
    pub fn clear_error(&self) {
        self.core.mutate(|snapshot| snapshot.last_error = None);
    }
}

/// Fields the backend sent replace ours; fields it omitted are kept.
fn merge_profile(current: &mut UserProfile, incoming: UserProfile) {
    if incoming.id.is_some() {
        current.id = incoming.id;
    }
    if incoming.name.is_some() {
        current.name = incoming.name;
    }
    if incoming.email.is_some() {
        current.email = incoming.email;
    }
    if incoming.phone.is_some() {
        current.phone = incoming.phone;
    }
    if incoming.role.is_some() {
        current.role = incoming.role;
    }
}

/// Rebuild the snapshot from persisted entries. A stored token yields an
/// authenticated phase; anything else starts anonymous. Never fails; a
/// broken store means starting fresh, not crashing.
fn rehydrate(store: &CredentialStore) -> SessionSnapshot {
    let token = match store.get_secret(TOKEN_KEY) {
        Some(token) if !token.is_empty() => token,
        _ => return SessionSnapshot::default(),
    };

    let user_id = store.get_secret(USER_ID_KEY);
    let user = UserProfile {
        id: user_id.clone(),
        name: store.get_plain(NAME_KEY),
        email: store.get_plain(USER_EMAIL_KEY),
        phone: None,
        role: store.get_plain(ROLE_KEY),
    };

    SessionSnapshot {
        auth: AuthPhase::Authenticated(Session {
            token,
            user_id,
            user,
        }),
        last_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_manager(dir: &std::path::Path) -> SessionManager {
        let config = ApiConfig::new("http://127.0.0.1:1"); // never dialed in these tests
        SessionManager::with_store(&config, CredentialStore::new(dir))
    }

    fn seed_session(dir: &std::path::Path) {
        let store = CredentialStore::new(dir);
        store.set_secret(TOKEN_KEY, "T1");
        store.set_secret(USER_ID_KEY, "42");
        store.set_plain(USER_EMAIL_KEY, "a@b.com");
        store.set_plain(NAME_KEY, "Ann");
        store.set_plain(ROLE_KEY, "admin");
    }

    #[test]
    fn test_rehydrates_authenticated_session_from_store() {
        let dir = tempfile::tempdir().unwrap();
        seed_session(dir.path());

        let manager = scratch_manager(dir.path());
        assert!(manager.is_authenticated());
        assert_eq!(manager.token().as_deref(), Some("T1"));

        let user = manager.current_user().unwrap();
        assert_eq!(user.id.as_deref(), Some("42"));
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(user.name.as_deref(), Some("Ann"));
        assert_eq!(user.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_starts_anonymous_with_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = scratch_manager(dir.path());
        assert!(!manager.is_authenticated());
        assert_eq!(manager.token(), None);
        assert_eq!(manager.current_user(), None);
    }

    #[test]
    fn test_authenticated_flag_tracks_token_presence() {
        let dir = tempfile::tempdir().unwrap();
        seed_session(dir.path());
        let manager = scratch_manager(dir.path());

        assert_eq!(manager.is_authenticated(), manager.token().is_some());
        manager.logout();
        assert_eq!(manager.is_authenticated(), manager.token().is_some());
    }

    #[test]
    fn test_logout_is_idempotent_and_clears_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        seed_session(dir.path());
        let manager = scratch_manager(dir.path());
        assert!(manager.is_authenticated());

        manager.logout();
        let after_first = manager.snapshot();
        assert!(!after_first.is_authenticated());

        // Storage is empty too
        let store = CredentialStore::new(dir.path());
        assert_eq!(store.get_secret(TOKEN_KEY), None);
        assert_eq!(store.get_secret(USER_ID_KEY), None);
        assert_eq!(store.get_plain(USER_EMAIL_KEY), None);

        // A second logout lands in the same state
        manager.logout();
        assert_eq!(manager.snapshot(), after_first);
    }

    #[test]
    fn test_forced_logout_clears_through_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        seed_session(dir.path());
        let manager = scratch_manager(dir.path());

        manager.core.force_logout();
        assert!(!manager.is_authenticated());
        let store = CredentialStore::new(dir.path());
        assert_eq!(store.get_secret(TOKEN_KEY), None);
    }

    #[test]
    fn test_clear_error_leaves_phase_alone() {
        let dir = tempfile::tempdir().unwrap();
        seed_session(dir.path());
        let manager = scratch_manager(dir.path());

        manager
            .core
            .mutate(|s| s.last_error = Some("Invalid credentials".to_string()));
        assert!(manager.is_authenticated());
        assert!(manager.snapshot().last_error.is_some());

        manager.clear_error();
        assert!(manager.is_authenticated());
        assert_eq!(manager.snapshot().last_error, None);
    }

    #[test]
    fn test_subscribers_see_every_mutation() {
        let dir = tempfile::tempdir().unwrap();
        seed_session(dir.path());
        let manager = scratch_manager(dir.path());

        let mut rx = manager.subscribe();
        assert!(rx.borrow_and_update().is_authenticated());

        manager.logout();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated());

        manager.clear_error();
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_merge_profile_keeps_omitted_fields() {
        let mut current = UserProfile {
            id: Some("42".to_string()),
            name: Some("Ann".to_string()),
            email: Some("a@b.com".to_string()),
            phone: Some("555".to_string()),
            role: Some("viewer".to_string()),
        };
        let incoming = UserProfile {
            id: None,
            name: Some("Ann Lee".to_string()),
            email: None,
            phone: None,
            role: Some("admin".to_string()),
        };

        merge_profile(&mut current, incoming);
        assert_eq!(current.id.as_deref(), Some("42"));
        assert_eq!(current.name.as_deref(), Some("Ann Lee"));
        assert_eq!(current.email.as_deref(), Some("a@b.com"));
        assert_eq!(current.phone.as_deref(), Some("555"));
        assert_eq!(current.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_rehydrate_ignores_blank_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.set_secret(TOKEN_KEY, "");
        store.set_plain(NAME_KEY, "Ann");

        let manager = scratch_manager(dir.path());
        assert!(!manager.is_authenticated());
    }
}
