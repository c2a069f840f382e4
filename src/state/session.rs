//! Session store: who is logged in, and what they may do.
//!
//! DESIGN
//! ======
//! The session lives in a `tokio::sync::watch` channel owned by the store.
//! The store is the only writer; everything else gets a snapshot or a
//! receiver. All writes go through `set_user` / `clear_user` (directly or
//! from the async actions), and `is_authenticated` is derived from `user`
//! so the two can never disagree.
//!
//! ORDERING
//! ========
//! Each action takes a ticket when it starts. A commit carrying a ticket
//! older than the last committed revision is dropped, so a slow response
//! cannot overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::net::auth::AuthApi;
use crate::net::error::ApiError;
use crate::net::types::{Credentials, User};

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    user: Option<User>,
    revision: u64,
}

impl Session {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_user)
    }

    /// Ticket of the last applied commit; 0 before the first one.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Process-wide authentication state plus the actions that change it.
pub struct SessionStore<A> {
    api: A,
    state: watch::Sender<Session>,
    tickets: AtomicU64,
}

impl<A: AuthApi> SessionStore<A> {
    #[must_use]
    pub fn new(api: A) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self { api, state, tickets: AtomicU64::new(0) }
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    // -------------------------------------------------------------------------
    // READ ACCESS
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that observes every applied commit.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.state.borrow().is_user()
    }

    // -------------------------------------------------------------------------
    // MUTATION ENTRY POINTS
    // -------------------------------------------------------------------------

    /// Replace the current user; `None` logs out.
    pub fn set_user(&self, user: Option<User>) {
        let ticket = self.next_ticket();
        self.commit(ticket, user);
    }

    pub fn clear_user(&self) {
        self.set_user(None);
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `user` unless a newer commit already landed. Returns whether it applied.
    fn commit(&self, ticket: u64, user: Option<User>) -> bool {
        self.state.send_if_modified(|session| {
            if ticket < session.revision {
                tracing::debug!(ticket, revision = session.revision, "stale session commit dropped");
                return false;
            }
            session.user = user;
            session.revision = ticket;
            true
        })
    }

    // -------------------------------------------------------------------------
    // ACTIONS
    // -------------------------------------------------------------------------

    /// Log in; `true` on success. Failures are logged and leave the session as it was.
    pub async fn login(&self, credentials: &Credentials) -> bool {
        match self.try_login(credentials).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, code = e.error_code(), "login failed");
                false
            }
        }
    }

    /// Log in and return whatever user the backend sent, keeping the failure kind.
    ///
    /// A successful response is committed as-is, so a payload without a user
    /// leaves the session logged out.
    ///
    /// # Errors
    ///
    /// Returns the wrapper error. The session is untouched on error.
    pub async fn try_login(&self, credentials: &Credentials) -> Result<Option<User>, ApiError> {
        let ticket = self.next_ticket();
        let response = self.api.login(credentials).await?;
        self.commit(ticket, response.user.clone());
        Ok(response.user)
    }

    /// Re-validate the session with the backend. Any failure logs out.
    pub async fn check_login_status(&self) {
        let ticket = self.next_ticket();
        match self.api.check_auth().await {
            Ok(response) => {
                self.commit(ticket, response.user);
            }
            Err(e) => {
                tracing::debug!(error = %e, "session check failed; clearing user");
                self.commit(ticket, None);
            }
        }
    }

    /// Tell the backend to end the session, then clear local state regardless.
    ///
    /// # Errors
    ///
    /// Returns the wrapper error from the logout call; the session is
    /// cleared either way.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.api.logout().await;
        self.clear_user();
        result
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
