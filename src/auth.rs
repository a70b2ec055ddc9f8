use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Authenticated user session handed out by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            access_token: access_token.into(),
        }
    }
}

/// Holds the current session and broadcasts sign-in / sign-out transitions.
pub struct SessionProvider {
    tx: watch::Sender<Option<Session>>,
}

impl SessionProvider {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.user_id.clone())
    }

    /// Replace the session. Receivers are only woken when the user changes;
    /// a token refresh for the same user is applied silently.
    pub fn sign_in(&self, session: Session) {
        self.tx.send_if_modified(|current| {
            let user_changed = current.as_ref().map(|s| &s.user_id) != Some(&session.user_id);
            *current = Some(session);
            user_changed
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new()
    }
}
