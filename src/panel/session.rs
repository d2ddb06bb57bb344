//! Per-client session holder with single-flight login.

use super::error::Error;
use std::fmt;
use std::future::Future;
use tokio::sync::Mutex;

/// Validity of the stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No login has been attempted yet.
    Unknown,
    /// A credential is held and was last accepted by the panel.
    Valid,
    /// The panel rejected the credential; the next caller must log in again.
    Invalidated,
}

#[derive(Default)]
struct Session {
    credential: Option<String>,
    invalidated: bool,
    generation: u64,
}

impl Session {
    fn state(&self) -> SessionState {
        match (&self.credential, self.invalidated) {
            (_, true) => SessionState::Invalidated,
            (Some(_), false) => SessionState::Valid,
            (None, false) => SessionState::Unknown,
        }
    }
}

/// A snapshot of the session handed to one request attempt.
///
/// The generation identifies which login produced the credential, so a
/// caller reporting a rejection only triggers a renewal if nobody else has
/// renewed in the meantime.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub credential: String,
    pub generation: u64,
}

impl fmt::Debug for SessionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTicket")
            .field("credential", &"[REDACTED]")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Holds the authentication artifact (bearer token or cookie) for one panel.
///
/// Login and renewal run while the lock is held: concurrent callers queue
/// behind the one login in flight and then reuse its result.
pub struct SessionStore {
    inner: Mutex<Session>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Session::default()),
        }
    }

    /// Return the current credential, logging in first if there is none.
    pub async fn current<F, Fut>(&self, login: F) -> Result<SessionTicket, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        let mut session = self.inner.lock().await;
        if let Some(credential) = session.credential.as_ref()
            && !session.invalidated
        {
            return Ok(SessionTicket {
                credential: credential.clone(),
                generation: session.generation,
            });
        }
        Self::login_locked(&mut session, login).await
    }

    /// Replace a credential the panel rejected.
    ///
    /// If the session has already moved past `stale.generation`, the newer
    /// credential is returned without logging in again.
    pub async fn renew<F, Fut>(&self, stale: &SessionTicket, login: F) -> Result<SessionTicket, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        let mut session = self.inner.lock().await;
        if session.generation != stale.generation
            && let Some(credential) = session.credential.as_ref()
            && !session.invalidated
        {
            tracing::debug!(
                generation = session.generation,
                "session already renewed by another caller"
            );
            return Ok(SessionTicket {
                credential: credential.clone(),
                generation: session.generation,
            });
        }

        session.credential = None;
        session.invalidated = true;
        Self::login_locked(&mut session, login).await
    }

    /// Mark the session rejected without logging in again.
    pub async fn invalidate(&self, stale: &SessionTicket) {
        let mut session = self.inner.lock().await;
        if session.generation == stale.generation {
            session.credential = None;
            session.invalidated = true;
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state()
    }

    async fn login_locked<F, Fut>(session: &mut Session, login: F) -> Result<SessionTicket, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        let credential = login().await?;
        session.generation += 1;
        session.credential = Some(credential.clone());
        session.invalidated = false;
        Ok(SessionTicket {
            credential,
            generation: session.generation,
        })
    }
}
