use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::registration::RegistrationDraft;

/// Where a user currently is in the dialogue
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Registering(RegistrationDraft),
    ChoosingScope,
}

/// Per-user dialogue state
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub phase: Phase,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            phase: Phase::Idle,
        }
    }

    pub fn draft(&self) -> Option<&RegistrationDraft> {
        match &self.phase {
            Phase::Registering(draft) => Some(draft),
            _ => None,
        }
    }
}

/// Sessions keyed by user id
///
/// Holding the guard returned by [`SessionStore::acquire`] serializes a
/// user's events: tokio's mutex is fair, so waiters are served in arrival
/// order. Sessions idle for longer than the TTL are dropped along with any
/// draft they hold.
#[derive(Clone)]
pub struct SessionStore {
    sessions: moka::future::Cache<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new(max_sessions: u64, idle_ttl: Duration) -> Self {
        let sessions = moka::future::CacheBuilder::new(max_sessions)
            .time_to_idle(idle_ttl)
            .build();

        Self { sessions }
    }

    /// Lock the session of `user_id`, creating an idle one if needed
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<Session> {
        let session = self
            .sessions
            .get_with(user_id.to_string(), async {
                Arc::new(Mutex::new(Session::new(user_id)))
            })
            .await;

        session.lock_owned().await
    }

    /// Number of sessions currently cached
    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(100_000, Duration::from_secs(3600))
    }
}
