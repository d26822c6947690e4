use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use eval_tracker_core::{now_utc, Identity, Session};
use eval_tracker_store_json::{JsonSessionStore, SweepReport};
use time::Duration;

/// Opaque, URL-safe session identifier drawn from 32 random bytes.
#[must_use]
pub fn new_session_id() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Maps session IDs to verified identities with a fixed lifetime.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<JsonSessionStore>,
    lifetime: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<JsonSessionStore>, lifetime: Duration) -> Self {
        Self { store, lifetime }
    }

    pub fn open(sessions_dir: &Path, lifetime: Duration) -> Result<Self> {
        let store = JsonSessionStore::open(sessions_dir).with_context(|| {
            format!("failed to open session store at {}", sessions_dir.display())
        })?;
        Ok(Self::new(Arc::new(store), lifetime))
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn create(&self, session_id: &str, user: Identity) -> Result<Session> {
        let session = Session::new(session_id, user, now_utc(), self.lifetime);
        self.store.put(&session)?;
        tracing::info!(user = %session.user.name, admin = session.user.is_admin, "session created");
        Ok(session)
    }

    /// Absent, expired and malformed sessions all read as `None`.
    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        self.store.get(session_id, now_utc())
    }

    pub fn current_user(&self, session_id: Option<&str>) -> Result<Option<Identity>> {
        let Some(session_id) = session_id else {
            return Ok(None);
        };
        Ok(self.get(session_id)?.map(|session| session.user))
    }

    pub fn delete(&self, session_id: &str) -> Result<bool> {
        self.store.delete(session_id)
    }

    pub fn store_verifier(&self, state: &str, verifier: &str) -> Result<()> {
        self.store.put_verifier(state, verifier, now_utc())
    }

    /// Single use: the verifier is removed as it is read.
    pub fn take_verifier(&self, state: &str) -> Result<Option<String>> {
        self.store.take_verifier(state, now_utc())
    }

    pub fn sweep_expired(&self) -> Result<SweepReport> {
        let report = self.store.sweep_expired(now_utc())?;
        if report.sessions_removed > 0 || report.verifiers_removed > 0 {
            tracing::info!(
                sessions = report.sessions_removed,
                verifiers = report.verifiers_removed,
                "swept expired sessions"
            );
        }
        Ok(report)
    }

    pub fn count_active(&self) -> Result<usize> {
        self.store.count_active(now_utc())
    }
}
