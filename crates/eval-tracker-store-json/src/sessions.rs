use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use eval_tracker_core::{is_valid_record_id, Session};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::atomic::{read_json, write_json_atomic};

const VERIFIERS_FILE: &str = "verifiers.json";

/// Pending logins older than this are discarded.
pub const VERIFIER_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct PendingLogin {
    verifier: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_removed: usize,
    pub verifiers_removed: usize,
}

/// Session documents stored as `<session_id>.json`, plus the PKCE verifier
/// map in `verifiers.json`.
pub struct JsonSessionStore {
    dir: PathBuf,
    verifiers_path: PathBuf,
    verifier_lock: Mutex<()>,
}

impl JsonSessionStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create sessions directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            verifiers_path: dir.join(VERIFIERS_FILE),
            verifier_lock: Mutex::new(()),
        })
    }

    pub fn put(&self, session: &Session) -> Result<()> {
        if !is_valid_record_id(&session.session_id) {
            return Err(anyhow!("session id contains unsupported characters"));
        }
        write_json_atomic(&self.session_path(&session.session_id), session)
            .context("failed to persist session")
    }

    /// Returns the live session for `session_id`. Expired sessions are
    /// deleted on access; malformed documents read as absent.
    pub fn get(&self, session_id: &str, now: OffsetDateTime) -> Result<Option<Session>> {
        if !is_valid_record_id(session_id) {
            return Ok(None);
        }
        let session: Session = match read_json(&self.session_path(session_id)) {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "discarding unreadable session");
                return Ok(None);
            }
        };
        if session.is_expired(now) {
            self.delete(session_id)?;
            tracing::debug!("evicted expired session on access");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Idempotent; returns whether a session document was removed.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        if !is_valid_record_id(session_id) {
            return Ok(false);
        }
        match fs::remove_file(self.session_path(session_id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).context("failed to delete session"),
        }
    }

    /// Removes expired or unreadable sessions and stale PKCE verifiers.
    pub fn sweep_expired(&self, now: OffsetDateTime) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for (session_id, session) in self.scan()? {
            let expired = session.as_ref().map_or(true, |session| session.is_expired(now));
            if expired && self.delete(&session_id)? {
                report.sessions_removed += 1;
            }
        }

        let _guard = self.lock_verifiers()?;
        let mut pending = self.read_verifiers();
        let before = pending.len();
        pending.retain(|_, login| !verifier_expired(login, now));
        report.verifiers_removed = before - pending.len();
        if report.verifiers_removed > 0 {
            write_json_atomic(&self.verifiers_path, &pending)
                .context("failed to persist pruned verifiers")?;
        }
        Ok(report)
    }

    pub fn count_active(&self, now: OffsetDateTime) -> Result<usize> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(_, session)| session.as_ref().is_some_and(|session| !session.is_expired(now)))
            .count())
    }

    pub fn put_verifier(&self, state: &str, verifier: &str, now: OffsetDateTime) -> Result<()> {
        let _guard = self.lock_verifiers()?;
        let mut pending = self.read_verifiers();
        pending.retain(|_, login| !verifier_expired(login, now));
        pending.insert(
            state.to_string(),
            PendingLogin {
                verifier: verifier.to_string(),
                created_at: now,
            },
        );
        write_json_atomic(&self.verifiers_path, &pending).context("failed to persist verifier")
    }

    /// Removes and returns the verifier for `state`; a second call yields
    /// `None`.
    pub fn take_verifier(&self, state: &str, now: OffsetDateTime) -> Result<Option<String>> {
        let _guard = self.lock_verifiers()?;
        let mut pending = self.read_verifiers();
        let Some(login) = pending.remove(state) else {
            return Ok(None);
        };
        write_json_atomic(&self.verifiers_path, &pending).context("failed to persist verifiers")?;
        if verifier_expired(&login, now) {
            return Ok(None);
        }
        Ok(Some(login.verifier))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn lock_verifiers(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.verifier_lock
            .lock()
            .map_err(|_| anyhow!("verifier lock poisoned"))
    }

    fn read_verifiers(&self) -> BTreeMap<String, PendingLogin> {
        match read_json(&self.verifiers_path) {
            Ok(pending) => pending.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "resetting unreadable verifier map");
                BTreeMap::new()
            }
        }
    }

    fn scan(&self) -> Result<Vec<(String, Option<Session>)>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list sessions directory {}", self.dir.display()))?;
        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.context("failed to read sessions directory entry")?;
            let name = entry.file_name();
            let Some(file_name) = name.to_str() else {
                continue;
            };
            if file_name == VERIFIERS_FILE {
                continue;
            }
            let Some(session_id) = file_name.strip_suffix(".json") else {
                continue;
            };
            if !is_valid_record_id(session_id) {
                continue;
            }
            let session = read_json::<Session>(&entry.path()).ok().flatten();
            sessions.push((session_id.to_string(), session));
        }
        Ok(sessions)
    }
}

fn verifier_expired(login: &PendingLogin, now: OffsetDateTime) -> bool {
    now - login.created_at >= Duration::minutes(VERIFIER_TTL_MINUTES)
}
