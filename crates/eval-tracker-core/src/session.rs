use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub const DEFAULT_SESSION_LIFETIME_HOURS: i64 = 24;

/// Verified user identity attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub oid: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl Identity {
    /// Marks the identity as admin when its email appears in `admin_emails`
    /// (case-insensitive).
    #[must_use]
    pub fn with_admin_from(mut self, admin_emails: &[String]) -> Self {
        self.is_admin = self.email.as_deref().is_some_and(|email| {
            admin_emails
                .iter()
                .any(|admin| admin.trim().eq_ignore_ascii_case(email.trim()))
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub user: Identity,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Session {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        user: Identity,
        now: OffsetDateTime,
        lifetime: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user,
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: Option<&str>) -> Identity {
        Identity {
            oid: "oid-1".to_string(),
            name: "Ada".to_string(),
            email: email.map(str::to_string),
            is_admin: false,
        }
    }

    #[test]
    fn session_expires_after_lifetime() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
        let session = Session::new(
            "abc",
            identity(None),
            now,
            Duration::hours(DEFAULT_SESSION_LIFETIME_HOURS),
        );
        assert!(!session.is_expired(now));
        assert!(!session.is_expired(now + Duration::hours(23)));
        assert!(session.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn admin_is_decided_by_email_membership() {
        let admins = vec!["Admin@Example.com".to_string()];
        assert!(identity(Some("admin@example.com")).with_admin_from(&admins).is_admin);
        assert!(!identity(Some("user@example.com")).with_admin_from(&admins).is_admin);
        assert!(!identity(None).with_admin_from(&admins).is_admin);
    }
}
