//! Domain model for the evaluation request tracker: request records, the
//! lifecycle state machine, cross-field validation and login sessions.

use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

pub mod catalog;
mod lifecycle;
mod model;
mod session;
pub mod validation;

pub use lifecycle::sort_by_priority;
pub use model::{
    AgentType, EvaluationRequest, ImportSummary, NewRequest, Priority, Purpose, RequestStatus,
    RequestUpdate, RunLink, RunLinkInput, UpdateEntry,
};
pub use session::{Identity, Session, DEFAULT_SESSION_LIFETIME_HOURS};
pub use validation::{validate_request_fields, RequestFields, MAX_RUN_LINKS};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TrackerError {
    #[error("request not found: {0}")]
    NotFound(String),
    #[error("cannot {action} request {id} while it is {from}")]
    InvalidTransition {
        id: String,
        from: RequestStatus,
        action: &'static str,
    },
    #[error("validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl TrackerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }
}

/// Generates a request identifier `req_<unix-seconds>_<12 lowercase hex>`.
#[must_use]
pub fn generate_request_id(now: OffsetDateTime) -> String {
    let suffix = Ulid::new().random() & 0xffff_ffff_ffff;
    format!("req_{}_{suffix:012x}", now.unix_timestamp())
}

/// Record identifiers double as file names, so only `[A-Za-z0-9_-]` is
/// accepted.
#[must_use]
pub fn is_valid_record_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-')
}

/// Parses an RFC3339 timestamp and normalizes it to UTC.
///
/// # Errors
/// Returns [`TrackerError::Validation`] when parsing fails.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, TrackerError> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map(|parsed| parsed.to_offset(UtcOffset::UTC))
        .map_err(|err| TrackerError::validation(format!("invalid RFC3339 timestamp: {err}")))
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`TrackerError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, TrackerError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| TrackerError::validation(format!("failed to format RFC3339 timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn request_id_has_expected_shape() {
        let now = must_ok(parse_rfc3339_utc("2025-10-15T12:00:00Z"));
        let id = generate_request_id(now);
        let suffix = match id.strip_prefix(&format!("req_{}_", now.unix_timestamp())) {
            Some(suffix) => suffix,
            None => panic!("unexpected id prefix: {id}"),
        };
        assert_eq!(suffix.len(), 12);
        assert!(suffix
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch)));
        assert!(is_valid_record_id(&id));
        assert_ne!(id, generate_request_id(now));
    }

    #[test]
    fn record_ids_reject_path_characters() {
        assert!(is_valid_record_id("req_1700000000_0123456789ab"));
        assert!(is_valid_record_id("legacy-import_7"));
        assert!(!is_valid_record_id(""));
        assert!(!is_valid_record_id("../index"));
        assert!(!is_valid_record_id("req/1"));
        assert!(!is_valid_record_id("req 1"));
        assert!(!is_valid_record_id("req.json"));
    }

    #[test]
    fn timestamps_normalize_to_utc() {
        let parsed = must_ok(parse_rfc3339_utc("2025-10-15T14:00:00+02:00"));
        assert_eq!(must_ok(format_rfc3339(parsed)), "2025-10-15T12:00:00Z");
        assert!(parse_rfc3339_utc("yesterday").is_err());
    }

    #[test]
    fn validation_error_lists_every_violation() {
        let err = TrackerError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "validation error: a; b");
    }
}
