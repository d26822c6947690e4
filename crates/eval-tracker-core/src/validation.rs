use crate::model::{EvaluationRequest, NewRequest, Purpose, RunLinkInput};
use crate::TrackerError;

pub const MAX_RUN_LINKS: usize = 10;
pub const MAX_PURPOSE_REASON_CHARS: usize = 500;
pub const MAX_QUERY_SET_DETAILS_CHARS: usize = 500;
pub const MAX_NOTES_CHARS: usize = 2000;
pub const MAX_ON_BEHALF_OF_CHARS: usize = 200;
pub const MAX_LINK_NOTES_CHARS: usize = 500;
pub const MAX_UPDATE_NOTE_CHARS: usize = 1000;

/// Query set value that requires `query_set_details`.
pub const QUERY_SET_OTHERS: &str = "Others";

/// Borrowed view over the business fields shared by submissions and stored
/// records, so both go through the same cross-field checks.
#[derive(Debug, Clone, Copy)]
pub struct RequestFields<'a> {
    pub purpose: Purpose,
    pub purpose_reason: Option<&'a str>,
    pub agents: &'a [String],
    pub query_set: &'a str,
    pub query_set_details: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub on_behalf_of: Option<&'a str>,
}

impl NewRequest {
    #[must_use]
    pub fn fields(&self) -> RequestFields<'_> {
        RequestFields {
            purpose: self.purpose,
            purpose_reason: self.purpose_reason.as_deref(),
            agents: &self.agents,
            query_set: &self.query_set,
            query_set_details: self.query_set_details.as_deref(),
            notes: self.notes.as_deref(),
            on_behalf_of: self.on_behalf_of.as_deref(),
        }
    }

    /// Validates a submission before it becomes a record.
    ///
    /// # Errors
    /// Returns [`TrackerError::Validation`] listing every violated constraint.
    pub fn validate(&self) -> Result<(), TrackerError> {
        into_result(validate_request_fields(&self.fields()))
    }
}

impl EvaluationRequest {
    #[must_use]
    pub fn fields(&self) -> RequestFields<'_> {
        RequestFields {
            purpose: self.purpose,
            purpose_reason: self.purpose_reason.as_deref(),
            agents: &self.agents,
            query_set: &self.query_set,
            query_set_details: self.query_set_details.as_deref(),
            notes: self.notes.as_deref(),
            on_behalf_of: self.on_behalf_of.as_deref(),
        }
    }

    /// Validates a full record: business fields plus link constraints.
    /// Used for merged updates and imported documents.
    ///
    /// # Errors
    /// Returns [`TrackerError::Validation`] listing every violated constraint.
    pub fn validate(&self) -> Result<(), TrackerError> {
        let mut violations = validate_request_fields(&self.fields());
        if !crate::is_valid_record_id(&self.id) {
            violations.push(format!("id '{}' contains unsupported characters", self.id));
        }
        if self.run_links.len() > MAX_RUN_LINKS {
            violations.push(format!(
                "at most {MAX_RUN_LINKS} run links are allowed per request"
            ));
        }
        for link in &self.run_links {
            if let Err(message) = check_link(&link.url, link.notes.as_deref()) {
                violations.push(message);
            }
        }
        into_result(violations)
    }
}

/// Checks the cross-field invariants of a request in one pass.
///
/// Returns every violation found; an empty list means the fields are valid.
#[must_use]
pub fn validate_request_fields(fields: &RequestFields<'_>) -> Vec<String> {
    let mut violations = Vec::new();

    if fields.purpose == Purpose::AdHoc && is_blank(fields.purpose_reason) {
        violations.push("purpose_reason is required for Ad-hoc requests".to_string());
    }
    if fields.query_set == QUERY_SET_OTHERS && is_blank(fields.query_set_details) {
        violations.push("query_set_details is required for Others query set".to_string());
    }
    if fields.agents.is_empty() {
        violations.push("agents MUST contain at least one agent".to_string());
    } else if fields.agents.iter().any(|agent| agent.trim().is_empty()) {
        violations.push("agent names cannot be empty".to_string());
    }

    for (name, value, max) in [
        (
            "purpose_reason",
            fields.purpose_reason,
            MAX_PURPOSE_REASON_CHARS,
        ),
        (
            "query_set_details",
            fields.query_set_details,
            MAX_QUERY_SET_DETAILS_CHARS,
        ),
        ("notes", fields.notes, MAX_NOTES_CHARS),
        ("on_behalf_of", fields.on_behalf_of, MAX_ON_BEHALF_OF_CHARS),
    ] {
        if let Some(text) = value {
            if text.chars().count() > max {
                violations.push(format!("{name} MUST be at most {max} characters"));
            }
        }
    }

    violations
}

/// Validates a batch of submitted run links.
///
/// # Errors
/// Returns [`TrackerError::Validation`] naming each rejected link.
pub fn validate_run_links(links: &[RunLinkInput]) -> Result<(), TrackerError> {
    into_result(
        links
            .iter()
            .filter_map(|link| check_link(&link.url, link.notes.as_deref()).err())
            .collect(),
    )
}

/// Run link URLs must carry an explicit http or https scheme.
#[must_use]
pub fn is_valid_link_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn check_link(url: &str, notes: Option<&str>) -> Result<(), String> {
    if !is_valid_link_url(url) {
        return Err(format!("URL must start with http:// or https:// (got '{url}')"));
    }
    if notes.is_some_and(|text| text.chars().count() > MAX_LINK_NOTES_CHARS) {
        return Err(format!(
            "run link notes MUST be at most {MAX_LINK_NOTES_CHARS} characters"
        ));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |text| text.trim().is_empty())
}

pub(crate) fn into_result(violations: Vec<String>) -> Result<(), TrackerError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(TrackerError::Validation(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentType, Priority};

    fn submission() -> NewRequest {
        NewRequest {
            purpose: Purpose::FlightReview,
            purpose_reason: None,
            agent_type: AgentType::DeclarativeAgent,
            agents: vec!["GitHub".to_string()],
            query_set: "Default".to_string(),
            query_set_details: None,
            control_config: "Current Prod".to_string(),
            treatment_config: "Current Prod".to_string(),
            notes: None,
            priority: Priority::Medium,
            on_behalf_of: None,
        }
    }

    #[test]
    fn url_scheme_rules() {
        assert!(!is_valid_link_url("ftp://x"));
        assert!(!is_valid_link_url("example.com"));
        assert!(is_valid_link_url("http://x"));
        assert!(is_valid_link_url("https://x"));
    }

    #[test]
    fn adhoc_requires_reason() {
        let mut input = submission();
        input.purpose = Purpose::AdHoc;
        match input.validate() {
            Err(TrackerError::Validation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("purpose_reason is required"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        input.purpose_reason = Some("Testing custom scenario".to_string());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn non_adhoc_purposes_do_not_need_reason() {
        for purpose in [Purpose::RaiCheck, Purpose::FlightReview, Purpose::Gpt5Migration] {
            let mut input = submission();
            input.purpose = purpose;
            assert!(input.validate().is_ok(), "{purpose:?} should validate");
        }
    }

    #[test]
    fn others_query_set_requires_details() {
        let mut input = submission();
        input.query_set = QUERY_SET_OTHERS.to_string();
        input.query_set_details = Some("   ".to_string());
        assert!(input.validate().is_err());

        input.query_set_details = Some("custom 200-query set".to_string());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn all_violations_are_reported_together() {
        let mut input = submission();
        input.purpose = Purpose::AdHoc;
        input.query_set = QUERY_SET_OTHERS.to_string();
        input.agents = Vec::new();
        input.on_behalf_of = Some("x".repeat(MAX_ON_BEHALF_OF_CHARS + 1));

        let violations = validate_request_fields(&input.fields());
        assert_eq!(violations.len(), 4, "{violations:?}");
    }

    #[test]
    fn link_batch_reports_bad_scheme_and_long_notes() {
        let mut long_notes = RunLinkInput::new("https://example.com/run");
        long_notes.notes = Some("n".repeat(MAX_LINK_NOTES_CHARS + 1));
        let links = vec![RunLinkInput::new("ftp://x"), long_notes];

        match validate_run_links(&links) {
            Err(TrackerError::Validation(violations)) => assert_eq!(violations.len(), 2),
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert!(validate_run_links(&[RunLinkInput::new("http://x")]).is_ok());
    }
}
