use std::cmp::Reverse;

use time::OffsetDateTime;

use crate::model::{
    EvaluationRequest, NewRequest, Priority, RequestStatus, RequestUpdate, RunLink, RunLinkInput,
    UpdateEntry,
};
use crate::validation::{validate_run_links, MAX_RUN_LINKS, MAX_UPDATE_NOTE_CHARS};
use crate::{generate_request_id, TrackerError};

impl EvaluationRequest {
    /// Builds a new `pending` record from a validated submission.
    ///
    /// # Errors
    /// Returns [`TrackerError::Validation`] when the submission violates any
    /// field constraint.
    pub fn create(
        input: NewRequest,
        submitter: &str,
        now: OffsetDateTime,
    ) -> Result<Self, TrackerError> {
        input.validate()?;
        Ok(Self {
            id: generate_request_id(now),
            purpose: input.purpose,
            purpose_reason: input.purpose_reason,
            agent_type: input.agent_type,
            agents: input.agents,
            query_set: input.query_set,
            query_set_details: input.query_set_details,
            control_config: input.control_config,
            treatment_config: input.treatment_config,
            notes: input.notes,
            priority: input.priority,
            on_behalf_of: input.on_behalf_of,
            submitter: submitter.to_string(),
            submitted_at: now,
            status: RequestStatus::Pending,
            executor: None,
            started_at: None,
            completed_at: None,
            run_links: Vec::new(),
            update_history: Vec::new(),
        })
    }

    /// Moves a `pending` request to `in_progress` with its first run links.
    ///
    /// # Errors
    /// Returns [`TrackerError::InvalidTransition`] unless the request is
    /// pending, and [`TrackerError::Validation`] unless 1 to 10 valid links
    /// are supplied.
    pub fn start(
        &mut self,
        links: Vec<RunLinkInput>,
        executor: &str,
        now: OffsetDateTime,
    ) -> Result<(), TrackerError> {
        self.require_status(&[RequestStatus::Pending], "start")?;
        if links.is_empty() {
            return Err(TrackerError::validation(
                "at least one run link is required to start a request",
            ));
        }
        if links.len() > MAX_RUN_LINKS {
            return Err(TrackerError::validation(format!(
                "at most {MAX_RUN_LINKS} run links are allowed per request"
            )));
        }
        validate_run_links(&links)?;

        self.status = RequestStatus::InProgress;
        self.executor = Some(executor.to_string());
        self.started_at = Some(now);
        self.run_links = stamp_links(links, now);
        Ok(())
    }

    /// Appends run links and/or a progress note to a started request.
    /// The status is left unchanged.
    ///
    /// # Errors
    /// Returns [`TrackerError::InvalidTransition`] for pending requests and
    /// [`TrackerError::Validation`] when nothing is supplied, a link is
    /// invalid, the note is too long or the link limit would be exceeded.
    pub fn add_links_or_note(
        &mut self,
        links: Vec<RunLinkInput>,
        note: Option<&str>,
        author: &str,
        now: OffsetDateTime,
    ) -> Result<(), TrackerError> {
        self.require_status(
            &[RequestStatus::InProgress, RequestStatus::Completed],
            "add links or notes to",
        )?;
        let note = note.map(str::trim).filter(|text| !text.is_empty());
        if links.is_empty() && note.is_none() {
            return Err(TrackerError::validation(
                "either run links or an update note is required",
            ));
        }
        if note.is_some_and(|text| text.chars().count() > MAX_UPDATE_NOTE_CHARS) {
            return Err(TrackerError::validation(format!(
                "update note MUST be at most {MAX_UPDATE_NOTE_CHARS} characters"
            )));
        }
        if self.run_links.len() + links.len() > MAX_RUN_LINKS {
            return Err(TrackerError::validation(format!(
                "cannot add {} links: request already has {} of {MAX_RUN_LINKS}",
                links.len(),
                self.run_links.len()
            )));
        }
        validate_run_links(&links)?;

        let links_added = u32::try_from(links.len()).unwrap_or(u32::MAX);
        self.run_links.extend(stamp_links(links, now));
        if let Some(note) = note {
            self.update_history.push(UpdateEntry {
                note: note.to_string(),
                author: author.to_string(),
                timestamp: now,
                links_added,
            });
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`TrackerError::InvalidTransition`] unless the request is
    /// in progress.
    pub fn complete(&mut self, now: OffsetDateTime) -> Result<(), TrackerError> {
        self.require_status(&[RequestStatus::InProgress], "complete")?;
        self.status = RequestStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Merges a partial update into the business fields and re-validates the
    /// merged record. On failure the record is left untouched.
    ///
    /// # Errors
    /// Returns [`TrackerError::Validation`] when the merged record is invalid.
    pub fn apply_update(&mut self, update: RequestUpdate) -> Result<(), TrackerError> {
        let mut merged = self.clone();
        if let Some(purpose) = update.purpose {
            merged.purpose = purpose;
        }
        if let Some(purpose_reason) = update.purpose_reason {
            merged.purpose_reason = purpose_reason;
        }
        if let Some(agent_type) = update.agent_type {
            merged.agent_type = agent_type;
        }
        if let Some(agents) = update.agents {
            merged.agents = agents;
        }
        if let Some(query_set) = update.query_set {
            merged.query_set = query_set;
        }
        if let Some(query_set_details) = update.query_set_details {
            merged.query_set_details = query_set_details;
        }
        if let Some(control_config) = update.control_config {
            merged.control_config = control_config;
        }
        if let Some(treatment_config) = update.treatment_config {
            merged.treatment_config = treatment_config;
        }
        if let Some(notes) = update.notes {
            merged.notes = notes;
        }
        if let Some(on_behalf_of) = update.on_behalf_of {
            merged.on_behalf_of = on_behalf_of;
        }

        merged.validate()?;
        *self = merged;
        Ok(())
    }

    /// Case-insensitive substring match over the searchable text fields.
    #[must_use]
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        let optional = [
            self.purpose_reason.as_deref(),
            self.executor.as_deref(),
            self.notes.as_deref(),
        ];
        [self.purpose.as_str(), self.agent_type.as_str(), &self.submitter]
            .into_iter()
            .chain(optional.into_iter().flatten())
            .chain(self.agents.iter().map(String::as_str))
            .any(|field| field.to_lowercase().contains(&needle))
    }

    fn require_status(
        &self,
        allowed: &[RequestStatus],
        action: &'static str,
    ) -> Result<(), TrackerError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TrackerError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                action,
            })
        }
    }
}

fn stamp_links(links: Vec<RunLinkInput>, now: OffsetDateTime) -> Vec<RunLink> {
    links
        .into_iter()
        .map(|link| RunLink {
            url: link.url,
            notes: link.notes,
            added_at: now,
        })
        .collect()
}

/// Orders requests High before Medium before Low, newest first within a
/// priority.
pub fn sort_by_priority(requests: &mut [EvaluationRequest]) {
    requests.sort_by_key(|request| (request.priority.rank(), Reverse(request.submitted_at)));
}
