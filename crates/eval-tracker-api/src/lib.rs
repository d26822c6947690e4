#![allow(clippy::missing_errors_doc)]

//! Embedding API over the request and session stores. The CLI and the HTTP
//! service both go through these types.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use eval_tracker_core::{
    now_utc, sort_by_priority, EvaluationRequest, ImportSummary, NewRequest, Priority,
    RequestStatus, RequestUpdate, RunLinkInput, TrackerError,
};
use eval_tracker_store_json::JsonRequestStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod sessions;

pub use sessions::{new_session_id, SessionManager};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartRequest {
    pub run_links: Vec<RunLinkInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddLinksRequest {
    #[serde(default)]
    pub run_links: Vec<RunLinkInput>,
    #[serde(default, alias = "update_notes")]
    pub update_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityUpdate {
    pub priority: Priority,
}

/// Request lifecycle operations against the durable store. Each mutation
/// loads the current record, applies a pure transition and saves the full
/// record back.
#[derive(Clone)]
pub struct RequestService {
    store: Arc<JsonRequestStore>,
}

impl RequestService {
    #[must_use]
    pub fn new(store: Arc<JsonRequestStore>) -> Self {
        Self { store }
    }

    pub fn open(data_dir: &Path, backup_enabled: bool) -> Result<Self> {
        let store = JsonRequestStore::open(data_dir, backup_enabled)
            .with_context(|| format!("failed to open request store at {}", data_dir.display()))?;
        Ok(Self::new(Arc::new(store)))
    }

    #[must_use]
    pub fn store(&self) -> &JsonRequestStore {
        &self.store
    }

    pub fn create(&self, input: NewRequest, submitter: &str) -> Result<EvaluationRequest> {
        let request = EvaluationRequest::create(input, submitter, now_utc())?;
        self.store.save(&request)?;
        tracing::info!(request_id = %request.id, submitter, "created request");
        Ok(request)
    }

    pub fn get(&self, id: &str) -> Result<EvaluationRequest> {
        self.store
            .get(id)
            .ok_or_else(|| TrackerError::NotFound(id.to_string()).into())
    }

    pub fn list(
        &self,
        status: Option<RequestStatus>,
        by_priority: bool,
    ) -> Result<Vec<EvaluationRequest>> {
        let mut requests = match status {
            Some(status) => self.store.list_by_status(status)?,
            None => self.store.list_all()?,
        };
        if by_priority {
            sort_by_priority(&mut requests);
        }
        Ok(requests)
    }

    pub fn update(&self, id: &str, update: RequestUpdate) -> Result<EvaluationRequest> {
        self.mutate(id, "updated", |request| request.apply_update(update))
    }

    pub fn start(
        &self,
        id: &str,
        start: StartRequest,
        executor: &str,
    ) -> Result<EvaluationRequest> {
        self.mutate(id, "started", |request| {
            request.start(start.run_links, executor, now_utc())
        })
    }

    pub fn add_links_or_note(
        &self,
        id: &str,
        add: AddLinksRequest,
        author: &str,
    ) -> Result<EvaluationRequest> {
        self.mutate(id, "appended progress to", |request| {
            request.add_links_or_note(add.run_links, add.update_note.as_deref(), author, now_utc())
        })
    }

    pub fn complete(&self, id: &str) -> Result<EvaluationRequest> {
        self.mutate(id, "completed", |request| request.complete(now_utc()))
    }

    /// Admin-only; the caller enforces the role.
    pub fn update_priority(&self, id: &str, priority: Priority) -> Result<EvaluationRequest> {
        self.mutate(id, "reprioritized", |request| {
            request.set_priority(priority);
            Ok(())
        })
    }

    /// Admin-only; the caller enforces the role.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(id)
    }

    pub fn search(&self, query: &str) -> Result<Vec<EvaluationRequest>> {
        self.store.search(query)
    }

    /// Every request in list order.
    pub fn export(&self) -> Result<Vec<EvaluationRequest>> {
        self.list(None, true)
    }

    /// Decodes, validates and saves each document on its own. Failures are
    /// collected in the summary and never abort the batch.
    pub fn import(&self, documents: Vec<Value>) -> Result<ImportSummary> {
        let total = documents.len();
        let mut summary = ImportSummary {
            imported: 0,
            errors: Vec::new(),
            total,
        };

        for (position, document) in documents.into_iter().enumerate() {
            let label = document
                .get("id")
                .and_then(Value::as_str)
                .map_or_else(|| format!("item {position}"), |id| format!("item {position} ({id})"));
            let outcome = serde_json::from_value::<EvaluationRequest>(document)
                .map_err(anyhow::Error::from)
                .and_then(|request| {
                    request.validate()?;
                    self.store.save(&request)
                });
            match outcome {
                Ok(()) => summary.imported += 1,
                Err(err) => summary.errors.push(format!("{label}: {err:#}")),
            }
        }

        tracing::info!(
            imported = summary.imported,
            failed = summary.errors.len(),
            total,
            "imported requests"
        );
        Ok(summary)
    }

    fn mutate(
        &self,
        id: &str,
        verb: &'static str,
        change: impl FnOnce(&mut EvaluationRequest) -> Result<(), TrackerError>,
    ) -> Result<EvaluationRequest> {
        let mut request = self.get(id)?;
        change(&mut request)?;
        self.store.save(&request)?;
        tracing::info!(request_id = %id, status = %request.status, "{verb} request");
        Ok(request)
    }
}
