use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use eval_tracker_core::{
    is_valid_record_id, now_utc, EvaluationRequest, RequestStatus, TrackerError,
};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, OffsetDateTime};

use crate::atomic::{read_json, write_json_atomic};

const REQUESTS_DIR: &str = "requests";
const BACKUPS_DIR: &str = "backups";
const INDEX_FILE: &str = "index.json";

/// Derived list of known request IDs, kept for the on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestIndex {
    pub request_ids: Vec<String>,
    pub count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl RequestIndex {
    fn from_ids(request_ids: Vec<String>) -> Self {
        Self {
            count: request_ids.len(),
            request_ids,
            last_updated: now_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexCheck {
    pub healthy: bool,
    pub indexed: usize,
    pub on_disk: usize,
    pub missing_from_index: Vec<String>,
    pub dangling_entries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PruneReport {
    pub retention_days: u32,
    pub removed: Vec<String>,
    pub kept: usize,
}

/// File-per-record request store.
///
/// Layout under the data directory:
/// `requests/<id>.json`, `index.json` and `backups/<YYYY-MM-DD>/<id>_<HHMMSSmmm>[_<n>].json`.
pub struct JsonRequestStore {
    requests_dir: PathBuf,
    backups_dir: PathBuf,
    index_path: PathBuf,
    backup_enabled: bool,
    index_lock: Mutex<()>,
}

impl JsonRequestStore {
    /// Opens (creating if needed) a store rooted at `data_dir` and reconciles
    /// the index with the records on disk.
    pub fn open(data_dir: &Path, backup_enabled: bool) -> Result<Self> {
        let store = Self::open_unreconciled(data_dir, backup_enabled)?;
        let check = store.check_index()?;
        if !check.healthy {
            tracing::warn!(
                missing = check.missing_from_index.len(),
                dangling = check.dangling_entries.len(),
                "request index diverged from records on disk, rebuilding"
            );
            store.rebuild_index()?;
        }
        Ok(store)
    }

    /// Opens the store without touching the index, for inspection.
    pub fn open_unreconciled(data_dir: &Path, backup_enabled: bool) -> Result<Self> {
        let store = Self {
            requests_dir: data_dir.join(REQUESTS_DIR),
            backups_dir: data_dir.join(BACKUPS_DIR),
            index_path: data_dir.join(INDEX_FILE),
            backup_enabled,
            index_lock: Mutex::new(()),
        };
        fs::create_dir_all(&store.requests_dir).with_context(|| {
            format!(
                "failed to create requests directory {}",
                store.requests_dir.display()
            )
        })?;
        if backup_enabled {
            fs::create_dir_all(&store.backups_dir).with_context(|| {
                format!(
                    "failed to create backups directory {}",
                    store.backups_dir.display()
                )
            })?;
        }
        Ok(store)
    }

    /// Persists the full record, backing up any previous version first.
    pub fn save(&self, request: &EvaluationRequest) -> Result<()> {
        if !is_valid_record_id(&request.id) {
            return Err(TrackerError::Validation(vec![format!(
                "id '{}' contains unsupported characters",
                request.id
            )])
            .into());
        }
        let path = self.record_path(&request.id);
        if self.backup_enabled && path.exists() {
            self.backup_best_effort(&request.id, &path);
        }

        write_json_atomic(&path, request)
            .with_context(|| format!("failed to save request {}", request.id))?;
        self.register(&request.id)?;
        tracing::debug!(request_id = %request.id, status = %request.status, "saved request");
        Ok(())
    }

    /// Loads a record. Missing, unreadable or malformed records read as `None`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<EvaluationRequest> {
        if !is_valid_record_id(id) {
            return None;
        }
        match read_json(&self.record_path(id)) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(request_id = %id, error = %format!("{err:#}"), "skipping unreadable request");
                None
            }
        }
    }

    pub fn list_all(&self) -> Result<Vec<EvaluationRequest>> {
        let ids = match self.read_index() {
            Ok(index) => index.request_ids,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "request index unreadable, listing directory");
                self.ids_on_disk()?.into_iter().collect()
            }
        };
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }

    pub fn list_by_status(&self, status: RequestStatus) -> Result<Vec<EvaluationRequest>> {
        let mut requests = self.list_all()?;
        requests.retain(|request| request.status == status);
        Ok(requests)
    }

    /// Removes a record after backing it up. Returns `false` when no record
    /// file existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !is_valid_record_id(id) {
            return Ok(false);
        }
        let path = self.record_path(id);
        if !path.exists() {
            self.unregister(id)?;
            return Ok(false);
        }
        if self.backup_enabled {
            self.backup_best_effort(id, &path);
        }
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.unregister(id)?;
                return Ok(false);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to delete request {id}"));
            }
        }
        self.unregister(id)?;
        tracing::info!(request_id = %id, "deleted request");
        Ok(true)
    }

    pub fn search(&self, query: &str) -> Result<Vec<EvaluationRequest>> {
        let mut requests = self.list_all()?;
        requests.retain(|request| request.matches_query(query));
        Ok(requests)
    }

    /// Reads `index.json`; a missing index reads as empty.
    pub fn read_index(&self) -> Result<RequestIndex> {
        Ok(read_json(&self.index_path)?.unwrap_or_else(|| RequestIndex::from_ids(Vec::new())))
    }

    /// Compares the index with the record files on disk.
    pub fn check_index(&self) -> Result<IndexCheck> {
        let on_disk = self.ids_on_disk()?;
        let indexed: Vec<String> = match self.read_index() {
            Ok(index) => index.request_ids,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "request index is malformed");
                return Ok(IndexCheck {
                    healthy: false,
                    indexed: 0,
                    on_disk: on_disk.len(),
                    missing_from_index: on_disk.into_iter().collect(),
                    dangling_entries: Vec::new(),
                });
            }
        };
        let indexed_set: BTreeSet<&String> = indexed.iter().collect();

        let missing_from_index: Vec<String> = on_disk
            .iter()
            .filter(|id| !indexed_set.contains(id))
            .cloned()
            .collect();
        let dangling_entries: Vec<String> = indexed
            .iter()
            .filter(|id| !on_disk.contains(*id))
            .cloned()
            .collect();

        Ok(IndexCheck {
            healthy: missing_from_index.is_empty()
                && dangling_entries.is_empty()
                && indexed_set.len() == indexed.len(),
            indexed: indexed.len(),
            on_disk: on_disk.len(),
            missing_from_index,
            dangling_entries,
        })
    }

    /// Rewrites the index from the directory listing.
    pub fn rebuild_index(&self) -> Result<RequestIndex> {
        let _guard = self
            .index_lock
            .lock()
            .map_err(|_| anyhow!("request index lock poisoned"))?;
        let index = RequestIndex::from_ids(self.ids_on_disk()?.into_iter().collect());
        write_json_atomic(&self.index_path, &index).context("failed to rebuild request index")?;
        tracing::info!(count = index.count, "rebuilt request index");
        Ok(index)
    }

    /// Deletes dated backup directories older than `retention_days`.
    pub fn prune_backups(&self, retention_days: u32, now: OffsetDateTime) -> Result<PruneReport> {
        let mut report = PruneReport {
            retention_days,
            removed: Vec::new(),
            kept: 0,
        };

        // A retention reaching past the earliest representable date keeps everything.
        let Some(cutoff) = now.date().checked_sub(Duration::days(i64::from(retention_days))) else {
            report.kept = self.backup_day_count()?;
            tracing::info!(retention_days, kept = report.kept, "retention exceeds calendar range, nothing pruned");
            return Ok(report);
        };

        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(report),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "failed to list backups directory {}",
                        self.backups_dir.display()
                    )
                });
            }
        };

        for entry in entries {
            let entry = entry.context("failed to read backups directory entry")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_backup_date(&name) {
                Some(date) if date < cutoff => {
                    fs::remove_dir_all(entry.path())
                        .with_context(|| format!("failed to remove backup directory {name}"))?;
                    report.removed.push(name);
                }
                Some(_) => report.kept += 1,
                None => {}
            }
        }
        report.removed.sort();
        tracing::info!(removed = report.removed.len(), kept = report.kept, "pruned backups");
        Ok(report)
    }

    fn backup_day_count(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "failed to list backups directory {}",
                        self.backups_dir.display()
                    )
                });
            }
        };
        let mut count = 0;
        for entry in entries {
            let entry = entry.context("failed to read backups directory entry")?;
            if parse_backup_date(&entry.file_name().to_string_lossy()).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.requests_dir.join(format!("{id}.json"))
    }

    fn backup_best_effort(&self, id: &str, source: &Path) {
        if let Err(err) = self.backup(id, source) {
            tracing::warn!(request_id = %id, error = %format!("{err:#}"), "backup failed, continuing");
        }
    }

    fn backup(&self, id: &str, source: &Path) -> Result<()> {
        let now = now_utc();
        let day_dir = self.backups_dir.join(format!(
            "{:04}-{:02}-{:02}",
            now.year(),
            u8::from(now.month()),
            now.day()
        ));
        fs::create_dir_all(&day_dir)
            .with_context(|| format!("failed to create {}", day_dir.display()))?;
        let stamp = format!(
            "{:02}{:02}{:02}{:03}",
            now.hour(),
            now.minute(),
            now.second(),
            now.millisecond()
        );
        let mut contents = fs::File::open(source)
            .with_context(|| format!("failed to open {} for backup", source.display()))?;

        // Never replace an earlier backup taken within the same millisecond.
        for attempt in 0_u32.. {
            let name = if attempt == 0 {
                format!("{id}_{stamp}.json")
            } else {
                format!("{id}_{stamp}_{attempt}.json")
            };
            let target = day_dir.join(name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create backup {}", target.display()));
                }
            };
            io::copy(&mut contents, &mut file)
                .with_context(|| format!("failed to copy backup to {}", target.display()))?;
            return Ok(());
        }
        Err(anyhow!("no free backup name for request {id}"))
    }

    fn ids_on_disk(&self) -> Result<BTreeSet<String>> {
        let entries = fs::read_dir(&self.requests_dir).with_context(|| {
            format!(
                "failed to list requests directory {}",
                self.requests_dir.display()
            )
        })?;
        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry.context("failed to read requests directory entry")?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if is_valid_record_id(id) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }

    fn register(&self, id: &str) -> Result<()> {
        self.modify_index(|ids| {
            if ids.iter().any(|known| known == id) {
                false
            } else {
                ids.push(id.to_string());
                true
            }
        })
    }

    fn unregister(&self, id: &str) -> Result<()> {
        self.modify_index(|ids| {
            let before = ids.len();
            ids.retain(|known| known != id);
            ids.len() != before
        })
    }

    // Serializes every index read-modify-write within the process. The
    // closure returns whether the id list changed.
    fn modify_index(&self, change: impl FnOnce(&mut Vec<String>) -> bool) -> Result<()> {
        let _guard = self
            .index_lock
            .lock()
            .map_err(|_| anyhow!("request index lock poisoned"))?;
        let (mut ids, rebuilt) = match self.read_index() {
            Ok(index) => (index.request_ids, false),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "request index is malformed, rebuilding");
                (self.ids_on_disk()?.into_iter().collect(), true)
            }
        };
        if change(&mut ids) || rebuilt {
            write_json_atomic(&self.index_path, &RequestIndex::from_ids(ids))
                .context("failed to update request index")?;
        }
        Ok(())
    }
}

fn parse_backup_date(name: &str) -> Option<Date> {
    let mut parts = name.splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = Month::try_from(parts.next()?.parse::<u8>().ok()?).ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eval_tracker_core::{
        parse_rfc3339_utc, AgentType, NewRequest, Priority, Purpose, RunLinkInput,
    };
    use proptest::prelude::*;
    use ulid::Ulid;

    use super::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(value) => value,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn temp_data_dir() -> PathBuf {
        std::env::temp_dir().join(format!("eval-tracker-store-{}", Ulid::new()))
    }

    fn open_store(dir: &Path) -> JsonRequestStore {
        must(JsonRequestStore::open(dir, true))
    }

    fn fixture_request(agent: &str) -> EvaluationRequest {
        let input = NewRequest {
            purpose: Purpose::FlightReview,
            purpose_reason: None,
            agent_type: AgentType::FederatedConnector,
            agents: vec![agent.to_string()],
            query_set: "Default".to_string(),
            query_set_details: None,
            control_config: "Current Prod".to_string(),
            treatment_config: "Current Prod".to_string(),
            notes: None,
            priority: Priority::Medium,
            on_behalf_of: None,
        };
        let now = must(parse_rfc3339_utc("2025-10-15T09:00:00Z").map_err(anyhow::Error::from));
        must(EvaluationRequest::create(input, "Ada", now).map_err(anyhow::Error::from))
    }

    fn backup_files(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for day in must(fs::read_dir(dir.join(BACKUPS_DIR)).map_err(anyhow::Error::from)) {
            let day = must(day.map_err(anyhow::Error::from));
            for file in must(fs::read_dir(day.path()).map_err(anyhow::Error::from)) {
                files.push(must(file.map_err(anyhow::Error::from)).path());
            }
        }
        files
    }

    #[test]
    fn open_creates_layout() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        assert!(dir.join(REQUESTS_DIR).is_dir());
        assert!(dir.join(BACKUPS_DIR).is_dir());
        assert_eq!(must(store.read_index()).count, 0);
    }

    #[test]
    fn save_then_get_round_trips() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let request = fixture_request("Notion");
        must(store.save(&request));

        assert_eq!(store.get(&request.id), Some(request.clone()));
        let index = must(store.read_index());
        assert_eq!(index.request_ids, vec![request.id.clone()]);
        assert_eq!(index.count, 1);
    }

    #[test]
    fn overwrite_and_delete_take_backups() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let mut request = fixture_request("Canva");
        must(store.save(&request));
        assert!(backup_files(&dir).is_empty());

        must(
            request
                .start(vec![RunLinkInput::new("https://runs/1")], "Exec", now_utc())
                .map_err(anyhow::Error::from),
        );
        must(store.save(&request));
        assert_eq!(backup_files(&dir).len(), 1);
        assert_eq!(must_some(store.get(&request.id)).status, RequestStatus::InProgress);

        assert!(must(store.delete(&request.id)));
        assert!(store.get(&request.id).is_none());
        assert!(must(store.read_index()).request_ids.is_empty());
        assert!(!backup_files(&dir).is_empty());
        assert!(backup_files(&dir).iter().all(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&format!("{}_", request.id)))
        }));
    }

    #[test]
    fn rapid_overwrites_keep_every_backup() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let mut request = fixture_request("Figma");
        must(store.save(&request));

        for round in 0..20 {
            request.notes = Some(format!("revision {round}"));
            must(store.save(&request));
        }
        assert_eq!(backup_files(&dir).len(), 20);
    }

    #[test]
    fn failed_backup_does_not_block_save() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let mut request = fixture_request("Miro");
        must(store.save(&request));

        must(fs::remove_dir_all(dir.join(BACKUPS_DIR)).map_err(anyhow::Error::from));
        must(fs::write(dir.join(BACKUPS_DIR), b"not a directory").map_err(anyhow::Error::from));

        request.notes = Some("saved without a backup".to_string());
        must(store.save(&request));
        assert_eq!(
            must_some(store.get(&request.id)).notes.as_deref(),
            Some("saved without a backup")
        );
        assert!(must(store.delete(&request.id)));
    }

    #[test]
    fn disabled_backups_write_nothing() {
        let dir = temp_data_dir();
        let store = must(JsonRequestStore::open(&dir, false));
        let request = fixture_request("Linear");
        must(store.save(&request));
        must(store.save(&request));
        assert!(!dir.join(BACKUPS_DIR).exists());
    }

    #[test]
    fn delete_missing_returns_false() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        assert!(!must(store.delete("req_0_000000000000")));
        assert!(!must(store.delete("../index")));
    }

    #[test]
    fn unsafe_ids_never_touch_the_filesystem() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        assert!(store.get("../index").is_none());
        assert!(store.get("").is_none());

        let mut request = fixture_request("Notion");
        request.id = "../escape".to_string();
        assert!(store.save(&request).is_err());
        assert!(!dir.join("escape.json").exists());
    }

    #[test]
    fn malformed_record_reads_as_missing() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let good = fixture_request("HubSpot");
        must(store.save(&good));
        must(fs::write(dir.join(REQUESTS_DIR).join("req_bad.json"), b"{not json").map_err(anyhow::Error::from));
        must(store.rebuild_index());

        assert!(store.get("req_bad").is_none());
        let listed = must(store.list_all());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good.id);
    }

    #[test]
    fn open_reconciles_divergent_index() {
        let dir = temp_data_dir();
        let request = fixture_request("Intercom");
        {
            let store = open_store(&dir);
            must(store.save(&request));
        }
        let orphan = fixture_request("Canva");
        must(write_json_atomic(
            &dir.join(REQUESTS_DIR).join(format!("{}.json", orphan.id)),
            &orphan,
        ));
        must(write_json_atomic(
            &dir.join(INDEX_FILE),
            &RequestIndex::from_ids(vec![request.id.clone(), "req_gone".to_string()]),
        ));

        let store = open_store(&dir);
        let check = must(store.check_index());
        assert!(check.healthy, "{check:?}");
        let mut expected = vec![request.id.clone(), orphan.id.clone()];
        expected.sort();
        assert_eq!(must(store.read_index()).request_ids, expected);
    }

    #[test]
    fn check_reports_both_directions() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let request = fixture_request("Notion");
        must(store.save(&request));
        must(write_json_atomic(
            &dir.join(INDEX_FILE),
            &RequestIndex::from_ids(vec!["req_gone".to_string()]),
        ));

        let check = must(store.check_index());
        assert!(!check.healthy);
        assert_eq!(check.missing_from_index, vec![request.id.clone()]);
        assert_eq!(check.dangling_entries, vec!["req_gone".to_string()]);
    }

    #[test]
    fn status_filter_and_search() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        let pending = fixture_request("Notion");
        let mut started = fixture_request("Google Calendar");
        must(
            started
                .start(vec![RunLinkInput::new("https://runs/7")], "Grace", now_utc())
                .map_err(anyhow::Error::from),
        );
        must(store.save(&pending));
        must(store.save(&started));

        let in_progress = must(store.list_by_status(RequestStatus::InProgress));
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, started.id);

        let hits = must(store.search("GRACE"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, started.id);
        assert_eq!(must(store.search("flight")).len(), 2);
        assert!(must(store.search("nobody")).is_empty());
    }

    #[test]
    fn concurrent_saves_keep_every_id_indexed() {
        let dir = temp_data_dir();
        let store = Arc::new(open_store(&dir));
        let requests: Vec<EvaluationRequest> =
            (0..16).map(|n| fixture_request(&format!("agent-{n}"))).collect();

        std::thread::scope(|scope| {
            for request in &requests {
                let store = Arc::clone(&store);
                scope.spawn(move || must(store.save(request)));
            }
        });

        let index = must(store.read_index());
        assert_eq!(index.count, requests.len());
        assert!(must(store.check_index()).healthy);
    }

    #[test]
    fn prune_removes_only_expired_date_dirs() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        for name in ["2025-01-01", "2025-10-10", "2025-10-15", "not-a-date"] {
            must(fs::create_dir_all(dir.join(BACKUPS_DIR).join(name)).map_err(anyhow::Error::from));
        }
        let now = must(parse_rfc3339_utc("2025-10-15T12:00:00Z").map_err(anyhow::Error::from));

        let report = must(store.prune_backups(30, now));
        assert_eq!(report.removed, vec!["2025-01-01".to_string()]);
        assert_eq!(report.kept, 2);
        assert!(dir.join(BACKUPS_DIR).join("not-a-date").exists());
        assert!(!dir.join(BACKUPS_DIR).join("2025-01-01").exists());
    }

    #[test]
    fn prune_with_huge_retention_keeps_everything() {
        let dir = temp_data_dir();
        let store = open_store(&dir);
        must(fs::create_dir_all(dir.join(BACKUPS_DIR).join("2001-01-01")).map_err(anyhow::Error::from));
        let now = must(parse_rfc3339_utc("2025-10-15T12:00:00Z").map_err(anyhow::Error::from));

        let report = must(store.prune_backups(u32::MAX, now));
        assert!(report.removed.is_empty());
        assert_eq!(report.kept, 1);
        assert!(dir.join(BACKUPS_DIR).join("2001-01-01").exists());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_index_tracks_directory(ops in prop::collection::vec((0_usize..6, any::<bool>()), 1..20)) {
            let dir = temp_data_dir();
            let store = open_store(&dir);
            let pool: Vec<EvaluationRequest> =
                (0..6).map(|n| fixture_request(&format!("agent-{n}"))).collect();

            for (slot, keep) in ops {
                if keep {
                    must(store.save(&pool[slot]));
                } else {
                    must(store.delete(&pool[slot].id));
                }
            }

            let check = must(store.check_index());
            prop_assert!(check.healthy, "{:?}", check);
            prop_assert_eq!(must(store.list_all()).len(), check.on_disk);
        }
    }
}
