use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use checkup_common::{RunStatus, is_valid_transition};
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::Notify;

use super::RunRecord;
use crate::errors::RunError;

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub has_archive: bool,
    pub has_last_file: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Local>,
}

/// What the notifier needs from a finished run.
#[derive(Debug, Clone)]
pub struct NotifyTarget {
    pub to: Option<String>,
    pub status: RunStatus,
    pub tone: String,
    pub outdir: PathBuf,
    pub archive: Option<PathBuf>,
    pub elapsed: std::time::Duration,
}

/// Shared map of run id to run state.
///
/// One coarse lock guards the whole map; every method holds it only for
/// the field-level update it performs and never across an await point.
/// Runs are never removed.
#[derive(Clone, Default)]
pub struct RunRegistry {
    inner: Arc<Mutex<HashMap<String, RunRecord>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunRecord>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_run<T>(&self, id: &str, f: impl FnOnce(&mut RunRecord) -> T) -> Result<T, RunError> {
        let mut runs = self.lock();
        let run = runs
            .get_mut(id)
            .ok_or_else(|| RunError::NotFound(id.to_string()))?;
        Ok(f(run))
    }

    pub fn insert(&self, record: RunRecord) {
        self.lock().insert(record.id.clone(), record);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Append text to the run log, starting on a fresh line.
    pub fn append_log(&self, id: &str, text: &str) -> Result<(), RunError> {
        if text.is_empty() {
            return Ok(());
        }
        self.with_run(id, |run| {
            if !run.log.is_empty() && !run.log.ends_with('\n') {
                run.log.push('\n');
            }
            run.log.push_str(text);
        })
    }

    pub fn status(&self, id: &str) -> Result<RunStatus, RunError> {
        self.with_run(id, |run| run.status)
    }

    pub fn snapshot(&self, id: &str) -> Result<RunSnapshot, RunError> {
        self.with_run(id, |run| RunSnapshot {
            status: run.status,
            has_archive: run.archive.is_some(),
            has_last_file: run.last_file.is_some(),
        })
    }

    pub fn log(&self, id: &str) -> Result<String, RunError> {
        self.with_run(id, |run| run.log.clone())
    }

    /// Log text past byte `offset`, with the status read under the same lock.
    /// Log text from `offset` on, and whether the log is complete (the run
    /// is terminal and its notification step has finished).
    pub fn log_from(&self, id: &str, offset: usize) -> Result<(String, bool), RunError> {
        self.with_run(id, |run| {
            let tail = run.log.get(offset..).unwrap_or("").to_string();
            (tail, run.status.is_terminal() && run.settled)
        })
    }

    /// Mark the log as complete. Called once notification has been handled.
    pub fn mark_settled(&self, id: &str) -> Result<(), RunError> {
        self.with_run(id, |run| run.settled = true)
    }

    pub fn stop_handle(&self, id: &str) -> Result<Arc<Notify>, RunError> {
        self.with_run(id, |run| Arc::clone(&run.stop))
    }

    /// Mark the run as stop-requested and wake its supervisor.
    ///
    /// Terminal runs only get the flag.
    pub fn request_stop(&self, id: &str) -> Result<(), RunError> {
        self.with_run(id, |run| {
            run.stop_requested = true;
            if run.status == RunStatus::Running {
                run.stop.notify_one();
            }
        })
    }

    pub fn stop_requested(&self, id: &str) -> Result<bool, RunError> {
        self.with_run(id, |run| run.stop_requested)
    }

    pub fn set_artifacts(
        &self,
        id: &str,
        last_file: Option<PathBuf>,
        archive: Option<PathBuf>,
    ) -> Result<(), RunError> {
        self.with_run(id, |run| {
            run.last_file = last_file;
            run.archive = archive;
        })
    }

    /// Move the run to a terminal status and append `closing` under the
    /// same lock, so a reader that sees the terminal status also sees the
    /// closing text. Returns false (and changes nothing) when the
    /// transition is not allowed.
    pub fn finalize(
        &self,
        id: &str,
        status: RunStatus,
        exit_code: Option<i32>,
        closing: &str,
    ) -> Result<bool, RunError> {
        self.with_run(id, |run| {
            if !is_valid_transition(run.status, status) {
                return false;
            }
            run.status = status;
            run.exit_code = exit_code;
            if !run.log.is_empty() && !run.log.ends_with('\n') {
                run.log.push('\n');
            }
            run.log.push_str(closing);
            true
        })
    }

    pub fn exit_code(&self, id: &str) -> Result<Option<i32>, RunError> {
        self.with_run(id, |run| run.exit_code)
    }

    /// Claim the one-shot notification slot. Only the first caller gets
    /// the target back.
    pub fn claim_notification(&self, id: &str) -> Result<Option<NotifyTarget>, RunError> {
        self.with_run(id, |run| {
            if run.notified {
                return None;
            }
            run.notified = true;
            Some(NotifyTarget {
                to: run.notify_to.clone(),
                status: run.status,
                tone: run.tone.clone(),
                outdir: run.outdir.clone(),
                archive: run.archive.clone(),
                elapsed: run.elapsed(),
            })
        })
    }

    pub fn archive_path(&self, id: &str) -> Result<Option<PathBuf>, RunError> {
        self.with_run(id, |run| run.archive.clone())
    }

    pub fn last_file_path(&self, id: &str) -> Result<Option<PathBuf>, RunError> {
        self.with_run(id, |run| run.last_file.clone())
    }

    pub fn elapsed(&self, id: &str) -> Result<std::time::Duration, RunError> {
        self.with_run(id, |run| run.elapsed())
    }

    /// All runs, oldest first.
    pub fn list(&self) -> Vec<RunSummary> {
        let mut out: Vec<RunSummary> = self
            .lock()
            .values()
            .map(|run| RunSummary {
                run_id: run.id.clone(),
                status: run.status,
                started_at: run.started_at,
            })
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
        out
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter(|run| run.status == RunStatus::Running)
            .map(|run| run.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn registry_with(id: &str) -> RunRegistry {
        let registry = RunRegistry::new();
        registry.insert(RunRecord::new(id, Path::new("/tmp/out"), "formal", None));
        registry
    }

    #[test]
    fn test_unknown_run_is_not_found() {
        let registry = RunRegistry::new();
        assert!(matches!(registry.status("nope"), Err(RunError::NotFound(_))));
        assert!(matches!(registry.request_stop("nope"), Err(RunError::NotFound(_))));
    }

    #[test]
    fn test_append_log_starts_on_new_line() {
        let registry = registry_with("r1");
        registry.append_log("r1", "partial").unwrap();
        registry.append_log("r1", "next\n").unwrap();
        assert_eq!(registry.log("r1").unwrap(), "partial\nnext\n");
    }

    #[test]
    fn test_log_from_offset() {
        let registry = registry_with("r1");
        registry.append_log("r1", "one\ntwo\n").unwrap();
        let (tail, complete) = registry.log_from("r1", 4).unwrap();
        assert_eq!(tail, "two\n");
        assert!(!complete);
        let (tail, _) = registry.log_from("r1", 100).unwrap();
        assert_eq!(tail, "");
    }

    #[test]
    fn test_log_complete_only_after_terminal_and_settled() {
        let registry = registry_with("r1");
        registry.mark_settled("r1").unwrap();
        assert!(!registry.log_from("r1", 0).unwrap().1);

        let registry = registry_with("r2");
        registry.finalize("r2", RunStatus::Ok, Some(0), "footer\n").unwrap();
        assert!(!registry.log_from("r2", 0).unwrap().1);
        registry.mark_settled("r2").unwrap();
        assert!(registry.log_from("r2", 0).unwrap().1);
    }

    #[test]
    fn test_finalize_is_monotonic() {
        let registry = registry_with("r1");
        assert!(registry.finalize("r1", RunStatus::Stopped, Some(-15), "bye\n").unwrap());
        assert!(!registry.finalize("r1", RunStatus::Ok, Some(0), "again\n").unwrap());
        assert!(!registry.finalize("r1", RunStatus::Running, None, "").unwrap());
        assert_eq!(registry.status("r1").unwrap(), RunStatus::Stopped);
        assert_eq!(registry.exit_code("r1").unwrap(), Some(-15));
        assert_eq!(registry.log("r1").unwrap(), "bye\n");
    }

    #[test]
    fn test_notification_claimed_once() {
        let registry = registry_with("r1");
        registry.finalize("r1", RunStatus::Ok, Some(0), "").unwrap();
        let first = registry.claim_notification("r1").unwrap();
        assert_eq!(first.map(|t| t.status), Some(RunStatus::Ok));
        assert!(registry.claim_notification("r1").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_reflects_artifacts() {
        let registry = registry_with("r1");
        let snap = registry.snapshot("r1").unwrap();
        assert!(!snap.has_archive && !snap.has_last_file);
        registry
            .set_artifacts("r1", Some("/tmp/out/a.csv".into()), None)
            .unwrap();
        let snap = registry.snapshot("r1").unwrap();
        assert!(snap.has_last_file);
        assert!(!snap.has_archive);
    }

    #[tokio::test]
    async fn test_request_stop_wakes_waiter() {
        let registry = registry_with("r1");
        let stop = registry.stop_handle("r1").unwrap();
        registry.request_stop("r1").unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), stop.notified())
            .await
            .expect("stop should have been signalled");
        assert!(registry.stop_requested("r1").unwrap());
    }

    #[test]
    fn test_running_ids_and_list() {
        let registry = registry_with("r1");
        registry.insert(RunRecord::new("r2", Path::new("/tmp/o2"), "", None));
        registry.finalize("r2", RunStatus::Error, Some(1), "").unwrap();
        assert_eq!(registry.running_ids(), vec!["r1".to_string()]);
        assert_eq!(registry.list().len(), 2);
    }
}
