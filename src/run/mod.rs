//! Run lifecycle: the registry of runs, the worker supervisor, output
//! artifacts and terminal notifications.

pub mod artifacts;
pub mod notify;
pub mod registry;
pub mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use checkup_common::RunStatus;
use chrono::{DateTime, Local};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::util::fmt_duration;

pub use notify::{Notice, Notifier, WebhookNotifier};
pub use registry::{RunRegistry, RunSnapshot, RunSummary};
pub use supervisor::{RunRequest, Supervisor, WorkerCommand};

const RULE: &str = "============================================================";

/// Build a fresh run id: `run_<YYYYMMDDHHMMSSffffff>_<6 hex>`.
pub fn new_run_id() -> String {
    let ts = Local::now().format("%Y%m%d%H%M%S%6f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", ts, &suffix[..6])
}

/// State of one run, owned by the registry.
#[derive(Debug)]
pub struct RunRecord {
    pub id: String,
    pub status: RunStatus,
    pub log: String,
    pub exit_code: Option<i32>,
    pub last_file: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub stop_requested: bool,
    pub notified: bool,
    /// Nothing more will be appended to `log`.
    pub settled: bool,
    pub started_at: DateTime<Local>,
    pub started: Instant,
    pub outdir: PathBuf,
    pub tone: String,
    pub notify_to: Option<String>,
    pub stop: Arc<Notify>,
}

impl RunRecord {
    pub fn new(id: &str, outdir: &Path, tone: &str, notify_to: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            status: RunStatus::Running,
            log: String::new(),
            exit_code: None,
            last_file: None,
            archive: None,
            stop_requested: false,
            notified: false,
            settled: false,
            started_at: Local::now(),
            started: Instant::now(),
            outdir: outdir.to_path_buf(),
            tone: tone.to_string(),
            notify_to,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// The block appended once a run reaches a terminal state.
pub fn footer(
    status: RunStatus,
    elapsed: Duration,
    last_file: Option<&Path>,
    archive: Option<&Path>,
) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut lines = vec![
        String::new(),
        RULE.to_string(),
        format!("🏁 Run finished | Status: {} | Time: {}", status.label(), now),
        format!("Duration: {}", fmt_duration(elapsed)),
    ];
    if let Some(path) = last_file {
        lines.push(format!("Last file: {}", path.display()));
    }
    if let Some(path) = archive {
        lines.push(format!("Archive: {}", path.display()));
    }
    lines.push(format!("{}\n", RULE));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = new_run_id();
        let rest = id.strip_prefix("run_").unwrap();
        let (ts, suffix) = rest.split_once('_').unwrap();
        assert_eq!(ts.len(), 20);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_footer_with_artifacts() {
        let text = footer(
            RunStatus::Ok,
            Duration::from_secs(65),
            Some(Path::new("/out/result.csv")),
            Some(Path::new("/out.zip")),
        );
        assert!(text.starts_with("\n===="));
        assert!(text.contains("Status: Success"));
        assert!(text.contains("Duration: 1m 5s"));
        assert!(text.contains("Last file: /out/result.csv"));
        assert!(text.contains("Archive: /out.zip"));
        assert!(text.ends_with("====\n"));
    }

    #[test]
    fn test_footer_without_artifacts() {
        let text = footer(RunStatus::Stopped, Duration::from_secs(3), None, None);
        assert!(text.contains("Status: Stopped"));
        assert!(!text.contains("Last file"));
        assert!(!text.contains("Archive"));
    }
}
