use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use checkup_common::RunStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::notify::{Notifier, notify_once};
use super::registry::RunRegistry;
use super::{RunRecord, artifacts, footer, new_run_id};
use crate::errors::RunError;
use crate::sections::SectionTracker;

const EXIT_POLL: Duration = Duration::from_millis(100);
const DRAIN_GRACE: Duration = Duration::from_millis(500);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Program (plus leading arguments) launched for every run. The four
/// positional arguments of the worker contract are appended.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// This binary's own `work` subcommand.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(program, vec!["work".to_string()]))
    }

    fn argv(&self, job: &Job) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(job.source.display().to_string());
        argv.push(job.results.display().to_string());
        argv.push(job.messages.display().to_string());
        argv.push(job.tone.clone());
        argv
    }

    fn command(&self, job: &Job) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.argv(job));
        cmd
    }

    fn describe(&self, job: &Job) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.argv(job));
        parts.join(" ")
    }
}

/// Parameters for a new run. Validated before anything is created.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: PathBuf,
    pub tone: String,
    pub notify_to: Option<String>,
}

#[derive(Debug, Clone)]
struct Job {
    run_id: String,
    source: PathBuf,
    tone: String,
    outdir: PathBuf,
    results: PathBuf,
    messages: PathBuf,
}

/// Launches workers and drives each run to a terminal state.
#[derive(Clone)]
pub struct Supervisor {
    registry: RunRegistry,
    worker: WorkerCommand,
    outputs_dir: PathBuf,
    stop_grace: Duration,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Supervisor {
    pub fn new(registry: RunRegistry, worker: WorkerCommand, outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            worker,
            outputs_dir: outputs_dir.into(),
            stop_grace: DEFAULT_STOP_GRACE,
            notifier: None,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// Validate the request, register a `running` run and launch its
    /// worker in the background. Returns the run id.
    pub fn start(&self, request: RunRequest) -> Result<String, RunError> {
        let tone = request.tone.trim().to_string();
        if tone.is_empty() {
            return Err(RunError::MissingParameter("target_tone"));
        }
        if !request.source.is_file() {
            return Err(RunError::SourceNotFound(request.source));
        }

        let run_id = new_run_id();
        let outdir = self.outputs_dir.join(&run_id);
        std::fs::create_dir_all(&outdir)
            .with_context(|| format!("Failed to create output directory {}", outdir.display()))?;

        let job = Job {
            run_id: run_id.clone(),
            source: request.source,
            tone,
            results: outdir.join("result.csv"),
            messages: outdir.join("messages.csv"),
            outdir,
        };

        let notify_to = request
            .notify_to
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let mut record = RunRecord::new(&run_id, &job.outdir, &job.tone, notify_to);
        record.log = format!(
            "🚀 Started\nTarget tone: {}\nSource: {}\nResults store: {}\nMessages store: {}\n\n",
            job.tone,
            job.source.display(),
            job.results.display(),
            job.messages.display(),
        );
        self.registry.insert(record);
        info!(run_id = %run_id, source = %job.source.display(), "run started");

        let this = self.clone();
        tokio::spawn(async move { this.supervise(job).await });
        Ok(run_id)
    }

    /// Request a stop for every run still in progress and wait (bounded)
    /// for them to settle.
    pub async fn shutdown(&self) {
        let running = self.registry.running_ids();
        for id in &running {
            info!(run_id = %id, "stopping run for shutdown");
            let _ = self.registry.request_stop(id);
        }
        let deadline = Instant::now() + self.stop_grace + Duration::from_secs(1);
        while Instant::now() < deadline {
            let pending = running.iter().any(|id| {
                self.registry
                    .status(id)
                    .map(|s| !s.is_terminal())
                    .unwrap_or(false)
            });
            if !pending {
                break;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    async fn supervise(self, job: Job) {
        let id = job.run_id.clone();
        let inner = {
            let this = self.clone();
            tokio::spawn(async move { this.execute(job).await })
        };

        let failure = match inner.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(e) => Some(e.to_string()),
        };

        if let Some(msg) = failure {
            error!(run_id = %id, error = %msg, "run supervision failed");
            let line = format!("\n❌ Supervisor error: {}\n", msg);
            let elapsed = self.registry.elapsed(&id).unwrap_or_default();
            let last = self.registry.last_file_path(&id).ok().flatten();
            let archive = self.registry.archive_path(&id).ok().flatten();
            let closing = format!(
                "{}{}",
                line,
                footer(RunStatus::Error, elapsed, last.as_deref(), archive.as_deref())
            );
            if !self
                .registry
                .finalize(&id, RunStatus::Error, None, &closing)
                .unwrap_or(false)
            {
                let _ = self.registry.append_log(&id, &line);
            }
        }

        notify_once(&self.registry, &id, self.notifier.as_deref()).await;
    }

    async fn execute(&self, job: Job) -> Result<()> {
        let id = job.run_id.clone();
        self.registry
            .append_log(&id, &format!("Command: {}\n\n", self.worker.describe(&job)))?;

        let mut cmd = self.worker.command(&job);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(RunError::SpawnFailed)?;

        // stdout and stderr are separate pipes merged line by line. Each
        // stream keeps its own order; lines from the two streams interleave
        // in arrival order.
        let (tx, mut rx) = mpsc::channel::<String>(256);
        if let Some(out) = child.stdout.take() {
            tokio::spawn(pump(out, tx.clone()));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(pump(err, tx.clone()));
        }
        drop(tx);

        let stop = self.registry.stop_handle(&id)?;
        let mut tracker = SectionTracker::new();
        let mut output_open = true;
        let mut stopping = false;
        let mut kill_at: Option<Instant> = None;
        let mut ticker = tokio::time::interval(EXIT_POLL);

        let status = loop {
            tokio::select! {
                chunk = rx.recv(), if output_open => match chunk {
                    Some(raw) => self.registry.append_log(&id, &tracker.feed(&raw))?,
                    None => output_open = false,
                },
                _ = stop.notified(), if !stopping => {
                    stopping = true;
                    info!(run_id = %id, "stop requested, terminating worker");
                    terminate(&mut child);
                    kill_at = Some(Instant::now() + self.stop_grace);
                }
                _ = tokio::time::sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                    kill_at = None;
                    warn!(run_id = %id, "worker ignored termination, killing");
                    let _ = child.start_kill();
                }
                _ = ticker.tick() => {
                    if let Some(status) = child.try_wait().context("Failed to poll worker process")? {
                        break status;
                    }
                }
            }
        };

        // Output still buffered in the pipes after exit.
        while let Ok(Some(raw)) = tokio::time::timeout(DRAIN_GRACE, rx.recv()).await {
            self.registry.append_log(&id, &tracker.feed(&raw))?;
        }
        if let Some(line) = tracker.finish() {
            self.registry.append_log(&id, &line)?;
        }

        let outdir = job.outdir.clone();
        let archive_path = self.outputs_dir.join(format!("{}.zip", id));
        let found = tokio::task::spawn_blocking(move || artifacts::collect(&outdir, &archive_path))
            .await
            .context("Artifact scan panicked")??;
        self.registry
            .set_artifacts(&id, found.last_file.clone(), found.archive.clone())?;

        let code = exit_code(&status);
        let final_status = if status.success() {
            RunStatus::Ok
        } else if self.registry.stop_requested(&id)? {
            RunStatus::Stopped
        } else {
            RunStatus::Error
        };

        let closing = footer(
            final_status,
            self.registry.elapsed(&id)?,
            found.last_file.as_deref(),
            found.archive.as_deref(),
        );
        self.registry.finalize(&id, final_status, code, &closing)?;
        info!(run_id = %id, status = %final_status, exit_code = ?code, "run finished");
        Ok(())
    }
}

/// Forward one output pipe into the channel chunk by chunk (one line, or
/// the unterminated tail).
async fn pump<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Exit code, or the negated signal number when the worker was killed.
fn exit_code(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|s| -s))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}
