//! Configuration for checkup.
//!
//! Settings are layered: `checkup.toml` (optional) → `.env` file → process
//! environment → CLI flags.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 7860
//! cors = true
//!
//! [runs]
//! outputs_dir = "outputs"
//! stop_grace_ms = 2000
//! poll_interval_ms = 250
//!
//! [worker]
//! program = "/usr/local/bin/checkup"   # default: this binary
//! args = ["work"]
//!
//! [annotator]
//! kind = "openai"                      # or "none"
//! model = "gpt-4.1"
//! delay_ms = 100
//!
//! [notify]
//! webhook_url = "https://hooks.example.com/checkup"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotate::{Annotator, NoopAnnotator, OpenAiAnnotator};
use crate::run::{Notifier, WebhookNotifier, WorkerCommand};

pub const DEFAULT_CONFIG_FILE: &str = "checkup.toml";

/// Which annotation backend the worker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotatorKind {
    #[default]
    Openai,
    None,
}

impl std::fmt::Display for AnnotatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotatorKind::Openai => write!(f, "openai"),
            AnnotatorKind::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for AnnotatorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(AnnotatorKind::Openai),
            "none" | "noop" => Ok(AnnotatorKind::None),
            _ => anyhow::bail!("Invalid annotator '{}'. Valid values: openai, none", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for browser clients on other origins.
    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_true() -> bool {
    true
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsSection {
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,
    /// Time between SIGTERM and SIGKILL when a run is stopped.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// How often log streams check for new lines.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for RunsSection {
    fn default() -> Self {
        Self {
            outputs_dir: default_outputs_dir(),
            stop_grace_ms: default_stop_grace_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Worker executable. Defaults to this binary's `work` subcommand.
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments placed before the four positional worker arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorSection {
    #[serde(default)]
    pub kind: AnnotatorKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Pause between consecutive annotation calls.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub default_tone: Option<String>,
}

fn default_delay_ms() -> u64 {
    100
}

impl Default for AnnotatorSection {
    fn default() -> Self {
        Self {
            kind: AnnotatorKind::default(),
            api_key: None,
            model: None,
            base_url: None,
            delay_ms: default_delay_ms(),
            default_tone: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifySection {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// The whole `checkup.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub runs: RunsSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub annotator: AnnotatorSection,
    #[serde(default)]
    pub notify: NotifySection,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse checkup.toml")
    }

    /// Load `path` when given (it must exist), else `checkup.toml` in the
    /// working directory when present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Returns warnings for values that
    /// could not be used.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("CHECKUP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("CHECKUP_PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warnings.push(format!("Ignoring CHECKUP_PORT '{}': not a port number", port)),
            }
        }
        if let Some(dir) = get("CHECKUP_OUTPUTS_DIR") {
            self.runs.outputs_dir = PathBuf::from(dir);
        }
        if let Some(program) = get("CHECKUP_WORKER_PROGRAM") {
            self.worker.program = Some(program);
        }
        if let Some(kind) = get("CHECKUP_ANNOTATOR") {
            match kind.parse() {
                Ok(kind) => self.annotator.kind = kind,
                Err(e) => warnings.push(format!("Ignoring CHECKUP_ANNOTATOR: {}", e)),
            }
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.annotator.api_key = Some(key);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.annotator.model = Some(model);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.annotator.base_url = Some(url);
        }
        if let Some(delay) = get("CHECKUP_CALL_DELAY_MS") {
            match delay.trim().parse() {
                Ok(ms) => self.annotator.delay_ms = ms,
                Err(_) => warnings.push(format!(
                    "Ignoring CHECKUP_CALL_DELAY_MS '{}': not a number of milliseconds",
                    delay
                )),
            }
        }
        if let Some(url) = get("CHECKUP_NOTIFY_WEBHOOK") {
            self.notify.webhook_url = Some(url);
        }
        warnings
    }

    /// Human-readable problems with the effective configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.annotator.kind == AnnotatorKind::Openai
            && self
                .annotator
                .api_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
        {
            warnings.push(
                "annotator.kind is 'openai' but no API key is set (OPENAI_API_KEY); every row will fail"
                    .to_string(),
            );
        }
        if self.runs.poll_interval_ms == 0 {
            warnings.push("runs.poll_interval_ms is 0; log streams will busy-poll".to_string());
        }
        if let Some(url) = &self.notify.webhook_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            warnings.push(format!(
                "notify.webhook_url '{}' is not an http(s) URL",
                url
            ));
        }
        if self.worker.program.is_none() && !self.worker.args.is_empty() {
            warnings.push(
                "worker.args is set without worker.program; the arguments are ignored".to_string(),
            );
        }
        warnings
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.runs.stop_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.runs.poll_interval_ms.max(1))
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.annotator.delay_ms)
    }

    /// The command the supervisor launches per run.
    pub fn worker_command(&self) -> Result<WorkerCommand> {
        match &self.worker.program {
            Some(program) => Ok(WorkerCommand::new(program, self.worker.args.clone())),
            None => WorkerCommand::current_exe(),
        }
    }

    pub fn build_annotator(&self) -> Result<Box<dyn Annotator>> {
        match self.annotator.kind {
            AnnotatorKind::None => Ok(Box::new(NoopAnnotator)),
            AnnotatorKind::Openai => {
                let annotator = OpenAiAnnotator::new(
                    self.annotator.api_key.clone(),
                    self.annotator.model.clone(),
                    self.annotator.base_url.clone(),
                )
                .context("Failed to configure the OpenAI annotator")?;
                Ok(Box::new(annotator))
            }
        }
    }

    pub fn build_notifier(&self) -> Result<Option<Arc<dyn Notifier>>> {
        match self.notify.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(url)?);
                Ok(Some(notifier))
            }
            _ => Ok(None),
        }
    }
}

/// Load a `.env` file into the process environment. `ENV_FILE` names the
/// file; the default is `.env`. A missing file is not an error.
pub fn load_dotenv() -> Option<PathBuf> {
    let name = std::env::var("ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    dotenvy::from_filename(&name).ok()
}
