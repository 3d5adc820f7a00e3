use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

use checkup::config::{self, Config};

mod cmd;

#[derive(Parser)]
#[command(name = "checkup")]
#[command(version, about = "Resumable text-quality annotation runs with live log streaming")]
pub struct Cli {
    /// Path to checkup.toml (default: ./checkup.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Diagnostic log format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the run-control HTTP API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding per-run outputs and archives
        #[arg(long)]
        outputs_dir: Option<PathBuf>,
    },
    /// Run one job: extraction, results sync, then every stage
    Work {
        /// Source JSON document
        source: PathBuf,
        /// Annotated (results) store
        results_csv: PathBuf,
        /// Extraction (messages) store
        messages_csv: PathBuf,
        /// Target tone for the tone stage
        tone: String,
    },
    /// Extract text fragments from a source document into the messages store
    Extract {
        source: PathBuf,
        messages_csv: PathBuf,
    },
    /// Resume the stage loop on an existing results store
    Stages {
        results_csv: PathBuf,
        /// Target tone (default: annotator.default_tone)
        tone: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Report configuration problems
    Validate,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "checkup=debug,tower_http=debug"
    } else {
        "checkup=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());

    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_target(false).try_init(),
    };
    if result.is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    if let Some(path) = config::load_dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    for warning in config.apply_env() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Serve {
            host,
            port,
            outputs_dir,
        } => cmd::cmd_serve(config, host, port, outputs_dir).await?,
        Commands::Work {
            source,
            results_csv,
            messages_csv,
            tone,
        } => cmd::cmd_work(&config, &source, &results_csv, &messages_csv, &tone).await?,
        Commands::Extract {
            source,
            messages_csv,
        } => cmd::cmd_extract(&source, &messages_csv)?,
        Commands::Stages { results_csv, tone } => {
            cmd::cmd_stages(&config, &results_csv, tone.as_deref()).await?
        }
        Commands::Config { command } => cmd::cmd_config(&config, cli.config.as_deref(), command)?,
    }

    Ok(())
}
