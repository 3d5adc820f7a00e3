//! Worker job - `checkup work` and `checkup stages`.
//!
//! `work` is what the supervisor launches for every run. Everything it
//! prints on stdout becomes the run log, so progress goes there as plain
//! lines and diagnostics stay on stderr via `tracing`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};

use checkup::config::Config;
use checkup::extract::build_messages;
use checkup::stage::{StageProcessor, StageReport};
use checkup::store::{MessageRow, ResultRow, RowStore, sync_results};

pub async fn cmd_work(
    config: &Config,
    source: &Path,
    results_csv: &Path,
    messages_csv: &Path,
    tone: &str,
) -> Result<()> {
    let messages = RowStore::<MessageRow>::new(messages_csv);
    let results = RowStore::<ResultRow>::new(results_csv);
    let mut out = std::io::stdout();

    let summary = build_messages(source, &messages, &mut out)?;
    let added = sync_results(&messages, &results).context("Failed to sync the results store")?;
    writeln!(out, "[sync] {} new rows in {}", added, results.path().display())?;
    out.flush()?;
    tracing::debug!(extracted = summary.added(), synced = added, "stores ready");

    run_stages(config, &results, tone, &mut out).await?;
    if summary.failed_passes > 0 {
        bail!("{} extraction pass(es) failed", summary.failed_passes);
    }
    Ok(())
}

pub async fn cmd_stages(config: &Config, results_csv: &Path, tone: Option<&str>) -> Result<()> {
    let results = RowStore::<ResultRow>::new(results_csv);
    if !results.path().exists() {
        bail!("Results store not found: {}", results.path().display());
    }
    let Some(tone) = tone.or(config.annotator.default_tone.as_deref()) else {
        bail!("No tone given and annotator.default_tone is not set");
    };
    run_stages(config, &results, tone, &mut std::io::stdout()).await
}

async fn run_stages<W: Write>(
    config: &Config,
    results: &RowStore<ResultRow>,
    tone: &str,
    out: &mut W,
) -> Result<()> {
    let annotator = config.build_annotator()?;
    tracing::info!(annotator = annotator.name(), tone, "running stages");

    let reports = StageProcessor::new(results, annotator.as_ref(), tone)
        .with_delay(config.call_delay())
        .run_all(out)
        .await
        .context("Stage processing aborted")?;
    out.flush()?;

    log_reports(&reports);
    Ok(())
}

fn log_reports(reports: &[StageReport]) {
    for r in reports {
        tracing::info!(
            stage = %r.stage,
            selected = r.selected,
            clean = r.clean,
            flagged = r.flagged,
            failed = r.failed,
            "stage finished"
        );
    }
}
