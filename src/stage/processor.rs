use std::io::Write;
use std::time::Duration;

use checkup_common::{CheckOutcome, Stage};

use super::suppress::apply_suppression;
use crate::annotate::Annotator;
use crate::errors::StoreError;
use crate::store::{ResultRow, RowStore};

/// Counters for one stage pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub selected: usize,
    pub clean: usize,
    pub flagged: usize,
    pub failed: usize,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            selected: 0,
            clean: 0,
            flagged: 0,
            failed: 0,
        }
    }
}

/// Drives the annotation stages over the annotated store, one row at a time,
/// checkpointing the store after every row.
///
/// Progress goes to `out` as plain lines tagged with the stage name. This is
/// the worker's output protocol; the supervisor turns it into the run log.
pub struct StageProcessor<'a> {
    store: &'a RowStore<ResultRow>,
    annotator: &'a dyn Annotator,
    tone: String,
    delay: Duration,
}

impl<'a> StageProcessor<'a> {
    pub fn new(store: &'a RowStore<ResultRow>, annotator: &'a dyn Annotator, tone: &str) -> Self {
        Self {
            store,
            annotator,
            tone: tone.to_string(),
            delay: Duration::from_millis(100),
        }
    }

    /// Pause between two annotation calls.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run every stage in order.
    pub async fn run_all<W: Write>(&self, out: &mut W) -> Result<Vec<StageReport>, StoreError> {
        let mut reports = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            reports.push(self.run_stage(stage, out).await?);
        }
        Ok(reports)
    }

    /// Process every row of `stage` that has text and no recorded outcome.
    ///
    /// A failed annotation is reported and leaves the row pending, so the
    /// next pass retries it. The completion line is written even when the
    /// store cannot be read or written.
    pub async fn run_stage<W: Write>(
        &self,
        stage: Stage,
        out: &mut W,
    ) -> Result<StageReport, StoreError> {
        emit(out, format!("[{}] Started.", stage));
        let result = self.process(stage, out).await;
        emit(out, format!("[{}] Done.", stage));
        result
    }

    async fn process<W: Write>(&self, stage: Stage, out: &mut W) -> Result<StageReport, StoreError> {
        let mut report = StageReport::new(stage);
        let mut rows = self.store.load()?;

        let todo: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.fragment.text.trim().is_empty() && r.outcome(stage).is_pending())
            .map(|(i, _)| i)
            .collect();

        report.selected = todo.len();
        let total = todo.len();
        if total == 0 {
            emit(out, format!("[{}] Nothing to process.", stage));
            return Ok(report);
        }
        emit(out, format!("[{}] Rows to process: {}", stage, total));

        let tone = stage.takes_tone().then_some(self.tone.as_str());
        for (n, &idx) in todo.iter().enumerate() {
            let position = n + 1;
            let text = rows[idx].fragment.text.trim().to_string();

            match self.annotator.annotate(stage, &text, tone).await {
                Ok(proposed) => {
                    let outcome = apply_suppression(stage, &rows[idx], proposed);
                    match &outcome {
                        CheckOutcome::Flagged(_) => report.flagged += 1,
                        _ => report.clean += 1,
                    }
                    let check = outcome.check_flag();
                    rows[idx].set_outcome(stage, outcome);
                    self.store.save(&rows)?;
                    emit(
                        out,
                        format!(
                            "[{}] {}/{} OK: row_id={}, node_id={}, check={}",
                            stage, position, total, rows[idx].row_id, rows[idx].fragment.node_id, check
                        ),
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    emit(out, format!("[{}] Error (row {}/{}): {}", stage, position, total, e));
                }
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(report)
    }
}

fn emit<W: Write>(out: &mut W, line: String) {
    let _ = writeln!(out, "{}", line);
    let _ = out.flush();
}
