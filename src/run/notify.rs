use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use checkup_common::RunStatus;
use serde::Serialize;

use super::registry::{NotifyTarget, RunRegistry};
use crate::util::fmt_duration;

/// One terminal-state notice.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub run_id: String,
    pub status: RunStatus,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub archive: Option<PathBuf>,
}

impl Notice {
    fn build(run_id: &str, to: &str, target: &NotifyTarget) -> Self {
        let reason = match target.status {
            RunStatus::Ok => "completed successfully",
            RunStatus::Stopped => "was stopped by the user",
            _ => "ended before completion",
        };
        let body = format!(
            "Hello,\n\nThe run {}.\nrun_id: {}\nTarget tone: {}\nOutput directory: {}\nDuration: {}\n{}\n",
            reason,
            run_id,
            target.tone,
            target.outdir.display(),
            fmt_duration(target.elapsed),
            if target.archive.is_some() {
                "Archive attached."
            } else {
                "No archive was produced."
            },
        );
        Self {
            run_id: run_id.to_string(),
            status: target.status,
            to: to.to_string(),
            subject: format!("checkup output ({}) - {}", target.status, run_id),
            body,
            archive: target.archive.clone(),
        }
    }
}

/// Delivery channel for terminal notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<()>;
}

/// Posts the notice as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", self.url))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Webhook returned HTTP {}", status.as_u16());
        }
        Ok(())
    }
}

/// Attempt the run's single notification. Every outcome is written to
/// the run log; nothing is returned to the caller.
pub async fn notify_once(
    registry: &RunRegistry,
    run_id: &str,
    notifier: Option<&dyn Notifier>,
) {
    if let Ok(Some(target)) = registry.claim_notification(run_id) {
        let line = attempt(run_id, &target, notifier).await;
        let _ = registry.append_log(run_id, &line);
    }
    let _ = registry.mark_settled(run_id);
}

async fn attempt(run_id: &str, target: &NotifyTarget, notifier: Option<&dyn Notifier>) -> String {
    let to = target.to.as_deref().map(str::trim).unwrap_or("");
    if to.is_empty() {
        "\nℹ️ notification skipped: no recipient\n".to_string()
    } else if let Some(notifier) = notifier {
        let notice = Notice::build(run_id, to, target);
        match notifier.deliver(&notice).await {
            Ok(()) => {
                tracing::info!(run_id = %run_id, to = %to, "notification delivered");
                format!("\n📧 notification sent to {}\n", to)
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "notification failed");
                format!("\n⚠️ notification failed: {:#}\n", e)
            }
        }
    } else {
        "\nℹ️ notification skipped: channel not configured\n".to_string()
    }
}
