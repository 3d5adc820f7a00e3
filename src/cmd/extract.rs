//! Standalone extraction - `checkup extract`.

use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};

use checkup::extract::build_messages;
use checkup::store::{MessageRow, RowStore};

pub fn cmd_extract(source: &Path, messages_csv: &Path) -> Result<()> {
    let messages = RowStore::<MessageRow>::new(messages_csv);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let summary = build_messages(source, &messages, &mut out)?;
    out.flush()?;

    if summary.failed_passes > 0 {
        bail!("{} extraction pass(es) failed", summary.failed_passes);
    }
    Ok(())
}
