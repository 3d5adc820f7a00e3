//! Append-only, content-deduplicated CSV row stores.
//!
//! Two stores share one implementation: the extraction store
//! ([`MessageRow`], written by extraction) and the annotated store
//! ([`ResultRow`], checkpointed by the stage processor). Rows are identified
//! by their whitespace-normalized content ([`RowKey`]), never by `row_id`;
//! ids are assigned once at append time as `max + 1` and never reused.

mod rows;

pub use rows::{MESSAGE_FIELDS, MessageRow, RESULT_FIELDS, ResultRow};

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use checkup_common::{DomainError, normalize_ws};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::StoreError;

/// A text fragment and its provenance inside the source document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub module_type: String,
    pub source: String,
    pub text: String,
}

impl Fragment {
    pub fn key(&self) -> RowKey {
        RowKey([
            normalize_ws(&self.node_id),
            normalize_ws(&self.node_name),
            normalize_ws(&self.node_type),
            normalize_ws(&self.module_type),
            normalize_ws(&self.source),
            normalize_ws(&self.text),
        ])
    }
}

/// Dedup key: `(node_id, node_name, node_type, module_type, source, text)`,
/// each whitespace-normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey([String; 6]);

/// A row type persisted by a [`RowStore`].
pub trait StoreRow: Sized {
    /// Header, in column order.
    const FIELDS: &'static [&'static str];
    /// Flat on-disk form, one field per column.
    type Record: Serialize + DeserializeOwned;

    fn row_id(&self) -> u64;
    fn fragment(&self) -> &Fragment;
    fn from_fragment(row_id: u64, fragment: Fragment) -> Self;
    fn to_record(&self) -> Self::Record;
    fn from_record(record: Self::Record) -> Result<Self, DomainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub inserted: bool,
    pub row_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// CSV file holding rows of type `R`.
#[derive(Debug, Clone)]
pub struct RowStore<R> {
    path: PathBuf,
    _row: PhantomData<fn() -> R>,
}

impl<R: StoreRow> RowStore<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_blank(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn writer<W: Write>(inner: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(inner)
    }

    /// Create the store with just its header if it is missing or empty.
    /// Returns `true` when the file was written.
    pub fn ensure_header(&self) -> Result<bool, StoreError> {
        if !self.is_blank() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let file = fs::File::create(&self.path).map_err(|e| self.io_err(e))?;
        let mut w = Self::writer(file);
        w.write_record(R::FIELDS).map_err(|e| self.csv_err(e))?;
        w.flush().map_err(|e| self.io_err(e))?;
        Ok(true)
    }

    /// Read every row in file order. A missing or empty store reads as empty.
    pub fn load(&self) -> Result<Vec<R>, StoreError> {
        if self.is_blank() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        let headers = reader.headers().map_err(|e| self.csv_err(e))?.clone();
        let mut raw = csv::StringRecord::new();
        let mut rows = Vec::new();
        while reader.read_record(&mut raw).map_err(|e| self.csv_err(e))? {
            let record: R::Record = raw
                .deserialize(Some(&headers))
                .map_err(|e| self.csv_err(e))?;
            let row = R::from_record(record).map_err(|source| StoreError::InvalidCell {
                path: self.path.clone(),
                line: raw.position().map(|p| p.line()).unwrap_or_default(),
                source,
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Replace the persisted rows. The new content is written to a sibling
    /// temp file and renamed over the store, so a crash leaves either the
    /// old or the new set, never a torn file.
    pub fn save(&self, rows: &[R]) -> Result<(), StoreError> {
        let tmp = self.tmp_path();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        {
            let file = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            let mut w = Self::writer(file);
            w.write_record(R::FIELDS).map_err(|e| self.csv_err(e))?;
            for row in rows {
                w.serialize(row.to_record()).map_err(|e| self.csv_err(e))?;
            }
            let file = w
                .into_inner()
                .map_err(|e| self.io_err(std::io::Error::other(e.to_string())))?;
            file.sync_all().map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Append one fragment unless a row with the same key already exists.
    pub fn append(&self, fragment: Fragment) -> Result<AppendOutcome, StoreError> {
        let existing = self.load()?;
        let key = fragment.key();
        if let Some(row) = existing.iter().find(|r| r.fragment().key() == key) {
            return Ok(AppendOutcome {
                inserted: false,
                row_id: row.row_id(),
            });
        }
        let row_id = next_row_id(&existing);
        self.write_appended(&[R::from_fragment(row_id, fragment)])?;
        Ok(AppendOutcome {
            inserted: true,
            row_id,
        })
    }

    /// Append a batch of fragments with one read and one write, deduplicating
    /// against the store and within the batch.
    pub fn append_all<I>(&self, fragments: I) -> Result<AppendSummary, StoreError>
    where
        I: IntoIterator<Item = Fragment>,
    {
        let existing = self.load()?;
        let mut keys: HashSet<RowKey> = existing.iter().map(|r| r.fragment().key()).collect();
        let mut next = next_row_id(&existing);
        let mut summary = AppendSummary::default();
        let mut new_rows = Vec::new();

        for fragment in fragments {
            if keys.insert(fragment.key()) {
                new_rows.push(R::from_fragment(next, fragment));
                next += 1;
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }

        if !new_rows.is_empty() {
            self.write_appended(&new_rows)?;
        }
        Ok(summary)
    }

    fn write_appended(&self, rows: &[R]) -> Result<(), StoreError> {
        self.ensure_header()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let mut w = Self::writer(file);
        for row in rows {
            w.serialize(row.to_record()).map_err(|e| self.csv_err(e))?;
        }
        w.flush().map_err(|e| self.io_err(e))
    }
}

/// `max(row_id) + 1`, or 1 for an empty store.
pub fn next_row_id<R: StoreRow>(rows: &[R]) -> u64 {
    rows.iter().map(|r| r.row_id()).max().unwrap_or(0) + 1
}

/// Bring the annotated store up to date with the extraction store.
///
/// Every extraction row whose key is absent from `results` is appended with
/// all stages pending. The extraction `row_id` is kept when it is free in the
/// annotated store; otherwise the next free id is assigned. Returns the
/// number of rows added.
pub fn sync_results(
    messages: &RowStore<MessageRow>,
    results: &RowStore<ResultRow>,
) -> Result<usize, StoreError> {
    results.ensure_header()?;
    let mut rows = results.load()?;
    let mut keys: HashSet<RowKey> = rows.iter().map(|r| r.fragment.key()).collect();
    let mut ids: HashSet<u64> = rows.iter().map(|r| r.row_id).collect();
    let mut next = next_row_id(&rows);
    let mut added = 0;

    for message in messages.load()? {
        if !keys.insert(message.fragment.key()) {
            continue;
        }
        let row_id = if ids.contains(&message.row_id) {
            next
        } else {
            message.row_id
        };
        ids.insert(row_id);
        next = next.max(row_id + 1);
        rows.push(ResultRow::from_fragment(row_id, message.fragment));
        added += 1;
    }

    if added > 0 {
        results.save(&rows)?;
    }
    Ok(added)
}
