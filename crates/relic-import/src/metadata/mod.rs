//! CSV metadata source
//!
//! A spreadsheet has one column per mapped model field plus the system
//! columns below. Opening it validates the header and counts the rows;
//! [`MetadataSpreadsheet::rows`] then streams them with limit, percentage
//! and completed-item filtering applied.

mod row;

pub use row::{
    build_file_groups, parse_file_list, split_escaped, FileGroup, InvalidRow, LineReference, Row,
};

use crate::error::{ImportError, Result};
use crate::model::ModelDescriptor;
use csv::StringRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const URI_COLUMN: &str = "URI";
pub const FILES_COLUMN: &str = "FILES";
pub const ITEM_FILES_COLUMN: &str = "ITEM_FILES";
pub const PUBLISH_COLUMN: &str = "PUBLISH";
pub const HIDDEN_COLUMN: &str = "HIDDEN";
pub const INDEX_COLUMN: &str = "INDEX";

const SYSTEM_COLUMNS: &[&str] = &[
    URI_COLUMN,
    FILES_COLUMN,
    ITEM_FILES_COLUMN,
    PUBLISH_COLUMN,
    HIDDEN_COLUMN,
    INDEX_COLUMN,
];

/// A row produced by the source
#[derive(Debug, Clone)]
pub enum RowEntry {
    Valid(Row),
    Invalid(InvalidRow),
}

/// Row subset requested for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RowSelection {
    /// Stop after this many selected rows
    pub limit: Option<usize>,
    /// Evenly spaced sample of this percentage of all rows
    pub percentage: Option<u32>,
}

/// An opened metadata spreadsheet
#[derive(Debug, Clone)]
pub struct MetadataSpreadsheet {
    path: PathBuf,
    name: String,
    model: Arc<ModelDescriptor>,
    headers: Vec<String>,
    total: usize,
    has_binaries: bool,
}

impl MetadataSpreadsheet {
    /// Read the header and count the rows.
    ///
    /// A header that is neither a system column nor a field of the model is
    /// a fatal error.
    pub fn open(path: impl AsRef<Path>, model: Arc<ModelDescriptor>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ImportError::metadata(format!(
                "Metadata file {} not found",
                path.display()
            )));
        }

        let mut reader = csv_reader(path)?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ImportError::metadata(format!("Cannot read header of {}: {}", path.display(), e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if let Some(unknown) = headers
            .iter()
            .filter(|h| !h.is_empty())
            .find(|h| !SYSTEM_COLUMNS.contains(&h.as_str()) && model.field_by_header(h).is_none())
        {
            return Err(ImportError::metadata(format!(
                "Unrecognized header \"{}\" for model {}",
                unknown, model.name
            )));
        }

        let file_columns: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| *h == FILES_COLUMN || *h == ITEM_FILES_COLUMN)
            .map(|(i, _)| i)
            .collect();

        let mut total = 0;
        let mut has_binaries = false;
        let mut record = StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {
                    has_binaries |= file_columns
                        .iter()
                        .any(|&i| record.get(i).is_some_and(|cell| !cell.trim().is_empty()));
                },
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(_) => {},
            }
            total += 1;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!(file = %name, total, has_binaries, "Opened metadata spreadsheet");

        Ok(Self {
            path: path.to_path_buf(),
            name,
            model,
            headers,
            total,
            has_binaries,
        })
    }

    /// Number of data rows
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether any row lists `FILES` or `ITEM_FILES`
    pub fn has_binaries(&self) -> bool {
        self.has_binaries
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    /// Start streaming rows
    pub fn rows(&self, selection: RowSelection) -> Result<MetadataRows> {
        let mut reader = csv_reader(&self.path)?;
        reader.headers()?;

        let sample = selection.percentage.map(|percentage| {
            let indices = sample_indices(self.total, percentage);
            info!(
                "Attempting to load {} items ({}% of {})",
                indices.len(),
                percentage,
                self.total
            );
            indices
        });

        Ok(MetadataRows {
            reader,
            source: self.clone(),
            sample,
            limit: selection.limit,
            position: 0,
            selected: 0,
            skipped_completed: 0,
            done: false,
        })
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new().flexible(true).from_path(path)?)
}

/// Indices `floor(i * total / target)` for `i < target`, where `target` is
/// the requested share of `total`
pub fn sample_indices(total: usize, percentage: u32) -> BTreeSet<usize> {
    let percentage = percentage.min(100) as usize;
    let target = total * percentage / 100;
    (0..target).map(|i| i * total / target).collect()
}

/// Streaming row cursor.
///
/// Rows are selected first (percentage sample, then limit) and rows whose
/// identifier is already complete are skipped afterwards, so repeating a
/// run with the same selection targets the same logical subset.
pub struct MetadataRows {
    reader: csv::Reader<File>,
    source: MetadataSpreadsheet,
    sample: Option<BTreeSet<usize>>,
    limit: Option<usize>,
    position: usize,
    selected: usize,
    skipped_completed: usize,
    done: bool,
}

impl MetadataRows {
    /// Rows skipped so far because their item was already completed
    pub fn skipped_completed(&self) -> usize {
        self.skipped_completed
    }

    /// Next selected row whose identifier `is_completed` rejects
    pub fn next_with(&mut self, is_completed: impl Fn(&str) -> bool) -> Result<Option<RowEntry>> {
        let mut record = StringRecord::new();
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(limit) = self.limit {
                if self.selected >= limit {
                    info!("Stopping after {} rows", limit);
                    self.done = true;
                    return Ok(None);
                }
            }

            let read = match self.reader.read_record(&mut record) {
                Ok(false) => {
                    self.done = true;
                    return Ok(None);
                },
                Err(e) if e.is_io_error() => return Err(e.into()),
                other => other,
            };
            let index = self.position;
            self.position += 1;
            if !self.is_sampled(index) {
                continue;
            }
            self.selected += 1;

            let entry = match read {
                Err(e) => RowEntry::Invalid(InvalidRow {
                    line_reference: self.line_reference(e.position().map(|p| p.line()), index),
                    reason: e.to_string(),
                }),
                Ok(_) => self.parse_record(&record, index),
            };

            if let RowEntry::Valid(row) = &entry {
                let identifier = row.identifier();
                if is_completed(&identifier) {
                    debug!(%identifier, line = %row.line_reference, "Skipping already completed item");
                    self.skipped_completed += 1;
                    continue;
                }
            }
            return Ok(Some(entry));
        }
    }

    fn is_sampled(&self, index: usize) -> bool {
        self.sample.as_ref().is_none_or(|sample| sample.contains(&index))
    }

    fn line_reference(&self, line: Option<u64>, index: usize) -> LineReference {
        LineReference {
            filename: self.source.name.clone(),
            line: line.unwrap_or(index as u64 + 2),
        }
    }

    fn parse_record(&self, record: &StringRecord, index: usize) -> RowEntry {
        let line_reference = self.line_reference(record.position().map(|p| p.line()), index);
        let invalid = |reason: String| {
            RowEntry::Invalid(InvalidRow {
                line_reference: line_reference.clone(),
                reason,
            })
        };

        let headers = &self.source.headers;
        if record.len() != headers.len() {
            return invalid(format!(
                "Wrong number of columns: expected {}, found {}",
                headers.len(),
                record.len()
            ));
        }

        let data: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        let files = data.get(FILES_COLUMN).map(|c| parse_file_list(c)).unwrap_or_default();
        let file_groups = match build_file_groups(&files) {
            Ok(groups) => groups,
            Err(reason) => return invalid(reason),
        };
        let item_filenames = data
            .get(ITEM_FILES_COLUMN)
            .map(|c| parse_file_list(c).into_iter().map(|(_, path)| path).collect())
            .unwrap_or_default();

        let (publish, hidden) = match (
            row::parse_flag(data.get(PUBLISH_COLUMN)),
            row::parse_flag(data.get(HIDDEN_COLUMN)),
        ) {
            (Ok(publish), Ok(hidden)) => (publish, hidden),
            (Err(reason), _) => return invalid(format!("{PUBLISH_COLUMN} {reason}")),
            (_, Err(reason)) => return invalid(format!("{HIDDEN_COLUMN} {reason}")),
        };

        let uri = data
            .get(URI_COLUMN)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        RowEntry::Valid(Row {
            line_reference,
            filenames: files.into_iter().map(|(_, path)| path).collect(),
            item_filenames,
            file_groups,
            publish,
            hidden,
            uri,
            model: self.source.model.clone(),
            data,
        })
    }
}
