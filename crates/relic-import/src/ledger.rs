//! Append-only item ledgers
//!
//! A ledger is a CSV file with a fixed header and one unique key column. The
//! set of known keys is rebuilt by replaying the whole file when the ledger
//! is opened, so the file alone determines the ledger's state. Writers never
//! rewrite earlier lines; a single writer per file is assumed.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A row type that can be stored in an [`ItemLedger`]
pub trait LedgerEntry: Serialize + DeserializeOwned {
    /// Header fields, in the order the struct serializes them
    const FIELDS: &'static [&'static str];

    /// Unique key of this row
    fn key(&self) -> &str;
}

/// Row of a job's completed-item ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletedItem {
    pub id: String,
    pub timestamp: String,
    pub title: String,
    pub uri: String,
    pub status: String,
}

impl LedgerEntry for CompletedItem {
    const FIELDS: &'static [&'static str] = &["id", "timestamp", "title", "uri", "status"];

    fn key(&self) -> &str {
        &self.id
    }
}

/// Row of a run's invalid-item or failed-item ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroppedItem {
    pub id: String,
    pub timestamp: String,
    pub title: String,
    pub uri: String,
    pub reason: String,
}

impl LedgerEntry for DroppedItem {
    const FIELDS: &'static [&'static str] = &["id", "timestamp", "title", "uri", "reason"];

    fn key(&self) -> &str {
        &self.id
    }
}

/// Key-deduplicated, append-only record log backed by a CSV file
#[derive(Debug)]
pub struct ItemLedger<E: LedgerEntry> {
    path: PathBuf,
    keys: HashSet<String>,
    _entry: PhantomData<E>,
}

impl<E: LedgerEntry> ItemLedger<E> {
    /// Open a ledger, replaying any existing file to load its keys
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut ledger = Self {
            path: path.into(),
            keys: HashSet::new(),
            _entry: PhantomData,
        };
        for entry in ledger.entries()? {
            ledger.keys.insert(entry.key().to_string());
        }
        debug!(path = %ledger.path.display(), keys = ledger.keys.len(), "Loaded ledger");
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append one row, creating the file and header on first use
    pub fn append(&mut self, entry: &E) -> Result<()> {
        let is_new = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(E::FIELDS)?;
        }
        writer.serialize(entry)?;
        writer.flush()?;

        self.keys.insert(entry.key().to_string());
        Ok(())
    }

    /// Every row in file order.
    ///
    /// A header that differs from the expected fields only produces a
    /// warning; columns are matched by name and missing ones are left empty.
    pub fn entries(&self) -> Result<Vec<E>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        if !headers.iter().eq(E::FIELDS.iter().copied()) {
            warn!(
                path = %self.path.display(),
                expected = ?E::FIELDS,
                found = ?headers.iter().collect::<Vec<_>>(),
                "Ledger header does not match expected fields"
            );
        }

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            match record.deserialize::<E>(Some(&headers)) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Skipping unreadable ledger row"),
            }
        }
        Ok(entries)
    }
}
