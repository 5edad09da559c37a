use crate::error::{JobError, RepositoryError};
use crate::model::{FieldKind, FieldSpec, Item, ModelDescriptor};
use crate::rdf::Term;
use crate::repository::Repository;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Position of a row in its source file, rendered as `file:line`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineReference {
    pub filename: String,
    pub line: u64,
}

impl fmt::Display for LineReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.line)
    }
}

/// Files sharing a basename stem, which become one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub rootname: String,
    pub label: Option<String>,
    pub files: Vec<String>,
}

/// A row the source could not parse; it skips validation and commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    pub line_reference: LineReference,
    pub reason: String,
}

/// One well-formed metadata record
#[derive(Debug, Clone)]
pub struct Row {
    pub line_reference: LineReference,
    /// Raw cell values by column header
    pub data: BTreeMap<String, String>,
    pub filenames: Vec<String>,
    pub item_filenames: Vec<String>,
    pub file_groups: Vec<FileGroup>,
    pub publish: bool,
    pub hidden: bool,
    pub uri: Option<String>,
    pub(crate) model: Arc<ModelDescriptor>,
}

impl Row {
    /// Identifier cell, or the line reference when the row has none.
    ///
    /// This is the key matched against the completed-item ledger.
    pub fn identifier(&self) -> String {
        self.model
            .identifier_spec()
            .and_then(|spec| self.data.get(&spec.header))
            .and_then(|cell| split_escaped(cell, '|').into_iter().next())
            .unwrap_or_else(|| self.line_reference.to_string())
    }

    /// Parsed values for every model field that has a column in this row
    pub fn field_values(&self) -> Vec<(&FieldSpec, Vec<Term>)> {
        self.model
            .fields
            .iter()
            .filter_map(|spec| {
                self.data
                    .get(&spec.header)
                    .map(|cell| (spec, parse_values(cell, spec)))
            })
            .collect()
    }

    /// Build the domain object for this row.
    ///
    /// With a repository, a row that carries a URI is read and the row's
    /// columns are merged over the stored values. Without one the item is
    /// built from row data alone.
    pub async fn materialize(&self, repo: Option<&dyn Repository>) -> Result<Item, JobError> {
        let mut item = match (&self.uri, repo) {
            (Some(uri), Some(repo)) => {
                let description = repo.read(uri).await.map_err(|e| read_failed(uri, e))?;
                let description = description.ok_or_else(|| {
                    JobError::new(format!("Item {uri} does not exist in the repository"))
                })?;
                Item::from_description(self.model.clone(), &description)
            },
            (Some(uri), None) => Item::with_uri(self.model.clone(), uri.clone()),
            (None, _) => Item::new(self.model.clone()),
        };

        for (spec, values) in self.field_values() {
            item.set_values(&spec.name, values);
        }
        Ok(item)
    }
}

fn read_failed(uri: &str, err: RepositoryError) -> JobError {
    JobError::repository(&format!("Reading item {uri}"), &err)
}

fn parse_values(cell: &str, spec: &FieldSpec) -> Vec<Term> {
    split_escaped(cell, '|')
        .into_iter()
        .map(|value| match spec.kind {
            FieldKind::Reference => Term::Iri(value),
            FieldKind::Literal => match &spec.datatype {
                Some(datatype) => Term::typed(value, datatype.clone()),
                None => Term::literal(value),
            },
        })
        .collect()
}

/// Split on unescaped separators; `\|` keeps a literal separator.
/// Values are trimmed and empty values dropped.
pub fn split_escaped(value: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&separator) {
            current.push(separator);
            chars.next();
        } else if c == separator {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse a `FILES` or `ITEM_FILES` cell: `;`-separated, each entry
/// optionally prefixed with `label:`
pub fn parse_file_list(cell: &str) -> Vec<(Option<String>, String)> {
    cell.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((label, path)) if !label.is_empty() && !path.is_empty() && !looks_like_url(entry) => {
                (Some(label.trim().to_string()), path.trim().to_string())
            },
            _ => (None, entry.to_string()),
        })
        .collect()
}

fn looks_like_url(entry: &str) -> bool {
    entry.contains("://")
}

/// Group files into pages by basename stem, in first-seen order
pub fn build_file_groups(files: &[(Option<String>, String)]) -> Result<Vec<FileGroup>, String> {
    let mut groups: Vec<FileGroup> = Vec::new();

    for (label, path) in files {
        let rootname = rootname(path);
        match groups.iter_mut().find(|g| g.rootname == rootname) {
            Some(group) => {
                if label.is_some() && group.label.is_some() && *label != group.label {
                    return Err(format!(
                        "Multiple files with rootname \"{rootname}\" have different labels"
                    ));
                }
                if group.label.is_none() {
                    group.label = label.clone();
                }
                group.files.push(path.clone());
            },
            None => groups.push(FileGroup {
                rootname,
                label: label.clone(),
                files: vec![path.clone()],
            }),
        }
    }

    let labelled = groups.iter().filter(|g| g.label.is_some()).count();
    if labelled > 0 && labelled < groups.len() {
        return Err("If any file group has a label, all file groups must have a label".to_string());
    }
    Ok(groups)
}

fn rootname(path: &str) -> String {
    let basename = path.rsplit('/').next().unwrap_or(path);
    match basename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => basename.to_string(),
    }
}

/// Parse a boolean cell; blank is false
pub fn parse_flag(cell: Option<&String>) -> Result<bool, String> {
    let Some(cell) = cell else {
        return Ok(false);
    };
    match cell.trim().to_lowercase().as_str() {
        "" | "false" | "no" | "0" | "off" => Ok(false),
        "true" | "yes" | "1" | "on" => Ok(true),
        other => Err(format!("\"{other}\" is not a valid true/false value")),
    }
}
