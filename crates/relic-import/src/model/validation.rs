use serde::Serialize;
use std::fmt;

/// Outcome of one validation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub message: String,
}

impl ValidationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Named validation results in the order they were recorded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResults {
    entries: Vec<(String, ValidationResult)>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result, replacing any earlier result with the same name
    pub fn insert(&mut self, name: impl Into<String>, result: ValidationResult) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = result,
            None => self.entries.push((name, result)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ValidationResult> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// True when every entry passed
    pub fn ok(&self) -> bool {
        self.entries.iter().all(|(_, r)| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ValidationResult)> {
        self.entries
            .iter()
            .filter(|(_, r)| !r.passed)
            .map(|(n, r)| (n.as_str(), r))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValidationResult)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// `name message` for each failure, joined by `; `
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|(name, result)| format!("{name} {result}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
