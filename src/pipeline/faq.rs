//! FAQ short-circuit for free-text questions.
//!
//! Questions containing a known keyword (case-insensitive substring) are
//! answered with a link to the existing answer; the LLM call is skipped.
//! Entries are checked in table order and the first hit wins.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// One keyword → link mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub keyword: String,
    pub link: String,
}

/// Ordered FAQ table.
#[derive(Debug, Clone, Default)]
pub struct FaqTable {
    entries: Vec<FaqEntry>,
}

impl FaqTable {
    /// Create a table from entries. Keywords are stored lower-cased.
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| !e.keyword.trim().is_empty())
            .map(|e| FaqEntry {
                keyword: e.keyword.trim().to_lowercase(),
                link: e.link,
            })
            .collect();
        Self { entries }
    }

    /// Create an empty table (every question goes to the LLM).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a JSON array of `{"keyword": .., "link": ..}` objects.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<FaqEntry> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
                key: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose keyword occurs in the question.
    pub fn lookup(&self, question: &str) -> Option<&FaqEntry> {
        let lowered = question.to_lowercase();
        let hit = self.entries.iter().find(|e| lowered.contains(&e.keyword));
        if let Some(entry) = hit {
            debug!(keyword = %entry.keyword, "Question matched FAQ entry");
        }
        hit
    }

    /// Reply text for a question, if the FAQ covers it.
    pub fn answer(&self, question: &str) -> Option<String> {
        self.lookup(question)
            .map(|e| format!("This has already been answered here: {}", e.link))
    }
}
