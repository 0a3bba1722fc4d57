//! Taxonomy entity and view types
//!
//! `Code` is the stored entity. `CpvCode` and `SearchResult` are per-request
//! views built from it and serialized for the transport layer.

use serde::{Deserialize, Serialize};

use super::label::Localized;
use super::path::CodePath;
use crate::error::Result;

/// A taxonomy entry as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// Unique stable identifier
    pub code: String,

    /// Localized name
    pub label: Localized,

    /// Parent code, `None` for roots
    pub parent_code: Option<String>,

    /// Materialized path from the root down to this code
    pub path: CodePath,
}

impl Code {
    /// Build a code, checking the path against the parent reference
    pub fn new(
        code: impl Into<String>,
        label: Localized,
        parent_code: Option<String>,
        path: CodePath,
    ) -> Result<Self> {
        let code = code.into();
        path.ensure_consistent(&code, parent_code.as_deref())?;
        Ok(Self {
            code,
            label,
            parent_code,
            path,
        })
    }

    /// Project into the search view with no children yet
    pub fn into_search_result(self) -> SearchResult {
        SearchResult::new(self.code, self.label, self.parent_code)
    }
}

/// Browsing view: a code and whether it has direct children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpvCode {
    pub code: String,
    pub label: Localized,
    pub parent_code: Option<String>,
    pub has_children: bool,
}

/// Search view: a node of the result forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub code: String,
    pub label: Localized,
    pub parent_code: Option<String>,
    #[serde(default)]
    pub children: Vec<SearchResult>,
}

impl SearchResult {
    /// Create a node without children
    pub fn new(code: impl Into<String>, label: Localized, parent_code: Option<String>) -> Self {
        Self {
            code: code.into(),
            label,
            parent_code,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including self
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Depth-first search for a node by code within this subtree
    pub fn find(&self, code: &str) -> Option<&SearchResult> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.code == code {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }
}

/// A code to import; its path is derived, never supplied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCode {
    pub code: String,
    pub label: Localized,
    #[serde(default)]
    pub parent_code: Option<String>,
}

impl NewCode {
    pub fn new(code: impl Into<String>, label: Localized, parent_code: Option<&str>) -> Self {
        Self {
            code: code.into(),
            label,
            parent_code: parent_code.map(str::to_string),
        }
    }
}
