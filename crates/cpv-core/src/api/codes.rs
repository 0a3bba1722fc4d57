//! Codes API
//!
//! High-level async functions for browsing, searching and maintaining codes.

use serde::Deserialize;
use std::path::Path;

use crate::domain::taxonomy::{CpvCode, Language, NewCode, SearchResult, TaxonomyService};
use crate::{Error, Result};

/// List request: children of `parent`, or the roots
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListCodesRequest {
    pub parent: Option<String>,
}

/// Search request as received from a transport
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchCodesRequest {
    pub query: Option<String>,
    pub language: Option<String>,
}

impl SearchCodesRequest {
    pub fn new(query: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            query: Some(query.into()),
            language: language.map(str::to_string),
        }
    }

    /// Check the request and resolve the language hint.
    ///
    /// A missing or blank query is rejected here; the core would answer it
    /// with an empty forest. A blank language means no language.
    pub fn validate(&self) -> Result<(&str, Option<Language>)> {
        let query = self
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| Error::InvalidQuery("query is required".to_string()))?;

        let language = match self.language.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Language>()?),
        };

        Ok((query, language))
    }
}

/// List the children of a code, or the roots
pub async fn list(service: &TaxonomyService, request: &ListCodesRequest) -> Result<Vec<CpvCode>> {
    let parent = request
        .parent
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    service.list_children(parent).await
}

/// Search codes and return the matching forest
pub async fn search(
    service: &TaxonomyService,
    request: &SearchCodesRequest,
) -> Result<Vec<SearchResult>> {
    let (query, language) = request.validate()?;
    service.search(query, language).await
}

/// Import codes from a JSON file holding an array of `{code, label, parentCode}`
pub async fn import_file(service: &TaxonomyService, path: &Path) -> Result<u64> {
    let contents = tokio::fs::read_to_string(path).await?;
    let codes: Vec<NewCode> = serde_json::from_str(&contents)
        .map_err(|e| Error::Decode(format!("{} in import file {}", e, path.display())))?;
    service.import(codes).await
}

/// Move a code under a new parent, or to the top level
pub async fn move_code(service: &TaxonomyService, code: &str, parent: Option<&str>) -> Result<u64> {
    service.move_code(code, parent).await
}
