//! Repository trait for taxonomy persistence
//!
//! This module defines the trait for code storage operations.
//! The trait abstracts over storage backends so the search engine can be
//! exercised against fakes.

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{Code, CpvCode};
use super::path::CodePath;
use super::predicate::Predicate;

/// Repository trait for taxonomy persistence
#[async_trait]
pub trait CodeRepositoryTrait: Send + Sync {
    // ========== Browsing ==========

    /// Direct children of a code, or the roots when `parent_code` is `None`
    async fn find_by_parent(&self, parent_code: Option<&str>) -> Result<Vec<CpvCode>>;

    /// Stored path of a single code
    async fn find_path(&self, code: &str) -> Result<Option<CodePath>>;

    /// Number of stored codes
    async fn count(&self) -> Result<u64>;

    // ========== Search ==========

    /// Paths of every code whose label satisfies the predicate
    async fn find_paths_matching(&self, predicate: &Predicate) -> Result<Vec<CodePath>>;

    /// Every code whose path is an ancestor of, or equal to, one of `paths`
    async fn find_by_path_contained_in(&self, paths: &[CodePath]) -> Result<Vec<Code>>;

    // ========== Maintenance ==========

    /// Insert or replace codes whose paths have already been derived
    async fn upsert_codes(&self, codes: &[Code]) -> Result<u64>;

    /// Rewrite the paths of a subtree and re-point its root at a new parent
    async fn move_subtree(
        &self,
        from: &CodePath,
        to: &CodePath,
        new_parent: Option<&str>,
    ) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify trait is object-safe
    fn _assert_object_safe(_: &dyn CodeRepositoryTrait) {}
}
