//! Taxonomy service
//!
//! Orchestrates browsing, search with ancestor closure, and the import/move
//! maintenance operations over a [`CodeRepositoryTrait`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::entity::{Code, CpvCode, NewCode, SearchResult};
use super::label::Language;
use super::path::{CodePath, derive_paths};
use super::predicate::Predicate;
use super::repository::CodeRepository;
use super::repository_trait::CodeRepositoryTrait;
use super::tree::build_tree;
use crate::error::{Error, Result};

/// Default bound on each store round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Service for browsing and searching the code taxonomy
#[derive(Clone)]
pub struct TaxonomyService {
    repository: Arc<dyn CodeRepositoryTrait>,
    timeout: Duration,
}

impl std::fmt::Debug for TaxonomyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonomyService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TaxonomyService {
    /// Create a service over any repository implementation
    pub fn new(repository: Arc<dyn CodeRepositoryTrait>) -> Self {
        Self {
            repository,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a service backed by the SQLite repository
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::new(Arc::new(CodeRepository::new(pool)))
    }

    /// Bound every store round trip by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the underlying repository
    pub fn repository(&self) -> &Arc<dyn CodeRepositoryTrait> {
        &self.repository
    }

    // ========== Browsing ==========

    /// Direct children of `parent_code`, or the roots when it is `None`
    pub async fn list_children(&self, parent_code: Option<&str>) -> Result<Vec<CpvCode>> {
        let children = self
            .bounded("listing children", self.repository.find_by_parent(parent_code))
            .await?;

        if let Some(parent) = parent_code {
            if children.is_empty()
                && self
                    .bounded("looking up parent", self.repository.find_path(parent))
                    .await?
                    .is_none()
            {
                return Err(Error::CodeNotFound(parent.to_string()));
            }
        }

        debug!(parent = ?parent_code, children = children.len(), "Listed children");
        Ok(children)
    }

    // ========== Search ==========

    /// Search labels and return the matches with all their ancestors as a forest.
    ///
    /// Two sequential retrievals run against the store: the paths of the
    /// matching codes, then every code on those paths. A query that cannot
    /// match anything returns an empty forest without touching the store.
    pub async fn search(&self, query: &str, language: Option<Language>) -> Result<Vec<SearchResult>> {
        let predicate = Predicate::build(query, language);
        if predicate.is_match_nothing() {
            debug!(query, language = ?language, "Query matches nothing");
            return Ok(Vec::new());
        }

        debug!(predicate = %predicate, "Built label predicate");

        let matched = self
            .bounded("matching labels", self.repository.find_paths_matching(&predicate))
            .await?;
        if matched.is_empty() {
            info!(query, language = ?language, matched = 0, "Search completed");
            return Ok(Vec::new());
        }

        let codes = self
            .bounded(
                "loading ancestors",
                self.repository.find_by_path_contained_in(&matched),
            )
            .await?;

        ensure_closure(&matched, &codes)?;

        let mut seen = HashSet::with_capacity(codes.len());
        let records: Vec<SearchResult> = codes
            .into_iter()
            .filter(|code| seen.insert(code.code.clone()))
            .map(Code::into_search_result)
            .collect();

        let forest = build_tree(records);
        let nodes: usize = forest.iter().map(SearchResult::subtree_len).sum();

        info!(
            query,
            language = ?language,
            matched = matched.len(),
            nodes,
            roots = forest.len(),
            "Search completed"
        );
        Ok(forest)
    }

    // ========== Maintenance ==========

    /// Import a batch of codes, deriving every path from the parent chain.
    ///
    /// Parents may come from the batch or from the store. A code that is
    /// already stored under a different path is rejected; relocating it is
    /// what [`TaxonomyService::move_code`] is for.
    pub async fn import(&self, new_codes: Vec<NewCode>) -> Result<u64> {
        if new_codes.is_empty() {
            return Ok(0);
        }

        let in_batch: HashSet<&str> = new_codes.iter().map(|c| c.code.as_str()).collect();
        let mut known: HashMap<String, CodePath> = HashMap::new();
        for parent in new_codes.iter().filter_map(|c| c.parent_code.as_deref()) {
            if in_batch.contains(parent) || known.contains_key(parent) {
                continue;
            }
            if let Some(path) = self.repository.find_path(parent).await? {
                known.insert(parent.to_string(), path);
            }
        }

        let mut paths = derive_paths(
            new_codes
                .iter()
                .map(|c| (c.code.as_str(), c.parent_code.as_deref())),
            &known,
        )?;

        let mut codes = Vec::with_capacity(new_codes.len());
        for new_code in new_codes {
            let path = paths.remove(&new_code.code).ok_or_else(|| {
                Error::PathIntegrity(format!("no path derived for code '{}'", new_code.code))
            })?;

            if let Some(existing) = self.repository.find_path(&new_code.code).await? {
                if existing != path {
                    return Err(Error::PathIntegrity(format!(
                        "code '{}' is stored under '{}' but the import places it under '{}'; use `cpv move` to relocate it",
                        new_code.code, existing, path
                    )));
                }
            }

            if new_code.label.is_empty() {
                warn!(code = %new_code.code, "Imported code has no label in any language");
            }

            codes.push(Code::new(new_code.code, new_code.label.normalized(), new_code.parent_code, path)?);
        }
        codes.sort_by(|a, b| a.path.depth().cmp(&b.path.depth()).then_with(|| a.path.cmp(&b.path)));

        let written = self.repository.upsert_codes(&codes).await?;
        info!(codes = codes.len(), written, "Imported codes");
        Ok(written)
    }

    /// Re-parent a code, rewriting the paths of its whole subtree
    pub async fn move_code(&self, code: &str, new_parent: Option<&str>) -> Result<u64> {
        let from = self
            .repository
            .find_path(code)
            .await?
            .ok_or_else(|| Error::CodeNotFound(code.to_string()))?;

        let to = match new_parent {
            Some(parent) => {
                let parent_path = self
                    .repository
                    .find_path(parent)
                    .await?
                    .ok_or_else(|| Error::CodeNotFound(parent.to_string()))?;
                if from.is_ancestor_or_self(&parent_path) {
                    return Err(Error::PathIntegrity(format!(
                        "cannot move '{}' under '{}', which is inside its own subtree",
                        code, parent
                    )));
                }
                parent_path.child(code)?
            }
            None => CodePath::root(code)?,
        };

        if to == from {
            debug!(code, "Code already under the requested parent");
            return Ok(0);
        }

        let moved = self.repository.move_subtree(&from, &to, new_parent).await?;
        info!(code, from = %from, to = %to, moved, "Moved code");
        Ok(moved)
    }

    /// Run one store round trip under the configured timeout.
    ///
    /// Timeouts and database failures surface as `SearchUnavailable`; every
    /// other error keeps its kind.
    async fn bounded<T, F>(&self, step: &'static str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Err(_) => {
                warn!(step, timeout_ms = self.timeout.as_millis() as u64, "Store round trip timed out");
                Err(Error::SearchUnavailable(format!(
                    "{} timed out after {}ms",
                    step,
                    self.timeout.as_millis()
                )))
            }
            Ok(Err(Error::DatabaseError(e))) => {
                warn!(step, error = %e, "Store round trip failed");
                Err(Error::SearchUnavailable(format!("{} failed: {}", step, e)))
            }
            Ok(result) => result,
        }
    }
}

/// Every prefix of every matched path must have come back from the store
fn ensure_closure(matched: &[CodePath], codes: &[Code]) -> Result<()> {
    let found: HashSet<&CodePath> = codes.iter().map(|c| &c.path).collect();
    for path in matched {
        if let Some(missing) = path.ancestors_or_self().find(|prefix| !found.contains(prefix)) {
            return Err(Error::PathIntegrity(format!(
                "no code stored at '{}', an ancestor of '{}'",
                missing, path
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::taxonomy::label::Localized;
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn create_test_service() -> TaxonomyService {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        TaxonomyService::from_pool(db.pool().clone())
    }

    fn en(text: &str) -> Localized {
        Localized::default().with(Language::En, text)
    }

    async fn seed(service: &TaxonomyService) {
        service
            .import(vec![
                NewCode::new("A", en("Agriculture"), None),
                NewCode::new("A1", en("Forestry"), Some("A")),
                NewCode::new("A1a", en("Sawn timber"), Some("A1")),
                NewCode::new("B", en("Construction"), None),
            ])
            .await
            .unwrap();
    }

    fn codes(nodes: &[SearchResult]) -> Vec<&str> {
        nodes.iter().map(|n| n.code.as_str()).collect()
    }

    #[tokio::test]
    async fn test_search_includes_every_ancestor() {
        let service = create_test_service().await;
        seed(&service).await;

        let forest = service.search("timber", None).await.unwrap();
        assert_eq!(codes(&forest), vec!["A"]);
        assert_eq!(codes(&forest[0].children), vec!["A1"]);
        assert_eq!(codes(&forest[0].children[0].children), vec!["A1a"]);
        assert!(forest[0].children[0].children[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_search_merges_shared_ancestors() {
        let service = create_test_service().await;
        seed(&service).await;

        let forest = service
            .search("forestry or timber or construction", Some(Language::En))
            .await
            .unwrap();
        assert_eq!(codes(&forest), vec!["A", "B"]);
        let total: usize = forest.iter().map(SearchResult::subtree_len).sum();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn test_search_is_idempotent() {
        let service = create_test_service().await;
        seed(&service).await;

        let first = service.search("timber", Some(Language::En)).await.unwrap();
        let second = service.search("timber", Some(Language::En)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_search_without_matches_is_empty() {
        let service = create_test_service().await;
        seed(&service).await;

        assert!(service.search("zeppelin", None).await.unwrap().is_empty());
        assert!(service.search("   ", None).await.unwrap().is_empty());
        assert!(service.search("the", Some(Language::En)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_children() {
        let service = create_test_service().await;
        seed(&service).await;

        let roots = service.list_children(None).await.unwrap();
        assert_eq!(roots.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(roots[0].has_children);

        let leaves = service.list_children(Some("A1a")).await.unwrap();
        assert!(leaves.is_empty());

        let err = service.list_children(Some("NOPE")).await.unwrap_err();
        assert!(matches!(err, Error::CodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_import_attaches_to_stored_parents() {
        let service = create_test_service().await;
        seed(&service).await;

        service
            .import(vec![NewCode::new("A1b", en("Cork"), Some("A1"))])
            .await
            .unwrap();

        let path = service.repository().find_path("A1b").await.unwrap().unwrap();
        assert_eq!(path.to_string(), "A.A1.A1b");

        let forest = service.search("cork", None).await.unwrap();
        assert_eq!(forest[0].find("A1b").map(|n| n.code.as_str()), Some("A1b"));
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_parent() {
        let service = create_test_service().await;
        let err = service
            .import(vec![NewCode::new("X", en("Orphan"), Some("MISSING"))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathIntegrity(_)));
        assert_eq!(service.repository().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_rejects_relocation() {
        let service = create_test_service().await;
        seed(&service).await;

        let err = service
            .import(vec![NewCode::new("A1", en("Forestry"), Some("B"))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cpv move"));
    }

    #[tokio::test]
    async fn test_import_is_repeatable() {
        let service = create_test_service().await;
        seed(&service).await;
        seed(&service).await;
        assert_eq!(service.repository().count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_move_code_carries_subtree() {
        let service = create_test_service().await;
        seed(&service).await;

        let moved = service.move_code("A1", Some("B")).await.unwrap();
        assert_eq!(moved, 2);

        let forest = service.search("timber", None).await.unwrap();
        assert_eq!(codes(&forest), vec!["B"]);
        assert_eq!(codes(&forest[0].children), vec!["A1"]);

        assert_eq!(service.move_code("A1", Some("B")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_move_code_rejects_own_subtree_and_unknown_codes() {
        let service = create_test_service().await;
        seed(&service).await;

        let err = service.move_code("A", Some("A1a")).await.unwrap_err();
        assert!(matches!(err, Error::PathIntegrity(_)));

        let err = service.move_code("A", Some("A")).await.unwrap_err();
        assert!(matches!(err, Error::PathIntegrity(_)));

        let err = service.move_code("NOPE", None).await.unwrap_err();
        assert!(matches!(err, Error::CodeNotFound(_)));

        let err = service.move_code("A1", Some("NOPE")).await.unwrap_err();
        assert!(matches!(err, Error::CodeNotFound(_)));
    }

    // ========== Store failures ==========

    #[derive(Clone, Copy)]
    enum StubMode {
        Fails,
        Hangs,
        LosesAncestors,
    }

    struct StubRepository {
        mode: StubMode,
        calls: AtomicUsize,
    }

    impl StubRepository {
        fn new(mode: StubMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CodeRepositoryTrait for StubRepository {
        async fn find_by_parent(&self, _parent_code: Option<&str>) -> Result<Vec<CpvCode>> {
            Err(Error::DatabaseError(sqlx::Error::PoolTimedOut))
        }

        async fn find_path(&self, _code: &str) -> Result<Option<CodePath>> {
            Ok(None)
        }

        async fn count(&self) -> Result<u64> {
            Ok(0)
        }

        async fn find_paths_matching(&self, _predicate: &Predicate) -> Result<Vec<CodePath>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                StubMode::Fails => Err(Error::DatabaseError(sqlx::Error::PoolTimedOut)),
                StubMode::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
                StubMode::LosesAncestors => Ok(vec![CodePath::parse("A.X").unwrap()]),
            }
        }

        async fn find_by_path_contained_in(&self, _paths: &[CodePath]) -> Result<Vec<Code>> {
            let path = CodePath::parse("A.X").unwrap();
            Ok(vec![Code::new("X", en("Stray"), Some("A".to_string()), path).unwrap()])
        }

        async fn upsert_codes(&self, _codes: &[Code]) -> Result<u64> {
            Ok(0)
        }

        async fn move_subtree(
            &self,
            _from: &CodePath,
            _to: &CodePath,
            _new_parent: Option<&str>,
        ) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_search_unavailable() {
        let stub = StubRepository::new(StubMode::Fails);
        let service = TaxonomyService::new(stub.clone());

        let err = service.search("wood", None).await.unwrap_err();
        assert!(matches!(err, Error::SearchUnavailable(_)), "unexpected error: {:?}", err);

        let err = service.list_children(None).await.unwrap_err();
        assert!(matches!(err, Error::SearchUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_is_search_unavailable() {
        let stub = StubRepository::new(StubMode::Hangs);
        let service = TaxonomyService::new(stub.clone()).with_timeout(Duration::from_secs(1));

        let err = service.search("wood", None).await.unwrap_err();
        assert!(matches!(err, Error::SearchUnavailable(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_match_nothing_never_reaches_the_store() {
        let stub = StubRepository::new(StubMode::Fails);
        let service = TaxonomyService::new(stub.clone());

        assert!(service.search("", None).await.unwrap().is_empty());
        assert!(service.search("-wood", None).await.unwrap().is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_ancestor_is_an_integrity_error() {
        let stub = StubRepository::new(StubMode::LosesAncestors);
        let service = TaxonomyService::new(stub);

        let err = service.search("stray", None).await.unwrap_err();
        assert!(matches!(err, Error::PathIntegrity(_)), "unexpected error: {:?}", err);
    }
}
