//! SQLite implementation of the taxonomy repository
//!
//! Labels are matched through two FTS5 tables: the unstemmed one is kept in
//! sync by triggers, the stemmed one is written here on every upsert.
//! Ancestor closure is a lookup on the unique `path` column.

use async_trait::async_trait;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::analysis::stemmed_text;
use super::entity::{Code, CpvCode};
use super::label::{Language, Localized};
use super::path::{CodePath, collect_paths};
use super::predicate::Predicate;
use super::repository_trait::CodeRepositoryTrait;
use crate::error::{Error, Result};

/// Repository for taxonomy database operations
#[derive(Debug, Clone)]
pub struct CodeRepository {
    pool: SqlitePool,
}

impl CodeRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CodeRepositoryTrait for CodeRepository {
    // ========== Browsing ==========

    async fn find_by_parent(&self, parent_code: Option<&str>) -> Result<Vec<CpvCode>> {
        let rows: Vec<ChildRow> = sqlx::query_as(
            r#"
            SELECT c.code, c.name, c.parent_code,
                   EXISTS(SELECT 1 FROM cpv_codes k WHERE k.parent_code = c.code) AS has_children
            FROM cpv_codes c
            WHERE c.parent_code IS ?
            ORDER BY c.code
            "#,
        )
        .bind(parent_code)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(ChildRow::into_cpv_code).collect()
    }

    async fn find_path(&self, code: &str) -> Result<Option<CodePath>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT path FROM cpv_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        row.map(|(path,)| CodePath::parse(&path)).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cpv_codes")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;
        Ok(count.max(0) as u64)
    }

    // ========== Search ==========

    async fn find_paths_matching(&self, predicate: &Predicate) -> Result<Vec<CodePath>> {
        let (config, expression) = match (predicate.config(), predicate.match_expression()) {
            (Some(config), Some(expression)) => (config, expression),
            _ => return Ok(Vec::new()),
        };

        // Only the static table name is formatted in; the expression is bound
        let sql = format!(
            r#"
            SELECT c.path
            FROM cpv_codes c
            WHERE c.rowid IN (SELECT rowid FROM {table} WHERE {table} MATCH ?)
            ORDER BY c.path
            "#,
            table = config.fts_table
        );

        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(&expression)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        debug!(config = config.name, matched = rows.len(), "Matched label paths");

        rows.iter().map(|(path,)| CodePath::parse(path)).collect()
    }

    async fn find_by_path_contained_in(&self, paths: &[CodePath]) -> Result<Vec<Code>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let prefixes: Vec<CodePath> = paths.iter().flat_map(CodePath::ancestors_or_self).collect();
        let wanted: Vec<String> = collect_paths(&prefixes)
            .iter()
            .map(CodePath::to_string)
            .collect();
        let wanted_json = serde_json::to_string(&wanted)
            .map_err(|e| Error::Other(format!("Failed to serialize path list: {}", e)))?;

        let rows: Vec<CodeRow> = sqlx::query_as(
            r#"
            SELECT code, name, parent_code, path
            FROM cpv_codes
            WHERE path IN (SELECT value FROM json_each(?))
            ORDER BY path
            "#,
        )
        .bind(&wanted_json)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        debug!(
            requested = paths.len(),
            prefixes = wanted.len(),
            found = rows.len(),
            "Loaded ancestor closure"
        );

        rows.into_iter().map(CodeRow::into_code).collect()
    }

    // ========== Maintenance ==========

    async fn upsert_codes(&self, codes: &[Code]) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;
        let mut written = 0;

        for code in codes {
            let name = code.label.to_json()?;
            let result = sqlx::query(
                r#"
                INSERT INTO cpv_codes (code, name, parent_code, path)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(code) DO UPDATE SET
                    name = excluded.name,
                    parent_code = excluded.parent_code,
                    path = excluded.path,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&code.code)
            .bind(&name)
            .bind(&code.parent_code)
            .bind(code.path.to_string())
            .execute(&mut *tx)
            .await
            .map_err(Error::DatabaseError)?;
            written += result.rows_affected();

            index_stemmed_labels(&mut *tx, code).await?;
        }

        tx.commit().await.map_err(Error::DatabaseError)?;

        debug!(codes = codes.len(), written, "Upserted codes");
        Ok(written)
    }

    async fn move_subtree(
        &self,
        from: &CodePath,
        to: &CodePath,
        new_parent: Option<&str>,
    ) -> Result<u64> {
        if from.leaf() != to.leaf() {
            return Err(Error::PathIntegrity(format!(
                "cannot move '{}' to '{}': the code itself must not change",
                from, to
            )));
        }
        to.ensure_consistent(to.leaf(), new_parent)?;

        let from_str = from.to_string();
        let from_prefix = format!("{}.", from_str);
        let keep_from = (from_str.len() + 1) as i64;

        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;

        let moved = sqlx::query(
            r#"
            UPDATE cpv_codes
            SET path = ? || substr(path, ?),
                updated_at = CURRENT_TIMESTAMP
            WHERE path = ? OR substr(path, 1, ?) = ?
            "#,
        )
        .bind(to.to_string())
        .bind(keep_from)
        .bind(&from_str)
        .bind(from_prefix.len() as i64)
        .bind(&from_prefix)
        .execute(&mut *tx)
        .await
        .map_err(Error::DatabaseError)?
        .rows_affected();

        sqlx::query(
            "UPDATE cpv_codes SET parent_code = ?, updated_at = CURRENT_TIMESTAMP WHERE code = ?",
        )
        .bind(new_parent)
        .bind(from.leaf())
        .execute(&mut *tx)
        .await
        .map_err(Error::DatabaseError)?;

        tx.commit().await.map_err(Error::DatabaseError)?;

        debug!(from = %from, to = %to, moved, "Moved subtree");
        Ok(moved)
    }
}

/// Replace the stemmed index row of a stored code
async fn index_stemmed_labels(conn: &mut SqliteConnection, code: &Code) -> Result<()> {
    let stems = Language::all().map(|language| {
        code.label
            .get(language)
            .map(|text| stemmed_text(language, text))
    });

    sqlx::query(
        "DELETE FROM cpv_labels_stemmed_fts WHERE rowid = (SELECT rowid FROM cpv_codes WHERE code = ?)",
    )
    .bind(&code.code)
    .execute(&mut *conn)
    .await
    .map_err(Error::DatabaseError)?;

    let [de, fr, it, en] = stems;
    sqlx::query(
        r#"
        INSERT INTO cpv_labels_stemmed_fts (rowid, code, de, fr, it, en)
        SELECT rowid, code, ?, ?, ?, ? FROM cpv_codes WHERE code = ?
        "#,
    )
    .bind(de)
    .bind(fr)
    .bind(it)
    .bind(en)
    .bind(&code.code)
    .execute(&mut *conn)
    .await
    .map_err(Error::DatabaseError)?;

    Ok(())
}

// ========== Row Types ==========

#[derive(FromRow)]
struct CodeRow {
    code: String,
    name: String,
    parent_code: Option<String>,
    path: String,
}

impl CodeRow {
    fn into_code(self) -> Result<Code> {
        let path = CodePath::parse(&self.path)?;
        let label = Localized::parse(&self.name)?;
        Code::new(self.code, label, self.parent_code, path)
    }
}

#[derive(FromRow)]
struct ChildRow {
    code: String,
    name: String,
    parent_code: Option<String>,
    has_children: i64,
}

impl ChildRow {
    fn into_cpv_code(self) -> Result<CpvCode> {
        Ok(CpvCode {
            label: Localized::parse(&self.name)?,
            code: self.code,
            parent_code: self.parent_code,
            has_children: self.has_children != 0,
        })
    }
}
