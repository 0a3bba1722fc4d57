//! Database migrations
//!
//! This module manages SQLite schema migrations for cpv.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Code taxonomy with label full-text indexes
const MIGRATION_V1: &str = r#"
    -- Codes with their localized name (JSON object) and materialized path
    CREATE TABLE IF NOT EXISTS cpv_codes (
        code TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        parent_code TEXT REFERENCES cpv_codes(code) DEFERRABLE INITIALLY DEFERRED,
        path TEXT NOT NULL UNIQUE,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_cpv_codes_parent_code ON cpv_codes(parent_code);

    -- Every language column, diacritics folded, no stemming
    CREATE VIRTUAL TABLE IF NOT EXISTS cpv_labels_fts USING fts5(
        code UNINDEXED, de, fr, it, en,
        tokenize = 'unicode61 remove_diacritics 2'
    );

    -- Snowball stems per language column, written by the code repository
    CREATE VIRTUAL TABLE IF NOT EXISTS cpv_labels_stemmed_fts USING fts5(
        code UNINDEXED, de, fr, it, en,
        tokenize = 'unicode61 remove_diacritics 2'
    );

    -- Triggers to keep the unstemmed index in sync; malformed names index nothing
    CREATE TRIGGER IF NOT EXISTS cpv_codes_ai AFTER INSERT ON cpv_codes BEGIN
        INSERT INTO cpv_labels_fts(rowid, code, de, fr, it, en)
        SELECT NEW.rowid, NEW.code,
               json_extract(NEW.name, '$.de'), json_extract(NEW.name, '$.fr'),
               json_extract(NEW.name, '$.it'), json_extract(NEW.name, '$.en')
        WHERE json_valid(NEW.name);
    END;

    CREATE TRIGGER IF NOT EXISTS cpv_codes_ad AFTER DELETE ON cpv_codes BEGIN
        DELETE FROM cpv_labels_fts WHERE rowid = OLD.rowid;
        DELETE FROM cpv_labels_stemmed_fts WHERE rowid = OLD.rowid;
    END;

    CREATE TRIGGER IF NOT EXISTS cpv_codes_au AFTER UPDATE OF name ON cpv_codes BEGIN
        DELETE FROM cpv_labels_fts WHERE rowid = OLD.rowid;
        INSERT INTO cpv_labels_fts(rowid, code, de, fr, it, en)
        SELECT NEW.rowid, NEW.code,
               json_extract(NEW.name, '$.de'), json_extract(NEW.name, '$.fr'),
               json_extract(NEW.name, '$.it'), json_extract(NEW.name, '$.en')
        WHERE json_valid(NEW.name);
    END;
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    // MAX() yields a NULL row on an empty table
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Code taxonomy and label search indexes");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
