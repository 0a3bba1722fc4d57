//! Health API
//!
//! Provides system health checks and diagnostics for `cpv doctor`.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::domain::taxonomy::{CodeRepository, CodeRepositoryTrait};
use crate::storage::Database;

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

/// Overall system health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: String,
}

/// Run all health checks (doctor command)
pub async fn doctor(config: &Config) -> HealthReport {
    let mut checks = vec![check_config(config)];

    match Database::new(config.database_config().no_migrate()).await {
        Ok(db) => {
            checks.push(check_database(&db).await);
            checks.push(check_schema(&db).await);
            checks.push(check_taxonomy(&db).await);
            db.close().await;
        }
        Err(e) => checks.push(HealthCheck::new(
            "Database",
            HealthStatus::Error,
            format!("Connection failed: {:#}", e),
        )),
    }

    let overall_status = checks
        .iter()
        .map(|check| check.status)
        .max()
        .unwrap_or(HealthStatus::Ok);

    HealthReport {
        overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Check config file
fn check_config(config: &Config) -> HealthCheck {
    if let Err(e) = config.validate() {
        return HealthCheck::new("Configuration", HealthStatus::Error, e.to_string());
    }

    match Config::config_path() {
        Ok(path) if path.exists() => HealthCheck::new(
            "Configuration",
            HealthStatus::Ok,
            format!("Found at {}", path.display()),
        ),
        Ok(path) => HealthCheck::new(
            "Configuration",
            HealthStatus::Ok,
            format!("Not found at {} (using defaults)", path.display()),
        ),
        Err(e) => HealthCheck::new("Configuration", HealthStatus::Warning, e.to_string()),
    }
}

/// Check that the database answers queries
async fn check_database(db: &Database) -> HealthCheck {
    match db.health_check().await {
        Ok(()) => HealthCheck::new(
            "Database",
            HealthStatus::Ok,
            format!("Connected at {}", db.path().display()),
        ),
        Err(e) => HealthCheck::new("Database", HealthStatus::Error, format!("{:#}", e)),
    }
}

/// Check schema version
async fn check_schema(db: &Database) -> HealthCheck {
    match db.migration_status().await {
        Ok(status) if status.needs_migration => HealthCheck::new(
            "Schema",
            HealthStatus::Warning,
            format!(
                "Version {} of {}; any other command migrates it",
                status.current_version, status.target_version
            ),
        ),
        Ok(status) => HealthCheck::new(
            "Schema",
            HealthStatus::Ok,
            format!("Up to date (version {})", status.current_version),
        ),
        Err(e) => HealthCheck::new("Schema", HealthStatus::Error, format!("{:#}", e)),
    }
}

/// Check that there is something to search
async fn check_taxonomy(db: &Database) -> HealthCheck {
    let repository = CodeRepository::new(db.pool().clone());
    match repository.count().await {
        Ok(0) => HealthCheck::new(
            "Taxonomy",
            HealthStatus::Warning,
            "No codes stored; load them with `cpv import <file>`",
        ),
        Ok(count) => HealthCheck::new("Taxonomy", HealthStatus::Ok, format!("{} codes", count)),
        // an unmigrated database has no table yet; the schema check reports that
        Err(e) => HealthCheck::new("Taxonomy", HealthStatus::Warning, e.to_string()),
    }
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub version: String,
    pub database_path: String,
    pub config_path: Option<String>,
}

/// Get system information
pub fn get_system_info(config: &Config) -> SystemInfo {
    SystemInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        database_path: config.database.path.display().to_string(),
        config_path: Config::config_path().ok().map(|p| p.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{open_database, taxonomy_service};
    use crate::domain::taxonomy::{Language, Localized, NewCode};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = dir.path().join("cpv.db");
        config
    }

    #[tokio::test]
    async fn test_doctor_on_fresh_database_warns() {
        let dir = TempDir::new().unwrap();
        let report = doctor(&config_in(&dir)).await;

        assert_eq!(report.overall_status, HealthStatus::Warning);
        let schema = report.checks.iter().find(|c| c.name == "Schema").unwrap();
        assert_eq!(schema.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_doctor_on_populated_database_is_ok() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let db = open_database(&config).await.unwrap();
        taxonomy_service(&db, &config)
            .import(vec![NewCode::new(
                "A",
                Localized::default().with(Language::En, "Agriculture"),
                None,
            )])
            .await
            .unwrap();
        db.close().await;

        let report = doctor(&config).await;
        assert_eq!(report.overall_status, HealthStatus::Ok, "{:?}", report.checks);
        let taxonomy = report.checks.iter().find(|c| c.name == "Taxonomy").unwrap();
        assert_eq!(taxonomy.message.as_deref(), Some("1 codes"));
    }

    #[tokio::test]
    async fn test_database_check_reports_closed_pool() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(check_database(&db).await.status, HealthStatus::Ok);

        db.close().await;
        assert_eq!(check_database(&db).await.status, HealthStatus::Error);
    }

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Error > HealthStatus::Warning);
        assert!(HealthStatus::Warning > HealthStatus::Ok);
    }

    #[test]
    fn test_system_info() {
        let info = get_system_info(&Config::default());
        assert!(!info.version.is_empty());
        assert!(info.database_path.ends_with("cpv.db"));
    }
}
