//! Transport-neutral API
//!
//! Request validation and DTO mapping shared by the CLI and the HTTP server.
//! Both front ends open the database through [`open_database`] and build one
//! [`TaxonomyService`] per process.

pub mod codes;
pub mod health;

use anyhow::Context;

use crate::config::Config;
use crate::domain::taxonomy::TaxonomyService;
use crate::storage::Database;

/// Open (and migrate) the database described by the configuration
pub async fn open_database(config: &Config) -> anyhow::Result<Database> {
    Database::new(config.database_config())
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path.display()))
}

/// Build the taxonomy service over an open database
pub fn taxonomy_service(db: &Database, config: &Config) -> TaxonomyService {
    TaxonomyService::from_pool(db.pool().clone()).with_timeout(config.search_timeout())
}
