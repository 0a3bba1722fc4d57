//! cpv Core Library
//!
//! This crate provides the core functionality for cpv, including:
//! - Materialized-path hierarchy of codes with localized labels
//! - Full-text predicates with per-language text-search configurations
//! - Search with ancestor closure and forest reconstruction
//! - Storage (SQLite + FTS5)
//! - Transport-neutral API used by the CLI and the HTTP server

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::taxonomy::{
        CpvCode, Language, Localized, NewCode, SearchResult, TaxonomyService,
    };
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
