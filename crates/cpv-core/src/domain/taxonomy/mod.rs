//! Taxonomy domain module
//!
//! A hierarchical code taxonomy with localized labels, browsable level by
//! level and searchable by free text.
//!
//! # Architecture
//!
//! - **Path**: `CodePath`, the materialized path of a code
//! - **Label**: `Localized` text in the closed `Language` set
//! - **Analysis**: word splitting and per-language Snowball stemming
//! - **Predicate**: `Predicate`, a web-search query compiled per language
//! - **Tree**: `build_tree`, flat records to a forest
//! - **Repository**: `CodeRepository` over SQLite FTS5
//! - **Service**: `TaxonomyService` for browsing, search, import and moves
//!
//! # Example
//!
//! ```ignore
//! use cpv_core::domain::taxonomy::{Language, TaxonomyService};
//!
//! let service = TaxonomyService::from_pool(db.pool().clone());
//!
//! // Matches plus every ancestor, assembled into a forest
//! let forest = service.search("sawn timber", Some(Language::En)).await?;
//!
//! // Browse one level at a time
//! let roots = service.list_children(None).await?;
//! ```

pub mod analysis;
pub mod entity;
pub mod label;
pub mod path;
pub mod predicate;
pub mod repository;
pub mod repository_trait;
pub mod service;
pub mod tree;

// Re-export main types
pub use entity::{Code, CpvCode, NewCode, SearchResult};
pub use label::{Language, Localized};
pub use path::{CodePath, collect_paths, derive_paths, is_ancestor_or_self};
pub use predicate::{Predicate, TextSearchConfig, WebSearchQuery};
pub use repository::CodeRepository;
pub use repository_trait::CodeRepositoryTrait;
pub use service::TaxonomyService;
pub use tree::build_tree;
