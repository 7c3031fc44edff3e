//! Hearth storage crate - SQLite property catalog and FTS5 keyword index.
//!
//! Provides a WAL-mode SQLite database with migrations, the listing
//! repository implementing [`PropertyCatalog`](hearth_core::PropertyCatalog),
//! and an FTS5-backed [`FullTextIndex`](hearth_core::FullTextIndex).

pub mod db;
pub mod listings;
pub mod migrations;
pub mod search;

pub use db::Database;
pub use listings::ListingRepository;
pub use search::{sanitize_fts5_query, ListingSearch};
