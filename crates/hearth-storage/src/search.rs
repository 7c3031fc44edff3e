//! Keyword search over listings using SQLite FTS5.
//!
//! The `listings_fts` virtual table indexes title, description, neighborhood
//! and street; results are ranked by BM25.

use std::sync::Arc;

use rusqlite::params;

use hearth_core::catalog::FullTextIndex;
use hearth_core::error::HearthError;
use hearth_core::types::ListingId;

use crate::db::Database;

/// Full-text listing search backed by FTS5.
pub struct ListingSearch {
    db: Arc<Database>,
}

impl ListingSearch {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Search with an OR-joined keyword string such as `"parque OR piscina"`.
    ///
    /// The input is sanitized first, so user text can never inject FTS5
    /// operators or column filters.
    pub fn search_ids(&self, keywords: &str, limit: usize) -> Result<Vec<ListingId>, HearthError> {
        let query = sanitize_fts5_query(keywords);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT rowid FROM listings_fts
                     WHERE listings_fts MATCH ?1
                     ORDER BY rank
                     LIMIT ?2",
                )
                .map_err(|e| HearthError::Search(format!("FTS5 query prepare failed: {}", e)))?;

            let rows = stmt
                .query_map(params![query, limit as i64], |row| {
                    row.get::<_, i64>(0).map(ListingId)
                })
                .map_err(|e| HearthError::Search(format!("FTS5 query failed: {}", e)))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| HearthError::Search(e.to_string()))
        })
    }
}

impl FullTextIndex for ListingSearch {
    fn search(&self, or_joined_keywords: &str, limit: usize) -> hearth_core::Result<Vec<ListingId>> {
        self.search_ids(or_joined_keywords, limit)
    }
}

/// Turn free keyword text into a safe FTS5 OR query.
///
/// Every token is reduced to its alphanumeric characters and quoted;
/// bare `OR` separators are dropped and re-inserted between terms.
pub fn sanitize_fts5_query(input: &str) -> String {
    input
        .split_whitespace()
        .filter(|token| *token != "OR")
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token))
        .collect::<Vec<_>>()
        .join(" OR ")
}
