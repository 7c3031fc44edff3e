//! Read-only catalog and full-text index interfaces.
//!
//! Storage backends implement these traits; the chat engine only ever
//! talks to them through `Arc<dyn ...>`.

use crate::error::Result;
use crate::types::{Listing, ListingId, PropertyType};

/// Structured filter for a catalog query. Every populated field is applied
/// conjunctively; `None` means "do not filter on this".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    /// Neighborhood name, compared case-insensitively.
    pub neighborhood: Option<String>,
    /// Upper bound on monthly rent (inclusive).
    pub max_rent: Option<f64>,
    /// Lower bound on room count (inclusive).
    pub min_rooms: Option<u32>,
    /// Only listings that accept pets.
    pub pets_required: bool,
    /// Property type, matched against the listing title.
    pub property_type: Option<PropertyType>,
    /// Restrict to this id set (typically from the full-text index).
    pub id_in: Option<Vec<ListingId>>,
    /// Never return these listings.
    pub exclude_ids: Vec<ListingId>,
}

impl CatalogQuery {
    /// A query with no filters: the whole catalog.
    pub fn all() -> Self {
        Self::default()
    }
}

/// The property catalog. Queries are side-effect free.
pub trait PropertyCatalog: Send + Sync {
    /// Return every listing matching the query, in catalog order.
    fn query(&self, query: &CatalogQuery) -> Result<Vec<Listing>>;

    /// Fetch a single listing by id.
    fn get_by_id(&self, id: ListingId) -> Result<Option<Listing>>;

    /// Distinct neighborhood names known to the catalog.
    fn list_distinct_neighborhoods(&self) -> Result<Vec<String>>;
}

/// Keyword index over listing text.
pub trait FullTextIndex: Send + Sync {
    /// Search with an OR-joined keyword query, returning matching ids
    /// ordered by relevance.
    fn search(&self, or_joined_keywords: &str, limit: usize) -> Result<Vec<ListingId>>;
}
