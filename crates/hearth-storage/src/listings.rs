//! SQLite-backed listing repository.
//!
//! Implements [`PropertyCatalog`] for the chat engine and the write paths
//! used by the importer.

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row, ToSql};
use tracing::{debug, info};

use hearth_core::catalog::{CatalogQuery, PropertyCatalog};
use hearth_core::error::HearthError;
use hearth_core::types::{Listing, ListingId, NewListing};

use crate::db::Database;

const LISTING_COLUMNS: &str = "id, title, description, rooms, bathrooms, parking_spots, area, \
     city, neighborhood, street, street_number, rent, property_tax, condo_fee, pets_allowed, \
     neighborhood_code";

/// Repository over the `listings` table.
pub struct ListingRepository {
    db: Arc<Database>,
}

impl ListingRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a listing and return its assigned id.
    pub fn insert(&self, listing: &NewListing) -> Result<ListingId, HearthError> {
        self.db.with_conn(|conn| {
            conn.execute(INSERT_SQL, &insert_params(listing)[..])
                .map_err(|e| HearthError::Storage(format!("Failed to insert listing: {}", e)))?;
            Ok(ListingId(conn.last_insert_rowid()))
        })
    }

    /// Insert many listings in a single transaction.
    pub fn insert_many(&self, listings: &[NewListing]) -> Result<Vec<ListingId>, HearthError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| HearthError::Storage(format!("Failed to begin import: {}", e)))?;
            let mut ids = Vec::with_capacity(listings.len());
            for listing in listings {
                tx.execute(INSERT_SQL, &insert_params(listing)[..]).map_err(|e| {
                    HearthError::Storage(format!(
                        "Failed to insert listing '{}': {}",
                        listing.title, e
                    ))
                })?;
                ids.push(ListingId(tx.last_insert_rowid()));
            }
            tx.commit()
                .map_err(|e| HearthError::Storage(format!("Failed to commit import: {}", e)))?;
            info!(count = ids.len(), "Listings imported");
            Ok(ids)
        })
    }

    pub fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, HearthError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLUMNS);
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| HearthError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(params![id.0], row_to_listing)
                .map_err(|e| HearthError::Storage(e.to_string()))?;
            match rows.next() {
                Some(row) => Ok(Some(row.map_err(|e| HearthError::Storage(e.to_string()))?)),
                None => Ok(None),
            }
        })
    }

    /// Run a structured query. Results are ordered by total monthly cost,
    /// then id.
    pub fn find(&self, query: &CatalogQuery) -> Result<Vec<Listing>, HearthError> {
        if matches!(query.id_in, Some(ref ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT {} FROM listings WHERE 1 = 1", LISTING_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(ref neighborhood) = query.neighborhood {
            values.push(Value::Text(neighborhood.clone()));
            sql.push_str(&format!(
                " AND neighborhood = ?{} COLLATE NOCASE",
                values.len()
            ));
        }
        if let Some(max_rent) = query.max_rent {
            values.push(Value::Real(max_rent));
            sql.push_str(&format!(" AND rent <= ?{}", values.len()));
        }
        if let Some(min_rooms) = query.min_rooms {
            values.push(Value::Integer(i64::from(min_rooms)));
            sql.push_str(&format!(" AND rooms >= ?{}", values.len()));
        }
        if query.pets_required {
            sql.push_str(" AND pets_allowed = 1");
        }
        if let Some(kind) = query.property_type {
            let mut clauses = Vec::with_capacity(kind.title_terms().len());
            for term in kind.title_terms() {
                values.push(Value::Text(format!("%{}%", term)));
                clauses.push(format!("LOWER(title) LIKE ?{}", values.len()));
            }
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
        if let Some(ref ids) = query.id_in {
            let mut placeholders = Vec::with_capacity(ids.len());
            for id in ids {
                values.push(Value::Integer(id.0));
                placeholders.push(format!("?{}", values.len()));
            }
            sql.push_str(&format!(" AND id IN ({})", placeholders.join(", ")));
        }
        if !query.exclude_ids.is_empty() {
            let mut placeholders = Vec::with_capacity(query.exclude_ids.len());
            for id in &query.exclude_ids {
                values.push(Value::Integer(id.0));
                placeholders.push(format!("?{}", values.len()));
            }
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY (rent + property_tax + condo_fee) ASC, id ASC");

        debug!(sql = %sql, params = values.len(), "Catalog query");

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| HearthError::Storage(format!("Catalog query prepare failed: {}", e)))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_listing)
                .map_err(|e| HearthError::Storage(format!("Catalog query failed: {}", e)))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| HearthError::Storage(e.to_string()))
        })
    }

    /// Distinct neighborhood names, alphabetically.
    pub fn neighborhoods(&self) -> Result<Vec<String>, HearthError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT neighborhood FROM listings
                     WHERE neighborhood <> ''
                     ORDER BY neighborhood COLLATE NOCASE ASC",
                )
                .map_err(|e| HearthError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| HearthError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| HearthError::Storage(e.to_string()))
        })
    }

    pub fn count(&self) -> Result<u64, HearthError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))
                .map_err(|e| HearthError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

impl PropertyCatalog for ListingRepository {
    fn query(&self, query: &CatalogQuery) -> hearth_core::Result<Vec<Listing>> {
        self.find(query)
    }

    fn get_by_id(&self, id: ListingId) -> hearth_core::Result<Option<Listing>> {
        self.find_by_id(id)
    }

    fn list_distinct_neighborhoods(&self) -> hearth_core::Result<Vec<String>> {
        self.neighborhoods()
    }
}

const INSERT_SQL: &str = "INSERT INTO listings (title, description, rooms, bathrooms, \
     parking_spots, area, city, neighborhood, street, street_number, rent, property_tax, \
     condo_fee, pets_allowed, neighborhood_code) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

fn insert_params(listing: &NewListing) -> [&dyn ToSql; 15] {
    [
        &listing.title,
        &listing.description,
        &listing.rooms,
        &listing.bathrooms,
        &listing.parking_spots,
        &listing.area,
        &listing.city,
        &listing.neighborhood,
        &listing.street,
        &listing.street_number,
        &listing.rent,
        &listing.property_tax,
        &listing.condo_fee,
        &listing.pets_allowed,
        &listing.neighborhood_code,
    ]
}

fn row_to_listing(row: &Row<'_>) -> Result<Listing, rusqlite::Error> {
    Ok(Listing {
        id: ListingId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        rooms: row.get(3)?,
        bathrooms: row.get(4)?,
        parking_spots: row.get(5)?,
        area: row.get(6)?,
        city: row.get(7)?,
        neighborhood: row.get(8)?,
        street: row.get(9)?,
        street_number: row.get(10)?,
        rent: row.get(11)?,
        property_tax: row.get(12)?,
        condo_fee: row.get(13)?,
        pets_allowed: row.get(14)?,
        neighborhood_code: row.get(15)?,
    })
}
