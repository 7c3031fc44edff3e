//! Database schema migrations.
//!
//! Version 1 creates the listings table and the FTS5 index that mirrors
//! its searchable text columns.

use rusqlite::Connection;
use tracing::info;

use hearth_core::error::HearthError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HearthError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| HearthError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| HearthError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: listings_catalog");
    }

    Ok(())
}

/// Version 1: listings catalog plus external-content FTS5 index.
fn apply_v1(conn: &Connection) -> Result<(), HearthError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            title             TEXT NOT NULL,
            description       TEXT NOT NULL DEFAULT '',
            rooms             INTEGER NOT NULL CHECK (rooms >= 0),
            bathrooms         INTEGER NOT NULL DEFAULT 0 CHECK (bathrooms >= 0),
            parking_spots     INTEGER NOT NULL DEFAULT 0 CHECK (parking_spots >= 0),
            area              REAL NOT NULL DEFAULT 0,
            city              TEXT NOT NULL DEFAULT '',
            neighborhood      TEXT NOT NULL,
            street            TEXT NOT NULL DEFAULT '',
            street_number     TEXT NOT NULL DEFAULT '',
            rent              REAL NOT NULL CHECK (rent >= 0),
            property_tax      REAL NOT NULL DEFAULT 0 CHECK (property_tax >= 0),
            condo_fee         REAL NOT NULL DEFAULT 0 CHECK (condo_fee >= 0),
            pets_allowed      INTEGER NOT NULL DEFAULT 0 CHECK (pets_allowed IN (0, 1)),
            neighborhood_code TEXT NOT NULL DEFAULT '',
            created_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_listings_neighborhood
            ON listings (neighborhood COLLATE NOCASE);

        CREATE INDEX IF NOT EXISTS idx_listings_rent
            ON listings (rent ASC);

        CREATE VIRTUAL TABLE IF NOT EXISTS listings_fts USING fts5(
            title,
            description,
            neighborhood,
            street,
            content = 'listings',
            content_rowid = 'id',
            tokenize = 'unicode61 remove_diacritics 2'
        );

        CREATE TRIGGER IF NOT EXISTS listings_fts_insert AFTER INSERT ON listings BEGIN
            INSERT INTO listings_fts (rowid, title, description, neighborhood, street)
            VALUES (new.id, new.title, new.description, new.neighborhood, new.street);
        END;

        CREATE TRIGGER IF NOT EXISTS listings_fts_delete AFTER DELETE ON listings BEGIN
            INSERT INTO listings_fts (listings_fts, rowid, title, description, neighborhood, street)
            VALUES ('delete', old.id, old.title, old.description, old.neighborhood, old.street);
        END;

        CREATE TRIGGER IF NOT EXISTS listings_fts_update AFTER UPDATE ON listings BEGIN
            INSERT INTO listings_fts (listings_fts, rowid, title, description, neighborhood, street)
            VALUES ('delete', old.id, old.title, old.description, old.neighborhood, old.street);
            INSERT INTO listings_fts (rowid, title, description, neighborhood, street)
            VALUES (new.id, new.title, new.description, new.neighborhood, new.street);
        END;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'listings_catalog');
        ",
    )
    .map_err(|e| HearthError::Storage(format!("Migration v1 failed: {}", e)))
}
