//! Diesel-based `pokeapi` repository for SQLite.
//!
//! Sync Diesel wrapped in spawn_blocking. Bodies are stored as JSON text and
//! timestamps as RFC 3339 strings.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;

use super::diesel_models::{NewPokemonRow, PokemonRowRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{parse_body, parse_datetime, parse_datetime_opt, PokemonStore, StoreError};
use crate::models::{RowUpsert, StoredRow, Summary};
use crate::schema::pokeapi;

/// Table definition; must stay in sync with `schema::pokeapi`.
pub const CREATE_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS pokeapi (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    url TEXT NOT NULL UNIQUE,
    status INTEGER,
    body TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT
)"#;

/// Convert a database record to a domain model.
impl From<PokemonRowRecord> for StoredRow {
    fn from(record: PokemonRowRecord) -> Self {
        StoredRow {
            id: record.id,
            name: record.name,
            body: parse_body(&record.url, record.body),
            url: record.url,
            status: record.status,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime_opt(record.updated_at),
        }
    }
}

/// Diesel-based pokeapi repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselPokemonRepository {
    pool: SqlitePool,
}

impl DieselPokemonRepository {
    /// Create a new repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all rows ordered by primary key.
    pub async fn get_all(&self) -> Result<Vec<StoredRow>, StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let records = pokeapi::table
                .order(pokeapi::id.asc())
                .load::<PokemonRowRecord>(conn)?;
            Ok(records.into_iter().map(StoredRow::from).collect())
        })
        .await
    }
}

#[async_trait]
impl PokemonStore for DieselPokemonRepository {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, |conn| {
            diesel::sql_query(CREATE_TABLE_SQL).execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Insert or update by URL using ON CONFLICT.
    async fn upsert(&self, row: &RowUpsert) -> Result<(), StoreError> {
        let body = row.body.as_ref().map(serde_json::to_string).transpose()?;
        let name = row.name.clone();
        let url = row.url.clone();
        let status = row.status;
        let now = Utc::now().to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let new_row = NewPokemonRow {
                name: name.as_deref(),
                url: &url,
                status: Some(status),
                body: body.as_deref(),
                created_at: &now,
                updated_at: Some(&now),
            };

            diesel::insert_into(pokeapi::table)
                .values(&new_row)
                .on_conflict(pokeapi::url)
                .do_update()
                .set((
                    pokeapi::name.eq(excluded(pokeapi::name)),
                    pokeapi::status.eq(excluded(pokeapi::status)),
                    pokeapi::body.eq(excluded(pokeapi::body)),
                    pokeapi::updated_at.eq(excluded(pokeapi::updated_at)),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<StoredRow>, StoreError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let record = pokeapi::table
                .filter(pokeapi::url.eq(&url))
                .first::<PokemonRowRecord>(conn)
                .optional()?;
            Ok(record.map(StoredRow::from))
        })
        .await
    }

    async fn summary(&self) -> Result<Summary, StoreError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let total: i64 = pokeapi::table.count().get_result(conn)?;
            let null_status: i64 = pokeapi::table
                .filter(pokeapi::status.is_null())
                .count()
                .get_result(conn)?;
            let status_200: i64 = pokeapi::table
                .filter(pokeapi::status.eq(200))
                .count()
                .get_result(conn)?;
            let non_200: i64 = pokeapi::table
                .filter(pokeapi::status.ne(200))
                .count()
                .get_result(conn)?;

            Ok(Summary {
                total,
                null_status,
                status_200,
                non_200,
            })
        })
        .await
    }
}
