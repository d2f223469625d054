//! PostgreSQL `pokeapi` repository using diesel-async.
//!
//! The body column is JSONB and timestamps are TIMESTAMPTZ, so queries are
//! written as SQL with explicit casts rather than against `schema::pokeapi`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::OptionalExtension;
use diesel::sql_types::{BigInt, Integer, Nullable, Text, Timestamptz};
use diesel::QueryableByName;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{parse_body, PokemonStore, StoreError};
use crate::models::{RowUpsert, StoredRow, Summary};

/// Connection pool for PostgreSQL using deadpool.
pub type PgPool = Pool<AsyncPgConnection>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const CREATE_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS pokeapi (
    id SERIAL PRIMARY KEY,
    name VARCHAR(255),
    url VARCHAR(2048) NOT NULL UNIQUE,
    status INTEGER,
    body JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ
)"#;

const UPSERT_SQL: &str = r#"INSERT INTO pokeapi (name, url, status, body, updated_at)
VALUES ($1, $2, $3, CAST($4 AS JSONB), NOW())
ON CONFLICT (url) DO UPDATE
  SET name = EXCLUDED.name,
      status = EXCLUDED.status,
      body = EXCLUDED.body,
      updated_at = NOW()"#;

const FIND_BY_URL_SQL: &str = r#"SELECT id, name, url, status, body::text AS body, created_at, updated_at
FROM pokeapi WHERE url = $1"#;

const SUMMARY_SQL: &str = r#"SELECT
    COUNT(*) AS total,
    COUNT(*) FILTER (WHERE status IS NULL) AS null_status,
    COUNT(*) FILTER (WHERE status = 200) AS status_200,
    COUNT(*) FILTER (WHERE status <> 200) AS non_200
FROM pokeapi"#;

#[derive(QueryableByName)]
struct PgRowRecord {
    #[diesel(sql_type = Integer)]
    id: i32,
    #[diesel(sql_type = Nullable<Text>)]
    name: Option<String>,
    #[diesel(sql_type = Text)]
    url: String,
    #[diesel(sql_type = Nullable<Integer>)]
    status: Option<i32>,
    #[diesel(sql_type = Nullable<Text>)]
    body: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<PgRowRecord> for StoredRow {
    fn from(record: PgRowRecord) -> Self {
        StoredRow {
            id: record.id,
            name: record.name,
            body: parse_body(&record.url, record.body),
            url: record.url,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(QueryableByName)]
struct SummaryRecord {
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = BigInt)]
    null_status: i64,
    #[diesel(sql_type = BigInt)]
    status_200: i64,
    #[diesel(sql_type = BigInt)]
    non_200: i64,
}

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct PgPokemonRepository {
    pool: PgPool,
}

impl PgPokemonRepository {
    /// Build a pool for `database_url`. Connections are opened lazily.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(1)
            .runtime(deadpool::Runtime::Tokio1)
            .create_timeout(Some(CONNECT_TIMEOUT))
            .wait_timeout(Some(CONNECT_TIMEOUT))
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl PokemonStore for PgPokemonRepository {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        diesel::sql_query(CREATE_TABLE_SQL)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn upsert(&self, row: &RowUpsert) -> Result<(), StoreError> {
        let body = row.body.as_ref().map(serde_json::to_string).transpose()?;
        let mut conn = self.conn().await?;

        diesel::sql_query(UPSERT_SQL)
            .bind::<Nullable<Text>, _>(row.name.as_deref())
            .bind::<Text, _>(&row.url)
            .bind::<Integer, _>(row.status)
            .bind::<Nullable<Text>, _>(body.as_deref())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<StoredRow>, StoreError> {
        let mut conn = self.conn().await?;
        let record = diesel::sql_query(FIND_BY_URL_SQL)
            .bind::<Text, _>(url)
            .get_result::<PgRowRecord>(&mut *conn)
            .await
            .optional()?;
        Ok(record.map(StoredRow::from))
    }

    async fn summary(&self) -> Result<Summary, StoreError> {
        let mut conn = self.conn().await?;
        let record = diesel::sql_query(SUMMARY_SQL)
            .get_result::<SummaryRecord>(&mut *conn)
            .await?;

        Ok(Summary {
            total: record.total,
            null_status: record.null_status,
            status_200: record.status_200,
            non_200: record.non_200,
        })
    }
}
