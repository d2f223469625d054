//! Persistence for ingested rows.
//!
//! [`PokemonStore`] is the seam the ingestor writes through. SQLite (sync
//! Diesel on an r2d2 pool) is always available; PostgreSQL (diesel-async on a
//! deadpool) is compiled in with the `postgres` feature.

pub mod diesel_models;
pub mod diesel_pokemon;
pub mod diesel_pool;
#[cfg(feature = "postgres")]
pub mod pg_pokemon;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, Settings};
use crate::models::{RowUpsert, StoredRow, Summary};

pub use diesel_pokemon::DieselPokemonRepository;
pub use diesel_pool::{create_diesel_pool, create_diesel_pool_from_url, SqlitePool};
#[cfg(feature = "postgres")]
pub use pg_pokemon::PgPokemonRepository;

/// Errors from the persistent store. All of them abort a run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Failed to serialize row body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}

/// Storage for rows keyed by source URL.
#[async_trait]
pub trait PokemonStore: Send + Sync {
    /// Create the table if it does not exist. Never alters an existing table.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert a row, or overwrite name/status/body of the row with the same URL.
    /// Each call is committed on its own.
    async fn upsert(&self, row: &RowUpsert) -> Result<(), StoreError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<StoredRow>, StoreError>;

    /// Counts over the whole table.
    async fn summary(&self) -> Result<Summary, StoreError>;
}

/// Open the configured store and make sure its table exists.
///
/// A configured database host selects PostgreSQL; otherwise a SQLite file in
/// the data directory is used.
pub async fn connect_store(settings: &Settings) -> Result<Arc<dyn PokemonStore>, StoreError> {
    let store: Arc<dyn PokemonStore> = match settings.database.postgres_url()? {
        Some(url) => connect_postgres(&url, settings).await?,
        None => {
            settings.ensure_directories()?;
            let path = settings.database_path();
            debug!("Opening SQLite database at {}", path.display());
            Arc::new(DieselPokemonRepository::new(create_diesel_pool(&path)?))
        }
    };

    store.ensure_schema().await?;
    Ok(store)
}

#[cfg(feature = "postgres")]
async fn connect_postgres(
    url: &str,
    settings: &Settings,
) -> Result<Arc<dyn PokemonStore>, StoreError> {
    debug!(
        "Connecting to PostgreSQL database {} on {:?}",
        settings.database.name, settings.database.host
    );
    Ok(Arc::new(PgPokemonRepository::connect(url)?))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(
    _url: &str,
    settings: &Settings,
) -> Result<Arc<dyn PokemonStore>, StoreError> {
    let host = settings.database.host.clone().unwrap_or_default();
    Err(ConfigError::PostgresUnavailable(host).into())
}

/// Parse a stored timestamp, accepting RFC 3339 and SQLite's default format.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| {
            warn!("Unparseable stored timestamp {:?}, using current time", s);
            Utc::now()
        })
}

/// Decode a stored JSON body. Corrupt text is reported and read back as `None`.
pub fn parse_body(url: &str, body: Option<String>) -> Option<serde_json::Value> {
    let text = body?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Corrupt stored body for {}: {}", url, e);
            None
        }
    }
}

pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}
