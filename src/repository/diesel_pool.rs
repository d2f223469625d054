//! Diesel connection pool management for SQLite.
//!
//! SQLite operations use sync Diesel with r2d2 connection pooling, wrapped in
//! spawn_blocking.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use std::path::Path;
use std::time::Duration;

use super::StoreError;

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// r2d2 pool error type alias.
pub type R2D2Error = diesel::r2d2::PoolError;

/// Connection pool for SQLite using r2d2.
pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// Pooled connection type.
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Fail fast if the database file is locked.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Applies [`init_connection_pragmas`] to every new pooled connection.
#[derive(Debug, Clone, Copy)]
struct PragmaCustomizer;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        init_connection_pragmas(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Create a Diesel connection pool for SQLite.
///
/// Returns an r2d2 pool that can be used with spawn_blocking for async operations.
pub fn create_diesel_pool(db_path: &Path) -> Result<SqlitePool, R2D2Error> {
    let db_url = format!("sqlite:{}", db_path.display());
    create_diesel_pool_from_url(&db_url)
}

/// Create a Diesel connection pool from a database URL.
pub fn create_diesel_pool_from_url(database_url: &str) -> Result<SqlitePool, R2D2Error> {
    // Strip "sqlite:" prefix if present for Diesel
    let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

    let manager = ConnectionManager::<SqliteConnection>::new(url);

    // One logical writer; a single connection keeps writes strictly ordered.
    Pool::builder()
        .max_size(1)
        .connection_timeout(CONNECT_TIMEOUT)
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)
}

/// Initialize SQLite pragmas for a connection.
pub fn init_connection_pragmas(conn: &mut SqliteConnection) -> Result<(), DieselError> {
    diesel::sql_query("PRAGMA journal_mode = WAL").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous = NORMAL").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout = 3000").execute(conn)?;
    Ok(())
}

/// Run a blocking Diesel operation asynchronously.
///
/// This wraps a sync closure in spawn_blocking, allowing Diesel operations
/// to be used in async contexts without blocking the runtime.
///
/// # Example
/// ```ignore
/// let summary = run_blocking(pool.clone(), |conn| {
///     Ok(pokeapi::table.count().get_result::<i64>(conn)?)
/// }).await?;
/// ```
pub async fn run_blocking<F, T>(pool: SqlitePool, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn: PooledConn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Pool(e.to_string()))?
}
