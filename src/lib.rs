//! pokespider - fetch Pokémon records from PokeAPI into a relational table.
//!
//! IDs in a configured range are fetched one at a time with bounded retries,
//! reduced to a small [`models::Record`] and upserted by URL, so re-runs update
//! rather than duplicate rows.

pub mod cli;
pub mod config;
pub mod extract;
pub mod models;
pub mod repository;
pub mod schema;
pub mod spider;

pub use config::{load_settings, Config, ConfigError, Settings};
pub use models::{Outcome, Record, StoredRow, Summary};
pub use repository::{connect_store, PokemonStore, StoreError};
pub use spider::{Fetcher, HttpClient, Ingestor, RunReport};
