//! Domain models for ingested Pokémon data.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spider::http_client::FetchError;

/// Status recorded when every attempt for a URL failed at the transport level.
pub const STATUS_EXHAUSTED: i32 = -1;

/// A `{ "name": ... }` reference to another API resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: Option<String>,
}

impl NamedResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Reduced representation of an upstream payload, stored as the row body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub pokemon_id: Option<i64>,
    pub pokemon_name: Option<String>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub abilities: Vec<NamedResource>,
    pub types: Vec<NamedResource>,
    pub species: Option<NamedResource>,
}

/// Terminal result of processing a single ID.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 200 with a usable payload.
    Stored(Record),
    /// 200 whose body was not valid JSON, or was empty.
    EmptyBody,
    /// Any non-200 HTTP status. Never retried.
    HttpStatus(u16),
    /// Every attempt failed without an HTTP response.
    Exhausted { attempts: u32 },
}

impl Outcome {
    /// Status code persisted for this outcome.
    pub fn status(&self) -> i32 {
        match self {
            Outcome::Stored(_) | Outcome::EmptyBody => 200,
            Outcome::HttpStatus(code) => i32::from(*code),
            Outcome::Exhausted { .. } => STATUS_EXHAUSTED,
        }
    }

    /// Build the row write for `url`.
    pub fn to_upsert(&self, url: &str) -> RowUpsert {
        match self {
            Outcome::Stored(record) => RowUpsert {
                name: record.pokemon_name.clone(),
                url: url.to_string(),
                status: self.status(),
                body: Some(record.clone()),
            },
            _ => RowUpsert {
                name: None,
                url: url.to_string(),
                status: self.status(),
                body: None,
            },
        }
    }
}

/// Result of one fetch attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The attempt produced a terminal outcome; stop retrying.
    Classified(Outcome),
    /// No HTTP response was obtained.
    Transport(FetchError),
}

/// Values written by an upsert keyed on `url`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpsert {
    pub name: Option<String>,
    pub url: String,
    pub status: i32,
    pub body: Option<Record>,
}

/// A row as persisted in the `pokeapi` table.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRow {
    pub id: i32,
    pub name: Option<String>,
    pub url: String,
    pub status: Option<i32>,
    pub body: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregate counts over the whole table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: i64,
    pub null_status: i64,
    pub status_200: i64,
    pub non_200: i64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Summary ===")?;
        writeln!(f, "Total rows in pokeapi table: {}", self.total)?;
        writeln!(f, "Rows with status NULL: {}", self.null_status)?;
        writeln!(f, "Rows with status=200: {}", self.status_200)?;
        write!(f, "Rows with status!=200: {}", self.non_200)
    }
}
