//! Diesel ORM models for the `pokeapi` table.

use diesel::prelude::*;

use crate::schema;

/// Row of the `pokeapi` table.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::pokeapi)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PokemonRowRecord {
    pub id: i32,
    pub name: Option<String>,
    pub url: String,
    pub status: Option<i32>,
    pub body: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// New row for insertion. `created_at` is only used when the URL is new.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::pokeapi)]
pub struct NewPokemonRow<'a> {
    pub name: Option<&'a str>,
    pub url: &'a str,
    pub status: Option<i32>,
    pub body: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: Option<&'a str>,
}
