//! Classification of 200 responses and reduction of payloads into [`Record`]s.

use serde_json::Value;

use crate::models::{NamedResource, Outcome, Record};

/// Classify the body of a 200 response.
///
/// Invalid JSON and empty payloads are merged into [`Outcome::EmptyBody`].
pub fn classify_body(body: &str) -> Outcome {
    match serde_json::from_str::<Value>(body) {
        Ok(payload) if is_truthy(&payload) && payload.is_object() => {
            Outcome::Stored(extract_record(&payload))
        }
        _ => Outcome::EmptyBody,
    }
}

/// Whether a JSON value counts as a non-empty payload.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Extract the fields we keep from a Pokémon payload.
///
/// Missing or mistyped fields resolve to `None` or an empty list.
pub fn extract_record(payload: &Value) -> Record {
    let species = payload
        .get("species")
        .filter(|s| is_truthy(s))
        .map(|s| NamedResource {
            name: s.get("name").and_then(Value::as_str).map(str::to_string),
        });

    Record {
        pokemon_id: payload.get("id").and_then(Value::as_i64),
        pokemon_name: payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        height: payload.get("height").and_then(Value::as_i64),
        weight: payload.get("weight").and_then(Value::as_i64),
        abilities: nested_names(payload, "abilities", "ability"),
        types: nested_names(payload, "types", "type"),
        species,
    }
}

/// Collect `list[*].inner.name`, skipping entries without a name.
fn nested_names(payload: &Value, list: &str, inner: &str) -> Vec<NamedResource> {
    payload
        .get(list)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get(inner)?.get("name")?.as_str())
                .map(NamedResource::new)
                .collect()
        })
        .unwrap_or_default()
}
