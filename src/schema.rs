// Manually written to match repository::diesel_pokemon::CREATE_TABLE_SQL.
// PRIMARY KEY columns are not nullable.

diesel::table! {
    pokeapi (id) {
        id -> Integer,
        name -> Nullable<Text>,
        url -> Text,
        status -> Nullable<Integer>,
        body -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}
