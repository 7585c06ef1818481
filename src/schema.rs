// Wishlist schema - record tables for Diesel ORM
//
// Every table is keyed by a caller-supplied uuid string. List-valued fields
// (feature tags, application repository ids and links) are stored as JSON
// text columns.

diesel::table! {
    features (id) {
        id -> Text,
        title -> Text,
        description -> Text,
        tags_json -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    tags (id) {
        id -> Text,
        name -> Text,
        color -> Text,
    }
}

diesel::table! {
    repositories (id) {
        id -> Text,
        name -> Text,
        owner -> Text,
        url -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    applications (id) {
        id -> Text,
        name -> Text,
        repository_ids_json -> Text,
        // Added in schema v4. NULL only on rows the backfill has not touched;
        // model code treats NULL as an empty list.
        links_json -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
