// Mirrors the record table maintained by the .bit indexer; this service only reads it.

diesel::table! {
    t_record_info (id) {
        id -> Int8,
        account -> Text,
        key -> Text,
        value -> Text,
    }
}
