use diesel::prelude::*;

/// One key/value field of an account record.
///
/// `id` is assigned by the store, strictly increasing in insertion order, and is used only
/// for ordering and watermarking.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = super::schema::t_record_info)]
pub struct RecordInfo {
    pub id: i64,
    pub account: String,
    pub key: String,
    pub value: String,
}
