//! Row decoding helpers.

use serde::de::DeserializeOwned;

use crate::{Row, StoreError, StoreResult};

pub(crate) fn decode_row<T: DeserializeOwned>(entity_type: &'static str, row: Row) -> StoreResult<T> {
    serde_json::from_value(row).map_err(|source| StoreError::Decode {
        entity_type,
        source,
    })
}

pub(crate) fn decode_rows<T: DeserializeOwned>(
    entity_type: &'static str,
    rows: Vec<Row>,
) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| decode_row(entity_type, row))
        .collect()
}
