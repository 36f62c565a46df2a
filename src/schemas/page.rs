//! The `page` record

use serde_json::json;

use crate::contract::RecordTypeContract;
use crate::error::RegistryError;
use crate::migration::Migration;
use crate::record::Record;
use crate::validate::{object, string, UnknownKeys};

pub const TYPE_NAME: &str = "page";

/// Fractional index used to order pages
pub const INDEX_PATTERN: &str = "^a[0-9a-zA-Z]+$";

pub fn contract(unknown_props: UnknownKeys) -> Result<RecordTypeContract, RegistryError> {
    RecordTypeContract::builder(TYPE_NAME)
        .props(
            object()
                .field("name", string().non_empty())
                .field("index", string().matches(INDEX_PATTERN))
                .field("meta", object().allow_unknown_keys())
                .unknown_keys(unknown_props),
        )
        .migration(
            Migration::new(
                1,
                "add meta",
                |r: Record| Ok(r.with_prop("meta", json!({}))),
                |r: Record| Ok(r.without_prop("meta")),
            )
            .lossy_down("drops page meta"),
        )
        .build()
}
