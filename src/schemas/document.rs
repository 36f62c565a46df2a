//! The `document` record: one per document, holding document-wide settings.
//!
//! Older stores called this type `doc`; the store migration renames it.

use serde_json::json;

use crate::contract::RecordTypeContract;
use crate::error::RegistryError;
use crate::migration::Migration;
use crate::record::Record;
use crate::validate::{object, positive_number, string, UnknownKeys};

pub const TYPE_NAME: &str = "document";

pub fn contract(unknown_props: UnknownKeys) -> Result<RecordTypeContract, RegistryError> {
    RecordTypeContract::builder(TYPE_NAME)
        .props(
            object()
                .field("name", string())
                .field("gridSize", positive_number())
                .field("meta", object().allow_unknown_keys())
                .unknown_keys(unknown_props),
        )
        .free_form_ids()
        .migration(
            Migration::new(
                1,
                "add meta",
                |r: Record| Ok(r.with_prop("meta", json!({}))),
                |r: Record| Ok(r.without_prop("meta")),
            )
            .lossy_down("drops document meta"),
        )
        .build()
}
