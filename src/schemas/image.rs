//! The `image` shape record

use serde_json::{json, Value};

use crate::contract::RecordTypeContract;
use crate::error::RegistryError;
use crate::migration::Migration;
use crate::record::Record;
use crate::validate::{
    nullable, object, positive_number, string, unit_interval, ObjectValidator, UnknownKeys,
};

pub const TYPE_NAME: &str = "image";

fn point() -> ObjectValidator {
    object()
        .field("x", unit_interval())
        .field("y", unit_interval())
}

pub fn contract(unknown_props: UnknownKeys) -> Result<RecordTypeContract, RegistryError> {
    RecordTypeContract::builder(TYPE_NAME)
        .props(
            object()
                .field("opacity", unit_interval())
                .field("w", positive_number())
                .field("h", positive_number())
                .field("assetId", nullable(string().prefixed("asset:")))
                .field("url", string())
                .field(
                    "crop",
                    nullable(
                        object()
                            .field("topLeft", point())
                            .field("bottomRight", point()),
                    ),
                )
                .unknown_keys(unknown_props),
        )
        .migration(
            Migration::new(
                1,
                "add url",
                |r: Record| Ok(r.with_prop("url", json!(""))),
                |r: Record| Ok(r.without_prop("url")),
            )
            .lossy_down("drops the image url"),
        )
        .migration(
            Migration::new(
                2,
                "add crop",
                |r: Record| Ok(r.with_prop("crop", Value::Null)),
                |r: Record| Ok(r.without_prop("crop")),
            )
            .lossy_down("drops the crop rectangle"),
        )
        .build()
}
