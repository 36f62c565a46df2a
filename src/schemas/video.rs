//! The `video` shape record
//!
//! | version | change                         |
//! |---------|--------------------------------|
//! | 0       | initial shape                  |
//! | 1       | `url` added, defaults to `""`  |
//! | 2       | `autoplay` added, defaults on  |

use serde_json::json;

use crate::contract::RecordTypeContract;
use crate::error::RegistryError;
use crate::migration::Migration;
use crate::record::Record;
use crate::validate::{
    boolean, non_negative_number, nullable, object, positive_number, string, unit_interval,
    UnknownKeys,
};

pub const TYPE_NAME: &str = "video";

pub fn contract(unknown_props: UnknownKeys) -> Result<RecordTypeContract, RegistryError> {
    RecordTypeContract::builder(TYPE_NAME)
        .props(
            object()
                .field("opacity", unit_interval())
                .field("w", positive_number())
                .field("h", positive_number())
                .field("time", non_negative_number())
                .field("playing", boolean())
                .field("assetId", nullable(string().prefixed("asset:")))
                .field("url", string())
                .field("autoplay", boolean())
                .unknown_keys(unknown_props),
        )
        .migration(
            Migration::new(
                1,
                "add url",
                |r: Record| Ok(r.with_prop("url", json!(""))),
                |r: Record| Ok(r.without_prop("url")),
            )
            .lossy_down("drops the video url"),
        )
        .migration(
            Migration::new(
                2,
                "add autoplay",
                |r: Record| Ok(r.with_prop("autoplay", json!(true))),
                |r: Record| Ok(r.without_prop("autoplay")),
            )
            .lossy_down("drops the autoplay flag"),
        )
        .build()
}
