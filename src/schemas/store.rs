//! Store-level migrations
//!
//! 1. Remove `code` records, a type that no longer exists.
//! 2. Rename the `doc` type to `document`, carrying its version entry along.

use crate::migration::{Migration, StepError, StoreMigration, StoreState};
use super::document;
use crate::record::ScopeKey;

/// Type removed by store version 1
pub const LEGACY_CODE_TYPE: &str = "code";

/// Name of the document type before store version 2
pub const LEGACY_DOCUMENT_TYPE: &str = "doc";

pub fn migrations() -> Vec<StoreMigration> {
    vec![
        Migration::new(1, "remove code records", remove_code, Ok)
            .lossy_up("code records are discarded and cannot be restored"),
        Migration::new(
            2,
            "rename doc to document",
            |state: StoreState| Ok(rename_type(state, LEGACY_DOCUMENT_TYPE, document::TYPE_NAME)),
            |state: StoreState| Ok(rename_type(state, document::TYPE_NAME, LEGACY_DOCUMENT_TYPE)),
        ),
    ]
}

fn remove_code(mut state: StoreState) -> Result<StoreState, StepError> {
    state.records.retain(|r| r.type_name != LEGACY_CODE_TYPE);
    state.versions.remove_type(LEGACY_CODE_TYPE);
    Ok(state)
}

fn rename_type(mut state: StoreState, from: &str, to: &str) -> StoreState {
    state.records = state
        .records
        .into_iter()
        .map(|r| if r.type_name == from { r.retyped(to) } else { r })
        .collect();
    if let Some(version) = state.versions.remove_type(from) {
        state.versions.set(ScopeKey::record_type(to), version);
    }
    state
}
