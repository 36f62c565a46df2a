//! Built-in record types
//!
//! The document model shipped with the engine: one contract per record type
//! plus the store-level migrations. Feature modules register these once at
//! startup through [`default_registry`] or [`registry_with`].

pub mod document;
pub mod image;
pub mod page;
pub mod store;
pub mod video;

use crate::error::RegistryError;
use crate::registry::ContractRegistry;
use crate::validate::UnknownKeys;

/// Registry with every built-in type, rejecting undeclared props
pub fn default_registry() -> Result<ContractRegistry, RegistryError> {
    registry_with(UnknownKeys::Reject)
}

/// Registry with every built-in type, using `unknown_props` for prop bags
pub fn registry_with(unknown_props: UnknownKeys) -> Result<ContractRegistry, RegistryError> {
    let mut builder = ContractRegistry::builder();
    builder.register(document::contract(unknown_props)?)?;
    builder.register(page::contract(unknown_props)?)?;
    builder.register(video::contract(unknown_props)?)?;
    builder.register(image::contract(unknown_props)?)?;
    builder.store_migrations(store::migrations())?;
    Ok(builder.build())
}
