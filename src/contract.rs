//! Record type contracts
//!
//! A contract binds a type name to the validator for its records and to the
//! migrations that move its records between schema versions.

use crate::error::{RegistryError, ValidationError};
use crate::migration::{MigrationSequence, RecordMigration};
use crate::record::{Record, ScopeKey};
use crate::validate::{ObjectValidator, RecordValidator, Validator};

/// Validator and migrations for one record type
#[derive(Debug)]
pub struct RecordTypeContract {
    type_name: String,
    validator: RecordValidator,
    migrations: MigrationSequence<Record>,
}

impl RecordTypeContract {
    pub fn builder(type_name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            type_name: type_name.into(),
            props: None,
            id_prefix: true,
            migrations: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn validator(&self) -> &RecordValidator {
        &self.validator
    }

    pub fn migrations(&self) -> &MigrationSequence<Record> {
        &self.migrations
    }

    pub fn current_version(&self) -> u32 {
        self.migrations.current_version()
    }

    /// Check a record against the current version of this type
    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        self.validator.check(record)
    }
}

/// Assembles a [`RecordTypeContract`], checking it is well formed
pub struct ContractBuilder {
    type_name: String,
    props: Option<ObjectValidator>,
    id_prefix: bool,
    migrations: Vec<RecordMigration>,
}

impl ContractBuilder {
    /// Validator for the property bag at the current version
    pub fn props(mut self, props: ObjectValidator) -> Self {
        self.props = Some(props);
        self
    }

    /// Accept any non-empty id instead of `<type>:<suffix>`
    pub fn free_form_ids(mut self) -> Self {
        self.id_prefix = false;
        self
    }

    /// Append the next migration; ids must run 1, 2, ... in order
    pub fn migration(mut self, migration: RecordMigration) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn build(self) -> Result<RecordTypeContract, RegistryError> {
        check_type_name(&self.type_name)?;

        let props = self.props.ok_or_else(|| RegistryError::MalformedValidator {
            type_name: self.type_name.clone(),
            reason: "no props validator declared".to_string(),
        })?;

        let mut validator = RecordValidator::new(self.type_name.clone(), props);
        if self.id_prefix {
            validator = validator.require_id_prefix();
        }
        validator
            .well_formed()
            .map_err(|reason| RegistryError::MalformedValidator {
                type_name: self.type_name.clone(),
                reason,
            })?;

        let migrations =
            MigrationSequence::new(ScopeKey::record_type(self.type_name.clone()), self.migrations)?;

        Ok(RecordTypeContract {
            type_name: self.type_name,
            validator,
            migrations,
        })
    }
}

fn check_type_name(type_name: &str) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidTypeName {
        type_name: type_name.to_string(),
        reason: reason.to_string(),
    };

    if type_name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if !type_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid("only ASCII letters, digits and '_' are allowed"));
    }
    Ok(())
}
