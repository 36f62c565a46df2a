//! Contract Registry
//!
//! Maps record type names to their contracts and holds the store-level
//! migration sequence. A registry is assembled once at startup through
//! [`ContractRegistryBuilder`] and is read-only afterwards, so it can be shared
//! between threads without locking.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::info;

use crate::contract::RecordTypeContract;
use crate::error::{MigrationError, RegistryError, ValidationError};
use crate::migration::{MigrationSequence, StoreMigration, StoreState};
use crate::record::{Record, ScopeKey, Snapshot, VersionVector};

static GLOBAL: OnceLock<ContractRegistry> = OnceLock::new();

/// Install the process-wide registry. May only happen once.
pub fn install(registry: ContractRegistry) -> Result<&'static ContractRegistry, RegistryError> {
    GLOBAL
        .set(registry)
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    let installed = GLOBAL.get().ok_or(RegistryError::AlreadyInstalled)?;
    info!(
        types = installed.contracts.len(),
        store_version = installed.store.current_version(),
        "contract registry installed"
    );
    Ok(installed)
}

/// The process-wide registry, if [`install`] has run
pub fn global() -> Option<&'static ContractRegistry> {
    GLOBAL.get()
}

/// Read-only table of record type contracts
#[derive(Debug)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, RecordTypeContract>,
    store: MigrationSequence<StoreState>,
}

impl ContractRegistry {
    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder {
            contracts: BTreeMap::new(),
            store: None,
        }
    }

    /// Look up the contract for a type
    pub fn lookup(&self, type_name: &str) -> Result<&RecordTypeContract, MigrationError> {
        self.contracts
            .get(type_name)
            .ok_or_else(|| MigrationError::UnknownRecordType {
                type_name: type_name.to_string(),
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.contracts.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &RecordTypeContract> {
        self.contracts.values()
    }

    pub fn store_migrations(&self) -> &MigrationSequence<StoreState> {
        &self.store
    }

    /// Versions the running code expects: every scope at its latest migration
    pub fn current_versions(&self) -> VersionVector {
        let mut versions = VersionVector::new(self.store.current_version());
        for (name, contract) in &self.contracts {
            versions.set(ScopeKey::record_type(name.clone()), contract.current_version());
        }
        versions
    }

    /// Highest known version for a scope, if the scope is registered
    pub fn max_known(&self, scope: &ScopeKey) -> Option<u32> {
        match scope {
            ScopeKey::Store => Some(self.store.current_version()),
            ScopeKey::RecordType(name) => self.contracts.get(name).map(|c| c.current_version()),
        }
    }

    /// Validate one record against its type's contract
    pub fn validate_record(&self, record: &Record) -> Result<(), MigrationError> {
        let contract = self.lookup(&record.type_name)?;
        contract
            .validate(record)
            .map_err(|source| MigrationError::Validation {
                record_id: record.id.clone(),
                type_name: record.type_name.clone(),
                source,
            })
    }

    /// Validate every record, stopping at the first failure
    pub fn validate_snapshot(&self, snapshot: &Snapshot) -> Result<(), MigrationError> {
        snapshot
            .records
            .iter()
            .try_for_each(|record| self.validate_record(record))
    }

    /// Validate every record, collecting all failures
    pub fn diagnose(&self, snapshot: &Snapshot) -> Vec<RecordDiagnostic> {
        snapshot
            .records
            .iter()
            .filter_map(|record| {
                self.validate_record(record)
                    .err()
                    .map(|error| RecordDiagnostic {
                        record_id: record.id.clone(),
                        type_name: record.type_name.clone(),
                        error,
                    })
            })
            .collect()
    }
}

/// A record that failed lookup or validation
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDiagnostic {
    pub record_id: String,
    pub type_name: String,
    pub error: MigrationError,
}

impl RecordDiagnostic {
    /// The validation mismatch, when the type was known
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.error {
            MigrationError::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Collects contracts during startup
pub struct ContractRegistryBuilder {
    contracts: BTreeMap<String, RecordTypeContract>,
    store: Option<MigrationSequence<StoreState>>,
}

impl ContractRegistryBuilder {
    /// Register a contract. Each type may be registered only once.
    pub fn register(&mut self, contract: RecordTypeContract) -> Result<(), RegistryError> {
        let type_name = contract.type_name().to_string();
        if self.contracts.contains_key(&type_name) {
            return Err(RegistryError::DuplicateType { type_name });
        }
        self.contracts.insert(type_name, contract);
        Ok(())
    }

    /// Chainable form of [`register`](Self::register)
    pub fn with(mut self, contract: RecordTypeContract) -> Result<Self, RegistryError> {
        self.register(contract)?;
        Ok(self)
    }

    /// Set the store-level migrations. May only be set once.
    pub fn store_migrations(&mut self, steps: Vec<StoreMigration>) -> Result<(), RegistryError> {
        if self.store.is_some() {
            return Err(RegistryError::DuplicateStoreSequence);
        }
        self.store = Some(MigrationSequence::new(ScopeKey::Store, steps)?);
        Ok(())
    }

    pub fn build(self) -> ContractRegistry {
        ContractRegistry {
            contracts: self.contracts,
            store: self
                .store
                .unwrap_or_else(|| MigrationSequence::empty(ScopeKey::Store)),
        }
    }
}
