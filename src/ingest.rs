//! Load and sync-receive pipeline
//!
//! Migrates an incoming snapshot, validates the result and applies the
//! caller's [`IngestConfig`] policy to records the engine cannot accept. The
//! engine itself never drops records; dropping is decided here.

use std::collections::BTreeSet;

use tracing::warn;

use crate::config::{EngineConfig, IngestConfig, RecordPolicy};
use crate::engine::{MigrationOutcome, Migrator};
use crate::error::MigrationError;
use crate::migration::MigrationReport;
use crate::record::{Snapshot, VersionVector};
use crate::registry::ContractRegistry;

/// Why a record was left out of an ingested snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecord {
    pub record_id: String,
    pub type_name: String,
    pub reason: MigrationError,
}

/// An accepted snapshot and what was done to get there
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub snapshot: Snapshot,
    pub report: MigrationReport,
    pub dropped: Vec<DroppedRecord>,
}

/// Migrate-then-validate with a drop/fail policy
#[derive(Debug, Clone, Copy)]
pub struct Ingestor<'r> {
    migrator: Migrator<'r>,
    policy: IngestConfig,
    validate: bool,
}

impl<'r> Ingestor<'r> {
    pub fn new(registry: &'r ContractRegistry, policy: IngestConfig) -> Self {
        Self {
            migrator: Migrator::new(registry),
            policy,
            validate: true,
        }
    }

    pub fn from_config(registry: &'r ContractRegistry, config: &EngineConfig) -> Self {
        Self::new(registry, config.ingest).with_validation(config.validation.validate_after_migrate)
    }

    /// Skip post-migration validation when `validate` is false
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Bring `snapshot` to the current versions and keep only valid records
    pub fn ingest(&self, snapshot: &Snapshot) -> Result<IngestOutcome, MigrationError> {
        self.ingest_to(snapshot, &self.migrator.registry().current_versions())
    }

    /// Bring `snapshot` to `target` and keep only valid records
    pub fn ingest_to(
        &self,
        snapshot: &Snapshot,
        target: &VersionVector,
    ) -> Result<IngestOutcome, MigrationError> {
        let mut dropped = Vec::new();
        let mut input = snapshot.clone();
        let mut removed_types = BTreeSet::new();

        // Unknown types can only be detected after store migrations have had
        // a chance to rename them, so retry without each one the engine reports.
        let outcome = loop {
            match self.migrator.migrate_with_report(&input, target) {
                Ok(outcome) => break outcome,
                Err(MigrationError::UnknownRecordType { type_name })
                    if self.policy.unknown_types == RecordPolicy::Drop
                        && removed_types.insert(type_name.clone()) =>
                {
                    let reason = MigrationError::UnknownRecordType {
                        type_name: type_name.clone(),
                    };
                    for record in input.records.iter().filter(|r| r.type_name == type_name) {
                        warn!(record_id = %record.id, %type_name, "dropping record of unknown type");
                        dropped.push(DroppedRecord {
                            record_id: record.id.clone(),
                            type_name: type_name.clone(),
                            reason: reason.clone(),
                        });
                    }
                    input = input.without_type(&type_name);
                }
                Err(err) => return Err(err),
            }
        };

        let MigrationOutcome { snapshot: mut migrated, report } = outcome;
        if !self.validate {
            return Ok(IngestOutcome {
                snapshot: migrated,
                report,
                dropped,
            });
        }
        let registry = self.migrator.registry();

        let mut kept = Vec::with_capacity(migrated.records.len());
        for record in migrated.records {
            match registry.validate_record(&record) {
                Ok(()) => kept.push(record),
                Err(err) if self.policy.invalid_records == RecordPolicy::Drop => {
                    warn!(record_id = %record.id, type_name = %record.type_name, error = %err, "dropping invalid record");
                    dropped.push(DroppedRecord {
                        record_id: record.id,
                        type_name: record.type_name,
                        reason: err,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        migrated.records = kept;

        Ok(IngestOutcome {
            snapshot: migrated,
            report,
            dropped,
        })
    }
}
