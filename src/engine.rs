//! Migration engine
//!
//! Moves a whole [`Snapshot`] from the versions recorded in its
//! [`VersionVector`] to a target vector. The store scope runs first when it is
//! upgraded and last when it is downgraded; each record type partition then
//! follows its own sequence independently of its siblings.
//!
//! A run either succeeds completely or returns an error; the input snapshot is
//! only ever borrowed, so a failure leaves the caller's data untouched.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Direction, MigrationError};
use crate::migration::{MigrationPath, MigrationReport, StoreState};
use crate::record::{partition_by_type, ScopeKey, Snapshot, VersionVector};
use crate::registry::ContractRegistry;

/// A migrated snapshot together with what was done to it
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub snapshot: Snapshot,
    pub report: MigrationReport,
}

/// Runs migrations against the contracts of one registry
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'r> {
    registry: &'r ContractRegistry,
}

impl<'r> Migrator<'r> {
    pub fn new(registry: &'r ContractRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r ContractRegistry {
        self.registry
    }

    /// Migrate to `target`, returning a new snapshot
    pub fn migrate(&self, snapshot: &Snapshot, target: &VersionVector) -> Result<Snapshot, MigrationError> {
        self.migrate_with_report(snapshot, target)
            .map(|outcome| outcome.snapshot)
    }

    /// Upgrade to the versions the running code expects (load time)
    pub fn migrate_to_current(&self, snapshot: &Snapshot) -> Result<Snapshot, MigrationError> {
        self.migrate(snapshot, &self.registry.current_versions())
    }

    /// Downgrade before sending to a peer that advertised `peer` versions.
    ///
    /// Scopes where the peer is ahead of us stay at our current version; the
    /// newer peer can upgrade them itself.
    pub fn downgrade_for_peer(
        &self,
        snapshot: &Snapshot,
        peer: &VersionVector,
    ) -> Result<MigrationOutcome, MigrationError> {
        let target = self.peer_target(peer);
        self.migrate_with_report(snapshot, &target)
    }

    /// Migrate `slot` in place. The `Arc` is only replaced when at least one
    /// step ran; on failure or a no-op it still points at the original.
    pub fn migrate_in_place(
        &self,
        slot: &mut Arc<Snapshot>,
        target: &VersionVector,
    ) -> Result<MigrationReport, MigrationError> {
        let outcome = self.migrate_with_report(slot, target)?;
        if !outcome.report.is_noop() {
            *slot = Arc::new(outcome.snapshot);
        }
        Ok(outcome.report)
    }

    /// Migrate to `target` and report which steps ran
    pub fn migrate_with_report(
        &self,
        snapshot: &Snapshot,
        target: &VersionVector,
    ) -> Result<MigrationOutcome, MigrationError> {
        self.check_supported(&snapshot.versions)?;
        self.check_supported(target)?;

        let mut report = MigrationReport::default();
        let store = self.registry.store_migrations();
        let store_path = store.plan(snapshot.versions.store, target.store)?;

        let mut state = StoreState {
            records: snapshot.records.clone(),
            versions: snapshot.versions.clone(),
        };

        // Per-type targets must use the names in force while partitions run.
        // When the store is going down those are newer than the caller's.
        let type_targets = match store_path.direction() {
            Some(Direction::Up) => {
                state = self.run_store(&store_path, state, &mut report)?;
                target.clone()
            }
            Some(Direction::Down) => self.rename_forward(target, snapshot.versions.store)?,
            None => target.clone(),
        };

        self.migrate_partitions(&mut state, &type_targets, &mut report)?;

        if store_path.direction() == Some(Direction::Down) {
            state = self.run_store(&store_path, state, &mut report)?;
        }

        if report.is_noop() {
            debug!(records = snapshot.len(), "snapshot already at target versions");
        } else {
            info!(
                records = state.records.len(),
                steps = report.total_steps(),
                lossy = report.lossy_steps.len(),
                "snapshot migrated"
            );
        }

        Ok(MigrationOutcome {
            snapshot: Snapshot::new(state.records, state.versions),
            report,
        })
    }

    fn run_store(
        &self,
        path: &MigrationPath,
        state: StoreState,
        report: &mut MigrationReport,
    ) -> Result<StoreState, MigrationError> {
        let store = self.registry.store_migrations();
        let mut state = store.apply(path, state)?;
        state.versions.store = path.to;
        report.record_path(store, path);
        Ok(state)
    }

    /// Migrate each record type partition from its recorded version to its target
    fn migrate_partitions(
        &self,
        state: &mut StoreState,
        target: &VersionVector,
        report: &mut MigrationReport,
    ) -> Result<(), MigrationError> {
        let partitions: Vec<(String, Vec<usize>)> = partition_by_type(&state.records)
            .into_iter()
            .map(|(type_name, indices)| (type_name.to_string(), indices))
            .collect();

        for (type_name, indices) in &partitions {
            let contract = self.registry.lookup(type_name)?;
            let sequence = contract.migrations();
            let path = sequence.plan(
                state.versions.type_version(type_name),
                target.type_version(type_name),
            )?;
            if path.is_empty() {
                continue;
            }

            for &index in indices {
                let record = state.records[index].clone();
                let (id, original_type) = (record.id.clone(), record.type_name.clone());
                let migrated = sequence.apply_checked(&path, record, |r| {
                    if r.id == id && r.type_name == original_type {
                        Ok(())
                    } else {
                        Err(format!(
                            "record {} ({}) came back as {} ({}); only store migrations may change identity",
                            id, original_type, r.id, r.type_name
                        ))
                    }
                })?;
                state.records[index] = migrated;
            }
            report.record_path(sequence, &path);
            state
                .versions
                .set(ScopeKey::record_type(type_name.clone()), path.to);
        }

        // Types with no records still move to their target so the vector
        // never claims a version the data was not migrated from.
        let idle: Vec<String> = state
            .versions
            .records
            .keys()
            .filter(|name| !partitions.iter().any(|(type_name, _)| type_name == *name))
            .cloned()
            .collect();
        for type_name in idle {
            let Ok(contract) = self.registry.lookup(&type_name) else {
                continue;
            };
            let path = contract.migrations().plan(
                state.versions.type_version(&type_name),
                target.type_version(&type_name),
            )?;
            if !path.is_empty() {
                report.record_version_move(&path);
                state.versions.set(ScopeKey::record_type(type_name), path.to);
            }
        }
        Ok(())
    }

    /// Reject vectors naming versions newer than the registered sequences.
    ///
    /// Entries are checked under the type names of the current store version,
    /// so a legacy name is caught before any store step sees a record. Types
    /// without a contract are skipped; unknown records are reported per
    /// partition.
    fn check_supported(&self, versions: &VersionVector) -> Result<(), MigrationError> {
        let store = self.registry.store_migrations();
        store.check_known(versions.store)?;

        let renamed = self.rename_forward(versions, store.current_version())?;
        for (scope, found) in renamed.entries() {
            if let Some(max_known) = self.registry.max_known(&scope) {
                if found > max_known {
                    return Err(MigrationError::UnsupportedFutureVersion {
                        scope,
                        found,
                        max_known,
                    });
                }
            }
        }
        Ok(())
    }

    /// Express the type entries of `versions` in the names used at store
    /// version `to_store`, by running store `up` steps over an empty state.
    /// Vectors already at or past `to_store` are returned unchanged.
    fn rename_forward(
        &self,
        versions: &VersionVector,
        to_store: u32,
    ) -> Result<VersionVector, MigrationError> {
        let store = self.registry.store_migrations();
        let path = store.plan(versions.store, to_store)?;
        if path.direction() != Some(Direction::Up) {
            return Ok(versions.clone());
        }
        let empty = StoreState {
            records: Vec::new(),
            versions: versions.clone(),
        };
        Ok(store.apply(&path, empty)?.versions)
    }

    fn peer_target(&self, peer: &VersionVector) -> VersionVector {
        let mut target = peer.clone();
        target.store = peer.store.min(self.registry.store_migrations().current_version());
        for (type_name, version) in target.records.iter_mut() {
            if let Ok(contract) = self.registry.lookup(type_name) {
                *version = (*version).min(contract.current_version());
            }
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::RecordTypeContract;
    use crate::migration::{Migration, StepError};
    use crate::record::Record;
    use crate::validate::{number, object, string};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> ContractRegistry {
        let shape = RecordTypeContract::builder("shape")
            .props(
                object()
                    .field("w", number())
                    .field("label", string())
                    .field("rotation", number()),
            )
            .migration(
                Migration::new(
                    1,
                    "add label",
                    |r: Record| Ok(r.with_prop("label", json!(""))),
                    |r: Record| Ok(r.without_prop("label")),
                )
                .lossy_down("drops label"),
            )
            .migration(Migration::new(
                2,
                "add rotation",
                |r: Record| Ok(r.with_prop("rotation", json!(0))),
                |r: Record| Ok(r.without_prop("rotation")),
            ))
            .build()
            .unwrap();

        let broken = RecordTypeContract::builder("broken")
            .props(object())
            .migration(Migration::new(
                1,
                "always fails",
                |_: Record| Err(StepError::new("boom")),
                Ok,
            ))
            .build()
            .unwrap();

        let mut builder = ContractRegistry::builder();
        builder.register(shape).unwrap();
        builder.register(broken).unwrap();
        builder
            .store_migrations(vec![Migration::new(
                1,
                "rename box to shape",
                |mut s: StoreState| {
                    s.records = s
                        .records
                        .into_iter()
                        .map(|r| if r.type_name == "box" { r.retyped("shape") } else { r })
                        .collect();
                    if let Some(v) = s.versions.remove_type("box") {
                        s.versions.set(ScopeKey::record_type("shape"), v);
                    }
                    Ok(s)
                },
                |mut s: StoreState| {
                    s.records = s
                        .records
                        .into_iter()
                        .map(|r| if r.type_name == "shape" { r.retyped("box") } else { r })
                        .collect();
                    if let Some(v) = s.versions.remove_type("shape") {
                        s.versions.set(ScopeKey::record_type("box"), v);
                    }
                    Ok(s)
                },
            )])
            .unwrap();
        builder.build()
    }

    fn shape_v0() -> Snapshot {
        Snapshot::new(
            vec![Record::new("shape:1", "shape", json!({"w": 10}))],
            VersionVector::new(1).with_type("shape", 0),
        )
    }

    #[test]
    fn test_upgrade_to_current() {
        let registry = registry();
        let migrator = Migrator::new(&registry);

        let outcome = migrator
            .migrate_with_report(&shape_v0(), &registry.current_versions())
            .unwrap();
        let record = &outcome.snapshot.records[0];
        assert_eq!(record.prop("label"), Some(&json!("")));
        assert_eq!(record.prop("rotation"), Some(&json!(0)));
        assert_eq!(outcome.snapshot.versions.type_version("shape"), 2);
        assert_eq!(outcome.report.total_steps(), 2);
        assert!(registry.validate_snapshot(&outcome.snapshot).is_ok());
    }

    #[test]
    fn test_noop_is_identity() {
        let registry = registry();
        let migrator = Migrator::new(&registry);
        let snapshot = shape_v0();

        let outcome = migrator
            .migrate_with_report(&snapshot, &snapshot.versions)
            .unwrap();
        assert_eq!(outcome.snapshot, snapshot);
        assert!(outcome.report.is_noop());
    }

    #[test]
    fn test_store_runs_before_types_on_upgrade_and_after_on_downgrade() {
        let registry = registry();
        let migrator = Migrator::new(&registry);
        let legacy = Snapshot::new(
            vec![Record::new("shape:1", "box", json!({"w": 3, "label": ""}))],
            VersionVector::new(0).with_type("box", 1),
        );

        let upgraded = migrator.migrate_to_current(&legacy).unwrap();
        assert_eq!(upgraded.records[0].type_name, "shape");
        assert_eq!(upgraded.versions, VersionVector::new(1).with_type("shape", 2));

        let restored = migrator.migrate(&upgraded, &legacy.versions).unwrap();
        assert_eq!(restored, legacy);
    }

    #[test]
    fn test_failure_leaves_input_untouched() {
        let registry = registry();
        let migrator = Migrator::new(&registry);
        let original = Arc::new(Snapshot::new(
            vec![
                Record::new("shape:1", "shape", json!({"w": 1})),
                Record::new("broken:1", "broken", json!({})),
            ],
            VersionVector::new(1),
        ));

        let mut slot = Arc::clone(&original);
        let err = migrator
            .migrate_in_place(&mut slot, &registry.current_versions())
            .unwrap_err();
        assert!(err.is_definition_fault());
        assert!(Arc::ptr_eq(&slot, &original));
    }

    #[test]
    fn test_unknown_type_fails() {
        let registry = registry();
        let migrator = Migrator::new(&registry);
        let snapshot = Snapshot::new(
            vec![Record::new("arrow:1", "arrow", json!({}))],
            VersionVector::new(1),
        );
        assert_eq!(
            migrator.migrate_to_current(&snapshot).unwrap_err(),
            MigrationError::UnknownRecordType {
                type_name: "arrow".to_string()
            }
        );
    }

    #[test]
    fn test_peer_target_caps_at_current() {
        let registry = registry();
        let migrator = Migrator::new(&registry);
        let current = migrator.migrate_to_current(&shape_v0()).unwrap();

        let peer = VersionVector::new(7).with_type("shape", 1);
        let outcome = migrator.downgrade_for_peer(&current, &peer).unwrap();
        assert_eq!(outcome.snapshot.versions.store, 1);
        assert_eq!(outcome.snapshot.versions.type_version("shape"), 1);
        assert!(outcome.snapshot.records[0].prop("rotation").is_none());
        assert!(!outcome.report.is_lossy());
    }

    #[test]
    fn test_entries_without_records_follow_the_target() {
        let registry = registry();
        let migrator = Migrator::new(&registry);
        let empty = Snapshot::new(Vec::new(), VersionVector::new(1).with_type("shape", 0));

        let outcome = migrator
            .migrate_with_report(&empty, &registry.current_versions())
            .unwrap();
        assert_eq!(outcome.snapshot.versions.type_version("shape"), 2);
        assert!(!outcome.report.is_noop());
        assert!(outcome.snapshot.versions.records.get("broken").is_none());

        let peer = VersionVector::new(1).with_type("shape", 1);
        let outcome = migrator.downgrade_for_peer(&outcome.snapshot, &peer).unwrap();
        assert_eq!(outcome.snapshot.versions.type_version("shape"), 1);
        assert!(!outcome.report.is_lossy());

        let again = migrator
            .migrate_with_report(&outcome.snapshot, &peer)
            .unwrap();
        assert!(again.report.is_noop());
        assert_eq!(again.snapshot, outcome.snapshot);
    }

    #[test]
    fn test_legacy_entry_checked_before_store_steps_run() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let shape = RecordTypeContract::builder("shape")
            .props(object().field("w", number()))
            .migration(Migration::new(1, "noop", Ok, Ok))
            .migration(Migration::new(2, "noop", Ok, Ok))
            .build()
            .unwrap();
        let mut builder = ContractRegistry::builder();
        builder.register(shape).unwrap();
        builder
            .store_migrations(vec![Migration::new(
                1,
                "rename box to shape",
                move |mut s: StoreState| {
                    counter.fetch_add(s.records.len(), Ordering::SeqCst);
                    if let Some(v) = s.versions.remove_type("box") {
                        s.versions.set(ScopeKey::record_type("shape"), v);
                    }
                    Ok(s)
                },
                Ok,
            )])
            .unwrap();
        let registry = builder.build();
        let migrator = Migrator::new(&registry);

        let legacy = Snapshot::new(
            vec![Record::new("shape:1", "box", json!({"w": 1}))],
            VersionVector::new(0).with_type("box", 5),
        );
        assert_eq!(
            migrator.migrate_to_current(&legacy).unwrap_err(),
            MigrationError::UnsupportedFutureVersion {
                scope: ScopeKey::record_type("shape"),
                found: 5,
                max_known: 2,
            }
        );
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_identity_change_blames_the_step_that_made_it() {
        let shape = RecordTypeContract::builder("shape")
            .props(object().field("w", number()))
            .migration(Migration::new(1, "noop", Ok, Ok))
            .migration(Migration::new(
                2,
                "rewrite id",
                |mut r: Record| {
                    r.id = format!("{}-copy", r.id);
                    Ok(r)
                },
                Ok,
            ))
            .migration(Migration::new(3, "noop", Ok, Ok))
            .build()
            .unwrap();
        let mut builder = ContractRegistry::builder();
        builder.register(shape).unwrap();
        let registry = builder.build();
        let migrator = Migrator::new(&registry);

        let snapshot = Snapshot::new(
            vec![Record::new("shape:1", "shape", json!({"w": 1}))],
            VersionVector::new(0).with_type("shape", 0),
        );
        match migrator.migrate_to_current(&snapshot).unwrap_err() {
            MigrationError::MigrationDefinitionFault {
                scope,
                sequence_id,
                direction,
                ..
            } => {
                assert_eq!(scope, ScopeKey::record_type("shape"));
                assert_eq!(sequence_id, 2);
                assert_eq!(direction, Direction::Up);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
