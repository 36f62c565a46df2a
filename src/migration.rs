//! Migration sequences and version path resolution
//!
//! Every scope (one record type, or the whole store) owns a dense sequence of
//! migrations numbered `1..=N`. A value at version `v` reaches target `t` by
//! running `up` for `v+1..=t` or `down` for `v` down to `t+1`.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::error::{Direction, MigrationError, RegistryError};
use crate::record::{Record, ScopeKey, VersionVector};

/// Failure reported by a single `up`/`down` step.
///
/// Steps are required to be total over well-formed input, so this is always
/// turned into a [`MigrationError::MigrationDefinitionFault`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StepError(pub String);

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn missing_prop(key: &str) -> Self {
        Self(format!("missing property {:?}", key))
    }
}

/// Whole-document state seen by store-level migrations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreState {
    pub records: Vec<Record>,
    pub versions: VersionVector,
}

/// Whether running a migration and its inverse reproduces the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reversibility {
    Exact,
    /// Running the step in `direction` discards data that the opposite
    /// direction cannot reconstruct
    Lossy { direction: Direction, note: String },
}

type Transform<T> = Box<dyn Fn(T) -> Result<T, StepError> + Send + Sync>;

/// One versioned, reversible transform
pub struct Migration<T> {
    sequence_id: u32,
    name: String,
    up: Transform<T>,
    down: Transform<T>,
    reversibility: Reversibility,
}

/// A migration over a single record
pub type RecordMigration = Migration<Record>;

/// A migration over the whole document
pub type StoreMigration = Migration<StoreState>;

impl<T> Migration<T> {
    pub fn new<U, D>(sequence_id: u32, name: impl Into<String>, up: U, down: D) -> Self
    where
        U: Fn(T) -> Result<T, StepError> + Send + Sync + 'static,
        D: Fn(T) -> Result<T, StepError> + Send + Sync + 'static,
    {
        Self {
            sequence_id,
            name: name.into(),
            up: Box::new(up),
            down: Box::new(down),
            reversibility: Reversibility::Exact,
        }
    }

    /// Mark `down` as discarding data (typical for additive migrations)
    pub fn lossy_down(mut self, note: impl Into<String>) -> Self {
        self.reversibility = Reversibility::Lossy {
            direction: Direction::Down,
            note: note.into(),
        };
        self
    }

    /// Mark `up` as discarding data (typical for removals)
    pub fn lossy_up(mut self, note: impl Into<String>) -> Self {
        self.reversibility = Reversibility::Lossy {
            direction: Direction::Up,
            note: note.into(),
        };
        self
    }

    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reversibility(&self) -> &Reversibility {
        &self.reversibility
    }

    /// Lossy note for running this step in `direction`, if it loses data
    pub fn loss_in(&self, direction: Direction) -> Option<&str> {
        match &self.reversibility {
            Reversibility::Lossy { direction: d, note } if *d == direction => Some(note),
            _ => None,
        }
    }

    pub fn run(&self, direction: Direction, input: T) -> Result<T, StepError> {
        match direction {
            Direction::Up => (self.up)(input),
            Direction::Down => (self.down)(input),
        }
    }
}

impl<T> fmt::Debug for Migration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("sequence_id", &self.sequence_id)
            .field("name", &self.name)
            .field("reversibility", &self.reversibility)
            .finish()
    }
}

/// The ordered steps needed to move one scope between two versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPath {
    pub scope: ScopeKey,
    pub from: u32,
    pub to: u32,
}

impl MigrationPath {
    pub fn direction(&self) -> Option<Direction> {
        match self.to.cmp(&self.from) {
            std::cmp::Ordering::Greater => Some(Direction::Up),
            std::cmp::Ordering::Less => Some(Direction::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn len(&self) -> usize {
        self.from.abs_diff(self.to) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Sequence ids in application order: ascending for up, descending for down
    pub fn sequence_ids(&self) -> Vec<u32> {
        match self.direction() {
            Some(Direction::Up) => (self.from + 1..=self.to).collect(),
            Some(Direction::Down) => (self.to + 1..=self.from).rev().collect(),
            None => Vec::new(),
        }
    }
}

/// A lossy step that was applied in its lossy direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossyStep {
    pub scope: ScopeKey,
    pub sequence_id: u32,
    pub direction: Direction,
    pub note: String,
}

/// What a migration run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Resolved path per scope that actually moved
    pub paths: BTreeMap<ScopeKey, MigrationPath>,
    /// Lossy steps that ran, in application order
    pub lossy_steps: Vec<LossyStep>,
}

impl MigrationReport {
    /// Number of distinct migration steps applied across all scopes
    pub fn total_steps(&self) -> usize {
        self.paths.values().map(MigrationPath::len).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn is_lossy(&self) -> bool {
        !self.lossy_steps.is_empty()
    }

    pub(crate) fn record_path<T>(&mut self, sequence: &MigrationSequence<T>, path: &MigrationPath) {
        if path.is_empty() {
            return;
        }
        if let Some(direction) = path.direction() {
            for id in path.sequence_ids() {
                if let Some(note) = sequence.step(id).and_then(|m| m.loss_in(direction)) {
                    self.lossy_steps.push(LossyStep {
                        scope: path.scope.clone(),
                        sequence_id: id,
                        direction,
                        note: note.to_string(),
                    });
                }
            }
        }
        self.paths.insert(path.scope.clone(), path.clone());
    }

    /// Note a scope whose version entry moved without any data to migrate
    pub(crate) fn record_version_move(&mut self, path: &MigrationPath) {
        if !path.is_empty() {
            self.paths.insert(path.scope.clone(), path.clone());
        }
    }
}

/// Dense, ordered migrations for one scope
pub struct MigrationSequence<T> {
    scope: ScopeKey,
    steps: Vec<Migration<T>>,
}

impl<T> MigrationSequence<T> {
    /// A scope with no migrations; its current version is 0
    pub fn empty(scope: ScopeKey) -> Self {
        Self {
            scope,
            steps: Vec::new(),
        }
    }

    /// Build a sequence, checking ids run `1, 2, ..., N` with no gaps
    pub fn new(scope: ScopeKey, steps: Vec<Migration<T>>) -> Result<Self, RegistryError> {
        for (index, step) in steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.sequence_id != expected {
                return Err(RegistryError::InvalidSequence {
                    scope,
                    reason: format!(
                        "expected sequence id {} at position {}, found {} ({})",
                        expected, index, step.sequence_id, step.name
                    ),
                });
            }
        }
        Ok(Self { scope, steps })
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn current_version(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn step(&self, sequence_id: u32) -> Option<&Migration<T>> {
        let index = sequence_id.checked_sub(1)? as usize;
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Migration<T>] {
        &self.steps
    }

    /// Reject a version this sequence does not know
    pub fn check_known(&self, version: u32) -> Result<(), MigrationError> {
        let max_known = self.current_version();
        if version > max_known {
            return Err(MigrationError::UnsupportedFutureVersion {
                scope: self.scope.clone(),
                found: version,
                max_known,
            });
        }
        Ok(())
    }

    /// Resolve the path from `from` to `to` without running anything
    pub fn plan(&self, from: u32, to: u32) -> Result<MigrationPath, MigrationError> {
        self.check_known(from)?;
        self.check_known(to)?;
        Ok(MigrationPath {
            scope: self.scope.clone(),
            from,
            to,
        })
    }

    /// Run every step of `path` over `input`, each consuming the previous output
    pub fn apply(&self, path: &MigrationPath, input: T) -> Result<T, MigrationError> {
        self.apply_checked(path, input, |_| Ok(()))
    }

    /// Like [`apply`](Self::apply), but runs `check` on the output of every
    /// step. A rejected output is reported against the step that produced it.
    pub fn apply_checked<C>(&self, path: &MigrationPath, input: T, check: C) -> Result<T, MigrationError>
    where
        C: Fn(&T) -> Result<(), String>,
    {
        let Some(direction) = path.direction() else {
            return Ok(input);
        };

        let mut value = input;
        for id in path.sequence_ids() {
            let migration = self.step(id).ok_or_else(|| MigrationError::MigrationDefinitionFault {
                scope: self.scope.clone(),
                sequence_id: id,
                direction,
                reason: "no migration registered for this sequence id".to_string(),
            })?;
            debug!(scope = %self.scope, sequence_id = id, %direction, name = %migration.name, "applying migration step");
            let fault = |reason: String| MigrationError::MigrationDefinitionFault {
                scope: self.scope.clone(),
                sequence_id: id,
                direction,
                reason,
            };
            value = migration
                .run(direction, value)
                .map_err(|e| fault(e.to_string()))?;
            check(&value).map_err(fault)?;
        }
        Ok(value)
    }
}

impl<T> fmt::Debug for MigrationSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSequence")
            .field("scope", &self.scope)
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn counter_sequence() -> MigrationSequence<Record> {
        let step = |id: u32| {
            let key = format!("v{}", id);
            let down_key = key.clone();
            Migration::new(
                id,
                format!("add {}", key),
                move |r: Record| Ok(r.with_prop(key.clone(), json!(true))),
                move |r: Record| Ok(r.without_prop(&down_key)),
            )
        };
        MigrationSequence::new(ScopeKey::record_type("box"), vec![step(1), step(2), step(3)]).unwrap()
    }

    #[test]
    fn test_rejects_gaps_and_misordering() {
        let noop = |id| Migration::<Record>::new(id, "noop", Ok, Ok);
        let scope = ScopeKey::record_type("box");

        assert!(MigrationSequence::new(scope.clone(), vec![noop(1), noop(3)]).is_err());
        assert!(MigrationSequence::new(scope.clone(), vec![noop(2), noop(1)]).is_err());
        assert!(MigrationSequence::new(scope.clone(), vec![noop(2)]).is_err());
        assert!(MigrationSequence::new(scope, vec![noop(1), noop(2)]).is_ok());
    }

    #[test]
    fn test_path_order_and_length() {
        let seq = counter_sequence();
        let up = seq.plan(0, 3).unwrap();
        assert_eq!(up.sequence_ids(), vec![1, 2, 3]);
        assert_eq!(up.len(), 3);

        let down = seq.plan(3, 1).unwrap();
        assert_eq!(down.sequence_ids(), vec![3, 2]);
        assert_eq!(down.direction(), Some(Direction::Down));

        let same = seq.plan(2, 2).unwrap();
        assert!(same.is_empty());
        assert!(same.sequence_ids().is_empty());
    }

    #[test]
    fn test_future_versions_rejected() {
        let seq = counter_sequence();
        let err = seq.plan(5, 3).unwrap_err();
        assert_eq!(
            err,
            MigrationError::UnsupportedFutureVersion {
                scope: ScopeKey::record_type("box"),
                found: 5,
                max_known: 3,
            }
        );
        assert!(seq.plan(0, 4).is_err());
    }

    #[test]
    fn test_apply_is_monotonic() {
        let seq = counter_sequence();
        let record = Record::new("box:1", "box", json!({"v1": true}));

        let path = seq.plan(1, 3).unwrap();
        let upgraded = seq.apply(&path, record.clone()).unwrap();
        assert_eq!(upgraded.props.len(), 3);

        let back = seq.apply(&seq.plan(3, 1).unwrap(), upgraded).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_failing_step_is_definition_fault() {
        let seq = MigrationSequence::new(
            ScopeKey::record_type("box"),
            vec![Migration::new(
                1,
                "require size",
                |r: Record| match r.prop("size") {
                    Some(Value::Number(_)) => Ok(r),
                    _ => Err(StepError::missing_prop("size")),
                },
                Ok,
            )],
        )
        .unwrap();

        let err = seq
            .apply(&seq.plan(0, 1).unwrap(), Record::new("box:1", "box", json!({})))
            .unwrap_err();
        assert!(err.is_definition_fault());
    }

    #[test]
    fn test_checked_apply_blames_offending_step() {
        let seq = counter_sequence();
        let err = seq
            .apply_checked(
                &seq.plan(0, 3).unwrap(),
                Record::new("box:1", "box", json!({})),
                |r| match r.prop("v2") {
                    Some(_) => Err("v2 is not allowed".to_string()),
                    None => Ok(()),
                },
            )
            .unwrap_err();

        match err {
            MigrationError::MigrationDefinitionFault {
                sequence_id,
                direction,
                reason,
                ..
            } => {
                assert_eq!(sequence_id, 2);
                assert_eq!(direction, Direction::Up);
                assert_eq!(reason, "v2 is not allowed");
            }
            other => panic!("Expected definition fault, got {:?}", other),
        }
    }

    #[test]
    fn test_report_collects_lossy_steps() {
        let seq = MigrationSequence::new(
            ScopeKey::record_type("box"),
            vec![
                Migration::<Record>::new(1, "exact", Ok, Ok),
                Migration::<Record>::new(2, "add label", Ok, Ok).lossy_down("drops label"),
            ],
        )
        .unwrap();

        let mut report = MigrationReport::default();
        report.record_path(&seq, &seq.plan(2, 0).unwrap());
        assert_eq!(report.total_steps(), 2);
        assert_eq!(report.lossy_steps.len(), 1);
        assert_eq!(report.lossy_steps[0].sequence_id, 2);

        let mut report = MigrationReport::default();
        report.record_path(&seq, &seq.plan(0, 2).unwrap());
        assert!(!report.is_lossy());
    }
}
