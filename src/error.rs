//! Error types for validation, migration and registration

use std::fmt;

use thiserror::Error;

use crate::record::ScopeKey;

/// Result type for crate-level operations (CLI, config, file handling)
pub type Result<T> = std::result::Result<T, Error>;

/// One step in the path to an offending value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a value inside the record being validated.
///
/// Renders as `$` for the root, `$.props.crop[0]` for nested values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Prepend a segment; errors bubble up from leaves so parents add theirs last.
    pub fn prepend(&mut self, segment: PathSegment) {
        self.0.insert(0, segment);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A value did not match its contract
#[derive(Error, Debug, Clone, PartialEq)]
#[error("at `{path}`: expected {expected}, got {found}")]
pub struct ValidationError {
    /// Where the mismatch happened
    pub path: FieldPath,
    /// Human-readable expectation (e.g. "a number > 0")
    pub expected: String,
    /// Short description of the offending value
    pub found: String,
    /// Per-branch failures when a union rejected the value
    pub branches: Vec<ValidationError>,
}

impl ValidationError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            path: FieldPath::root(),
            expected: expected.into(),
            found: found.into(),
            branches: Vec::new(),
        }
    }

    /// Attach the branch failures of a rejected union
    pub fn with_branches(mut self, branches: Vec<ValidationError>) -> Self {
        self.branches = branches;
        self
    }

    /// Re-root the error under an object key
    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.path.prepend(PathSegment::Key(key.into()));
        self
    }

    /// Re-root the error under an array index
    pub fn at_index(mut self, index: usize) -> Self {
        self.path.prepend(PathSegment::Index(index));
        self
    }
}

/// Direction a migration step runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Failures returned by the migration engine and the contract lookups
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    #[error("Unknown record type: {type_name}")]
    UnknownRecordType { type_name: String },

    #[error("Unsupported future version for {scope}: found {found}, running code supports up to {max_known}")]
    UnsupportedFutureVersion {
        scope: ScopeKey,
        found: u32,
        max_known: u32,
    },

    #[error("Migration definition fault in {scope} step {sequence_id} ({direction}): {reason}")]
    MigrationDefinitionFault {
        scope: ScopeKey,
        sequence_id: u32,
        direction: Direction,
        reason: String,
    },

    #[error("Record {record_id} ({type_name}) failed validation: {source}")]
    Validation {
        record_id: String,
        type_name: String,
        source: ValidationError,
    },
}

impl MigrationError {
    /// Whether this is a programmer error in a migration definition
    pub fn is_definition_fault(&self) -> bool {
        matches!(self, MigrationError::MigrationDefinitionFault { .. })
    }
}

/// Startup-time registration failures. These are programmer errors and are
/// expected to abort process initialization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Record type already registered: {type_name}")]
    DuplicateType { type_name: String },

    #[error("Store migration sequence already registered")]
    DuplicateStoreSequence,

    #[error("A contract registry has already been installed for this process")]
    AlreadyInstalled,

    #[error("Invalid record type name {type_name:?}: {reason}")]
    InvalidTypeName { type_name: String, reason: String },

    #[error("Invalid migration sequence for {scope}: {reason}")]
    InvalidSequence { scope: ScopeKey, reason: String },

    #[error("Malformed validator for {type_name}: {reason}")]
    MalformedValidator { type_name: String, reason: String },
}

/// Crate-level errors surfaced to binaries and the config layer
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}
