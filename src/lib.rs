//! Document Schemas
//!
//! Schema validation and migration engine for a collaborative document store.
//! Every record type declares a contract (a structural validator plus an
//! ordered list of migrations) and the engine moves whole snapshots between
//! version vectors so old data can be loaded and newer data can be sent to
//! older peers.
//!
//! ## Features
//!
//! - **Composable Validators**: Typed checks with precise `$.props.x[2]` error paths
//! - **Record Contracts**: One validator and one migration sequence per type
//! - **Store Migrations**: Cross-type changes such as type renames and removals
//! - **Bidirectional Migration**: Upgrade on load, downgrade for older peers
//! - **Lossy Step Reporting**: Downgrades that discard data are surfaced, not hidden
//!
//! ## Architecture
//!
//! ```text
//! Snapshot { records, versions }
//!     │
//!     ├── store sequence      (runs first on upgrade, last on downgrade)
//!     │
//!     └── per-type partitions
//!         ├── document  ── RecordTypeContract { validator, migrations }
//!         ├── page      ── ...
//!         └── video     ── ...
//! ```

pub mod checksum;
pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod migration;
pub mod record;
pub mod registry;
pub mod schemas;
pub mod validate;

pub use checksum::Checksum;
pub use config::EngineConfig;
pub use contract::RecordTypeContract;
pub use engine::{MigrationOutcome, Migrator};
pub use error::{Error, MigrationError, RegistryError, Result, ValidationError};
pub use ingest::{IngestOutcome, Ingestor};
pub use migration::{Migration, MigrationReport, RecordMigration, StoreMigration, StoreState};
pub use record::{Record, ScopeKey, Snapshot, VersionVector};
pub use registry::ContractRegistry;
pub use validate::{Validator, ValidatorExt};
