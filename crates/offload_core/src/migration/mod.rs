//! Data migrations run at startup, after schema migrations.
//!
//! # Invariants
//! - Every data migration is idempotent; re-running on the next launch is
//!   the retry mechanism after a failure.

pub mod tag_migration;

pub use tag_migration::{run_tag_migration, TagMigrationError, TagMigrationStats};
