//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `offload_core` linkage (`offload_cli`).
//! - Open a store and print the startup tag migration summary
//!   (`offload_cli <db_path> [attachments_dir]`).
//! - Keep output deterministic for quick local sanity checks.

use offload_core::{AttachmentStore, CoreConfig, OffloadCore};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("offload_core ping={}", offload_core::ping());
    println!("offload_core version={}", offload_core::core_version());

    let mut args = std::env::args_os().skip(1);
    let Some(db_path) = args.next().map(PathBuf::from) else {
        return ExitCode::SUCCESS;
    };
    let attachments_dir = args.next().map(PathBuf::from).unwrap_or_else(|| {
        let base = db_path.parent().map(PathBuf::from).unwrap_or_default();
        AttachmentStore::default_root(&base)
    });

    let config = CoreConfig {
        db_path: Some(db_path),
        attachments_dir,
        log: None,
    };
    let core = match OffloadCore::open(&config) {
        Ok(core) => core,
        Err(err) => {
            eprintln!("offload_core open=error error={err}");
            return ExitCode::FAILURE;
        }
    };

    match core.tag_migration_outcome() {
        Ok(stats) => {
            println!(
                "tag_migration status=ok tags_scanned={} duplicate_tags_merged={} items_scanned={} item_tag_links_added={} did_save={}",
                stats.tags_scanned,
                stats.duplicate_tags_merged,
                stats.items_scanned,
                stats.item_tag_links_added,
                stats.did_save
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("tag_migration status=error error={err}");
            ExitCode::FAILURE
        }
    }
}
