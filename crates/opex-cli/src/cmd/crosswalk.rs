use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, reconcile};
use std::path::Path;

/// Execute `opx crosswalk`.
///
/// # Errors
///
/// Returns an error when the run state or staging directory is
/// missing, two bundles carry the same identifier, or the crosswalk
/// file cannot be written.
pub fn run_crosswalk(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let staging = container::staging_path(&stage.cfg, &stage.run)?;

    let report = reconcile::write_crosswalk(&stage.cfg, project_root, &staging)?;

    println!(
        "✓ Logged {} identifier paths to {} ({} skipped as invalid, {} missing identifiers).",
        report.written, stage.cfg.access_ids_file, report.skipped_invalid, report.missing_identifier
    );
    Ok(())
}
