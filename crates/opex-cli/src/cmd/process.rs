use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{bundle, container};
use std::path::Path;

/// Execute `opx process`.
///
/// # Errors
///
/// Returns an error when the run state or staging directory is missing
/// or the error log cannot be read.
pub fn run_process(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let staging = container::staging_path(&stage.cfg, &stage.run)?;

    let report = bundle::process_bundles(&stage.cfg, project_root, &staging)?;

    println!(
        "✓ Processed {} bundles ({} skipped as invalid, {} failed, {} noise files removed).",
        report.processed, report.skipped_invalid, report.failed, report.noise_removed
    );
    Ok(())
}
