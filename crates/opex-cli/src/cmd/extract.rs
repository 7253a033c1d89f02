use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{bag, container};
use std::path::Path;

/// Execute `opx extract`.
///
/// # Errors
///
/// Returns an error when the run state or staging directory is missing
/// or the staging directory cannot be listed.
pub fn run_extract(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let staging = container::staging_path(&stage.cfg, &stage.run)?;

    let report = bag::extract_bundles(&staging)?;

    println!(
        "✓ Extracted {} bundle archives ({} failed).",
        report.extracted, report.failed
    );
    Ok(())
}
