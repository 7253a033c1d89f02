use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, pax};
use std::path::Path;

/// Execute `opx clean`.
///
/// # Errors
///
/// Returns an error when the run state, container, or staging id is
/// missing or a deletion fails.
pub fn run_clean(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;
    let staging_id = stage.run.require_bundle_staging()?;

    let report = pax::clean_assets(&container, staging_id)?;

    println!(
        "✓ Removed {} metadata files and {} leftover directories ({} unexpected entities kept).",
        report.files_removed, report.dirs_removed, report.unexpected
    );
    Ok(())
}
