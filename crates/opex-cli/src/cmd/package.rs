use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, pax};
use std::path::Path;

/// Execute `opx package`.
///
/// # Errors
///
/// Returns an error when the run state, container, or staging id is
/// missing or the container cannot be listed.
pub fn run_package(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;
    let staging_id = stage.run.require_bundle_staging()?;

    let staged = pax::stage_assets(&container, staging_id)?;
    let archived = pax::archive_assets(&container, staging_id)?;

    println!(
        "✓ Staged {} assets and built {} PAX archives ({} skipped, {} failed).",
        staged.staged,
        archived.archived,
        staged.skipped + archived.skipped,
        staged.failed + archived.failed
    );
    Ok(())
}
