use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, merge, reconcile};
use std::path::Path;

/// Execute `opx merge`.
///
/// # Errors
///
/// Returns an error when the run state, container, or crosswalk file
/// is missing, a representation directory already exists, or an asset
/// holds an unexpected subdirectory.
pub fn run_merge(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;
    let staging_id = stage.run.require_bundle_staging()?;
    let crosswalk = reconcile::load_crosswalk(&stage.cfg.access_ids_path())?;

    let reps = merge::create_representations(&container, staging_id)?;
    let merged = merge::merge_access(&container, staging_id, &crosswalk)?;

    println!(
        "✓ Wrapped {} assets ({} files); merged {} access bundles ({} unmatched, {} failed).",
        reps.assets,
        reps.files_moved,
        merged.assets_merged,
        merged.unmatched_assets,
        merged.failed_assets
    );
    Ok(())
}
