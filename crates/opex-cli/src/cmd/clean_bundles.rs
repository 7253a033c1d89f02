use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::container;
use std::path::Path;

/// Execute `opx clean-bundles`.
///
/// # Errors
///
/// Returns an error when the run state is missing or the staging
/// subtree cannot be deleted.
pub fn run_clean_bundles(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;

    let report = container::remove_staging(&stage.cfg, &stage.run)?;

    if report.crosswalk_removed {
        println!(
            "✓ Deleted {}/ and {}.",
            report.staging_id, stage.cfg.access_ids_file
        );
    } else {
        println!("✓ Deleted {}/.", report.staging_id);
    }
    Ok(())
}
