//! Runners for the three `opx opex` metadata levels.

use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, opex};
use std::path::Path;

/// Execute `opx opex asset`.
///
/// # Errors
///
/// Returns an error when the run state, container, or staging id is
/// missing or a fragment cannot be written.
pub fn run_asset(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;
    let staging_id = stage.run.require_bundle_staging()?;

    let report = opex::write_asset_opex(&stage.cfg, &container, staging_id)?;

    println!(
        "✓ Created {} asset metadata fragments ({} failed).",
        report.written, report.failed
    );
    Ok(())
}

/// Execute `opx opex object`.
///
/// # Errors
///
/// Returns an error when the run state or container is missing or the
/// archival-object crosswalk is absent or malformed.
pub fn run_object(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;
    let staging_id = stage.run.require_bundle_staging()?;

    let report = opex::write_object_opex(&stage.cfg, &container, staging_id)?;

    println!(
        "✓ Resolved {} archival objects ({} renamed, {} failed).",
        report.written, report.renamed, report.failed
    );
    Ok(())
}

/// Execute `opx opex container`.
///
/// # Errors
///
/// Returns an error when the run state or container is missing or the
/// manifest cannot be written.
pub fn run_container(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;

    let target = opex::write_container_opex(&container)?;

    println!("✓ Wrote container manifest {}.", target.display());
    Ok(())
}
