use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::container;
use std::path::Path;

/// Execute `opx intake`.
///
/// # Errors
///
/// Returns an error when the run state or container is missing or the
/// staging directory was already created.
pub fn run_intake(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;

    let staging_id = container::create_staging(&stage.cfg)?;

    println!("✓ Created bundle staging directory {staging_id}/.");
    println!();
    println!("Drop the zipped access bundles into it, then run `opx extract`.");
    Ok(())
}
