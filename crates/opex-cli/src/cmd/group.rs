use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, group};
use std::path::Path;

/// Execute `opx group`.
///
/// # Errors
///
/// Returns an error when the run state or container is missing, the
/// container is not flat, or a group directory already exists.
pub fn run_group(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;

    let report = group::group_masters(&container)?;

    println!(
        "✓ Grouped {} master files into {} asset directories.",
        report.files_moved, report.groups_created
    );
    Ok(())
}
