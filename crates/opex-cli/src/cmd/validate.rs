use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::errorlog::ERROR_LOG_FILE;
use opex_core::{bag, container};
use std::path::Path;

/// Execute `opx validate`.
///
/// # Errors
///
/// Returns an error when the run state or staging directory is missing
/// or the error log cannot be written.
pub fn run_validate(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let staging = container::staging_path(&stage.cfg, &stage.run)?;

    let report = bag::validate_bundles(project_root, &staging)?;

    println!(
        "✓ Validated {} bundles: {} valid, {} logged to {ERROR_LOG_FILE}.",
        report.checked,
        report.valid,
        report.failures.len()
    );
    Ok(())
}
