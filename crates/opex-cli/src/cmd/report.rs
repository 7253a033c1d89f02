use crate::cmd::open_stage;
use anyhow::Result;
use opex_core::{container, reconcile};
use std::path::Path;

/// Execute `opx report`.
///
/// # Errors
///
/// Returns an error when the run state, container, or staging id is
/// missing or the spreadsheet cannot be written.
pub fn run_report(project_root: &Path) -> Result<()> {
    let stage = open_stage(project_root)?;
    let container = container::container_path(&stage.cfg, &stage.run)?;
    let staging_id = stage.run.require_bundle_staging()?;

    let summary = reconcile::build_report(&stage.cfg, &container, staging_id)?;

    println!(
        "✓ Wrote {}: {} matched, {} preservation-only, {} access-only, {} unreadable.",
        stage.cfg.report_file,
        summary.matched,
        summary.pres_only,
        summary.acc_only,
        summary.unreadable
    );
    Ok(())
}
