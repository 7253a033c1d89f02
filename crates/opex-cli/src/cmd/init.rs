use anyhow::{Context as _, Result};
use chrono::Local;
use opex_core::config::ProjectConfig;
use opex_core::container;
use opex_core::lock::{LOCK_TIMEOUT, RunLock};
use std::path::Path;

/// Execute `opx init`. Adopts the flat preservation-masters directory
/// as this run's container:
///
/// ```text
/// preservation_masters/   ->   container_<started_at>/
/// run_state.json               (new, records started_at + container)
/// ```
///
/// # Errors
///
/// Returns an error when the masters directory is missing, a run state
/// already exists, or the lock cannot be taken.
pub fn run_init(project_root: &Path) -> Result<()> {
    let cfg = ProjectConfig::load(project_root)?;
    let _lock = RunLock::acquire(project_root, LOCK_TIMEOUT)
        .context("another opx stage holds the project lock")?;

    let container_id = container::create_container(&cfg, Local::now())?;

    println!("✓ Adopted {}/ as {container_id}/.", cfg.masters_dir);
    println!();
    println!("Next steps:");
    println!("  opx group     # wrap loose masters into asset directories");
    println!("  opx intake    # create the bundle staging directory");
    Ok(())
}
