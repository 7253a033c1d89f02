//! Stage runners for the `opx` subcommands.
//!
//! Each runner is thin: load config, take the project lock, load the
//! run state, call into `opex_core`, and print a one-line summary with
//! the stage's counts. Per-item detail goes to `tracing`.

pub mod clean;
pub mod clean_bundles;
pub mod completions;
pub mod crosswalk;
pub mod extract;
pub mod group;
pub mod init;
pub mod intake;
pub mod merge;
pub mod opex;
pub mod package;
pub mod process;
pub mod report;
pub mod status;
pub mod validate;

use anyhow::{Context as _, Result};
use opex_core::config::ProjectConfig;
use opex_core::lock::{LOCK_TIMEOUT, RunLock};
use opex_core::state::RunState;
use std::path::Path;

/// Config, run state, and project lock shared by every mutating stage.
/// The lock is held until the runner returns.
pub(crate) struct Stage {
    pub cfg: ProjectConfig,
    pub run: RunState,
    _lock: RunLock,
}

pub(crate) fn open_stage(project_root: &Path) -> Result<Stage> {
    let cfg = ProjectConfig::load(project_root)?;
    let lock = RunLock::acquire(project_root, LOCK_TIMEOUT)
        .context("another opx stage holds the project lock")?;
    let run = RunState::load(project_root)?;
    Ok(Stage {
        cfg,
        run,
        _lock: lock,
    })
}
