//! Working-container lifecycle.
//!
//! `opx init` renames the flat masters drop into the run's timestamped
//! container and `opx intake` adds the bundle staging directory inside
//! it. Every later stage addresses the tree through the two names
//! recorded in the run state, so this module also owns the lookups and
//! the file-move primitive those stages share.

use crate::config::ProjectConfig;
use crate::state::{self, RunState, StateError};
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("masters directory {} not found", .0.display())]
    MastersMissing(PathBuf),
    #[error("container directory {} not found", .0.display())]
    ContainerMissing(PathBuf),
    #[error("bundle staging directory {} not found", .0.display())]
    StagingMissing(PathBuf),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Initialize a run: write the state record and rename the masters
/// drop to `container_<ts>`. Returns the container name.
///
/// # Errors
///
/// Returns `MastersMissing` when the drop directory is absent and
/// `State(AlreadyInitialized)` when a run record already exists.
pub fn create_container(
    cfg: &ProjectConfig,
    now: DateTime<Local>,
) -> Result<String, ContainerError> {
    let masters = cfg.masters_path();
    if !masters.is_dir() {
        return Err(ContainerError::MastersMissing(masters));
    }
    let started_at = state::run_timestamp(now);
    let mut run = RunState::init(&cfg.root, started_at.clone())?;
    let container_id = state::container_name(&started_at);
    fs::rename(&masters, cfg.root.join(&container_id))?;
    run.mark_container(&cfg.root, container_id.clone())?;
    info!(container = %container_id, "masters drop renamed to working container");
    Ok(container_id)
}

/// Create `bundles_<ts>` inside the container and record it. Returns
/// the staging name.
///
/// # Errors
///
/// Returns state errors for a missing/duplicate record and `Io` when
/// the directory cannot be created.
pub fn create_staging(cfg: &ProjectConfig) -> Result<String, ContainerError> {
    let mut run = RunState::load(&cfg.root)?;
    let container = container_path(cfg, &run)?;
    if let Some(existing) = &run.bundle_staging_id {
        return Err(ContainerError::State(StateError::FieldAlreadySet {
            field: "bundle_staging_id",
            value: existing.clone(),
        }));
    }
    let staging_id = state::staging_name(&run.started_at);
    fs::create_dir(container.join(&staging_id))?;
    run.mark_bundle_staging(&cfg.root, staging_id.clone())?;
    info!(staging = %staging_id, "bundle staging directory created");
    Ok(staging_id)
}

/// Absolute path of the run's container directory.
///
/// # Errors
///
/// Returns `State(MissingPriorField)` before `init` has recorded the
/// container and `ContainerMissing` when the directory is gone.
pub fn container_path(cfg: &ProjectConfig, run: &RunState) -> Result<PathBuf, ContainerError> {
    let path = cfg.root.join(run.require_container()?);
    if !path.is_dir() {
        return Err(ContainerError::ContainerMissing(path));
    }
    Ok(path)
}

/// Absolute path of the run's bundle staging directory.
///
/// # Errors
///
/// Returns `State(MissingPriorField)` before `intake` has recorded the
/// staging directory and `StagingMissing` when it is gone.
pub fn staging_path(cfg: &ProjectConfig, run: &RunState) -> Result<PathBuf, ContainerError> {
    let path = container_path(cfg, run)?.join(run.require_bundle_staging()?);
    if !path.is_dir() {
        return Err(ContainerError::StagingMissing(path));
    }
    Ok(path)
}

/// Immediate subdirectories of the container, lexically sorted, with
/// `exclude` (the staging directory, when it still exists) skipped.
/// Per-asset stages iterate over exactly this list.
///
/// # Errors
///
/// Returns an error when the container cannot be read.
pub fn asset_dirs(container: &Path, exclude: Option<&str>) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(container)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if exclude.is_some_and(|name| entry.file_name() == name) {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}

/// File name of `path` as an owned string, empty when it has none.
pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Move a file, copying when the rename crosses a filesystem boundary.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug)]
pub struct CleanBundlesReport {
    pub staging_id: String,
    pub crosswalk_removed: bool,
}

/// Delete the bundle staging subtree and the identifier crosswalk once
/// merge has consumed them.
///
/// # Errors
///
/// Returns lookup errors for a missing record or directory and `Io`
/// when deletion fails.
pub fn remove_staging(
    cfg: &ProjectConfig,
    run: &RunState,
) -> Result<CleanBundlesReport, ContainerError> {
    let staging = staging_path(cfg, run)?;
    fs::remove_dir_all(&staging)?;

    let crosswalk = cfg.access_ids_path();
    let crosswalk_removed = match fs::remove_file(&crosswalk) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => return Err(ContainerError::Io(err)),
    };

    info!(staging = %staging.display(), crosswalk_removed, "bundle phase cleaned up");
    Ok(CleanBundlesReport {
        staging_id: run.require_bundle_staging()?.to_string(),
        crosswalk_removed,
    })
}
