//! Representation merger.
//!
//! Two passes over the container. The first wraps every asset's loose
//! preservation files into `Representation_Preservation/<stem>/` and
//! adds an empty `Representation_Access`. The second runs only once
//! the first has finished everywhere: using the identifier crosswalk,
//! it folds each matching bundle into its asset, descriptive `*.xml`
//! at the asset root and everything else under
//! `Representation_Access/<stem>/`. A representation directory that
//! already exists means a partial earlier run, which stops the stage
//! before any files move.

use crate::container::{asset_dirs, dir_name, move_file};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const REP_PRESERVATION: &str = "Representation_Preservation";
pub const REP_ACCESS: &str = "Representation_Access";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{} already exists; this stage appears to have already run", .0.display())]
    RepresentationExists(PathBuf),
    #[error("{} is missing; run the preservation pass first", .0.display())]
    RepresentationMissing(PathBuf),
    #[error("unexpected directory {} inside an asset", .0.display())]
    UnexpectedDirectory(PathBuf),
    #[error("access bundle {} not found", .0.display())]
    BundleMissing(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct RepresentationReport {
    pub assets: usize,
    pub files_moved: usize,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub assets_merged: usize,
    pub files_moved: usize,
    pub unmatched_assets: usize,
    pub failed_assets: usize,
}

/// First pass: give every asset directory its two representation
/// roots, moving each preservation file into a sub-container named by
/// its stem.
///
/// # Errors
///
/// Returns `RepresentationExists` when either root is already present,
/// `UnexpectedDirectory` when an asset holds a subdirectory, and `Io`
/// for filesystem failures. All abort the stage.
pub fn create_representations(
    container: &Path,
    staging_id: &str,
) -> Result<RepresentationReport, MergeError> {
    let mut report = RepresentationReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        let pres = asset.join(REP_PRESERVATION);
        let access = asset.join(REP_ACCESS);
        if pres.exists() {
            return Err(MergeError::RepresentationExists(pres));
        }
        if access.exists() {
            return Err(MergeError::RepresentationExists(access));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&asset)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                return Err(MergeError::UnexpectedDirectory(entry.path()));
            }
            files.push((entry.file_name(), entry.path()));
        }
        files.sort();

        fs::create_dir(&pres)?;
        for (name, path) in &files {
            let stem = Path::new(name).file_stem().unwrap_or(name.as_os_str());
            let slot = pres.join(stem);
            fs::create_dir_all(&slot)?;
            move_file(path, &slot.join(name))?;
            report.files_moved += 1;
        }
        fs::create_dir(&access)?;
        report.assets += 1;
        debug!(asset = %dir_name(&asset), files = files.len(), "representations created");
    }

    info!(
        assets = report.assets,
        files = report.files_moved,
        "preservation representations created"
    );
    Ok(report)
}

/// Second pass: fold each crosswalked bundle into the asset directory
/// named by its identifier.
///
/// # Errors
///
/// Returns `RepresentationMissing` when a matched asset has no access
/// root, which means the first pass never ran there. Per-asset merge
/// failures are counted and the pass continues.
pub fn merge_access(
    container: &Path,
    staging_id: &str,
    crosswalk: &BTreeMap<String, PathBuf>,
) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        let name = dir_name(&asset);
        let Some(bundle) = crosswalk.get(&name) else {
            debug!(asset = %name, "no access bundle for asset");
            report.unmatched_assets += 1;
            continue;
        };
        let access = asset.join(REP_ACCESS);
        if !access.is_dir() {
            return Err(MergeError::RepresentationMissing(access));
        }
        match merge_bundle(&asset, &access, bundle) {
            Ok(moved) => {
                debug!(asset = %name, files = moved, "access bundle merged");
                report.assets_merged += 1;
                report.files_moved += moved;
            }
            Err(err) => {
                warn!(asset = %name, error = %err, "access merge failed");
                report.failed_assets += 1;
            }
        }
    }

    info!(
        merged = report.assets_merged,
        files = report.files_moved,
        unmatched = report.unmatched_assets,
        failed = report.failed_assets,
        "access content merged"
    );
    Ok(report)
}

fn merge_bundle(asset: &Path, access: &Path, bundle: &Path) -> Result<usize, MergeError> {
    if !bundle.is_dir() {
        return Err(MergeError::BundleMissing(bundle.to_path_buf()));
    }

    let mut entries: Vec<(OsString, PathBuf)> = Vec::new();
    for entry in fs::read_dir(bundle)? {
        let entry = entry?;
        entries.push((entry.file_name(), entry.path()));
    }
    entries.sort();

    let mut moved = 0;
    for (name, path) in &entries {
        let name_path = Path::new(name);
        let is_xml = name_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        let target = if is_xml {
            asset.join(name)
        } else {
            let stem = name_path.file_stem().unwrap_or(name.as_os_str());
            let slot = access.join(stem);
            fs::create_dir_all(&slot)?;
            slot.join(name)
        };
        if path.is_dir() {
            fs::rename(path, &target)?;
        } else {
            move_file(path, &target)?;
        }
        moved += 1;
    }
    Ok(moved)
}
