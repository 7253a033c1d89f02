//! Bundle processor.
//!
//! After validation, each surviving bundle is reverted out of its bag
//! shell, stripped of repository-noise files, and has its payload file
//! renamed to `<identifier>.<ext>` using the identifier from the
//! bundle's descriptive record. Bundles named in the error log are
//! skipped; every other failure is isolated to its bundle and counted.

use crate::bag::{self, BagError};
use crate::config::ProjectConfig;
use crate::container::{asset_dirs, dir_name};
use crate::errorlog::ErrorLog;
use crate::xml::{self, XmlError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("no payload file matches the content-role prefixes")]
    MissingPayload,
    #[error("payload target `{0}` already exists")]
    RenameCollision(String),
    #[error(transparent)]
    Bag(#[from] BagError),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct ProcessReport {
    pub processed: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
    pub noise_removed: usize,
}

/// Descriptive record of a bundle: `data/<mods>` while still bagged,
/// `<mods>` at the root once reverted.
#[must_use]
pub fn mods_path(bundle: &Path, mods_filename: &str) -> Option<PathBuf> {
    let bagged = bundle.join("data").join(mods_filename);
    if bagged.is_file() {
        return Some(bagged);
    }
    let reverted = bundle.join(mods_filename);
    reverted.is_file().then_some(reverted)
}

/// Canonical identifier of a bundle, from whichever location its
/// descriptive record currently occupies.
///
/// # Errors
///
/// Returns `FileNotFound` when the record is absent in both locations
/// and `FieldNotFound` when it carries no identifier.
pub fn bundle_identifier(bundle: &Path, mods_filename: &str) -> Result<String, XmlError> {
    let mods = mods_path(bundle, mods_filename).unwrap_or_else(|| bundle.join(mods_filename));
    xml::extract_field(&mods, "identifier")
}

/// Revert, de-noise, and rename the payload of every bundle in the
/// staging directory not named in the error log.
///
/// # Errors
///
/// Returns an error when the error log or staging directory cannot be
/// read; per-bundle failures are isolated into the report.
pub fn process_bundles(
    cfg: &ProjectConfig,
    root: &Path,
    staging: &Path,
) -> Result<ProcessReport, BundleError> {
    let log = ErrorLog::load(root)?;
    let mut report = ProcessReport::default();

    for dir in asset_dirs(staging, None)? {
        let name = dir_name(&dir);
        if log.contains(&name) {
            debug!(bundle = %name, "skipping bundle named in the error log");
            report.skipped_invalid += 1;
            continue;
        }
        match process_one(cfg, &dir) {
            Ok((payload, removed)) => {
                debug!(bundle = %name, payload = %payload, "bundle processed");
                report.processed += 1;
                report.noise_removed += removed;
            }
            Err(err) => {
                warn!(bundle = %name, error = %err, "bundle processing failed");
                report.failed += 1;
            }
        }
    }

    info!(
        processed = report.processed,
        skipped = report.skipped_invalid,
        failed = report.failed,
        noise_removed = report.noise_removed,
        "bundles processed"
    );
    Ok(report)
}

fn process_one(cfg: &ProjectConfig, dir: &Path) -> Result<(String, usize), BundleError> {
    bag::revert_bundle(dir)?;
    let removed = strip_denylist(dir, &cfg.denylist)?;
    let identifier = bundle_identifier(dir, &cfg.mods_filename)?;
    let payload = select_payload(dir, &cfg.role_prefixes)?;

    let renamed = payload.extension().map_or_else(
        || identifier.clone(),
        |ext| format!("{identifier}.{}", ext.to_string_lossy()),
    );
    if payload.file_name().is_some_and(|name| name == renamed.as_str()) {
        return Ok((renamed, removed));
    }
    let target = dir.join(&renamed);
    if target.exists() {
        return Err(BundleError::RenameCollision(renamed));
    }
    fs::rename(&payload, &target)?;
    Ok((renamed, removed))
}

fn strip_denylist(dir: &Path, denylist: &[String]) -> io::Result<usize> {
    let mut removed = 0;
    for name in denylist {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(removed)
}

fn select_payload(dir: &Path, role_prefixes: &[String]) -> Result<PathBuf, BundleError> {
    let mut by_role: Vec<Vec<String>> = vec![Vec::new(); role_prefixes.len()];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(slot) = role_prefixes
            .iter()
            .position(|prefix| name.starts_with(prefix.as_str()))
        {
            by_role[slot].push(name);
        }
    }

    let chosen = by_role
        .iter()
        .find_map(|names| names.iter().min())
        .cloned()
        .ok_or(BundleError::MissingPayload)?;

    let mut candidates: Vec<&String> = by_role.iter().flatten().collect();
    if candidates.len() > 1 {
        candidates.sort();
        warn!(
            bundle = %dir.display(),
            chosen = %chosen,
            candidates = ?candidates,
            "multiple role-prefixed payload files; keeping the highest-priority one"
        );
    }
    Ok(dir.join(chosen))
}
