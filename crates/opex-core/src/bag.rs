//! Bagged-bundle collaborators: extract, validate, revert.
//!
//! Access copies arrive as zipped BagIt bags dropped into the staging
//! directory. `extract_bundles` unpacks them in place, `validate_bundle`
//! recomputes SHA-256 fixity against `manifest-sha256.txt` and checks
//! payload completeness, and `revert_bundle` flattens `data/` back out
//! and drops the bag bookkeeping. The rest of the pipeline consumes
//! bundles only through these three operations.

use crate::container::{asset_dirs, dir_name};
use crate::errorlog::{self, ErrorLogEntry, ValidationErrorKind};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BagError {
    #[error("{} has no data/ payload directory", .0.display())]
    NotABag(PathBuf),
    #[error("archive entry `{name}` in {} escapes the staging directory", .archive.display())]
    UnsafeArchivePath { archive: PathBuf, name: String },
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// --- extraction -------------------------------------------------------

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: usize,
    pub failed: usize,
}

/// Unpack every `*.zip` in the staging directory, deleting each archive
/// once it extracts cleanly. Broken archives are kept on disk, counted,
/// and logged with `warn!`.
///
/// # Errors
///
/// Returns an error when the staging directory itself cannot be read;
/// per-archive failures are isolated into the report.
pub fn extract_bundles(staging: &Path) -> Result<ExtractReport, BagError> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == "zip") {
            archives.push(path);
        }
    }
    archives.sort();

    let mut report = ExtractReport::default();
    for archive in &archives {
        match extract_archive(archive, staging) {
            Ok(entries) => {
                fs::remove_file(archive)?;
                debug!(archive = %archive.display(), entries, "bundle extracted");
                report.extracted += 1;
            }
            Err(err) => {
                warn!(archive = %archive.display(), error = %err, "bundle extraction failed");
                report.failed += 1;
            }
        }
    }

    info!(
        extracted = report.extracted,
        failed = report.failed,
        "bundle archives processed"
    );
    Ok(report)
}

fn extract_archive(archive: &Path, staging: &Path) -> Result<usize, BagError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(rel) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(BagError::UnsafeArchivePath {
                archive: archive.to_path_buf(),
                name: entry.name().to_string(),
            });
        };
        let target = staging.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }
    }
    Ok(zip.len())
}

// --- validation -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleCheck {
    Valid,
    Invalid(ValidationErrorKind),
}

#[derive(Debug, Default)]
pub struct ValidateReport {
    pub checked: usize,
    pub valid: usize,
    pub failures: Vec<ErrorLogEntry>,
}

/// Check one extracted bundle. Incomplete bag bookkeeping reads as
/// `Interrupted`, fixity/completeness problems as `ValidationFailed`,
/// and I/O trouble as `RuntimeError`; the check itself never errors.
#[must_use]
pub fn validate_bundle(dir: &Path) -> BundleCheck {
    check_bundle(dir).unwrap_or_else(|err| {
        warn!(bundle = %dir.display(), error = %err, "bundle check aborted");
        BundleCheck::Invalid(ValidationErrorKind::RuntimeError)
    })
}

fn check_bundle(dir: &Path) -> io::Result<BundleCheck> {
    use ValidationErrorKind::{Interrupted, ValidationFailed};

    if !dir.join("bagit.txt").is_file() {
        return Ok(BundleCheck::Invalid(Interrupted));
    }
    let data = dir.join("data");
    if !data.is_dir() {
        return Ok(BundleCheck::Invalid(Interrupted));
    }

    let mut manifests = Vec::new();
    let mut unsupported = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(algorithm) = name
            .strip_prefix("manifest-")
            .and_then(|rest| rest.strip_suffix(".txt"))
        {
            if algorithm == "sha256" {
                manifests.push(entry.path());
            } else {
                unsupported += 1;
            }
        }
    }
    if manifests.is_empty() {
        // No manifest at all means the transfer never finished; a
        // manifest we cannot recompute is a validation failure.
        return Ok(BundleCheck::Invalid(if unsupported > 0 {
            ValidationFailed
        } else {
            Interrupted
        }));
    }
    manifests.sort();

    let mut tracked: BTreeSet<PathBuf> = BTreeSet::new();
    for manifest in &manifests {
        let content = fs::read_to_string(manifest)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((digest, rel)) = split_manifest_line(line) else {
                return Ok(BundleCheck::Invalid(ValidationFailed));
            };
            let rel = Path::new(rel);
            if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
                return Ok(BundleCheck::Invalid(ValidationFailed));
            }
            let target = dir.join(rel);
            if !target.is_file() {
                return Ok(BundleCheck::Invalid(ValidationFailed));
            }
            if !sha256_file(&target)?.eq_ignore_ascii_case(digest) {
                return Ok(BundleCheck::Invalid(ValidationFailed));
            }
            tracked.insert(rel.to_path_buf());
        }
    }

    for entry in WalkDir::new(&data) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        if !tracked.contains(rel) {
            return Ok(BundleCheck::Invalid(ValidationFailed));
        }
    }

    Ok(BundleCheck::Valid)
}

fn split_manifest_line(line: &str) -> Option<(&str, &str)> {
    let (digest, rest) = line.split_once(|c: char| c.is_ascii_whitespace())?;
    if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let rel = rest.trim_start();
    if rel.is_empty() {
        return None;
    }
    Some((digest, rel))
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Validate every bundle in the staging directory, appending failures
/// to the error log under `root`.
///
/// # Errors
///
/// Returns an error when the staging directory cannot be listed or the
/// error log cannot be written; per-bundle failures land in the report.
pub fn validate_bundles(root: &Path, staging: &Path) -> Result<ValidateReport, BagError> {
    let mut report = ValidateReport::default();
    for dir in asset_dirs(staging, None)? {
        let name = dir_name(&dir);
        report.checked += 1;
        match validate_bundle(&dir) {
            BundleCheck::Valid => {
                debug!(bundle = %name, "bundle valid");
                report.valid += 1;
            }
            BundleCheck::Invalid(kind) => {
                warn!(bundle = %name, kind = kind.label(), "bundle failed validation");
                errorlog::append(root, kind, &name)?;
                report.failures.push(ErrorLogEntry {
                    kind,
                    bundle_id: name,
                });
            }
        }
    }

    info!(
        checked = report.checked,
        valid = report.valid,
        failed = report.failures.len(),
        "bundles validated"
    );
    Ok(report)
}

// --- revert -----------------------------------------------------------

/// Flatten a bundle: move everything in `data/` up to the bundle root,
/// remove the emptied `data/`, and delete the bag bookkeeping files.
/// Returns the number of entries moved up.
///
/// # Errors
///
/// Returns `NotABag` when there is no `data/` directory.
pub fn revert_bundle(dir: &Path) -> Result<usize, BagError> {
    let data = dir.join("data");
    if !data.is_dir() {
        return Err(BagError::NotABag(dir.to_path_buf()));
    }

    let mut moved = 0;
    for entry in fs::read_dir(&data)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
        moved += 1;
    }
    fs::remove_dir(&data)?;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_bag_bookkeeping(&name) {
            fs::remove_file(entry.path())?;
        }
    }

    debug!(bundle = %dir.display(), moved, "bundle reverted");
    Ok(moved)
}

fn is_bag_bookkeeping(name: &str) -> bool {
    name == "bagit.txt"
        || name == "bag-info.txt"
        || name == "fetch.txt"
        || (name.starts_with("manifest-") && name.ends_with(".txt"))
        || (name.starts_with("tagmanifest-") && name.ends_with(".txt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errorlog::ErrorLog;
    use std::io::Write;
    use tempfile::TempDir;

    fn sha256_hex(content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }

    fn make_bag(staging: &Path, name: &str, payload: &[(&str, &[u8])]) -> PathBuf {
        let dir = staging.join(name);
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(
            dir.join("bagit.txt"),
            "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n",
        )
        .unwrap();
        fs::write(dir.join("bag-info.txt"), "Bagging-Date: 2024-03-01\n").unwrap();

        let mut manifest = String::new();
        for (rel, content) in payload {
            let path = dir.join("data").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            manifest.push_str(&format!("{}  data/{rel}\n", sha256_hex(content)));
        }
        fs::write(dir.join("manifest-sha256.txt"), manifest).unwrap();
        dir
    }

    fn write_bag_zip(staging: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = staging.join(format!("{name}.zip"));
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::FileOptions::default();
        for (entry_name, content) in entries {
            zip.start_file(*entry_name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    #[test]
    fn extract_unpacks_and_removes_archives() {
        let staging = TempDir::new().unwrap();
        write_bag_zip(
            staging.path(),
            "bag_1",
            &[
                ("bag_1/bagit.txt", b"BagIt-Version: 1.0\n".as_slice()),
                ("bag_1/data/OBJ.tif", b"pixels".as_slice()),
            ],
        );

        let report = extract_bundles(staging.path()).unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(report.failed, 0);
        assert!(staging.path().join("bag_1").join("bagit.txt").is_file());
        assert_eq!(
            fs::read(staging.path().join("bag_1/data/OBJ.tif")).unwrap(),
            b"pixels"
        );
        assert!(!staging.path().join("bag_1.zip").exists());
    }

    #[test]
    fn extract_keeps_broken_archives() {
        let staging = TempDir::new().unwrap();
        fs::write(staging.path().join("broken.zip"), b"not a zip").unwrap();

        let report = extract_bundles(staging.path()).unwrap();
        assert_eq!(report.extracted, 0);
        assert_eq!(report.failed, 1);
        assert!(staging.path().join("broken.zip").is_file());
    }

    #[test]
    fn extract_rejects_escaping_entries() {
        let staging = TempDir::new().unwrap();
        let inner = staging.path().join("inner");
        fs::create_dir(&inner).unwrap();
        write_bag_zip(&inner, "evil", &[("../escaped.txt", b"outside".as_slice())]);

        let report = extract_bundles(&inner).unwrap();
        assert_eq!(report.failed, 1);
        assert!(!staging.path().join("escaped.txt").exists());
        assert!(inner.join("evil.zip").is_file());
    }

    #[test]
    fn intact_bag_validates() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(
            staging.path(),
            "bag_1",
            &[("OBJ.tif", b"pixels".as_slice()), ("MODS.xml", b"<mods/>".as_slice())],
        );
        assert_eq!(validate_bundle(&dir), BundleCheck::Valid);
    }

    #[test]
    fn checksum_mismatch_fails_validation() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::write(dir.join("data/OBJ.tif"), b"tampered").unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::ValidationFailed)
        );
    }

    #[test]
    fn missing_tracked_file_fails_validation() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::remove_file(dir.join("data/OBJ.tif")).unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::ValidationFailed)
        );
    }

    #[test]
    fn untracked_payload_fails_validation() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::write(dir.join("data/sneaky.txt"), b"extra").unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::ValidationFailed)
        );
    }

    #[test]
    fn malformed_manifest_line_fails_validation() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::write(dir.join("manifest-sha256.txt"), "nothex data/OBJ.tif\n").unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::ValidationFailed)
        );
    }

    #[test]
    fn traversal_in_manifest_fails_validation() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        let digest = sha256_hex(b"pixels");
        fs::write(
            dir.join("manifest-sha256.txt"),
            format!("{digest}  ../outside.tif\n"),
        )
        .unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::ValidationFailed)
        );
    }

    #[test]
    fn missing_bagit_marker_is_interrupted() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::remove_file(dir.join("bagit.txt")).unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::Interrupted)
        );
    }

    #[test]
    fn missing_manifest_is_interrupted() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::remove_file(dir.join("manifest-sha256.txt")).unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::Interrupted)
        );
    }

    #[test]
    fn missing_data_dir_is_interrupted() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[]);
        fs::remove_dir(dir.join("data")).unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::Interrupted)
        );
    }

    #[test]
    fn unsupported_algorithm_alone_fails_validation() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(staging.path(), "bag_1", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::rename(
            dir.join("manifest-sha256.txt"),
            dir.join("manifest-md5.txt"),
        )
        .unwrap();

        assert_eq!(
            validate_bundle(&dir),
            BundleCheck::Invalid(ValidationErrorKind::ValidationFailed)
        );
    }

    #[test]
    fn validate_bundles_records_failures_in_the_log() {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("staging");
        fs::create_dir(&staging).unwrap();

        make_bag(&staging, "bag_good", &[("OBJ.tif", b"pixels".as_slice())]);
        let bad = make_bag(&staging, "bag_bad", &[("OBJ.tif", b"pixels".as_slice())]);
        fs::write(bad.join("data/OBJ.tif"), b"tampered").unwrap();

        let report = validate_bundles(root.path(), &staging).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].bundle_id, "bag_bad");

        let log = ErrorLog::load(root.path()).unwrap();
        assert!(log.contains("bag_bad"));
        assert!(!log.contains("bag_good"));
    }

    #[test]
    fn revert_flattens_payload_and_drops_bookkeeping() {
        let staging = TempDir::new().unwrap();
        let dir = make_bag(
            staging.path(),
            "bag_1",
            &[
                ("OBJ.tif", b"pixels".as_slice()),
                ("MODS.xml", b"<mods/>".as_slice()),
                ("nested/extra.txt", b"deep".as_slice()),
            ],
        );
        fs::write(dir.join("tagmanifest-sha256.txt"), "").unwrap();

        let moved = revert_bundle(&dir).unwrap();
        assert_eq!(moved, 3);
        assert!(dir.join("OBJ.tif").is_file());
        assert!(dir.join("MODS.xml").is_file());
        assert!(dir.join("nested/extra.txt").is_file());
        assert!(!dir.join("data").exists());
        assert!(!dir.join("bagit.txt").exists());
        assert!(!dir.join("bag-info.txt").exists());
        assert!(!dir.join("manifest-sha256.txt").exists());
        assert!(!dir.join("tagmanifest-sha256.txt").exists());
    }

    #[test]
    fn revert_without_payload_dir_fails() {
        let staging = TempDir::new().unwrap();
        let dir = staging.path().join("not_a_bag");
        fs::create_dir(&dir).unwrap();

        assert!(matches!(
            revert_bundle(&dir).unwrap_err(),
            BagError::NotABag(_)
        ));
    }
}
