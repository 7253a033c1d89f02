//! PAX package builder.
//!
//! Three operator steps per asset directory: stage both representation
//! roots under `pax_stage/`, serialize the staged tree into
//! `<asset>.pax.zip`, and finally sweep the asset down to its ingest
//! artifacts. The archive is written under a scratch `.zip` name and
//! renamed once complete, so a `.pax.zip` on disk is always whole.

use crate::container::{asset_dirs, dir_name};
use crate::merge::{REP_ACCESS, REP_PRESERVATION};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const PAX_STAGE: &str = "pax_stage";
pub const PAX_SUFFIX: &str = ".pax.zip";
pub const OPEX_SUFFIX: &str = ".opex";

#[derive(Debug, Error)]
pub enum PaxError {
    #[error("missing representation {}", .0.display())]
    MissingRepresentation(PathBuf),
    #[error("{} has no staged content to archive", .0.display())]
    StageMissing(PathBuf),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct StageReport {
    pub staged: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub archived: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub unexpected: usize,
}

/// Moves each asset's representation roots into a fresh `pax_stage/`.
///
/// Assets already holding a `pax_stage/` are skipped; assets missing
/// either representation root are counted as failures and left
/// untouched.
///
/// # Errors
///
/// Returns `Io` when the container cannot be listed.
pub fn stage_assets(container: &Path, staging_id: &str) -> Result<StageReport, PaxError> {
    let mut report = StageReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        let stage = asset.join(PAX_STAGE);
        if stage.exists() {
            debug!(asset = %dir_name(&asset), "already staged");
            report.skipped += 1;
            continue;
        }
        match stage_one(&asset, &stage) {
            Ok(()) => report.staged += 1,
            Err(err) => {
                warn!(asset = %dir_name(&asset), error = %err, "staging failed");
                report.failed += 1;
            }
        }
    }

    info!(
        staged = report.staged,
        skipped = report.skipped,
        failed = report.failed,
        "pax content staged"
    );
    Ok(report)
}

fn stage_one(asset: &Path, stage: &Path) -> Result<(), PaxError> {
    let pres = asset.join(REP_PRESERVATION);
    let access = asset.join(REP_ACCESS);
    if !pres.is_dir() {
        return Err(PaxError::MissingRepresentation(pres));
    }
    if !access.is_dir() {
        return Err(PaxError::MissingRepresentation(access));
    }
    fs::create_dir(stage)?;
    fs::rename(&pres, stage.join(REP_PRESERVATION))?;
    fs::rename(&access, stage.join(REP_ACCESS))?;
    Ok(())
}

/// Serializes each asset's `pax_stage/` tree into `<asset>.pax.zip`.
///
/// Entry order is deterministic and directory entries are written
/// explicitly, so an empty `Representation_Access` survives the round
/// trip. Assets whose archive already exists are skipped; per-asset
/// failures are counted and the pass continues.
///
/// # Errors
///
/// Returns `Io` when the container cannot be listed.
pub fn archive_assets(container: &Path, staging_id: &str) -> Result<ArchiveReport, PaxError> {
    let mut report = ArchiveReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        let name = dir_name(&asset);
        if asset.join(format!("{name}{PAX_SUFFIX}")).exists() {
            debug!(asset = %name, "pax archive already present");
            report.skipped += 1;
            continue;
        }
        match archive_one(&asset, &name) {
            Ok(entries) => {
                debug!(asset = %name, entries, "pax archive written");
                report.archived += 1;
            }
            Err(err) => {
                warn!(asset = %name, error = %err, "pax archive failed");
                report.failed += 1;
            }
        }
    }

    info!(
        archived = report.archived,
        skipped = report.skipped,
        failed = report.failed,
        "pax archives created"
    );
    Ok(report)
}

fn archive_one(asset: &Path, name: &str) -> Result<usize, PaxError> {
    let stage = asset.join(PAX_STAGE);
    if !stage.is_dir() {
        return Err(PaxError::StageMissing(stage));
    }

    let scratch = asset.join(format!("{name}.zip"));
    let mut zip = ZipWriter::new(File::create(&scratch)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0;
    for entry in WalkDir::new(&stage).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(&stage)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if entry.file_type().is_dir() {
            zip.add_directory(entry_name(rel), options)?;
        } else {
            zip.start_file(entry_name(rel), options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
        }
        entries += 1;
    }
    zip.finish()?;

    fs::rename(&scratch, asset.join(format!("{name}{PAX_SUFFIX}")))?;
    Ok(entries)
}

fn entry_name(rel: &Path) -> String {
    let mut name = String::new();
    for part in rel.components() {
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(&part.as_os_str().to_string_lossy());
    }
    name
}

/// Sweeps each asset directory down to its ingest artifacts.
///
/// Keeps `*.pax.zip` and `*.opex`, deletes the metadata `*.xml` files
/// and leftover directories, and counts anything else without touching
/// it.
///
/// # Errors
///
/// Returns `Io` when a listing or deletion fails.
pub fn clean_assets(container: &Path, staging_id: &str) -> Result<CleanReport, PaxError> {
    let mut report = CleanReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        for entry in fs::read_dir(&asset)? {
            let entry = entry?;
            let name = entry.file_name();
            let text = name.to_string_lossy();
            if text.ends_with(PAX_SUFFIX) || text.ends_with(OPEX_SUFFIX) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
                report.dirs_removed += 1;
            } else if Path::new(&name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
            {
                fs::remove_file(entry.path())?;
                report.files_removed += 1;
            } else {
                warn!(asset = %dir_name(&asset), entity = %text, "unexpected entity left in place");
                report.unexpected += 1;
            }
        }
    }

    info!(
        files = report.files_removed,
        dirs = report.dirs_removed,
        unexpected = report.unexpected,
        "asset directories cleaned"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn make_merged_asset(container: &Path, name: &str) -> PathBuf {
        let asset = container.join(name);
        let pres = asset.join(REP_PRESERVATION).join("001-1");
        fs::create_dir_all(&pres).unwrap();
        fs::write(pres.join("001-1.tif"), b"master").unwrap();
        let access = asset.join(REP_ACCESS).join(name);
        fs::create_dir_all(&access).unwrap();
        fs::write(access.join(format!("{name}.tif")), b"access").unwrap();
        asset
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn stage_moves_both_representations() {
        let container = TempDir::new().unwrap();
        fs::create_dir(container.path().join("bundles_t")).unwrap();
        let asset = make_merged_asset(container.path(), "001-001-002");

        let report = stage_assets(container.path(), "bundles_t").unwrap();
        assert_eq!(report.staged, 1);
        assert_eq!(report.failed, 0);

        let stage = asset.join(PAX_STAGE);
        assert!(stage
            .join(REP_PRESERVATION)
            .join("001-1")
            .join("001-1.tif")
            .is_file());
        assert!(stage.join(REP_ACCESS).join("001-001-002").is_dir());
        assert!(!asset.join(REP_PRESERVATION).exists());
        assert!(!asset.join(REP_ACCESS).exists());
    }

    #[test]
    fn missing_representation_is_counted_and_leaves_asset_alone() {
        let container = TempDir::new().unwrap();
        let asset = container.path().join("001-001-001");
        fs::create_dir_all(asset.join(REP_PRESERVATION)).unwrap();

        let report = stage_assets(container.path(), "bundles_t").unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.staged, 0);
        assert!(asset.join(REP_PRESERVATION).is_dir());
        assert!(!asset.join(PAX_STAGE).exists());
    }

    #[test]
    fn second_stage_run_skips_staged_assets() {
        let container = TempDir::new().unwrap();
        make_merged_asset(container.path(), "001-001-002");

        stage_assets(container.path(), "bundles_t").unwrap();
        let report = stage_assets(container.path(), "bundles_t").unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.staged, 0);
    }

    #[test]
    fn archive_lists_entries_in_sorted_order_with_directories() {
        let container = TempDir::new().unwrap();
        let asset = make_merged_asset(container.path(), "001-001-002");
        stage_assets(container.path(), "bundles_t").unwrap();

        let report = archive_assets(container.path(), "bundles_t").unwrap();
        assert_eq!(report.archived, 1);

        let names = archive_names(&asset.join("001-001-002.pax.zip"));
        assert_eq!(
            names,
            vec![
                "Representation_Access/",
                "Representation_Access/001-001-002/",
                "Representation_Access/001-001-002/001-001-002.tif",
                "Representation_Preservation/",
                "Representation_Preservation/001-1/",
                "Representation_Preservation/001-1/001-1.tif",
            ]
        );
        assert!(!asset.join("001-001-002.zip").exists());
        assert!(asset.join(PAX_STAGE).is_dir());
    }

    #[test]
    fn empty_access_root_survives_archiving() {
        let container = TempDir::new().unwrap();
        let asset = container.path().join("001-001-001");
        let pres = asset.join(REP_PRESERVATION).join("001-1");
        fs::create_dir_all(&pres).unwrap();
        fs::write(pres.join("001-1.tif"), b"master").unwrap();
        fs::create_dir(asset.join(REP_ACCESS)).unwrap();

        stage_assets(container.path(), "bundles_t").unwrap();
        archive_assets(container.path(), "bundles_t").unwrap();

        let names = archive_names(&asset.join("001-001-001.pax.zip"));
        assert!(names.contains(&"Representation_Access/".to_string()));
    }

    #[test]
    fn archive_skips_done_assets_and_counts_unstaged_ones() {
        let container = TempDir::new().unwrap();
        make_merged_asset(container.path(), "001-001-002");
        stage_assets(container.path(), "bundles_t").unwrap();
        archive_assets(container.path(), "bundles_t").unwrap();

        let unstaged = container.path().join("002-001-001");
        fs::create_dir(&unstaged).unwrap();

        let report = archive_assets(container.path(), "bundles_t").unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.archived, 0);
    }

    #[test]
    fn clean_keeps_only_ingest_artifacts() {
        let container = TempDir::new().unwrap();
        let asset = container.path().join("001-001-002");
        fs::create_dir_all(asset.join(PAX_STAGE).join(REP_ACCESS)).unwrap();
        fs::write(asset.join("001-001-002.pax.zip"), b"zip").unwrap();
        fs::write(asset.join("001-001-002.pax.zip.opex"), b"opex").unwrap();
        fs::write(asset.join("MODS.xml"), b"<mods/>").unwrap();
        fs::write(asset.join("DC.xml"), b"<dc/>").unwrap();
        fs::write(asset.join("notes.txt"), b"?").unwrap();

        let report = clean_assets(container.path(), "bundles_t").unwrap();
        assert_eq!(report.files_removed, 2);
        assert_eq!(report.dirs_removed, 1);
        assert_eq!(report.unexpected, 1);

        assert!(asset.join("001-001-002.pax.zip").is_file());
        assert!(asset.join("001-001-002.pax.zip.opex").is_file());
        assert!(asset.join("notes.txt").is_file());
        assert!(!asset.join("MODS.xml").exists());
        assert!(!asset.join(PAX_STAGE).exists());
    }
}
