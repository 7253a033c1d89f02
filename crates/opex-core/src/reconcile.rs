//! Identity reconciler.
//!
//! Two views of the same delivery have to agree before anything moves:
//! grouped preservation directories on one side, bundle identifiers on
//! the other. `build_report` writes the three-way reconciliation CSV
//! the archivist reviews, and `write_crosswalk` emits the
//! `identifier|absolute_path` file that merge later consumes verbatim.
//! The crosswalk refuses duplicate identifiers outright; a wrong match
//! here moves files into the wrong asset.

use crate::bundle::bundle_identifier;
use crate::config::ProjectConfig;
use crate::container::{asset_dirs, dir_name};
use crate::errorlog::ErrorLog;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("identifier `{identifier}` is claimed by both `{first}` and `{second}`")]
    DuplicateIdentifier {
        identifier: String,
        first: String,
        second: String,
    },
    #[error("malformed crosswalk line in {}: `{line}`", .path.display())]
    MalformedCrosswalk { path: PathBuf, line: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub matched: usize,
    pub pres_only: usize,
    pub acc_only: usize,
    pub unreadable: usize,
}

#[derive(Debug, Default)]
pub struct CrosswalkReport {
    pub written: usize,
    pub skipped_invalid: usize,
    pub missing_identifier: usize,
}

const REPORT_HEADER: [&str; 3] = ["pres_file_name", "acc_file_name", "bag_id"];

/// Write the reconciliation CSV: one row per preservation directory
/// (paired with the bundle claiming its name, when one does), then the
/// unmatched bundles, then bundles whose identifier cannot be read.
/// Every bundle appears whether or not it validated.
///
/// # Errors
///
/// Returns an error when a directory listing or the CSV write fails;
/// unreadable bundle records are counted, not fatal.
pub fn build_report(
    cfg: &ProjectConfig,
    container: &Path,
    staging_id: &str,
) -> Result<ReportSummary, ReconcileError> {
    let pres_dirs = asset_dirs(container, Some(staging_id))?;
    let bundles = asset_dirs(&container.join(staging_id), None)?;

    let mut by_identifier: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut unreadable = Vec::new();
    for bundle in &bundles {
        let name = dir_name(bundle);
        match bundle_identifier(bundle, &cfg.mods_filename) {
            Ok(identifier) => by_identifier.entry(identifier).or_default().push(name),
            Err(err) => {
                warn!(bundle = %name, error = %err, "cannot read bundle identifier");
                unreadable.push(name);
            }
        }
    }
    for (identifier, names) in &by_identifier {
        if names.len() > 1 {
            warn!(identifier = %identifier, bundles = ?names, "identifier claimed by multiple bundles");
        }
    }

    let mut rows: Vec<[String; 3]> = Vec::new();
    let mut summary = ReportSummary::default();
    let mut consumed: BTreeSet<String> = BTreeSet::new();

    for pres in &pres_dirs {
        let pres_name = dir_name(pres);
        if let Some(names) = by_identifier.get(&pres_name) {
            for bundle in names {
                rows.push([pres_name.clone(), pres_name.clone(), bundle.clone()]);
                summary.matched += 1;
            }
            consumed.insert(pres_name);
        } else {
            rows.push([pres_name, String::new(), String::new()]);
            summary.pres_only += 1;
        }
    }
    for (identifier, names) in &by_identifier {
        if consumed.contains(identifier) {
            continue;
        }
        for bundle in names {
            rows.push([String::new(), identifier.clone(), bundle.clone()]);
            summary.acc_only += 1;
        }
    }
    for bundle in unreadable {
        rows.push([String::new(), String::new(), bundle]);
        summary.unreadable += 1;
    }

    write_csv(&cfg.report_path(), &rows)?;
    info!(
        report = %cfg.report_path().display(),
        matched = summary.matched,
        pres_only = summary.pres_only,
        acc_only = summary.acc_only,
        unreadable = summary.unreadable,
        "reconciliation report written"
    );
    Ok(summary)
}

/// Write `identifier|absolute_path` lines for every bundle not named
/// in the error log. The file is rewritten whole, and nothing is
/// written at all when two bundles claim one identifier.
///
/// # Errors
///
/// Returns `DuplicateIdentifier` on a clash and `Io` when the staging
/// tree or the output file cannot be touched. Bundles without a usable
/// identifier are counted and skipped.
pub fn write_crosswalk(
    cfg: &ProjectConfig,
    root: &Path,
    staging: &Path,
) -> Result<CrosswalkReport, ReconcileError> {
    let log = ErrorLog::load(root)?;
    let staging_abs = staging.canonicalize()?;
    let mut report = CrosswalkReport::default();
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut lines = String::new();

    for bundle in asset_dirs(staging, None)? {
        let name = dir_name(&bundle);
        if log.contains(&name) {
            report.skipped_invalid += 1;
            continue;
        }
        match bundle_identifier(&bundle, &cfg.mods_filename) {
            Ok(identifier) => {
                if let Some(first) = seen.get(&identifier) {
                    return Err(ReconcileError::DuplicateIdentifier {
                        identifier,
                        first: first.clone(),
                        second: name,
                    });
                }
                let target = staging_abs.join(&name);
                lines.push_str(&format!("{identifier}|{}\n", target.display()));
                seen.insert(identifier, name);
                report.written += 1;
            }
            Err(err) => {
                warn!(bundle = %name, error = %err, "bundle has no usable identifier");
                report.missing_identifier += 1;
            }
        }
    }

    fs::write(cfg.access_ids_path(), lines)?;
    info!(
        crosswalk = %cfg.access_ids_path().display(),
        written = report.written,
        skipped = report.skipped_invalid,
        missing_identifier = report.missing_identifier,
        "identifier crosswalk written"
    );
    Ok(report)
}

/// Parse a crosswalk file into an exact-match map.
///
/// # Errors
///
/// Returns `MalformedCrosswalk` for a line without `|` or with an
/// empty side, and `DuplicateIdentifier` when a key repeats.
pub fn load_crosswalk(path: &Path) -> Result<BTreeMap<String, PathBuf>, ReconcileError> {
    let content = fs::read_to_string(path)?;
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = line.split_once('|').map(|(id, target)| (id.trim(), target.trim()));
        let Some((identifier, target)) = parsed.filter(|(id, t)| !id.is_empty() && !t.is_empty())
        else {
            return Err(ReconcileError::MalformedCrosswalk {
                path: path.to_path_buf(),
                line: line.to_string(),
            });
        };
        if let Some(previous) = map.insert(identifier.to_string(), PathBuf::from(target)) {
            return Err(ReconcileError::DuplicateIdentifier {
                identifier: identifier.to_string(),
                first: previous.display().to_string(),
                second: target.to_string(),
            });
        }
    }
    Ok(map)
}

fn write_csv(path: &Path, rows: &[[String; 3]]) -> io::Result<()> {
    let mut content = csv_row(&REPORT_HEADER);
    content.push('\n');
    for row in rows {
        let fields = [row[0].as_str(), row[1].as_str(), row[2].as_str()];
        content.push_str(&csv_row(&fields));
        content.push('\n');
    }
    fs::write(path, content)
}

fn csv_row(fields: &[&str]) -> String {
    let cells: Vec<String> = fields.iter().map(|field| csv_cell(field)).collect();
    cells.join(",")
}

fn csv_cell(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
