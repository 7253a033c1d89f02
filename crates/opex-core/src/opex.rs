//! OPEX metadata emitter.
//!
//! Writes the three metadata layers of the ingest structure: a
//! `<asset>.pax.zip.opex` fragment per asset built from its Dublin
//! Core record, an archival-object `.opex` per asset resolved through
//! the operator-supplied crosswalk (renaming the asset directory to
//! the archival object number), and a transfer manifest for the
//! container itself. Documents are emitted as single concatenated
//! strings; every interpolated value passes through XML escaping.

use crate::config::ProjectConfig;
use crate::container::{asset_dirs, dir_name};
use crate::pax::{OPEX_SUFFIX, PAX_SUFFIX};
use crate::xml::{self, XmlError};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const OPEX_NS: &str = "http://www.openpreservationexchange.org/opex/v1.0";
pub const LEGACY_XIP_NS: &str = "http://preservica.com/LegacyXIP";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>";

#[derive(Debug, Error)]
pub enum OpexError {
    #[error("identifier {0:?} has no label; expected `label:value`")]
    MalformedIdentifier(String),
    #[error("{}:{line}: malformed crosswalk line", path.display())]
    MalformedCrosswalk { path: PathBuf, line: usize },
    #[error("legacy identifier {identifier:?} maps to both {first:?} and {second:?}")]
    ConflictingMapping {
        identifier: String,
        first: String,
        second: String,
    },
    #[error("no archival object number matches the identifiers of {0}")]
    NoMatch(String),
    #[error("{asset} matches several archival objects: {candidates:?}")]
    AmbiguousMatch {
        asset: String,
        candidates: Vec<String>,
    },
    #[error("{} already exists", .0.display())]
    RenameCollision(PathBuf),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct AssetOpexReport {
    pub written: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct ObjectOpexReport {
    pub written: usize,
    pub renamed: usize,
    pub failed: usize,
}

/// Writes `<asset>.pax.zip.opex` for every asset directory.
///
/// The fragment carries the Dublin Core title, typed identifiers, the
/// LegacyXIP accession reference, and every root-level `*.xml`
/// document with its XML declaration stripped. Per-asset failures
/// (missing or titleless DC record, unlabelled identifier) are counted
/// and the pass continues.
///
/// # Errors
///
/// Returns `Io` when the container cannot be listed or a fragment
/// cannot be written.
pub fn write_asset_opex(
    cfg: &ProjectConfig,
    container: &Path,
    staging_id: &str,
) -> Result<AssetOpexReport, OpexError> {
    let mut report = AssetOpexReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        let name = dir_name(&asset);
        match build_asset_opex(cfg, &asset) {
            Ok(doc) => {
                fs::write(asset.join(format!("{name}{PAX_SUFFIX}{OPEX_SUFFIX}")), doc)?;
                debug!(asset = %name, "asset metadata written");
                report.written += 1;
            }
            Err(err) => {
                warn!(asset = %name, error = %err, "asset metadata failed");
                report.failed += 1;
            }
        }
    }

    info!(
        written = report.written,
        failed = report.failed,
        "asset opex metadata created"
    );
    Ok(report)
}

fn build_asset_opex(cfg: &ProjectConfig, asset: &Path) -> Result<String, OpexError> {
    let dc = asset.join(&cfg.dc_filename);
    let title = xml::extract_field(&dc, "title")?;
    let identifiers = xml::extract_fields(&dc, "identifier")?;

    let mut doc = String::from(XML_DECLARATION);
    doc.push_str(&format!("<opex:OPEXMetadata xmlns:opex=\"{OPEX_NS}\">"));
    doc.push_str("<opex:Properties><opex:Title>");
    doc.push_str(&xml::escape_text(&title));
    doc.push_str("</opex:Title><opex:Identifiers>");
    for identifier in &identifiers {
        let (label, value) = if identifier.starts_with(&cfg.code_prefix) {
            ("code", identifier.as_str())
        } else {
            let (label, value) = identifier
                .split_once(':')
                .ok_or_else(|| OpexError::MalformedIdentifier(identifier.clone()))?;
            (label.trim(), value.trim())
        };
        doc.push_str(&format!(
            "<opex:Identifier type=\"{}\">{}</opex:Identifier>",
            xml::escape_attr(label),
            xml::escape_text(value)
        ));
    }
    doc.push_str("</opex:Identifiers></opex:Properties><opex:DescriptiveMetadata>");
    doc.push_str(&format!(
        "<LegacyXIP xmlns=\"{LEGACY_XIP_NS}\"><AccessionRef>catalogue</AccessionRef></LegacyXIP>"
    ));
    for path in root_xml_files(asset)? {
        let content = fs::read_to_string(&path)?;
        doc.push_str(xml::strip_declaration(&content).trim());
    }
    doc.push_str("</opex:DescriptiveMetadata></opex:OPEXMetadata>");
    Ok(doc)
}

fn root_xml_files(asset: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(asset)? {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_file()
            && Path::new(&name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Resolves each asset to its archival object number and emits
/// `<ao>.opex`, renaming the asset directory to match.
///
/// Resolution extracts every identifier value from the asset's
/// existing `.pax.zip.opex` (header identifiers and embedded
/// descriptive records alike) and looks each one up in the crosswalk.
/// No match, several distinct matches, and rename collisions are
/// counted per-asset failures.
///
/// # Errors
///
/// Returns `MalformedCrosswalk` / `ConflictingMapping` when the
/// crosswalk file does not parse and `Io` when it cannot be read or
/// the container cannot be listed.
pub fn write_object_opex(
    cfg: &ProjectConfig,
    container: &Path,
    staging_id: &str,
) -> Result<ObjectOpexReport, OpexError> {
    let crosswalk = load_ao_crosswalk(&cfg.ao_crosswalk_path())?;
    let mut report = ObjectOpexReport::default();

    for asset in asset_dirs(container, Some(staging_id))? {
        let name = dir_name(&asset);
        match assign_object(&crosswalk, &asset, &name) {
            Ok(renamed) => {
                report.written += 1;
                if renamed {
                    report.renamed += 1;
                }
            }
            Err(err) => {
                warn!(asset = %name, error = %err, "archival object resolution failed");
                report.failed += 1;
            }
        }
    }

    info!(
        written = report.written,
        renamed = report.renamed,
        failed = report.failed,
        "archival object metadata created"
    );
    Ok(report)
}

/// Parses `archival_object_number|legacy_identifier` lines into a
/// legacy-identifier keyed map.
///
/// # Errors
///
/// Returns `MalformedCrosswalk` for lines without both sides,
/// `ConflictingMapping` when one legacy identifier claims two numbers,
/// and `Io` when the file cannot be read. A repeated identical line is
/// tolerated.
pub fn load_ao_crosswalk(path: &Path) -> Result<BTreeMap<String, String>, OpexError> {
    let content = fs::read_to_string(path)?;
    let mut map = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((ao_number, legacy)) = line.split_once('|') else {
            return Err(OpexError::MalformedCrosswalk {
                path: path.to_path_buf(),
                line: idx + 1,
            });
        };
        let ao_number = ao_number.trim();
        let legacy = legacy.trim();
        if ao_number.is_empty() || legacy.is_empty() {
            return Err(OpexError::MalformedCrosswalk {
                path: path.to_path_buf(),
                line: idx + 1,
            });
        }
        if let Some(first) = map.insert(legacy.to_string(), ao_number.to_string()) {
            if first != ao_number {
                return Err(OpexError::ConflictingMapping {
                    identifier: legacy.to_string(),
                    first,
                    second: ao_number.to_string(),
                });
            }
        }
    }
    Ok(map)
}

fn assign_object(
    crosswalk: &BTreeMap<String, String>,
    asset: &Path,
    name: &str,
) -> Result<bool, OpexError> {
    let doc = fs::read_to_string(asset.join(format!("{name}{PAX_SUFFIX}{OPEX_SUFFIX}")))?;
    let mut candidates = xml::extract_all(&doc, "Identifier");
    candidates.extend(xml::extract_all(&doc, "identifier"));

    let mut matched: Vec<String> = Vec::new();
    for value in &candidates {
        if let Some(ao) = crosswalk.get(value) {
            if !matched.iter().any(|m| m == ao) {
                matched.push(ao.clone());
            }
        }
    }
    if matched.is_empty() {
        return Err(OpexError::NoMatch(name.to_string()));
    }
    if matched.len() > 1 {
        return Err(OpexError::AmbiguousMatch {
            asset: name.to_string(),
            candidates: matched,
        });
    }
    let ao = matched.remove(0);

    let target = asset.with_file_name(&ao);
    if name != ao && target.exists() {
        return Err(OpexError::RenameCollision(target));
    }
    fs::write(
        asset.join(format!("{ao}{OPEX_SUFFIX}")),
        object_opex_doc(&ao),
    )?;
    if name == ao {
        debug!(asset = %name, "already carries its archival object number");
        return Ok(false);
    }
    fs::rename(asset, &target)?;
    debug!(asset = %name, ao = %ao, "asset renamed to archival object");
    Ok(true)
}

fn object_opex_doc(ao_number: &str) -> String {
    let ao = xml::escape_text(ao_number);
    format!(
        "{XML_DECLARATION}\
         <opex:OPEXMetadata xmlns:opex=\"{OPEX_NS}\">\
         <opex:Properties><opex:Title>{ao}</opex:Title>\
         <opex:Identifiers><opex:Identifier type=\"code\">{ao}</opex:Identifier></opex:Identifiers>\
         </opex:Properties><opex:DescriptiveMetadata>\
         <LegacyXIP xmlns=\"{LEGACY_XIP_NS}\"><Virtual>false</Virtual></LegacyXIP>\
         </opex:DescriptiveMetadata></opex:OPEXMetadata>"
    )
}

/// Writes the transfer manifest listing every immediate subdirectory,
/// to `<container>/<container_name>.opex`.
///
/// # Errors
///
/// Returns `Io` when the container cannot be listed or the manifest
/// cannot be written.
pub fn write_container_opex(container: &Path) -> Result<PathBuf, OpexError> {
    let dirs = asset_dirs(container, None)?;

    let mut doc = String::from(XML_DECLARATION);
    doc.push_str(&format!(
        "<opex:OPEXMetadata xmlns:opex=\"{OPEX_NS}\"><opex:Transfer><opex:Manifest><opex:Folders>"
    ));
    for dir in &dirs {
        doc.push_str(&format!(
            "<opex:Folder>{}</opex:Folder>",
            xml::escape_text(&dir_name(dir))
        ));
    }
    doc.push_str("</opex:Folders></opex:Manifest></opex:Transfer></opex:OPEXMetadata>");

    let target = container.join(format!("{}{OPEX_SUFFIX}", dir_name(container)));
    fs::write(&target, doc)?;
    info!(folders = dirs.len(), path = %target.display(), "container manifest written");
    Ok(target)
}
