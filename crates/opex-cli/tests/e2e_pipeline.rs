//! E2E workflow tests for the `opx` binary.
//!
//! Each test runs `opx` as a subprocess inside an isolated temp project
//! and drives the stages in operator order, checking the printed
//! summary lines and the tree each stage leaves behind.

use assert_cmd::Command;
use predicates::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipWriter;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the opx binary, rooted in `dir`.
fn opx(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("opx"));
    cmd.current_dir(dir);
    // Only error-level tracing, so stdout carries just the stage summaries.
    cmd.env("OPX_LOG", "error");
    cmd
}

/// The single directory under `root` whose name starts with `prefix`.
fn dir_with_prefix(root: &Path, prefix: &str) -> PathBuf {
    let mut found: Vec<PathBuf> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
        })
        .collect();
    assert_eq!(found.len(), 1, "expected exactly one {prefix}* directory");
    found.pop().unwrap()
}

fn seed_masters(root: &Path, names: &[&str]) {
    fs::create_dir(root.join("preservation_masters")).unwrap();
    for name in names {
        fs::write(root.join("preservation_masters").join(name), b"pixels").unwrap();
    }
}

/// Zip a complete BagIt bag into the staging directory.
fn bag_zip(staging: &Path, bag_name: &str, payload: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(File::create(staging.join(format!("{bag_name}.zip"))).unwrap());
    let options = zip::write::FileOptions::default();
    let mut manifest = String::new();
    for (rel, content) in payload {
        manifest.push_str(&format!(
            "{}  data/{rel}\n",
            hex::encode(Sha256::digest(content))
        ));
        zip.start_file(format!("{bag_name}/data/{rel}"), options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.start_file(format!("{bag_name}/bagit.txt"), options).unwrap();
    zip.write_all(b"BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n")
        .unwrap();
    zip.start_file(format!("{bag_name}/manifest-sha256.txt"), options).unwrap();
    zip.write_all(manifest.as_bytes()).unwrap();
    zip.finish().unwrap();
}

const DC_RECORD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Letter, 1901</dc:title>
  <dc:identifier>ur98765</dc:identifier>
  <dc:identifier>islandora:1234</dc:identifier>
</oai_dc:dc>
"#;

const MODS_RECORD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mods:mods xmlns:mods="http://www.loc.gov/mods/v3">
  <mods:identifier>001-001-002</mods:identifier>
</mods:mods>
"#;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn full_lifecycle_from_drop_to_container_manifest() {
    let project = TempDir::new().unwrap();
    let root = project.path();
    seed_masters(root, &["001-1.tif", "001-2.tif", "002-1.tif"]);

    opx(root).arg("init").assert().success().stdout(
        predicate::str::contains("✓ Adopted preservation_masters/ as container_")
            .and(predicate::str::contains("opx group")),
    );
    let container = dir_with_prefix(root, "container_");

    opx(root).arg("group").assert().success().stdout(predicate::str::contains(
        "✓ Grouped 3 master files into 2 asset directories.",
    ));
    assert!(container.join("001-001-002").is_dir());
    assert!(container.join("002-001-001").is_dir());

    opx(root).arg("intake").assert().success().stdout(predicate::str::contains(
        "✓ Created bundle staging directory bundles_",
    ));
    let staging = dir_with_prefix(&container, "bundles_");

    bag_zip(
        &staging,
        "bag_letters",
        &[
            ("OBJ.tif", b"access pixels".as_slice()),
            ("MODS.xml", MODS_RECORD.as_bytes()),
            ("DC.xml", DC_RECORD.as_bytes()),
            ("TN.jpg", b"thumbnail noise".as_slice()),
        ],
    );

    opx(root).arg("extract").assert().success().stdout(predicate::str::contains(
        "✓ Extracted 1 bundle archives (0 failed).",
    ));

    opx(root).arg("validate").assert().success().stdout(predicate::str::contains(
        "✓ Validated 1 bundles: 1 valid, 0 logged to validation_error_log.txt.",
    ));

    opx(root).arg("report").assert().success().stdout(predicate::str::contains(
        "✓ Wrote pres_acc_bag_ids.csv: 1 matched, 1 preservation-only, 0 access-only, 0 unreadable.",
    ));
    assert!(root.join("pres_acc_bag_ids.csv").is_file());

    opx(root).arg("process").assert().success().stdout(predicate::str::contains(
        "✓ Processed 1 bundles (0 skipped as invalid, 0 failed, 1 noise files removed).",
    ));
    assert!(staging.join("bag_letters/001-001-002.tif").is_file());

    opx(root).arg("crosswalk").assert().success().stdout(predicate::str::contains(
        "✓ Logged 1 identifier paths to access_ids.txt (0 skipped as invalid, 0 missing identifiers).",
    ));
    assert!(root.join("access_ids.txt").is_file());

    opx(root).arg("merge").assert().success().stdout(predicate::str::contains(
        "✓ Wrapped 2 assets (3 files); merged 1 access bundles (1 unmatched, 0 failed).",
    ));
    let asset = container.join("001-001-002");
    assert!(asset.join("DC.xml").is_file());
    assert!(
        asset
            .join("Representation_Access/001-001-002/001-001-002.tif")
            .is_file()
    );
    assert!(
        asset
            .join("Representation_Preservation/001-1/001-1.tif")
            .is_file()
    );

    opx(root).arg("clean-bundles").assert().success().stdout(
        predicate::str::contains("✓ Deleted bundles_")
            .and(predicate::str::contains("and access_ids.txt.")),
    );
    assert!(!staging.exists());
    assert!(!root.join("access_ids.txt").exists());

    opx(root).args(["opex", "asset"]).assert().success().stdout(predicate::str::contains(
        "✓ Created 1 asset metadata fragments (1 failed).",
    ));
    let fragment = fs::read_to_string(asset.join("001-001-002.pax.zip.opex")).unwrap();
    assert!(fragment.contains("<opex:Title>Letter, 1901</opex:Title>"));

    opx(root).arg("package").assert().success().stdout(predicate::str::contains(
        "✓ Staged 2 assets and built 2 PAX archives (0 skipped, 0 failed).",
    ));
    assert!(asset.join("001-001-002.pax.zip").is_file());

    opx(root).arg("clean").assert().success().stdout(predicate::str::contains(
        "✓ Removed 2 metadata files and 2 leftover directories (0 unexpected entities kept).",
    ));
    assert!(!asset.join("DC.xml").exists());
    assert!(!asset.join("pax_stage").exists());

    fs::write(root.join("ao_crosswalk.txt"), "ao_000552|islandora:1234\n").unwrap();
    opx(root).args(["opex", "object"]).assert().success().stdout(predicate::str::contains(
        "✓ Resolved 1 archival objects (1 renamed, 1 failed).",
    ));
    let renamed = container.join("ao_000552");
    assert!(!asset.exists());
    assert!(renamed.join("001-001-002.pax.zip").is_file());
    assert!(renamed.join("001-001-002.pax.zip.opex").is_file());
    assert!(renamed.join("ao_000552.opex").is_file());

    opx(root).args(["opex", "container"]).assert().success().stdout(
        predicate::str::contains("✓ Wrote container manifest")
            .and(predicate::str::contains(".opex")),
    );
    let container_name = container.file_name().unwrap().to_string_lossy().into_owned();
    let manifest = fs::read_to_string(container.join(format!("{container_name}.opex"))).unwrap();
    assert!(manifest.contains("<opex:Folder>002-001-001</opex:Folder>"));
    assert!(manifest.contains("<opex:Folder>ao_000552</opex:Folder>"));

    opx(root).arg("status").assert().success().stdout(
        predicate::str::contains("Run started:")
            .and(predicate::str::contains("(removed)"))
            .and(predicate::str::contains("Error log:   0 entries"))
            .and(predicate::str::contains("access_ids.txt (absent)"))
            .and(predicate::str::contains("pres_acc_bag_ids.csv (present)"))
            .and(predicate::str::contains("ao_crosswalk.txt (present)")),
    );
}

// ---------------------------------------------------------------------------
// Guard rails
// ---------------------------------------------------------------------------

#[test]
fn stages_refuse_to_run_before_init() {
    let project = TempDir::new().unwrap();
    opx(project.path())
        .arg("group")
        .assert()
        .failure()
        .stderr(predicate::str::contains("run `opx init` first"));
}

#[test]
fn init_refuses_a_second_run() {
    let project = TempDir::new().unwrap();
    let root = project.path();
    seed_masters(root, &["001-1.tif"]);
    opx(root).arg("init").assert().success();

    // Even with a fresh drop in place, the recorded run state wins.
    fs::create_dir(root.join("preservation_masters")).unwrap();
    opx(root)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn extract_requires_the_intake_stage() {
    let project = TempDir::new().unwrap();
    let root = project.path();
    seed_masters(root, &["001-1.tif"]);
    opx(root).arg("init").assert().success();

    opx(root)
        .arg("extract")
        .assert()
        .failure()
        .stderr(predicate::str::contains("run the `intake` stage first"));
}

#[test]
fn status_reports_an_uninitialized_project() {
    let project = TempDir::new().unwrap();
    opx(project.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Run state: not initialized (run `opx init`).",
        ));
}

#[test]
fn completions_emit_a_bash_script() {
    let project = TempDir::new().unwrap();
    opx(project.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete").and(predicate::str::contains("opx")));
}

#[test]
fn structured_logs_can_be_emitted_as_json() {
    let project = TempDir::new().unwrap();
    let root = project.path();
    seed_masters(root, &["001-1.tif"]);

    let mut cmd = opx(root);
    cmd.env("OPX_LOG", "info");
    cmd.env("OPX_LOG_FORMAT", "json");
    cmd.arg("init").assert().success().stdout(predicate::str::contains(
        r#""message":"masters drop renamed to working container""#,
    ));
}
