//! Project configuration.
//!
//! `opexprep.toml` lives at the project root next to the masters drop.
//! Every field has a default, so an empty (or absent) file yields a
//! fully working configuration for the common Islandora delivery shape.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the config file at the project root.
pub const CONFIG_FILE: &str = "opexprep.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root the config was loaded from. Not part of the file.
    #[serde(skip)]
    pub root: PathBuf,

    /// Directory name of the flat preservation-master drop.
    #[serde(default = "default_masters_dir")]
    pub masters_dir: String,

    /// Repository-noise file names stripped from every bundle payload.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    /// Content-role prefixes that mark a payload file, highest priority
    /// first.
    #[serde(default = "default_role_prefixes")]
    pub role_prefixes: Vec<String>,

    /// File name of the canonical descriptive record inside a bundle.
    #[serde(default = "default_mods_filename")]
    pub mods_filename: String,

    /// File name of the secondary descriptive record used for titles
    /// and ingest identifiers.
    #[serde(default = "default_dc_filename")]
    pub dc_filename: String,

    /// Identifiers starting with this prefix are emitted with the
    /// `code` identifier type instead of a `label:value` split.
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,

    /// Root-relative path of the identifier-to-bundle crosswalk.
    #[serde(default = "default_access_ids_file")]
    pub access_ids_file: String,

    /// Root-relative path of the reconciliation report.
    #[serde(default = "default_report_file")]
    pub report_file: String,

    /// Root-relative path of the archival-object crosswalk consumed by
    /// `opx opex object`.
    #[serde(default = "default_ao_crosswalk_file")]
    pub ao_crosswalk_file: String,
}

fn default_masters_dir() -> String {
    "preservation_masters".to_string()
}

fn default_denylist() -> Vec<String> {
    [
        "foo.xml",
        "foxml.xml",
        "JP2.jp2",
        "JPG.jpg",
        "POLICY.xml",
        "PREVIEW.jpg",
        "RELS-EXT.rdf",
        "RELS-INT.rdf",
        "TN.jpg",
        "HOCR.html",
        "OCR.txt",
        "MP4.mp4",
        "PROXY_MP3.mp3",
    ]
    .map(String::from)
    .to_vec()
}

fn default_role_prefixes() -> Vec<String> {
    ["OBJ", "PDF", "MKV"].map(String::from).to_vec()
}

fn default_mods_filename() -> String {
    "MODS.xml".to_string()
}

fn default_dc_filename() -> String {
    "DC.xml".to_string()
}

fn default_code_prefix() -> String {
    "ur".to_string()
}

fn default_access_ids_file() -> String {
    "access_ids.txt".to_string()
}

fn default_report_file() -> String {
    "pres_acc_bag_ids.csv".to_string()
}

fn default_ao_crosswalk_file() -> String {
    "ao_crosswalk.txt".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            masters_dir: default_masters_dir(),
            denylist: default_denylist(),
            role_prefixes: default_role_prefixes(),
            mods_filename: default_mods_filename(),
            dc_filename: default_dc_filename(),
            code_prefix: default_code_prefix(),
            access_ids_file: default_access_ids_file(),
            report_file: default_report_file(),
            ao_crosswalk_file: default_ao_crosswalk_file(),
        }
    }
}

impl ProjectConfig {
    /// Load the config from `<root>/opexprep.toml`, falling back to
    /// defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is
    /// not valid TOML.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let mut cfg = if path.is_file() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("cannot parse {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.root = root.to_path_buf();
        Ok(cfg)
    }

    /// Config with defaults rooted at `root`, bypassing the file.
    #[must_use]
    pub fn with_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn masters_path(&self) -> PathBuf {
        self.root.join(&self.masters_dir)
    }

    #[must_use]
    pub fn access_ids_path(&self) -> PathBuf {
        self.root.join(&self.access_ids_file)
    }

    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.root.join(&self.report_file)
    }

    #[must_use]
    pub fn ao_crosswalk_path(&self) -> PathBuf {
        self.root.join(&self.ao_crosswalk_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.masters_dir, "preservation_masters");
        assert_eq!(cfg.role_prefixes, vec!["OBJ", "PDF", "MKV"]);
        assert_eq!(cfg.denylist.len(), 13);
        assert_eq!(cfg.root, dir.path());
    }

    #[test]
    fn load_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "masters_dir = \"tiffs\"\nrole_prefixes = [\"MASTER\"]\n",
        )
        .unwrap();
        let cfg = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.masters_dir, "tiffs");
        assert_eq!(cfg.role_prefixes, vec!["MASTER"]);
        assert_eq!(cfg.mods_filename, "MODS.xml");
        assert_eq!(cfg.masters_path(), dir.path().join("tiffs"));
    }

    #[test]
    fn load_rejects_bad_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "masters_dir = [not toml").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn paths_are_root_relative() {
        let cfg = ProjectConfig::with_root(Path::new("/proj"));
        assert_eq!(cfg.access_ids_path(), Path::new("/proj/access_ids.txt"));
        assert_eq!(cfg.report_path(), Path::new("/proj/pres_acc_bag_ids.csv"));
        assert_eq!(cfg.ao_crosswalk_path(), Path::new("/proj/ao_crosswalk.txt"));
    }
}
