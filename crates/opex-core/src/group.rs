//! Asset grouper.
//!
//! The masters drop arrives flat and lexically groupable: files that
//! belong to one asset share the text before the first `-` in their
//! names, so after sorting they sit contiguously and a single pass
//! with one-element lookback partitions them. Each group directory is
//! then renamed `<prefix>-001-NNN`, NNN counting its files.

use crate::container::move_file;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("grouping input is not flat: {} is a directory", .0.display())]
    NotFlat(PathBuf),
    #[error("group directory {} already exists", .0.display())]
    GroupExists(PathBuf),
    #[error("file name {0:?} is not valid UTF-8")]
    NonUtf8Name(OsString),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct GroupReport {
    pub groups_created: usize,
    pub files_moved: usize,
}

/// Directory suffix for a group of `count` files: `-001-001` through
/// `-001-099`, then unpadded past three digits.
#[must_use]
pub fn sequence_suffix(count: usize) -> String {
    if count > 99 {
        format!("-001-{count}")
    } else if count > 9 {
        format!("-001-0{count}")
    } else {
        format!("-001-00{count}")
    }
}

/// Grouping key of a master file name: the text before the first `-`,
/// falling back to the file stem for names without one.
#[must_use]
pub fn group_key(name: &str) -> &str {
    match name.split_once('-') {
        Some((prefix, _)) if !prefix.is_empty() => prefix,
        _ => Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name),
    }
}

/// Partition the flat container into per-asset group directories.
///
/// # Errors
///
/// Returns `NotFlat` when the container already holds a directory,
/// `GroupExists` when a target name is taken, and `NonUtf8Name` for
/// undecodable file names. All three abort the stage and leave the
/// tree as-is for the operator.
pub fn group_masters(container: &Path) -> Result<GroupReport, GroupError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(container)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            return Err(GroupError::NotFlat(entry.path()));
        }
        names.push(
            entry
                .file_name()
                .into_string()
                .map_err(GroupError::NonUtf8Name)?,
        );
    }
    names.sort();

    let mut report = GroupReport::default();
    let mut groups: Vec<(String, usize)> = Vec::new();

    for name in &names {
        let key = group_key(name);
        if groups.last().is_none_or(|(last, _)| last.as_str() != key) {
            let dir = container.join(key);
            if dir.exists() {
                return Err(GroupError::GroupExists(dir));
            }
            fs::create_dir(&dir)?;
            groups.push((key.to_string(), 0));
            report.groups_created += 1;
        }
        if let Some((group, count)) = groups.last_mut() {
            move_file(&container.join(name), &container.join(group.as_str()).join(name))?;
            *count += 1;
            report.files_moved += 1;
        }
    }

    for (key, count) in &groups {
        let finalized = format!("{key}{}", sequence_suffix(*count));
        fs::rename(container.join(key), container.join(&finalized))?;
        debug!(group = %finalized, files = count, "group finalized");
    }

    info!(
        groups = report.groups_created,
        files = report.files_moved,
        "masters grouped"
    );
    Ok(report)
}
