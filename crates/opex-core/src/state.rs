//! Run state store.
//!
//! One pipeline run is tracked by `run_state.json` at the project root.
//! The record is append-in-order: `started_at` is written once by the
//! init stage, then `container_id` and `bundle_staging_id` are each
//! recorded exactly once as the matching directory comes into being.
//! Later stages read the record to locate the working tree, so a field
//! set twice or out of order means a stage was re-run against a tree
//! that has already moved on. Those conditions fail loudly and leave
//! the file alone for the operator.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the run state file at the project root.
pub const STATE_FILE: &str = "run_state.json";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no run is initialized under {} (run `opx init` first)", .0.display())]
    NotInitialized(PathBuf),
    #[error("a run is already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),
    #[error("run state has no `{field}` yet; run the `{stage}` stage first")]
    MissingPriorField {
        field: &'static str,
        stage: &'static str,
    },
    #[error("run state field `{field}` is already set to `{value}`")]
    FieldAlreadySet { field: &'static str, value: String },
    #[error("run state file {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("cannot encode run state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The on-disk record of a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Timestamp the run was initialized with, `%Y-%m-%d_%H-%M-%S`.
    pub started_at: String,
    /// Name of the working container directory under the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Name of the bundle staging directory under the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_staging_id: Option<String>,
}

/// Format `now` the way run directories and the state record expect.
#[must_use]
pub fn run_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Container directory name for a run timestamp.
#[must_use]
pub fn container_name(started_at: &str) -> String {
    format!("container_{started_at}")
}

/// Bundle staging directory name for a run timestamp.
#[must_use]
pub fn staging_name(started_at: &str) -> String {
    format!("bundles_{started_at}")
}

impl RunState {
    /// Initialize a new run record under `root`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if a record already exists.
    pub fn init(root: &Path, started_at: String) -> Result<Self, StateError> {
        let path = root.join(STATE_FILE);
        if path.exists() {
            return Err(StateError::AlreadyInitialized(path));
        }
        let state = Self {
            started_at,
            container_id: None,
            bundle_staging_id: None,
        };
        state.save(root)?;
        debug!(started_at = %state.started_at, "initialized run state");
        Ok(state)
    }

    /// Load the run record from `root`.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` when the file is absent and `Corrupt`
    /// when it does not parse as a valid record.
    pub fn load(root: &Path) -> Result<Self, StateError> {
        let path = root.join(STATE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::NotInitialized(root.to_path_buf()));
            }
            Err(err) => return Err(StateError::Io(err)),
        };
        let state: Self = serde_json::from_str(&content).map_err(|err| StateError::Corrupt {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        if state.started_at.is_empty() {
            return Err(StateError::Corrupt {
                path,
                reason: "empty `started_at`".to_string(),
            });
        }
        if state.bundle_staging_id.is_some() && state.container_id.is_none() {
            return Err(StateError::Corrupt {
                path,
                reason: "`bundle_staging_id` recorded before `container_id`".to_string(),
            });
        }
        Ok(state)
    }

    /// Record the container directory name. Write-once.
    ///
    /// # Errors
    ///
    /// Returns `FieldAlreadySet` if a container is already recorded.
    pub fn mark_container(&mut self, root: &Path, container_id: String) -> Result<(), StateError> {
        if let Some(existing) = &self.container_id {
            return Err(StateError::FieldAlreadySet {
                field: "container_id",
                value: existing.clone(),
            });
        }
        self.container_id = Some(container_id);
        self.save(root)
    }

    /// Record the bundle staging directory name. Write-once, and only
    /// after the container is recorded.
    ///
    /// # Errors
    ///
    /// Returns `MissingPriorField` before `mark_container` has run and
    /// `FieldAlreadySet` if staging is already recorded.
    pub fn mark_bundle_staging(
        &mut self,
        root: &Path,
        bundle_staging_id: String,
    ) -> Result<(), StateError> {
        if self.container_id.is_none() {
            return Err(StateError::MissingPriorField {
                field: "container_id",
                stage: "init",
            });
        }
        if let Some(existing) = &self.bundle_staging_id {
            return Err(StateError::FieldAlreadySet {
                field: "bundle_staging_id",
                value: existing.clone(),
            });
        }
        self.bundle_staging_id = Some(bundle_staging_id);
        self.save(root)
    }

    /// Container directory name, or the error telling the operator
    /// which stage to run.
    ///
    /// # Errors
    ///
    /// Returns `MissingPriorField` when `init` has not recorded one.
    pub fn require_container(&self) -> Result<&str, StateError> {
        self.container_id
            .as_deref()
            .ok_or(StateError::MissingPriorField {
                field: "container_id",
                stage: "init",
            })
    }

    /// Bundle staging directory name, or the stage to run first.
    ///
    /// # Errors
    ///
    /// Returns `MissingPriorField` when `intake` has not recorded one.
    pub fn require_bundle_staging(&self) -> Result<&str, StateError> {
        self.bundle_staging_id
            .as_deref()
            .ok_or(StateError::MissingPriorField {
                field: "bundle_staging_id",
                stage: "intake",
            })
    }

    fn save(&self, root: &Path) -> Result<(), StateError> {
        let path = root.join(STATE_FILE);
        let tmp = root.join(format!("{STATE_FILE}.tmp"));
        let mut encoded = serde_json::to_string_pretty(self).map_err(StateError::Encode)?;
        encoded.push('\n');
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
