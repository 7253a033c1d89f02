use anyhow::Result;
use opex_core::config::ProjectConfig;
use opex_core::container;
use opex_core::errorlog::ErrorLog;
use opex_core::state::{RunState, StateError};
use std::path::Path;

/// Execute `opx status`. Read-only: takes no lock and touches nothing.
///
/// # Errors
///
/// Returns an error when the run state exists but is corrupt, or a
/// listing fails.
pub fn run_status(project_root: &Path) -> Result<()> {
    let cfg = ProjectConfig::load(project_root)?;

    let run = match RunState::load(project_root) {
        Ok(run) => run,
        Err(StateError::NotInitialized(_)) => {
            println!("Run state: not initialized (run `opx init`).");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    println!("Run started: {}", run.started_at);

    match run.container_id.as_deref() {
        Some(container_id) => {
            let container = project_root.join(container_id);
            if container.is_dir() {
                let assets =
                    container::asset_dirs(&container, run.bundle_staging_id.as_deref())?.len();
                println!("Container:   {container_id}/ ({assets} asset directories)");
            } else {
                println!("Container:   {container_id}/ (missing on disk)");
            }
        }
        None => println!("Container:   -"),
    }

    match run.bundle_staging_id.as_deref() {
        Some(staging_id) => {
            let present = run
                .container_id
                .as_deref()
                .is_some_and(|container_id| project_root.join(container_id).join(staging_id).is_dir());
            let state = if present { "present" } else { "removed" };
            println!("Staging:     {staging_id}/ ({state})");
        }
        None => println!("Staging:     -"),
    }

    let log = ErrorLog::load(project_root)?;
    println!("Error log:   {} entries", log.entries().len());

    let artifacts: Vec<String> = [
        cfg.access_ids_path(),
        cfg.report_path(),
        cfg.ao_crosswalk_path(),
    ]
    .iter()
    .map(|path| {
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let state = if path.is_file() { "present" } else { "absent" };
        format!("{name} ({state})")
    })
    .collect();
    println!("Artifacts:   {}", artifacts.join(", "));
    Ok(())
}
