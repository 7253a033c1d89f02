#![forbid(unsafe_code)]

mod cmd;

use clap::{CommandFactory, Parser, Subcommand};
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "opx: prepare preservation masters and access bundles for OPEX ingest",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Container",
        about = "Adopt the preservation masters as this run's container",
        long_about = "Rename the flat preservation-masters directory into a timestamped \
                      container and record the run state.",
        after_help = "EXAMPLES:\n    # Start a run in the project directory\n    opx init"
    )]
    Init,

    #[command(
        next_help_heading = "Container",
        about = "Group loose master files into asset directories",
        after_help = "EXAMPLES:\n    # shelf1-001.tif, shelf1-002.tif -> shelf1-001-002/\n    opx group"
    )]
    Group,

    #[command(
        next_help_heading = "Container",
        about = "Create the bundle staging directory inside the container",
        long_about = "Create the staging directory that receives the zipped access bundles. \
                      Drop the bundle archives in before running `opx extract`.",
        after_help = "EXAMPLES:\n    opx intake"
    )]
    Intake,

    #[command(
        next_help_heading = "Bundles",
        about = "Unpack every bundle archive in the staging directory",
        after_help = "EXAMPLES:\n    opx extract"
    )]
    Extract,

    #[command(
        next_help_heading = "Bundles",
        about = "Verify bundle fixity and completeness",
        long_about = "Recompute SHA-256 digests against each bundle's manifest and check \
                      payload completeness. Failures are appended to the validation error \
                      log and those bundles are skipped by later stages.",
        after_help = "EXAMPLES:\n    opx validate"
    )]
    Validate,

    #[command(
        next_help_heading = "Bundles",
        about = "Write the preservation/access reconciliation spreadsheet",
        after_help = "EXAMPLES:\n    opx report && open pres_acc_bag_ids.csv"
    )]
    Report,

    #[command(
        next_help_heading = "Bundles",
        about = "Strip bag scaffolding and rename payloads to their identifiers",
        after_help = "EXAMPLES:\n    opx process"
    )]
    Process,

    #[command(
        next_help_heading = "Bundles",
        about = "Record each bundle's identifier and absolute path",
        after_help = "EXAMPLES:\n    opx crosswalk && cat access_ids.txt"
    )]
    Crosswalk,

    #[command(
        next_help_heading = "Packaging",
        about = "Build representation directories and merge access content in",
        long_about = "Wrap every asset's masters under Representation_Preservation, then \
                      fold each crosswalked access bundle into its asset: descriptive XML \
                      at the asset root, payloads under Representation_Access.",
        after_help = "EXAMPLES:\n    opx merge"
    )]
    Merge,

    #[command(
        next_help_heading = "Packaging",
        about = "Delete the consumed bundle staging directory",
        after_help = "EXAMPLES:\n    opx clean-bundles"
    )]
    CleanBundles,

    #[command(
        next_help_heading = "Packaging",
        about = "Stage and zip each asset into a PAX archive",
        after_help = "EXAMPLES:\n    opx package"
    )]
    Package,

    #[command(
        next_help_heading = "Packaging",
        about = "Sweep asset directories down to their ingest artifacts",
        after_help = "EXAMPLES:\n    opx clean"
    )]
    Clean,

    #[command(
        next_help_heading = "Metadata",
        about = "Emit OPEX metadata",
        long_about = "Emit OPEX metadata at one of three levels: per-asset PAX fragments, \
                      per-archival-object records, or the container transfer manifest."
    )]
    Opex {
        #[command(subcommand)]
        level: OpexLevel,
    },

    #[command(
        next_help_heading = "Project",
        about = "Show run state and which pipeline artifacts exist",
        after_help = "EXAMPLES:\n    opx status"
    )]
    Status,

    #[command(
        next_help_heading = "Project",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    opx completions bash\n    opx completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

#[derive(Subcommand, Debug)]
enum OpexLevel {
    #[command(about = "Write each asset's .pax.zip.opex metadata fragment")]
    Asset,
    #[command(about = "Resolve archival objects, write their .opex, rename asset dirs")]
    Object,
    #[command(about = "Write the container transfer manifest")]
    Container,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("OPX_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "opex_core=debug,opx=debug,info"
        } else {
            "opex_core=info,opx=info,warn"
        })
    });

    let format = env::var("OPX_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;
    debug!(root = %project_root.display(), "project root resolved");

    match cli.command {
        Commands::Init => cmd::init::run_init(&project_root),
        Commands::Group => cmd::group::run_group(&project_root),
        Commands::Intake => cmd::intake::run_intake(&project_root),
        Commands::Extract => cmd::extract::run_extract(&project_root),
        Commands::Validate => cmd::validate::run_validate(&project_root),
        Commands::Report => cmd::report::run_report(&project_root),
        Commands::Process => cmd::process::run_process(&project_root),
        Commands::Crosswalk => cmd::crosswalk::run_crosswalk(&project_root),
        Commands::Merge => cmd::merge::run_merge(&project_root),
        Commands::CleanBundles => cmd::clean_bundles::run_clean_bundles(&project_root),
        Commands::Package => cmd::package::run_package(&project_root),
        Commands::Clean => cmd::clean::run_clean(&project_root),
        Commands::Opex { level } => match level {
            OpexLevel::Asset => cmd::opex::run_asset(&project_root),
            OpexLevel::Object => cmd::opex::run_object(&project_root),
            OpexLevel::Container => cmd::opex::run_container(&project_root),
        },
        Commands::Status => cmd::status::run_status(&project_root),
        Commands::Completions(args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())
        }
    }
}
