use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mediakeep_config::{default_config_path, load_app_config};
use mediakeep_discovery::{Discovery, LocalFileSystem, SharedDiscovery};
use mediakeep_report::{create_report_bundle, ReportInput};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod host;
mod output;
mod shell;

use host::HostCatalog;

#[derive(Parser)]
#[command(name = "mediakeep")]
#[command(author, version, about = "Find media projects across master and backup drives")]
struct Cli {
    /// Configuration file (.yaml, .yml or .json); defaults to $MEDIAKEEP_CONFIG or ./mediakeep.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat every resolved drive as reachable without probing it
    #[arg(long, global = true)]
    test_mode: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve configured slots against attached drives
    Storage,

    /// List projects on every master and backup drive
    Projects {
        /// Rescan even if nothing changed
        #[arg(short, long)]
        force: bool,

        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Show every drive holding a project
    Find { name: String },

    /// Write a report bundle
    Report {
        #[arg(long, default_value = ".")]
        base: PathBuf,
    },

    /// Interactive session sharing one cache
    Shell,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_app_config(&config_path)?;
    let test_mode = cli.test_mode || config.test_mode;
    if test_mode {
        tracing::info!("test mode: drive reachability probing disabled");
    }

    let discovery = Discovery::new(HostCatalog, LocalFileSystem::new()).test_mode(test_mode);
    let shared = SharedDiscovery::new(discovery, config.storage);
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Storage => {
            let statuses = shared.confirm_storage()?;
            shared.with_state(|state| output::write_storage(&mut stdout, &statuses, &state.validation))
        }
        Commands::Projects { force, json } => {
            let view = shared.get_projects(force)?;
            if json {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&view)?)?;
                Ok(())
            } else {
                output::write_projects(&mut stdout, &view)
            }
        }
        Commands::Find { name } => {
            let view = shared.get_projects(false)?;
            output::write_matches(&mut stdout, &name, &view)
        }
        Commands::Report { base } => {
            let catalog = host::build_catalog()?;
            let view = shared.get_projects(true)?;
            let statuses = shared.confirm_storage()?;
            let report = shared.with_state(|state| {
                create_report_bundle(
                    &base,
                    &catalog,
                    ReportInput {
                        projects: &view,
                        storage: &statuses,
                        validation: &state.validation,
                        meta: Some(serde_json::json!({
                            "config": config_path.display().to_string(),
                            "test_mode": test_mode,
                        })),
                    },
                )
            })?;
            writeln!(stdout, "report_root: {}", report.root.display())?;
            writeln!(stdout, "catalog: {}", report.catalog_json.display())?;
            writeln!(stdout, "projects: {}", report.projects_json.display())?;
            writeln!(stdout, "storage: {}", report.storage_json.display())?;
            writeln!(stdout, "run_json: {}", report.run_json.display())?;
            Ok(())
        }
        Commands::Shell => {
            let stdin = std::io::stdin().lock();
            shell::run_shell(&shared, stdin, &mut stdout)
        }
    }
}
