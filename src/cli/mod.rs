//! Command line front end for the `bong` binary.

mod progress;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::api::{RemoteCatalog, ReqwestTransport, ResponseCache, ServiceClient, build_http_client};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::error::Result;
use crate::logging;
use crate::run::Agent;
use crate::singleton::InstanceGuard;
use crate::transfer::HttpTransfer;

pub use progress::{BarProgress, log_summary, print_catalog};

/// Downloads finished recordings from bong.tv and deletes them remotely.
#[derive(Debug, Parser)]
#[command(name = "bong", version, about)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Synchronise and download until nothing is left (default).
    Run,
    /// Check the configured credentials.
    Check,
    /// Show the local catalog.
    List,
    /// Write a configuration template.
    Init,
}

/// Parses the command line and runs the selected command.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Before logging is set up nothing would reach the terminal.
            if log::max_level() == log::LevelFilter::Off {
                eprintln!("Error: {e}");
            } else {
                log::error!("{e}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let path = cli.config.unwrap_or_else(AppConfig::default_path);
    let command = cli.command.unwrap_or(Command::Run);

    if command == Command::Init {
        if AppConfig::write_template(&path)? {
            println!("Wrote {}", path.display());
        } else {
            println!("{} already exists, left unchanged", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = AppConfig::load(&path)?;
    logging::init(
        cli.verbose || config.options.verbose,
        config.paths.log_file.as_deref(),
    )?;

    if command == Command::List {
        let catalog = Catalog::open(&config.paths.database())?;
        print_catalog(&catalog.entries()?);
        return Ok(ExitCode::SUCCESS);
    }

    let _guard = InstanceGuard::acquire(config.options.instance_port)?;
    log::info!("bong-dl {} starting", env!("CARGO_PKG_VERSION"));
    for (name, value) in config.summary() {
        log::info!("  {name}: {value}");
    }
    config.validate()?;

    let http = build_http_client(&config.transfer.user_agent, config.transfer.timeout())?;
    let cache = ResponseCache::new(&config.paths.data_dir, config.options.cache_lifespan());
    let mut remote = ServiceClient::new(ReqwestTransport::new(http.clone()), &config.service, cache);

    if command == Command::Check {
        return Ok(match remote.check_credentials().await {
            Ok(()) => {
                println!("Credentials accepted.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("invalid credentials: {e}");
                ExitCode::FAILURE
            }
        });
    }

    let mut catalog = Catalog::open(&config.paths.database())?;
    let mut transfer = HttpTransfer::new(http, config.transfer.clone());
    // Bars only when log lines do not share the terminal.
    if std::io::stderr().is_terminal() && config.paths.log_file.is_some() {
        transfer = transfer.with_progress(Arc::new(BarProgress::new()));
    }

    let report = Agent::new(
        &mut catalog,
        &mut remote,
        &transfer,
        config.paths.recordings_dir.clone(),
    )
    .run()
    .await;
    log_summary(&report);

    Ok(if report.outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
