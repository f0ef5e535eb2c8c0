//! ovnmig - live cluster network plugin migration CLI tool.
//!
//! Subcommands:
//! - `migrate`: patch, wait for rollout, reboot nodes, wait for health
//! - `rollback`: pause or resume a machine config pool

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use ovnmig::config::{Action, Args, Config};
use ovnmig::migration::{
    MigrationRequest, MigrationSettings, Orchestrator, RunReport, RunStatus, set_pool_paused,
};
use ovnmig::oc::{CommandExecutor, DryRunExecutor, OcExecutor, RetryPolicy};
use ovnmig::output::{print_migration_plan, print_rollback_outcome, print_run_report};
use ovnmig::{FailureReason, MigrationError, logging};

const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::from_args(args);

    if let Err(e) = logging::init(&config.log_format, &config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FAILED);
    }

    debug!("Starting ovnmig - network migration tool");

    match run(&config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Token cancelled by the first Ctrl-C. Armed only once work starts, so an
/// interrupt at the confirmation prompt exits the process normally.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling the running command");
            handle.cancel();
        }
    });
    cancel
}

async fn run(config: &Config) -> Result<ExitCode> {
    let oc = OcExecutor::new(config.oc_binary.clone());

    match &config.action {
        Action::Migrate {
            request,
            settings,
            yes,
        } => {
            if settings.dry_run {
                let executor = DryRunExecutor::new(oc);
                let report = migrate(&executor, request, settings, true).await?;
                let recorded = executor.recorded();
                if !recorded.is_empty() {
                    println!();
                    println!("{}", "[DRY RUN] Commands that would run:".yellow());
                    for command in &recorded {
                        println!("  {}", command);
                    }
                }
                Ok(exit_code(&report))
            } else {
                let report = migrate(&oc, request, settings, *yes).await?;
                Ok(exit_code(&report))
            }
        }
        Action::Rollback {
            pool,
            paused,
            retry,
        } => rollback(&oc, pool, *paused, retry).await,
    }
}

async fn migrate(
    executor: &dyn CommandExecutor,
    request: &MigrationRequest,
    settings: &MigrationSettings,
    skip_confirmation: bool,
) -> Result<RunReport> {
    print_migration_plan(request, settings);

    if !skip_confirmation {
        println!();
        println!(
            "{}",
            "This will reconfigure the cluster network and reboot every node."
                .yellow()
                .bold()
        );
        let proceed = Confirm::new()
            .with_prompt("Proceed with migration?")
            .default(false)
            .interact()?;
        if !proceed {
            anyhow::bail!("Migration aborted by user");
        }
    }

    let cancel = interrupt_token();
    let report = Orchestrator::new(executor, settings, cancel).run(request).await;
    print_run_report(&report);
    Ok(report)
}

async fn rollback(
    executor: &dyn CommandExecutor,
    pool: &str,
    paused: bool,
    retry: &RetryPolicy,
) -> Result<ExitCode> {
    let cancel = interrupt_token();
    match set_pool_paused(executor, pool, paused, retry, &cancel).await {
        Ok(outcome) => {
            print_rollback_outcome(&outcome);
            Ok(ExitCode::SUCCESS)
        }
        Err(MigrationError::Cancelled) => Ok(ExitCode::from(EXIT_CANCELLED)),
        Err(e) => Err(e.into()),
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    match report.status {
        RunStatus::Changed | RunStatus::Unchanged => ExitCode::SUCCESS,
        RunStatus::Failed(FailureReason::Cancelled) => ExitCode::from(EXIT_CANCELLED),
        RunStatus::Failed(_) => ExitCode::from(EXIT_FAILED),
    }
}
