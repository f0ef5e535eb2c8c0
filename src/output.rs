//! Terminal output for migration plans and run reports.

use colored::Colorize;

use crate::migration::orchestrator::{MigrationRequest, MigrationSettings};
use crate::migration::{RebootOutcome, RollbackOutcome, RunReport, RunStatus};

/// Print what a migrate run is about to do.
pub fn print_migration_plan(request: &MigrationRequest, settings: &MigrationSettings) {
    println!();
    println!("{}", "Migration Plan:".bold());
    println!("{}", "-".repeat(40));
    println!("  Target plugin:   {}", request.plugin_type.to_string().cyan());
    println!(
        "  Plugin params:   {}",
        if request.plugin_params.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            format_params(request)
        }
    );
    println!(
        "  Keep unmigrated: egressIP={} egressFirewall={} multicast={}",
        request.features.egress_ip, request.features.egress_firewall, request.features.multicast
    );
    println!(
        "  Reboot delays:   first master +{}m, +{}m per further master",
        settings.reboot.base_delay_minutes, settings.reboot.delay_increment_minutes
    );
    println!(
        "  Rollout timeout: {}s, health timeout: {}s",
        settings.rollout_poll.timeout.as_secs(),
        settings.health.readiness.timeout.as_secs()
    );
    if request.trigger_network_type {
        println!("  Network type:    will be applied after rollout");
    }
    if settings.dry_run {
        println!("  {}", "[DRY RUN] No changes will be applied".yellow());
    }
}

fn format_params(request: &MigrationRequest) -> String {
    let params = &request.plugin_params;
    let mut parts = Vec::new();
    if let Some(mtu) = params.mtu {
        parts.push(format!("mtu={}", mtu));
    }
    if let Some(port) = params.tunnel_port {
        parts.push(format!("tunnelPort={}", port));
    }
    if let Some(subnet) = &params.internal_subnet {
        parts.push(format!("internalSubnet={}", subnet));
    }
    parts.join(" ")
}

fn format_delay(delay_minutes: Option<u32>) -> String {
    delay_minutes
        .map(|d| format!("+{}m", d))
        .unwrap_or_else(|| "-".to_string())
}

/// Print the terminal state, reboot schedule and captured outputs of a run.
pub fn print_run_report(report: &RunReport) {
    println!();
    println!("{}", "Migration Report:".bold());
    println!("{}", "-".repeat(40));

    let state = match report.status {
        RunStatus::Changed => report.state.to_string().green(),
        RunStatus::Unchanged => report.state.to_string().yellow(),
        RunStatus::Failed(_) => report.state.to_string().red(),
    };
    println!("  State:    {}", state.bold());
    println!(
        "  Path:     {}",
        report
            .transitions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!(
        "  Started:  {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(secs) = report.duration_secs() {
        println!("  Duration: {}m {}s", secs / 60, secs % 60);
    }

    if !report.notes.is_empty() {
        println!();
        println!("Notes:");
        for note in &report.notes {
            println!("  {} {}", "ℹ".blue(), note);
        }
    }

    if !report.reboots.is_empty() {
        println!();
        println!("Reboot schedule:");
        for record in &report.reboots {
            let icon = match record.outcome {
                RebootOutcome::Issued => "✓".green(),
                RebootOutcome::AgentNotFound => "⚠".yellow(),
                RebootOutcome::Failed(_) => "✗".red(),
            };
            let detail = match &record.outcome {
                RebootOutcome::Issued => String::new(),
                RebootOutcome::AgentNotFound => " (no agent pod, skipped)".to_string(),
                RebootOutcome::Failed(e) => format!(" ({})", e),
            };
            println!(
                "  {} {:<8} {:<40} {:>5}{}",
                icon,
                record.role.to_string(),
                record.node,
                format_delay(record.delay_minutes),
                detail.dimmed()
            );
        }
    }

    if !report.outputs.is_empty() {
        println!();
        println!("Command output:");
        for output in &report.outputs {
            println!("  [{}] {}", output.step.bold(), output.command.dimmed());
            if !output.stdout.is_empty() {
                println!("    {}", output.stdout.trim());
            }
        }
    }

    println!();
    if report.is_failed() {
        println!("{}", report.message.red().bold());
        if let Some(err) = &report.last_error {
            println!("  Last error: {}", err);
        }
    } else {
        println!("{}", report.message.green().bold());
    }
}

pub fn print_rollback_outcome(outcome: &RollbackOutcome) {
    let verb = if outcome.paused { "paused" } else { "resumed" };
    println!(
        "{} MachineConfigPool {} {}",
        "✓".green(),
        outcome.pool.bold(),
        verb
    );
    if !outcome.stdout.is_empty() {
        println!("  {}", outcome.stdout.trim().dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::network::{PluginParams, PluginType};

    #[test]
    fn test_format_delay() {
        assert_eq!(format_delay(Some(11)), "+11m");
        assert_eq!(format_delay(None), "-");
    }

    #[test]
    fn test_format_params_only_set_values() {
        let request = MigrationRequest {
            plugin_params: PluginParams {
                mtu: Some(1400),
                internal_subnet: Some("100.64.0.0/16".to_string()),
                ..Default::default()
            },
            ..MigrationRequest::new(PluginType::OvnKubernetes)
        };
        assert_eq!(format_params(&request), "mtu=1400 internalSubnet=100.64.0.0/16");
    }
}
