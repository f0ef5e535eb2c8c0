//! CLI configuration and argument parsing.

use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::cluster::network::{MigrationFeatureSet, PluginParams, PluginType};
use crate::migration::health::HealthSettings;
use crate::migration::orchestrator::{DEFAULT_ROLLOUT_CHECK_TIMEOUT_SECS, MigrationRequest};
use crate::migration::{MigrationSettings, RebootSettings};
use crate::oc::{PollConfig, RetryPolicy};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Interval between cluster version queries while the API is unreachable.
const VERSION_QUERY_INTERVAL_SECS: u64 = 5;

/// Live OpenShift SDN to OVN-Kubernetes network migration CLI tool.
///
/// Patches the cluster network operator, waits for machine config rollout,
/// then reboots masters one at a time followed by all workers.
#[derive(Parser, Debug, Clone)]
#[command(name = "ovnmig")]
#[command(about = "Live cluster network plugin migration CLI tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the oc binary
    #[arg(long, global = true, default_value = "oc", env = "OVNMIG_OC_BINARY")]
    pub oc_binary: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "OVNMIG_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (pretty, json)
    #[arg(long, global = true, default_value = "pretty", env = "OVNMIG_LOG_FORMAT")]
    pub log_format: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Migrate the cluster network plugin
    Migrate(MigrateArgs),
    /// Pause or resume a machine config pool
    Rollback(RollbackArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Target network plugin
    #[arg(long, value_enum, default_value = "OVNKubernetes")]
    pub network_type: PluginType,

    /// MTU of the target overlay network
    #[arg(long)]
    pub mtu: Option<u32>,

    /// Overlay tunnel port (geneve for OVNKubernetes, vxlan for OpenShiftSDN)
    #[arg(long)]
    pub tunnel_port: Option<u16>,

    /// OVN internal IPv4 join subnet (OVNKubernetes only)
    #[arg(long)]
    pub internal_subnet: Option<String>,

    /// Keep egress IP configuration out of automatic migration
    #[arg(long)]
    pub egress_ip: Option<bool>,

    /// Keep egress firewall configuration out of automatic migration
    #[arg(long)]
    pub egress_firewall: Option<bool>,

    /// Keep multicast configuration out of automatic migration
    #[arg(long)]
    pub multicast: Option<bool>,

    /// Attempts per network operator patch
    #[arg(long, default_value = "3")]
    pub patch_retries: u32,

    /// Seconds between patch attempts
    #[arg(long, default_value = "5")]
    pub patch_retry_delay: u64,

    /// Seconds to keep retrying the cluster version query
    #[arg(long, default_value = "120")]
    pub version_timeout: u64,

    /// Seconds to wait for machine config pools to converge
    #[arg(long, default_value = "2700")]
    pub rollout_timeout: u64,

    /// Seconds between rollout checks
    #[arg(long, default_value = "10")]
    pub rollout_interval: u64,

    /// Reboot delay of the first master, in minutes
    #[arg(long, default_value = "1")]
    pub reboot_base_delay: u32,

    /// Extra reboot delay added for each further master, in minutes
    #[arg(long, default_value = "3")]
    pub reboot_delay_increment: u32,

    /// Attempts per reboot command
    #[arg(long, default_value = "5")]
    pub reboot_retries: u32,

    /// Seconds between reboot command attempts
    #[arg(long, default_value = "3")]
    pub reboot_retry_interval: u64,

    /// Seconds to wait for all nodes to become Ready after reboot
    #[arg(long, default_value = "2700")]
    pub health_timeout: u64,

    /// Seconds between node readiness checks
    #[arg(long, default_value = "10")]
    pub health_interval: u64,

    /// Daemonset whose pods execute reboots on each node
    #[arg(long, default_value = "machine-config-daemon")]
    pub agent_daemonset: String,

    /// Namespace of the agent daemonset
    #[arg(long, default_value = "openshift-machine-config-operator")]
    pub agent_namespace: String,

    /// Also set networkType on the cluster network config after rollout
    #[arg(long, default_value = "false")]
    pub trigger_network_type: bool,

    /// Issue worker reboot commands concurrently
    #[arg(long, default_value = "false")]
    pub parallel_workers: bool,

    /// Print the commands that would change the cluster without running them
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long, default_value = "false")]
    pub yes: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RollbackArgs {
    /// Machine config pool name
    #[arg(long, required = true)]
    pub pool: String,

    /// Desired paused state (true or false)
    #[arg(long, action = clap::ArgAction::Set, required = true)]
    pub paused: bool,

    /// Patch attempts
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Seconds between attempts
    #[arg(long, default_value = "5")]
    pub retry_delay: u64,
}

/// What the binary was asked to do, with typed settings.
#[derive(Debug, Clone)]
pub enum Action {
    Migrate {
        request: MigrationRequest,
        settings: MigrationSettings,
        yes: bool,
    },
    Rollback {
        pool: String,
        paused: bool,
        retry: RetryPolicy,
    },
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub oc_binary: String,
    pub log_level: String,
    pub log_format: String,
    pub action: Action,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        let action = match args.command {
            Command::Migrate(m) => Action::Migrate {
                request: MigrationRequest {
                    plugin_type: m.network_type,
                    plugin_params: PluginParams {
                        mtu: m.mtu,
                        tunnel_port: m.tunnel_port,
                        internal_subnet: m.internal_subnet.clone(),
                    },
                    features: MigrationFeatureSet::from_overrides(
                        m.egress_ip,
                        m.egress_firewall,
                        m.multicast,
                    ),
                    trigger_network_type: m.trigger_network_type,
                },
                settings: migration_settings(&m),
                yes: m.yes,
            },
            Command::Rollback(r) => Action::Rollback {
                pool: r.pool,
                paused: r.paused,
                retry: RetryPolicy::new(r.retries, Duration::from_secs(r.retry_delay)),
            },
        };

        Self {
            oc_binary: args.oc_binary,
            log_level: args.log_level,
            log_format: args.log_format,
            action,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(&self.action, Action::Migrate { settings, .. } if settings.dry_run)
    }
}

fn migration_settings(m: &MigrateArgs) -> MigrationSettings {
    MigrationSettings {
        patch_retry: RetryPolicy::new(m.patch_retries, Duration::from_secs(m.patch_retry_delay)),
        version_poll: PollConfig::from_secs(m.version_timeout, VERSION_QUERY_INTERVAL_SECS),
        rollout_poll: PollConfig::from_secs(m.rollout_timeout, m.rollout_interval),
        rollout_check_timeout_secs: DEFAULT_ROLLOUT_CHECK_TIMEOUT_SECS,
        reboot: RebootSettings {
            namespace: m.agent_namespace.clone(),
            daemonset: m.agent_daemonset.clone(),
            base_delay_minutes: m.reboot_base_delay,
            delay_increment_minutes: m.reboot_delay_increment,
            issue_retry: RetryPolicy::new(
                m.reboot_retries,
                Duration::from_secs(m.reboot_retry_interval),
            ),
            parallel_workers: m.parallel_workers,
        },
        health: HealthSettings {
            readiness: PollConfig::from_secs(m.health_timeout, m.health_interval),
            ..Default::default()
        },
        dry_run: m.dry_run,
    }
}
