//! ovnmig - live cluster network plugin migration.
//!
//! Drives an OpenShift SDN to OVN-Kubernetes (or reverse) migration through
//! the `oc` client:
//! - Version-gated network operator patches with bounded retry
//! - Machine config rollout convergence wait
//! - Staggered master reboots followed by worker reboots
//! - Post-reboot node readiness wait
//! - Independent machine config pool pause/resume

pub mod cluster;
pub mod config;
pub mod error;
pub mod logging;
pub mod migration;
pub mod oc;
pub mod output;

pub use error::{FailureReason, MigrationError};
