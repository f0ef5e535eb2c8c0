//! Staggered, role-ordered node reboots through the node-local agent.
//!
//! Masters are processed first, one at a time, each with a reboot delay one
//! increment larger than the previous master's so that at most one control
//! plane node is down at once. Workers all share the final master delay.

use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::types::{RebootOutcome, RebootRecord};
use crate::cluster::agent::{AgentPod, agent_for_node, list_agent_pods_command, parse_agent_pods};
use crate::cluster::nodes::{ClusterNode, NodeRole, list_nodes_command, nodes_with_role, parse_node_list};
use crate::error::MigrationError;
use crate::oc::{CommandExecutor, OcCommand, RetryPolicy, run_with_retries};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootSettings {
    /// Namespace of the agent daemonset.
    pub namespace: String,
    /// Agent pods are recognised by this name prefix.
    pub daemonset: String,
    pub base_delay_minutes: u32,
    pub delay_increment_minutes: u32,
    /// Applies to issuing each reboot command and to node/pod listings.
    pub issue_retry: RetryPolicy,
    pub parallel_workers: bool,
}

impl Default for RebootSettings {
    fn default() -> Self {
        Self {
            namespace: "openshift-machine-config-operator".to_string(),
            daemonset: "machine-config-daemon".to_string(),
            base_delay_minutes: 1,
            delay_increment_minutes: 3,
            issue_retry: RetryPolicy::new(5, Duration::from_secs(3)),
            parallel_workers: false,
        }
    }
}

/// Reboot delay bookkeeping across the master loop.
#[derive(Debug, Clone)]
pub struct DelaySchedule {
    current: u32,
    increment: u32,
    masters_scheduled: u32,
}

impl DelaySchedule {
    pub fn new(base_minutes: u32, increment_minutes: u32) -> Self {
        Self {
            current: base_minutes,
            increment: increment_minutes,
            masters_scheduled: 0,
        }
    }

    /// Delay for the next master. The first master gets the base delay.
    pub fn next_master(&mut self) -> u32 {
        if self.masters_scheduled > 0 {
            self.current += self.increment;
        }
        self.masters_scheduled += 1;
        self.current
    }

    /// Delay shared by every worker: the largest master delay reached.
    pub fn worker_delay(&self) -> u32 {
        self.current
    }
}

/// `shutdown -r +<delay>` on the node's root filesystem, through its agent.
pub fn reboot_command(namespace: &str, pod: &str, delay_minutes: u32) -> OcCommand {
    let delay = format!("+{}", delay_minutes);
    OcCommand::rsh(
        namespace,
        pod,
        &["chroot", "/rootfs", "shutdown", "-r", delay.as_str()],
    )
}

/// Issue one reboot command, retrying the issuance (not the reboot itself).
async fn issue_reboot(
    executor: &dyn CommandExecutor,
    settings: &RebootSettings,
    pod: &AgentPod,
    delay_minutes: u32,
    cancel: &CancellationToken,
) -> Result<(), MigrationError> {
    let command = reboot_command(&settings.namespace, &pod.name, delay_minutes);

    match run_with_retries(executor, &command, &settings.issue_retry, cancel).await {
        Ok(_) => {
            info!(
                node = %pod.node_name,
                delay_minutes,
                "Reboot command sent to node"
            );
            Ok(())
        }
        Err(MigrationError::CommandFailed {
            attempts, stderr, ..
        }) => Err(MigrationError::RebootIssuanceFailure {
            node: pod.node_name.clone(),
            attempts,
            stderr,
        }),
        Err(e) => Err(e),
    }
}

/// Walks masters then workers and records what happened to each node.
pub struct NodeRebootSequencer<'a> {
    executor: &'a dyn CommandExecutor,
    settings: &'a RebootSettings,
    cancel: &'a CancellationToken,
    records: Vec<RebootRecord>,
}

impl<'a> NodeRebootSequencer<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        settings: &'a RebootSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            executor,
            settings,
            cancel,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[RebootRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RebootRecord> {
        self.records
    }

    /// Schedule reboots for every master and worker.
    ///
    /// Returns the largest delay handed out, in minutes. A master that cannot
    /// be rebooted aborts the sequence before any worker is touched; worker
    /// failures are recorded and skipped.
    pub async fn run(&mut self) -> Result<u32, MigrationError> {
        let nodes = self.list_nodes().await?;
        let masters = nodes_with_role(&nodes, NodeRole::Master);
        let workers = nodes_with_role(&nodes, NodeRole::Worker);
        info!(
            masters = masters.len(),
            workers = workers.len(),
            base_delay_minutes = self.settings.base_delay_minutes,
            increment_minutes = self.settings.delay_increment_minutes,
            "Starting node reboot sequence"
        );

        let mut schedule = DelaySchedule::new(
            self.settings.base_delay_minutes,
            self.settings.delay_increment_minutes,
        );

        let master_agents = self.list_agents().await?;
        for node in masters {
            let Some(pod) = self.resolve(&master_agents, node) else {
                continue;
            };
            let delay = schedule.next_master();
            info!(node = %node.name, delay_minutes = delay, "Rebooting master node");

            if let Err(e) = issue_reboot(self.executor, self.settings, pod, delay, self.cancel).await
            {
                self.record(node, Some(delay), RebootOutcome::Failed(e.to_string()));
                error!(node = %node.name, error = %e, "Master reboot could not be issued, aborting sequence");
                return Err(e);
            }
            self.record(node, Some(delay), RebootOutcome::Issued);
        }

        let delay = schedule.worker_delay();
        if workers.is_empty() {
            return Ok(delay);
        }

        let worker_agents = match self.list_agents().await {
            Ok(agents) => agents,
            Err(MigrationError::Cancelled) => return Err(MigrationError::Cancelled),
            Err(e) => {
                error!(error = %e, "Failed to list agent pods, no worker reboots issued");
                for node in workers {
                    self.record(node, None, RebootOutcome::Failed(e.to_string()));
                }
                return Ok(delay);
            }
        };

        let targets: Vec<(&ClusterNode, &AgentPod)> = workers
            .into_iter()
            .filter_map(|node| self.resolve(&worker_agents, node).map(|pod| (node, pod)))
            .collect();

        if self.settings.parallel_workers {
            self.reboot_workers_parallel(&targets, delay).await?;
        } else {
            for (node, pod) in &targets {
                info!(node = %node.name, delay_minutes = delay, "Rebooting worker node");
                let result =
                    issue_reboot(self.executor, self.settings, pod, delay, self.cancel).await;
                self.record_worker(node, delay, result)?;
            }
        }

        Ok(delay)
    }

    async fn reboot_workers_parallel(
        &mut self,
        targets: &[(&ClusterNode, &AgentPod)],
        delay: u32,
    ) -> Result<(), MigrationError> {
        info!(
            count = targets.len(),
            delay_minutes = delay,
            "Rebooting worker nodes in parallel"
        );
        let executor = self.executor;
        let settings = self.settings;
        let cancel = self.cancel;

        let results = join_all(
            targets
                .iter()
                .map(|(_, pod)| issue_reboot(executor, settings, pod, delay, cancel)),
        )
        .await;

        let mut cancelled = false;
        for ((node, _), result) in targets.iter().zip(results) {
            if let Err(MigrationError::Cancelled) = self.record_worker(node, delay, result) {
                cancelled = true;
            }
        }
        if cancelled {
            return Err(MigrationError::Cancelled);
        }
        Ok(())
    }

    /// Record a worker result. Only cancellation propagates.
    fn record_worker(
        &mut self,
        node: &ClusterNode,
        delay: u32,
        result: Result<(), MigrationError>,
    ) -> Result<(), MigrationError> {
        match result {
            Ok(()) => {
                self.record(node, Some(delay), RebootOutcome::Issued);
                Ok(())
            }
            Err(MigrationError::Cancelled) => {
                self.record(node, Some(delay), RebootOutcome::Failed("cancelled".to_string()));
                Err(MigrationError::Cancelled)
            }
            Err(e) => {
                warn!(node = %node.name, error = %e, "Worker reboot could not be issued, continuing");
                self.record(node, Some(delay), RebootOutcome::Failed(e.to_string()));
                Ok(())
            }
        }
    }

    fn resolve<'p>(&mut self, agents: &'p [AgentPod], node: &ClusterNode) -> Option<&'p AgentPod> {
        let pod = agent_for_node(agents, &node.name);
        if pod.is_none() {
            warn!(
                node = %node.name,
                daemonset = %self.settings.daemonset,
                "No agent pod found on node, skipping"
            );
            self.record(node, None, RebootOutcome::AgentNotFound);
        }
        pod
    }

    fn record(&mut self, node: &ClusterNode, delay_minutes: Option<u32>, outcome: RebootOutcome) {
        self.records.push(RebootRecord {
            node: node.name.clone(),
            role: node.role.unwrap_or(NodeRole::Worker),
            delay_minutes,
            outcome,
        });
    }

    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, MigrationError> {
        let stdout = run_with_retries(
            self.executor,
            &list_nodes_command(),
            &self.settings.issue_retry,
            self.cancel,
        )
        .await?;
        parse_node_list(&stdout)
    }

    async fn list_agents(&self) -> Result<Vec<AgentPod>, MigrationError> {
        let stdout = run_with_retries(
            self.executor,
            &list_agent_pods_command(&self.settings.namespace),
            &self.settings.issue_retry,
            self.cancel,
        )
        .await?;
        parse_agent_pods(&stdout, &self.settings.daemonset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::agent::fixtures::{pod, pod_list};
    use crate::cluster::nodes::fixtures::{node, node_list};
    use crate::oc::CommandOutput;
    use crate::oc::testing::ScriptedExecutor;

    fn settings(base: u32, increment: u32) -> RebootSettings {
        RebootSettings {
            base_delay_minutes: base,
            delay_increment_minutes: increment,
            issue_retry: RetryPolicy::new(3, Duration::from_secs(3)),
            ..Default::default()
        }
    }

    fn cluster(masters: &[&str], workers: &[&str]) -> ScriptedExecutor {
        let mut nodes = Vec::new();
        let mut pods = Vec::new();
        for m in masters {
            nodes.push(node(m, &["master"], true));
            pods.push(pod(&format!("machine-config-daemon-{}", m), m));
        }
        for w in workers {
            nodes.push(node(w, &["worker"], true));
            pods.push(pod(&format!("machine-config-daemon-{}", w), w));
        }
        ScriptedExecutor::new()
            .respond("get nodes", CommandOutput::success(node_list(nodes)))
            .respond("get pods", CommandOutput::success(pod_list(pods)))
    }

    fn issued_delays(executor: &ScriptedExecutor) -> Vec<(String, String)> {
        executor
            .calls_matching("shutdown -r")
            .iter()
            .map(|c| {
                let args = c.args();
                (args[3].clone(), args[args.len() - 1].clone())
            })
            .collect()
    }

    #[test]
    fn test_delay_schedule() {
        let mut schedule = DelaySchedule::new(5, 3);
        assert_eq!(schedule.next_master(), 5);
        assert_eq!(schedule.next_master(), 8);
        assert_eq!(schedule.next_master(), 11);
        assert_eq!(schedule.worker_delay(), 11);
    }

    #[test]
    fn test_delay_schedule_without_masters() {
        let schedule = DelaySchedule::new(5, 3);
        assert_eq!(schedule.worker_delay(), 5);
    }

    #[test]
    fn test_reboot_command() {
        let cmd = reboot_command("openshift-machine-config-operator", "machine-config-daemon-x", 8);
        assert_eq!(
            cmd.to_string(),
            "oc rsh -n openshift-machine-config-operator machine-config-daemon-x chroot /rootfs shutdown -r +8"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_masters_staggered_workers_share_final_delay() {
        let executor = cluster(&["m0", "m1", "m2"], &["w0", "w1"]);
        let settings = settings(5, 3);
        let cancel = CancellationToken::new();
        let mut sequencer = NodeRebootSequencer::new(&executor, &settings, &cancel);

        let max_delay = sequencer.run().await.unwrap();

        assert_eq!(max_delay, 11);
        assert_eq!(
            issued_delays(&executor),
            vec![
                ("machine-config-daemon-m0".to_string(), "+5".to_string()),
                ("machine-config-daemon-m1".to_string(), "+8".to_string()),
                ("machine-config-daemon-m2".to_string(), "+11".to_string()),
                ("machine-config-daemon-w0".to_string(), "+11".to_string()),
                ("machine-config-daemon-w1".to_string(), "+11".to_string()),
            ]
        );
        let records = sequencer.into_records();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.outcome == RebootOutcome::Issued));
        assert_eq!(records[3].role, NodeRole::Worker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_masters_before_workers_regardless_of_listing_order() {
        let nodes = vec![
            node("w0", &["worker"], true),
            node("m0", &["master"], true),
        ];
        let pods = vec![
            pod("machine-config-daemon-w0", "w0"),
            pod("machine-config-daemon-m0", "m0"),
        ];
        let executor = ScriptedExecutor::new()
            .respond("get nodes", CommandOutput::success(node_list(nodes)))
            .respond("get pods", CommandOutput::success(pod_list(pods)));
        let settings = settings(1, 3);
        let cancel = CancellationToken::new();

        NodeRebootSequencer::new(&executor, &settings, &cancel)
            .run()
            .await
            .unwrap();

        let order: Vec<String> = issued_delays(&executor).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["machine-config-daemon-m0", "machine-config-daemon-w0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_without_agent_is_skipped() {
        let nodes = vec![
            node("m0", &["master"], true),
            node("m1", &["master"], true),
            node("m2", &["master"], true),
            node("w0", &["worker"], true),
        ];
        let pods = vec![
            pod("machine-config-daemon-m0", "m0"),
            pod("machine-config-daemon-m2", "m2"),
            pod("machine-config-daemon-w0", "w0"),
        ];
        let executor = ScriptedExecutor::new()
            .respond("get nodes", CommandOutput::success(node_list(nodes)))
            .respond("get pods", CommandOutput::success(pod_list(pods)));
        let settings = settings(5, 3);
        let cancel = CancellationToken::new();
        let mut sequencer = NodeRebootSequencer::new(&executor, &settings, &cancel);

        let max_delay = sequencer.run().await.unwrap();

        assert_eq!(max_delay, 8);
        let skipped: Vec<&RebootRecord> = sequencer
            .records()
            .iter()
            .filter(|r| r.outcome == RebootOutcome::AgentNotFound)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].node, "m1");
        assert_eq!(skipped[0].delay_minutes, None);
        assert_eq!(executor.calls_matching("shutdown -r").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_master_failure_aborts_before_workers() {
        let executor = cluster(&["m0", "m1"], &["w0"]);
        let executor = executor.respond(
            "machine-config-daemon-m1 ",
            CommandOutput::failure(1, "error: unable to upgrade connection"),
        );
        let settings = settings(5, 3);
        let cancel = CancellationToken::new();
        let mut sequencer = NodeRebootSequencer::new(&executor, &settings, &cancel);

        let err = sequencer.run().await.unwrap_err();

        match err {
            MigrationError::RebootIssuanceFailure {
                node, attempts, stderr,
            } => {
                assert_eq!(node, "m1");
                assert_eq!(attempts, 3);
                assert!(stderr.contains("unable to upgrade connection"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(executor.calls_matching("machine-config-daemon-m1 ").len(), 3);
        assert!(executor.calls_matching("machine-config-daemon-w0 ").is_empty());
        assert!(matches!(
            sequencer.records().last().unwrap().outcome,
            RebootOutcome::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_failure_continues() {
        let executor = cluster(&["m0"], &["w0", "w1"]).respond(
            "machine-config-daemon-w0 ",
            CommandOutput::failure(1, "container not found"),
        );
        let settings = settings(2, 3);
        let cancel = CancellationToken::new();
        let mut sequencer = NodeRebootSequencer::new(&executor, &settings, &cancel);

        let max_delay = sequencer.run().await.unwrap();

        assert_eq!(max_delay, 2);
        let records = sequencer.into_records();
        assert!(matches!(records[1].outcome, RebootOutcome::Failed(_)));
        assert_eq!(records[2].node, "w1");
        assert_eq!(records[2].outcome, RebootOutcome::Issued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issuance_retried_then_succeeds() {
        let executor = cluster(&["m0"], &[]).respond_seq(
            "machine-config-daemon-m0 ",
            vec![
                CommandOutput::failure(1, "transient"),
                CommandOutput::success(""),
            ],
        );
        let settings = settings(1, 3);
        let cancel = CancellationToken::new();
        let mut sequencer = NodeRebootSequencer::new(&executor, &settings, &cancel);

        sequencer.run().await.unwrap();
        assert_eq!(executor.calls_matching("shutdown -r").len(), 2);
        assert_eq!(sequencer.records()[0].outcome, RebootOutcome::Issued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_workers() {
        let executor = cluster(&["m0", "m1"], &["w0", "w1", "w2"]).respond(
            "machine-config-daemon-w1 ",
            CommandOutput::failure(1, "boom"),
        );
        let settings = RebootSettings {
            parallel_workers: true,
            ..settings(5, 3)
        };
        let cancel = CancellationToken::new();
        let mut sequencer = NodeRebootSequencer::new(&executor, &settings, &cancel);

        let max_delay = sequencer.run().await.unwrap();

        assert_eq!(max_delay, 8);
        let records = sequencer.into_records();
        let workers: Vec<&RebootRecord> =
            records.iter().filter(|r| r.role == NodeRole::Worker).collect();
        assert_eq!(workers.len(), 3);
        assert!(workers.iter().all(|r| r.delay_minutes == Some(8)));
        assert_eq!(workers[0].outcome, RebootOutcome::Issued);
        assert!(matches!(workers[1].outcome, RebootOutcome::Failed(_)));
        assert_eq!(workers[2].outcome, RebootOutcome::Issued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_listing_failure_is_fatal() {
        let executor = ScriptedExecutor::new()
            .respond("get nodes", CommandOutput::failure(1, "Unauthorized"));
        let settings = settings(1, 3);
        let cancel = CancellationToken::new();

        let err = NodeRebootSequencer::new(&executor, &settings, &cancel)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::CommandFailed { attempts: 3, .. }));
        assert!(executor.calls_matching("shutdown").is_empty());
    }
}
