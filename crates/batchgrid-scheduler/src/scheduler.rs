//! Scheduler — the polling loop.
//!
//! The `Scheduler` owns the registry, the carried tick state and the
//! cluster it drives. Every cycle it:
//! - Refreshes node and target readings
//! - Runs a tick and executes the resulting dispatches
//! - Runs one treasury pass (skipped while purchases are paused)
//!
//! Between cycles it sleeps for the poll interval. Shutdown is only
//! observed between cycles; a cycle in progress always completes.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use batchgrid_placement::DispatchSet;
use batchgrid_planner::{BatchPlanner, PlanOptions, ThreadAnalysis};
use batchgrid_treasury::{Treasury, TreasuryPass};

use crate::executor::{ExecutionReport, execute};
use crate::providers::Cluster;
use crate::registry::{RefreshSummary, Registry};
use crate::tick::{SchedulerState, tick};

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub refresh: RefreshSummary,
    pub plans: usize,
    pub dispatch_set: DispatchSet,
    pub execution: ExecutionReport,
    /// `None` when purchases are paused.
    pub treasury: Option<TreasuryPass>,
}

/// Drives a [`Cluster`] one cycle at a time.
pub struct Scheduler<A, C> {
    planner: BatchPlanner<A>,
    options: PlanOptions,
    treasury: Treasury,
    registry: Registry,
    state: SchedulerState,
    cluster: C,
}

impl<A: ThreadAnalysis, C: Cluster> Scheduler<A, C> {
    /// Create a new scheduler. Plan options start from the planner's
    /// configured defaults.
    pub fn new(planner: BatchPlanner<A>, treasury: Treasury, cluster: C) -> Self {
        let options = planner.default_options();
        Self {
            planner,
            options,
            treasury,
            registry: Registry::new(),
            state: SchedulerState::default(),
            cluster,
        }
    }

    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut C {
        &mut self.cluster
    }

    pub fn into_cluster(self) -> C {
        self.cluster
    }

    /// Run one full cycle without sleeping.
    pub fn run_cycle(&mut self) -> CycleReport {
        let refresh = self.registry.refresh(&self.cluster);

        let output = tick(&self.registry, &self.state, &self.planner, self.options);
        let execution = execute(&output.dispatch_set, &mut self.cluster);
        self.state = output.next_state;

        let funds = self.cluster.funds();
        let (units, servers) = self.cluster.markets();
        let treasury = self.treasury.run_pass(funds, units, servers);

        let report = CycleReport {
            cycle: self.state.cycle,
            refresh,
            plans: output.plans.len(),
            dispatch_set: output.dispatch_set,
            execution,
            treasury,
        };

        info!(
            cycle = report.cycle,
            targets = report.refresh.targets,
            nodes = report.refresh.nodes,
            plans = report.plans,
            dispatched = report.execution.sent,
            threads = report.execution.threads_sent,
            deferred = self.state.deferred.len(),
            spent = report.treasury.as_ref().map(|t| t.spent()).unwrap_or(0.0),
            "cycle complete"
        );
        report
    }

    /// Run cycles until `shutdown` changes or `max_cycles` is reached.
    ///
    /// Returns the number of cycles run.
    pub async fn run(
        &mut self,
        interval: Duration,
        max_cycles: Option<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!(
            interval_ms = interval.as_millis() as u64,
            max_cycles,
            "scheduler started"
        );

        let mut cycles = 0;
        loop {
            if *shutdown.borrow() {
                info!("scheduler shutting down");
                break;
            }

            self.run_cycle();
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                debug!(cycles, "cycle limit reached");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use batchgrid_core::{
        CapacityCosts, NodeId, PlannerConfig, TargetId, TargetState, TreasuryConfig,
    };
    use batchgrid_planner::LinearAnalysis;
    use batchgrid_treasury::{TreasuryResult, UpgradeMarket, UpgradeOption};

    use crate::error::{SchedulerError, SchedulerResult};
    use crate::executor::DispatchCommand;
    use crate::providers::{
        DispatchSink, NodeCapacityProvider, NodeReading, TargetStateProvider, Treasurer,
    };

    #[derive(Default)]
    struct ShelfMarket {
        options: Vec<UpgradeOption>,
        bought: usize,
    }

    impl UpgradeMarket for ShelfMarket {
        fn options(&self) -> Vec<UpgradeOption> {
            self.options.clone()
        }

        fn purchase(&mut self, option: &UpgradeOption) -> TreasuryResult<()> {
            self.options.retain(|o| o != option);
            self.bought += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct StaticCluster {
        targets: BTreeMap<TargetId, TargetState>,
        nodes: Vec<(NodeId, NodeReading)>,
        sent: Vec<DispatchCommand>,
        funds: f64,
        units: ShelfMarket,
        servers: ShelfMarket,
    }

    impl TargetStateProvider for StaticCluster {
        fn target_ids(&self) -> Vec<TargetId> {
            self.targets.keys().cloned().collect()
        }

        fn target_state(&self, id: &str) -> SchedulerResult<TargetState> {
            self.targets
                .get(id)
                .cloned()
                .ok_or_else(|| SchedulerError::TargetNotFound(id.to_string()))
        }
    }

    impl NodeCapacityProvider for StaticCluster {
        fn node_ids(&self) -> Vec<NodeId> {
            self.nodes.iter().map(|(id, _)| id.clone()).collect()
        }

        fn node_capacity(&self, id: &str) -> SchedulerResult<NodeReading> {
            self.nodes
                .iter()
                .find(|(n, _)| n == id)
                .map(|(_, r)| r.clone())
                .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))
        }
    }

    impl DispatchSink for StaticCluster {
        fn dispatch(&mut self, command: &DispatchCommand) -> SchedulerResult<()> {
            self.sent.push(command.clone());
            Ok(())
        }
    }

    impl Treasurer for StaticCluster {
        fn funds(&self) -> f64 {
            self.funds
        }

        fn markets(&mut self) -> (&mut dyn UpgradeMarket, &mut dyn UpgradeMarket) {
            (&mut self.units, &mut self.servers)
        }
    }

    fn cluster() -> StaticCluster {
        let mut c = StaticCluster {
            funds: 10_000.0,
            ..StaticCluster::default()
        };
        c.targets.insert(
            "alpha".to_string(),
            TargetState {
                id: "alpha".to_string(),
                resource_max: 1_000_000.0,
                resource_available: 1_000_000.0,
                penalty_level: 5.0,
                penalty_floor: 5.0,
                latency_extract_ms: 1_000.0,
                latency_correct_ms: 4_000.0,
                latency_restore_ms: 3_200.0,
                extract_chance: 0.8,
            },
        );
        c.nodes.push((
            "home".to_string(),
            NodeReading {
                capacity_total: 1_024.0,
                capacity_used: 0.0,
                has_access: true,
            },
        ));
        c.units.options.push(UpgradeOption::acquire(500.0, 4.0));
        c.servers.options.push(UpgradeOption::acquire(1_000.0, 2.0));
        c
    }

    fn scheduler(
        c: StaticCluster,
        treasury: TreasuryConfig,
    ) -> Scheduler<LinearAnalysis, StaticCluster> {
        let planner = BatchPlanner::new(
            PlannerConfig::default(),
            CapacityCosts::default(),
            LinearAnalysis::default(),
        );
        Scheduler::new(planner, Treasury::new(treasury), c)
    }

    #[test]
    fn cycle_dispatches_batch_and_buys() {
        let mut s = scheduler(cluster(), TreasuryConfig::default());

        let report = s.run_cycle();

        assert_eq!(report.cycle, 1);
        assert_eq!(report.plans, 1);
        assert_eq!(report.execution.sent, 4);
        assert_eq!(s.cluster().sent.len(), 4);
        assert!(s.cluster().sent.iter().all(|c| c.node_id == "home"));

        let pass = report.treasury.unwrap();
        // 10% of 10_000 covers the 500 unit; 20% of 9_500 covers the 1_000 server.
        assert_eq!(pass.units.spent, 500.0);
        assert_eq!(pass.servers.spent, 1_000.0);
    }

    #[test]
    fn paused_purchases_skip_treasury() {
        let config = TreasuryConfig {
            pause_purchases: true,
            ..TreasuryConfig::default()
        };
        let mut s = scheduler(cluster(), config);

        let report = s.run_cycle();

        assert!(report.treasury.is_none());
        assert_eq!(s.cluster().units.bought, 0);
        assert_eq!(report.execution.sent, 4);
    }

    #[test]
    fn missing_capacity_defers_target() {
        let mut c = cluster();
        c.nodes[0].1.capacity_used = 1_020.0;
        let mut s = scheduler(c, TreasuryConfig::default());

        let report = s.run_cycle();

        assert_eq!(report.execution.sent, 0);
        assert!(s.state().is_deferred("alpha"));
    }

    #[tokio::test]
    async fn run_stops_at_cycle_limit() {
        let mut s = scheduler(cluster(), TreasuryConfig::default());
        let (_tx, rx) = watch::channel(false);

        let cycles = s.run(Duration::from_millis(1), Some(3), rx).await;

        assert_eq!(cycles, 3);
        assert_eq!(s.state().cycle, 3);
        assert_eq!(s.cluster().sent.len(), 12);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let mut s = scheduler(cluster(), TreasuryConfig::default());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let cycles = s.run(Duration::from_secs(3_600), None, rx).await;
            (cycles, s)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let (cycles, s) = handle.await.unwrap();
        assert_eq!(cycles, 1);
        assert_eq!(s.registry().nodes().len(), 1);
    }

    #[tokio::test]
    async fn run_exits_immediately_when_already_shut_down() {
        let mut s = scheduler(cluster(), TreasuryConfig::default());
        let (_tx, rx) = watch::channel(true);

        let cycles = s.run(Duration::from_millis(1), None, rx).await;
        assert_eq!(cycles, 0);
    }
}
