//! In-process simulated cluster.
//!
//! Implements every trait the scheduler drives: target and node providers,
//! the dispatch sink, and the treasury markets. Dispatched operations are
//! held in flight until `dispatch time + start delay + latency`, then land on
//! their target in landing order.
//!
//! State is settled lazily. Read-only provider calls project the settled
//! state forward to the current clock without mutating it; calls that take
//! `&mut self` settle first.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use batchgrid_core::{
    CapacityCosts, GridConfig, NodeId, OperationKind, TargetId, TargetState,
};
use batchgrid_planner::{LinearAnalysis, PhaseRole};
use batchgrid_scheduler::{
    DispatchCommand, DispatchSink, NodeCapacityProvider, NodeReading, SchedulerError,
    SchedulerResult, TargetStateProvider, Treasurer,
};
use batchgrid_treasury::{
    ServerCosts, ServerLimits, ServerStats, TreasuryError, TreasuryResult, UnitLimits, UnitStats,
    UpgradeCosts, UpgradeKind, UpgradeMarket, UpgradeOption, server_options,
    simulated_production, unit_options,
};

// ── Clock ──────────────────────────────────────────────────────────

/// Source of simulated time, in milliseconds.
#[derive(Debug, Clone)]
pub enum SimClock {
    /// Moves only when [`SimClock::advance`] is called.
    Manual { now_ms: f64 },
    /// Follows the tokio clock from `start`.
    Wall { start: tokio::time::Instant },
}

impl SimClock {
    pub fn manual() -> Self {
        SimClock::Manual { now_ms: 0.0 }
    }

    pub fn wall() -> Self {
        SimClock::Wall {
            start: tokio::time::Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        match self {
            SimClock::Manual { now_ms } => *now_ms,
            SimClock::Wall { start } => start.elapsed().as_secs_f64() * 1_000.0,
        }
    }

    /// Move a manual clock forward. A wall clock ignores this.
    pub fn advance(&mut self, ms: f64) {
        if let SimClock::Manual { now_ms } = self {
            *now_ms += ms.max(0.0);
        }
    }
}

// ── Stats ──────────────────────────────────────────────────────────

/// One operation that landed on its target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Landing {
    pub target_id: TargetId,
    pub role: PhaseRole,
    pub threads: u32,
    pub dispatched_ms: f64,
    pub landed_ms: f64,
    /// `start_delay + latency`, measured from the dispatch instant.
    pub offset_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimStats {
    pub dispatches: u64,
    pub threads: u64,
    pub rejected: u64,
    pub extracted: f64,
    pub landings: Vec<Landing>,
}

/// Snapshot printed at the end of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    pub now_ms: f64,
    pub funds: f64,
    pub production_per_sec: f64,
    pub units: usize,
    pub nodes: Vec<(NodeId, f64)>,
    pub in_flight: usize,
    pub dispatches: u64,
    pub threads: u64,
    pub rejected: u64,
    pub landings: usize,
    pub extracted: f64,
    pub spent: f64,
}

// ── Markets ────────────────────────────────────────────────────────

/// Unit prices that grow geometrically with the stat being raised.
#[derive(Debug, Clone)]
struct UnitPricing;

impl UpgradeCosts for UnitPricing {
    fn level_cost(&self, unit: &UnitStats) -> f64 {
        100.0 * 1.05f64.powi(unit.level as i32)
    }

    fn ram_cost(&self, unit: &UnitStats) -> f64 {
        300.0 * f64::from(unit.ram).powf(1.5)
    }

    fn core_cost(&self, unit: &UnitStats) -> f64 {
        1_000.0 * f64::from(unit.cores).powf(1.6)
    }

    fn new_unit_cost(&self, owned: usize) -> f64 {
        1_000.0 * 1.85f64.powi(owned as i32)
    }
}

/// Production units and the money spent on them.
#[derive(Debug, Clone)]
pub struct UnitMarket {
    units: Vec<UnitStats>,
    limits: UnitLimits,
    multiplier: f64,
    spent: f64,
}

impl UnitMarket {
    /// Fresh units produce `simulated_production(1, 1, 1, multiplier)`, so
    /// the catalog's new-unit gain is scaled to match.
    fn new(multiplier: f64) -> Self {
        Self {
            units: Vec::new(),
            limits: UnitLimits {
                new_unit_production: 1.0,
                ..UnitLimits::default()
            },
            multiplier,
            spent: 0.0,
        }
    }

    fn acquire(&mut self) {
        let id = format!("unit-{}", self.units.len());
        self.units.push(UnitStats {
            id,
            level: 1,
            ram: 1,
            cores: 1,
            production: simulated_production(1, 1, 1, self.multiplier),
        });
    }

    pub fn units(&self) -> &[UnitStats] {
        &self.units
    }

    /// Money produced per second by all units.
    pub fn production(&self) -> f64 {
        self.units.iter().map(|u| u.production).sum()
    }
}

impl UpgradeMarket for UnitMarket {
    fn options(&self) -> Vec<UpgradeOption> {
        unit_options(&self.units, &UnitPricing, &self.limits, self.multiplier)
    }

    fn purchase(&mut self, option: &UpgradeOption) -> TreasuryResult<()> {
        let Some(owner) = option.owner.as_deref() else {
            if self.units.len() >= self.limits.max_units {
                return Err(TreasuryError::Rejected("unit limit reached".to_string()));
            }
            self.acquire();
            self.spent += option.cost;
            return Ok(());
        };

        let limits = &self.limits;
        let unit = self
            .units
            .iter_mut()
            .find(|u| u.id == owner)
            .ok_or_else(|| TreasuryError::Unavailable {
                owner: owner.to_string(),
                kind: option.kind,
            })?;

        match option.kind {
            UpgradeKind::Level if unit.level < limits.max_level => unit.level += 1,
            UpgradeKind::Ram if unit.ram < limits.max_ram => unit.ram *= 2,
            UpgradeKind::Core if unit.cores < limits.max_cores => unit.cores += 1,
            kind => {
                return Err(TreasuryError::Unavailable {
                    owner: owner.to_string(),
                    kind,
                });
            }
        }
        unit.production = simulated_production(unit.level, unit.ram, unit.cores, self.multiplier);
        self.spent += option.cost;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ServerPricing {
    per_capacity: f64,
}

impl ServerCosts for ServerPricing {
    fn purchase_cost(&self, capacity: f64) -> f64 {
        capacity * self.per_capacity
    }
}

/// Purchased worker servers and the money spent on them.
#[derive(Debug, Clone)]
pub struct ServerMarket {
    servers: Vec<ServerStats>,
    limits: ServerLimits,
    pricing: ServerPricing,
    spent: f64,
}

impl ServerMarket {
    fn new() -> Self {
        Self {
            servers: Vec::new(),
            limits: ServerLimits::default(),
            pricing: ServerPricing { per_capacity: 55.0 },
            spent: 0.0,
        }
    }

    pub fn servers(&self) -> &[ServerStats] {
        &self.servers
    }
}

impl UpgradeMarket for ServerMarket {
    fn options(&self) -> Vec<UpgradeOption> {
        server_options(&self.servers, &self.pricing, &self.limits)
    }

    fn purchase(&mut self, option: &UpgradeOption) -> TreasuryResult<()> {
        match (option.owner.as_deref(), option.kind) {
            (None, UpgradeKind::NewUnit) => {
                if self.servers.len() >= self.limits.max_servers {
                    return Err(TreasuryError::Rejected("server limit reached".to_string()));
                }
                let id = format!("worker-{}", self.servers.len());
                self.servers.push(ServerStats {
                    id,
                    capacity: self.limits.min_capacity,
                });
            }
            (Some(owner), UpgradeKind::Ram) => {
                let max = self.limits.max_capacity;
                let server = self
                    .servers
                    .iter_mut()
                    .find(|s| s.id == owner && s.capacity < max)
                    .ok_or_else(|| TreasuryError::Unavailable {
                        owner: owner.to_string(),
                        kind: option.kind,
                    })?;
                server.capacity = (server.capacity * 2.0).min(max);
            }
            (owner, kind) => {
                return Err(TreasuryError::Unavailable {
                    owner: owner.unwrap_or("new").to_string(),
                    kind,
                });
            }
        }
        self.spent += option.cost;
        Ok(())
    }
}

// ── Cluster ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct InFlight {
    node_id: NodeId,
    target_id: TargetId,
    role: PhaseRole,
    threads: u32,
    cost: f64,
    dispatched_ms: f64,
    offset_ms: f64,
    land_ms: f64,
}

/// Applies landed operations to target state.
#[derive(Debug, Clone)]
struct Effects {
    analysis: LinearAnalysis,
    correction_per_thread: f64,
}

impl Effects {
    /// Apply one landing; returns the resource extracted.
    fn land(&self, target: &mut TargetState, op: OperationKind, threads: u32) -> f64 {
        let n = f64::from(threads);
        match op {
            OperationKind::Extract => {
                let share = (self.analysis.extract_share_per_thread * n).min(1.0);
                let taken = target.resource_available * share * target.extract_chance;
                target.resource_available -= taken;
                target.penalty_level += self.analysis.extract_penalty_per_thread * n;
                taken
            }
            OperationKind::Correct => {
                target.penalty_level =
                    (target.penalty_level - self.correction_per_thread * n).max(target.penalty_floor);
                0.0
            }
            OperationKind::Restore => {
                let grown = target.resource_available.max(1.0)
                    * (1.0 + self.analysis.restore_rate_per_thread).powf(n);
                target.resource_available = grown.min(target.resource_max);
                target.penalty_level += self.analysis.restore_penalty_per_thread * n;
                0.0
            }
        }
    }
}

/// A self-contained world the scheduler can drive.
pub struct SimCluster {
    clock: SimClock,
    costs: CapacityCosts,
    effects: Effects,
    settled_ms: f64,
    targets: BTreeMap<TargetId, TargetState>,
    /// Nodes that exist from the start, ahead of purchased servers.
    fixed_nodes: Vec<(NodeId, f64)>,
    /// Sorted by landing time.
    in_flight: Vec<InFlight>,
    /// Gross income settled so far, before market spending.
    income: f64,
    units: UnitMarket,
    servers: ServerMarket,
    stats: SimStats,
}

impl SimCluster {
    pub fn new(config: &GridConfig, clock: SimClock) -> Self {
        let settled_ms = clock.now_ms();
        Self {
            clock,
            costs: config.capacity.clone(),
            effects: Effects {
                analysis: LinearAnalysis::default(),
                correction_per_thread: config.planner.correction_per_thread,
            },
            settled_ms,
            targets: BTreeMap::new(),
            fixed_nodes: Vec::new(),
            in_flight: Vec::new(),
            income: 0.0,
            units: UnitMarket::new(4.0),
            servers: ServerMarket::new(),
            stats: SimStats::default(),
        }
    }

    /// A small world: one home node, one production unit, a handful of
    /// targets in different conditions.
    pub fn demo(config: &GridConfig, clock: SimClock) -> Self {
        let mut sim = Self::new(config, clock);
        sim.add_node("home", 512.0);
        sim.add_unit();
        sim.add_funds(10_000.0);

        let target = |id: &str, max: f64, available: f64, floor: f64, level: f64, l: [f64; 3], chance: f64| {
            TargetState {
                id: id.to_string(),
                resource_max: max,
                resource_available: available,
                penalty_level: level,
                penalty_floor: floor,
                latency_extract_ms: l[0],
                latency_correct_ms: l[1],
                latency_restore_ms: l[2],
                extract_chance: chance,
            }
        };
        sim.add_target(target("alpha", 1_000_000.0, 1_000_000.0, 5.0, 5.0, [1_000.0, 4_000.0, 3_200.0], 0.8));
        sim.add_target(target("beta", 250_000.0, 100_000.0, 3.0, 12.0, [2_000.0, 8_000.0, 6_400.0], 0.6));
        sim.add_target(target("gamma", 40_000.0, 30_000.0, 1.0, 1.0, [500.0, 2_000.0, 1_600.0], 0.95));
        sim.add_target(target("fortress", 5_000_000.0, 5_000_000.0, 50.0, 50.0, [40_000.0, 160_000.0, 128_000.0], 0.3));
        sim.add_target(target("empty", 0.0, 0.0, 1.0, 1.0, [1_000.0, 4_000.0, 3_200.0], 1.0));
        sim
    }

    pub fn add_target(&mut self, target: TargetState) {
        self.targets.insert(target.id.clone(), target);
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>, capacity: f64) {
        self.fixed_nodes.push((id.into(), capacity));
    }

    pub fn add_unit(&mut self) {
        self.units.acquire();
    }

    pub fn add_funds(&mut self, amount: f64) {
        self.income += amount;
    }

    pub fn advance(&mut self, ms: f64) {
        self.clock.advance(ms);
        self.settle();
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn unit_market(&self) -> &UnitMarket {
        &self.units
    }

    pub fn server_market(&self) -> &ServerMarket {
        &self.servers
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Current state of a target, with every operation landed by now applied.
    pub fn target(&self, id: &str) -> Option<TargetState> {
        let now = self.clock.now_ms();
        let mut target = self.targets.get(id)?.clone();
        for op in self.landed_by(now).iter().filter(|op| op.target_id == id) {
            self.effects.land(&mut target, op.role.operation(), op.threads);
        }
        Some(target)
    }

    pub fn summary(&self) -> SimSummary {
        SimSummary {
            now_ms: self.clock.now_ms(),
            funds: self.funds(),
            production_per_sec: self.units.production(),
            units: self.units.units().len(),
            nodes: self.node_ids().into_iter().filter_map(|id| self.capacity_of(&id).map(|c| (id, c))).collect(),
            in_flight: self.in_flight.len(),
            dispatches: self.stats.dispatches,
            threads: self.stats.threads,
            rejected: self.stats.rejected,
            landings: self.stats.landings.len(),
            extracted: self.stats.extracted,
            spent: self.units.spent + self.servers.spent,
        }
    }

    fn landed_by(&self, now: f64) -> &[InFlight] {
        let end = self.in_flight.partition_point(|op| op.land_ms <= now);
        &self.in_flight[..end]
    }

    fn capacity_of(&self, id: &str) -> Option<f64> {
        self.fixed_nodes
            .iter()
            .find(|(n, _)| n == id)
            .map(|(_, c)| *c)
            .or_else(|| self.servers.servers.iter().find(|s| s.id == id).map(|s| s.capacity))
    }

    fn used_on(&self, id: &str, now: f64) -> f64 {
        self.in_flight
            .iter()
            .filter(|op| op.node_id == id && op.land_ms > now)
            .map(|op| op.cost)
            .sum()
    }

    /// Land everything due by now and credit production since the last settle.
    fn settle(&mut self) {
        let now = self.clock.now_ms();
        let end = self.in_flight.partition_point(|op| op.land_ms <= now);
        let landed: Vec<InFlight> = self.in_flight.drain(..end).collect();

        for op in landed {
            if let Some(target) = self.targets.get_mut(&op.target_id) {
                let taken = self.effects.land(target, op.role.operation(), op.threads);
                self.income += taken;
                self.stats.extracted += taken;
            }
            self.stats.landings.push(Landing {
                target_id: op.target_id,
                role: op.role,
                threads: op.threads,
                dispatched_ms: op.dispatched_ms,
                landed_ms: op.land_ms,
                offset_ms: op.offset_ms,
            });
        }

        let elapsed_ms = (now - self.settled_ms).max(0.0);
        self.income += self.units.production() * elapsed_ms / 1_000.0;
        self.settled_ms = self.settled_ms.max(now);
    }

    fn projected_income(&self, now: f64) -> f64 {
        let mut targets: BTreeMap<&str, TargetState> = BTreeMap::new();
        let mut income = self.income;
        for op in self.landed_by(now) {
            let Some(base) = self.targets.get(&op.target_id) else {
                continue;
            };
            let target = targets.entry(op.target_id.as_str()).or_insert_with(|| base.clone());
            income += self.effects.land(target, op.role.operation(), op.threads);
        }
        income + self.units.production() * (now - self.settled_ms).max(0.0) / 1_000.0
    }
}

impl TargetStateProvider for SimCluster {
    fn target_ids(&self) -> Vec<TargetId> {
        self.targets.keys().cloned().collect()
    }

    fn target_state(&self, id: &str) -> SchedulerResult<TargetState> {
        self.target(id)
            .ok_or_else(|| SchedulerError::TargetNotFound(id.to_string()))
    }
}

impl NodeCapacityProvider for SimCluster {
    fn node_ids(&self) -> Vec<NodeId> {
        self.fixed_nodes
            .iter()
            .map(|(id, _)| id.clone())
            .chain(self.servers.servers.iter().map(|s| s.id.clone()))
            .collect()
    }

    fn node_capacity(&self, id: &str) -> SchedulerResult<NodeReading> {
        let total = self
            .capacity_of(id)
            .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))?;
        Ok(NodeReading {
            capacity_total: total,
            capacity_used: self.used_on(id, self.clock.now_ms()),
            has_access: true,
        })
    }
}

impl DispatchSink for SimCluster {
    fn dispatch(&mut self, command: &DispatchCommand) -> SchedulerResult<()> {
        self.settle();
        let now = self.clock.now_ms();
        let payload = command.decode_payload()?;

        let total = self
            .capacity_of(&command.node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound(command.node_id.clone()))?;
        let latency = self
            .targets
            .get(&payload.target_id)
            .map(|t| t.latency_ms(command.operation))
            .ok_or_else(|| SchedulerError::TargetNotFound(payload.target_id.clone()))?;

        let cost = f64::from(payload.threads) * self.costs.per_thread(command.operation);
        let free = total - self.used_on(&command.node_id, now);
        if cost > free + 1e-6 {
            self.stats.rejected += 1;
            return Err(SchedulerError::Dispatch {
                node: command.node_id.clone(),
                reason: format!("needs {cost:.2}, {free:.2} free"),
            });
        }

        let offset_ms = payload.start_delay_ms + latency;
        let op = InFlight {
            node_id: command.node_id.clone(),
            target_id: payload.target_id,
            role: payload.role,
            threads: payload.threads,
            cost,
            dispatched_ms: now,
            offset_ms,
            land_ms: now + offset_ms,
        };
        debug!(
            target = %op.target_id,
            node = %op.node_id,
            role = %op.role,
            threads = op.threads,
            land_ms = op.land_ms,
            "operation in flight"
        );
        let pos = self.in_flight.partition_point(|o| o.land_ms <= op.land_ms);
        self.in_flight.insert(pos, op);
        self.stats.dispatches += 1;
        self.stats.threads += u64::from(payload.threads);
        Ok(())
    }
}

impl Treasurer for SimCluster {
    fn funds(&self) -> f64 {
        let now = self.clock.now_ms();
        self.projected_income(now) - self.units.spent - self.servers.spent
    }

    fn markets(&mut self) -> (&mut dyn UpgradeMarket, &mut dyn UpgradeMarket) {
        self.settle();
        (&mut self.units, &mut self.servers)
    }
}
