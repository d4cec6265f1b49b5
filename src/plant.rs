//! The plant: owns every entity, arbitrates shared pumps/valves, and runs
//! the periodic tick described in spec.md §4.6.
//!
//! Entities are stored in arena vectors and refer to each other by index
//! (spec.md §9's "pointer graph" redesign note) rather than by owning
//! handle, so the plant alone is responsible for construction order,
//! online/offline sequencing, and destruction.

use log::{debug, info, warn};

use crate::bmodel::BModel;
use crate::dhwt::Dhwt;
use crate::error::EngineError;
use crate::hcircuit::HCircuit;
use crate::heatsource::HeatSource;
use crate::hw::HwRegistry;
use crate::mode::{DhwtCprio, RunMode};
use crate::pump::Pump;
use crate::time::TimekeepT;
use crate::valve::Valve;

pub struct SummerMaintenance {
    pub enabled: bool,
    pub run_interval: TimekeepT,
    pub run_duration: TimekeepT,
}

impl Default for SummerMaintenance {
    fn default() -> Self {
        SummerMaintenance {
            enabled: false,
            run_interval: 0,
            run_duration: 0,
        }
    }
}

pub struct Plant {
    hw: HwRegistry,
    bmodels: Vec<BModel>,
    pumps: Vec<Pump>,
    valves: Vec<Valve>,
    dhwts: Vec<Dhwt>,
    hcircuits: Vec<HCircuit>,
    heatsources: Vec<HeatSource>,

    summer: SummerMaintenance,
    last_summer_run: TimekeepT,
    summer_exercise_until: TimekeepT,

    online: bool,
}

impl Plant {
    pub fn new(hw: HwRegistry) -> Self {
        Plant {
            hw,
            bmodels: Vec::new(),
            pumps: Vec::new(),
            valves: Vec::new(),
            dhwts: Vec::new(),
            hcircuits: Vec::new(),
            heatsources: Vec::new(),
            summer: SummerMaintenance::default(),
            last_summer_run: 0,
            summer_exercise_until: 0,
            online: false,
        }
    }

    pub fn set_summer_maintenance(&mut self, summer: SummerMaintenance) {
        self.summer = summer;
    }

    pub fn hw(&self) -> &HwRegistry {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut HwRegistry {
        &mut self.hw
    }

    pub fn add_bmodel(&mut self, bmodel: BModel) -> usize {
        self.bmodels.push(bmodel);
        self.bmodels.len() - 1
    }

    pub fn add_pump(&mut self, pump: Pump) -> usize {
        self.pumps.push(pump);
        self.pumps.len() - 1
    }

    pub fn add_valve(&mut self, valve: Valve) -> usize {
        self.valves.push(valve);
        self.valves.len() - 1
    }

    pub fn add_dhwt(&mut self, dhwt: Dhwt) -> usize {
        self.dhwts.push(dhwt);
        self.dhwts.len() - 1
    }

    pub fn add_hcircuit(&mut self, hcircuit: HCircuit) -> usize {
        self.hcircuits.push(hcircuit);
        self.hcircuits.len() - 1
    }

    pub fn add_heatsource(&mut self, heatsource: HeatSource) -> usize {
        self.heatsources.push(heatsource);
        self.heatsources.len() - 1
    }

    pub fn hcircuit(&self, idx: usize) -> &HCircuit {
        &self.hcircuits[idx]
    }

    pub fn hcircuit_mut(&mut self, idx: usize) -> &mut HCircuit {
        &mut self.hcircuits[idx]
    }

    pub fn dhwt(&self, idx: usize) -> &Dhwt {
        &self.dhwts[idx]
    }

    pub fn dhwt_mut(&mut self, idx: usize) -> &mut Dhwt {
        &mut self.dhwts[idx]
    }

    pub fn valve(&self, idx: usize) -> &Valve {
        &self.valves[idx]
    }

    pub fn pump(&self, idx: usize) -> &Pump {
        &self.pumps[idx]
    }

    /// Exposes a building model's filtered outdoor temperature and
    /// summer/frost flags for an external scheduler to read (spec.md §3's
    /// "derived summer/frost flags" are consumed outside the engine, by the
    /// out-of-scope wall-clock-to-mode matcher).
    pub fn bmodel(&self, idx: usize) -> &BModel {
        &self.bmodels[idx]
    }

    /// Propagates a single system-wide mode to every circuit and tank that
    /// hasn't been given a more specific schedule. Stands in for the
    /// out-of-scope scheduler's per-entity wall-clock matching: a caller
    /// that wants finer granularity should call `hcircuit_mut`/`dhwt_mut`
    /// and set each entity's mode directly instead.
    pub fn set_system_mode(&mut self, mode: RunMode) {
        for circuit in &mut self.hcircuits {
            circuit.set_runmode(mode);
        }
        for dhwt in &mut self.dhwts {
            dhwt.set_runmode(mode);
        }
    }

    /// Validates references and arms every entity, in dependency order
    /// (hardware backends, then pumps/valves, then bmodels, then
    /// dhwts/hcircuits, then heat sources).
    pub fn online(&mut self) -> Result<(), EngineError> {
        self.hw.online_all()?;
        for pump in &mut self.pumps {
            pump.online(&self.hw)?;
        }
        for valve in &mut self.valves {
            valve.online(&self.hw)?;
        }
        for bmodel in &mut self.bmodels {
            bmodel.online(&self.hw)?;
        }
        for dhwt in &mut self.dhwts {
            dhwt.online()?;
        }
        for circuit in &mut self.hcircuits {
            circuit.online()?;
        }
        for heatsource in &mut self.heatsources {
            heatsource.online(&self.hw)?;
        }
        self.online = true;
        info!(target: "plant", "online: {} bmodels, {} pumps, {} valves, {} dhwts, {} hcircuits, {} heatsources",
            self.bmodels.len(), self.pumps.len(), self.valves.len(), self.dhwts.len(), self.hcircuits.len(), self.heatsources.len());
        Ok(())
    }

    /// De-energises every relay and marks every entity offline. Safe to
    /// call more than once.
    pub fn offline(&mut self) -> Result<(), EngineError> {
        for circuit in &mut self.hcircuits {
            circuit.offline();
        }
        for dhwt in &mut self.dhwts {
            dhwt.offline();
        }
        for bmodel in &mut self.bmodels {
            bmodel.offline();
        }
        for valve in &mut self.valves {
            valve.offline(&mut self.hw)?;
        }
        for pump in &mut self.pumps {
            pump.offline(&mut self.hw)?;
        }
        for heatsource in &mut self.heatsources {
            heatsource.offline(&mut self.hw)?;
        }
        self.hw.offline_all()?;
        self.online = false;
        info!(target: "plant", "offline");
        Ok(())
    }

    /// Runs one full tick: input, bmodels, dhwts/hcircuits, heat source
    /// aggregation, valves, pumps, output. See spec.md §4.6.
    pub fn tick(&mut self, now: TimekeepT) -> Result<(), EngineError> {
        if !self.online {
            return Err(crate::engine_fail!(crate::error::ErrorKind::Offline, "plant is offline"));
        }

        self.hw.input_all()?;

        for bmodel in &mut self.bmodels {
            bmodel.run(&self.hw, now)?;
        }

        let mut pump_requests = vec![false; self.pumps.len()];
        let mut valve_targets: Vec<Option<ValveCommand>> = vec![None; self.valves.len()];
        let mut hs_requests: Vec<Option<i32>> = vec![None; self.heatsources.len()];
        let mut hs_allow_idle_keepwarm = vec![false; self.heatsources.len()];
        let mut hs_wants_load_pump = vec![false; self.heatsources.len()];
        let mut hs_circuit_arbitration = vec![CircuitArbitration::Unrestricted; self.heatsources.len()];

        for i in 0..self.dhwts.len() {
            let out = self.dhwts[i].compute(&self.hw, now)?;
            if out.wants_feed_pump {
                if let Some(idx) = self.dhwts[i].feed_pump_idx() {
                    pump_requests[idx] = true;
                }
                hs_allow_idle_keepwarm_mark(&mut hs_allow_idle_keepwarm, self.dhwts[i].heatsource_idx());
            }
            if out.wants_recycle_pump {
                if let Some(idx) = self.dhwts[i].recycle_pump_idx() {
                    pump_requests[idx] = true;
                }
            }
            if let Some(idx) = self.dhwts[i].hwisol_valve_idx() {
                valve_targets[idx] = Some(ValveCommand::Isolation(out.wants_feed_pump));
            }
            if let Some(hs_idx) = self.dhwts[i].heatsource_idx() {
                if let Some(req) = out.heat_request {
                    merge_max(&mut hs_requests[hs_idx], req);
                    hs_wants_load_pump[hs_idx] = true;
                }
                if self.dhwts[i].is_charging() {
                    let arbitration = match self.dhwts[i].cprio() {
                        DhwtCprio::ParalMax | DhwtCprio::ParalDhw => None,
                        DhwtCprio::Absolute => Some(CircuitArbitration::Suppressed),
                        DhwtCprio::SlidMax => Some(CircuitArbitration::CappedAt(self.dhwts[i].limit_tmax())),
                        DhwtCprio::SlidDhw => self.dhwts[i].current_target().map(CircuitArbitration::CappedAt),
                    };
                    if let Some(arbitration) = arbitration {
                        hs_circuit_arbitration[hs_idx] = hs_circuit_arbitration[hs_idx].most_restrictive(arbitration);
                    }
                }
            }
        }

        for i in 0..self.hcircuits.len() {
            let bmodel_idx = self.hcircuits[i].bmodel_idx();
            let (filtered_outdoor, summer) = match self.bmodels[bmodel_idx].filtered_outdoor() {
                Some(t) => (t, self.bmodels[bmodel_idx].summer()),
                None => continue,
            };
            let commanded = self.hcircuits[i].compute(&self.hw, now, filtered_outdoor, summer)?;
            let hs_idx = self.hcircuits[i].heatsource_idx();
            let suppressed = hs_circuit_arbitration[hs_idx] == CircuitArbitration::Suppressed;

            if commanded.is_some() && !suppressed {
                hs_allow_idle_keepwarm_mark(&mut hs_allow_idle_keepwarm, Some(hs_idx));
            }
            if self.hcircuits[i].wants_pump() && !suppressed {
                if let Some(idx) = self.hcircuits[i].pump_idx() {
                    pump_requests[idx] = true;
                }
            }
            if let Some(idx) = self.hcircuits[i].valve_idx() {
                if let (Some(target), false) = (commanded, suppressed) {
                    valve_targets[idx] = Some(ValveCommand::Mixing(target));
                }
            }
            if let Some(req) = self.hcircuits[i].heat_request() {
                if let Some(req) = hs_circuit_arbitration[hs_idx].apply(req) {
                    merge_max(&mut hs_requests[hs_idx], req);
                }
            }
        }

        for i in 0..self.heatsources.len() {
            let out = self.heatsources[i].compute(&mut self.hw, now, hs_requests[i], hs_allow_idle_keepwarm[i])?;
            if out.dump_heat {
                warn!(target: "plant", "heatsource {}: dumping heat, downstream consumers should shed load", self.heatsources[i].name());
            }
            if let Some(idx) = self.heatsources[i].pump_load_idx() {
                if out.wants_load_pump || hs_wants_load_pump[i] {
                    pump_requests[idx] = true;
                }
            }
            if let (Some(idx), Some(target)) = (self.heatsources[i].valve_ret_idx(), out.return_protection_target) {
                valve_targets[idx] = Some(ValveCommand::Mixing(target));
            }
        }

        self.run_summer_maintenance(now, &mut pump_requests, &mut valve_targets);

        for i in 0..self.valves.len() {
            self.valves[i].logic();
            match valve_targets[i] {
                Some(ValveCommand::Mixing(target)) => {
                    self.valves[i].control(&self.hw, now, target)?;
                }
                Some(ValveCommand::Isolation(open)) => {
                    self.valves[i].set_open(open)?;
                }
                Some(ValveCommand::Exercise) => {
                    self.valves[i].request_pth(1000);
                }
                None => {}
            }
            self.valves[i].run(&mut self.hw, now)?;
        }

        for i in 0..self.pumps.len() {
            self.pumps[i].request_on(pump_requests[i]);
            self.pumps[i].run(&mut self.hw)?;
        }

        self.hw.output_all()?;
        Ok(())
    }

    /// Exercises idle pumps/valves during summer to prevent seizing: pumps
    /// first (they have no position to restore afterward), then valves.
    fn run_summer_maintenance(&mut self, now: TimekeepT, pump_requests: &mut [bool], valve_targets: &mut [Option<ValveCommand>]) {
        if !self.summer.enabled {
            return;
        }
        if now.saturating_sub(self.last_summer_run) >= self.summer.run_interval {
            self.last_summer_run = now;
            self.summer_exercise_until = now + self.summer.run_duration;
            debug!(target: "plant", "summer maintenance: starting exercise window until tick {}", self.summer_exercise_until);
        }
        if now >= self.summer_exercise_until {
            return;
        }
        for requested in pump_requests.iter_mut() {
            if !*requested {
                *requested = true;
            }
        }
        for target in valve_targets.iter_mut() {
            if target.is_none() {
                *target = Some(ValveCommand::Exercise);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ValveCommand {
    Mixing(crate::temp::TempT),
    Isolation(bool),
    /// Drives the valve fully open by raw travel request, bypassing both
    /// `control()`'s mixing algorithm and `set_open()`'s isolation-only
    /// check, so it applies uniformly to either valve kind. Used only to
    /// exercise an otherwise-idle valve during summer maintenance.
    Exercise,
}

/// How a charging DHWT's `dhwt_cprio` constrains a heating circuit sharing
/// its heat source this tick (spec.md §4.4's "priority among DHWTs ... to
/// order concurrent requests", generalised to circuit-vs-tank arbitration
/// since a single heat source is the only thing actually contended).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitArbitration {
    /// No DHWT charging on this heat source with a priority that restricts
    /// circuits (or `ParalMax`/`ParalDhw`, which run circuits unrestricted).
    Unrestricted,
    /// `SlidMax`/`SlidDhw`: circuits may still ask for heat, but not more
    /// than this ceiling, so the charging tank's own demand always wins.
    CappedAt(i32),
    /// `Absolute`: circuits get nothing while the tank is charging.
    Suppressed,
}

impl CircuitArbitration {
    /// Combines this heat source's arbitration with another charging DHWT's
    /// request, keeping whichever is more restrictive.
    fn most_restrictive(self, other: CircuitArbitration) -> CircuitArbitration {
        match (self, other) {
            (CircuitArbitration::Suppressed, _) | (_, CircuitArbitration::Suppressed) => CircuitArbitration::Suppressed,
            (CircuitArbitration::CappedAt(a), CircuitArbitration::CappedAt(b)) => CircuitArbitration::CappedAt(a.min(b)),
            (CircuitArbitration::CappedAt(a), CircuitArbitration::Unrestricted) => CircuitArbitration::CappedAt(a),
            (CircuitArbitration::Unrestricted, CircuitArbitration::CappedAt(b)) => CircuitArbitration::CappedAt(b),
            (CircuitArbitration::Unrestricted, CircuitArbitration::Unrestricted) => CircuitArbitration::Unrestricted,
        }
    }

    /// Applies this arbitration to a circuit's heat request, returning
    /// `None` if it should be dropped entirely this tick.
    fn apply(self, request: i32) -> Option<i32> {
        match self {
            CircuitArbitration::Unrestricted => Some(request),
            CircuitArbitration::CappedAt(cap) => Some(request.min(cap)),
            CircuitArbitration::Suppressed => None,
        }
    }
}

fn merge_max(slot: &mut Option<i32>, value: i32) {
    *slot = Some(match *slot {
        Some(existing) => existing.max(value),
        None => value,
    });
}

fn hs_allow_idle_keepwarm_mark(flags: &mut [bool], idx: Option<usize>) {
    if let Some(idx) = idx {
        if let Some(flag) = flags.get_mut(idx) {
            *flag = true;
        }
    }
}
