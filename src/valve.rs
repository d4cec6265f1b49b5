//! Motorised valve: translates a target temperature (or a raw per-mille
//! request) into timed open/close pulses on a relay pair, while tracking
//! estimated travel position.
//!
//! Three mixing algorithms are supported (bang-bang, successive
//! approximation, velocity-form PI); an isolation valve skips the algorithm
//! entirely and is only ever commanded fully open or fully closed.

use log::{debug, trace, warn};

use crate::error::{ControlOutcome, EngineError, ErrorKind};
use crate::hw::HwRegistry;
use crate::ids::{RelayId, SensorId};
use crate::temp::{Reading, TempT};
use crate::time::TimekeepT;

/// Full travel runs, past which a valve that is still requesting the same
/// direction is considered stalled (no end-stop feedback, so this is our
/// only notion of "it must have arrived by now").
const VALVE_MAX_RUNX: u64 = 3;

/// Fixed-point scale for the PI controller's internal fractional math.
/// >= 20 bits of fraction keeps `Kp * 1000 * (tempin_h - tempin_l)`
/// comfortably inside an i64 across realistic temperature ranges.
const FPDEC: i64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stop,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneF {
    Aggressive,
    Moderate,
    Conservative,
}

impl TuneF {
    fn factor(&self) -> i64 {
        match self {
            TuneF::Aggressive => 1,
            TuneF::Moderate => 10,
            TuneF::Conservative => 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BangBangConfig {
    pub tid_out: SensorId,
    pub tdeadzone: TempT,
}

#[derive(Debug, Clone)]
pub struct SApproxConfig {
    pub tid_out: SensorId,
    pub tdeadzone: TempT,
    /// Step size as a percentage of full course, `1..=100`.
    pub amount: u16,
    pub sample_intvl: TimekeepT,
}

struct SApproxState {
    cfg: SApproxConfig,
    last_sample_time: TimekeepT,
}

#[derive(Debug, Clone)]
pub struct PiConfig {
    pub tid_hot: SensorId,
    pub tid_out: SensorId,
    pub tid_cold: Option<SensorId>,
    pub tdeadzone: TempT,
    /// Maximum observable delta produced by a full-course step (K, as
    /// millidegrees); used to estimate `tempin_l` when `tid_cold` is absent.
    pub ksmax: TempT,
    pub tu: TimekeepT,
    pub td: TimekeepT,
    pub tune_f: TuneF,
    pub sample_intvl: TimekeepT,
}

struct PiState {
    cfg: PiConfig,
    kp_fixed: i64,
    last_sample_time: TimekeepT,
    tempin_h: Option<TempT>,
    tempin_l: Option<TempT>,
    prev_out: TempT,
    db_acc: i64,
    ctrl_ready: bool,
}

impl PiState {
    fn new(cfg: PiConfig) -> Result<Self, EngineError> {
        if cfg.tu == 0 || cfg.td == 0 || cfg.ksmax <= 0 {
            return Err(EngineError::new(
                ErrorKind::Misconfigured,
                "PI valve gains (Tu, Td, Ksmax) must all be positive",
            ));
        }
        if cfg.sample_intvl > cfg.tu / 4 {
            return Err(EngineError::new(
                ErrorKind::Misconfigured,
                "PI valve sample_intvl exceeds Tu/4 (Nyquist)",
            ));
        }
        let tu = cfg.tu as i64;
        let td = cfg.td as i64;
        let tc = (tu.max(8 * td) * cfg.tune_f.factor()) / 10;
        let kp_fixed = tu * FPDEC / (td + tc);
        Ok(PiState {
            cfg,
            kp_fixed,
            last_sample_time: 0,
            tempin_h: None,
            tempin_l: None,
            prev_out: 0,
            db_acc: 0,
            ctrl_ready: false,
        })
    }
}

pub enum MixAlgorithmConfig {
    BangBang(BangBangConfig),
    SApprox(SApproxConfig),
    Pi(PiConfig),
}

enum MixAlgorithm {
    BangBang(BangBangConfig),
    SApprox(SApproxState),
    Pi(PiState),
}

pub enum ValveKind {
    /// A 2-way or 3-way valve under continuous control towards a target
    /// outlet temperature.
    Mixing(MixAlgorithmConfig),
    /// A 2-way or 3-way valve only ever commanded fully open or fully
    /// closed. `reverse` swaps which relay means "open".
    Isolation { reverse: bool },
}

enum Kind {
    Mixing(MixAlgorithm),
    Isolation { reverse: bool },
}

enum Decision {
    Pth(i32),
    Stop,
    Deadzone,
    NotDue,
}

pub struct Valve {
    name: String,
    ete_time: TimekeepT,
    /// Minimum `|perth|` a `request_pth` must carry to be actioned.
    deadband: i32,

    relay_open: Option<RelayId>,
    relay_close: Option<RelayId>,

    kind: Kind,

    actual_position: i32,
    target_course: i32,
    actual_action: Action,
    request_action: Action,
    acc_open_time: TimekeepT,
    acc_close_time: TimekeepT,
    true_pos: bool,
    last_run_time: TimekeepT,
    online: bool,
}

impl Valve {
    pub fn new(name: impl Into<String>, ete_time: TimekeepT, deadband: i32, kind: ValveKind) -> Self {
        let kind = match kind {
            ValveKind::Mixing(alg) => Kind::Mixing(match alg {
                MixAlgorithmConfig::BangBang(cfg) => MixAlgorithm::BangBang(cfg),
                MixAlgorithmConfig::SApprox(cfg) => MixAlgorithm::SApprox(SApproxState {
                    cfg,
                    last_sample_time: 0,
                }),
                // Construction-time validation errors surface via `try_new`
                // below; this path is only reached from there.
                MixAlgorithmConfig::Pi(cfg) => MixAlgorithm::Pi(
                    PiState::new(cfg).expect("Pi config must be pre-validated by Valve::try_new"),
                ),
            }),
            ValveKind::Isolation { reverse } => Kind::Isolation { reverse },
        };
        Valve {
            name: name.into(),
            ete_time,
            deadband,
            relay_open: None,
            relay_close: None,
            kind,
            actual_position: 0,
            target_course: 0,
            actual_action: Action::Stop,
            request_action: Action::Stop,
            acc_open_time: 0,
            acc_close_time: 0,
            true_pos: false,
            last_run_time: 0,
            online: false,
        }
    }

    /// Fallible constructor: validates PI gains/Nyquist constraints up
    /// front instead of panicking at first use.
    pub fn try_new(
        name: impl Into<String>,
        ete_time: TimekeepT,
        deadband: i32,
        kind: ValveKind,
    ) -> Result<Self, EngineError> {
        if let ValveKind::Mixing(MixAlgorithmConfig::Pi(ref cfg)) = kind {
            PiState::new(cfg.clone())?;
        }
        Ok(Valve::new(name, ete_time, deadband, kind))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_relays(&mut self, relay_open: RelayId, relay_close: RelayId) {
        self.relay_open = Some(relay_open);
        self.relay_close = Some(relay_close);
    }

    pub fn actual_position(&self) -> i32 {
        self.actual_position
    }

    pub fn actual_action(&self) -> Action {
        self.actual_action
    }

    pub fn true_pos(&self) -> bool {
        self.true_pos
    }

    pub fn online(&mut self, registry: &HwRegistry) -> Result<(), EngineError> {
        let (open, close) = self.relays()?;
        registry.relay_get_state(open)?;
        registry.relay_get_state(close)?;
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self, registry: &mut HwRegistry) -> Result<(), EngineError> {
        if let (Some(open), Some(close)) = (self.relay_open, self.relay_close) {
            let _ = registry.relay_set_state(open, false, 0);
            let _ = registry.relay_set_state(close, false, 0);
        }
        self.online = false;
        self.acc_open_time = 0;
        self.acc_close_time = 0;
        self.actual_action = Action::Stop;
        self.request_action = Action::Stop;
        Ok(())
    }

    fn relays(&self) -> Result<(RelayId, RelayId), EngineError> {
        match (self.relay_open, self.relay_close) {
            (Some(o), Some(c)) => Ok((o, c)),
            _ => Err(EngineError::new(
                ErrorKind::NotConfigured,
                format!("valve {} has no relays bound", self.name),
            )),
        }
    }

    /// Requests a raw per-mille movement: negative closes, positive opens.
    pub fn request_pth(&mut self, perth: i32) -> ControlOutcome<()> {
        if perth.abs() < self.deadband {
            return ControlOutcome::Deadband;
        }
        let clamped = perth.clamp(-1000, 1000);
        self.request_action = if clamped < 0 { Action::Close } else { Action::Open };
        self.target_course = clamped.abs();
        ControlOutcome::Applied(())
    }

    pub fn request_stop(&mut self) {
        self.request_action = Action::Stop;
        self.target_course = 0;
    }

    /// Binary isolation command; not valid for a mixing valve.
    pub fn set_open(&mut self, open: bool) -> Result<(), EngineError> {
        let reverse = match self.kind {
            Kind::Isolation { reverse } => reverse,
            Kind::Mixing(_) => {
                return Err(EngineError::new(
                    ErrorKind::Misconfigured,
                    format!("valve {} is a mixing valve, not isolation", self.name),
                ))
            }
        };
        let want_open = open != reverse;
        self.request_pth(if want_open { 1000 } else { -1000 });
        Ok(())
    }

    /// Anti-stall rule: if we've been driving one direction for
    /// `VALVE_MAX_RUNX * ete_time` while still requesting it, assume we've
    /// reached the end stop and stop requesting further travel.
    pub fn logic(&mut self) {
        let threshold = VALVE_MAX_RUNX * self.ete_time;
        match self.request_action {
            Action::Open if self.acc_open_time >= threshold => {
                self.true_pos = true;
                self.request_stop();
            }
            Action::Close if self.acc_close_time >= threshold => {
                self.true_pos = true;
                self.request_stop();
            }
            _ => {}
        }
    }

    /// Drives the mixing algorithm towards `target_tout`. No-op for
    /// isolation valves (use `set_open` instead).
    pub fn control(
        &mut self,
        registry: &HwRegistry,
        now: TimekeepT,
        target_tout: TempT,
    ) -> Result<ControlOutcome<()>, EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, format!("valve {} is offline", self.name)));
        }
        let decision = match &mut self.kind {
            Kind::Isolation { .. } => {
                return Err(EngineError::new(
                    ErrorKind::Misconfigured,
                    format!("valve {} is an isolation valve; use set_open()", self.name),
                ))
            }
            Kind::Mixing(MixAlgorithm::BangBang(cfg)) => bangbang_decide(registry, cfg, target_tout)?,
            Kind::Mixing(MixAlgorithm::SApprox(state)) => sapprox_decide(registry, now, state, target_tout)?,
            Kind::Mixing(MixAlgorithm::Pi(state)) => pi_decide(registry, now, state, target_tout, self.deadband)?,
        };
        Ok(match decision {
            Decision::Pth(p) => self.request_pth(p),
            Decision::Stop => {
                self.request_stop();
                ControlOutcome::Applied(())
            }
            Decision::Deadzone => ControlOutcome::Deadzone,
            Decision::NotDue => ControlOutcome::Applied(()),
        })
    }

    /// Samples elapsed time, accumulates travel, and drives the relays with
    /// break-before-make. Failures still attempt to de-energise both
    /// relays before propagating the first error (fail-safe).
    pub fn run(&mut self, registry: &mut HwRegistry, now: TimekeepT) -> Result<(), EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, format!("valve {} is offline", self.name)));
        }
        let (relay_open, relay_close) = self.relays()?;

        let dt = now.saturating_sub(self.last_run_time);
        self.last_run_time = now;

        if dt > 0 {
            let course = (((dt * 1000) + self.ete_time / 2) / self.ete_time) as i32;
            match self.actual_action {
                Action::Open => {
                    self.acc_open_time += dt;
                    self.acc_close_time = 0;
                    self.actual_position = (self.actual_position + course).clamp(0, 1000);
                }
                Action::Close => {
                    self.acc_close_time += dt;
                    self.acc_open_time = 0;
                    self.actual_position = (self.actual_position - course).clamp(0, 1000);
                }
                Action::Stop => {
                    self.acc_open_time = 0;
                    self.acc_close_time = 0;
                }
            }

            // Prevent overshoot-bounce: if we're nearly at the requested
            // course already, stop instead of issuing one more tiny pulse.
            if self.request_action != Action::Stop {
                let remaining = self.target_course - course;
                if remaining < course / 2 {
                    self.request_stop();
                } else {
                    self.target_course = remaining;
                }
            }
        }

        let drive = |registry: &mut HwRegistry, action: Action| -> Result<(), EngineError> {
            match action {
                Action::Open => {
                    registry.relay_set_state(relay_close, false, 0)?;
                    registry.relay_set_state(relay_open, true, 0)
                }
                Action::Close => {
                    registry.relay_set_state(relay_open, false, 0)?;
                    registry.relay_set_state(relay_close, true, 0)
                }
                Action::Stop => {
                    registry.relay_set_state(relay_open, false, 0)?;
                    registry.relay_set_state(relay_close, false, 0)
                }
            }
        };

        match drive(registry, self.request_action) {
            Ok(()) => {
                self.actual_action = self.request_action;
                trace!(target: "valve", "{}: position {} action {:?}", self.name, self.actual_position, self.actual_action);
                Ok(())
            }
            Err(first_err) => {
                warn!(target: "valve", "{}: relay set failed, forcing both relays off: {}", self.name, first_err);
                let _ = registry.relay_set_state(relay_open, false, 0);
                let _ = registry.relay_set_state(relay_close, false, 0);
                self.actual_action = Action::Stop;
                Err(first_err)
            }
        }
    }
}

fn read_temp(registry: &HwRegistry, sid: SensorId) -> Result<TempT, EngineError> {
    let reading = registry.sensor_clone_temp(sid)?;
    match reading {
        Reading::Valid(t) => Ok(t),
        fault => Err(EngineError::new(fault.kind(), format!("sensor {sid} read failed: {fault}"))),
    }
}

fn bangbang_decide(
    registry: &HwRegistry,
    cfg: &BangBangConfig,
    target: TempT,
) -> Result<Decision, EngineError> {
    let tempout = read_temp(registry, cfg.tid_out)?;
    if (tempout - target).abs() < cfg.tdeadzone / 2 {
        return Ok(Decision::Deadzone);
    }
    Ok(Decision::Pth(if tempout < target { 1000 } else { -1000 }))
}

fn sapprox_decide(
    registry: &HwRegistry,
    now: TimekeepT,
    state: &mut SApproxState,
    target: TempT,
) -> Result<Decision, EngineError> {
    if now.saturating_sub(state.last_sample_time) < state.cfg.sample_intvl {
        return Ok(Decision::NotDue);
    }
    state.last_sample_time = now;

    let tempout = read_temp(registry, state.cfg.tid_out)?;
    if (tempout - target).abs() < state.cfg.tdeadzone / 2 {
        return Ok(Decision::Deadzone);
    }
    let step = (state.cfg.amount.clamp(1, 100) as i32) * 10;
    if tempout < target - state.cfg.tdeadzone / 2 {
        Ok(Decision::Pth(step))
    } else if tempout > target + state.cfg.tdeadzone / 2 {
        Ok(Decision::Pth(-step))
    } else {
        Ok(Decision::Stop)
    }
}

fn pi_decide(
    registry: &HwRegistry,
    now: TimekeepT,
    state: &mut PiState,
    target: TempT,
    deadband: i32,
) -> Result<Decision, EngineError> {
    let dt = now.saturating_sub(state.last_sample_time);
    if dt < state.cfg.sample_intvl {
        return Ok(Decision::NotDue);
    }

    let tempout = read_temp(registry, state.cfg.tid_out)?;
    if (tempout - target).abs() < state.cfg.tdeadzone / 2 {
        state.ctrl_ready = false;
        return Ok(Decision::Deadzone);
    }

    let tempin_h_raw = read_temp(registry, state.cfg.tid_hot)?;
    let mut tempin_h = tempin_h_raw;
    let mut tempin_l = match state.cfg.tid_cold {
        Some(sid) => read_temp(registry, sid)?,
        None => tempin_h_raw - state.cfg.ksmax,
    };

    if tempout > tempin_h {
        tempin_h = tempout;
    }
    if tempout < tempin_l {
        tempin_l = tempout;
    }

    if target <= tempin_l {
        state.ctrl_ready = false;
        debug!(target: "valve", "PI saturated low: target {target} <= tempin_l {tempin_l}");
        return Ok(Decision::Pth(-1000));
    }
    if target >= tempin_h {
        state.ctrl_ready = false;
        debug!(target: "valve", "PI saturated high: target {target} >= tempin_h {tempin_h}");
        return Ok(Decision::Pth(1000));
    }

    if tempin_h - tempin_l <= 1000 {
        return Ok(Decision::Deadzone);
    }

    state.tempin_h = Some(tempin_h);
    state.tempin_l = Some(tempin_l);
    state.last_sample_time = now;

    if !state.ctrl_ready {
        state.prev_out = tempout;
        state.db_acc = 0;
        state.ctrl_ready = true;
        return Ok(Decision::NotDue);
    }

    let kp = state.kp_fixed * 1000 / (tempin_h - tempin_l) as i64;
    let ti = state.cfg.tu as i64;

    let e = (target - tempout) as i64;
    let i_term = (kp * e / ti) * dt as i64;
    let p_term = kp * (state.prev_out - tempout) as i64;
    let pthfl = i_term + p_term + state.db_acc;
    let perth = (pthfl / FPDEC) as i32;

    // Mirrors the deadband check `Valve::request_pth` is about to make with
    // the same threshold: a request too small to move the valve still
    // accumulates its integral term instead of being silently dropped.
    if perth.abs() < deadband {
        state.db_acc += i_term;
    } else {
        state.db_acc = 0;
        state.prev_out = tempout;
    }

    Ok(Decision::Pth(perth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::dummy::DummyBackend;
    use crate::temp::from_celsius;

    fn registry_with_valve_relays() -> (HwRegistry, RelayId, RelayId) {
        let mut backend = DummyBackend::new();
        let open = backend.add_relay("open");
        let close = backend.add_relay("close");
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        (
            registry,
            RelayId { backend: 0, object: open },
            RelayId { backend: 0, object: close },
        )
    }

    #[test]
    fn test_position_stays_in_bounds() {
        let (mut registry, open, close) = registry_with_valve_relays();
        let mut valve = Valve::new(
            "v",
            100,
            20,
            ValveKind::Isolation { reverse: false },
        );
        valve.set_relays(open, close);
        valve.online(&registry).unwrap();
        valve.set_open(true).unwrap();
        for t in (0..2000).step_by(50) {
            valve.run(&mut registry, t).unwrap();
            assert!(valve.actual_position() >= 0 && valve.actual_position() <= 1000);
        }
        assert_eq!(valve.actual_position(), 1000);
    }

    #[test]
    fn test_exactly_one_relay_on_when_not_stopped() {
        let (mut registry, open, close) = registry_with_valve_relays();
        let mut valve = Valve::new("v", 100, 20, ValveKind::Isolation { reverse: false });
        valve.set_relays(open, close);
        valve.online(&registry).unwrap();
        valve.set_open(true).unwrap();
        valve.run(&mut registry, 10).unwrap();
        assert_ne!(registry.relay_get_state(open).unwrap(), registry.relay_get_state(close).unwrap());
    }

    #[test]
    fn test_anti_stall_forces_stop_after_max_runx() {
        // A controller that keeps re-requesting full open every tick (small
        // dt relative to ete_time, so the overshoot-bounce check never
        // fires) must still be cut off once it's been driving open for
        // VALVE_MAX_RUNX * ete_time.
        let (mut registry, open, close) = registry_with_valve_relays();
        let ete = 120;
        let mut valve = Valve::new("v", ete, 20, ValveKind::Isolation { reverse: false });
        valve.set_relays(open, close);
        valve.online(&registry).unwrap();

        let mut t = 0;
        for _ in 0..40 {
            valve.set_open(true).unwrap();
            valve.logic();
            t += 10;
            valve.run(&mut registry, t).unwrap();
        }
        assert!(valve.true_pos());
        assert_eq!(valve.actual_action(), Action::Stop);
    }

    #[test]
    fn test_bangbang_deadzone_no_change() {
        let target = from_celsius(50.0);
        let mut backend = DummyBackend::new();
        let tid_out_idx = backend.add_sensor("tout", Reading::Valid(from_celsius(49.8)));
        let open_idx = backend.add_relay("open");
        let close_idx = backend.add_relay("close");
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        let tid_out = SensorId { backend: 0, object: tid_out_idx };
        let open = RelayId { backend: 0, object: open_idx };
        let close = RelayId { backend: 0, object: close_idx };

        let mut valve = Valve::new(
            "v",
            100,
            20,
            ValveKind::Mixing(MixAlgorithmConfig::BangBang(BangBangConfig {
                tid_out,
                tdeadzone: from_celsius(2.0),
            })),
        );
        valve.set_relays(open, close);
        valve.online(&registry).unwrap();
        let outcome = valve.control(&registry, 0, target).unwrap();
        assert_eq!(outcome, ControlOutcome::Deadzone);
        assert_eq!(valve.request_action, Action::Stop);
    }

    #[test]
    fn test_pi_saturation_full_close_when_target_below_cold() {
        let mut backend = DummyBackend::new();
        let tid_out = backend.add_sensor("tout", Reading::Valid(from_celsius(20.0)));
        let tid_hot = backend.add_sensor("thot", Reading::Valid(from_celsius(70.0)));
        let tid_cold = backend.add_sensor("tcold", Reading::Valid(from_celsius(30.0)));
        let open = backend.add_relay("open");
        let close = backend.add_relay("close");
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        let sid = |i| SensorId { backend: 0, object: i };
        let rid = |i| RelayId { backend: 0, object: i };

        let cfg = PiConfig {
            tid_hot: sid(tid_hot),
            tid_out: sid(tid_out),
            tid_cold: Some(sid(tid_cold)),
            tdeadzone: from_celsius(1.0),
            ksmax: from_celsius(30.0),
            tu: 3000,
            td: 300,
            tune_f: TuneF::Moderate,
            sample_intvl: 100,
        };
        let mut valve = Valve::try_new("v", 1200, 20, ValveKind::Mixing(MixAlgorithmConfig::Pi(cfg))).unwrap();
        valve.set_relays(rid(open), rid(close));
        valve.online(&registry).unwrap();

        // target (25C) below tempin_l (30C) => full close regardless of gains.
        let outcome = valve.control(&registry, 1000, from_celsius(25.0)).unwrap();
        assert_eq!(outcome, ControlOutcome::Applied(()));
        assert_eq!(valve.request_action, Action::Close);
        assert_eq!(valve.target_course, 1000);
    }

    #[test]
    fn test_pi_warm_up_produces_small_unsaturated_output() {
        let mut backend = DummyBackend::new();
        let tid_out = backend.add_sensor("tout", Reading::Valid(from_celsius(30.0)));
        let tid_hot = backend.add_sensor("thot", Reading::Valid(from_celsius(70.0)));
        let tid_cold = backend.add_sensor("tcold", Reading::Valid(from_celsius(30.0)));
        let open = backend.add_relay("open");
        let close = backend.add_relay("close");
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        let sid = |i| SensorId { backend: 0, object: i };
        let rid = |i| RelayId { backend: 0, object: i };

        let cfg = PiConfig {
            tid_hot: sid(tid_hot),
            tid_out: sid(tid_out),
            tid_cold: Some(sid(tid_cold)),
            tdeadzone: from_celsius(1.0),
            ksmax: from_celsius(30.0),
            tu: 3000,
            td: 300,
            tune_f: TuneF::Moderate,
            sample_intvl: 100,
        };
        let mut valve = Valve::try_new("v", 1200, 20, ValveKind::Mixing(MixAlgorithmConfig::Pi(cfg))).unwrap();
        valve.set_relays(rid(open), rid(close));
        valve.online(&registry).unwrap();

        let target = from_celsius(50.0);
        // Reset tick: initialises ctrl_ready, returns without a real command.
        let first = valve.control(&registry, 0, target).unwrap();
        assert_eq!(first, ControlOutcome::Applied(()));
        assert_eq!(valve.request_action, Action::Stop);

        // First real control tick: should produce a small positive, non
        // saturating opening request.
        let second = valve.control(&registry, 100, target).unwrap();
        assert_eq!(second, ControlOutcome::Applied(()));
        assert_eq!(valve.request_action, Action::Open);
        assert!(valve.target_course > 0 && valve.target_course < 1000, "course was {}", valve.target_course);
    }
}
