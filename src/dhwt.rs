//! Domestic hot water tank: computes a target storage temperature from
//! mode/legionella/manual override, runs a hysteresis charge cycle against
//! the top/bottom sensors, and emits a heat request plus pump/valve/
//! self-heater commands.

use log::{debug, info, warn};

use crate::error::{EngineError, ErrorKind};
use crate::ids::{RelayId, SensorId};
use crate::mode::{DhwtCprio, DhwtState, ForceMode, RunMode};
use crate::temp::{Reading, TempT};
use crate::time::TimekeepT;

#[derive(Debug, Clone)]
pub struct DhwtParams {
    pub t_comfort: TempT,
    pub t_eco: TempT,
    pub t_frostfree: TempT,
    pub t_legionella: TempT,
    pub limit_tmin: TempT,
    pub limit_tmax: TempT,
    /// Reduced ceiling applied when the upstream cold feed (`tid_win`) is
    /// itself cold, to avoid demanding an unreasonable delta from the
    /// source. A win reading below `t_frostfree` is treated as "cold".
    pub limit_wintmax: TempT,
    pub hysteresis: TempT,
    /// Zero disables the charge-time cutoff.
    pub limit_chargetime: TimekeepT,
    pub electric_failover: bool,
    pub anti_legionella: bool,
    pub legionella_interval: TimekeepT,
    pub legionella_recycle: bool,
}

pub struct Dhwt {
    name: String,
    tid_top: Option<SensorId>,
    tid_bot: Option<SensorId>,
    tid_win: Option<SensorId>,
    tid_wout: Option<SensorId>,
    rid_selfheater: Option<RelayId>,
    feed_pump_idx: Option<usize>,
    recycle_pump_idx: Option<usize>,
    hwisol_valve_idx: Option<usize>,
    heatsource_idx: Option<usize>,
    params: DhwtParams,
    cprio: DhwtCprio,
    force_mode: ForceMode,

    runmode: RunMode,
    prev_runmode: RunMode,
    charging: bool,
    charge_start: TimekeepT,
    legionella_active: bool,
    last_legionella_tick: Option<TimekeepT>,
    manual_override: Option<TempT>,
    last_target: Option<TempT>,
    online: bool,
}

pub struct DhwtOutput {
    pub heat_request: Option<TempT>,
    pub wants_feed_pump: bool,
    pub wants_recycle_pump: bool,
    pub selfheater_on: bool,
    pub state: DhwtState,
}

impl Dhwt {
    pub fn new(name: impl Into<String>, params: DhwtParams, cprio: DhwtCprio, force_mode: ForceMode) -> Self {
        Dhwt {
            name: name.into(),
            tid_top: None,
            tid_bot: None,
            tid_win: None,
            tid_wout: None,
            rid_selfheater: None,
            feed_pump_idx: None,
            recycle_pump_idx: None,
            hwisol_valve_idx: None,
            heatsource_idx: None,
            params,
            cprio,
            force_mode,
            runmode: RunMode::Off,
            prev_runmode: RunMode::Off,
            charging: false,
            charge_start: 0,
            legionella_active: false,
            last_legionella_tick: None,
            manual_override: None,
            last_target: None,
            online: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cprio(&self) -> DhwtCprio {
        self.cprio
    }

    pub fn heatsource_idx(&self) -> Option<usize> {
        self.heatsource_idx
    }

    pub fn feed_pump_idx(&self) -> Option<usize> {
        self.feed_pump_idx
    }

    pub fn recycle_pump_idx(&self) -> Option<usize> {
        self.recycle_pump_idx
    }

    pub fn hwisol_valve_idx(&self) -> Option<usize> {
        self.hwisol_valve_idx
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    pub fn limit_tmax(&self) -> TempT {
        self.params.limit_tmax
    }

    /// The target storage temperature computed on the most recent `compute()`
    /// call, used by the plant to cap circuit demand under `SlidDhw`
    /// priority. `None` before the first tick.
    pub fn current_target(&self) -> Option<TempT> {
        self.last_target
    }

    pub fn set_top_sensor(&mut self, sid: SensorId) {
        self.tid_top = Some(sid);
    }

    pub fn set_bot_sensor(&mut self, sid: SensorId) {
        self.tid_bot = Some(sid);
    }

    pub fn set_win_sensor(&mut self, sid: SensorId) {
        self.tid_win = Some(sid);
    }

    pub fn set_wout_sensor(&mut self, sid: SensorId) {
        self.tid_wout = Some(sid);
    }

    pub fn set_selfheater_relay(&mut self, rid: RelayId) {
        self.rid_selfheater = Some(rid);
    }

    pub fn set_feed_pump(&mut self, idx: usize) {
        self.feed_pump_idx = Some(idx);
    }

    pub fn set_recycle_pump(&mut self, idx: usize) {
        self.recycle_pump_idx = Some(idx);
    }

    pub fn set_hwisol_valve(&mut self, idx: usize) {
        self.hwisol_valve_idx = Some(idx);
    }

    pub fn set_heatsource(&mut self, idx: usize) {
        self.heatsource_idx = Some(idx);
    }

    pub fn set_runmode(&mut self, mode: RunMode) {
        self.runmode = mode;
    }

    pub fn set_manual_override(&mut self, target: Option<TempT>) {
        self.manual_override = target;
    }

    pub fn online(&mut self) -> Result<(), EngineError> {
        if self.tid_top.is_none() && self.tid_bot.is_none() {
            return Err(EngineError::new(
                ErrorKind::NotConfigured,
                format!("dhwt {} needs at least one of tid_top/tid_bot", self.name),
            ));
        }
        self.online = true;
        self.charging = false;
        Ok(())
    }

    pub fn offline(&mut self) {
        self.online = false;
        self.charging = false;
        self.legionella_active = false;
    }

    fn scheduled_target(&self) -> Option<TempT> {
        match self.runmode {
            RunMode::Off => None,
            RunMode::Comfort | RunMode::Auto | RunMode::Test => Some(self.params.t_comfort),
            RunMode::Eco => Some(self.params.t_eco),
            RunMode::FrostFree => Some(self.params.t_frostfree),
            RunMode::DhwOnly => Some(self.params.t_comfort),
        }
    }

    fn read(registry: &crate::hw::HwRegistry, sid: Option<SensorId>) -> Result<Option<TempT>, EngineError> {
        match sid {
            None => Ok(None),
            Some(sid) => match registry.sensor_clone_temp(sid)? {
                Reading::Valid(t) => Ok(Some(t)),
                fault => Err(EngineError::new(fault.kind(), format!("dhwt sensor {sid} fault: {fault}"))),
            },
        }
    }

    /// Computes this tick's target, runs the charge-cycle state machine,
    /// and returns the resulting demand. Call once per tick, after
    /// `input()`.
    pub fn compute(&mut self, registry: &crate::hw::HwRegistry, now: TimekeepT) -> Result<DhwtOutput, EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, format!("dhwt {} is offline", self.name)));
        }

        if let Some(target) = self.manual_override {
            self.last_target = Some(target);
            return Ok(DhwtOutput {
                heat_request: Some(target),
                wants_feed_pump: true,
                wants_recycle_pump: false,
                selfheater_on: false,
                state: DhwtState::Manual,
            });
        }

        let transitioned_active = self.prev_runmode != self.runmode && self.runmode != RunMode::Off;
        self.prev_runmode = self.runmode;

        let Some(mut target) = self.scheduled_target() else {
            self.charging = false;
            self.last_target = None;
            return Ok(DhwtOutput {
                heat_request: None,
                wants_feed_pump: false,
                wants_recycle_pump: false,
                selfheater_on: false,
                state: DhwtState::Off,
            });
        };

        // Legionella: raise target at most once per configured interval.
        if self.params.anti_legionella {
            let due = match self.last_legionella_tick {
                None => true,
                Some(last) => now.saturating_sub(last) >= self.params.legionella_interval,
            };
            if due && !self.legionella_active {
                self.legionella_active = true;
                self.charging = true;
                self.charge_start = now;
                info!(target: "dhwt", "{}: starting legionella cycle", self.name);
            }
        }
        if self.legionella_active {
            target = self.params.t_legionella;
        }

        if let Some(win) = Self::read(registry, self.tid_win)? {
            if win < self.params.t_frostfree {
                target = target.min(self.params.limit_wintmax);
            }
        }
        target = target.clamp(self.params.limit_tmin, self.params.limit_tmax);
        self.last_target = Some(target);

        if transitioned_active {
            match self.force_mode {
                ForceMode::Never => {}
                ForceMode::First if self.prev_runmode == RunMode::Off => self.begin_charge(now),
                ForceMode::First => {}
                ForceMode::Always => self.begin_charge(now),
            }
        }

        let start_sensor = Self::read(registry, self.tid_top.or(self.tid_bot))?;
        let end_sensor = Self::read(registry, self.tid_bot.or(self.tid_win))?;

        if !self.charging {
            if let Some(s) = start_sensor {
                if s < target - self.params.hysteresis {
                    self.begin_charge(now);
                }
            }
        } else if let Some(e) = end_sensor {
            if e >= target {
                debug!(target: "dhwt", "{}: charge complete", self.name);
                self.charging = false;
                if self.legionella_active {
                    self.legionella_active = false;
                    self.last_legionella_tick = Some(now);
                }
            }
        }

        let mut selfheater_on = false;
        if self.charging && self.params.limit_chargetime > 0 {
            let elapsed = now.saturating_sub(self.charge_start);
            if elapsed > self.params.limit_chargetime {
                if self.params.electric_failover {
                    warn!(target: "dhwt", "{}: charge exceeded limit_chargetime, engaging self-heater", self.name);
                    selfheater_on = true;
                } else {
                    warn!(target: "dhwt", "{}: charge exceeded limit_chargetime, no electric failover configured", self.name);
                }
            }
        }

        let state = if self.legionella_active {
            DhwtState::Legionella
        } else if self.charging {
            DhwtState::Charging
        } else {
            match self.runmode {
                RunMode::Test => DhwtState::Test,
                RunMode::Comfort | RunMode::Auto | RunMode::DhwOnly => DhwtState::Comfort,
                RunMode::Eco => DhwtState::Eco,
                RunMode::FrostFree => DhwtState::FrostFree,
                RunMode::Off => DhwtState::Off,
            }
        };

        Ok(DhwtOutput {
            heat_request: if self.charging { Some(target) } else { None },
            wants_feed_pump: self.charging,
            wants_recycle_pump: self.legionella_active && self.params.legionella_recycle,
            selfheater_on,
            state,
        })
    }

    fn begin_charge(&mut self, now: TimekeepT) {
        if !self.charging {
            self.charging = true;
            self.charge_start = now;
            info!(target: "dhwt", "{}: beginning charge", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::dummy::DummyBackend;
    use crate::hw::HwRegistry;
    use crate::temp::from_celsius;

    fn default_params() -> DhwtParams {
        DhwtParams {
            t_comfort: from_celsius(55.0),
            t_eco: from_celsius(45.0),
            t_frostfree: from_celsius(7.0),
            t_legionella: from_celsius(65.0),
            limit_tmin: from_celsius(5.0),
            limit_tmax: from_celsius(70.0),
            limit_wintmax: from_celsius(60.0),
            hysteresis: from_celsius(5.0),
            limit_chargetime: 0,
            electric_failover: false,
            anti_legionella: false,
            legionella_interval: 0,
            legionella_recycle: false,
        }
    }

    fn make(bot_temp: TempT) -> (HwRegistry, Dhwt) {
        let mut backend = DummyBackend::new();
        let bot = backend.add_sensor("bot", Reading::Valid(bot_temp));
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        let mut dhwt = Dhwt::new("tank", default_params(), DhwtCprio::ParalMax, ForceMode::Never);
        dhwt.set_bot_sensor(SensorId { backend: 0, object: bot });
        dhwt.set_runmode(RunMode::Comfort);
        dhwt.online().unwrap();
        (registry, dhwt)
    }

    #[test]
    fn test_charge_begins_below_hysteresis_and_ends_at_target() {
        let (mut registry, mut dhwt) = make(from_celsius(49.0));
        let out = dhwt.compute(&registry, 0).unwrap();
        assert!(dhwt.is_charging());
        assert_eq!(out.heat_request, Some(from_celsius(55.0)));

        registry
            .backend_any_mut(0)
            .downcast_mut::<DummyBackend>()
            .unwrap()
            .set_sensor(0, Reading::Valid(from_celsius(55.0)), 10);
        let out2 = dhwt.compute(&registry, 10).unwrap();
        assert!(!dhwt.is_charging());
        assert_eq!(out2.heat_request, None);
    }

    #[test]
    fn test_electric_failover_engages_after_chargetime_exceeded() {
        let (mut registry, mut dhwt) = make(from_celsius(49.0));
        dhwt.params.limit_chargetime = 3600;
        dhwt.params.electric_failover = true;

        let out = dhwt.compute(&registry, 0).unwrap();
        assert!(!out.selfheater_on);

        registry
            .backend_any_mut(0)
            .downcast_mut::<DummyBackend>()
            .unwrap()
            .set_sensor(0, Reading::Valid(from_celsius(49.0)), 0);
        let out2 = dhwt.compute(&registry, 3700).unwrap();
        assert!(out2.selfheater_on);
    }

    #[test]
    fn test_off_mode_never_charges() {
        let (registry, mut dhwt) = make(from_celsius(10.0));
        dhwt.set_runmode(RunMode::Off);
        let out = dhwt.compute(&registry, 0).unwrap();
        assert_eq!(out.heat_request, None);
        assert!(!dhwt.is_charging());
    }
}
