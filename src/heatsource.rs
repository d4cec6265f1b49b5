//! Boiler heat source: consumes the aggregate heat request from downstream
//! circuits/tanks, stages one or two on/off burners around it with
//! hysteresis, and layers anti-freeze and hard-limit protection on top.
//!
//! Only staged on/off burners are modelled (no modulating burners, per the
//! spec's non-goals).

use log::{error, info, warn};

use crate::error::{EngineError, ErrorKind};
use crate::ids::{RelayId, SensorId};
use crate::mode::IdleMode;
use crate::temp::{Reading, TempT};
use crate::time::TimekeepT;

#[derive(Debug, Clone)]
pub struct BoilerParams {
    pub idle_mode: IdleMode,
    pub hysteresis: TempT,
    pub limit_tmin: TempT,
    pub limit_tmax: TempT,
    pub limit_thardmax: TempT,
    pub limit_treturnmin: Option<TempT>,
    pub t_freeze: TempT,
    pub burner_min_time: TimekeepT,
}

impl BoilerParams {
    fn validate(&self) -> Result<(), EngineError> {
        if self.limit_tmax > self.limit_thardmax - 2000 {
            return Err(EngineError::new(
                ErrorKind::Misconfigured,
                "limit_tmax must be at least 2K below limit_thardmax",
            ));
        }
        if self.t_freeze <= 0 {
            return Err(EngineError::new(ErrorKind::Misconfigured, "t_freeze must be positive"));
        }
        Ok(())
    }
}

pub struct HeatSource {
    name: String,
    tid_boiler: SensorId,
    tid_boiler_return: Option<SensorId>,
    rid_burner_1: RelayId,
    rid_burner_2: Option<RelayId>,
    pump_load_idx: Option<usize>,
    valve_ret_idx: Option<usize>,
    params: BoilerParams,

    burner1_on: bool,
    burner1_last_switch: TimekeepT,
    burner1_on_since: Option<TimekeepT>,
    burner2_on: bool,
    burner2_last_switch: TimekeepT,
    antifreeze: bool,
    online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatSourceOutput {
    pub burner1_on: bool,
    pub burner2_on: bool,
    pub antifreeze: bool,
    /// Hard-limit tripped: downstream consumers should shed heat (e.g. run
    /// circuit pumps to dump excess into the building) rather than request
    /// more.
    pub dump_heat: bool,
    pub wants_load_pump: bool,
    /// `Some(target)` when return protection should drive `valve_ret`
    /// towards raising the return temperature to `target`.
    pub return_protection_target: Option<TempT>,
}

impl HeatSource {
    pub fn try_new(
        name: impl Into<String>,
        tid_boiler: SensorId,
        rid_burner_1: RelayId,
        params: BoilerParams,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(HeatSource {
            name: name.into(),
            tid_boiler,
            tid_boiler_return: None,
            rid_burner_1,
            rid_burner_2: None,
            pump_load_idx: None,
            valve_ret_idx: None,
            params,
            burner1_on: false,
            burner1_last_switch: 0,
            burner1_on_since: None,
            burner2_on: false,
            burner2_last_switch: 0,
            antifreeze: false,
            online: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_return_sensor(&mut self, sid: SensorId) {
        self.tid_boiler_return = Some(sid);
    }

    pub fn set_burner_2(&mut self, rid: RelayId) {
        self.rid_burner_2 = Some(rid);
    }

    pub fn set_pump_load(&mut self, idx: usize) {
        self.pump_load_idx = Some(idx);
    }

    pub fn set_valve_ret(&mut self, idx: usize) {
        self.valve_ret_idx = Some(idx);
    }

    pub fn pump_load_idx(&self) -> Option<usize> {
        self.pump_load_idx
    }

    pub fn valve_ret_idx(&self) -> Option<usize> {
        self.valve_ret_idx
    }

    pub fn online(&mut self, registry: &crate::hw::HwRegistry) -> Result<(), EngineError> {
        registry.sensor_clone_temp(self.tid_boiler)?;
        registry.relay_get_state(self.rid_burner_1)?;
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self, registry: &mut crate::hw::HwRegistry) -> Result<(), EngineError> {
        registry.relay_set_state(self.rid_burner_1, false, 0)?;
        if let Some(rid) = self.rid_burner_2 {
            registry.relay_set_state(rid, false, 0)?;
        }
        self.burner1_on = false;
        self.burner2_on = false;
        self.burner1_on_since = None;
        self.antifreeze = false;
        self.online = false;
        Ok(())
    }

    fn set_burner1(&mut self, on: bool, now: TimekeepT) {
        if self.burner1_on != on {
            self.burner1_on = on;
            self.burner1_last_switch = now;
            self.burner1_on_since = if on { Some(now) } else { None };
            info!(target: "heatsource", "{}: burner 1 -> {}", self.name, on);
        }
    }

    fn set_burner2(&mut self, on: bool, now: TimekeepT) {
        if self.burner2_on != on {
            self.burner2_on = on;
            self.burner2_last_switch = now;
            info!(target: "heatsource", "{}: burner 2 -> {}", self.name, on);
        }
    }

    /// `max_request` is the aggregate of every downstream consumer's heat
    /// request this tick (already offset); `None` means nobody wants heat.
    /// `allow_idle_keepwarm` reflects whether the plant's current mode
    /// context is one `IdleMode::FrostOnly` should keep the boiler warm in
    /// (frost-free/auto/comfort), supplied by the plant since the heat
    /// source itself has no notion of schedule.
    pub fn compute(
        &mut self,
        registry: &mut crate::hw::HwRegistry,
        now: TimekeepT,
        max_request: Option<TempT>,
        allow_idle_keepwarm: bool,
    ) -> Result<HeatSourceOutput, EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, format!("heatsource {} is offline", self.name)));
        }

        let boiler_temp = match registry.sensor_clone_temp(self.tid_boiler)? {
            Reading::Valid(t) => t,
            fault => {
                error!(target: "heatsource", "{}: boiler sensor fault ({}), forcing hardmax-protection path", self.name, fault);
                self.set_burner1(false, now);
                self.set_burner2(false, now);
                registry.relay_set_state(self.rid_burner_1, false, self.params.burner_min_time)?;
                if let Some(rid) = self.rid_burner_2 {
                    registry.relay_set_state(rid, false, self.params.burner_min_time)?;
                }
                return Ok(HeatSourceOutput {
                    burner1_on: false,
                    burner2_on: false,
                    antifreeze: false,
                    dump_heat: true,
                    wants_load_pump: false,
                    return_protection_target: None,
                });
            }
        };

        if boiler_temp < self.params.t_freeze {
            if !self.antifreeze {
                warn!(target: "heatsource", "{}: antifreeze engaged at {}mC", self.name, boiler_temp);
            }
            self.antifreeze = true;
        } else if self.antifreeze && boiler_temp > self.params.t_freeze + self.params.hysteresis {
            info!(target: "heatsource", "{}: antifreeze cleared", self.name);
            self.antifreeze = false;
        }

        if boiler_temp >= self.params.limit_thardmax {
            error!(target: "heatsource", "{}: hard limit reached at {}mC, forcing burners off", self.name, boiler_temp);
            self.set_burner1(false, now);
            self.set_burner2(false, now);
            registry.relay_set_state(self.rid_burner_1, false, 0)?;
            if let Some(rid) = self.rid_burner_2 {
                registry.relay_set_state(rid, false, 0)?;
            }
            return Ok(HeatSourceOutput {
                burner1_on: false,
                burner2_on: false,
                antifreeze: self.antifreeze,
                dump_heat: true,
                wants_load_pump: false,
                return_protection_target: None,
            });
        }

        if self.antifreeze {
            // Antifreeze overrides everything else, including burner_min_time.
            self.set_burner1(true, now);
            registry.relay_set_state(self.rid_burner_1, true, 0)?;
            self.set_burner2(false, now);
            if let Some(rid) = self.rid_burner_2 {
                registry.relay_set_state(rid, false, 0)?;
            }
            return Ok(HeatSourceOutput {
                burner1_on: true,
                burner2_on: false,
                antifreeze: true,
                dump_heat: false,
                wants_load_pump: true,
                return_protection_target: self.return_protection_target(registry)?,
            });
        }

        let target = match max_request {
            Some(r) => Some(r.clamp(self.params.limit_tmin, self.params.limit_tmax)),
            None => match self.params.idle_mode {
                IdleMode::Never => Some(self.params.limit_tmin),
                IdleMode::FrostOnly if allow_idle_keepwarm => Some(self.params.limit_tmin),
                IdleMode::FrostOnly | IdleMode::Always => None,
            },
        };

        let min_time_elapsed = |last_switch: TimekeepT| now.saturating_sub(last_switch) >= self.params.burner_min_time;

        match target {
            None => {
                if min_time_elapsed(self.burner1_last_switch) {
                    self.set_burner1(false, now);
                }
                if min_time_elapsed(self.burner2_last_switch) {
                    self.set_burner2(false, now);
                }
            }
            Some(t) => {
                let want_on = if self.burner1_on {
                    boiler_temp < t
                } else {
                    boiler_temp <= t - self.params.hysteresis
                };
                if want_on != self.burner1_on && min_time_elapsed(self.burner1_last_switch) {
                    self.set_burner1(want_on, now);
                }

                if self.rid_burner_2.is_some() {
                    let burner1_insufficient = self.burner1_on
                        && self
                            .burner1_on_since
                            .map(|since| now.saturating_sub(since) >= self.params.burner_min_time)
                            .unwrap_or(false)
                        && t - boiler_temp > self.params.hysteresis;
                    let burner1_would_clear = boiler_temp >= t;

                    if burner1_insufficient && min_time_elapsed(self.burner2_last_switch) {
                        self.set_burner2(true, now);
                    } else if (burner1_would_clear || !self.burner1_on) && min_time_elapsed(self.burner2_last_switch) {
                        self.set_burner2(false, now);
                    }
                }
            }
        }

        registry.relay_set_state(self.rid_burner_1, self.burner1_on, self.params.burner_min_time)?;
        if let Some(rid) = self.rid_burner_2 {
            registry.relay_set_state(rid, self.burner2_on, self.params.burner_min_time)?;
        }

        let return_protection_target = self.return_protection_target(registry)?;

        Ok(HeatSourceOutput {
            burner1_on: self.burner1_on,
            burner2_on: self.burner2_on,
            antifreeze: false,
            dump_heat: false,
            wants_load_pump: self.burner1_on || self.burner2_on || return_protection_target.is_some(),
            return_protection_target,
        })
    }

    fn return_protection_target(&self, registry: &crate::hw::HwRegistry) -> Result<Option<TempT>, EngineError> {
        let (Some(limit), Some(sid)) = (self.params.limit_treturnmin, self.tid_boiler_return) else {
            return Ok(None);
        };
        match registry.sensor_clone_temp(sid)? {
            Reading::Valid(t) if t < limit => Ok(Some(limit)),
            Reading::Valid(_) => Ok(None),
            fault => {
                warn!(target: "heatsource", "{}: return sensor fault ({}), skipping return protection this tick", self.name, fault);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::dummy::DummyBackend;
    use crate::hw::HwRegistry;
    use crate::temp::from_celsius;

    fn make(boiler_temp: TempT) -> (HwRegistry, HeatSource) {
        let mut backend = DummyBackend::new();
        let tid = backend.add_sensor("tboiler", Reading::Valid(boiler_temp));
        let rid = backend.add_relay("burner1");
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        let sid = SensorId { backend: 0, object: tid };
        let rid = RelayId { backend: 0, object: rid };
        let params = BoilerParams {
            idle_mode: IdleMode::Never,
            hysteresis: from_celsius(3.0),
            limit_tmin: from_celsius(20.0),
            limit_tmax: from_celsius(80.0),
            limit_thardmax: from_celsius(95.0),
            limit_treturnmin: None,
            t_freeze: from_celsius(5.0),
            burner_min_time: 0,
        };
        let hs = HeatSource::try_new("boiler", sid, rid, params).unwrap();
        (registry, hs)
    }

    fn set_boiler(registry: &mut HwRegistry, t: TempT, now: TimekeepT) {
        registry.backend_any_mut(0).downcast_mut::<DummyBackend>().unwrap().set_sensor(0, Reading::Valid(t), now);
    }

    #[test]
    fn test_antifreeze_engages_and_clears_with_hysteresis() {
        let (mut registry, mut hs) = make(from_celsius(4.0));
        hs.online(&registry).unwrap();

        let out = hs.compute(&mut registry, 0, None, true).unwrap();
        assert!(out.burner1_on);
        assert!(out.antifreeze);

        set_boiler(&mut registry, from_celsius(8.0), 10);
        let out2 = hs.compute(&mut registry, 10, None, true).unwrap();
        assert!(out2.antifreeze, "8C is still below t_freeze(5) + hysteresis(3) = 8");

        set_boiler(&mut registry, from_celsius(9.0), 20);
        let out3 = hs.compute(&mut registry, 20, None, true).unwrap();
        assert!(!out3.antifreeze);
    }

    #[test]
    fn test_hard_limit_forces_burners_off_and_dumps_heat() {
        let (mut registry, mut hs) = make(from_celsius(95.5));
        hs.online(&registry).unwrap();
        let out = hs.compute(&mut registry, 0, Some(from_celsius(70.0)), true).unwrap();
        assert!(!out.burner1_on);
        assert!(out.dump_heat);
    }

    #[test]
    fn test_burner_min_time_blocks_rapid_toggling() {
        let (mut registry, mut hs) = make(from_celsius(60.0));
        hs.params.burner_min_time = 100;
        hs.online(&registry).unwrap();

        let out = hs.compute(&mut registry, 0, Some(from_celsius(70.0)), true).unwrap();
        assert!(out.burner1_on, "60C is below target(70) - hysteresis(3), should turn on");

        // Temperature jumps above target well within burner_min_time: the
        // relay must not flip off yet.
        set_boiler(&mut registry, from_celsius(75.0), 10);
        let out2 = hs.compute(&mut registry, 10, Some(from_celsius(70.0)), true).unwrap();
        assert!(out2.burner1_on, "burner_min_time not elapsed, must stay on");

        let out3 = hs.compute(&mut registry, 100, Some(from_celsius(70.0)), true).unwrap();
        assert!(!out3.burner1_on, "burner_min_time elapsed, should now turn off");
    }

    #[test]
    fn test_idle_never_holds_tmin_with_no_request() {
        let (mut registry, mut hs) = make(from_celsius(15.0));
        hs.online(&registry).unwrap();
        let out = hs.compute(&mut registry, 0, None, true).unwrap();
        assert!(out.burner1_on);
    }
}
