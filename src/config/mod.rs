//! Typed, `serde`-deserializable configuration tree.
//!
//! The real ISC-style parser is out of scope (spec.md §1): this module
//! stands in for "the already-parsed config nodes" the real parser would
//! hand the engine, loaded from TOML instead, and `build_plant` is the
//! wrapper that turns that tree into a live `Plant` the way the real
//! parser's construction-order/cross-reference-resolution pass would.

use std::collections::HashMap;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::bmodel::BModel;
use crate::dhwt::{Dhwt, DhwtParams};
use crate::error::{EngineError, ErrorKind};
use crate::hcircuit::{HCircuit, HCircuitParams, TLaw};
use crate::heatsource::{BoilerParams, HeatSource};
use crate::hw::HwRegistry;
use crate::ids::{RelayId, SensorId};
use crate::mode::{DhwtCprio, ForceMode, IdleMode};
use crate::plant::{Plant, SummerMaintenance};
use crate::pump::Pump;
use crate::temp::from_celsius;
use crate::time::secs_to_ticks;
use crate::valve::{BangBangConfig, MixAlgorithmConfig, PiConfig, SApproxConfig, TuneF, Valve, ValveKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorRefConfig {
    pub backend: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayRefConfig {
    pub backend: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PumpConfig {
    pub name: String,
    pub cooldown_time_secs: u64,
    pub relay: RelayRefConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum MixAlgoConfig {
    BangBang { tid_out: SensorRefConfig, tdeadzone_k: f32 },
    SApprox { tid_out: SensorRefConfig, tdeadzone_k: f32, amount_pct: u16, sample_intvl_secs: u64 },
    Pi {
        tid_hot: SensorRefConfig,
        tid_out: SensorRefConfig,
        tid_cold: Option<SensorRefConfig>,
        tdeadzone_k: f32,
        ksmax_k: f32,
        tu_secs: u64,
        td_secs: u64,
        tune_f: TuneFConfig,
        sample_intvl_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TuneFConfig {
    Aggressive,
    Moderate,
    Conservative,
}

impl From<TuneFConfig> for TuneF {
    fn from(value: TuneFConfig) -> Self {
        match value {
            TuneFConfig::Aggressive => TuneF::Aggressive,
            TuneFConfig::Moderate => TuneF::Moderate,
            TuneFConfig::Conservative => TuneF::Conservative,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValveKindConfig {
    Mixing { algo: MixAlgoConfig },
    Isolation { reverse: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValveConfig {
    pub name: String,
    pub ete_time_secs: u64,
    pub deadband_pm: i32,
    pub relay_open: RelayRefConfig,
    pub relay_close: RelayRefConfig,
    pub kind: ValveKindConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BModelConfig {
    pub name: String,
    pub tid_outdoor: SensorRefConfig,
    pub tau_secs: u64,
    pub t_frost_c: f32,
    pub t_summer_c: f32,
    pub hysteresis_k: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TLawConfig {
    pub tout1_c: f32,
    pub twater1_c: f32,
    pub tout2_c: f32,
    pub twater2_c: f32,
    pub n_h100: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HCircuitConfig {
    pub name: String,
    pub tid_outgoing: SensorRefConfig,
    pub tid_return: Option<SensorRefConfig>,
    pub tid_ambient: Option<SensorRefConfig>,
    pub tlaw: TLawConfig,
    pub t_comfort_c: f32,
    pub t_eco_c: f32,
    pub t_frostfree_c: f32,
    pub t_offset_k: f32,
    pub ambient_factor: i32,
    pub limit_wtmin_c: f32,
    pub limit_wtmax_c: f32,
    pub wtemp_rorh_k: f32,
    pub outhoff_comfort_c: f32,
    pub outhoff_eco_c: f32,
    pub outhoff_frostfree_c: f32,
    pub outhoff_hysteresis_k: f32,
    pub boost_maxtime_secs: u64,
    pub tambient_boostdelta_k: f32,
    pub temp_inoffset_k: f32,
    pub bmodel: String,
    pub pump: Option<String>,
    pub valve: Option<String>,
    pub heatsource: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DhwtCprioConfig {
    ParalMax,
    ParalDhw,
    SlidMax,
    SlidDhw,
    Absolute,
}

impl From<DhwtCprioConfig> for DhwtCprio {
    fn from(value: DhwtCprioConfig) -> Self {
        match value {
            DhwtCprioConfig::ParalMax => DhwtCprio::ParalMax,
            DhwtCprioConfig::ParalDhw => DhwtCprio::ParalDhw,
            DhwtCprioConfig::SlidMax => DhwtCprio::SlidMax,
            DhwtCprioConfig::SlidDhw => DhwtCprio::SlidDhw,
            DhwtCprioConfig::Absolute => DhwtCprio::Absolute,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForceModeConfig {
    Never,
    First,
    Always,
}

impl From<ForceModeConfig> for ForceMode {
    fn from(value: ForceModeConfig) -> Self {
        match value {
            ForceModeConfig::Never => ForceMode::Never,
            ForceModeConfig::First => ForceMode::First,
            ForceModeConfig::Always => ForceMode::Always,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DhwtConfig {
    pub name: String,
    pub tid_top: Option<SensorRefConfig>,
    pub tid_bot: Option<SensorRefConfig>,
    pub tid_win: Option<SensorRefConfig>,
    pub tid_wout: Option<SensorRefConfig>,
    pub rid_selfheater: Option<RelayRefConfig>,
    pub t_comfort_c: f32,
    pub t_eco_c: f32,
    pub t_frostfree_c: f32,
    pub t_legionella_c: f32,
    pub limit_tmin_c: f32,
    pub limit_tmax_c: f32,
    pub limit_wintmax_c: f32,
    pub hysteresis_k: f32,
    pub limit_chargetime_secs: u64,
    pub electric_failover: bool,
    pub anti_legionella: bool,
    pub legionella_interval_secs: u64,
    pub legionella_recycle: bool,
    pub cprio: DhwtCprioConfig,
    pub force_mode: ForceModeConfig,
    pub feed_pump: Option<String>,
    pub recycle_pump: Option<String>,
    pub hwisol_valve: Option<String>,
    pub heatsource: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdleModeConfig {
    Never,
    FrostOnly,
    Always,
}

impl From<IdleModeConfig> for IdleMode {
    fn from(value: IdleModeConfig) -> Self {
        match value {
            IdleModeConfig::Never => IdleMode::Never,
            IdleModeConfig::FrostOnly => IdleMode::FrostOnly,
            IdleModeConfig::Always => IdleMode::Always,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatSourceConfig {
    pub name: String,
    pub idle_mode: IdleModeConfig,
    pub hysteresis_k: f32,
    pub limit_tmin_c: f32,
    pub limit_tmax_c: f32,
    pub limit_thardmax_c: f32,
    pub limit_treturnmin_c: Option<f32>,
    pub t_freeze_c: f32,
    pub burner_min_time_secs: u64,
    pub tid_boiler: SensorRefConfig,
    pub tid_boiler_return: Option<SensorRefConfig>,
    pub rid_burner_1: RelayRefConfig,
    pub rid_burner_2: Option<RelayRefConfig>,
    pub pump_load: Option<String>,
    pub valve_ret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SummerMaintenanceConfig {
    pub enabled: bool,
    pub run_interval_secs: u64,
    pub run_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlantConfig {
    #[serde(default)]
    pub bmodels: Vec<BModelConfig>,
    #[serde(default)]
    pub pumps: Vec<PumpConfig>,
    #[serde(default)]
    pub valves: Vec<ValveConfig>,
    #[serde(default)]
    pub hcircuits: Vec<HCircuitConfig>,
    #[serde(default)]
    pub dhwts: Vec<DhwtConfig>,
    #[serde(default)]
    pub heatsources: Vec<HeatSourceConfig>,
    #[serde(default)]
    pub summer_maintenance: SummerMaintenanceConfig,
}

pub fn load_plant_config(path: &str) -> Result<PlantConfig, EngineError> {
    let text = fs::read_to_string(path)
        .map_err(|e| EngineError::new(ErrorKind::NotFound, format!("reading {path}: {e}")))?;
    toml::from_str(&text).map_err(|e| EngineError::new(ErrorKind::Invalid, format!("parsing {path}: {e}")))
}

fn resolve_sensor(hw: &HwRegistry, r: &SensorRefConfig) -> Result<SensorId, EngineError> {
    hw.resolve_sensor(&r.backend, &r.name)
}

fn resolve_relay(hw: &HwRegistry, r: &RelayRefConfig) -> Result<RelayId, EngineError> {
    hw.resolve_relay(&r.backend, &r.name)
}

fn not_found(kind: &str, name: &str) -> EngineError {
    EngineError::new(ErrorKind::NotFound, format!("{kind} {name:?} referenced but not defined"))
}

/// Builds a live `Plant` from a config tree and a hardware registry whose
/// backends have already been registered by the caller (backend wiring
/// itself is out of scope here; only name resolution is this crate's job).
pub fn build_plant(config: &PlantConfig, hw: HwRegistry) -> Result<Plant, EngineError> {
    let mut plant = Plant::new(hw);

    let mut bmodel_idx = HashMap::new();
    for c in &config.bmodels {
        let sid = resolve_sensor(plant.hw(), &c.tid_outdoor)?;
        let bmodel = BModel::new(&c.name, sid, secs_to_ticks(c.tau_secs), from_celsius(c.t_frost_c), from_celsius(c.t_summer_c), from_celsius(c.hysteresis_k));
        let idx = plant.add_bmodel(bmodel);
        bmodel_idx.insert(c.name.clone(), idx);
    }

    let mut pump_idx = HashMap::new();
    for c in &config.pumps {
        let rid = resolve_relay(plant.hw(), &c.relay)?;
        let mut pump = Pump::new(&c.name, secs_to_ticks(c.cooldown_time_secs));
        pump.set_relay(rid);
        let idx = plant.add_pump(pump);
        pump_idx.insert(c.name.clone(), idx);
    }

    let mut valve_idx = HashMap::new();
    for c in &config.valves {
        let kind = match &c.kind {
            ValveKindConfig::Isolation { reverse } => ValveKind::Isolation { reverse: *reverse },
            ValveKindConfig::Mixing { algo } => ValveKind::Mixing(match algo {
                MixAlgoConfig::BangBang { tid_out, tdeadzone_k } => {
                    MixAlgorithmConfig::BangBang(BangBangConfig {
                        tid_out: resolve_sensor(plant.hw(), tid_out)?,
                        tdeadzone: from_celsius(*tdeadzone_k),
                    })
                }
                MixAlgoConfig::SApprox { tid_out, tdeadzone_k, amount_pct, sample_intvl_secs } => {
                    MixAlgorithmConfig::SApprox(SApproxConfig {
                        tid_out: resolve_sensor(plant.hw(), tid_out)?,
                        tdeadzone: from_celsius(*tdeadzone_k),
                        amount: *amount_pct,
                        sample_intvl: secs_to_ticks(*sample_intvl_secs),
                    })
                }
                MixAlgoConfig::Pi { tid_hot, tid_out, tid_cold, tdeadzone_k, ksmax_k, tu_secs, td_secs, tune_f, sample_intvl_secs } => {
                    MixAlgorithmConfig::Pi(PiConfig {
                        tid_hot: resolve_sensor(plant.hw(), tid_hot)?,
                        tid_out: resolve_sensor(plant.hw(), tid_out)?,
                        tid_cold: tid_cold.as_ref().map(|r| resolve_sensor(plant.hw(), r)).transpose()?,
                        tdeadzone: from_celsius(*tdeadzone_k),
                        ksmax: from_celsius(*ksmax_k),
                        tu: secs_to_ticks(*tu_secs),
                        td: secs_to_ticks(*td_secs),
                        tune_f: (*tune_f).into(),
                        sample_intvl: secs_to_ticks(*sample_intvl_secs),
                    })
                }
            }),
        };
        let mut valve = Valve::try_new(&c.name, secs_to_ticks(c.ete_time_secs), c.deadband_pm, kind)?;
        valve.set_relays(resolve_relay(plant.hw(), &c.relay_open)?, resolve_relay(plant.hw(), &c.relay_close)?);
        let idx = plant.add_valve(valve);
        valve_idx.insert(c.name.clone(), idx);
    }

    let mut heatsource_idx = HashMap::new();
    for c in &config.heatsources {
        let sid = resolve_sensor(plant.hw(), &c.tid_boiler)?;
        let rid1 = resolve_relay(plant.hw(), &c.rid_burner_1)?;
        let params = BoilerParams {
            idle_mode: c.idle_mode.into(),
            hysteresis: from_celsius(c.hysteresis_k),
            limit_tmin: from_celsius(c.limit_tmin_c),
            limit_tmax: from_celsius(c.limit_tmax_c),
            limit_thardmax: from_celsius(c.limit_thardmax_c),
            limit_treturnmin: c.limit_treturnmin_c.map(from_celsius),
            t_freeze: from_celsius(c.t_freeze_c),
            burner_min_time: secs_to_ticks(c.burner_min_time_secs),
        };
        let mut hs = HeatSource::try_new(&c.name, sid, rid1, params)?;
        if let Some(r) = &c.tid_boiler_return {
            hs.set_return_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(r) = &c.rid_burner_2 {
            hs.set_burner_2(resolve_relay(plant.hw(), r)?);
        }
        if let Some(name) = &c.pump_load {
            hs.set_pump_load(*pump_idx.get(name).ok_or_else(|| not_found("pump", name))?);
        }
        if let Some(name) = &c.valve_ret {
            hs.set_valve_ret(*valve_idx.get(name).ok_or_else(|| not_found("valve", name))?);
        }
        let idx = plant.add_heatsource(hs);
        heatsource_idx.insert(c.name.clone(), idx);
    }

    for c in &config.hcircuits {
        let sid = resolve_sensor(plant.hw(), &c.tid_outgoing)?;
        let tlaw = TLaw::new(
            (from_celsius(c.tlaw.tout1_c), from_celsius(c.tlaw.twater1_c)),
            (from_celsius(c.tlaw.tout2_c), from_celsius(c.tlaw.twater2_c)),
            c.tlaw.n_h100,
        )?;
        let params = HCircuitParams {
            t_comfort: from_celsius(c.t_comfort_c),
            t_eco: from_celsius(c.t_eco_c),
            t_frostfree: from_celsius(c.t_frostfree_c),
            t_offset: from_celsius(c.t_offset_k),
            ambient_factor: c.ambient_factor,
            limit_wtmin: from_celsius(c.limit_wtmin_c),
            limit_wtmax: from_celsius(c.limit_wtmax_c),
            wtemp_rorh: from_celsius(c.wtemp_rorh_k),
            outhoff_comfort: from_celsius(c.outhoff_comfort_c),
            outhoff_eco: from_celsius(c.outhoff_eco_c),
            outhoff_frostfree: from_celsius(c.outhoff_frostfree_c),
            outhoff_hysteresis: from_celsius(c.outhoff_hysteresis_k),
            boost_maxtime: secs_to_ticks(c.boost_maxtime_secs),
            tambient_boostdelta: from_celsius(c.tambient_boostdelta_k),
            temp_inoffset: from_celsius(c.temp_inoffset_k),
        };
        let bmodel = *bmodel_idx.get(&c.bmodel).ok_or_else(|| not_found("bmodel", &c.bmodel))?;
        let heatsource = *heatsource_idx.get(&c.heatsource).ok_or_else(|| not_found("heatsource", &c.heatsource))?;
        let mut circuit = HCircuit::new(&c.name, sid, tlaw, params, bmodel, heatsource);
        if let Some(r) = &c.tid_return {
            circuit.set_return_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(r) = &c.tid_ambient {
            circuit.set_ambient_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(name) = &c.pump {
            circuit.set_pump(*pump_idx.get(name).ok_or_else(|| not_found("pump", name))?);
        }
        if let Some(name) = &c.valve {
            circuit.set_valve(*valve_idx.get(name).ok_or_else(|| not_found("valve", name))?);
        }
        plant.add_hcircuit(circuit);
    }

    for c in &config.dhwts {
        let params = DhwtParams {
            t_comfort: from_celsius(c.t_comfort_c),
            t_eco: from_celsius(c.t_eco_c),
            t_frostfree: from_celsius(c.t_frostfree_c),
            t_legionella: from_celsius(c.t_legionella_c),
            limit_tmin: from_celsius(c.limit_tmin_c),
            limit_tmax: from_celsius(c.limit_tmax_c),
            limit_wintmax: from_celsius(c.limit_wintmax_c),
            hysteresis: from_celsius(c.hysteresis_k),
            limit_chargetime: secs_to_ticks(c.limit_chargetime_secs),
            electric_failover: c.electric_failover,
            anti_legionella: c.anti_legionella,
            legionella_interval: secs_to_ticks(c.legionella_interval_secs),
            legionella_recycle: c.legionella_recycle,
        };
        let mut dhwt = Dhwt::new(&c.name, params, c.cprio.into(), c.force_mode.into());
        if let Some(r) = &c.tid_top {
            dhwt.set_top_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(r) = &c.tid_bot {
            dhwt.set_bot_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(r) = &c.tid_win {
            dhwt.set_win_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(r) = &c.tid_wout {
            dhwt.set_wout_sensor(resolve_sensor(plant.hw(), r)?);
        }
        if let Some(r) = &c.rid_selfheater {
            dhwt.set_selfheater_relay(resolve_relay(plant.hw(), r)?);
        }
        if let Some(name) = &c.feed_pump {
            dhwt.set_feed_pump(*pump_idx.get(name).ok_or_else(|| not_found("pump", name))?);
        }
        if let Some(name) = &c.recycle_pump {
            dhwt.set_recycle_pump(*pump_idx.get(name).ok_or_else(|| not_found("pump", name))?);
        }
        if let Some(name) = &c.hwisol_valve {
            dhwt.set_hwisol_valve(*valve_idx.get(name).ok_or_else(|| not_found("valve", name))?);
        }
        if let Some(name) = &c.heatsource {
            dhwt.set_heatsource(*heatsource_idx.get(name).ok_or_else(|| not_found("heatsource", name))?);
        }
        plant.add_dhwt(dhwt);
    }

    plant.set_summer_maintenance(SummerMaintenance {
        enabled: config.summer_maintenance.enabled,
        run_interval: secs_to_ticks(config.summer_maintenance.run_interval_secs),
        run_duration: secs_to_ticks(config.summer_maintenance.run_duration_secs),
    });

    Ok(plant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> PlantConfig {
        PlantConfig {
            bmodels: vec![BModelConfig {
                name: "outside".into(),
                tid_outdoor: SensorRefConfig { backend: "hw1".into(), name: "tout".into() },
                tau_secs: 3600,
                t_frost_c: -5.0,
                t_summer_c: 18.0,
                hysteresis_k: 1.0,
            }],
            pumps: vec![],
            valves: vec![ValveConfig {
                name: "mix1".into(),
                ete_time_secs: 120,
                deadband_pm: 20,
                relay_open: RelayRefConfig { backend: "hw1".into(), name: "mix1_open".into() },
                relay_close: RelayRefConfig { backend: "hw1".into(), name: "mix1_close".into() },
                kind: ValveKindConfig::Mixing {
                    algo: MixAlgoConfig::Pi {
                        tid_hot: SensorRefConfig { backend: "hw1".into(), name: "thot".into() },
                        tid_out: SensorRefConfig { backend: "hw1".into(), name: "tmix".into() },
                        tid_cold: None,
                        tdeadzone_k: 1.0,
                        ksmax_k: 30.0,
                        tu_secs: 300,
                        td_secs: 30,
                        tune_f: TuneFConfig::Moderate,
                        sample_intvl_secs: 10,
                    },
                },
            }],
            hcircuits: vec![HCircuitConfig {
                name: "ground_floor".into(),
                tid_outgoing: SensorRefConfig { backend: "hw1".into(), name: "tmix".into() },
                tid_return: None,
                tid_ambient: None,
                tlaw: TLawConfig { tout1_c: -5.0, twater1_c: 60.0, tout2_c: 15.0, twater2_c: 30.0, n_h100: 100 },
                t_comfort_c: 20.0,
                t_eco_c: 17.0,
                t_frostfree_c: 7.0,
                t_offset_k: 0.0,
                ambient_factor: 0,
                limit_wtmin_c: 10.0,
                limit_wtmax_c: 80.0,
                wtemp_rorh_k: 0.0,
                outhoff_comfort_c: 20.0,
                outhoff_eco_c: 18.0,
                outhoff_frostfree_c: 15.0,
                outhoff_hysteresis_k: 1.0,
                boost_maxtime_secs: 0,
                tambient_boostdelta_k: 0.0,
                temp_inoffset_k: 0.0,
                bmodel: "outside".into(),
                pump: None,
                valve: Some("mix1".into()),
                heatsource: "boiler1".into(),
            }],
            dhwts: vec![DhwtConfig {
                name: "tank1".into(),
                tid_top: None,
                tid_bot: Some(SensorRefConfig { backend: "hw1".into(), name: "tbot".into() }),
                tid_win: None,
                tid_wout: None,
                rid_selfheater: None,
                t_comfort_c: 55.0,
                t_eco_c: 45.0,
                t_frostfree_c: 7.0,
                t_legionella_c: 65.0,
                limit_tmin_c: 5.0,
                limit_tmax_c: 70.0,
                limit_wintmax_c: 60.0,
                hysteresis_k: 5.0,
                limit_chargetime_secs: 0,
                electric_failover: false,
                anti_legionella: false,
                legionella_interval_secs: 0,
                legionella_recycle: false,
                cprio: DhwtCprioConfig::ParalMax,
                force_mode: ForceModeConfig::Never,
                feed_pump: None,
                recycle_pump: None,
                hwisol_valve: None,
                heatsource: Some("boiler1".into()),
            }],
            heatsources: vec![HeatSourceConfig {
                name: "boiler1".into(),
                idle_mode: IdleModeConfig::Never,
                hysteresis_k: 3.0,
                limit_tmin_c: 20.0,
                limit_tmax_c: 80.0,
                limit_thardmax_c: 95.0,
                limit_treturnmin_c: None,
                t_freeze_c: 5.0,
                burner_min_time_secs: 300,
                tid_boiler: SensorRefConfig { backend: "hw1".into(), name: "tboiler".into() },
                tid_boiler_return: None,
                rid_burner_1: RelayRefConfig { backend: "hw1".into(), name: "burner1".into() },
                rid_burner_2: None,
                pump_load: None,
                valve_ret: None,
            }],
            summer_maintenance: SummerMaintenanceConfig { enabled: true, run_interval_secs: 604800, run_duration_secs: 120 },
        }
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = sample_config();
        let serialized = toml::to_string(&config).expect("serialize");
        let parsed: PlantConfig = toml::from_str(&serialized).expect("deserialize");
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_build_plant_resolves_cross_references() {
        use crate::hw::dummy::DummyBackend;

        let mut backend = DummyBackend::new();
        backend.add_sensor("tout", crate::temp::Reading::Valid(from_celsius(5.0)));
        backend.add_sensor("thot", crate::temp::Reading::Valid(from_celsius(70.0)));
        backend.add_sensor("tmix", crate::temp::Reading::Valid(from_celsius(35.0)));
        backend.add_sensor("tbot", crate::temp::Reading::Valid(from_celsius(50.0)));
        backend.add_sensor("tboiler", crate::temp::Reading::Valid(from_celsius(40.0)));
        backend.add_relay("mix1_open");
        backend.add_relay("mix1_close");
        backend.add_relay("burner1");
        let mut hw = HwRegistry::new();
        hw.register("hw1", Box::new(backend));

        let config = sample_config();
        let mut plant = build_plant(&config, hw).expect("build plant");
        plant.online().expect("online");
        plant.tick(0).expect("tick");
    }

    #[test]
    fn test_build_plant_rejects_unknown_cross_reference() {
        use crate::hw::dummy::DummyBackend;

        let mut backend = DummyBackend::new();
        backend.add_sensor("tout", crate::temp::Reading::Valid(from_celsius(5.0)));
        let mut hw = HwRegistry::new();
        hw.register("hw1", Box::new(backend));

        let mut config = sample_config();
        config.valves.clear();
        config.hcircuits[0].valve = Some("does_not_exist".into());
        let err = build_plant(&config, hw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
