use std::{panic, thread};

use log::{error, info};
use tracing_log::LogTracer;

use crate::config::{
    self, BModelConfig, DhwtConfig, DhwtCprioConfig, ForceModeConfig, HCircuitConfig, HeatSourceConfig,
    IdleModeConfig, MixAlgoConfig, PlantConfig, PumpConfig, RelayRefConfig, SensorRefConfig, SummerMaintenanceConfig,
    TLawConfig, TuneFConfig, ValveConfig, ValveKindConfig,
};
use crate::error::EngineError;
use crate::hw::dummy::DummyBackend;
use crate::hw::HwRegistry;
use crate::logging::ReloadLogLevelError;
use crate::plant::Plant;
use crate::temp::{from_celsius, Reading};
use crate::time::{secs_to_ticks, MonotonicClock, SystemClock, TICKS_PER_SECOND};

mod bmodel;
mod config;
mod dhwt;
mod error;
mod hcircuit;
mod heatsource;
mod hw;
mod ids;
mod logging;
mod mode;
mod plant;
mod pump;
mod storage;
mod temp;
mod time;
mod valve;

const CONFIG_FILE: &str = "hydronic_engine.toml";
const BACKEND_NAME: &str = "demo";

fn check_config() {
    let config = config::load_plant_config(CONFIG_FILE).expect("Unable to read/parse config file. Is it missing?");
    info!(target: "config", "loaded plant config with {} hcircuits, {} dhwts, {} heatsources", config.hcircuits.len(), config.dhwts.len(), config.heatsources.len());
}

fn main() {
    LogTracer::init().expect("Should be able to make log-crate events reach the tracing subscriber");
    let logging_handle = logging::init_logging().expect("Failed to initialize logger");

    info!("Starting up...");

    let args: Vec<String> = std::env::args().collect();
    if args.len() == 2 && args[1] == "check-config" {
        check_config();
        info!("Config OK!");
        return;
    }

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic| {
        error!("PANICKED: {:?}: the plant will be left as-is, relays keep their last commanded state", panic);
        default_hook(panic);
    }));

    let config = config::load_plant_config(CONFIG_FILE).unwrap_or_else(|err| {
        error!(target: "config", "failed to read {}: {}, running the built-in demo config instead", CONFIG_FILE, err);
        demo_config()
    });

    let mut plant = build_demo_plant(&config).expect("Failed to build plant from config");
    plant.online().expect("Failed to bring plant online");
    info!("Plant online, entering tick loop.");

    let clock = SystemClock::new();
    let tick_interval = secs_to_ticks(1) / TICKS_PER_SECOND; // one nominal second, in ticks
    let mut i: u64 = 0;
    loop {
        i += 1;
        if i % 60 == 0 {
            info!("Still alive, tick {}", i);
        }

        let now = clock.now();
        if let Err(err) = plant.tick(now) {
            error!("Plant tick failed: {}", err);
            let actions = err.get_corrective_actions();
            if actions.is_relay_state_unknown() {
                error!("Relay state is now unknown, treat hardware state as undefined until the next successful tick.");
            }
        }

        if maybe_reload_requested() {
            match logging::reload_log_level(&logging_handle) {
                Ok(new_filter) => info!("Applied new logging filter: {}", new_filter),
                Err(ReloadLogLevelError::ReloadFailed(e)) => error!("Failed to apply new logging filter: {}", e),
                Err(ReloadLogLevelError::InvalidFilter(e)) => {
                    error!("Failed to parse new filter: {}, keeping the previous filter", e)
                }
            }
        }

        thread::sleep(crate::time::ticks_to_duration(tick_interval));
    }
}

/// Signal handling (SIGHUP-triggered reload) is out of scope for this demo
/// loop; the hook exists so `logging::reload_log_level` has a caller.
fn maybe_reload_requested() -> bool {
    false
}

/// Builds a self-contained `PlantConfig` for the demo binary when no
/// `hydronic_engine.toml` is present: one outdoor-compensated heating
/// circuit and one DHW tank sharing a single staged boiler.
fn demo_config() -> PlantConfig {
    PlantConfig {
        bmodels: vec![BModelConfig {
            name: "outside".into(),
            tid_outdoor: SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_outdoor".into() },
            tau_secs: 3600,
            t_frost_c: -3.0,
            t_summer_c: 18.0,
            hysteresis_k: 1.0,
        }],
        pumps: vec![PumpConfig {
            name: "circ_pump".into(),
            cooldown_time_secs: 60,
            relay: RelayRefConfig { backend: BACKEND_NAME.into(), name: "circ_pump".into() },
        }],
        valves: vec![ValveConfig {
            name: "mix_valve".into(),
            ete_time_secs: 120,
            deadband_pm: 20,
            relay_open: RelayRefConfig { backend: BACKEND_NAME.into(), name: "mix_valve_open".into() },
            relay_close: RelayRefConfig { backend: BACKEND_NAME.into(), name: "mix_valve_close".into() },
            kind: ValveKindConfig::Mixing {
                algo: MixAlgoConfig::Pi {
                    tid_hot: SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_boiler".into() },
                    tid_out: SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_circuit_flow".into() },
                    tid_cold: None,
                    tdeadzone_k: 1.0,
                    ksmax_k: 40.0,
                    tu_secs: 300,
                    td_secs: 30,
                    tune_f: TuneFConfig::Moderate,
                    sample_intvl_secs: 10,
                },
            },
        }],
        hcircuits: vec![HCircuitConfig {
            name: "ground_floor".into(),
            tid_outgoing: SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_circuit_flow".into() },
            tid_return: None,
            tid_ambient: Some(SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_ambient".into() }),
            tlaw: TLawConfig { tout1_c: -5.0, twater1_c: 55.0, tout2_c: 15.0, twater2_c: 30.0, n_h100: 100 },
            t_comfort_c: 20.0,
            t_eco_c: 17.0,
            t_frostfree_c: 7.0,
            t_offset_k: 0.0,
            ambient_factor: 20,
            limit_wtmin_c: 10.0,
            limit_wtmax_c: 65.0,
            wtemp_rorh_k: 6.0,
            outhoff_comfort_c: 20.0,
            outhoff_eco_c: 18.0,
            outhoff_frostfree_c: 15.0,
            outhoff_hysteresis_k: 1.0,
            boost_maxtime_secs: 7200,
            tambient_boostdelta_k: 1.0,
            temp_inoffset_k: 2.0,
            bmodel: "outside".into(),
            pump: Some("circ_pump".into()),
            valve: Some("mix_valve".into()),
            heatsource: "boiler".into(),
        }],
        dhwts: vec![DhwtConfig {
            name: "cylinder".into(),
            tid_top: Some(SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_dhw_top".into() }),
            tid_bot: Some(SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_dhw_bot".into() }),
            tid_win: None,
            tid_wout: None,
            rid_selfheater: Some(RelayRefConfig { backend: BACKEND_NAME.into(), name: "dhw_immersion".into() }),
            t_comfort_c: 55.0,
            t_eco_c: 45.0,
            t_frostfree_c: 7.0,
            t_legionella_c: 65.0,
            limit_tmin_c: 5.0,
            limit_tmax_c: 70.0,
            limit_wintmax_c: 60.0,
            hysteresis_k: 5.0,
            limit_chargetime_secs: 7200,
            electric_failover: true,
            anti_legionella: true,
            legionella_interval_secs: 604800,
            legionella_recycle: false,
            cprio: DhwtCprioConfig::SlidDhw,
            force_mode: ForceModeConfig::First,
            feed_pump: Some("circ_pump".into()),
            recycle_pump: None,
            hwisol_valve: None,
            heatsource: Some("boiler".into()),
        }],
        heatsources: vec![HeatSourceConfig {
            name: "boiler".into(),
            idle_mode: IdleModeConfig::FrostOnly,
            hysteresis_k: 3.0,
            limit_tmin_c: 20.0,
            limit_tmax_c: 78.0,
            limit_thardmax_c: 95.0,
            limit_treturnmin_c: Some(30.0),
            t_freeze_c: 5.0,
            burner_min_time_secs: 300,
            tid_boiler: SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_boiler".into() },
            tid_boiler_return: Some(SensorRefConfig { backend: BACKEND_NAME.into(), name: "t_boiler_return".into() }),
            rid_burner_1: RelayRefConfig { backend: BACKEND_NAME.into(), name: "burner_1".into() },
            rid_burner_2: None,
            pump_load: Some("circ_pump".into()),
            valve_ret: None,
        }],
        summer_maintenance: SummerMaintenanceConfig { enabled: true, run_interval_secs: 604800, run_duration_secs: 120 },
    }
}

/// Registers a `DummyBackend` with every sensor/relay the demo config names,
/// standing in for the real hardware driver wiring that is out of scope
/// here, then builds the `Plant` from the config.
fn build_demo_plant(config: &PlantConfig) -> Result<Plant, EngineError> {
    let mut backend = DummyBackend::new();
    backend.add_sensor("t_outdoor", Reading::Valid(from_celsius(8.0)));
    backend.add_sensor("t_boiler", Reading::Valid(from_celsius(45.0)));
    backend.add_sensor("t_boiler_return", Reading::Valid(from_celsius(38.0)));
    backend.add_sensor("t_circuit_flow", Reading::Valid(from_celsius(35.0)));
    backend.add_sensor("t_ambient", Reading::Valid(from_celsius(19.0)));
    backend.add_sensor("t_dhw_top", Reading::Valid(from_celsius(50.0)));
    backend.add_sensor("t_dhw_bot", Reading::Valid(from_celsius(45.0)));
    backend.add_relay("burner_1");
    backend.add_relay("circ_pump");
    backend.add_relay("mix_valve_open");
    backend.add_relay("mix_valve_close");
    backend.add_relay("dhw_immersion");

    let mut hw = HwRegistry::new();
    hw.register(BACKEND_NAME, Box::new(backend));

    config::build_plant(config, hw)
}
