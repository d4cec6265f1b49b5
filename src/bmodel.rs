//! Building thermal model: a low-pass-filtered outdoor temperature plus the
//! `summer`/`frost` flags derived from it.
//!
//! The filter is a discrete first-order exponential smoother, fit to a
//! single time constant rather than two reference points, so a circuit's
//! water law reacts to weather trends rather than to individual sensor
//! samples.

use log::{debug, trace};

use crate::error::{EngineError, ErrorKind};
use crate::hw::HwRegistry;
use crate::ids::SensorId;
use crate::temp::{Reading, TempT};
use crate::time::TimekeepT;

pub struct BModel {
    name: String,
    tid_outdoor: SensorId,
    tau: TimekeepT,
    t_frost: TempT,
    t_summer: TempT,
    hysteresis: TempT,

    filtered: Option<TempT>,
    summer: bool,
    frost: bool,
    last_run_time: TimekeepT,
    online: bool,
}

impl BModel {
    pub fn new(
        name: impl Into<String>,
        tid_outdoor: SensorId,
        tau: TimekeepT,
        t_frost: TempT,
        t_summer: TempT,
        hysteresis: TempT,
    ) -> Self {
        BModel {
            name: name.into(),
            tid_outdoor,
            tau,
            t_frost,
            t_summer,
            hysteresis,
            filtered: None,
            summer: false,
            frost: false,
            last_run_time: 0,
            online: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn online(&mut self, registry: &HwRegistry) -> Result<(), EngineError> {
        // Touch the sensor once so a typo'd reference fails fast at startup
        // rather than on the first tick.
        registry.sensor_clone_temp(self.tid_outdoor)?;
        self.online = true;
        Ok(())
    }

    pub fn offline(&mut self) {
        self.filtered = None;
        self.summer = false;
        self.frost = false;
        self.online = false;
    }

    pub fn filtered_outdoor(&self) -> Option<TempT> {
        self.filtered
    }

    pub fn summer(&self) -> bool {
        self.summer
    }

    pub fn frost(&self) -> bool {
        self.frost
    }

    /// Runs one filter step. Call once per tick, after `input()`.
    pub fn run(&mut self, registry: &HwRegistry, now: TimekeepT) -> Result<(), EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, format!("bmodel {} is offline", self.name)));
        }
        let raw = match registry.sensor_clone_temp(self.tid_outdoor)? {
            Reading::Valid(t) => t,
            fault => return Err(EngineError::new(fault.kind(), format!("bmodel {}: outdoor sensor fault: {}", self.name, fault))),
        };

        let dt = now.saturating_sub(self.last_run_time);
        self.last_run_time = now;

        let filtered = match self.filtered {
            None => raw,
            Some(prev) if dt == 0 => prev,
            Some(prev) => {
                let delta = (raw - prev) as i64 * dt as i64 / (self.tau + dt) as i64;
                prev + delta as TempT
            }
        };
        self.filtered = Some(filtered);

        if !self.summer && filtered >= self.t_summer {
            self.summer = true;
            debug!(target: "bmodel", "{}: entering summer (filtered {}mC >= {}mC)", self.name, filtered, self.t_summer);
        } else if self.summer && filtered < self.t_summer - self.hysteresis {
            self.summer = false;
            debug!(target: "bmodel", "{}: leaving summer", self.name);
        }

        if !self.frost && filtered <= self.t_frost {
            self.frost = true;
            debug!(target: "bmodel", "{}: entering frost (filtered {}mC <= {}mC)", self.name, filtered, self.t_frost);
        } else if self.frost && filtered > self.t_frost + self.hysteresis {
            self.frost = false;
            debug!(target: "bmodel", "{}: leaving frost", self.name);
        }

        trace!(target: "bmodel", "{}: raw {} filtered {} summer {} frost {}", self.name, raw, filtered, self.summer, self.frost);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::dummy::DummyBackend;
    use crate::temp::from_celsius;

    fn make(tau: TimekeepT, initial: TempT) -> (HwRegistry, SensorId, BModel) {
        let mut backend = DummyBackend::new();
        let idx = backend.add_sensor("tout", Reading::Valid(initial));
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        let sid = SensorId { backend: 0, object: idx };
        let model = BModel::new("bm1", sid, tau, from_celsius(-5.0), from_celsius(18.0), from_celsius(1.0));
        (registry, sid, model)
    }

    fn set_sensor(registry: &mut HwRegistry, object: usize, t: TempT, now: TimekeepT) {
        registry
            .backend_any_mut(0)
            .downcast_mut::<DummyBackend>()
            .unwrap()
            .set_sensor(object, Reading::Valid(t), now);
    }

    #[test]
    fn test_first_sample_is_taken_as_is() {
        let (mut registry, _sid, mut model) = make(1000, from_celsius(10.0));
        model.online(&registry).unwrap();
        model.run(&registry, 0).unwrap();
        assert_eq!(model.filtered_outdoor(), Some(from_celsius(10.0)));
    }

    #[test]
    fn test_filter_converges_towards_step_input() {
        let tau = 1000;
        let (mut registry, sid, mut model) = make(tau, from_celsius(10.0));
        model.online(&registry).unwrap();
        model.run(&registry, 0).unwrap();

        // Step the outdoor sensor down and run the filter forward by one
        // time constant: with alpha = dt/(tau+dt) this discrete filter
        // covers exactly half the step by `dt = tau`.
        set_sensor(&mut registry, sid.object, from_celsius(-10.0), 0);
        model.run(&registry, tau).unwrap();
        let filtered = model.filtered_outdoor().unwrap();
        assert_eq!(filtered, from_celsius(0.0), "expected the halfway point after one tau, got {filtered}");
    }

    #[test]
    fn test_frost_flag_sets_and_clears_with_hysteresis() {
        let (mut registry, sid, mut model) = make(100, from_celsius(10.0));
        model.online(&registry).unwrap();
        model.run(&registry, 0).unwrap();
        assert!(!model.frost());

        set_sensor(&mut registry, sid.object, from_celsius(-20.0), 0);
        let mut t = 0;
        for _ in 0..50 {
            t += 100;
            model.run(&registry, t).unwrap();
        }
        assert!(model.frost());

        // A small rebound above t_frost but within hysteresis must not
        // clear the flag.
        set_sensor(&mut registry, sid.object, from_celsius(-4.8), t);
        t += 100;
        model.run(&registry, t).unwrap();
        assert!(model.frost(), "hysteresis should hold frost latched");
    }

    #[test]
    fn test_summer_flag_sets_above_threshold() {
        let (mut registry, sid, mut model) = make(100, from_celsius(10.0));
        model.online(&registry).unwrap();
        model.run(&registry, 0).unwrap();
        assert!(!model.summer());

        set_sensor(&mut registry, sid.object, from_celsius(25.0), 0);
        let mut t = 0;
        for _ in 0..50 {
            t += 100;
            model.run(&registry, t).unwrap();
        }
        assert!(model.summer());
    }
}
