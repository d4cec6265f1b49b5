//! In-memory hardware backend used for tests and the demo binary.
//!
//! Not a real driver: it has no board-specific behaviour at all, it just
//! holds sensor readings and relay state in maps so component and plant
//! tests can drive scenarios without touching any actual I/O.

use std::collections::HashMap;

use crate::error::{EngineError, ErrorKind};
use crate::ids::{RelayId, SensorId};
use crate::temp::Reading;
use crate::time::TimekeepT;

use super::HwBackend;

pub struct DummyBackend {
    sensor_names: Vec<String>,
    sensor_readings: Vec<Reading>,
    sensor_update_time: Vec<TimekeepT>,

    relay_names: Vec<String>,
    relay_state: Vec<bool>,

    online: bool,
}

impl DummyBackend {
    pub fn new() -> Self {
        DummyBackend {
            sensor_names: Vec::new(),
            sensor_readings: Vec::new(),
            sensor_update_time: Vec::new(),
            relay_names: Vec::new(),
            relay_state: Vec::new(),
            online: false,
        }
    }

    /// Declares a sensor up front, as board discovery would in a real
    /// backend. Returns the object index to be wrapped into a `SensorId`
    /// once this backend is registered.
    pub fn add_sensor(&mut self, name: impl Into<String>, initial: Reading) -> usize {
        self.sensor_names.push(name.into());
        self.sensor_readings.push(initial);
        self.sensor_update_time.push(0);
        self.sensor_names.len() - 1
    }

    pub fn add_relay(&mut self, name: impl Into<String>) -> usize {
        self.relay_names.push(name.into());
        self.relay_state.push(false);
        self.relay_names.len() - 1
    }

    /// Test hook: directly set a sensor's reading and refresh its update
    /// time, bypassing `input()`.
    pub fn set_sensor(&mut self, object: usize, reading: Reading, now: TimekeepT) {
        self.sensor_readings[object] = reading;
        self.sensor_update_time[object] = now;
    }

    fn find_sensor(&self, name: &str) -> Option<usize> {
        self.sensor_names.iter().position(|n| n == name)
    }

    fn find_relay(&self, name: &str) -> Option<usize> {
        self.relay_names.iter().position(|n| n == name)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        DummyBackend::new()
    }
}

impl HwBackend for DummyBackend {
    fn init(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn online(&mut self) -> Result<(), EngineError> {
        self.online = true;
        Ok(())
    }

    fn input(&mut self) -> Result<(), EngineError> {
        // Real backends would refresh sensor_readings from the board here;
        // the dummy's readings are pushed directly via `set_sensor`.
        Ok(())
    }

    fn output(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn offline(&mut self) -> Result<(), EngineError> {
        self.online = false;
        for state in &mut self.relay_state {
            *state = false;
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn sensor_name(&self, sid: SensorId) -> Option<String> {
        self.sensor_names.get(sid.object).cloned()
    }

    fn sensor_ibn(&self, name: &str) -> Result<SensorId, EngineError> {
        self.find_sensor(name)
            .map(|object| SensorId { backend: 0, object })
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown sensor: {name}")))
    }

    fn sensor_clone_temp(&self, sid: SensorId) -> Result<Reading, EngineError> {
        self.sensor_readings
            .get(sid.object)
            .copied()
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown sensor id: {sid}")))
    }

    fn sensor_clone_time(&self, sid: SensorId) -> Result<TimekeepT, EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, "backend is offline"));
        }
        self.sensor_update_time
            .get(sid.object)
            .copied()
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown sensor id: {sid}")))
    }

    fn relay_name(&self, rid: RelayId) -> Option<String> {
        self.relay_names.get(rid.object).cloned()
    }

    fn relay_ibn(&self, name: &str) -> Result<RelayId, EngineError> {
        self.find_relay(name)
            .map(|object| RelayId { backend: 0, object })
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown relay: {name}")))
    }

    fn relay_get_state(&self, rid: RelayId) -> Result<bool, EngineError> {
        self.relay_state
            .get(rid.object)
            .copied()
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown relay id: {rid}")))
    }

    fn relay_set_state(
        &mut self,
        rid: RelayId,
        on: bool,
        _min_state_time: TimekeepT,
    ) -> Result<(), EngineError> {
        let state = self
            .relay_state
            .get_mut(rid.object)
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown relay id: {rid}")))?;
        *state = on;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Snapshot of every declared sensor/relay, keyed by name, for assertions.
pub fn dump_relays(backend: &DummyBackend) -> HashMap<String, bool> {
    backend
        .relay_names
        .iter()
        .cloned()
        .zip(backend.relay_state.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp::from_celsius;

    #[test]
    fn test_sensor_round_trip() {
        let mut backend = DummyBackend::new();
        let idx = backend.add_sensor("tBoiler", Reading::Valid(from_celsius(55.0)));
        let sid = SensorId { backend: 0, object: idx };
        assert_eq!(backend.sensor_clone_temp(sid).unwrap(), Reading::Valid(from_celsius(55.0)));
    }

    #[test]
    fn test_relay_set_get() {
        let mut backend = DummyBackend::new();
        let idx = backend.add_relay("burner1");
        let rid = RelayId { backend: 0, object: idx };
        assert!(!backend.relay_get_state(rid).unwrap());
        backend.relay_set_state(rid, true, 0).unwrap();
        assert!(backend.relay_get_state(rid).unwrap());
    }

    #[test]
    fn test_offline_deenergises_relays() {
        let mut backend = DummyBackend::new();
        let idx = backend.add_relay("burner1");
        let rid = RelayId { backend: 0, object: idx };
        backend.online().unwrap();
        backend.relay_set_state(rid, true, 0).unwrap();
        backend.offline().unwrap();
        assert!(!backend.relay_get_state(rid).unwrap());
    }
}
