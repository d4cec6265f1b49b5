//! A pump: one relay plus a minimum-state-time ("cooldown").
//!
//! Pumps (and valves) are shared actuators: circuits and DHWTs only
//! *request* them on, the plant's tick resolves one commanded state per tick
//! via OR-aggregation and the pump itself just issues that one relay write.

use log::{debug, warn};

use crate::error::{EngineError, ErrorKind};
use crate::hw::HwRegistry;
use crate::ids::RelayId;
use crate::time::TimekeepT;

#[derive(Debug, Clone)]
pub struct Pump {
    name: String,
    cooldown_time: TimekeepT,
    rid: Option<RelayId>,
    requested_on: bool,
    online: bool,
}

impl Pump {
    pub fn new(name: impl Into<String>, cooldown_time: TimekeepT) -> Self {
        Pump {
            name: name.into(),
            cooldown_time,
            rid: None,
            requested_on: false,
            online: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the relay this pump drives. Called during configuration, after
    /// the hardware registry has resolved the relay name.
    pub fn set_relay(&mut self, rid: RelayId) {
        self.rid = Some(rid);
    }

    pub fn online(&mut self, registry: &HwRegistry) -> Result<(), EngineError> {
        let rid = self
            .rid
            .ok_or_else(|| EngineError::new(ErrorKind::NotConfigured, format!("pump {} has no relay bound", self.name)))?;
        registry.relay_get_state(rid)?;
        self.online = true;
        self.requested_on = false;
        Ok(())
    }

    pub fn offline(&mut self, registry: &mut HwRegistry) -> Result<(), EngineError> {
        if let Some(rid) = self.rid {
            registry.relay_set_state(rid, false, 0)?;
        }
        self.online = false;
        self.requested_on = false;
        Ok(())
    }

    pub fn request_on(&mut self, flag: bool) {
        self.requested_on = flag;
    }

    pub fn is_requested_on(&self) -> bool {
        self.requested_on
    }

    /// Drives the relay to the last-requested state, respecting the
    /// configured cooldown.
    pub fn run(&mut self, registry: &mut HwRegistry) -> Result<(), EngineError> {
        if !self.online {
            return Err(EngineError::new(ErrorKind::Offline, format!("pump {} is offline", self.name)));
        }
        let rid = self
            .rid
            .ok_or_else(|| EngineError::new(ErrorKind::NotConfigured, format!("pump {} has no relay bound", self.name)))?;

        debug!(target: "pump", "{}: requesting {}", self.name, self.requested_on);
        let result = registry.relay_set_state(rid, self.requested_on, self.cooldown_time);
        if let Err(ref err) = result {
            warn!(target: "pump", "{}: failed to set relay state: {}", self.name, err);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::dummy::DummyBackend;

    fn make_registry() -> (HwRegistry, RelayId) {
        let mut backend = DummyBackend::new();
        let idx = backend.add_relay("pump1");
        let mut registry = HwRegistry::new();
        registry.register("test", Box::new(backend));
        (registry, RelayId { backend: 0, object: idx })
    }

    #[test]
    fn test_not_configured_before_relay_bound() {
        let (registry, _rid) = make_registry();
        let mut pump = Pump::new("p1", 10);
        assert_eq!(pump.online(&registry).unwrap_err().kind(), ErrorKind::NotConfigured);
    }

    #[test]
    fn test_offline_before_online() {
        let (mut registry, rid) = make_registry();
        let mut pump = Pump::new("p1", 10);
        pump.set_relay(rid);
        assert_eq!(pump.run(&mut registry).unwrap_err().kind(), ErrorKind::Offline);
    }

    #[test]
    fn test_run_sets_relay_to_requested_state() {
        let (mut registry, rid) = make_registry();
        let mut pump = Pump::new("p1", 10);
        pump.set_relay(rid);
        pump.online(&registry).unwrap();
        pump.request_on(true);
        pump.run(&mut registry).unwrap();
        assert!(registry.relay_get_state(rid).unwrap());

        pump.request_on(false);
        pump.run(&mut registry).unwrap();
        assert!(!registry.relay_get_state(rid).unwrap());
    }

    #[test]
    fn test_offline_deenergises_and_blocks_further_runs() {
        let (mut registry, rid) = make_registry();
        let mut pump = Pump::new("p1", 10);
        pump.set_relay(rid);
        pump.online(&registry).unwrap();
        pump.request_on(true);
        pump.run(&mut registry).unwrap();

        pump.offline(&mut registry).unwrap();
        assert!(!registry.relay_get_state(rid).unwrap());
        assert_eq!(pump.run(&mut registry).unwrap_err().kind(), ErrorKind::Offline);
    }
}
