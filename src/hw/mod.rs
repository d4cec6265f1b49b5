//! Hardware backend interface: the only mandatory external contract.
//!
//! A backend is polymorphic over the capability set it actually provides —
//! a pure-relay board need not implement sensors, and vice versa — so the
//! sensor and relay surfaces are separate traits with default
//! implementations that fail with `NotConfigured`. `HwBackend` bundles the
//! lifecycle methods that every backend must provide regardless.

pub mod dummy;

use crate::error::{EngineError, ErrorKind};
use crate::ids::{RelayId, SensorId};
use crate::temp::Reading;
use crate::time::TimekeepT;

/// Lifecycle + sensor/relay capability set a backend exposes.
///
/// After `online()` returns `Ok`, `sensor_clone_time()` must always succeed
/// for every sensor this backend has configured - callers rely on this to
/// detect staleness without a separate "is this sensor known" check.
pub trait HwBackend: Send {
    fn init(&mut self) -> Result<(), EngineError>;

    fn online(&mut self) -> Result<(), EngineError>;

    /// Snapshot all sensors this backend owns. Must not block.
    fn input(&mut self) -> Result<(), EngineError>;

    /// Commit all pending relay changes this backend owns. Must not block.
    fn output(&mut self) -> Result<(), EngineError>;

    /// De-energise every relay and mark this backend offline.
    fn offline(&mut self) -> Result<(), EngineError>;

    fn exit(&mut self) -> Result<(), EngineError>;

    fn sensor_name(&self, _sid: SensorId) -> Option<String> {
        None
    }

    fn sensor_ibn(&self, _name: &str) -> Result<SensorId, EngineError> {
        Err(EngineError::new(ErrorKind::NotFound, "backend has no sensors"))
    }

    /// Clone the last-known value of a sensor without blocking on I/O.
    fn sensor_clone_temp(&self, _sid: SensorId) -> Result<Reading, EngineError> {
        Err(EngineError::new(ErrorKind::NotConfigured, "backend has no sensors"))
    }

    fn sensor_clone_time(&self, _sid: SensorId) -> Result<TimekeepT, EngineError> {
        Err(EngineError::new(ErrorKind::NotConfigured, "backend has no sensors"))
    }

    fn relay_name(&self, _rid: RelayId) -> Option<String> {
        None
    }

    fn relay_ibn(&self, _name: &str) -> Result<RelayId, EngineError> {
        Err(EngineError::new(ErrorKind::NotFound, "backend has no relays"))
    }

    /// The *committed* state, i.e. as of the last `output()`, not a pending
    /// request.
    fn relay_get_state(&self, _rid: RelayId) -> Result<bool, EngineError> {
        Err(EngineError::new(ErrorKind::NotConfigured, "backend has no relays"))
    }

    /// Request a relay state change. `min_state_time` is the minimum number
    /// of ticks the relay must remain in its previous state before this
    /// request is allowed to take effect (the pump/valve "cooldown").
    fn relay_set_state(
        &mut self,
        _rid: RelayId,
        _on: bool,
        _min_state_time: TimekeepT,
    ) -> Result<(), EngineError> {
        Err(EngineError::new(ErrorKind::NotConfigured, "backend has no relays"))
    }

    /// Lets tests reach a concrete backend (e.g. `DummyBackend`) through its
    /// registry index to drive scenarios; production code has no use for it.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Stable-index registry of backends, resolving `(backend_name, object_name)`
/// to `SensorId`/`RelayId` at configuration time. Entities hold only the
/// resulting indices afterward.
pub struct HwRegistry {
    backends: Vec<Box<dyn HwBackend>>,
    names: Vec<String>,
}

impl HwRegistry {
    pub fn new() -> Self {
        HwRegistry {
            backends: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Register a backend under a name, returning its stable index.
    pub fn register(&mut self, name: impl Into<String>, backend: Box<dyn HwBackend>) -> usize {
        self.backends.push(backend);
        self.names.push(name.into());
        self.backends.len() - 1
    }

    pub fn backend_index(&self, name: &str) -> Result<usize, EngineError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("unknown backend: {name}")))
    }

    pub fn resolve_sensor(&self, backend_name: &str, object_name: &str) -> Result<SensorId, EngineError> {
        let backend = self.backend_index(backend_name)?;
        let mut sid = self.backends[backend].sensor_ibn(object_name)?;
        sid.backend = backend;
        Ok(sid)
    }

    pub fn resolve_relay(&self, backend_name: &str, object_name: &str) -> Result<RelayId, EngineError> {
        let backend = self.backend_index(backend_name)?;
        let mut rid = self.backends[backend].relay_ibn(object_name)?;
        rid.backend = backend;
        Ok(rid)
    }

    pub fn sensor_clone_temp(&self, sid: SensorId) -> Result<Reading, EngineError> {
        self.backends[sid.backend].sensor_clone_temp(sid)
    }

    pub fn sensor_clone_time(&self, sid: SensorId) -> Result<TimekeepT, EngineError> {
        self.backends[sid.backend].sensor_clone_time(sid)
    }

    pub fn relay_get_state(&self, rid: RelayId) -> Result<bool, EngineError> {
        self.backends[rid.backend].relay_get_state(rid)
    }

    pub fn relay_set_state(
        &mut self,
        rid: RelayId,
        on: bool,
        min_state_time: TimekeepT,
    ) -> Result<(), EngineError> {
        self.backends[rid.backend].relay_set_state(rid, on, min_state_time)
    }

    pub fn online_all(&mut self) -> Result<(), EngineError> {
        for backend in &mut self.backends {
            backend.init()?;
            backend.online()?;
        }
        Ok(())
    }

    pub fn input_all(&mut self) -> Result<(), EngineError> {
        for backend in &mut self.backends {
            backend.input()?;
        }
        Ok(())
    }

    pub fn output_all(&mut self) -> Result<(), EngineError> {
        for backend in &mut self.backends {
            backend.output()?;
        }
        Ok(())
    }

    pub fn offline_all(&mut self) -> Result<(), EngineError> {
        for backend in &mut self.backends {
            backend.offline()?;
        }
        Ok(())
    }

    /// Test-only escape hatch onto a concrete backend type, by registry
    /// index. See `HwBackend::as_any_mut`.
    pub fn backend_any_mut(&mut self, index: usize) -> &mut dyn std::any::Any {
        self.backends[index].as_any_mut()
    }
}

impl Default for HwRegistry {
    fn default() -> Self {
        HwRegistry::new()
    }
}
