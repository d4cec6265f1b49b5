//! Sensor and relay identifiers.
//!
//! Assigned once, at configuration parse time, by resolving a
//! `(backend_name, object_name)` pair against a registered backend. Immutable
//! for the life of the plant: entities hold these indices, never a name or an
//! owning handle to the backend.

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorId {
    pub backend: usize,
    pub object: usize,
}

impl Display for SensorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "sensor({}:{})", self.backend, self.object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayId {
    pub backend: usize,
    pub object: usize,
}

impl Display for RelayId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "relay({}:{})", self.backend, self.object)
    }
}
