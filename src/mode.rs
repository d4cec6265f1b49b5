//! Shared mode vocabulary used by circuits, DHW tanks, and the plant-wide
//! scheduler. These are the "already resolved" outputs of the out-of-scope
//! scheduler (wall-clock-to-mode matching is external); the engine only
//! ever consumes a `RunMode`, never a clock.

use std::fmt::{self, Display, Formatter};

/// Effective operating mode for a circuit or tank at a given tick, handed
/// down by the (external) scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Off,
    Auto,
    Comfort,
    Eco,
    FrostFree,
    DhwOnly,
    Test,
}

impl Display for RunMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunMode::Off => "off",
            RunMode::Auto => "auto",
            RunMode::Comfort => "comfort",
            RunMode::Eco => "eco",
            RunMode::FrostFree => "frostfree",
            RunMode::DhwOnly => "dhwonly",
            RunMode::Test => "test",
        };
        write!(f, "{s}")
    }
}

/// Whether a forced DHW charge may pre-empt the schedule on a mode
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    Never,
    First,
    Always,
}

/// How a DHW tank prioritises its request against other tanks and circuits
/// sharing the same heat source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhwtCprio {
    /// Charge in parallel with circuits, tank request capped at its own max.
    ParalMax,
    /// Charge in parallel with circuits, tank request capped at DHW demand.
    ParalDhw,
    /// Slide circuits down while charging, up to the tank's own max.
    SlidMax,
    /// Slide circuits down while charging, up to DHW demand.
    SlidDhw,
    /// Charge takes absolute priority: circuits get nothing while charging.
    Absolute,
}

/// The substate a DHW tank is in at any given time. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhwtState {
    Off,
    FrostFree,
    Eco,
    Comfort,
    Test,
    Charging,
    Legionella,
    Manual,
}

/// Idle behaviour for a boiler heat source with no active consumer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleMode {
    /// Never idle: always hold at least `limit_tmin`.
    Never,
    /// Only keep the boiler warm in frost-risk conditions.
    FrostOnly,
    /// Allow the boiler to shut down fully when nothing requests heat.
    Always,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_display() {
        assert_eq!(RunMode::FrostFree.to_string(), "frostfree");
    }
}
