use backtrace::Backtrace;
use std::fmt::{self, Display, Formatter};

/// The discrete ways a plant operation can fail.
///
/// `Deadband` and `Deadzone` are not really failures: callers should treat
/// them as "no action taken this tick" and never print them as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    OutOfMemory,
    NotFound,
    NotConfigured,
    Offline,
    Misconfigured,
    Deadband,
    Deadzone,
    Exists,
    Empty,
    TooBig,
    Generic,
    Mismatch,
    SensorDisconnected,
    SensorShorted,
    TempTooHigh,
    TempTooLow,
}

impl ErrorKind {
    /// Whether this kind is a non-error "nothing to do" signal per the
    /// propagation policy: never surfaced to a user as a failure.
    pub fn is_non_error(&self) -> bool {
        matches!(self, ErrorKind::Deadband | ErrorKind::Deadzone)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug)]
pub struct EngineError {
    kind: ErrorKind,
    description: String,
    trace: Backtrace,
    actions: CorrectiveActions,
}

impl EngineError {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        EngineError {
            kind,
            description: description.into(),
            trace: Backtrace::new(),
            actions: CorrectiveActions::new(),
        }
    }

    pub fn with_actions(mut self, actions: CorrectiveActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn get_corrective_actions(&self) -> &CorrectiveActions {
        &self.actions
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.trace
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for EngineError {}

/// What the caller should do after receiving this error, besides log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectiveActions {
    relay_state_unknown: bool,
}

impl CorrectiveActions {
    pub fn new() -> Self {
        CorrectiveActions {
            relay_state_unknown: false,
        }
    }

    pub fn unknown_relay_state() -> Self {
        CorrectiveActions::new().with_unknown_relay_state()
    }

    pub fn with_unknown_relay_state(mut self) -> Self {
        self.relay_state_unknown = true;
        self
    }

    pub fn is_relay_state_unknown(&self) -> bool {
        self.relay_state_unknown
    }
}

impl Default for CorrectiveActions {
    fn default() -> Self {
        CorrectiveActions::new()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Expected "no action this tick" signal from a control operation.
/// Never propagated as an `Err` - see `ErrorKind::is_non_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome<T> {
    Applied(T),
    Deadband,
    Deadzone,
}

impl<T> ControlOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, ControlOutcome::Applied(_))
    }
}

#[macro_export]
macro_rules! engine_fail {
    ($kind:expr, $($arg:tt)*) => {
        $crate::error::EngineError::new($kind, format!($($arg)*))
    };
}
