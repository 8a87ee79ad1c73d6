use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::val::{ExcType, Exception};

use super::opcode::Opcode;

/// Where an instruction lives: unit name, byte offset and the opcode found there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub unit: Arc<str>,
    pub offset: usize,
    pub opcode: Option<Opcode>,
}

impl Location {
    pub fn new(unit: Arc<str>, offset: usize, opcode: Option<Opcode>) -> Self {
        Self { unit, offset, opcode }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Some(op) => write!(f, "{}@{} ({})", self.unit, self.offset, op),
            None => write!(f, "{}@{}", self.unit, self.offset),
        }
    }
}

/// Fatal condition reported by a handler or the decoder.
///
/// Carries no location; the run loop attaches one when converting to [`VmError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    UnsupportedOpcode(u8),
    StackUnderflow(&'static str),
    BreakOutsideLoop,
    MalformedCode(String),
}

impl Fault {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Fault::MalformedCode(detail.into())
    }

    pub(crate) fn at(self, location: Location) -> VmError {
        match self {
            Fault::UnsupportedOpcode(byte) => VmError::UnsupportedOpcode { byte, location },
            Fault::StackUnderflow(what) => VmError::StackUnderflow { what, location },
            Fault::BreakOutsideLoop => VmError::BreakOutsideLoop { location },
            Fault::MalformedCode(detail) => VmError::MalformedCode { detail, location },
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnsupportedOpcode(byte) => write!(f, "unsupported opcode 0x{byte:02x}"),
            Fault::StackUnderflow(what) => write!(f, "stack underflow: {what}"),
            Fault::BreakOutsideLoop => f.write_str("'break' outside loop"),
            Fault::MalformedCode(detail) => write!(f, "malformed code: {detail}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnsupportedOpcode,
    StackUnderflow,
    BreakOutsideLoop,
    MalformedCode,
    UndefinedName,
    GuestRaised,
}

impl FailureKind {
    /// Whether guest `except`/`finally` blocks get to see this failure.
    pub fn is_recoverable(self) -> bool {
        matches!(self, FailureKind::UndefinedName | FailureKind::GuestRaised)
    }
}

/// A guest exception in flight, with the locations it unwound through.
///
/// `traceback[0]` is where it was raised; each frame it escapes appends the
/// caller's call site.
#[derive(Debug, Clone)]
pub struct Failure {
    pub exception: Arc<Exception>,
    pub traceback: Vec<Location>,
}

impl Failure {
    pub fn new(exception: impl Into<Arc<Exception>>) -> Self {
        Self {
            exception: exception.into(),
            traceback: Vec::new(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        if self.exception.kind.is_subclass_of(ExcType::NameError) {
            FailureKind::UndefinedName
        } else {
            FailureKind::GuestRaised
        }
    }

    /// Multi-line report, outermost call first.
    pub fn report(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for loc in self.traceback.iter().rev() {
            out.push_str("  at ");
            out.push_str(&loc.to_string());
            out.push('\n');
        }
        out.push_str(&self.exception.to_string());
        out
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.traceback.first() {
            Some(loc) => write!(f, "{} (raised at {})", self.exception, loc),
            None => write!(f, "{}", self.exception),
        }
    }
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("unsupported opcode 0x{byte:02x} at {location}")]
    UnsupportedOpcode { byte: u8, location: Location },
    #[error("stack underflow: {what} at {location}")]
    StackUnderflow { what: &'static str, location: Location },
    #[error("'break' outside loop at {location}")]
    BreakOutsideLoop { location: Location },
    #[error("malformed code at {location}: {detail}")]
    MalformedCode { detail: String, location: Location },
    #[error("{failure}")]
    Raised { failure: Failure },
}

impl VmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VmError::UnsupportedOpcode { .. } => FailureKind::UnsupportedOpcode,
            VmError::StackUnderflow { .. } => FailureKind::StackUnderflow,
            VmError::BreakOutsideLoop { .. } => FailureKind::BreakOutsideLoop,
            VmError::MalformedCode { .. } => FailureKind::MalformedCode,
            VmError::Raised { failure } => failure.kind(),
        }
    }

    /// Where the failure originated.
    pub fn location(&self) -> Option<&Location> {
        match self {
            VmError::UnsupportedOpcode { location, .. }
            | VmError::StackUnderflow { location, .. }
            | VmError::BreakOutsideLoop { location }
            | VmError::MalformedCode { location, .. } => Some(location),
            VmError::Raised { failure } => failure.traceback.first(),
        }
    }

    pub fn exception(&self) -> Option<&Exception> {
        match self {
            VmError::Raised { failure } => Some(&failure.exception),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            VmError::Raised { failure } => Some(failure),
            _ => None,
        }
    }
}
