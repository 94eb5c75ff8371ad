use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::value::ValueKind;

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, Exception>;

/// Categories of errors raised by the runtime and the marshalling layer.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `OutOfBounds` -> "OutOfBounds").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// An index was outside `0..len` of the indexed container.
    OutOfBounds,
    /// A value had a different variant than the operation required.
    TypeMismatch,
    /// A fixed-arity projection was applied to a sequence of another length.
    ArityMismatch,
    /// A host type has no registered mapping to a scripting value.
    UnsupportedType,
    /// Integer arithmetic overflowed.
    Overflow,
    /// A configured resource limit was exceeded.
    ResourceExhausted,
    /// A host input could not be turned into a runtime value.
    InvalidInput,
    /// The instruction stream is malformed (bad operand, stack underflow).
    InvalidCode,
}

/// An error raised while running code or converting values.
///
/// Carries the instruction offset it was raised at when it originates inside the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    kind: ErrorKind,
    message: String,
    ip: Option<usize>,
}

impl Exception {
    /// Creates a new exception of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            ip: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Offset of the instruction that raised this error, if raised by the VM.
    #[must_use]
    pub fn ip(&self) -> Option<usize> {
        self.ip
    }

    /// Attaches an instruction offset unless one is already recorded.
    #[must_use]
    pub(crate) fn with_ip(mut self, ip: usize) -> Self {
        self.ip.get_or_insert(ip);
        self
    }

    pub(crate) fn out_of_bounds(index: impl fmt::Display, len: usize) -> Self {
        Self::new(
            ErrorKind::OutOfBounds,
            format!("index {index} is out of bounds for length {len}"),
        )
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub(crate) fn not_iterable(kind: ValueKind) -> Self {
        Self::type_mismatch(format!("{kind} is not iterable"))
    }

    pub(crate) fn invalid_code(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCode, message)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(ip) = self.ip {
            write!(f, " (at instruction {ip})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}
