use std::fmt;

use thiserror::Error;
use zkgm_common::FieldError;

use crate::kernel::KernelState;

pub type Result<T> = std::result::Result<T, WitnessError>;

/// Fault codes raised by the kernel through `runtime.exceptionHandler`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelFault {
    SignalNotFound,
    TooManySignals,
    SignalAlreadySet,
    AssertFailed,
    OutOfMemory,
    ArrayBounds,
    Unknown(u32),
}

impl KernelFault {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => KernelFault::SignalNotFound,
            2 => KernelFault::TooManySignals,
            3 => KernelFault::SignalAlreadySet,
            4 => KernelFault::AssertFailed,
            5 => KernelFault::OutOfMemory,
            6 => KernelFault::ArrayBounds,
            other => KernelFault::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            KernelFault::SignalNotFound => 1,
            KernelFault::TooManySignals => 2,
            KernelFault::SignalAlreadySet => 3,
            KernelFault::AssertFailed => 4,
            KernelFault::OutOfMemory => 5,
            KernelFault::ArrayBounds => 6,
            KernelFault::Unknown(code) => *code,
        }
    }

    /// The inputs do not match the circuit's signal layout.
    pub fn is_input_mismatch(&self) -> bool {
        matches!(
            self,
            KernelFault::SignalNotFound
                | KernelFault::TooManySignals
                | KernelFault::SignalAlreadySet
                | KernelFault::ArrayBounds
        )
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, KernelFault::OutOfMemory)
    }
}

impl fmt::Display for KernelFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelFault::SignalNotFound => write!(f, "signal not found"),
            KernelFault::TooManySignals => write!(f, "too many signals set"),
            KernelFault::SignalAlreadySet => write!(f, "signal already set"),
            KernelFault::AssertFailed => write!(f, "assert failed"),
            KernelFault::OutOfMemory => write!(f, "not enough memory"),
            KernelFault::ArrayBounds => write!(f, "input signal array access exceeds the size"),
            KernelFault::Unknown(code) => write!(f, "unknown kernel error {}", code),
        }
    }
}

#[derive(Debug, Error)]
pub enum WitnessError {
    /// Input values that cannot be turned into field signals
    #[error("invalid circuit input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Field(#[from] FieldError),

    /// Requested tree depth is outside the supported range or shorter than the proof
    #[error("invalid merkle tree depth {depth}: {reason}")]
    InvalidDepth { depth: usize, reason: String },

    #[error("failed to compile circuit binary: {0}")]
    Compile(String),

    #[error("failed to instantiate circuit binary: {0}")]
    Instantiate(String),

    #[error("circuit binary does not export {0}")]
    MissingExport(String),

    /// The kernel reported one of its fault codes
    #[error("kernel fault: {fault}{}", format_diagnostics(.diagnostics))]
    Kernel { fault: KernelFault, diagnostics: String },

    /// The kernel trapped without reporting a fault code
    #[error("kernel trapped: {0}")]
    Trap(String),

    /// Fewer inputs were set than the circuit declares
    #[error("not all inputs have been set: only {set} out of {required}")]
    IncompleteInputs { set: u32, required: u32 },

    #[error("cannot {operation} while kernel is {state:?}")]
    InvalidState {
        state: KernelState,
        operation: &'static str,
    },

    #[error("no circuit binary loaded")]
    NotLoaded,

    #[error("invalid witness: {0}")]
    InvalidWitness(String),

    /// Malformed `wtns` container
    #[error("malformed wtns container: {0}")]
    Container(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_diagnostics(diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!(" ({})", diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_codes_round_trip() {
        for code in 0..10 {
            assert_eq!(KernelFault::from_code(code).code(), code);
        }
        assert_eq!(KernelFault::from_code(6), KernelFault::ArrayBounds);
        assert_eq!(KernelFault::from_code(42), KernelFault::Unknown(42));
    }

    #[test]
    fn faults_are_classified() {
        assert!(KernelFault::SignalNotFound.is_input_mismatch());
        assert!(!KernelFault::OutOfMemory.is_input_mismatch());
        assert!(KernelFault::OutOfMemory.is_resource_exhaustion());
        assert!(!KernelFault::AssertFailed.is_resource_exhaustion());
    }

    #[test]
    fn kernel_error_carries_diagnostics() {
        let err = WitnessError::Kernel {
            fault: KernelFault::AssertFailed,
            diagnostics: "Error in template Foo line: 12".into(),
        };
        assert_eq!(
            err.to_string(),
            "kernel fault: assert failed (Error in template Foo line: 12)"
        );
    }
}
