//! Error Types for irforge
//!
//! One error enum per failure domain (interpretation, register assignment,
//! code generation, native execution) plus a crate-level [`Error`] used by
//! the command-line driver. Every failure is fatal to the current run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::Dest;

/// What went wrong while interpreting one instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("undefined temporary t{0}")]
    UndefinedTemp(u32),
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("undefined label {0}")]
    UndefinedLabel(String),
    #[error("undefined function {0}")]
    UndefinedFunction(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("heap access at {index} is out of bounds (heap size {size})")]
    OutOfBounds { index: i64, size: usize },
    #[error("invalid allocation size {0}")]
    InvalidAllocation(i32),
    #[error("{callee} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        got: usize,
    },
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

/// A failed interpretation, located at the offending instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("program has no main function")]
    MissingMain,
    #[error("{kind} (in {function} at #{index}: {inst})")]
    Fault {
        function: String,
        index: usize,
        inst: String,
        kind: FaultKind,
    },
}

impl InterpError {
    pub fn kind(&self) -> Option<&FaultKind> {
        match self {
            InterpError::MissingMain => None,
            InterpError::Fault { kind, .. } => Some(kind),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("{function}: no register available for {dest}")]
    OutOfRegisters { function: String, dest: Dest },
}

/// Structural failures detected while generating code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("{function}: call to {callee} passes {count} arguments (limit 6)")]
    TooManyArguments {
        function: String,
        callee: String,
        count: usize,
    },
    #[error("{function}: {count} parameters (limit 6)")]
    TooManyParameters { function: String, count: usize },
    #[error("{function}: operand {dest} is read but has no register")]
    UnassignedOperand { function: String, dest: Dest },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    #[error("program has no main routine")]
    MissingEntry,
    #[error("undefined call target {0}")]
    UndefinedTarget(String),
    #[error("assembler error: {0}")]
    Assembler(String),
    #[error("memory error: {0}")]
    Memory(String),
}

/// Unified error type for the driver.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Interp(#[from] InterpError),
    #[error(transparent)]
    Gen(#[from] GenError),
    #[error(transparent)]
    Jit(#[from] JitError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for irforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Resource limits for interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of simultaneously active frames, `main` included
    pub max_call_depth: usize,
    /// Maximum number of executed instructions, if bounded
    pub max_steps: Option<u64>,
    /// Maximum number of heap slots `malloc` may hand out in total
    pub max_heap_slots: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: 100_000,
            max_steps: None,
            max_heap_slots: 1 << 22,
        }
    }
}

impl Limits {
    /// Tight limits for untrusted programs
    pub fn strict() -> Self {
        Self {
            max_call_depth: 1_000,
            max_steps: Some(1_000_000),
            max_heap_slots: 1 << 16,
        }
    }

    /// Relaxed limits for trusted programs
    pub fn trusted() -> Self {
        Self {
            max_call_depth: 10_000_000,
            max_steps: None,
            max_heap_slots: 1 << 26,
        }
    }

    pub fn check_depth(&self, depth: usize) -> std::result::Result<(), FaultKind> {
        if depth > self.max_call_depth {
            return Err(FaultKind::ResourceLimitExceeded(format!(
                "call depth {} exceeds limit {}",
                depth, self.max_call_depth
            )));
        }
        Ok(())
    }

    pub fn check_heap(&self, slots: usize) -> std::result::Result<(), FaultKind> {
        if slots > self.max_heap_slots {
            return Err(FaultKind::ResourceLimitExceeded(format!(
                "heap of {} slots exceeds limit {}",
                slots, self.max_heap_slots
            )));
        }
        Ok(())
    }

    pub fn check_steps(&self, steps: u64) -> std::result::Result<(), FaultKind> {
        match self.max_steps {
            Some(max) if steps > max => Err(FaultKind::ResourceLimitExceeded(format!(
                "step count {} exceeds limit {}",
                steps, max
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InterpError::Fault {
            function: "main".to_string(),
            index: 3,
            inst: "t0 = 1 / 0".to_string(),
            kind: FaultKind::DivisionByZero,
        };
        assert_eq!(err.to_string(), "division by zero (in main at #3: t0 = 1 / 0)");
        assert_eq!(err.kind(), Some(&FaultKind::DivisionByZero));
    }

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert!(limits.check_depth(1000).is_ok());
        assert!(limits.check_steps(u64::MAX).is_ok());
    }

    #[test]
    fn test_limits_strict() {
        let limits = Limits::strict();
        assert!(limits.check_depth(1000).is_ok());
        assert!(limits.check_depth(1001).is_err());
        assert!(limits.check_steps(2_000_000).is_err());
    }

    #[test]
    fn test_limits_partial_json() {
        let limits: Limits = serde_json::from_str(r#"{"max_steps": 10}"#).unwrap();
        assert_eq!(limits.max_steps, Some(10));
        assert_eq!(limits.max_call_depth, Limits::default().max_call_depth);
    }
}
