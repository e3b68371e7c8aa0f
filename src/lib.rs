//! irforge: a three-address IR with a reference interpreter and an x86-64
//! code generator that must agree with it.

pub mod codegen;
pub mod error;
pub mod interp;
pub mod ir;
pub mod liveness;
pub mod parallel_move;
pub mod regalloc;
pub mod value;
pub mod x86;

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod assembler;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod jit;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod jit_memory;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod runtime;

pub use codegen::{compile_function, compile_program};
pub use error::{Error, Limits, Result};
pub use interp::{run, Execution, Interpreter};
pub use ir::Program;
pub use regalloc::{Assignment, LinearScan, RegisterOracle};
pub use value::Value;
