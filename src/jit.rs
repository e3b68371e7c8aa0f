//! In-process execution of generated code.

use tracing::debug;

use crate::assembler::assemble;
use crate::error::JitError;
use crate::jit_memory::DualMappedMemory;
use crate::runtime;
use crate::x86::AsmProgram;

/// Printed lines and raw `rax` of a native run of `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeExecution {
    pub output: Vec<String>,
    pub exit: i64,
}

/// Encodes `program`, loads it into executable memory and calls `main`.
///
/// Generated code is trusted: a native fault (division by zero, a wild heap
/// access) takes the process down.
pub fn run_native(program: &AsmProgram) -> Result<NativeExecution, JitError> {
    let image = assemble(program)?;
    let memory = DualMappedMemory::new(image.code.len())?;
    memory.load(&image.code)?;
    let entry = memory.entry(image.entry).ok_or(JitError::MissingEntry)?;
    debug!("running main at offset {} of {} bytes", image.entry, image.code.len());

    // SAFETY: `entry` is the first instruction of `main`, which takes no
    // arguments and follows the System V calling convention.
    let main: extern "C" fn() -> i64 = unsafe { std::mem::transmute(entry) };
    let (exit, output) = runtime::capture(|| main());
    Ok(NativeExecution { output, exit })
}
