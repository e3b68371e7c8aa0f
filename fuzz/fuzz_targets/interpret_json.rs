#![no_main]

use irforge::interp::Interpreter;
use irforge::ir::Program;
use irforge::regalloc::LinearScan;
use irforge::Limits;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(program) = serde_json::from_slice::<Program>(data) else {
        return;
    };
    // Every failure must surface as an error value, never a panic.
    let _ = Interpreter::new(&program).with_limits(Limits::strict()).run();
    let _ = irforge::codegen::compile_program(&program, &LinearScan::new());
});
