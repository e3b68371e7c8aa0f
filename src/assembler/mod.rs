// Machine-code encoding for the JIT. Only x86-64 is supported.

pub mod x64;
pub use self::x64::{assemble, Image, JitBuilder};
