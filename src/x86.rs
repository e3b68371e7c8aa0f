//! x86-64 instruction model for the native code generator.
//!
//! Instructions are kept typed until the very end: the JIT encodes them with
//! dynasm, and [`fmt::Display`] renders GNU AT&T assembly text.

use std::collections::HashMap;
use std::fmt;

use crate::ir::RelOp;

/// General-purpose registers, numbered by hardware encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

/// System V integer argument registers, in argument order.
pub const ARG_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Callee-saved registers the allocator may hand out, in push order.
pub const CALLEE_SAVED: [Reg; 5] = [Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

pub const RETURN_REG: Reg = Reg::Rax;

/// Scratch registers owned by the code generator. Never allocated.
pub const SCRATCH1: Reg = Reg::R10;
pub const SCRATCH2: Reg = Reg::R11;

pub const MAX_REG_ARGS: usize = ARG_REGS.len();

impl Reg {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_callee_saved(self) -> bool {
        matches!(
            self,
            Reg::Rbx | Reg::Rbp | Reg::R12 | Reg::R13 | Reg::R14 | Reg::R15
        )
    }

    /// Clobbered by `cqto; idivq`.
    pub fn is_division_clobbered(self) -> bool {
        matches!(self, Reg::Rax | Reg::Rdx)
    }

    pub fn name64(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        NAMES[self as usize]
    }

    pub fn name32(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d",
            "r11d", "r12d", "r13d", "r14d", "r15d",
        ];
        NAMES[self as usize]
    }

    pub fn name8(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b",
            "r12b", "r13b", "r14b", "r15b",
        ];
        NAMES[self as usize]
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name64())
    }
}

/// Condition codes. IR and x86 agree on the relation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    E,
    Ne,
    L,
    Le,
    G,
    Ge,
}

impl Cond {
    pub fn suffix(self) -> &'static str {
        match self {
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::L => "l",
            Cond::Le => "le",
            Cond::G => "g",
            Cond::Ge => "ge",
        }
    }
}

impl From<RelOp> for Cond {
    fn from(op: RelOp) -> Self {
        match op {
            RelOp::Eq => Cond::E,
            RelOp::Ne => Cond::Ne,
            RelOp::Lt => Cond::L,
            RelOp::Le => Cond::Le,
            RelOp::Gt => Cond::G,
            RelOp::Ge => Cond::Ge,
        }
    }
}

/// Two-operand ALU instructions of the form `dst = dst op src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Imul,
    And,
    Or,
}

impl AluOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "addq",
            AluOp::Sub => "subq",
            AluOp::Imul => "imulq",
            AluOp::And => "andq",
            AluOp::Or => "orq",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmInst {
    /// movq src, dst
    Mov { src: Reg, dst: Reg },
    MovImm { imm: i64, dst: Reg },
    /// Address of a literal-pool entry.
    LeaLiteral { index: usize, dst: Reg },
    /// Sign-extending 32-bit heap load.
    Load32 { base: Reg, disp: i32, dst: Reg },
    /// Truncating 32-bit heap store.
    Store32 { src: Reg, base: Reg, disp: i32 },
    Alu { op: AluOp, src: Reg, dst: Reg },
    Neg(Reg),
    XorImm { imm: i32, dst: Reg },
    /// Sign-extends the low 32 bits into the whole register.
    Sext32(Reg),
    Cqto,
    Idiv(Reg),
    /// Sets flags from `lhs - rhs`.
    Cmp { lhs: Reg, rhs: Reg },
    /// Writes the low byte of `dst` only.
    Set { cond: Cond, dst: Reg },
    /// Zero-extends the low byte of a register into all of it.
    Movzb(Reg),
    Jmp(String),
    Jcc { cond: Cond, label: String },
    Call(String),
    Push(Reg),
    Pop(Reg),
    SubRsp(i32),
    AddRsp(i32),
    Ret,
    Label(String),
}

impl fmt::Display for AsmInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmInst::Mov { src, dst } => write!(f, "movq {},{}", src, dst),
            AsmInst::MovImm { imm, dst } => write!(f, "movq ${},{}", imm, dst),
            AsmInst::LeaLiteral { index, dst } => {
                write!(f, "leaq {}(%rip),{}", LiteralPool::label(*index), dst)
            }
            AsmInst::Load32 { base, disp, dst } => write!(f, "movslq {}({}),{}", disp, base, dst),
            AsmInst::Store32 { src, base, disp } => {
                write!(f, "movl %{},{}({})", src.name32(), disp, base)
            }
            AsmInst::Alu { op, src, dst } => write!(f, "{} {},{}", op.mnemonic(), src, dst),
            AsmInst::Neg(reg) => write!(f, "negq {}", reg),
            AsmInst::XorImm { imm, dst } => write!(f, "xorq ${},{}", imm, dst),
            AsmInst::Sext32(reg) => write!(f, "movslq %{},{}", reg.name32(), reg),
            AsmInst::Cqto => f.write_str("cqto"),
            AsmInst::Idiv(reg) => write!(f, "idivq {}", reg),
            // AT&T puts the subtrahend first.
            AsmInst::Cmp { lhs, rhs } => write!(f, "cmpq {},{}", rhs, lhs),
            AsmInst::Set { cond, dst } => write!(f, "set{} %{}", cond.suffix(), dst.name8()),
            AsmInst::Movzb(reg) => write!(f, "movzbq %{},{}", reg.name8(), reg),
            AsmInst::Jmp(label) => write!(f, "jmp {}", label),
            AsmInst::Jcc { cond, label } => write!(f, "j{} {}", cond.suffix(), label),
            AsmInst::Call(name) => write!(f, "call {}", name),
            AsmInst::Push(reg) => write!(f, "pushq {}", reg),
            AsmInst::Pop(reg) => write!(f, "popq {}", reg),
            AsmInst::SubRsp(n) => write!(f, "subq ${},%rsp", n),
            AsmInst::AddRsp(n) => write!(f, "addq ${},%rsp", n),
            AsmInst::Ret => f.write_str("ret"),
            AsmInst::Label(name) => write!(f, "{}:", name),
        }
    }
}

/// One generated function, labelled with the IR function's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    pub name: String,
    pub insts: Vec<AsmInst>,
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t.p2align 4,0x90")?;
        writeln!(f, "\t.globl {}", self.name)?;
        writeln!(f, "{}:", self.name)?;
        for inst in &self.insts {
            match inst {
                AsmInst::Label(_) => writeln!(f, "{}", inst)?,
                _ => writeln!(f, "\t{}", inst)?,
            }
        }
        Ok(())
    }
}

/// String literals of a program, deduplicated and indexed by first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiteralPool {
    strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl LiteralPool {
    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    pub fn label(index: usize) -> String {
        format!("_S{}", index)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.strings.iter().map(String::as_str).enumerate()
    }
}

fn escape_asciz(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

/// A whole program: one routine per function plus the literal pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsmProgram {
    pub routines: Vec<Routine>,
    pub literals: LiteralPool,
}

impl AsmProgram {
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for AsmProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t.text")?;
        for routine in &self.routines {
            write!(f, "{}", routine)?;
        }
        if !self.literals.is_empty() {
            writeln!(f, "\t.data")?;
            for (i, s) in self.literals.iter() {
                writeln!(f, "{}:", LiteralPool::label(i))?;
                writeln!(f, "\t.asciz \"{}\"", escape_asciz(s))?;
            }
        }
        Ok(())
    }
}
