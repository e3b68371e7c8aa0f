//! Three-address IR.
//!
//! A [`Program`] is an ordered list of [`Function`]s. Every instruction names
//! at most one destination and at most two source operands. Labels are scoped
//! to the function that declares them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// The program's single entry point.
    pub fn main(&self) -> Option<&Function> {
        self.function("main")
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// Disjoint from `params`. Unbound until first written.
    #[serde(default)]
    pub locals: Vec<String>,
    pub code: Vec<Inst>,
}

impl Function {
    pub fn new(name: &str, params: &[&str], locals: &[&str], code: Vec<Inst>) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            locals: locals.iter().map(|l| l.to_string()).collect(),
            code,
        }
    }

    /// Maps each declared label to the index of its `LabelDecl` instruction.
    pub fn label_table(&self) -> HashMap<String, usize> {
        let mut labels = HashMap::new();
        for (idx, inst) in self.code.iter().enumerate() {
            if let Inst::LabelDecl(name) = inst {
                labels.insert(name.clone(), idx);
            }
        }
        labels
    }

    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.code
            .iter()
            .position(|inst| matches!(inst, Inst::LabelDecl(name) if name == label))
    }

    /// `name (p1, p2)`, the form used in logs and generated comments.
    pub fn header(&self) -> String {
        format!("{} ({})", self.name, self.params.join(", "))
    }

    /// True when control can run past the last instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(self.code.last(), Some(Inst::Return(_)))
    }
}

/// Source operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Src {
    Temp(u32),
    Var(String),
    Int(i32),
    Bool(bool),
    Str(String),
}

impl Src {
    /// The destination this operand reads, if it is not a literal.
    pub fn as_dest(&self) -> Option<Dest> {
        match self {
            Src::Temp(n) => Some(Dest::Temp(*n)),
            Src::Var(name) => Some(Dest::Var(name.clone())),
            Src::Int(_) | Src::Bool(_) | Src::Str(_) => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.as_dest().is_none()
    }
}

impl From<Dest> for Src {
    fn from(dest: Dest) -> Self {
        match dest {
            Dest::Temp(n) => Src::Temp(n),
            Dest::Var(name) => Src::Var(name),
        }
    }
}

impl From<&Dest> for Src {
    fn from(dest: &Dest) -> Self {
        dest.clone().into()
    }
}

impl From<i32> for Src {
    fn from(i: i32) -> Self {
        Src::Int(i)
    }
}

impl From<bool> for Src {
    fn from(b: bool) -> Self {
        Src::Bool(b)
    }
}

/// A writable operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dest {
    Temp(u32),
    Var(String),
}

/// Heap address: base operand plus constant byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addr {
    pub base: Src,
    pub offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl ArithOp {
    pub fn is_logical(self) -> bool {
        matches!(self, ArithOp::And | ArithOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    /// EQ and NE compare any matching-tag pair; the rest need integers.
    pub fn is_ordering(self) -> bool {
        !matches!(self, RelOp::Eq | RelOp::Ne)
    }

    pub fn eval<T: PartialOrd>(self, l: T, r: T) -> bool {
        match self {
            RelOp::Eq => l == r,
            RelOp::Ne => l != r,
            RelOp::Lt => l < r,
            RelOp::Le => l <= r,
            RelOp::Gt => l > r,
            RelOp::Ge => l >= r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Arith(ArithOp),
    Rel(RelOp),
}

impl From<ArithOp> for BinOp {
    fn from(op: ArithOp) -> Self {
        BinOp::Arith(op)
    }
}

impl From<RelOp> for BinOp {
    fn from(op: RelOp) -> Self {
        BinOp::Rel(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inst {
    Binop {
        op: BinOp,
        dst: Dest,
        src1: Src,
        src2: Src,
    },
    Unop {
        op: UnOp,
        dst: Dest,
        src: Src,
    },
    Move {
        dst: Dest,
        src: Src,
    },
    Load {
        dst: Dest,
        addr: Addr,
    },
    Store {
        addr: Addr,
        src: Src,
    },
    LabelDecl(String),
    Jump(String),
    CJump {
        op: RelOp,
        src1: Src,
        src2: Src,
        label: String,
    },
    Call {
        name: String,
        args: Vec<Src>,
        dst: Option<Dest>,
    },
    Return(Option<Src>),
}

impl Inst {
    /// The destination written by this instruction.
    pub fn def(&self) -> Option<&Dest> {
        match self {
            Inst::Binop { dst, .. }
            | Inst::Unop { dst, .. }
            | Inst::Move { dst, .. }
            | Inst::Load { dst, .. } => Some(dst),
            Inst::Call { dst, .. } => dst.as_ref(),
            Inst::Store { .. }
            | Inst::LabelDecl(_)
            | Inst::Jump(_)
            | Inst::CJump { .. }
            | Inst::Return(_) => None,
        }
    }

    /// Destinations read by this instruction, in operand order.
    pub fn uses(&self) -> Vec<Dest> {
        let srcs: Vec<&Src> = match self {
            Inst::Binop { src1, src2, .. } | Inst::CJump { src1, src2, .. } => vec![src1, src2],
            Inst::Unop { src, .. } | Inst::Move { src, .. } => vec![src],
            Inst::Load { addr, .. } => vec![&addr.base],
            Inst::Store { addr, src } => vec![&addr.base, src],
            Inst::Call { args, .. } => args.iter().collect(),
            Inst::Return(val) => val.iter().collect(),
            Inst::LabelDecl(_) | Inst::Jump(_) => vec![],
        };
        srcs.into_iter().filter_map(Src::as_dest).collect()
    }

    /// Label this instruction may transfer control to.
    pub fn target(&self) -> Option<&str> {
        match self {
            Inst::Jump(label) | Inst::CJump { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Built-in call targets. These names cannot be shadowed by user functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    PrintInt,
    PrintBool,
    PrintStr,
    Malloc,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [
        Builtin::PrintInt,
        Builtin::PrintBool,
        Builtin::PrintStr,
        Builtin::Malloc,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::PrintInt => "printInt",
            Builtin::PrintBool => "printBool",
            Builtin::PrintStr => "printStr",
            Builtin::Malloc => "malloc",
        }
    }
}

// Textual form

impl fmt::Display for Src {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Src::Temp(n) => write!(f, "t{}", n),
            Src::Var(name) => write!(f, "{}", name),
            Src::Int(i) => write!(f, "{}", i),
            Src::Bool(b) => write!(f, "{}", b),
            Src::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl fmt::Display for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dest::Temp(n) => write!(f, "t{}", n),
            Dest::Var(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}{:+}]", self.base, self.offset)
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::And => "&&",
            ArithOp::Or => "||",
        };
        f.write_str(s)
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Arith(op) => op.fmt(f),
            BinOp::Rel(op) => op.fmt(f),
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => f.write_str("-"),
            UnOp::Not => f.write_str("!"),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Binop {
                op,
                dst,
                src1,
                src2,
            } => write!(f, "{} = {} {} {}", dst, src1, op, src2),
            Inst::Unop { op, dst, src } => write!(f, "{} = {}{}", dst, op, src),
            Inst::Move { dst, src } => write!(f, "{} = {}", dst, src),
            Inst::Load { dst, addr } => write!(f, "{} = {}", dst, addr),
            Inst::Store { addr, src } => write!(f, "{} = {}", addr, src),
            Inst::LabelDecl(name) => write!(f, "{}:", name),
            Inst::Jump(label) => write!(f, "goto {}", label),
            Inst::CJump {
                op,
                src1,
                src2,
                label,
            } => write!(f, "if {} {} {} goto {}", src1, op, src2, label),
            Inst::Call { name, args, dst } => {
                if let Some(dst) = dst {
                    write!(f, "{} = ", dst)?;
                }
                write!(f, "call {}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Inst::Return(Some(val)) => write!(f, "return {}", val),
            Inst::Return(None) => f.write_str("return"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header())?;
        if !self.locals.is_empty() {
            writeln!(f, "  locals {}", self.locals.join(", "))?;
        }
        for inst in &self.code {
            match inst {
                Inst::LabelDecl(_) => writeln!(f, "{}", inst)?,
                _ => writeln!(f, "  {}", inst)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

/// Terse constructors for building programs by hand.
pub mod build {
    use super::*;

    pub fn temp(n: u32) -> Dest {
        Dest::Temp(n)
    }

    pub fn var(name: &str) -> Dest {
        Dest::Var(name.to_string())
    }

    pub fn string(s: &str) -> Src {
        Src::Str(s.to_string())
    }

    pub fn binop(op: impl Into<BinOp>, dst: Dest, src1: impl Into<Src>, src2: impl Into<Src>) -> Inst {
        Inst::Binop {
            op: op.into(),
            dst,
            src1: src1.into(),
            src2: src2.into(),
        }
    }

    pub fn unop(op: UnOp, dst: Dest, src: impl Into<Src>) -> Inst {
        Inst::Unop {
            op,
            dst,
            src: src.into(),
        }
    }

    pub fn mov(dst: Dest, src: impl Into<Src>) -> Inst {
        Inst::Move {
            dst,
            src: src.into(),
        }
    }

    pub fn load(dst: Dest, base: impl Into<Src>, offset: i32) -> Inst {
        Inst::Load {
            dst,
            addr: Addr {
                base: base.into(),
                offset,
            },
        }
    }

    pub fn store(base: impl Into<Src>, offset: i32, src: impl Into<Src>) -> Inst {
        Inst::Store {
            addr: Addr {
                base: base.into(),
                offset,
            },
            src: src.into(),
        }
    }

    pub fn label(name: &str) -> Inst {
        Inst::LabelDecl(name.to_string())
    }

    pub fn jump(label: &str) -> Inst {
        Inst::Jump(label.to_string())
    }

    pub fn cjump(op: RelOp, src1: impl Into<Src>, src2: impl Into<Src>, label: &str) -> Inst {
        Inst::CJump {
            op,
            src1: src1.into(),
            src2: src2.into(),
            label: label.to_string(),
        }
    }

    pub fn call(name: &str, args: Vec<Src>, dst: Option<Dest>) -> Inst {
        Inst::Call {
            name: name.to_string(),
            args,
            dst,
        }
    }

    pub fn ret(val: Option<Src>) -> Inst {
        Inst::Return(val)
    }
}
