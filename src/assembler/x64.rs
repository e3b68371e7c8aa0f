use std::collections::{HashMap, HashSet};

use dynasmrt::{dynasm, x64::Assembler, DynamicLabel, DynasmApi, DynasmLabelApi};
use tracing::debug;

use crate::error::JitError;
use crate::ir::Builtin;
use crate::runtime;
use crate::x86::{AluOp, AsmInst, AsmProgram, Cond, Reg};

/// Encoded program: routines first, then NUL-terminated string literals.
#[derive(Debug, Clone)]
pub struct Image {
    pub code: Vec<u8>,
    /// Offset of `main`.
    pub entry: usize,
}

fn routine_key(name: &str) -> String {
    format!("fn:{}", name)
}

fn literal_key(index: usize) -> String {
    format!("lit:{}", index)
}

pub struct JitBuilder {
    ops: Assembler,
    labels: HashMap<String, DynamicLabel>,
    routines: HashSet<String>,
}

impl JitBuilder {
    pub fn new() -> Result<Self, JitError> {
        let ops = Assembler::new().map_err(|e| JitError::Assembler(e.to_string()))?;
        Ok(Self {
            ops,
            labels: HashMap::new(),
            routines: HashSet::new(),
        })
    }

    fn get_label(&mut self, name: &str) -> DynamicLabel {
        if let Some(&label) = self.labels.get(name) {
            label
        } else {
            let label = self.ops.new_dynamic_label();
            self.labels.insert(name.to_string(), label);
            label
        }
    }

    pub fn bind_label(&mut self, name: &str) {
        let label = self.get_label(name);
        let ops = &mut self.ops;
        dynasm!(ops ; =>label);
    }

    pub fn current_offset(&self) -> usize {
        self.ops.offset().0
    }

    /// Makes `name` a valid call target before its code is emitted.
    pub fn declare_routine(&mut self, name: &str) {
        self.routines.insert(name.to_string());
    }

    fn call(&mut self, target: &str) -> Result<(), JitError> {
        if let Some(builtin) = Builtin::from_name(target) {
            let addr = runtime::address(builtin) as i64;
            let ops = &mut self.ops;
            dynasm!(ops
                ; .arch x64
                ; mov rax, QWORD addr
                ; call rax
            );
            return Ok(());
        }
        if !self.routines.contains(target) {
            return Err(JitError::UndefinedTarget(target.to_string()));
        }
        let label = self.get_label(&routine_key(target));
        let ops = &mut self.ops;
        dynasm!(ops ; .arch x64 ; call =>label);
        Ok(())
    }

    fn jcc(&mut self, cond: Cond, name: &str) {
        let label = self.get_label(name);
        let ops = &mut self.ops;
        match cond {
            Cond::E => dynasm!(ops ; .arch x64 ; je =>label),
            Cond::Ne => dynasm!(ops ; .arch x64 ; jne =>label),
            Cond::L => dynasm!(ops ; .arch x64 ; jl =>label),
            Cond::Le => dynasm!(ops ; .arch x64 ; jle =>label),
            Cond::G => dynasm!(ops ; .arch x64 ; jg =>label),
            Cond::Ge => dynasm!(ops ; .arch x64 ; jge =>label),
        }
    }

    fn setcc(&mut self, cond: Cond, dst: Reg) {
        let d = dst.code();
        let ops = &mut self.ops;
        match cond {
            Cond::E => dynasm!(ops ; .arch x64 ; sete Rb(d)),
            Cond::Ne => dynasm!(ops ; .arch x64 ; setne Rb(d)),
            Cond::L => dynasm!(ops ; .arch x64 ; setl Rb(d)),
            Cond::Le => dynasm!(ops ; .arch x64 ; setle Rb(d)),
            Cond::G => dynasm!(ops ; .arch x64 ; setg Rb(d)),
            Cond::Ge => dynasm!(ops ; .arch x64 ; setge Rb(d)),
        }
    }

    pub fn emit(&mut self, inst: &AsmInst) -> Result<(), JitError> {
        match inst {
            AsmInst::Label(name) => self.bind_label(name),
            AsmInst::Jmp(name) => {
                let label = self.get_label(name);
                let ops = &mut self.ops;
                dynasm!(ops ; .arch x64 ; jmp =>label);
            }
            AsmInst::Jcc { cond, label } => self.jcc(*cond, label),
            AsmInst::Set { cond, dst } => self.setcc(*cond, *dst),
            AsmInst::Call(target) => self.call(target)?,
            AsmInst::LeaLiteral { index, dst } => {
                let label = self.get_label(&literal_key(*index));
                let d = dst.code();
                let ops = &mut self.ops;
                dynasm!(ops ; .arch x64 ; lea Rq(d), [=>label]);
            }
            _ => self.emit_plain(inst),
        }
        Ok(())
    }

    /// Instructions that reference no label.
    fn emit_plain(&mut self, inst: &AsmInst) {
        let ops = &mut self.ops;
        match *inst {
            AsmInst::Mov { src, dst } => {
                let (d, s) = (dst.code(), src.code());
                dynasm!(ops ; .arch x64 ; mov Rq(d), Rq(s));
            }
            AsmInst::MovImm { imm, dst } => {
                let d = dst.code();
                dynasm!(ops ; .arch x64 ; mov Rq(d), QWORD imm);
            }
            AsmInst::Load32 { base, disp, dst } => {
                let (d, b) = (dst.code(), base.code());
                dynasm!(ops ; .arch x64 ; movsxd Rq(d), DWORD [Rq(b) + disp]);
            }
            AsmInst::Store32 { src, base, disp } => {
                let (s, b) = (src.code(), base.code());
                dynasm!(ops ; .arch x64 ; mov DWORD [Rq(b) + disp], Rd(s));
            }
            AsmInst::Alu { op, src, dst } => {
                let (d, s) = (dst.code(), src.code());
                match op {
                    AluOp::Add => dynasm!(ops ; .arch x64 ; add Rq(d), Rq(s)),
                    AluOp::Sub => dynasm!(ops ; .arch x64 ; sub Rq(d), Rq(s)),
                    AluOp::Imul => dynasm!(ops ; .arch x64 ; imul Rq(d), Rq(s)),
                    AluOp::And => dynasm!(ops ; .arch x64 ; and Rq(d), Rq(s)),
                    AluOp::Or => dynasm!(ops ; .arch x64 ; or Rq(d), Rq(s)),
                }
            }
            AsmInst::Neg(reg) => {
                let r = reg.code();
                dynasm!(ops ; .arch x64 ; neg Rq(r));
            }
            AsmInst::XorImm { imm, dst } => {
                let d = dst.code();
                dynasm!(ops ; .arch x64 ; xor Rq(d), imm);
            }
            AsmInst::Sext32(reg) => {
                let r = reg.code();
                dynasm!(ops ; .arch x64 ; movsxd Rq(r), Rd(r));
            }
            AsmInst::Cqto => dynasm!(ops ; .arch x64 ; cqo),
            AsmInst::Idiv(reg) => {
                let r = reg.code();
                dynasm!(ops ; .arch x64 ; idiv Rq(r));
            }
            AsmInst::Cmp { lhs, rhs } => {
                let (l, r) = (lhs.code(), rhs.code());
                dynasm!(ops ; .arch x64 ; cmp Rq(l), Rq(r));
            }
            AsmInst::Movzb(reg) => {
                let r = reg.code();
                dynasm!(ops ; .arch x64 ; movzx Rq(r), Rb(r));
            }
            AsmInst::Push(reg) => {
                let r = reg.code();
                dynasm!(ops ; .arch x64 ; push Rq(r));
            }
            AsmInst::Pop(reg) => {
                let r = reg.code();
                dynasm!(ops ; .arch x64 ; pop Rq(r));
            }
            AsmInst::SubRsp(n) => dynasm!(ops ; .arch x64 ; sub rsp, n),
            AsmInst::AddRsp(n) => dynasm!(ops ; .arch x64 ; add rsp, n),
            AsmInst::Ret => dynasm!(ops ; .arch x64 ; ret),
            AsmInst::Label(_)
            | AsmInst::Jmp(_)
            | AsmInst::Jcc { .. }
            | AsmInst::Set { .. }
            | AsmInst::Call(_)
            | AsmInst::LeaLiteral { .. } => {}
        }
    }

    /// Places `bytes` plus a NUL terminator under label `name`.
    pub fn data(&mut self, name: &str, bytes: &[u8]) {
        self.bind_label(name);
        for &b in bytes {
            self.ops.push(b);
        }
        self.ops.push(0);
    }

    pub fn finalize(mut self) -> Result<Vec<u8>, JitError> {
        self.ops
            .commit()
            .map_err(|e| JitError::Assembler(e.to_string()))?;
        let buf = self
            .ops
            .finalize()
            .map_err(|_| JitError::Assembler("could not finalize code buffer".to_string()))?;
        Ok(buf.to_vec())
    }
}

/// Encodes every routine and the literal pool of `program`.
pub fn assemble(program: &AsmProgram) -> Result<Image, JitError> {
    let mut builder = JitBuilder::new()?;
    for routine in &program.routines {
        builder.declare_routine(&routine.name);
    }

    let mut entry = None;
    for routine in &program.routines {
        builder.bind_label(&routine_key(&routine.name));
        if routine.name == "main" {
            entry = Some(builder.current_offset());
        }
        for inst in &routine.insts {
            builder.emit(inst)?;
        }
    }
    for (index, s) in program.literals.iter() {
        builder.data(&literal_key(index), s.as_bytes());
    }

    let entry = entry.ok_or(JitError::MissingEntry)?;
    let code = builder.finalize()?;
    debug!("assembled {} routines into {} bytes", program.routines.len(), code.len());
    Ok(Image { code, entry })
}
