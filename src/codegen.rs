//! Native code generation: IR function + register assignment -> x86-64 routine.
//!
//! Integers are kept sign-extended from 32 bits in 64-bit registers, so every
//! arithmetic result is re-extended after it is computed. `r10`/`r11` are
//! scratch and never hold a destination.

use tracing::{debug, trace};

use crate::error::GenError;
use crate::ir::{ArithOp, BinOp, Builtin, Dest, Function, Inst, Program, Src, UnOp};
use crate::liveness::Liveness;
use crate::parallel_move;
use crate::regalloc::{Assignment, RegisterOracle};
use crate::x86::{
    AluOp, AsmInst, AsmProgram, Cond, LiteralPool, Reg, Routine, ARG_REGS, CALLEE_SAVED,
    MAX_REG_ARGS, RETURN_REG, SCRATCH1, SCRATCH2,
};

/// Assembly label of IR label `label` inside `function`.
///
/// The function name is length-prefixed, so no two (function, label) pairs
/// share a label whatever characters their names contain.
pub fn local_label(function: &str, label: &str) -> String {
    format!(".L{}{}.{}", function.len(), function, label)
}

fn alu_op(op: ArithOp) -> Option<AluOp> {
    match op {
        ArithOp::Add => Some(AluOp::Add),
        ArithOp::Sub => Some(AluOp::Sub),
        ArithOp::Mul => Some(AluOp::Imul),
        ArithOp::And => Some(AluOp::And),
        ArithOp::Or => Some(AluOp::Or),
        ArithOp::Div => None,
    }
}

struct FunctionGen<'a> {
    func: &'a Function,
    assignment: &'a Assignment,
    pool: &'a mut LiteralPool,
    insts: Vec<AsmInst>,
    saved: Vec<Reg>,
    frame_size: i32,
}

impl<'a> FunctionGen<'a> {
    fn emit(&mut self, inst: AsmInst) {
        self.insts.push(inst);
    }

    fn mov(&mut self, src: Reg, dst: Reg) {
        if src != dst {
            self.emit(AsmInst::Mov { src, dst });
        }
    }

    fn operand(&self, dest: &Dest) -> Result<Reg, GenError> {
        self.assignment
            .reg(dest)
            .ok_or_else(|| GenError::UnassignedOperand {
                function: self.func.name.clone(),
                dest: dest.clone(),
            })
    }

    /// Register holding `src`. Literals are materialized into `scratch`.
    fn source(&mut self, src: &Src, scratch: Reg) -> Result<Reg, GenError> {
        match src {
            Src::Temp(_) | Src::Var(_) => match src.as_dest() {
                Some(dest) => self.operand(&dest),
                None => Ok(scratch),
            },
            Src::Int(i) => {
                self.emit(AsmInst::MovImm {
                    imm: i64::from(*i),
                    dst: scratch,
                });
                Ok(scratch)
            }
            Src::Bool(b) => {
                self.emit(AsmInst::MovImm {
                    imm: i64::from(*b),
                    dst: scratch,
                });
                Ok(scratch)
            }
            Src::Str(s) => {
                let index = self.pool.intern(s);
                self.emit(AsmInst::LeaLiteral {
                    index,
                    dst: scratch,
                });
                Ok(scratch)
            }
        }
    }

    fn prologue(&mut self) -> Result<(), GenError> {
        let func = self.func;
        let params = &func.params;
        if params.len() > MAX_REG_ARGS {
            return Err(GenError::TooManyParameters {
                function: func.name.clone(),
                count: params.len(),
            });
        }

        let used = self.assignment.registers();
        self.saved = CALLEE_SAVED
            .iter()
            .copied()
            .filter(|r| used.contains(r))
            .collect();
        for reg in self.saved.clone() {
            self.emit(AsmInst::Push(reg));
        }
        // The call pushed 8 bytes; keep rsp 16-byte aligned at our own calls.
        self.frame_size = if (self.saved.len() * 8) % 16 == 0 { 8 } else { 0 };
        if self.frame_size > 0 {
            self.emit(AsmInst::SubRsp(self.frame_size));
        }

        // Parameters written before they are read may share a register with
        // one that is live on entry, so only the live ones are moved.
        let live = Liveness::analyze(func);
        let entry = live.live_at_entry().cloned().unwrap_or_default();
        let moves: Vec<(Reg, Reg)> = params
            .iter()
            .zip(ARG_REGS.iter())
            .map(|(p, &arg)| (Dest::Var(p.clone()), arg))
            .filter(|(p, _)| entry.contains(p))
            .filter_map(|(p, arg)| self.assignment.reg(&p).map(|r| (r, arg)))
            .collect();
        for (dst, src) in parallel_move::resolve(&moves, SCRATCH1) {
            self.mov(src, dst);
        }
        Ok(())
    }

    fn epilogue(&mut self) {
        if self.frame_size > 0 {
            self.emit(AsmInst::AddRsp(self.frame_size));
        }
        for reg in self.saved.clone().into_iter().rev() {
            self.emit(AsmInst::Pop(reg));
        }
        self.emit(AsmInst::Ret);
    }

    fn binop(&mut self, op: BinOp, dst: &Dest, src1: &Src, src2: &Src) -> Result<(), GenError> {
        let Some(d) = self.assignment.reg(dst) else {
            return Ok(());
        };
        match op {
            BinOp::Rel(rel) => {
                let right = self.source(src2, SCRATCH1)?;
                let left = self.source(src1, SCRATCH2)?;
                self.emit(AsmInst::Cmp {
                    lhs: left,
                    rhs: right,
                });
                self.emit(AsmInst::Set {
                    cond: Cond::from(rel),
                    dst: d,
                });
                self.emit(AsmInst::Movzb(d));
            }
            BinOp::Arith(arith) => match alu_op(arith) {
                None => self.divide(d, src1, src2)?,
                Some(alu) => {
                    let mut right = self.source(src2, SCRATCH1)?;
                    // dst is overwritten with the left operand first.
                    if right == d {
                        self.mov(right, SCRATCH1);
                        right = SCRATCH1;
                    }
                    let left = self.source(src1, SCRATCH2)?;
                    self.mov(left, d);
                    self.emit(AsmInst::Alu {
                        op: alu,
                        src: right,
                        dst: d,
                    });
                    if !arith.is_logical() {
                        self.emit(AsmInst::Sext32(d));
                    }
                }
            },
        }
        Ok(())
    }

    /// `cqto; idivq` leaves the quotient in rax and clobbers rdx.
    fn divide(&mut self, d: Reg, src1: &Src, src2: &Src) -> Result<(), GenError> {
        let mut right = self.source(src2, SCRATCH1)?;
        if right.is_division_clobbered() {
            self.mov(right, SCRATCH1);
            right = SCRATCH1;
        }
        let left = self.source(src1, Reg::Rax)?;
        self.mov(left, Reg::Rax);
        self.emit(AsmInst::Cqto);
        self.emit(AsmInst::Idiv(right));
        self.emit(AsmInst::Sext32(Reg::Rax));
        self.mov(Reg::Rax, d);
        Ok(())
    }

    fn unop(&mut self, op: UnOp, dst: &Dest, src: &Src) -> Result<(), GenError> {
        let Some(d) = self.assignment.reg(dst) else {
            return Ok(());
        };
        let s = self.source(src, d)?;
        self.mov(s, d);
        match op {
            UnOp::Neg => {
                self.emit(AsmInst::Neg(d));
                self.emit(AsmInst::Sext32(d));
            }
            // Booleans are 0/1, so flip the low bit only.
            UnOp::Not => self.emit(AsmInst::XorImm { imm: 1, dst: d }),
        }
        Ok(())
    }

    fn call(&mut self, name: &str, args: &[Src], dst: Option<&Dest>) -> Result<(), GenError> {
        if args.len() > MAX_REG_ARGS {
            return Err(GenError::TooManyArguments {
                function: self.func.name.clone(),
                callee: name.to_string(),
                count: args.len(),
            });
        }

        let mut moves = Vec::new();
        for (arg, &reg) in args.iter().zip(ARG_REGS.iter()) {
            if let Some(dest) = arg.as_dest() {
                moves.push((reg, self.operand(&dest)?));
            }
        }
        for (d, s) in parallel_move::resolve(&moves, SCRATCH1) {
            self.mov(s, d);
        }
        for (arg, &reg) in args.iter().zip(ARG_REGS.iter()) {
            if arg.is_literal() {
                self.source(arg, reg)?;
            }
        }
        if args.is_empty() && Builtin::from_name(name) == Some(Builtin::PrintStr) {
            self.emit(AsmInst::MovImm {
                imm: 0,
                dst: ARG_REGS[0],
            });
        }

        self.emit(AsmInst::Call(name.to_string()));
        if let Some(r) = dst.and_then(|d| self.assignment.reg(d)) {
            self.mov(RETURN_REG, r);
        }
        Ok(())
    }

    fn lower(&mut self, inst: &Inst) -> Result<(), GenError> {
        let func = self.func;
        let name = &func.name;
        match inst {
            Inst::Binop {
                op,
                dst,
                src1,
                src2,
            } => self.binop(*op, dst, src1, src2)?,
            Inst::Unop { op, dst, src } => self.unop(*op, dst, src)?,
            Inst::Move { dst, src } => {
                if let Some(d) = self.assignment.reg(dst) {
                    let s = self.source(src, d)?;
                    self.mov(s, d);
                }
            }
            Inst::Load { dst, addr } => {
                if let Some(d) = self.assignment.reg(dst) {
                    let base = self.source(&addr.base, SCRATCH1)?;
                    self.emit(AsmInst::Load32 {
                        base,
                        disp: addr.offset,
                        dst: d,
                    });
                }
            }
            Inst::Store { addr, src } => {
                let base = self.source(&addr.base, SCRATCH1)?;
                let value = self.source(src, SCRATCH2)?;
                self.emit(AsmInst::Store32 {
                    src: value,
                    base,
                    disp: addr.offset,
                });
            }
            Inst::LabelDecl(label) => {
                let label = local_label(name, label);
                self.emit(AsmInst::Label(label));
            }
            Inst::Jump(label) => {
                let label = local_label(name, label);
                self.emit(AsmInst::Jmp(label));
            }
            Inst::CJump {
                op,
                src1,
                src2,
                label,
            } => {
                let label = local_label(name, label);
                let right = self.source(src2, SCRATCH1)?;
                let left = self.source(src1, SCRATCH2)?;
                self.emit(AsmInst::Cmp {
                    lhs: left,
                    rhs: right,
                });
                self.emit(AsmInst::Jcc {
                    cond: Cond::from(*op),
                    label,
                });
            }
            Inst::Call { name, args, dst } => self.call(name, args, dst.as_ref())?,
            Inst::Return(val) => {
                if let Some(v) = val {
                    let r = self.source(v, RETURN_REG)?;
                    self.mov(r, RETURN_REG);
                }
                self.epilogue();
            }
        }
        Ok(())
    }
}

/// Compiles one function. String literals are added to `pool`.
pub fn compile_function(
    func: &Function,
    assignment: &Assignment,
    pool: &mut LiteralPool,
) -> Result<Routine, GenError> {
    debug!("compiling {}", func.header());
    let mut gen = FunctionGen {
        func,
        assignment,
        pool,
        insts: Vec::new(),
        saved: Vec::new(),
        frame_size: 0,
    };
    gen.prologue()?;
    for (idx, inst) in func.code.iter().enumerate() {
        trace!(function = %func.name, index = idx, inst = %inst, "lower");
        gen.lower(inst)?;
    }
    if func.falls_through() {
        gen.epilogue();
    }
    Ok(Routine {
        name: func.name.clone(),
        insts: gen.insts,
    })
}

/// Assigns registers with `oracle` and compiles every function in order.
pub fn compile_program(
    program: &Program,
    oracle: &dyn RegisterOracle,
) -> Result<AsmProgram, GenError> {
    let mut literals = LiteralPool::default();
    let mut routines = Vec::with_capacity(program.functions.len());
    for func in &program.functions {
        let assignment = oracle.assign(func)?;
        routines.push(compile_function(func, &assignment, &mut literals)?);
    }
    Ok(AsmProgram { routines, literals })
}
