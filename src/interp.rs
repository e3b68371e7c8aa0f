//! Reference interpreter.
//!
//! Executes a [`Program`] by fetching and executing instructions with an
//! explicit instruction index per frame. Frames live on an explicit stack, so
//! recursion depth is bounded by [`Limits`] rather than by the host stack.
//! The interpreter is the definition of what a program means: the native
//! code generator must reproduce its printed output.

use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::error::{FaultKind, InterpError, Limits};
use crate::ir::{Addr, ArithOp, BinOp, Builtin, Dest, Function, Inst, Program, RelOp, Src, UnOp};
use crate::value::Value;

/// Receives every printed line, in order.
pub trait Console {
    fn print_line(&mut self, line: &str);
}

#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub lines: Vec<String>,
}

impl Console for CapturedOutput {
    fn print_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

#[derive(Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn print_line(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// Printed lines plus the final value of `main`, or the failure that ended the run.
#[derive(Debug)]
pub struct Execution {
    pub output: Vec<String>,
    pub result: Result<Value, InterpError>,
}

/// Interprets `program` with default limits, capturing its output.
pub fn run(program: &Program) -> Execution {
    Interpreter::new(program).run()
}

pub struct Interpreter<'p> {
    functions: HashMap<&'p str, &'p Function>,
    main: Option<&'p Function>,
    limits: Limits,
}

/// Outcome of executing one instruction.
enum Control<'p> {
    Continue,
    Jump(usize),
    Call {
        callee: &'p Function,
        args: Vec<Value>,
        dst: Option<&'p Dest>,
    },
    Return(Value),
}

/// Per-activation state. Created on entry, dropped on return.
struct Frame<'p> {
    func: &'p Function,
    pc: usize,
    labels: HashMap<String, usize>,
    vars: HashMap<String, Value>,
    temps: HashMap<u32, Value>,
    /// Caller's destination for this activation's return value.
    ret_dst: Option<&'p Dest>,
}

impl<'p> Frame<'p> {
    fn enter(func: &'p Function, args: Vec<Value>, ret_dst: Option<&'p Dest>) -> Self {
        let vars = func.params.iter().cloned().zip(args).collect();
        Self {
            func,
            pc: 0,
            labels: func.label_table(),
            vars,
            temps: HashMap::new(),
            ret_dst,
        }
    }

    fn eval(&self, src: &Src) -> Result<Value, FaultKind> {
        match src {
            Src::Temp(n) => self
                .temps
                .get(n)
                .cloned()
                .ok_or(FaultKind::UndefinedTemp(*n)),
            Src::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| FaultKind::UndefinedVariable(name.clone())),
            Src::Int(i) => Ok(Value::Int(*i)),
            Src::Bool(b) => Ok(Value::Bool(*b)),
            Src::Str(s) => Ok(Value::from(s.as_str())),
        }
    }

    fn assign(&mut self, dst: &Dest, value: Value) {
        match dst {
            Dest::Temp(n) => {
                self.temps.insert(*n, value);
            }
            Dest::Var(name) => {
                self.vars.insert(name.clone(), value);
            }
        }
    }

    fn label(&self, label: &str) -> Result<usize, FaultKind> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| FaultKind::UndefinedLabel(label.to_string()))
    }

    fn address(&self, addr: &Addr) -> Result<i64, FaultKind> {
        match self.eval(&addr.base)? {
            Value::Int(base) => Ok(base as i64 + addr.offset as i64),
            other => Err(FaultKind::TypeMismatch(format!(
                "address base is {}, expected integer",
                other.tag()
            ))),
        }
    }
}

/// Append-only simulated heap. Indices are slot numbers.
#[derive(Debug, Default)]
struct Heap {
    slots: Vec<Value>,
}

impl Heap {
    fn alloc(&mut self, size: i32, limits: &Limits) -> Result<i32, FaultKind> {
        let count = usize::try_from(size).map_err(|_| FaultKind::InvalidAllocation(size))?;
        let total = self.slots.len() + count;
        limits.check_heap(total)?;
        let base = i32::try_from(self.slots.len())
            .map_err(|_| FaultKind::ResourceLimitExceeded("heap exhausted".to_string()))?;
        self.slots.resize(total, Value::Undefined);
        Ok(base)
    }

    fn slot(&self, index: i64) -> Result<usize, FaultKind> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.slots.len())
            .ok_or(FaultKind::OutOfBounds {
                index,
                size: self.slots.len(),
            })
    }

    fn read(&self, index: i64) -> Result<Value, FaultKind> {
        let slot = self.slot(index)?;
        Ok(self.slots[slot].clone())
    }

    fn write(&mut self, index: i64, value: Value) -> Result<(), FaultKind> {
        let slot = self.slot(index)?;
        self.slots[slot] = value;
        Ok(())
    }
}

fn mismatch(what: impl std::fmt::Display, l: &Value, r: &Value) -> FaultKind {
    FaultKind::TypeMismatch(format!("{} on {} and {}", what, l.tag(), r.tag()))
}

fn arith(op: ArithOp, l: &Value, r: &Value) -> Result<Value, FaultKind> {
    match (op, l, r) {
        (ArithOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (ArithOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        (ArithOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
        (ArithOp::Div, Value::Int(_), Value::Int(0)) => Err(FaultKind::DivisionByZero),
        (ArithOp::Div, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(*b))),
        (ArithOp::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (ArithOp::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        _ => Err(mismatch(op, l, r)),
    }
}

fn compare(op: RelOp, l: &Value, r: &Value) -> Result<bool, FaultKind> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(op.eval(a, b)),
        (Value::Bool(a), Value::Bool(b)) if !op.is_ordering() => Ok(op.eval(a, b)),
        _ => Err(mismatch(op, l, r)),
    }
}

fn unary(op: UnOp, v: &Value) -> Result<Value, FaultKind> {
    match (op, v) {
        (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(FaultKind::TypeMismatch(format!("{} on {}", op, v.tag()))),
    }
}

fn check_arity(callee: &str, expected: usize, got: usize) -> Result<(), FaultKind> {
    if expected != got {
        return Err(FaultKind::ArityMismatch {
            callee: callee.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

fn fault(func: &Function, index: usize, inst: &Inst, kind: FaultKind) -> InterpError {
    InterpError::Fault {
        function: func.name.clone(),
        index,
        inst: inst.to_string(),
        kind,
    }
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            functions: program
                .functions
                .iter()
                .map(|f| (f.name.as_str(), f))
                .collect(),
            main: program.main(),
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Runs `main`, capturing printed lines.
    pub fn run(&self) -> Execution {
        let mut console = CapturedOutput::default();
        let result = self.run_with(&mut console);
        Execution {
            output: console.lines,
            result,
        }
    }

    /// Runs `main`, sending printed lines to `console`.
    pub fn run_with(&self, console: &mut dyn Console) -> Result<Value, InterpError> {
        let main = self.main.ok_or(InterpError::MissingMain)?;
        let result = self.execute(main, console);
        if let Err(err) = &result {
            warn!("interpretation failed: {}", err);
        }
        result
    }

    fn execute(&self, main: &'p Function, console: &mut dyn Console) -> Result<Value, InterpError> {
        let mut heap = Heap::default();
        let mut stack = vec![Frame::enter(main, Vec::new(), None)];
        let mut steps: u64 = 0;
        debug!("enter {}", main.header());

        while let Some(frame) = stack.last_mut() {
            let func = frame.func;
            let pc = frame.pc;
            let control = match func.code.get(pc) {
                // Falling off the end is an implicit `return`.
                None => Control::Return(Value::Undefined),
                Some(inst) => {
                    steps += 1;
                    trace!(function = %func.name, index = pc, inst = %inst);
                    let outcome = match self.limits.check_steps(steps) {
                        Ok(()) => self.step(frame, inst, &mut heap, console),
                        Err(kind) => Err(kind),
                    };
                    outcome.map_err(|kind| fault(func, pc, inst, kind))?
                }
            };

            match control {
                Control::Continue => frame.pc += 1,
                Control::Jump(target) => frame.pc = target,
                Control::Call { callee, args, dst } => {
                    frame.pc += 1;
                    if let Err(kind) = self.limits.check_depth(stack.len() + 1) {
                        return Err(fault(func, pc, &func.code[pc], kind));
                    }
                    debug!("enter {}", callee.header());
                    stack.push(Frame::enter(callee, args, dst));
                }
                Control::Return(value) => {
                    let finished = stack.pop();
                    let ret_dst = finished.and_then(|f| f.ret_dst);
                    match stack.last_mut() {
                        None => return Ok(value),
                        Some(caller) => {
                            if let Some(dst) = ret_dst {
                                caller.assign(dst, value);
                            }
                        }
                    }
                }
            }
        }
        Ok(Value::Undefined)
    }

    fn step(
        &self,
        frame: &mut Frame<'p>,
        inst: &'p Inst,
        heap: &mut Heap,
        console: &mut dyn Console,
    ) -> Result<Control<'p>, FaultKind> {
        match inst {
            Inst::Binop {
                op,
                dst,
                src1,
                src2,
            } => {
                let l = frame.eval(src1)?;
                let r = frame.eval(src2)?;
                let value = match op {
                    BinOp::Arith(op) => arith(*op, &l, &r)?,
                    BinOp::Rel(op) => Value::Bool(compare(*op, &l, &r)?),
                };
                frame.assign(dst, value);
            }
            Inst::Unop { op, dst, src } => {
                let value = unary(*op, &frame.eval(src)?)?;
                frame.assign(dst, value);
            }
            Inst::Move { dst, src } => {
                let value = frame.eval(src)?;
                frame.assign(dst, value);
            }
            Inst::Load { dst, addr } => {
                let value = heap.read(frame.address(addr)?)?;
                frame.assign(dst, value);
            }
            Inst::Store { addr, src } => {
                let value = frame.eval(src)?;
                heap.write(frame.address(addr)?, value)?;
            }
            Inst::LabelDecl(_) => {}
            Inst::Jump(label) => return Ok(Control::Jump(frame.label(label)?)),
            Inst::CJump {
                op,
                src1,
                src2,
                label,
            } => {
                let l = frame.eval(src1)?;
                let r = frame.eval(src2)?;
                if compare(*op, &l, &r)? {
                    return Ok(Control::Jump(frame.label(label)?));
                }
            }
            Inst::Call { name, args, dst } => {
                let args = args
                    .iter()
                    .map(|a| frame.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                match Builtin::from_name(name) {
                    Some(builtin) => {
                        if let Some(value) = self.call_builtin(builtin, &args, heap, console)? {
                            if let Some(dst) = dst {
                                frame.assign(dst, value);
                            }
                        }
                    }
                    None => {
                        let callee = self
                            .functions
                            .get(name.as_str())
                            .copied()
                            .ok_or_else(|| FaultKind::UndefinedFunction(name.clone()))?;
                        check_arity(name, callee.params.len(), args.len())?;
                        return Ok(Control::Call {
                            callee,
                            args,
                            dst: dst.as_ref(),
                        });
                    }
                }
            }
            Inst::Return(val) => {
                let value = match val {
                    Some(src) => frame.eval(src)?,
                    None => Value::Undefined,
                };
                return Ok(Control::Return(value));
            }
        }
        Ok(Control::Continue)
    }

    fn call_builtin(
        &self,
        builtin: Builtin,
        args: &[Value],
        heap: &mut Heap,
        console: &mut dyn Console,
    ) -> Result<Option<Value>, FaultKind> {
        match builtin {
            Builtin::PrintInt | Builtin::PrintBool => {
                check_arity(builtin.name(), 1, args.len())?;
                console.print_line(&args[0].to_string());
                Ok(None)
            }
            Builtin::PrintStr => match args {
                [] => {
                    console.print_line("");
                    Ok(None)
                }
                [s] => {
                    console.print_line(&s.to_string());
                    Ok(None)
                }
                _ => Err(FaultKind::ArityMismatch {
                    callee: builtin.name().to_string(),
                    expected: 1,
                    got: args.len(),
                }),
            },
            Builtin::Malloc => {
                check_arity(builtin.name(), 1, args.len())?;
                match &args[0] {
                    Value::Int(size) => Ok(Some(Value::Int(heap.alloc(*size, &self.limits)?))),
                    other => Err(FaultKind::TypeMismatch(format!(
                        "malloc size is {}, expected integer",
                        other.tag()
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;
    use crate::ir::{ArithOp::*, RelOp::*};

    fn main_only(code: Vec<Inst>) -> Program {
        Program::new(vec![Function::new("main", &[], &[], code)])
    }

    fn fault_kind(exec: &Execution) -> FaultKind {
        exec.result
            .as_ref()
            .unwrap_err()
            .kind()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        let exec = run(&main_only(vec![
            binop(Div, temp(0), 7, 2),
            binop(Div, temp(1), -7, 2),
            call("printInt", vec![temp(0).into()], None),
            call("printInt", vec![temp(1).into()], None),
            ret(Some(temp(1).into())),
        ]));
        assert_eq!(exec.output, vec!["3", "-3"]);
        assert_eq!(exec.result, Ok(Value::Int(-3)));
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let exec = run(&main_only(vec![
            call("printStr", vec![string("before")], None),
            binop(Div, temp(0), 1, 0),
            call("printStr", vec![string("after")], None),
        ]));
        assert_eq!(exec.output, vec!["before"]);
        let err = exec.result.as_ref().unwrap_err();
        assert_eq!(err.kind(), Some(&FaultKind::DivisionByZero));
        assert!(err.to_string().contains("in main at #1: t0 = 1 / 0"));
    }

    #[test]
    fn test_overflow_wraps() {
        let exec = run(&main_only(vec![
            binop(Add, temp(0), i32::MAX, 1),
            binop(Div, temp(1), i32::MIN, -1),
            call("printInt", vec![temp(0).into()], None),
            call("printInt", vec![temp(1).into()], None),
        ]));
        assert_eq!(exec.output, vec!["-2147483648", "-2147483648"]);
    }

    #[test]
    fn test_logical_and_relational_binops() {
        let exec = run(&main_only(vec![
            binop(And, temp(0), true, false),
            binop(Or, temp(1), true, false),
            binop(Le, temp(2), 3, 3),
            binop(Ne, temp(3), true, true),
            unop(UnOp::Not, temp(4), temp(3)),
            unop(UnOp::Neg, temp(5), 9),
            call("printBool", vec![temp(0).into()], None),
            call("printBool", vec![temp(1).into()], None),
            call("printBool", vec![temp(2).into()], None),
            call("printBool", vec![temp(4).into()], None),
            call("printInt", vec![temp(5).into()], None),
        ]));
        assert_eq!(exec.output, vec!["false", "true", "true", "true", "-9"]);
        assert!(exec.result.is_ok());
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let exec = run(&main_only(vec![binop(Add, temp(0), 1, true)]));
        assert!(matches!(fault_kind(&exec), FaultKind::TypeMismatch(_)));

        let exec = run(&main_only(vec![cjump(Lt, true, false, "L")]));
        assert!(matches!(fault_kind(&exec), FaultKind::TypeMismatch(_)));

        let exec = run(&main_only(vec![unop(UnOp::Not, temp(0), 1)]));
        assert!(matches!(fault_kind(&exec), FaultKind::TypeMismatch(_)));

        // Strings compare under no relation, equality included.
        let exec = run(&main_only(vec![cjump(Eq, string("a"), string("a"), "L")]));
        assert!(matches!(fault_kind(&exec), FaultKind::TypeMismatch(_)));
    }

    #[test]
    fn test_cjump_always_taken() {
        let exec = run(&main_only(vec![
            cjump(Lt, 3, 5, "L"),
            call("printStr", vec![string("fell through")], None),
            label("L"),
            call("printStr", vec![string("jumped")], None),
        ]));
        assert_eq!(exec.output, vec!["jumped"]);
    }

    #[test]
    fn test_cjump_on_booleans() {
        let exec = run(&main_only(vec![
            cjump(Eq, true, true, "L"),
            call("printInt", vec![Src::Int(0)], None),
            label("L"),
            call("printInt", vec![Src::Int(1)], None),
        ]));
        assert_eq!(exec.output, vec!["1"]);
    }

    #[test]
    fn test_loop_counts_down() {
        let program = Program::new(vec![Function::new(
            "main",
            &[],
            &["i"],
            vec![
                mov(var("i"), 3),
                label("top"),
                cjump(Le, var("i"), 0, "done"),
                call("printInt", vec![var("i").into()], None),
                binop(Sub, var("i"), var("i"), 1),
                jump("top"),
                label("done"),
                ret(None),
            ],
        )]);
        assert_eq!(run(&program).output, vec!["3", "2", "1"]);
    }

    #[test]
    fn test_print_formatting() {
        let exec = run(&main_only(vec![
            call("printStr", vec![], None),
            call("printInt", vec![Src::Int(42)], None),
            call("printStr", vec![string("hello")], None),
        ]));
        assert_eq!(exec.output, vec!["", "42", "hello"]);
    }

    #[test]
    fn test_malloc_is_monotonic_and_undefined() {
        let exec = run(&main_only(vec![
            call("malloc", vec![Src::Int(3)], Some(temp(0))),
            call("malloc", vec![Src::Int(2)], Some(temp(1))),
            load(temp(2), temp(1), 1),
            store(temp(0), 2, 99),
            load(temp(3), temp(0), 2),
            call("printInt", vec![temp(0).into()], None),
            call("printInt", vec![temp(1).into()], None),
            call("printInt", vec![temp(2).into()], None),
            call("printInt", vec![temp(3).into()], None),
        ]));
        assert_eq!(exec.output, vec!["0", "3", "undefined", "99"]);
        assert!(exec.result.is_ok());
    }

    #[test]
    fn test_heap_bounds() {
        let exec = run(&main_only(vec![
            call("malloc", vec![Src::Int(2)], Some(temp(0))),
            load(temp(1), temp(0), 2),
        ]));
        assert_eq!(
            fault_kind(&exec),
            FaultKind::OutOfBounds { index: 2, size: 2 }
        );

        let exec = run(&main_only(vec![store(Src::Int(-1), 0, 5)]));
        assert!(matches!(fault_kind(&exec), FaultKind::OutOfBounds { .. }));

        let exec = run(&main_only(vec![call("malloc", vec![Src::Int(-4)], Some(temp(0)))]));
        assert_eq!(fault_kind(&exec), FaultKind::InvalidAllocation(-4));
    }

    #[test]
    fn test_unresolved_references() {
        let exec = run(&main_only(vec![mov(temp(0), temp(7))]));
        assert_eq!(fault_kind(&exec), FaultKind::UndefinedTemp(7));

        let program = Program::new(vec![Function::new(
            "main",
            &[],
            &["x"],
            vec![call("printInt", vec![var("x").into()], None)],
        )]);
        assert_eq!(
            fault_kind(&run(&program)),
            FaultKind::UndefinedVariable("x".to_string())
        );

        let exec = run(&main_only(vec![jump("nowhere")]));
        assert_eq!(
            fault_kind(&exec),
            FaultKind::UndefinedLabel("nowhere".to_string())
        );

        let exec = run(&main_only(vec![call("missing", vec![], None)]));
        assert_eq!(
            fault_kind(&exec),
            FaultKind::UndefinedFunction("missing".to_string())
        );
    }

    fn factorial() -> Function {
        Function::new(
            "fact",
            &["n"],
            &[],
            vec![
                cjump(Gt, var("n"), 1, "rec"),
                ret(Some(Src::Int(1))),
                label("rec"),
                binop(Sub, temp(0), var("n"), 1),
                call("fact", vec![temp(0).into()], Some(temp(1))),
                binop(Mul, temp(0), var("n"), temp(1)),
                ret(Some(temp(0).into())),
            ],
        )
    }

    #[test]
    fn test_recursive_frames_are_isolated() {
        let program = Program::new(vec![
            Function::new(
                "main",
                &[],
                &[],
                vec![
                    call("fact", vec![Src::Int(5)], Some(temp(0))),
                    call("printInt", vec![temp(0).into()], None),
                    ret(Some(temp(0).into())),
                ],
            ),
            factorial(),
        ]);
        let exec = run(&program);
        assert_eq!(exec.output, vec!["120"]);
        assert_eq!(exec.result, Ok(Value::Int(120)));
    }

    #[test]
    fn test_labels_are_scoped_per_function() {
        let program = Program::new(vec![
            Function::new(
                "main",
                &[],
                &[],
                vec![
                    jump("L"),
                    label("L"),
                    call("helper", vec![], None),
                    call("printStr", vec![string("main")], None),
                ],
            ),
            Function::new(
                "helper",
                &[],
                &[],
                vec![
                    jump("L"),
                    call("printStr", vec![string("skipped")], None),
                    label("L"),
                    call("printStr", vec![string("helper")], None),
                ],
            ),
        ]);
        assert_eq!(run(&program).output, vec!["helper", "main"]);
    }

    #[test]
    fn test_fall_through_returns_undefined() {
        let program = Program::new(vec![
            Function::new(
                "main",
                &[],
                &[],
                vec![
                    call("noop", vec![], Some(temp(0))),
                    call("printInt", vec![temp(0).into()], None),
                    call("noop", vec![], None),
                    call("printStr", vec![string("still here")], None),
                ],
            ),
            Function::new("noop", &[], &[], vec![mov(temp(0), 1)]),
        ]);
        let exec = run(&program);
        assert_eq!(exec.output, vec!["undefined", "still here"]);
        assert_eq!(exec.result, Ok(Value::Undefined));
    }

    #[test]
    fn test_arity_mismatch() {
        let program = Program::new(vec![
            Function::new("main", &[], &[], vec![call("fact", vec![], None)]),
            factorial(),
        ]);
        assert!(matches!(
            fault_kind(&run(&program)),
            FaultKind::ArityMismatch { expected: 1, got: 0, .. }
        ));
    }

    #[test]
    fn test_call_depth_limit() {
        let program = Program::new(vec![Function::new(
            "main",
            &[],
            &[],
            vec![call("main", vec![], None)],
        )]);
        let limits = Limits {
            max_call_depth: 50,
            ..Limits::default()
        };
        let exec = Interpreter::new(&program).with_limits(limits).run();
        assert!(matches!(
            fault_kind(&exec),
            FaultKind::ResourceLimitExceeded(_)
        ));
    }

    #[test]
    fn test_heap_limit() {
        let program = main_only(vec![
            call("malloc", vec![Src::Int(i32::MAX)], Some(temp(0))),
            ret(None),
        ]);
        let exec = Interpreter::new(&program)
            .with_limits(Limits::strict())
            .run();
        assert!(matches!(
            fault_kind(&exec),
            FaultKind::ResourceLimitExceeded(_)
        ));

        // The limit counts every allocation, not just the largest.
        let program = main_only(vec![
            call("malloc", vec![Src::Int(40)], Some(temp(0))),
            call("malloc", vec![Src::Int(40)], Some(temp(1))),
            ret(None),
        ]);
        let limits = Limits {
            max_heap_slots: 64,
            ..Limits::default()
        };
        let exec = Interpreter::new(&program).with_limits(limits).run();
        assert!(matches!(
            fault_kind(&exec),
            FaultKind::ResourceLimitExceeded(_)
        ));
    }

    #[test]
    fn test_step_limit() {
        let program = main_only(vec![label("spin"), jump("spin")]);
        let exec = Interpreter::new(&program)
            .with_limits(Limits::strict())
            .run();
        assert!(matches!(
            fault_kind(&exec),
            FaultKind::ResourceLimitExceeded(_)
        ));
    }

    #[test]
    fn test_missing_main() {
        let exec = run(&Program::default());
        assert_eq!(exec.result, Err(InterpError::MissingMain));
    }
}
