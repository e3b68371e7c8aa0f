use irforge::ir::build::*;
use irforge::ir::{ArithOp, Function, Program, RelOp, Src};
use irforge::regalloc::{LinearScan, RegisterOracle};
use irforge::{compile_program, Interpreter, Limits};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};

fn programs() -> Vec<PathBuf> {
    let test_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs");
    let mut paths: Vec<PathBuf> = fs::read_dir(&test_dir)
        .unwrap_or_else(|e| panic!("tests/programs not readable at {:?}: {}", test_dir, e))
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty(), "no programs in {:?}", test_dir);
    paths
}

fn load(path: &Path) -> (Program, Vec<String>) {
    let text = fs::read_to_string(path).unwrap();
    let program: Program = serde_json::from_str(&text)
        .unwrap_or_else(|e| panic!("{:?} is not a valid program: {}", path, e));
    let expected = fs::read_to_string(path.with_extension("expected")).unwrap();
    (program, expected.lines().map(str::to_string).collect())
}

fn interpret(path: &Path) -> Result<(), String> {
    let (program, expected) = load(path);
    let run = Interpreter::new(&program).with_limits(Limits::strict()).run();
    run.result.map_err(|e| format!("interpreter error: {}", e))?;
    if run.output != expected {
        return Err(format!("expected {:?}, got {:?}", expected, run.output));
    }
    Ok(())
}

#[test]
fn interpret_all_programs() {
    let mut failures = Vec::new();
    for path in programs() {
        if let Err(e) = interpret(&path) {
            failures.push((path, e));
        }
    }
    if !failures.is_empty() {
        for (path, err) in &failures {
            eprintln!("FAIL {:?}: {}", path, err);
        }
        panic!("{} program(s) failed", failures.len());
    }
}

#[test]
fn all_programs_compile_and_render() {
    for path in programs() {
        let (program, _) = load(&path);
        let asm = compile_program(&program, &LinearScan::new())
            .unwrap_or_else(|e| panic!("{:?}: {}", path, e));
        let text = asm.to_string();
        for func in &program.functions {
            assert!(text.contains(&format!("\t.globl {}\n{}:\n", func.name, func.name)));
        }
    }
}

#[test]
fn seven_arguments_fail_at_generation() {
    // main comes first so the call site is rejected before the callee.
    let program = Program::new(vec![
        Function::new(
            "main",
            &[],
            &[],
            vec![
                call("sink", (1..=7).map(Src::Int).collect(), None),
                ret(None),
            ],
        ),
        Function::new("sink", &["a", "b", "c", "d", "e", "f", "g"], &[], vec![ret(None)]),
    ]);
    let err = compile_program(&program, &LinearScan::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "main: call to sink passes 7 arguments (limit 6)"
    );
    // The interpreter has no such limit.
    assert!(Interpreter::new(&program).run().result.is_ok());
}

#[test]
fn deep_recursion_is_a_resource_failure() {
    let program = Program::new(vec![
        Function::new(
            "down",
            &["n"],
            &[],
            vec![
                cjump(RelOp::Eq, var("n"), 0, "base"),
                binop(ArithOp::Sub, temp(0), var("n"), 1),
                call("down", vec![temp(0).into()], Some(temp(1))),
                ret(Some(Src::Temp(1))),
                label("base"),
                ret(Some(Src::Int(0))),
            ],
        ),
        Function::new(
            "main",
            &[],
            &[],
            vec![call("down", vec![Src::Int(5000)], None), ret(None)],
        ),
    ]);
    let limits = Limits {
        max_call_depth: 100,
        ..Limits::default()
    };
    let run = Interpreter::new(&program).with_limits(limits).run();
    let err = run.result.unwrap_err();
    assert!(err.to_string().starts_with("resource limit exceeded"));
    assert!(Interpreter::new(&program).run().result.is_ok());
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod native {
    use super::*;
    use irforge::jit::run_native;
    use pretty_assertions::assert_eq;

    fn agree(path: &Path, oracle: &dyn RegisterOracle) -> Result<(), String> {
        let (program, expected) = load(path);
        let asm = compile_program(&program, oracle).map_err(|e| format!("codegen error: {}", e))?;
        let run = run_native(&asm).map_err(|e| format!("jit error: {}", e))?;
        if run.output != expected {
            return Err(format!("expected {:?}, got {:?}", expected, run.output));
        }
        Ok(())
    }

    #[test]
    fn native_matches_expected_output() {
        let mut failures = Vec::new();
        for path in programs() {
            if let Err(e) = agree(&path, &LinearScan::new()) {
                failures.push((path, e));
            }
        }
        if !failures.is_empty() {
            for (path, err) in &failures {
                eprintln!("FAIL {:?}: {}", path, err);
            }
            panic!("{} program(s) failed", failures.len());
        }
    }

    #[test]
    fn agreement_holds_for_shuffled_assignments() {
        for path in programs() {
            let (program, _) = load(&path);
            let interpreted = Interpreter::new(&program).run();
            for seed in 0..24 {
                let asm = compile_program(&program, &LinearScan::seeded(seed)).unwrap();
                let native = run_native(&asm).unwrap();
                assert_eq!(
                    interpreted.output, native.output,
                    "{:?} with seed {}",
                    path, seed
                );
            }
        }
    }

    #[test]
    fn permuted_parameters_survive_the_prologue() {
        // Parameters assigned to each other's argument registers.
        let program = Program::new(vec![
            Function::new(
                "diff",
                &["a", "b", "c"],
                &[],
                vec![
                    binop(ArithOp::Sub, temp(0), var("a"), var("b")),
                    binop(ArithOp::Mul, temp(1), temp(0), var("c")),
                    ret(Some(Src::Temp(1))),
                ],
            ),
            Function::new(
                "main",
                &[],
                &[],
                vec![
                    call("diff", vec![Src::Int(10), Src::Int(3), Src::Int(2)], Some(temp(0))),
                    call("printInt", vec![temp(0).into()], None),
                    ret(None),
                ],
            ),
        ]);
        struct Rotated;
        impl RegisterOracle for Rotated {
            fn assign(
                &self,
                func: &Function,
            ) -> Result<irforge::Assignment, irforge::error::AllocError> {
                use irforge::x86::Reg;
                let base = LinearScan::new().assign(func)?;
                if func.name != "diff" {
                    return Ok(base);
                }
                Ok(base
                    .iter()
                    .map(|(d, r)| {
                        let r = match d.to_string().as_str() {
                            "a" => Some(Reg::Rsi),
                            "b" => Some(Reg::Rdx),
                            "c" => Some(Reg::Rdi),
                            _ => r.map(|_| Reg::Rax),
                        };
                        (d.clone(), r)
                    })
                    .collect())
            }
        }
        let asm = compile_program(&program, &Rotated).unwrap();
        let run = run_native(&asm).unwrap();
        assert_eq!(run.output, vec!["14".to_string()]);
    }

    fn agree_for_seeds(program: &Program) {
        let interpreted = Interpreter::new(program).run();
        assert!(interpreted.result.is_ok());
        for seed in 0..24 {
            let asm = compile_program(program, &LinearScan::seeded(seed)).unwrap();
            let native = run_native(&asm).unwrap();
            assert_eq!(interpreted.output, native.output, "seed {}", seed);
        }
    }

    #[test]
    fn parameter_overwritten_before_use_keeps_its_neighbour() {
        let program = Program::new(vec![
            Function::new(
                "f",
                &["a", "b"],
                &[],
                vec![
                    call("printInt", vec![var("a").into()], None),
                    mov(var("b"), 7),
                    call("printInt", vec![var("b").into()], None),
                    ret(None),
                ],
            ),
            Function::new(
                "main",
                &[],
                &[],
                vec![
                    call("f", vec![Src::Int(1), Src::Int(2)], None),
                    ret(None),
                ],
            ),
        ]);
        agree_for_seeds(&program);
    }

    #[test]
    fn similar_label_names_in_different_functions() {
        let jumper = |body: &str| {
            vec![
                jump(body),
                call("printInt", vec![Src::Int(0)], None),
                label(body),
            ]
        };
        let mut a = jumper("b_c");
        a.extend([call("printInt", vec![Src::Int(1)], None), ret(None)]);
        let mut a_b = jumper("c");
        a_b.extend([call("printInt", vec![Src::Int(2)], None), ret(None)]);
        let program = Program::new(vec![
            Function::new(
                "main",
                &[],
                &[],
                vec![
                    call("a", vec![], None),
                    call("a_b", vec![], None),
                    ret(None),
                ],
            ),
            Function::new("a", &[], &[], a),
            Function::new("a_b", &[], &[], a_b),
        ]);
        let run = Interpreter::new(&program).run();
        assert_eq!(run.output, vec!["1".to_string(), "2".to_string()]);
        agree_for_seeds(&program);
    }
}
