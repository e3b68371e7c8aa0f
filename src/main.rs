use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use irforge::interp::{Interpreter, StdoutConsole};
use irforge::regalloc::{LinearScan, RegisterOracle};
use irforge::{compile_program, Limits, Program};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Maximum number of active call frames
    #[arg(long, global = true)]
    max_call_depth: Option<usize>,

    /// Maximum number of executed instructions
    #[arg(long, global = true)]
    max_steps: Option<u64>,

    /// Maximum number of heap slots the interpreter may allocate
    #[arg(long, global = true)]
    max_heap_slots: Option<usize>,

    /// Shuffle register preference with this seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interpret a JSON program, streaming its output
    Run { program: PathBuf },
    /// Print AT&T assembly for a JSON program
    Asm { program: PathBuf },
    /// Compile and execute a JSON program natively
    Jit { program: PathBuf },
    /// Run both the interpreter and native code and compare their output
    Check { program: PathBuf },
}

impl Args {
    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        if let Some(depth) = self.max_call_depth {
            limits.max_call_depth = depth;
        }
        if self.max_steps.is_some() {
            limits.max_steps = self.max_steps;
        }
        if let Some(slots) = self.max_heap_slots {
            limits.max_heap_slots = slots;
        }
        limits
    }

    fn oracle(&self) -> LinearScan {
        match self.seed {
            Some(seed) => LinearScan::seeded(seed),
            None => LinearScan::new(),
        }
    }
}

fn load(path: &Path) -> irforge::Result<Program> {
    let text = fs::read_to_string(path)?;
    let program = serde_json::from_str(&text)?;
    info!("loaded {}", path.display());
    Ok(program)
}

fn run(args: &Args, path: &Path) -> irforge::Result<ExitCode> {
    let program = load(path)?;
    let value = Interpreter::new(&program)
        .with_limits(args.limits())
        .run_with(&mut StdoutConsole)?;
    info!("main returned {}", value);
    Ok(ExitCode::SUCCESS)
}

fn asm(path: &Path, oracle: &dyn RegisterOracle) -> irforge::Result<ExitCode> {
    let program = load(path)?;
    let asm = compile_program(&program, oracle)?;
    print!("{}", asm);
    Ok(ExitCode::SUCCESS)
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
fn jit(path: &Path, oracle: &dyn RegisterOracle) -> irforge::Result<ExitCode> {
    let program = load(path)?;
    let asm = compile_program(&program, oracle)?;
    let run = irforge::jit::run_native(&asm)?;
    for line in &run.output {
        println!("{}", line);
    }
    info!("main returned {}", run.exit);
    Ok(ExitCode::SUCCESS)
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
fn check(args: &Args, path: &Path, oracle: &dyn RegisterOracle) -> irforge::Result<ExitCode> {
    let program = load(path)?;
    let interpreted = Interpreter::new(&program).with_limits(args.limits()).run();
    if let Err(err) = &interpreted.result {
        println!("interpreter failed, nothing to compare: {}", err);
        return Ok(ExitCode::FAILURE);
    }
    let asm = compile_program(&program, oracle)?;
    let native = irforge::jit::run_native(&asm)?;

    if interpreted.output == native.output {
        println!("agree: {} line(s)", native.output.len());
        return Ok(ExitCode::SUCCESS);
    }
    let first = interpreted
        .output
        .iter()
        .zip(&native.output)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| interpreted.output.len().min(native.output.len()));
    println!("disagree at line {}", first + 1);
    println!("  interpreter: {:?}", interpreted.output.get(first));
    println!("  native:      {:?}", native.output.get(first));
    Ok(ExitCode::FAILURE)
}

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
fn jit(_path: &Path, _oracle: &dyn RegisterOracle) -> irforge::Result<ExitCode> {
    error!("native execution needs x86-64 Linux");
    Ok(ExitCode::FAILURE)
}

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
fn check(_args: &Args, path: &Path, oracle: &dyn RegisterOracle) -> irforge::Result<ExitCode> {
    jit(path, oracle)
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let oracle = args.oracle();
    let outcome = match &args.command {
        Command::Run { program } => run(&args, program),
        Command::Asm { program } => asm(program, &oracle),
        Command::Jit { program } => jit(program, &oracle),
        Command::Check { program } => check(&args, program, &oracle),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
