//! Register assignment.
//!
//! Code generation consumes an [`Assignment`] produced by any
//! [`RegisterOracle`]. [`LinearScan`] is the reference oracle: linear scan over
//! live intervals, no spilling.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::error::AllocError;
use crate::ir::{ArithOp, BinOp, Dest, Function, Inst};
use crate::liveness::{intervals, Interval, Liveness};
use crate::x86::{Reg, ARG_REGS};

/// Decides which register, if any, holds each destination of a function.
pub trait RegisterOracle {
    fn assign(&self, func: &Function) -> Result<Assignment, AllocError>;
}

/// Total map from a function's destinations to a register, or `None` when the
/// destination is dead. Never modified once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    map: BTreeMap<Dest, Option<Reg>>,
}

impl Assignment {
    pub fn reg(&self, dest: &Dest) -> Option<Reg> {
        self.map.get(dest).copied().flatten()
    }

    pub fn is_assigned(&self, dest: &Dest) -> bool {
        self.reg(dest).is_some()
    }

    /// Every register some destination lives in.
    pub fn registers(&self) -> BTreeSet<Reg> {
        self.map.values().flatten().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dest, Option<Reg>)> {
        self.map.iter().map(|(d, r)| (d, *r))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(Dest, Option<Reg>)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (Dest, Option<Reg>)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (dest, reg) in &self.map {
            match reg {
                Some(r) => writeln!(f, "{}\t{}", dest, r)?,
                None => writeln!(f, "{}\t-", dest)?,
            }
        }
        Ok(())
    }
}

/// Registers the allocator may hand out. `r10`/`r11` belong to the code
/// generator and `rsp`/`rbp` to the frame.
pub const ALLOCATABLE: [Reg; 12] = [
    Reg::Rcx,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R8,
    Reg::R9,
    Reg::Rdx,
    Reg::Rax,
    Reg::Rbx,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

/// Every destination mentioned anywhere in `func`, parameters and locals included.
fn all_dests(func: &Function) -> BTreeSet<Dest> {
    let mut dests: BTreeSet<Dest> = func
        .params
        .iter()
        .chain(&func.locals)
        .map(|name| Dest::Var(name.clone()))
        .collect();
    for inst in &func.code {
        dests.extend(inst.def().cloned());
        dests.extend(inst.uses());
    }
    dests
}

/// Preferred registers: arguments arrive in their convention registers and
/// division wants its dividend and quotient in rax.
fn hints(func: &Function) -> BTreeMap<Dest, Reg> {
    let mut hints = BTreeMap::new();
    for (param, &reg) in func.params.iter().zip(ARG_REGS.iter()) {
        hints.insert(Dest::Var(param.clone()), reg);
    }
    for inst in &func.code {
        if let Inst::Binop {
            op: BinOp::Arith(ArithOp::Div),
            dst,
            src1,
            ..
        } = inst
        {
            hints.insert(dst.clone(), Reg::Rax);
            if let Some(d) = src1.as_dest() {
                hints.insert(d, Reg::Rax);
            }
        }
    }
    hints
}

fn permitted(iv: &Interval, reg: Reg) -> bool {
    !(iv.crosses_call && !reg.is_callee_saved()) && !(iv.crosses_div && reg.is_division_clobbered())
}

/// Linear-scan register assignment without spilling.
#[derive(Debug, Clone)]
pub struct LinearScan {
    pool: Vec<Reg>,
    use_hints: bool,
}

impl Default for LinearScan {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearScan {
    pub fn new() -> Self {
        Self {
            pool: ALLOCATABLE.to_vec(),
            use_hints: true,
        }
    }

    /// Shuffled preference order and no hints: a different, equally legal
    /// assignment for each seed.
    pub fn seeded(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pool = ALLOCATABLE.to_vec();
        pool.shuffle(&mut rng);
        Self {
            pool,
            use_hints: false,
        }
    }

    pub fn pool(&self) -> &[Reg] {
        &self.pool
    }
}

impl RegisterOracle for LinearScan {
    fn assign(&self, func: &Function) -> Result<Assignment, AllocError> {
        let live = Liveness::analyze(func);
        let ivs = intervals(func, &live);
        let hints = if self.use_hints {
            hints(func)
        } else {
            BTreeMap::new()
        };

        let mut map: BTreeMap<Dest, Option<Reg>> =
            all_dests(func).into_iter().map(|d| (d, None)).collect();
        let mut active: Vec<(usize, Reg)> = Vec::new();

        for iv in &ivs {
            // Intervals that ended strictly before this one starts free their register.
            active.retain(|&(end, _)| end >= iv.start);

            let free = |reg: Reg| permitted(iv, reg) && !active.iter().any(|&(_, r)| r == reg);
            let choice = hints
                .get(&iv.dest)
                .copied()
                .filter(|&r| free(r))
                .or_else(|| self.pool.iter().copied().find(|&r| free(r)));

            match choice {
                Some(reg) => {
                    trace!(dest = %iv.dest, reg = %reg, start = iv.start, end = iv.end, "assigned");
                    active.push((iv.end, reg));
                    map.insert(iv.dest.clone(), Some(reg));
                }
                None => {
                    return Err(AllocError::OutOfRegisters {
                        function: func.name.clone(),
                        dest: iv.dest.clone(),
                    })
                }
            }
        }

        debug!(
            "assigned {} of {} destinations in {}",
            map.values().filter(|r| r.is_some()).count(),
            map.len(),
            func.name
        );
        Ok(Assignment { map })
    }
}
