//! Instruction-level liveness and live intervals.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ir::{ArithOp, BinOp, Dest, Function, Inst};

/// Live-in and live-out sets for every instruction of a function.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    pub live_in: Vec<BTreeSet<Dest>>,
    pub live_out: Vec<BTreeSet<Dest>>,
}

/// Control-flow successors of instruction `idx`.
///
/// A jump to an undeclared label has no successor here; the interpreter
/// faults on it and the assembler refuses it.
fn successors(func: &Function, labels: &HashMap<String, usize>, idx: usize) -> Vec<usize> {
    let next = idx + 1;
    let fall = (next < func.code.len()).then_some(next);
    match &func.code[idx] {
        Inst::Return(_) => vec![],
        Inst::Jump(label) => labels.get(label).copied().into_iter().collect(),
        Inst::CJump { label, .. } => labels
            .get(label)
            .copied()
            .into_iter()
            .chain(fall)
            .collect(),
        _ => fall.into_iter().collect(),
    }
}

impl Liveness {
    pub fn analyze(func: &Function) -> Self {
        let n = func.code.len();
        let labels = func.label_table();
        let succs: Vec<Vec<usize>> = (0..n).map(|i| successors(func, &labels, i)).collect();
        let uses: Vec<Vec<Dest>> = func.code.iter().map(Inst::uses).collect();

        let mut live = Liveness {
            live_in: vec![BTreeSet::new(); n],
            live_out: vec![BTreeSet::new(); n],
        };

        let mut changed = true;
        while changed {
            changed = false;
            for i in (0..n).rev() {
                let mut out = BTreeSet::new();
                for &s in &succs[i] {
                    out.extend(live.live_in[s].iter().cloned());
                }
                let mut inn = out.clone();
                if let Some(d) = func.code[i].def() {
                    inn.remove(d);
                }
                inn.extend(uses[i].iter().cloned());

                if out != live.live_out[i] || inn != live.live_in[i] {
                    live.live_out[i] = out;
                    live.live_in[i] = inn;
                    changed = true;
                }
            }
        }
        live
    }

    /// Values that survive instruction `idx` without being redefined by it.
    pub fn live_across<'a>(
        &'a self,
        func: &'a Function,
        idx: usize,
    ) -> impl Iterator<Item = &'a Dest> + 'a {
        let def = func.code[idx].def();
        self.live_out[idx].iter().filter(move |d| Some(*d) != def)
    }

    pub fn live_at_entry(&self) -> Option<&BTreeSet<Dest>> {
        self.live_in.first()
    }
}

/// Live range of one destination, in program points.
///
/// Point 0 is function entry; instruction `i` reads at `2i + 1` and writes
/// at `2i + 2`. Two intervals conflict when they share a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub dest: Dest,
    pub start: usize,
    pub end: usize,
    /// Live across some call, so caller-saved registers are off limits.
    pub crosses_call: bool,
    /// Live across some division, so rax/rdx are off limits.
    pub crosses_div: bool,
}

fn read_point(idx: usize) -> usize {
    2 * idx + 1
}

fn write_point(idx: usize) -> usize {
    2 * idx + 2
}

fn is_div(inst: &Inst) -> bool {
    matches!(
        inst,
        Inst::Binop {
            op: BinOp::Arith(ArithOp::Div),
            ..
        }
    )
}

fn touch(ranges: &mut BTreeMap<Dest, Interval>, d: &Dest, point: usize) {
    ranges
        .entry(d.clone())
        .and_modify(|iv| {
            iv.start = iv.start.min(point);
            iv.end = iv.end.max(point);
        })
        .or_insert_with(|| Interval {
            dest: d.clone(),
            start: point,
            end: point,
            crosses_call: false,
            crosses_div: false,
        });
}

/// Builds intervals for every destination that is live somewhere, sorted by start.
pub fn intervals(func: &Function, live: &Liveness) -> Vec<Interval> {
    let mut ranges: BTreeMap<Dest, Interval> = BTreeMap::new();

    if let Some(entry) = live.live_at_entry() {
        for d in entry {
            touch(&mut ranges, d, 0);
        }
    }
    for i in 0..func.code.len() {
        for d in &live.live_in[i] {
            touch(&mut ranges, d, read_point(i));
        }
        for d in &live.live_out[i] {
            touch(&mut ranges, d, write_point(i));
        }
    }
    // Dead stores to otherwise live values still occupy their register.
    for (i, inst) in func.code.iter().enumerate() {
        if let Some(d) = inst.def() {
            if ranges.contains_key(d) {
                touch(&mut ranges, d, write_point(i));
            }
        }
    }

    for (i, inst) in func.code.iter().enumerate() {
        let call = matches!(inst, Inst::Call { .. });
        let div = is_div(inst);
        if !call && !div {
            continue;
        }
        for d in live.live_across(func, i) {
            if let Some(iv) = ranges.get_mut(d) {
                iv.crosses_call |= call;
                iv.crosses_div |= div;
            }
        }
    }

    let mut out: Vec<Interval> = ranges.into_values().collect();
    out.sort_by(|a, b| (a.start, a.end).cmp(&(b.start, b.end)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;
    use crate::ir::{ArithOp, RelOp, Src};

    fn set(ds: &[Dest]) -> BTreeSet<Dest> {
        ds.iter().cloned().collect()
    }

    #[test]
    fn test_straight_line() {
        let f = Function::new(
            "main",
            &[],
            &[],
            vec![
                mov(temp(0), 1),
                binop(ArithOp::Add, temp(1), temp(0), 2),
                call("printInt", vec![temp(1).into()], None),
                ret(None),
            ],
        );
        let live = Liveness::analyze(&f);
        assert!(live.live_in[0].is_empty());
        assert_eq!(live.live_out[0], set(&[temp(0)]));
        assert_eq!(live.live_in[2], set(&[temp(1)]));
        assert!(live.live_out[2].is_empty());
    }

    #[test]
    fn test_loop_keeps_counter_live() {
        let f = Function::new(
            "count",
            &["n"],
            &["i"],
            vec![
                mov(var("i"), 0),
                label("top"),
                cjump(RelOp::Ge, var("i"), var("n"), "done"),
                binop(ArithOp::Add, var("i"), var("i"), 1),
                jump("top"),
                label("done"),
                ret(Some(var("i").into())),
            ],
        );
        let live = Liveness::analyze(&f);
        assert_eq!(live.live_in[0], set(&[var("n")]));
        assert_eq!(live.live_out[4], set(&[var("i"), var("n")]));
        assert_eq!(live.live_in[5], set(&[var("i")]));
    }

    #[test]
    fn test_dead_def_has_no_interval() {
        let f = Function::new(
            "main",
            &[],
            &[],
            vec![mov(temp(0), 1), mov(temp(1), 2), ret(Some(Src::Temp(1)))],
        );
        let ivs = intervals(&f, &Liveness::analyze(&f));
        assert_eq!(ivs.len(), 1);
        assert_eq!(ivs[0].dest, temp(1));
        assert_eq!((ivs[0].start, ivs[0].end), (4, 5));
    }

    #[test]
    fn test_crossing_flags() {
        let f = Function::new(
            "main",
            &[],
            &[],
            vec![
                mov(temp(0), 10),
                mov(temp(1), 3),
                call("printInt", vec![temp(1).into()], None),
                binop(ArithOp::Div, temp(2), temp(1), temp(1)),
                binop(ArithOp::Add, temp(3), temp(0), temp(2)),
                ret(Some(Src::Temp(3))),
            ],
        );
        let ivs = intervals(&f, &Liveness::analyze(&f));
        let get = |d: Dest| ivs.iter().find(|iv| iv.dest == d).cloned();
        let t0 = get(temp(0)).unwrap();
        assert!(t0.crosses_call && t0.crosses_div);
        let t1 = get(temp(1)).unwrap();
        assert!(t1.crosses_call);
        assert!(!t1.crosses_div);
        let t2 = get(temp(2)).unwrap();
        assert!(!t2.crosses_call && !t2.crosses_div);
    }
}
