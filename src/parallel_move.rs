//! Sequentializing register permutations.

use crate::x86::Reg;

/// Orders a set of simultaneous `(dst, src)` register moves so that no source
/// is overwritten before it has been read. Cycles are broken through
/// `scratch`, which must not appear in `moves`. Destinations must be distinct.
pub fn resolve(moves: &[(Reg, Reg)], scratch: Reg) -> Vec<(Reg, Reg)> {
    let mut pending: Vec<(Reg, Reg)> = moves.iter().copied().filter(|(d, s)| d != s).collect();
    let mut out = Vec::with_capacity(pending.len() + 1);

    while !pending.is_empty() {
        // A move is safe once nothing else still needs to read its destination.
        let safe = pending
            .iter()
            .position(|&(dst, _)| !pending.iter().any(|&(_, src)| src == dst));

        match safe {
            Some(i) => out.push(pending.remove(i)),
            None => {
                // Only cycles remain. Park one source in scratch.
                let (dst, src) = pending.remove(0);
                out.push((scratch, src));
                pending.push((dst, scratch));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use Reg::*;

    /// Runs the moves over symbolic register contents.
    fn simulate(seq: &[(Reg, Reg)]) -> HashMap<Reg, Reg> {
        let mut regs: HashMap<Reg, Reg> = HashMap::new();
        for &(dst, src) in seq {
            let value = *regs.get(&src).unwrap_or(&src);
            regs.insert(dst, value);
        }
        regs
    }

    fn check(moves: &[(Reg, Reg)]) {
        let seq = resolve(moves, R10);
        let regs = simulate(&seq);
        for &(dst, src) in moves {
            assert_eq!(regs.get(&dst).copied().unwrap_or(dst), src, "{:?}", seq);
        }
    }

    #[test]
    fn test_independent_moves() {
        check(&[(Rbx, Rdi), (R12, Rsi)]);
    }

    #[test]
    fn test_chain() {
        check(&[(Rsi, Rdi), (Rdx, Rsi), (Rcx, Rdx)]);
    }

    #[test]
    fn test_swap_uses_scratch() {
        let seq = resolve(&[(Rdi, Rsi), (Rsi, Rdi)], R10);
        assert_eq!(seq.len(), 3);
        assert!(seq.iter().any(|&(d, _)| d == R10));
        check(&[(Rdi, Rsi), (Rsi, Rdi)]);
    }

    #[test]
    fn test_rotation_with_fanout() {
        check(&[(Rdi, Rsi), (Rsi, Rdx), (Rdx, Rdi), (Rcx, Rdi), (R8, R8)]);
    }

    #[test]
    fn test_identity_is_empty() {
        assert!(resolve(&[(Rax, Rax)], R10).is_empty());
    }
}
