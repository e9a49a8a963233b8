//! Linear arithmetic atoms and their distance to truth.
//!
//! An atom is a Boolean-variable-indexed predicate `Σ cᵢ·vᵢ + k ⟨⋈⟩ 0`
//! with `⋈ ∈ {≤, <, =}`. The sum over the current variable values is cached
//! in `args_value` and kept consistent by the engine's single mutation
//! point, so truth and distance queries never walk the variable table.

use std::fmt;

use crate::num::Num;
use crate::var::{LinearTerm, VarId};

/// Relation of an atom against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneqKind {
    /// `Σ cᵢ·vᵢ + k ≤ 0`
    Le,
    /// `Σ cᵢ·vᵢ + k < 0`
    Lt,
    /// `Σ cᵢ·vᵢ + k = 0`
    Eq,
}

/// A linear inequality or equality atom.
#[derive(Debug, Clone)]
pub struct Ineq<N> {
    /// Left-hand side `Σ cᵢ·vᵢ` plus the constant `k` in `term.coeff`.
    pub term: LinearTerm<N>,
    /// The relation.
    pub op: IneqKind,
    /// Cached `Σ cᵢ·value(vᵢ)`.
    pub args_value: N,
    /// Pivot selected by the reward routine, consumed by repair.
    pub var_to_flip: Option<VarId>,
}

impl<N: Num> Ineq<N> {
    /// New atom `⟨⋈⟩` with constant `k`; arguments are filled in afterwards.
    pub fn new(op: IneqKind, k: N) -> Self {
        Ineq {
            term: LinearTerm {
                args: Vec::new(),
                coeff: k,
            },
            op,
            args_value: N::zero(),
            var_to_flip: None,
        }
    }

    /// Coefficient of `v` in this atom, if it occurs.
    pub fn coeff_of(&self, v: VarId) -> Option<&N> {
        self.term
            .args
            .iter()
            .find(|(_, w)| *w == v)
            .map(|(c, _)| c)
    }

    /// Truth under the cached `args_value`.
    pub fn is_true(&self) -> bool {
        let lhs = self.args_value.clone() + self.term.coeff.clone();
        match self.op {
            IneqKind::Le => lhs <= N::zero(),
            IneqKind::Lt => lhs < N::zero(),
            IneqKind::Eq => lhs.is_zero(),
        }
    }

    /// Distance to truth at an arbitrary argument value.
    ///
    /// With `sign = false` the caller wants the atom true; with
    /// `sign = true` the caller wants it false. Zero means the wish already
    /// holds at `args`.
    pub fn dtt_at(&self, sign: bool, args: &N) -> N {
        let k = &self.term.coeff;
        let lhs = args.clone() + k.clone();
        match self.op {
            IneqKind::Le => {
                if sign {
                    if lhs <= N::zero() {
                        -k.clone() - args.clone() + N::one()
                    } else {
                        N::zero()
                    }
                } else if lhs <= N::zero() {
                    N::zero()
                } else {
                    lhs
                }
            }
            IneqKind::Eq => {
                if sign {
                    if lhs.is_zero() {
                        N::one()
                    } else {
                        N::zero()
                    }
                } else if lhs.is_zero() {
                    N::zero()
                } else {
                    N::one()
                }
            }
            IneqKind::Lt => {
                if sign {
                    if lhs < N::zero() {
                        -k.clone() - args.clone()
                    } else {
                        N::zero()
                    }
                } else if lhs < N::zero() {
                    N::zero()
                } else {
                    lhs + N::one()
                }
            }
        }
    }

    /// Distance to truth under the cached argument value.
    pub fn dtt(&self, sign: bool) -> N {
        self.dtt_at(sign, &self.args_value)
    }

    /// Distance to truth if a variable with coefficient `coeff` moved from
    /// `old_value` to `new_value`.
    pub fn dtt_shifted(&self, sign: bool, coeff: &N, old_value: &N, new_value: &N) -> N {
        let shifted =
            self.args_value.clone() + coeff.clone() * (new_value.clone() - old_value.clone());
        self.dtt_at(sign, &shifted)
    }
}

impl<N: Num> fmt::Display for Ineq<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (c, v) in &self.term.args {
            write!(f, "{}{c} * {v}", if first { "" } else { " + " })?;
            first = false;
        }
        if !self.term.coeff.is_zero() {
            write!(f, " + {}", self.term.coeff)?;
        }
        let rel = match self.op {
            IneqKind::Le => "<=",
            IneqKind::Lt => "<",
            IneqKind::Eq => "==",
        };
        write!(
            f,
            " {rel} 0 ({})",
            self.args_value.clone() + self.term.coeff.clone()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::Int64;

    fn n(v: i64) -> Int64 {
        Int64::new(v)
    }

    fn atom(op: IneqKind, k: i64, args_value: i64) -> Ineq<Int64> {
        let mut a = Ineq::new(op, n(k));
        a.term.push(n(1), VarId(0));
        a.args_value = n(args_value);
        a
    }

    #[test]
    fn le_distance() {
        // x - 3 <= 0 at x = 5: want-true distance is 2
        let a = atom(IneqKind::Le, -3, 5);
        assert!(!a.is_true());
        assert_eq!(a.dtt(false), n(2));
        assert_eq!(a.dtt(true), n(0));
        // at x = 1 it holds; want-false distance is 3 (need x > 3)
        let a = atom(IneqKind::Le, -3, 1);
        assert!(a.is_true());
        assert_eq!(a.dtt(false), n(0));
        assert_eq!(a.dtt(true), n(3));
    }

    #[test]
    fn lt_distance() {
        // x < 0 at x = 0: one step short of true
        let a = atom(IneqKind::Lt, 0, 0);
        assert!(!a.is_true());
        assert_eq!(a.dtt(false), n(1));
        assert_eq!(a.dtt(true), n(0));
        // x < 0 at x = -2: want-false distance is 2
        let a = atom(IneqKind::Lt, 0, -2);
        assert!(a.is_true());
        assert_eq!(a.dtt(true), n(2));
    }

    #[test]
    fn eq_distance_is_unit() {
        let a = atom(IneqKind::Eq, -7, 7);
        assert!(a.is_true());
        assert_eq!(a.dtt(false), n(0));
        assert_eq!(a.dtt(true), n(1));
        let a = atom(IneqKind::Eq, -7, 3);
        assert!(!a.is_true());
        assert_eq!(a.dtt(false), n(1));
        assert_eq!(a.dtt(true), n(0));
    }

    #[test]
    fn shifted_distance_matches_reevaluation() {
        // 2x - 10 <= 0 at x = 7 (args_value = 14)
        let mut a = Ineq::new(IneqKind::Le, n(-10));
        a.term.push(n(2), VarId(0));
        a.args_value = n(14);
        // moving x from 7 to 4 gives args_value 8, lhs -2: satisfied
        assert_eq!(a.dtt_shifted(false, &n(2), &n(7), &n(4)), n(0));
        // moving x from 7 to 6 gives lhs 2
        assert_eq!(a.dtt_shifted(false, &n(2), &n(7), &n(6)), n(2));
    }
}
