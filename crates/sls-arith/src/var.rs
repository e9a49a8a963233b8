//! Variable table and term-graph definition tables.
//!
//! Everything is arena-and-index: one `Vec` per entity kind, and every
//! inter-entity link is an index. A variable knows which atoms mention it
//! (with which coefficient) and which additive / multiplicative definitions
//! read it, so a value change propagates without pointer chasing.

use sls_core::{BoolVar, TermId};

use crate::num::Num;

/// Index of a numeric variable in the engine's variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    /// Index into variable-keyed arrays.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Sort of a numeric variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSort {
    /// Integer-sorted.
    Int,
    /// Real-sorted.
    Real,
}

/// The arithmetic operator whose output a variable is, when it has a
/// definition. The variant is closed; dispatch is a `match`, not virtual
/// inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Linear sum definition (lives in the add table).
    Add,
    /// Monomial definition (lives in the mul table).
    Mul,
    /// Non-negative modulo.
    Mod,
    /// Remainder with the sign of the dividend.
    Rem,
    /// Truncating integer division.
    Idiv,
    /// Real division.
    Div,
    /// Absolute value.
    Abs,
    /// Real-to-integer coercion.
    ToInt,
    /// Integer-to-real coercion.
    ToReal,
    /// Exponentiation.
    Power,
}

/// One end of a variable's range. Strict integer bounds never appear here:
/// they are tightened to non-strict at insertion (`< v` becomes `≤ v−1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound<N> {
    /// Whether the bound excludes its value (reals only).
    pub strict: bool,
    /// The bound value.
    pub value: N,
}

/// Per-variable record.
#[derive(Debug, Clone)]
pub struct VarInfo<N> {
    /// Handle of the expression this variable stands for.
    pub term: TermId,
    /// Current value.
    pub value: N,
    /// Value under the best candidate model seen so far.
    pub best_value: N,
    /// Sort.
    pub sort: VarSort,
    /// Operator whose output this variable is, if defined.
    pub op: Option<OpKind>,
    /// Index into the add / mul / op table matching `op`.
    pub def_idx: Option<usize>,
    /// Atoms mentioning this variable, with the coefficient it has there.
    pub bool_vars: Vec<(N, BoolVar)>,
    /// Mul definitions this variable feeds.
    pub muls: Vec<usize>,
    /// Add definitions this variable feeds.
    pub adds: Vec<usize>,
    /// Lower bound, if any.
    pub lo: Option<Bound<N>>,
    /// Upper bound, if any.
    pub hi: Option<Bound<N>>,
}

impl<N: Num> VarInfo<N> {
    /// Fresh record for `term` with value 0 and no bounds.
    pub fn new(term: TermId, sort: VarSort) -> Self {
        VarInfo {
            term,
            value: N::zero(),
            best_value: N::zero(),
            sort,
            op: None,
            def_idx: None,
            bool_vars: Vec::new(),
            muls: Vec::new(),
            adds: Vec::new(),
            lo: None,
            hi: None,
        }
    }

    /// Whether both bounds pin the variable to its current value.
    pub fn is_fixed(&self) -> bool {
        match (&self.lo, &self.hi) {
            (Some(lo), Some(hi)) => lo.value == hi.value && lo.value == self.value,
            _ => false,
        }
    }

    /// Whether `value` lies within the bounds.
    pub fn in_bounds(&self, value: &N) -> bool {
        if let Some(lo) = &self.lo {
            if *value < lo.value {
                return false;
            }
            if lo.strict && *value <= lo.value {
                return false;
            }
        }
        if let Some(hi) = &self.hi {
            if *value > hi.value {
                return false;
            }
            if hi.strict && *value >= hi.value {
                return false;
            }
        }
        true
    }
}

/// A linear combination `k + Σ cᵢ·vᵢ`.
#[derive(Debug, Clone)]
pub struct LinearTerm<N> {
    /// Coefficient–variable pairs; coefficients are never zero.
    pub args: Vec<(N, VarId)>,
    /// Constant offset `k`.
    pub coeff: N,
}

impl<N: Num> LinearTerm<N> {
    /// Empty linear term (the constant 0).
    pub fn new() -> Self {
        LinearTerm {
            args: Vec::new(),
            coeff: N::zero(),
        }
    }

    /// Append `c·v`, dropping zero coefficients.
    pub fn push(&mut self, c: N, v: VarId) {
        if !c.is_zero() {
            self.args.push((c, v));
        }
    }
}

/// Definition `value(var) = k + Σ cᵢ·value(vᵢ)`.
#[derive(Debug, Clone)]
pub struct AddDef<N> {
    /// Output variable.
    pub var: VarId,
    /// The sum.
    pub term: LinearTerm<N>,
}

/// Definition `value(var) = k · Π value(vᵢ)`.
#[derive(Debug, Clone)]
pub struct MulDef<N> {
    /// Output variable.
    pub var: VarId,
    /// Constant factor `k`.
    pub coeff: N,
    /// The monomial; repeated entries encode powers.
    pub monomial: Vec<VarId>,
}

/// Definition of a unary or binary operator output.
#[derive(Debug, Clone)]
pub struct OpDef {
    /// Output variable.
    pub var: VarId,
    /// Operator kind.
    pub op: OpKind,
    /// First argument; unary operators repeat it in `arg2`.
    pub arg1: VarId,
    /// Second argument.
    pub arg2: VarId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::Int64;

    fn n(v: i64) -> Int64 {
        Int64::new(v)
    }

    #[test]
    fn bounds_membership() {
        let mut vi: VarInfo<Int64> = VarInfo::new(TermId(0), VarSort::Int);
        assert!(vi.in_bounds(&n(1_000_000)));
        vi.lo = Some(Bound {
            strict: false,
            value: n(0),
        });
        vi.hi = Some(Bound {
            strict: false,
            value: n(10),
        });
        assert!(vi.in_bounds(&n(0)));
        assert!(vi.in_bounds(&n(10)));
        assert!(!vi.in_bounds(&n(-1)));
        assert!(!vi.in_bounds(&n(11)));
    }

    #[test]
    fn strict_bounds_exclude_endpoint() {
        let mut vi: VarInfo<Int64> = VarInfo::new(TermId(0), VarSort::Real);
        vi.lo = Some(Bound {
            strict: true,
            value: n(0),
        });
        assert!(!vi.in_bounds(&n(0)));
        assert!(vi.in_bounds(&n(1)));
    }

    #[test]
    fn fixed_requires_equal_bounds_and_value() {
        let mut vi: VarInfo<Int64> = VarInfo::new(TermId(0), VarSort::Int);
        vi.lo = Some(Bound {
            strict: false,
            value: n(0),
        });
        vi.hi = Some(Bound {
            strict: false,
            value: n(0),
        });
        assert!(vi.is_fixed());
        vi.value = n(1);
        assert!(!vi.is_fixed());
    }

    #[test]
    fn linear_term_drops_zero_coefficients() {
        let mut t: LinearTerm<Int64> = LinearTerm::new();
        t.push(n(0), VarId(0));
        t.push(n(2), VarId(1));
        assert_eq!(t.args.len(), 1);
    }
}
