//! Controller interface for the SLS arithmetic repair engine.
//!
//! A local-search theory plugin does not own the Boolean search: an external
//! controller drives the loop, owns the clause database and the literal truth
//! table, and owns the expression AST. This crate defines the seam between
//! the two sides:
//!
//! - [`Context`]: everything the controller provides to a plugin - literal
//!   truth values, clause iteration, use lists, clause weights, Boolean
//!   flips, the random source, and a structural view of expressions.
//! - [`Plugin`]: everything a plugin exposes to the controller - term
//!   registration, value get/set, literal propagation and repair, and the
//!   reward used to rank candidate flips.
//!
//! Expressions stay controller-owned. The plugin sees them only as opaque
//! [`TermId`] handles plus the closed [`TermView`] shape returned by
//! [`Context::view`], so no AST types cross the boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]

use num_rational::BigRational;
use thiserror::Error;

/// Opaque handle into the controller's expression AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub u32);

/// A Boolean variable owned by the controller's SAT search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(pub u32);

/// Index of a clause in the controller's clause database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClauseIdx(pub u32);

/// A literal (Boolean variable with polarity).
///
/// Encoded as `2·var` for the positive literal and `2·var + 1` for the
/// negative one, so a literal indexes use-list arrays directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal(pub u32);

impl Literal {
    /// Create a literal from a variable and a sign (`true` = negated).
    #[inline]
    pub fn new(var: BoolVar, sign: bool) -> Self {
        Literal((var.0 << 1) | u32::from(sign))
    }

    /// Create the positive literal of `var`.
    #[inline]
    pub fn positive(var: BoolVar) -> Self {
        Literal(var.0 << 1)
    }

    /// Create the negative literal of `var`.
    #[inline]
    pub fn negative(var: BoolVar) -> Self {
        Literal((var.0 << 1) | 1)
    }

    /// The underlying Boolean variable.
    #[inline]
    pub fn var(self) -> BoolVar {
        BoolVar(self.0 >> 1)
    }

    /// Whether this literal is negated.
    #[inline]
    pub fn sign(self) -> bool {
        (self.0 & 1) == 1
    }

    /// The negation of this literal.
    #[inline]
    pub fn negated(self) -> Self {
        Literal(self.0 ^ 1)
    }

    /// Index for use-list arrays (the inverse of [`Literal::from_index`]).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Create a literal from its array index.
    #[inline]
    pub fn from_index(idx: usize) -> Self {
        Literal(idx as u32)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.sign() {
            write!(f, "-b{}", self.var().0)
        } else {
            write!(f, "b{}", self.var().0)
        }
    }
}

/// Sort of an arithmetic term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    /// Mathematical integers.
    Int,
    /// Mathematical reals.
    Real,
}

/// Structural view of a controller-owned expression.
///
/// This is the plugin-facing rendering of the controller's AST predicates:
/// one closed variant instead of an `is_add`/`is_mul`/… family. Comparison
/// shapes carry their argument order as written (`Ge(x, y)` is `x ≥ y`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermView {
    /// A numeral constant, exact.
    Numeral(BigRational),
    /// N-ary addition.
    Add(Vec<TermId>),
    /// Binary subtraction.
    Sub(TermId, TermId),
    /// N-ary multiplication.
    Mul(Vec<TermId>),
    /// Unary minus.
    Neg(TermId),
    /// Integer modulo (non-negative remainder).
    Mod(TermId, TermId),
    /// Integer division (truncating).
    Idiv(TermId, TermId),
    /// Real division.
    Div(TermId, TermId),
    /// Integer remainder (sign of the dividend).
    Rem(TermId, TermId),
    /// Exponentiation.
    Power(TermId, TermId),
    /// Absolute value.
    Abs(TermId),
    /// Real-to-integer coercion (floor).
    ToInt(TermId),
    /// Integer-to-real coercion.
    ToReal(TermId),
    /// `x ≤ y`.
    Le(TermId, TermId),
    /// `x < y`.
    Lt(TermId, TermId),
    /// `x ≥ y`.
    Ge(TermId, TermId),
    /// `x > y`.
    Gt(TermId, TermId),
    /// Equality.
    Eq(TermId, TermId),
    /// An uninterpreted application; arguments are visible so registration
    /// can walk into arithmetic subterms.
    App(Vec<TermId>),
    /// An uninterpreted constant.
    Var,
}

/// Raised when a value does not fit the bounded 64-bit numeric mode.
///
/// The exact-rational mode never produces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value exceeds 64-bit numeric range")]
pub struct OverflowError;

/// Capabilities the controller provides to a plugin.
///
/// The plugin never stores a reference to the controller; every entry point
/// receives it as an argument, so the two sides mutate freely without
/// aliasing each other's state.
pub trait Context {
    /// Number of Boolean variables in the controller's search.
    fn num_bool_vars(&self) -> u32;

    /// The expression a Boolean variable stands for, if any.
    fn atom_term(&self, bv: BoolVar) -> Option<TermId>;

    /// The Boolean variable allocated for an expression, if any.
    fn bool_var_of(&self, t: TermId) -> Option<BoolVar>;

    /// Truth of a literal under the controller's current assignment.
    fn is_true(&self, lit: Literal) -> bool;

    /// Flip the truth value of a Boolean variable.
    fn flip(&mut self, bv: BoolVar);

    /// Whether the literal occurs in a unit clause.
    fn is_unit(&self, lit: Literal) -> bool;

    /// Literals asserted by unit clauses.
    fn unit_literals(&self) -> Vec<Literal>;

    /// Number of clauses in the database.
    fn num_clauses(&self) -> u32;

    /// The literals of a clause.
    fn clause(&self, cl: ClauseIdx) -> &[Literal];

    /// How many literals of the clause are currently true.
    fn clause_num_true(&self, cl: ClauseIdx) -> u32;

    /// Dynamic weight of a clause.
    fn clause_weight(&self, cl: ClauseIdx) -> u64;

    /// Clauses containing the literal.
    fn use_list(&self, lit: Literal) -> &[ClauseIdx];

    /// Literal for an expression, allocating a Boolean variable on demand.
    /// Exists for plugins that learn clauses; the arithmetic core only
    /// reads the Boolean state.
    fn mk_literal(&mut self, t: TermId) -> Literal;

    /// Append a clause to the controller's database.
    fn add_clause(&mut self, lits: &[Literal]);

    /// Uniform random `u32`.
    fn rand_u32(&mut self) -> u32;

    /// Uniform random value in `0..n` (`n > 0`).
    fn rand_below(&mut self, n: u32) -> u32;

    /// Notification that the plugin changed the value of a term.
    fn new_value_eh(&mut self, t: TermId);

    /// Structural view of an expression.
    fn view(&self, t: TermId) -> TermView;

    /// Sort of an expression, or `None` for non-arithmetic terms.
    fn sort_of(&self, t: TermId) -> Option<Sort>;
}

/// Operations a theory plugin exposes to the controller.
///
/// All operations are synchronous and run to completion. Registration and
/// value exchange are fallible only in the bounded numeric mode (values that
/// do not fit 64 bits); repair operations signal failure through their
/// return value, never through an error.
pub trait Plugin<C: Context> {
    /// Register an expression with the plugin, creating variables and
    /// definitions for its arithmetic subterms.
    fn register_term(&mut self, ctx: &mut C, t: TermId) -> Result<(), OverflowError>;

    /// Initialize after registration: harvest bounds from unit literals.
    fn initialize(&mut self, ctx: &mut C) -> Result<(), OverflowError>;

    /// Force the value of a term, registering it on demand.
    fn set_value(&mut self, ctx: &mut C, t: TermId, value: &BigRational)
        -> Result<(), OverflowError>;

    /// Current model value of a term, registering it on demand.
    fn get_value(&mut self, ctx: &mut C, t: TermId) -> Result<BigRational, OverflowError>;

    /// React to a literal that just became true: repair its atom if the
    /// atom's truth disagrees.
    fn propagate_literal(&mut self, ctx: &mut C, lit: Literal);

    /// Perform pending propagations; returns `true` if anything changed.
    fn propagate(&mut self, ctx: &mut C) -> bool;

    /// Re-evaluate a composite term bottom-up from its inputs.
    fn repair_up(&mut self, ctx: &mut C, t: TermId);

    /// Adjust a composite term's inputs top-down toward its cached value.
    /// Returns `false` when no strategy applies.
    fn repair_down(&mut self, ctx: &mut C, t: TermId) -> bool;

    /// Align the Boolean assignment of a literal with its atom's truth.
    fn repair_literal(&mut self, ctx: &mut C, lit: Literal);

    /// Reward for flipping the literal; as a side effect selects the pivot
    /// variable a subsequent repair will move.
    fn reward(&mut self, ctx: &mut C, lit: Literal) -> f64;

    /// Whether every clause is satisfied under the current assignment.
    fn is_sat(&mut self, ctx: &C) -> bool;

    /// Switch scoring to the weighted (dscore) mode after a rescale.
    fn on_rescale(&mut self);

    /// Re-synchronize Boolean assignments with atom truth after a restart.
    fn on_restart(&mut self, ctx: &mut C);

    /// Contribute values to the user-facing model. Model construction is
    /// the controller's job; the default does nothing.
    fn mk_model(&mut self, _ctx: &mut C) {}
}

// ============================================================================
// Kani Verification Harnesses
// ============================================================================

#[cfg(kani)]
mod verification {
    use super::*;

    #[kani::proof]
    fn literal_negation_involutive() {
        let raw: u32 = kani::any();
        kani::assume(raw < u32::MAX);
        let lit = Literal(raw);
        assert_eq!(lit.negated().negated(), lit);
    }

    #[kani::proof]
    fn literal_roundtrip() {
        let var: u32 = kani::any();
        kani::assume(var < u32::MAX / 2);
        let sign: bool = kani::any();
        let lit = Literal::new(BoolVar(var), sign);
        assert_eq!(lit.var(), BoolVar(var));
        assert_eq!(lit.sign(), sign);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_encoding() {
        let v = BoolVar(7);
        let pos = Literal::positive(v);
        let neg = Literal::negative(v);
        assert_eq!(pos.var(), v);
        assert_eq!(neg.var(), v);
        assert!(!pos.sign());
        assert!(neg.sign());
        assert_eq!(pos.negated(), neg);
        assert_eq!(neg.negated(), pos);
        assert_eq!(Literal::from_index(pos.index()), pos);
    }

    #[test]
    fn literal_new_matches_polarity_constructors() {
        let v = BoolVar(3);
        assert_eq!(Literal::new(v, false), Literal::positive(v));
        assert_eq!(Literal::new(v, true), Literal::negative(v));
    }

    #[test]
    fn literal_display() {
        assert_eq!(Literal::positive(BoolVar(2)).to_string(), "b2");
        assert_eq!(Literal::negative(BoolVar(2)).to_string(), "-b2");
    }
}
