//! Stochastic local search repair engine for integer and real arithmetic.
//!
//! Given a Boolean assignment and numeric variable assignment that does not
//! yet satisfy a set of arithmetic atoms, the engine proposes value updates
//! and Boolean flips that move the candidate model toward satisfiability.
//! It is a heuristic, not a decision procedure: moves can fail, and the
//! controlling search decides what to try next.
//!
//! ## Components
//!
//! - Numeric abstraction ([`num`]): exact rationals or checked 64-bit
//!   integers with sticky overflow detection, plus the integer kernel
//!   (gcd/Bézout, integer square root, small-prime factorisation).
//! - Term graph ([`var`]): variable records with bounds and occurrence
//!   lists; add, mul, and operator definition tables linked by indices.
//! - Atoms ([`atom`]): linear inequalities `Σ cᵢ·vᵢ + k ⟨⋈⟩ 0` with a
//!   cached argument value and a pointwise distance-to-truth.
//! - Scoring ([`score`] impls): `dtt`/`dts` distances, critical-move and
//!   weighted clause scores, roulette-wheel pivot selection.
//! - Moves ([`moves`] impls): critical moves with bound clamping, Bézout
//!   equation-pair solving, square / single-factor / factor-distribution
//!   repair for monomials, and the operator repair table.
//! - Engine ([`engine`]): registration, the single `update` mutation point,
//!   and the [`sls_core::Plugin`] surface driven by the controller.
//!
//! ## Numeric modes
//!
//! [`ArithSls`] is generic over [`num::Num`]. [`IntArithSls`] runs on
//! checked 64-bit integers and treats overflow as move failure;
//! [`RationalArithSls`] runs on exact rationals and never overflows.
//!
//! The engine holds no RNG and no controller state: every entry point
//! receives the [`sls_core::Context`], and all randomness is drawn through
//! it, so a run is a pure function of the seed and the call sequence.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atom;
pub mod engine;
mod moves;
pub mod num;
mod score;
pub mod var;

pub use engine::{ArithSls, Config, Stats};
pub use num::{factor, Int64, Num};

use num_rational::BigRational;

/// Engine over checked 64-bit integers; overflowing moves fail.
pub type IntArithSls = ArithSls<Int64>;

/// Engine over exact rationals; never overflows.
pub type RationalArithSls = ArithSls<BigRational>;
