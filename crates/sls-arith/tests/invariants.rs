//! Property-based checks: numeric kernel round-trips and the engine
//! invariants that must hold after every public call, driven over small
//! random constraint systems.

mod common;

use common::{register_atoms, run_search, MockContext, TermData};
use num_bigint::BigInt;
use num_rational::BigRational;
use proptest::prelude::*;
use sls_arith::num::{factor, Int64, Num};
use sls_arith::{ArithSls, IntArithSls, RationalArithSls};
use sls_core::{BoolVar, Context, Literal};

fn rational(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

/// One random atom: relation selector, (coeff, var) pairs, constant.
type AtomShape = (u8, Vec<(i8, u8)>, i8);

fn atom_strategy() -> impl Strategy<Value = AtomShape> {
    (
        0u8..3,
        prop::collection::vec(
            ((-3i8..=3).prop_filter("coefficient must be non-zero", |c| *c != 0), 0u8..3),
            1..=3,
        ),
        -10i8..=10,
    )
}

fn system_strategy() -> impl Strategy<Value = Vec<AtomShape>> {
    prop::collection::vec(atom_strategy(), 1..=4)
}

/// Build the system in a fresh mock context, run a bounded search, and
/// check the global invariants regardless of whether it solved.
fn check_system<N: Num>(mut engine: ArithSls<N>, seed: u64, sys: &[AtomShape]) {
    let mut ctx = MockContext::new(seed);
    let vars = [ctx.int_var(), ctx.int_var(), ctx.int_var()];
    for (op, args, k) in sys {
        let mut parts = Vec::new();
        for (c, v) in args {
            let coeff = ctx.int(i64::from(*c));
            parts.push(ctx.mk(TermData::Mul(vec![coeff, vars[*v as usize % 3]])));
        }
        let lhs = if parts.len() == 1 {
            parts[0]
        } else {
            ctx.mk(TermData::Add(parts))
        };
        let rhs = ctx.int(-i64::from(*k));
        let data = match op % 3 {
            0 => TermData::Le(lhs, rhs),
            1 => TermData::Lt(lhs, rhs),
            _ => TermData::Eq(lhs, rhs),
        };
        let at = ctx.mk(data);
        let (_, lit) = ctx.atom(at, true);
        ctx.add_clause(&[lit]);
    }
    register_atoms(&mut engine, &mut ctx);
    run_search(&mut engine, &mut ctx, 200);

    engine.assert_invariants();
    for bv in 0..ctx.num_bool_vars() {
        let bv = BoolVar(bv);
        if let Some(atom) = engine.atom(bv) {
            assert_eq!(
                ctx.is_true(Literal::positive(bv)),
                atom.dtt(false).is_zero(),
                "boolean assignment out of sync for b{}",
                bv.0
            );
        }
    }
}

proptest! {
    #[test]
    fn factor_multiplies_back_to_abs(n in -1_000_000i64..1_000_000) {
        prop_assume!(n != 0);
        let mut fs = Vec::new();
        factor(&Int64::new(n), &mut fs);
        let prod = fs.iter().fold(Int64::new(1), |acc, f| acc * *f);
        prop_assert_eq!(prod, Int64::new(n).abs());

        let mut fs = Vec::new();
        factor(&rational(n), &mut fs);
        let prod = fs
            .iter()
            .fold(rational(1), |acc, f| acc * f.clone());
        prop_assert_eq!(prod, rational(n.abs()));
    }

    #[test]
    fn isqrt_brackets_the_argument(n in 0i64..1_000_000_000_000) {
        let r = Int64::new(n).isqrt();
        prop_assert!(r * r <= Int64::new(n));
        let r1 = r + Int64::new(1);
        prop_assert!(r1 * r1 > Int64::new(n));
    }

    #[test]
    fn gcd_bezout_satisfies_identity(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let (g, s, t) = <Int64 as Num>::gcd_bezout(&Int64::new(a), &Int64::new(b));
        prop_assert!(g >= Int64::new(0));
        prop_assert_eq!(Int64::new(a) * s + Int64::new(b) * t, g);

        let (g, s, t) = <BigRational as Num>::gcd_bezout(&rational(a), &rational(b));
        prop_assert_eq!(rational(a) * s + rational(b) * t, g);
    }

    #[test]
    fn search_preserves_invariants_in_bounded_mode(
        seed in 0u64..256,
        sys in system_strategy(),
    ) {
        check_system(IntArithSls::default(), seed, &sys);
    }

    #[test]
    fn search_preserves_invariants_in_exact_mode(
        seed in 0u64..256,
        sys in system_strategy(),
    ) {
        check_system(RationalArithSls::default(), seed, &sys);
    }
}
