#![allow(dead_code)] // shared across test binaries; not all use every helper

//! Mock controller for driving the repair engine in tests.
//!
//! Owns a tiny term store, the Boolean truth table, clauses with use lists
//! and unit weights, and a seeded ChaCha8 RNG, so every test run is a pure
//! function of its seed.

use std::collections::HashMap;

use num_bigint::BigInt;
use num_rational::BigRational;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sls_arith::num::Num;
use sls_arith::ArithSls;
use sls_core::{BoolVar, ClauseIdx, Context, Literal, Plugin, Sort, TermId, TermView};

/// Term shapes the mock can build.
#[derive(Debug, Clone)]
pub enum TermData {
    Num(BigRational),
    Var(Sort),
    Add(Vec<TermId>),
    Sub(TermId, TermId),
    Mul(Vec<TermId>),
    Neg(TermId),
    Mod(TermId, TermId),
    Idiv(TermId, TermId),
    Div(TermId, TermId),
    Rem(TermId, TermId),
    Power(TermId, TermId),
    Abs(TermId),
    ToInt(TermId),
    ToReal(TermId),
    Le(TermId, TermId),
    Lt(TermId, TermId),
    Ge(TermId, TermId),
    Gt(TermId, TermId),
    Eq(TermId, TermId),
    App(Vec<TermId>),
}

pub struct MockContext {
    terms: Vec<TermData>,
    atom_terms: Vec<Option<TermId>>,
    term_atoms: HashMap<u32, BoolVar>,
    truth: Vec<bool>,
    clauses: Vec<Vec<Literal>>,
    use_lists: Vec<Vec<ClauseIdx>>,
    weights: Vec<u64>,
    units: Vec<Literal>,
    composites: Vec<TermId>,
    rng: ChaCha8Rng,
}

pub fn rat(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

const EMPTY_CLAUSES: &[ClauseIdx] = &[];

impl MockContext {
    pub fn new(seed: u64) -> Self {
        MockContext {
            terms: Vec::new(),
            atom_terms: Vec::new(),
            term_atoms: HashMap::new(),
            truth: Vec::new(),
            clauses: Vec::new(),
            use_lists: Vec::new(),
            weights: Vec::new(),
            units: Vec::new(),
            composites: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn mk(&mut self, data: TermData) -> TermId {
        let t = TermId(self.terms.len() as u32);
        if matches!(
            data,
            TermData::Mul(_)
                | TermData::Mod(..)
                | TermData::Idiv(..)
                | TermData::Div(..)
                | TermData::Rem(..)
                | TermData::Power(..)
                | TermData::Abs(_)
                | TermData::ToInt(_)
                | TermData::ToReal(_)
        ) {
            self.composites.push(t);
        }
        self.terms.push(data);
        t
    }

    pub fn int_var(&mut self) -> TermId {
        self.mk(TermData::Var(Sort::Int))
    }

    pub fn int(&mut self, n: i64) -> TermId {
        self.mk(TermData::Num(rat(n)))
    }

    /// Composite terms built so far (monomials and operator applications);
    /// the driver repairs these after every move.
    pub fn composite_terms(&self) -> &[TermId] {
        &self.composites
    }

    /// Allocate a Boolean variable for an atom term with an initial truth
    /// value.
    pub fn atom(&mut self, t: TermId, initially_true: bool) -> (BoolVar, Literal) {
        let bv = BoolVar(self.truth.len() as u32);
        self.truth.push(initially_true);
        self.atom_terms.push(Some(t));
        self.term_atoms.insert(t.0, bv);
        self.use_lists
            .resize_with(2 * self.truth.len(), Vec::new);
        (bv, Literal::positive(bv))
    }

    pub fn push_clause(&mut self, lits: &[Literal]) -> ClauseIdx {
        let idx = ClauseIdx(self.clauses.len() as u32);
        for lit in lits {
            self.use_lists[lit.index()].push(idx);
        }
        self.clauses.push(lits.to_vec());
        self.weights.push(1);
        idx
    }

    /// Assert a unit clause; the literal starts out true.
    pub fn unit(&mut self, lit: Literal) {
        self.push_clause(&[lit]);
        self.units.push(lit);
        if !self.is_true(lit) {
            self.flip(lit.var());
        }
    }

    fn term_sort(&self, t: TermId) -> Option<Sort> {
        match &self.terms[t.0 as usize] {
            TermData::Num(r) => Some(if r.is_integer() { Sort::Int } else { Sort::Real }),
            TermData::Var(s) => Some(*s),
            TermData::Add(args) | TermData::Mul(args) => {
                args.first().and_then(|&a| self.term_sort(a))
            }
            TermData::Sub(x, _)
            | TermData::Neg(x)
            | TermData::Abs(x)
            | TermData::Power(x, _) => self.term_sort(*x),
            TermData::Mod(..) | TermData::Idiv(..) | TermData::Rem(..) | TermData::ToInt(_) => {
                Some(Sort::Int)
            }
            TermData::Div(..) | TermData::ToReal(_) => Some(Sort::Real),
            TermData::Le(..)
            | TermData::Lt(..)
            | TermData::Ge(..)
            | TermData::Gt(..)
            | TermData::Eq(..)
            | TermData::App(_) => None,
        }
    }
}

impl Context for MockContext {
    fn num_bool_vars(&self) -> u32 {
        self.truth.len() as u32
    }

    fn atom_term(&self, bv: BoolVar) -> Option<TermId> {
        self.atom_terms.get(bv.0 as usize).copied().flatten()
    }

    fn bool_var_of(&self, t: TermId) -> Option<BoolVar> {
        self.term_atoms.get(&t.0).copied()
    }

    fn is_true(&self, lit: Literal) -> bool {
        self.truth[lit.var().0 as usize] != lit.sign()
    }

    fn flip(&mut self, bv: BoolVar) {
        let slot = &mut self.truth[bv.0 as usize];
        *slot = !*slot;
    }

    fn is_unit(&self, lit: Literal) -> bool {
        self.units.contains(&lit)
    }

    fn unit_literals(&self) -> Vec<Literal> {
        self.units.clone()
    }

    fn num_clauses(&self) -> u32 {
        self.clauses.len() as u32
    }

    fn clause(&self, cl: ClauseIdx) -> &[Literal] {
        &self.clauses[cl.0 as usize]
    }

    fn clause_num_true(&self, cl: ClauseIdx) -> u32 {
        self.clauses[cl.0 as usize]
            .iter()
            .filter(|&&lit| self.is_true(lit))
            .count() as u32
    }

    fn clause_weight(&self, cl: ClauseIdx) -> u64 {
        self.weights[cl.0 as usize]
    }

    fn use_list(&self, lit: Literal) -> &[ClauseIdx] {
        self.use_lists
            .get(lit.index())
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_CLAUSES)
    }

    fn mk_literal(&mut self, t: TermId) -> Literal {
        match self.bool_var_of(t) {
            Some(bv) => Literal::positive(bv),
            None => self.atom(t, true).1,
        }
    }

    fn add_clause(&mut self, lits: &[Literal]) {
        self.push_clause(lits);
    }

    fn rand_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn rand_below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "rand_below(0)");
        self.rng.gen_range(0..n)
    }

    fn new_value_eh(&mut self, _t: TermId) {}

    fn view(&self, t: TermId) -> TermView {
        match &self.terms[t.0 as usize] {
            TermData::Num(r) => TermView::Numeral(r.clone()),
            TermData::Var(_) => TermView::Var,
            TermData::Add(args) => TermView::Add(args.clone()),
            TermData::Sub(x, y) => TermView::Sub(*x, *y),
            TermData::Mul(args) => TermView::Mul(args.clone()),
            TermData::Neg(x) => TermView::Neg(*x),
            TermData::Mod(x, y) => TermView::Mod(*x, *y),
            TermData::Idiv(x, y) => TermView::Idiv(*x, *y),
            TermData::Div(x, y) => TermView::Div(*x, *y),
            TermData::Rem(x, y) => TermView::Rem(*x, *y),
            TermData::Power(x, y) => TermView::Power(*x, *y),
            TermData::Abs(x) => TermView::Abs(*x),
            TermData::ToInt(x) => TermView::ToInt(*x),
            TermData::ToReal(x) => TermView::ToReal(*x),
            TermData::Le(x, y) => TermView::Le(*x, *y),
            TermData::Lt(x, y) => TermView::Lt(*x, *y),
            TermData::Ge(x, y) => TermView::Ge(*x, *y),
            TermData::Gt(x, y) => TermView::Gt(*x, *y),
            TermData::Eq(x, y) => TermView::Eq(*x, *y),
            TermData::App(args) => TermView::App(args.clone()),
        }
    }

    fn sort_of(&self, t: TermId) -> Option<Sort> {
        self.term_sort(t)
    }
}

/// Register every atom term with the engine, harvest unit bounds, and sync
/// the Boolean assignment with the atom truth values.
pub fn register_atoms<N: Num>(engine: &mut ArithSls<N>, ctx: &mut MockContext) {
    for bv in 0..ctx.num_bool_vars() {
        if let Some(t) = ctx.atom_term(BoolVar(bv)) {
            engine.register_term(ctx, t).expect("registration failed");
        }
    }
    engine.initialize(ctx).expect("initialize failed");
    engine.on_restart(ctx);
}

/// A clause is satisfied when some true literal has no atom or an atom
/// whose truth agrees with the literal.
pub fn clause_satisfied<N: Num>(
    engine: &ArithSls<N>,
    ctx: &MockContext,
    cl: ClauseIdx,
) -> bool {
    ctx.clause(cl).iter().any(|&lit| {
        ctx.is_true(lit)
            && match engine.atom(lit.var()) {
                None => true,
                Some(atom) => atom.is_true() != lit.sign(),
            }
    })
}

/// Minimal controller loop: pick an unsatisfied clause, flip its best
/// literal by reward, let the engine repair, then repair composite terms
/// top-down and re-align the clause's literals.
pub fn run_search<N: Num>(
    engine: &mut ArithSls<N>,
    ctx: &mut MockContext,
    max_steps: usize,
) -> bool {
    let composites = ctx.composite_terms().to_vec();
    for _ in 0..max_steps {
        let unsat: Vec<ClauseIdx> = (0..ctx.num_clauses())
            .map(ClauseIdx)
            .filter(|&cl| !clause_satisfied(engine, ctx, cl))
            .collect();
        if unsat.is_empty() {
            // do not accept a model while an operator output is stale
            if engine.is_consistent() {
                return true;
            }
            for &t in &composites {
                engine.repair_down(ctx, t);
            }
            continue;
        }
        let cl = unsat[ctx.rand_u32() as usize % unsat.len()];
        let lits: Vec<Literal> = ctx.clause(cl).to_vec();
        let mut best = lits[0];
        let mut best_reward = f64::NEG_INFINITY;
        for &lit in &lits {
            let reward = engine.reward(ctx, lit);
            if reward > best_reward {
                best_reward = reward;
                best = lit;
            }
        }
        if !ctx.is_true(best) {
            ctx.flip(best.var());
        }
        engine.propagate_literal(ctx, best);
        for &t in &composites {
            engine.repair_down(ctx, t);
        }
        for &lit in &lits {
            engine.repair_literal(ctx, lit);
        }
    }
    false
}
