//! Engine state, term registration, the `update` mutation point, and the
//! controller-facing plugin surface.
//!
//! Registration turns controller expressions into the arena tables: every
//! arithmetic subterm gets a variable, composite subterms get a definition
//! (add, mul, or operator) whose output that variable is, and every
//! comparison atom gets a linear inequality indexed by its Boolean variable.
//!
//! All value mutation funnels through [`ArithSls::update`]: it refreshes the
//! cached `args_value` of every atom mentioning the variable, requests
//! Boolean flips where an atom's truth no longer matches the controller's
//! assignment, and recursively re-evaluates the definitions that read the
//! variable. The definition graph is acyclic, so the recursion terminates.

use std::fmt;

use hashbrown::HashMap;
use num_rational::BigRational;
use sls_core::{BoolVar, Context, Literal, OverflowError, Plugin, Sort, TermId, TermView};
use tracing::{debug, trace};

use crate::atom::{Ineq, IneqKind};
use crate::num::Num;
use crate::var::{AddDef, Bound, LinearTerm, MulDef, OpDef, OpKind, VarId, VarInfo, VarSort};

/// Tunable probabilities, as denominators of `1/n` draws.
#[derive(Debug, Clone)]
pub struct Config {
    /// Odds of accepting a definition's evaluated value instead of repairing
    /// its inputs (the "accept upward" move).
    pub overwrite_odds: u32,
    /// Odds of trying the Bézout equation-pair solver before the critical
    /// move on an equality.
    pub eq_pairs_odds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            overwrite_odds: 20,
            eq_pairs_odds: 10,
        }
    }
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// Successful value updates (including recursive propagation).
    pub num_updates: u64,
    /// Boolean flips requested from the controller.
    pub num_flips: u64,
    /// Literal repairs attempted.
    pub num_repairs: u64,
    /// Successful Bézout equation-pair moves.
    pub num_eq_pair_solves: u64,
}

/// The arithmetic local-search repair engine.
///
/// Generic over the numeric mode `N`: exact rationals or checked 64-bit
/// integers. The engine owns no controller state and no RNG; both are
/// reached through the [`Context`] passed into every entry point.
pub struct ArithSls<N> {
    pub(crate) cfg: Config,
    pub(crate) stats: Stats,
    /// Atom per Boolean variable; `None` for non-arithmetic atoms.
    pub(crate) atoms: Vec<Option<Ineq<N>>>,
    pub(crate) vars: Vec<VarInfo<N>>,
    pub(crate) muls: Vec<MulDef<N>>,
    pub(crate) adds: Vec<AddDef<N>>,
    pub(crate) ops: Vec<OpDef>,
    term_vars: HashMap<TermId, VarId>,
    /// Scratch for the reward roulette.
    pub(crate) probs: Vec<f64>,
    /// Scratch for the factor distributor.
    pub(crate) factors: Vec<N>,
    pub(crate) dscore_mode: bool,
}

impl<N: Num> Default for ArithSls<N> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<N: Num> ArithSls<N> {
    /// New engine with the given configuration.
    pub fn new(cfg: Config) -> Self {
        ArithSls {
            cfg,
            stats: Stats::default(),
            atoms: Vec::new(),
            vars: Vec::new(),
            muls: Vec::new(),
            adds: Vec::new(),
            ops: Vec::new(),
            term_vars: HashMap::new(),
            probs: Vec::new(),
            factors: Vec::new(),
            dscore_mode: false,
        }
    }

    /// Engine counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Number of numeric variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// The atom owned by a Boolean variable, if any.
    pub fn atom(&self, bv: BoolVar) -> Option<&Ineq<N>> {
        self.atoms.get(bv.0 as usize).and_then(|a| a.as_ref())
    }

    pub(crate) fn atom_mut(&mut self, bv: BoolVar) -> Option<&mut Ineq<N>> {
        self.atoms.get_mut(bv.0 as usize).and_then(|a| a.as_mut())
    }

    /// Current value of a variable.
    pub fn value(&self, v: VarId) -> &N {
        &self.vars[v.index()].value
    }

    /// The variable registered for a term, if any.
    pub fn var_of(&self, t: TermId) -> Option<VarId> {
        self.term_vars.get(&t).copied()
    }

    pub(crate) fn is_int(&self, v: VarId) -> bool {
        self.vars[v.index()].sort == VarSort::Int
    }

    pub(crate) fn is_fixed(&self, v: VarId) -> bool {
        self.vars[v.index()].is_fixed()
    }

    pub(crate) fn in_bounds(&self, v: VarId, value: &N) -> bool {
        self.vars[v.index()].in_bounds(value)
    }

    // ------------------------------------------------------------------
    // bounds

    pub(crate) fn add_le(&mut self, v: VarId, n: N) {
        let vi = &mut self.vars[v.index()];
        if let Some(hi) = &vi.hi {
            if hi.value <= n {
                return;
            }
        }
        vi.hi = Some(Bound {
            strict: false,
            value: n,
        });
    }

    pub(crate) fn add_ge(&mut self, v: VarId, n: N) {
        let vi = &mut self.vars[v.index()];
        if let Some(lo) = &vi.lo {
            if lo.value >= n {
                return;
            }
        }
        vi.lo = Some(Bound {
            strict: false,
            value: n,
        });
    }

    pub(crate) fn add_lt(&mut self, v: VarId, n: N) {
        if self.is_int(v) {
            self.add_le(v, n - N::one());
        } else {
            self.vars[v.index()].hi = Some(Bound {
                strict: true,
                value: n,
            });
        }
    }

    pub(crate) fn add_gt(&mut self, v: VarId, n: N) {
        if self.is_int(v) {
            self.add_ge(v, n + N::one());
        } else {
            self.vars[v.index()].lo = Some(Bound {
                strict: true,
                value: n,
            });
        }
    }

    // ------------------------------------------------------------------
    // registration

    fn mk_var<C: Context>(&mut self, ctx: &C, t: TermId) -> VarId {
        if let Some(&v) = self.term_vars.get(&t) {
            return v;
        }
        let sort = match ctx.sort_of(t) {
            Some(Sort::Real) => VarSort::Real,
            _ => VarSort::Int,
        };
        let v = VarId(self.vars.len() as u32);
        self.term_vars.insert(t, v);
        self.vars.push(VarInfo::new(t, sort));
        v
    }

    /// Variable standing for `t`, creating definitions for composite terms.
    ///
    /// A term that is a plain linear rewriting of a single variable maps to
    /// that variable; anything else gets an add definition.
    pub(crate) fn mk_term<C: Context>(
        &mut self,
        ctx: &mut C,
        t: TermId,
    ) -> Result<VarId, OverflowError> {
        if let Some(&v) = self.term_vars.get(&t) {
            return Ok(v);
        }
        let mut lt = LinearTerm::new();
        self.add_args(ctx, &mut lt, t, N::one())?;
        if lt.coeff.is_zero() && lt.args.len() == 1 && lt.args[0].0 == N::one() {
            return Ok(lt.args[0].1);
        }
        let v = self.mk_var(ctx, t);
        let idx = self.adds.len();
        let mut sum = lt.coeff.clone();
        for (c, w) in &lt.args {
            self.vars[w.index()].adds.push(idx);
            sum += c.clone() * self.vars[w.index()].value.clone();
        }
        self.adds.push(AddDef { var: v, term: lt });
        let vi = &mut self.vars[v.index()];
        vi.def_idx = Some(idx);
        vi.op = Some(OpKind::Add);
        vi.value = sum;
        Ok(v)
    }

    fn mk_op<C: Context>(
        &mut self,
        ctx: &mut C,
        op: OpKind,
        t: TermId,
        x: TermId,
        y: TermId,
    ) -> Result<VarId, OverflowError> {
        let v = self.mk_var(ctx, t);
        let w1 = self.mk_term(ctx, x)?;
        let w2 = self.mk_term(ctx, y)?;
        let idx = self.ops.len();
        let val = eval_op(
            op,
            &self.vars[w1.index()].value,
            &self.vars[w2.index()].value,
        );
        trace!(op = ?op, term = t.0, "mk-op");
        self.ops.push(OpDef {
            var: v,
            op,
            arg1: w1,
            arg2: w2,
        });
        let vi = &mut self.vars[v.index()];
        vi.def_idx = Some(idx);
        vi.op = Some(op);
        vi.value = val;
        Ok(v)
    }

    /// Flatten `sign · t` into a linear term, creating mul / op definitions
    /// for the non-linear pieces.
    fn add_args<C: Context>(
        &mut self,
        ctx: &mut C,
        term: &mut LinearTerm<N>,
        t: TermId,
        sign: N,
    ) -> Result<(), OverflowError> {
        if let Some(&v) = self.term_vars.get(&t) {
            term.push(sign, v);
            return Ok(());
        }
        match ctx.view(t) {
            TermView::Numeral(r) => {
                term.coeff += sign * N::from_rational(&r)?;
            }
            TermView::Add(args) => {
                for arg in args {
                    self.add_args(ctx, term, arg, sign.clone())?;
                }
            }
            TermView::Sub(x, y) => {
                self.add_args(ctx, term, x, sign.clone())?;
                self.add_args(ctx, term, y, -sign)?;
            }
            TermView::Neg(x) => {
                self.add_args(ctx, term, x, -sign)?;
            }
            TermView::Mul(args) => {
                let mut c = N::one();
                let mut monomial = Vec::new();
                for arg in args {
                    if let TermView::Numeral(r) = ctx.view(arg) {
                        c *= N::from_rational(&r)?;
                    } else {
                        monomial.push(self.mk_term(ctx, arg)?);
                    }
                }
                match monomial.len() {
                    0 => term.coeff += c * sign,
                    1 => term.push(c * sign, monomial[0]),
                    _ => {
                        let v = self.mk_var(ctx, t);
                        let idx = self.muls.len();
                        let mut prod = c.clone();
                        for w in &monomial {
                            self.vars[w.index()].muls.push(idx);
                            prod *= self.vars[w.index()].value.clone();
                        }
                        self.muls.push(MulDef {
                            var: v,
                            coeff: c,
                            monomial,
                        });
                        let vi = &mut self.vars[v.index()];
                        vi.def_idx = Some(idx);
                        vi.op = Some(OpKind::Mul);
                        vi.value = prod;
                        term.push(sign, v);
                    }
                }
            }
            TermView::Mod(x, y) => term.push(sign, self.mk_op(ctx, OpKind::Mod, t, x, y)?),
            TermView::Idiv(x, y) => term.push(sign, self.mk_op(ctx, OpKind::Idiv, t, x, y)?),
            TermView::Div(x, y) => term.push(sign, self.mk_op(ctx, OpKind::Div, t, x, y)?),
            TermView::Rem(x, y) => term.push(sign, self.mk_op(ctx, OpKind::Rem, t, x, y)?),
            TermView::Power(x, y) => term.push(sign, self.mk_op(ctx, OpKind::Power, t, x, y)?),
            TermView::Abs(x) => term.push(sign, self.mk_op(ctx, OpKind::Abs, t, x, x)?),
            TermView::ToInt(x) => term.push(sign, self.mk_op(ctx, OpKind::ToInt, t, x, x)?),
            TermView::ToReal(x) => term.push(sign, self.mk_op(ctx, OpKind::ToReal, t, x, x)?),
            _ => term.push(sign, self.mk_var(ctx, t)),
        }
        Ok(())
    }

    /// Build the atom for a Boolean variable from its comparison shape.
    pub(crate) fn init_bool_var<C: Context>(
        &mut self,
        ctx: &mut C,
        bv: BoolVar,
    ) -> Result<(), OverflowError> {
        if self.atom(bv).is_some() {
            return Ok(());
        }
        let Some(e) = ctx.atom_term(bv) else {
            return Ok(());
        };
        if self.atoms.len() <= bv.0 as usize {
            self.atoms.resize_with(bv.0 as usize + 1, || None);
        }
        let is_int_cmp = |ctx: &C, x: TermId| ctx.sort_of(x) == Some(Sort::Int);
        let shape = match ctx.view(e) {
            TermView::Le(x, y) => Some((x, y, IneqKind::Le, N::zero())),
            TermView::Ge(x, y) => Some((y, x, IneqKind::Le, N::zero())),
            TermView::Lt(x, y) if is_int_cmp(ctx, x) => Some((x, y, IneqKind::Le, N::one())),
            TermView::Lt(x, y) => Some((x, y, IneqKind::Lt, N::zero())),
            TermView::Gt(x, y) if is_int_cmp(ctx, y) => Some((y, x, IneqKind::Le, N::one())),
            TermView::Gt(x, y) => Some((y, x, IneqKind::Lt, N::zero())),
            TermView::Eq(x, y) if ctx.sort_of(x).is_some() => {
                Some((x, y, IneqKind::Eq, N::zero()))
            }
            _ => None,
        };
        let Some((pos, neg, op, k)) = shape else {
            return Ok(());
        };
        let mut ineq = Ineq::new(op, k);
        self.add_args(ctx, &mut ineq.term, pos, N::one())?;
        self.add_args(ctx, &mut ineq.term, neg, -N::one())?;
        self.init_ineq(bv, ineq);
        Ok(())
    }

    fn init_ineq(&mut self, bv: BoolVar, mut ineq: Ineq<N>) {
        ineq.args_value = N::zero();
        for (coeff, v) in &ineq.term.args {
            self.vars[v.index()]
                .bool_vars
                .push((coeff.clone(), bv));
            ineq.args_value += coeff.clone() * self.vars[v.index()].value.clone();
        }
        self.atoms[bv.0 as usize] = Some(ineq);
    }

    fn init_bool_var_assignment<C: Context>(&mut self, ctx: &mut C, bv: BoolVar) {
        if let Some(ineq) = self.atom(bv) {
            if ctx.is_true(Literal::positive(bv)) != ineq.dtt(false).is_zero() {
                ctx.flip(bv);
            }
        }
    }

    /// Harvest variable bounds from one asserted unit literal.
    fn initialize_literal<C: Context>(
        &mut self,
        ctx: &mut C,
        lit: Literal,
    ) -> Result<(), OverflowError> {
        self.init_bool_var(ctx, lit.var())?;
        let Some(ineq) = self.atom(lit.var()) else {
            return Ok(());
        };
        if ineq.term.args.len() != 1 {
            return Ok(());
        }
        let (c, v) = ineq.term.args[0].clone();
        let k = ineq.term.coeff.clone();
        let op = ineq.op;
        let unit_pos = c == N::one();
        let unit_neg = c == -N::one();
        match op {
            IneqKind::Le => {
                if lit.sign() {
                    if unit_neg {
                        self.add_le(v, k);
                    } else if unit_pos {
                        self.add_ge(v, -k);
                    } else {
                        debug!(lit = %lit, "unit literal with non-unit coefficient");
                    }
                } else if unit_neg {
                    self.add_ge(v, k);
                } else if unit_pos {
                    self.add_le(v, -k);
                } else {
                    debug!(lit = %lit, "unit literal with non-unit coefficient");
                }
            }
            IneqKind::Eq => {
                if lit.sign() {
                    debug!(lit = %lit, "unit disequality ignored");
                } else if unit_neg {
                    self.add_ge(v, k.clone());
                    self.add_le(v, k);
                } else if unit_pos {
                    self.add_ge(v, -k.clone());
                    self.add_le(v, -k);
                } else {
                    debug!(lit = %lit, "unit literal with non-unit coefficient");
                }
            }
            IneqKind::Lt => {
                if lit.sign() {
                    if unit_neg {
                        self.add_le(v, k);
                    } else if unit_pos {
                        self.add_ge(v, -k);
                    } else {
                        debug!(lit = %lit, "unit literal with non-unit coefficient");
                    }
                } else if unit_neg {
                    self.add_gt(v, k);
                } else if unit_pos {
                    self.add_lt(v, -k);
                } else {
                    debug!(lit = %lit, "unit literal with non-unit coefficient");
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // the single mutation point

    /// Set `v` to `new_value`, keeping every cache consistent before
    /// returning.
    ///
    /// Out-of-range integer values are retried once against the violated
    /// bound (or one step inward as a last resort); anything else out of
    /// range fails. Atom caches are refreshed and Boolean flips requested
    /// where the atom's truth changed; definitions reading `v` are
    /// re-evaluated recursively.
    pub(crate) fn update<C: Context>(&mut self, ctx: &mut C, v: VarId, new_value: N) -> bool {
        let old_value = self.vars[v.index()].value.clone();
        if new_value == old_value {
            return true;
        }
        if new_value.is_overflow() {
            return false;
        }
        if !self.in_bounds(v, &new_value) {
            if self.is_int(v) {
                let lo = self.vars[v.index()].lo.clone();
                if let Some(lo) = lo {
                    if !lo.strict && new_value < lo.value {
                        if lo.value != old_value {
                            return self.update(ctx, v, lo.value);
                        }
                        let nudged = old_value + N::one();
                        if self.in_bounds(v, &nudged) {
                            return self.update(ctx, v, nudged);
                        }
                        return false;
                    }
                }
                let hi = self.vars[v.index()].hi.clone();
                if let Some(hi) = hi {
                    if !hi.strict && new_value > hi.value {
                        if hi.value != old_value {
                            return self.update(ctx, v, hi.value);
                        }
                        let nudged = old_value - N::one();
                        if self.in_bounds(v, &nudged) {
                            return self.update(ctx, v, nudged);
                        }
                        return false;
                    }
                }
            }
            trace!(var = %v, value = %new_value, "update rejected: out of bounds");
            return false;
        }

        // refresh atom caches; split borrows so atoms and vars are disjoint
        {
            let ArithSls {
                vars, atoms, stats, ..
            } = self;
            for (coeff, bv) in &vars[v.index()].bool_vars {
                let Some(ineq) = atoms.get_mut(bv.0 as usize).and_then(|a| a.as_mut()) else {
                    continue;
                };
                let old_sign = !ctx.is_true(Literal::positive(*bv));
                ineq.args_value +=
                    coeff.clone() * (new_value.clone() - old_value.clone());
                if !ineq.dtt(old_sign).is_zero() {
                    ctx.flip(*bv);
                    stats.num_flips += 1;
                }
                debug_assert!(ineq
                    .dtt(!ctx.is_true(Literal::positive(*bv)))
                    .is_zero());
            }
        }
        self.vars[v.index()].value = new_value;
        self.stats.num_updates += 1;
        ctx.new_value_eh(self.vars[v.index()].term);

        for idx in self.vars[v.index()].muls.clone() {
            let md = &self.muls[idx];
            let out = md.var;
            let mut prod = md.coeff.clone();
            for w in &md.monomial {
                prod *= self.vars[w.index()].value.clone();
            }
            if self.vars[out.index()].value != prod {
                self.update(ctx, out, prod);
            }
        }
        for idx in self.vars[v.index()].adds.clone() {
            let ad = &self.adds[idx];
            let out = ad.var;
            let mut sum = ad.term.coeff.clone();
            for (c, w) in &ad.term.args {
                sum += c.clone() * self.vars[w.index()].value.clone();
            }
            if self.vars[out.index()].value != sum {
                self.update(ctx, out, sum);
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // consistency

    /// Snapshot the current values as the best seen and re-validate the
    /// Boolean assignment.
    pub fn save_best_values<C: Context>(&mut self, ctx: &C) {
        for vi in &mut self.vars {
            vi.best_value = vi.value.clone();
        }
        self.check_ineqs(ctx);
    }

    pub(crate) fn check_ineqs<C: Context>(&self, ctx: &C) {
        for bv in 0..ctx.num_bool_vars() {
            let bv = BoolVar(bv);
            let Some(ineq) = self.atom(bv) else { continue };
            let sign = !ctx.is_true(Literal::positive(bv));
            let d = ineq.dtt(sign);
            if ctx.is_true(Literal::new(bv, sign)) != d.is_zero() {
                debug!(bv = bv.0, atom = %ineq, "boolean assignment out of sync");
            }
            debug_assert!(ctx.is_true(Literal::new(bv, sign)) == d.is_zero());
        }
    }

    /// Whether every definition output currently equals its evaluation.
    ///
    /// Add and mul outputs are re-evaluated eagerly by `update`, but
    /// operator outputs are only re-evaluated when the controller repairs
    /// them, so a candidate model should not be accepted while this is
    /// false.
    pub fn is_consistent(&self) -> bool {
        for od in &self.ops {
            let val = eval_op(
                od.op,
                &self.vars[od.arg1.index()].value,
                &self.vars[od.arg2.index()].value,
            );
            if val != self.vars[od.var.index()].value {
                return false;
            }
        }
        for md in &self.muls {
            let mut prod = md.coeff.clone();
            for w in &md.monomial {
                prod *= self.vars[w.index()].value.clone();
            }
            if prod != self.vars[md.var.index()].value {
                return false;
            }
        }
        for ad in &self.adds {
            let mut sum = ad.term.coeff.clone();
            for (c, w) in &ad.term.args {
                sum += c.clone() * self.vars[w.index()].value.clone();
            }
            if sum != self.vars[ad.var.index()].value {
                return false;
            }
        }
        true
    }

    /// Check every cached quantity against its definition. Test hook; also
    /// exercised by debug assertions in the dispatch paths.
    pub fn assert_invariants(&self) {
        for ineq in self.atoms.iter().flatten() {
            let mut val = N::zero();
            for (c, v) in &ineq.term.args {
                val += c.clone() * self.vars[v.index()].value.clone();
            }
            assert!(val == ineq.args_value, "stale args_value in {ineq}");
        }
        for md in &self.muls {
            let mut prod = md.coeff.clone();
            for w in &md.monomial {
                prod *= self.vars[w.index()].value.clone();
            }
            assert!(
                prod == self.vars[md.var.index()].value,
                "mul definition out of sync for {}",
                md.var
            );
        }
        for ad in &self.adds {
            let mut sum = ad.term.coeff.clone();
            for (c, w) in &ad.term.args {
                sum += c.clone() * self.vars[w.index()].value.clone();
            }
            assert!(
                sum == self.vars[ad.var.index()].value,
                "add definition out of sync for {}",
                ad.var
            );
        }
        for (i, vi) in self.vars.iter().enumerate() {
            assert!(
                vi.in_bounds(&vi.value),
                "v{i} outside its bounds"
            );
        }
    }
}

/// Evaluate an operator definition from its argument values, with the
/// `y = 0` cases yielding zero.
pub(crate) fn eval_op<N: Num>(op: OpKind, x: &N, y: &N) -> N {
    match op {
        OpKind::Add | OpKind::Mul => unreachable!("linear definitions have their own tables"),
        OpKind::Mod => {
            if y.is_zero() {
                N::zero()
            } else {
                x.modulo(y)
            }
        }
        OpKind::Rem => {
            if y.is_zero() {
                N::zero()
            } else {
                x.rem_t(y)
            }
        }
        OpKind::Idiv => {
            if y.is_zero() {
                N::zero()
            } else {
                x.div_t(y)
            }
        }
        OpKind::Div => {
            if y.is_zero() {
                N::zero()
            } else {
                x.clone() / y.clone()
            }
        }
        OpKind::Abs => x.abs(),
        OpKind::ToInt => {
            // smallest integer i with i - 1 < x <= i
            x.clone() + (-x.clone()).modulo(&N::one())
        }
        OpKind::ToReal => x.clone(),
        OpKind::Power => {
            let e = y.to_i64();
            if x.is_zero() && y.is_zero() {
                return N::zero();
            }
            if !y.is_integral() || !(0..=32).contains(&e) {
                return N::zero();
            }
            let mut acc = N::one();
            for _ in 0..e {
                acc *= x.clone();
            }
            acc
        }
    }
}

impl<N: Num, C: Context> Plugin<C> for ArithSls<N> {
    fn register_term(&mut self, ctx: &mut C, t: TermId) -> Result<(), OverflowError> {
        if let Some(bv) = ctx.bool_var_of(t) {
            self.init_bool_var(ctx, bv)?;
        }
        if let TermView::App(args) = ctx.view(t) {
            for arg in args {
                if ctx.sort_of(arg).is_some() {
                    self.mk_term(ctx, arg)?;
                }
            }
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut C) -> Result<(), OverflowError> {
        for lit in ctx.unit_literals() {
            self.initialize_literal(ctx, lit)?;
        }
        Ok(())
    }

    fn set_value(
        &mut self,
        ctx: &mut C,
        t: TermId,
        value: &BigRational,
    ) -> Result<(), OverflowError> {
        if ctx.sort_of(t).is_none() {
            return Ok(());
        }
        let w = match self.var_of(t) {
            Some(w) => w,
            None => self.mk_term(ctx, t)?,
        };
        let n = N::from_rational(value)?;
        if n == *self.value(w) {
            return Ok(());
        }
        self.update(ctx, w, n);
        Ok(())
    }

    fn get_value(&mut self, ctx: &mut C, t: TermId) -> Result<BigRational, OverflowError> {
        if let TermView::Numeral(r) = ctx.view(t) {
            return Ok(r);
        }
        let v = self.mk_term(ctx, t)?;
        Ok(self.value(v).to_rational())
    }

    fn propagate_literal(&mut self, ctx: &mut C, lit: Literal) {
        if !ctx.is_true(lit) {
            return;
        }
        let Some(ineq) = self.atom(lit.var()) else {
            return;
        };
        if ineq.is_true() != lit.sign() {
            return;
        }
        self.stats.num_repairs += 1;
        self.repair(ctx, lit);
    }

    fn propagate(&mut self, _ctx: &mut C) -> bool {
        false
    }

    fn repair_up(&mut self, ctx: &mut C, t: TermId) {
        let Some(v) = self.var_of(t) else { return };
        let Some(def_idx) = self.vars[v.index()].def_idx else {
            return;
        };
        match self.vars[v.index()].op {
            None => {}
            Some(OpKind::Add) => {
                let ad = &self.adds[def_idx];
                let mut sum = ad.term.coeff.clone();
                for (c, w) in &ad.term.args {
                    sum += c.clone() * self.vars[w.index()].value.clone();
                }
                self.update(ctx, v, sum);
            }
            Some(OpKind::Mul) => {
                let md = &self.muls[def_idx];
                let mut prod = md.coeff.clone();
                for w in &md.monomial {
                    prod *= self.vars[w.index()].value.clone();
                }
                self.update(ctx, v, prod);
            }
            Some(op) => {
                let od = &self.ops[def_idx];
                let val = eval_op(
                    op,
                    &self.vars[od.arg1.index()].value,
                    &self.vars[od.arg2.index()].value,
                );
                self.update(ctx, v, val);
            }
        }
    }

    fn repair_down(&mut self, ctx: &mut C, t: TermId) -> bool {
        let Some(v) = self.var_of(t) else { return false };
        let Some(def_idx) = self.vars[v.index()].def_idx else {
            return false;
        };
        trace!(var = %v, "repair down");
        match self.vars[v.index()].op {
            None => true,
            Some(OpKind::Add) => self.repair_add(ctx, def_idx),
            Some(OpKind::Mul) => self.repair_mul(ctx, def_idx),
            Some(OpKind::Mod) => self.repair_mod(ctx, def_idx),
            Some(OpKind::Rem) => self.repair_rem(ctx, def_idx),
            Some(OpKind::Idiv) => self.repair_idiv(ctx, def_idx),
            Some(OpKind::Div) => self.repair_div(ctx, def_idx),
            Some(OpKind::Abs) => self.repair_abs(ctx, def_idx),
            Some(OpKind::ToInt) => self.repair_to_int(ctx, def_idx),
            Some(OpKind::ToReal) => self.repair_to_real(ctx, def_idx),
            Some(OpKind::Power) => self.repair_power(ctx, def_idx),
        }
    }

    fn repair_literal(&mut self, ctx: &mut C, lit: Literal) {
        let bv = lit.var();
        if let Some(ineq) = self.atom(bv) {
            if ineq.is_true() != ctx.is_true(Literal::positive(bv)) {
                ctx.flip(bv);
                self.stats.num_flips += 1;
            }
        }
    }

    fn reward(&mut self, ctx: &mut C, lit: Literal) -> f64 {
        if self.dscore_mode {
            self.dscore_reward(ctx, lit.var())
        } else {
            self.dtt_reward(ctx, lit)
        }
    }

    fn is_sat(&mut self, ctx: &C) -> bool {
        #[cfg(debug_assertions)]
        self.assert_invariants();
        for cl in 0..ctx.num_clauses() {
            let cl = sls_core::ClauseIdx(cl);
            let mut sat = false;
            for &lit in ctx.clause(cl) {
                if !ctx.is_true(lit) {
                    continue;
                }
                match self.atom(lit.var()) {
                    None => {
                        sat = true;
                        break;
                    }
                    Some(ineq) => {
                        if ineq.is_true() != lit.sign() {
                            sat = true;
                            break;
                        }
                    }
                }
            }
            if !sat {
                debug!(clause = cl.0, "clause not satisfied");
                return false;
            }
        }
        true
    }

    fn on_rescale(&mut self) {
        self.dscore_mode = true;
    }

    fn on_restart(&mut self, ctx: &mut C) {
        for bv in 0..ctx.num_bool_vars() {
            self.init_bool_var_assignment(ctx, BoolVar(bv));
        }
        self.check_ineqs(ctx);
    }
}

impl<N: Num> fmt::Display for ArithSls<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bv, ineq) in self.atoms.iter().enumerate() {
            if let Some(ineq) = ineq {
                writeln!(f, "b{bv}: {ineq}")?;
            }
        }
        for (i, vi) in self.vars.iter().enumerate() {
            write!(f, "v{i} := {} ", vi.value)?;
            if vi.lo.is_some() || vi.hi.is_some() {
                match &vi.lo {
                    Some(lo) => write!(f, "{}{}", if lo.strict { "(" } else { "[" }, lo.value)?,
                    None => write!(f, "(")?,
                }
                write!(f, " ")?;
                match &vi.hi {
                    Some(hi) => write!(f, "{}{}", hi.value, if hi.strict { ")" } else { "]" })?,
                    None => write!(f, ")")?,
                }
                write!(f, " ")?;
            }
            write!(f, "t{} :", vi.term.0)?;
            for (c, bv) in &vi.bool_vars {
                write!(f, " {c}@b{}", bv.0)?;
            }
            writeln!(f)?;
        }
        for md in &self.muls {
            write!(f, "{} := {} *", md.var, md.coeff)?;
            for w in &md.monomial {
                write!(f, " {w}")?;
            }
            writeln!(f)?;
        }
        for ad in &self.adds {
            write!(f, "{} :=", ad.var)?;
            let mut first = true;
            for (c, w) in &ad.term.args {
                write!(f, "{}{c} * {w}", if first { " " } else { " + " })?;
                first = false;
            }
            if !ad.term.coeff.is_zero() {
                write!(f, " + {}", ad.term.coeff)?;
            }
            writeln!(f)?;
        }
        for od in &self.ops {
            writeln!(f, "{} := {} {:?} {}", od.var, od.arg1, od.op, od.arg2)?;
        }
        Ok(())
    }
}
