//! Distance-to-truth aggregates, move scoring, and pivot selection.
//!
//! `dtt` answers "how far is this atom from the truth value the caller
//! wants"; `dts` lifts that to a clause as the minimum over its literals.
//! `cm_score` counts the net number of false clauses a candidate move makes
//! true; `dscore` is its clause-weighted cousin used after a rescale. The
//! reward routines rank a literal for the controller and, as a side effect,
//! stash the chosen pivot in the atom's `var_to_flip`.

use sls_core::{BoolVar, ClauseIdx, Context, Literal};

use crate::atom::Ineq;
use crate::engine::ArithSls;
use crate::num::Num;
use crate::var::VarId;

/// Sign of a Boolean variable under the controller assignment: `true` when
/// the positive literal is false.
pub(crate) fn bool_sign<C: Context>(ctx: &C, bv: BoolVar) -> bool {
    !ctx.is_true(Literal::positive(bv))
}

impl<N: Num> ArithSls<N> {
    /// Distance to truth of an atom if `v` moved to `new_value`; `1` when
    /// `v` does not occur in the atom.
    pub(crate) fn dtt_for_var(&self, sign: bool, ineq: &Ineq<N>, v: VarId, new_value: &N) -> N {
        match ineq.coeff_of(v) {
            Some(coeff) => ineq.dtt_shifted(sign, coeff, self.value(v), new_value),
            None => N::one(),
        }
    }

    /// Distance to truth of a clause: the minimum over its arithmetic
    /// literals, zero as soon as one is satisfied.
    pub(crate) fn compute_dts<C: Context>(&self, ctx: &C, cl: ClauseIdx) -> N {
        let mut d = N::one();
        let mut first = true;
        for &lit in ctx.clause(cl) {
            let Some(ineq) = self.atom(lit.var()) else {
                continue;
            };
            let d2 = ineq.dtt(lit.sign());
            if first {
                d = d2;
                first = false;
            } else if d2 < d {
                d = d2;
            }
            if d.is_zero() {
                break;
            }
        }
        d
    }

    /// Clause distance under a hypothetical move of `v`.
    pub(crate) fn dts_for_var<C: Context>(
        &self,
        ctx: &C,
        cl: ClauseIdx,
        v: VarId,
        new_value: &N,
    ) -> N {
        let mut d = N::one();
        let mut first = true;
        for &lit in ctx.clause(cl) {
            let Some(ineq) = self.atom(lit.var()) else {
                continue;
            };
            let d2 = self.dtt_for_var(lit.sign(), ineq, v, new_value);
            if first {
                d = d2;
                first = false;
            } else if d2 < d {
                d = d2;
            }
            if d.is_zero() {
                break;
            }
        }
        d
    }

    /// Net number of currently-false clauses made true minus true clauses
    /// made false if `v` moved to `new_value`. Available to controllers
    /// that rank candidate moves themselves.
    pub fn cm_score<C: Context>(&self, ctx: &C, v: VarId, new_value: &N) -> i32 {
        let mut score = 0;
        let vi = &self.vars[v.index()];
        let old_value = &vi.value;
        for (coeff, bv) in &vi.bool_vars {
            let Some(ineq) = self.atom(*bv) else { continue };
            let old_sign = bool_sign(ctx, *bv);
            let dtt_old = ineq.dtt(old_sign);
            let dtt_new = ineq.dtt_shifted(old_sign, coeff, old_value, new_value);
            if dtt_old.is_zero() == dtt_new.is_zero() {
                continue;
            }
            let mut lit = Literal::new(*bv, old_sign);
            if dtt_old.is_zero() {
                // the literal flips from true to false
                lit = lit.negated();
            }
            // lit flips from false to true
            for &cl in ctx.use_list(lit) {
                if ctx.clause_num_true(cl) == 0 {
                    score += 1;
                }
            }
            // clauses with several occurrences of v are scored per literal
            for &cl in ctx.use_list(lit.negated()) {
                if ctx.clause_num_true(cl) == 1 {
                    score -= 1;
                }
            }
        }
        score
    }

    /// Weighted sum over affected clauses of the drop in clause distance
    /// when `v` moves to `new_value`.
    pub(crate) fn dscore<C: Context>(&self, ctx: &C, v: VarId, new_value: &N) -> f64 {
        let mut score = 0.0;
        let vi = &self.vars[v.index()];
        for (_, bv) in &vi.bool_vars {
            let lit = Literal::positive(*bv);
            for &cl in ctx.use_list(lit) {
                let delta = self.compute_dts(ctx, cl) - self.dts_for_var(ctx, cl, v, new_value);
                score += delta.to_i64() as f64 * ctx.clause_weight(cl) as f64;
            }
            for &cl in ctx.use_list(lit.negated()) {
                let delta = self.compute_dts(ctx, cl) - self.dts_for_var(ctx, cl, v, new_value);
                score += delta.to_i64() as f64 * ctx.clause_weight(cl) as f64;
            }
        }
        score
    }

    /// Score every variable of the literal's atom by the net truth flips a
    /// critical move would cause, pick one by roulette wheel over the
    /// per-variable probabilities, stash it in `var_to_flip`, and return the
    /// best score seen.
    pub(crate) fn dtt_reward<C: Context>(&mut self, ctx: &mut C, lit: Literal) -> f64 {
        let bv = lit.var();
        let args = match self.atom(bv) {
            Some(ineq) => ineq.term.args.clone(),
            None => return -1.0,
        };
        if args.is_empty() {
            return -1.0;
        }
        let mut probs = std::mem::take(&mut self.probs);
        probs.clear();
        let mut max_result = -100.0f64;
        let mut ties = 0u32;
        let mut sum_prob = 0.0;
        for (coeff, x) in &args {
            let proposal = {
                let ineq = self.atom(bv).map(|ineq| self.cm_coeff(ctx, ineq, *x, coeff));
                ineq.flatten()
            };
            let prob = if self.is_fixed(*x) {
                0.0
            } else if let Some(new_value) = proposal {
                let mut result = 0.0f64;
                let old_value = self.value(*x).clone();
                for (coeff2, bv2) in &self.vars[x.index()].bool_vars {
                    let Some(atom2) = self.atom(*bv2) else { continue };
                    let old_sign = bool_sign(ctx, *bv2);
                    let dtt_old = atom2.dtt(old_sign);
                    let dtt_new = atom2.dtt_shifted(old_sign, coeff2, &old_value, &new_value);
                    if dtt_new.is_zero() && !dtt_old.is_zero() {
                        result += 1.0;
                    }
                    if !dtt_new.is_zero() && dtt_old.is_zero() {
                        result -= 1.0;
                    }
                }
                if result > max_result || max_result == -100.0 {
                    max_result = result;
                } else if result == max_result {
                    ties += 1;
                    if ctx.rand_below(ties) == 0 {
                        max_result = result;
                    }
                }
                if result < 0.0 {
                    0.1
                } else if result == 0.0 {
                    0.2
                } else {
                    result
                }
            } else {
                0.5
            };
            probs.push(prob);
            sum_prob += prob;
        }
        let mut lim = sum_prob * (f64::from(ctx.rand_u32()) / f64::from(u32::MAX));
        let mut i = probs.len();
        loop {
            i -= 1;
            lim -= probs[i];
            if lim < 0.0 || i == 0 {
                break;
            }
        }
        let chosen = args[i].1;
        if let Some(ineq) = self.atom_mut(bv) {
            ineq.var_to_flip = Some(chosen);
        }
        self.probs = probs;
        max_result
    }

    /// First variable whose critical move has positive weighted score wins;
    /// leaving dscore mode as a side effect.
    pub(crate) fn dscore_reward<C: Context>(&mut self, ctx: &mut C, bv: BoolVar) -> f64 {
        self.dscore_mode = false;
        let args = match self.atom(bv) {
            Some(ineq) => {
                debug_assert!(ineq.is_true() != bool_sign(ctx, bv));
                ineq.term.args.clone()
            }
            None => return 0.0,
        };
        for (coeff, v) in &args {
            let proposal = {
                let ineq = self.atom(bv).map(|ineq| self.cm_coeff(ctx, ineq, *v, coeff));
                ineq.flatten()
            };
            if let Some(new_value) = proposal {
                let result = self.dscore(ctx, *v, &new_value);
                // first positive score wins
                if result > 0.0 {
                    if let Some(ineq) = self.atom_mut(bv) {
                        ineq.var_to_flip = Some(*v);
                    }
                    return result;
                }
            }
        }
        0.0
    }
}
