//! A small, in-process constraint-programming engine exposing the abstract
//! CP-SAT-shaped capability the block scheduler is built against: bool/int
//! variables, linear (in)equalities optionally reified behind an enforcement
//! literal, a linear objective, warm-start hints, and a time-bounded `solve`.
//!
//! Internally this is bound-consistency propagation (tighten each variable's
//! domain from every constraint it appears in, to a fixpoint) plus a
//! branch-and-bound depth-first search over boolean decision variables, with
//! objective-lower-bound pruning. It is exact: given enough time it always
//! finds the true optimum, and a model with no feasible assignment is always
//! correctly reported infeasible. The only effect of the time limit is on
//! *how much* of the search space gets explored before an incumbent is
//! returned as merely feasible rather than proven optimal.

use std::time::{Duration, Instant};

/// A variable handle into a `Model`. Opaque outside this module other than
/// for indexing into a `Solution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub usize);

/// A boolean literal: a variable together with the value that "satisfies" it.
#[derive(Debug, Clone, Copy)]
pub struct Lit {
    pub var: Var,
    pub value: bool,
}

impl Var {
    pub fn at(self, value: bool) -> Lit {
        Lit { var: self, value }
    }

    pub fn is_true(self) -> Lit {
        self.at(true)
    }

    pub fn is_false(self) -> Lit {
        self.at(false)
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Eq,
    Le,
    Ge,
}

#[derive(Debug, Clone)]
struct Constraint {
    terms: Vec<(i64, Var)>,
    rhs: i64,
    op: Op,
    enforcement: Vec<Lit>,
}

/// A growable constraint system. Construct variables and constraints, set an
/// objective, then call [`Model::solve`].
#[derive(Debug, Default)]
pub struct Model {
    lb: Vec<i64>,
    ub: Vec<i64>,
    is_bool: Vec<bool>,
    constraints: Vec<Constraint>,
    objective: Vec<(i64, Var)>,
    hints: Vec<Option<i64>>,
}

/// A solve outcome: whether a solution was found and proved optimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A solution was found and proven to minimize the objective.
    Optimal,
    /// A solution was found but the time limit was hit before optimality
    /// could be proven (or there is no objective to optimize).
    Feasible,
    /// No feasible assignment exists.
    Infeasible,
}

/// The result of a [`Model::solve`] call.
pub struct Solution {
    pub status: Status,
    values: Vec<i64>,
}

impl Solution {
    pub fn value(&self, var: Var) -> i64 {
        self.values[var.0]
    }

    pub fn bool_value(&self, var: Var) -> bool {
        self.values[var.0] != 0
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Status::Optimal | Status::Feasible)
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_bool_var(&mut self) -> Var {
        self.lb.push(0);
        self.ub.push(1);
        self.is_bool.push(true);
        self.hints.push(None);
        Var(self.lb.len() - 1)
    }

    pub fn new_int_var(&mut self, lo: i64, hi: i64) -> Var {
        assert!(lo <= hi, "int var domain must be non-empty");
        self.lb.push(lo);
        self.ub.push(hi);
        self.is_bool.push(false);
        self.hints.push(None);
        Var(self.lb.len() - 1)
    }

    fn add(&mut self, terms: Vec<(i64, Var)>, op: Op, rhs: i64) -> usize {
        self.constraints.push(Constraint {
            terms,
            rhs,
            op,
            enforcement: Vec::new(),
        });
        self.constraints.len() - 1
    }

    /// `sum(terms) == rhs`. Returns a constraint id usable with [`Model::only_enforce_if`].
    pub fn add_eq(&mut self, terms: Vec<(i64, Var)>, rhs: i64) -> usize {
        self.add(terms, Op::Eq, rhs)
    }

    /// `sum(terms) <= rhs`.
    pub fn add_le(&mut self, terms: Vec<(i64, Var)>, rhs: i64) -> usize {
        self.add(terms, Op::Le, rhs)
    }

    /// `sum(terms) >= rhs`.
    pub fn add_ge(&mut self, terms: Vec<(i64, Var)>, rhs: i64) -> usize {
        self.add(terms, Op::Ge, rhs)
    }

    /// Make a previously added constraint conditional: it is only enforced
    /// when every given literal holds. Calling this more than once on the
    /// same constraint ANDs the literals together.
    pub fn only_enforce_if(&mut self, constraint: usize, lit: Lit) {
        self.constraints[constraint].enforcement.push(lit);
    }

    /// A best-effort hint for the search; ignored by the final result, used
    /// only to order which branch is tried first.
    pub fn add_hint(&mut self, var: Var, value: i64) {
        self.hints[var.0] = Some(value);
    }

    /// Set (or replace) the linear objective to minimize.
    pub fn minimize(&mut self, terms: Vec<(i64, Var)>) {
        self.objective = terms;
    }

    /// Solve the model. `seed` and `num_workers` are accepted for interface
    /// parity with the abstract capability, but this single-threaded engine's
    /// branching order does not depend on either. Determinism is carried by
    /// the caller folding `seed` into the objective's tie-breaker terms, not
    /// by engine-internal randomness.
    pub fn solve(&self, _seed: u32, time_limit: Duration, _num_workers: usize) -> Solution {
        let n = self.lb.len();
        let mut lb = self.lb.clone();
        let mut ub = self.ub.clone();

        if !propagate(&mut lb, &mut ub, &self.constraints) {
            return Solution {
                status: Status::Infeasible,
                values: vec![0; n],
            };
        }

        let start = Instant::now();
        let mut timed_out = false;
        let mut best: Option<(i64, Vec<i64>)> = None;
        self.search(&mut lb, &mut ub, start, time_limit, &mut timed_out, &mut best);

        match best {
            Some((_, values)) => Solution {
                status: if timed_out {
                    Status::Feasible
                } else {
                    Status::Optimal
                },
                values,
            },
            None => Solution {
                status: Status::Infeasible,
                values: vec![0; n],
            },
        }
    }

    fn objective_lower_bound(&self, lb: &[i64], ub: &[i64]) -> i64 {
        self.objective
            .iter()
            .map(|&(coeff, v)| {
                if coeff >= 0 {
                    coeff * lb[v.0]
                } else {
                    coeff * ub[v.0]
                }
            })
            .sum()
    }

    fn objective_value(&self, values: &[i64]) -> i64 {
        self.objective.iter().map(|&(c, v)| c * values[v.0]).sum()
    }

    fn pick_branch_var(&self, lb: &[i64], ub: &[i64]) -> Option<Var> {
        (0..lb.len())
            .find(|&i| self.is_bool[i] && lb[i] != ub[i])
            .map(Var)
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        lb: &mut Vec<i64>,
        ub: &mut Vec<i64>,
        start: Instant,
        time_limit: Duration,
        timed_out: &mut bool,
        best: &mut Option<(i64, Vec<i64>)>,
    ) {
        if start.elapsed() >= time_limit {
            *timed_out = true;
            return;
        }

        if !self.objective.is_empty() {
            let lo = self.objective_lower_bound(lb, ub);
            if let Some((bv, _)) = best {
                if lo >= *bv {
                    return;
                }
            }
        }

        match self.pick_branch_var(lb, ub) {
            None => {
                if check_all(&self.constraints, lb) {
                    let obj = self.objective_value(lb);
                    let better = match best {
                        Some((bv, _)) => obj < *bv,
                        None => true,
                    };
                    if better {
                        *best = Some((obj, lb.clone()));
                    }
                }
            }
            Some(v) => {
                let order = self.branch_order(v);
                for val in order {
                    let mut lb2 = lb.clone();
                    let mut ub2 = ub.clone();
                    lb2[v.0] = val;
                    ub2[v.0] = val;
                    if propagate(&mut lb2, &mut ub2, &self.constraints) {
                        self.search(&mut lb2, &mut ub2, start, time_limit, timed_out, best);
                        if *timed_out {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn branch_order(&self, v: Var) -> [i64; 2] {
        match self.hints[v.0] {
            Some(0) => [0, 1],
            _ => [1, 0],
        }
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) == (b < 0) {
        q + 1
    } else {
        q
    }
}

/// `true` when every enforcement literal of `c` is currently fixed to its
/// required value. A constraint with no enforcement literals is always
/// active. A constraint whose enforcement is still undecided is treated as
/// inactive *for propagation purposes only* (sound: we simply under-propagate
/// until the literal is fixed); [`check_all`] re-validates the real
/// enforcement semantics once every variable is fixed, at each search leaf.
fn is_enforced(c: &Constraint, lb: &[i64], ub: &[i64]) -> Option<bool> {
    for lit in &c.enforcement {
        let i = lit.var.0;
        if lb[i] != ub[i] {
            return None;
        }
        let want = if lit.value { 1 } else { 0 };
        if lb[i] != want {
            return Some(false);
        }
    }
    Some(true)
}

/// Tighten `lb`/`ub` to a fixpoint using bound-consistency propagation over
/// every active constraint. Returns `false` on a detected domain wipeout
/// (the model, or this branch, is infeasible).
fn propagate(lb: &mut [i64], ub: &mut [i64], constraints: &[Constraint]) -> bool {
    loop {
        let mut changed = false;
        for c in constraints {
            match is_enforced(c, lb, ub) {
                Some(false) | None => continue,
                Some(true) => {}
            }
            match c.op {
                Op::Le => {
                    if !tighten_le(&c.terms, c.rhs, lb, ub, &mut changed) {
                        return false;
                    }
                }
                Op::Ge => {
                    let neg: Vec<(i64, Var)> = c.terms.iter().map(|&(co, v)| (-co, v)).collect();
                    if !tighten_le(&neg, -c.rhs, lb, ub, &mut changed) {
                        return false;
                    }
                }
                Op::Eq => {
                    if !tighten_le(&c.terms, c.rhs, lb, ub, &mut changed) {
                        return false;
                    }
                    let neg: Vec<(i64, Var)> = c.terms.iter().map(|&(co, v)| (-co, v)).collect();
                    if !tighten_le(&neg, -c.rhs, lb, ub, &mut changed) {
                        return false;
                    }
                }
            }
        }
        if !changed {
            return true;
        }
    }
}

/// Bound-consistency tightening for `sum(terms) <= rhs`: for each term with
/// nonzero coefficient, derive the tightest bound on its variable implied by
/// the worst case of every other term, using each other variable's current
/// domain. Returns `false` on domain wipeout.
fn tighten_le(terms: &[(i64, Var)], rhs: i64, lb: &mut [i64], ub: &mut [i64], changed: &mut bool) -> bool {
    let min_contribution = |coeff: i64, v: Var| -> i64 {
        if coeff >= 0 {
            coeff * lb[v.0]
        } else {
            coeff * ub[v.0]
        }
    };

    let total_min: i64 = terms.iter().map(|&(c, v)| min_contribution(c, v)).sum();
    if total_min > rhs {
        return false;
    }

    for &(coeff, v) in terms {
        if coeff == 0 {
            continue;
        }
        let others_min = total_min - min_contribution(coeff, v);
        let remaining = rhs - others_min;
        if coeff > 0 {
            let new_ub = floor_div(remaining, coeff);
            if new_ub < ub[v.0] {
                ub[v.0] = new_ub;
                *changed = true;
            }
        } else {
            let new_lb = ceil_div(remaining, coeff);
            if new_lb > lb[v.0] {
                lb[v.0] = new_lb;
                *changed = true;
            }
        }
        if lb[v.0] > ub[v.0] {
            return false;
        }
    }
    true
}

/// Final, from-scratch validation of a fully-fixed assignment against every
/// constraint, including enforcement semantics. Used as the acceptance test
/// for a search leaf so that propagation's conservative treatment of
/// undecided enforcement literals can never mask a real violation.
fn check_all(constraints: &[Constraint], values: &[i64]) -> bool {
    for c in constraints {
        let enforced = c
            .enforcement
            .iter()
            .all(|lit| (values[lit.var.0] != 0) == lit.value);
        if !enforced {
            continue;
        }
        let sum: i64 = c.terms.iter().map(|&(coeff, v)| coeff * values[v.0]).sum();
        let ok = match c.op {
            Op::Eq => sum == c.rhs,
            Op::Le => sum <= c.rhs,
            Op::Ge => sum >= c.rhs,
        };
        if !ok {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_of_three() {
        let mut m = Model::new();
        let vars: Vec<Var> = (0..3).map(|_| m.new_bool_var()).collect();
        m.add_eq(vars.iter().map(|&v| (1, v)).collect(), 1);
        let sol = m.solve(1, Duration::from_secs(2), 1);
        assert_eq!(sol.status, Status::Optimal);
        let count = vars.iter().filter(|&&v| sol.bool_value(v)).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn infeasible_two_must_both_be_true_and_sum_le_one() {
        let mut m = Model::new();
        let a = m.new_bool_var();
        let b = m.new_bool_var();
        m.add_eq(vec![(1, a)], 1);
        m.add_eq(vec![(1, b)], 1);
        m.add_le(vec![(1, a), (1, b)], 1);
        let sol = m.solve(1, Duration::from_secs(1), 1);
        assert_eq!(sol.status, Status::Infeasible);
    }

    #[test]
    fn minimizes_objective() {
        // Pick exactly 2 of 4 bools, minimize sum of weighted costs.
        let mut m = Model::new();
        let vars: Vec<Var> = (0..4).map(|_| m.new_bool_var()).collect();
        m.add_eq(vars.iter().map(|&v| (1, v)).collect(), 2);
        let costs = [5, 1, 1, 9];
        m.minimize(vars.iter().zip(costs).map(|(&v, c)| (c, v)).collect());
        let sol = m.solve(1, Duration::from_secs(2), 1);
        assert_eq!(sol.status, Status::Optimal);
        assert_eq!(sol.value(vars[1]) + sol.value(vars[2]), 2);
        assert_eq!(sol.value(vars[0]) + sol.value(vars[3]), 0);
    }

    #[test]
    fn reified_constraint_only_applies_when_enabled() {
        let mut m = Model::new();
        let enable = m.new_bool_var();
        let x = m.new_bool_var();
        m.add_eq(vec![(1, enable)], 0); // force enable = false
        let c = m.add_eq(vec![(1, x)], 1); // x == 1, but only if enable
        m.only_enforce_if(c, enable.is_true());
        m.minimize(vec![(1, x)]);
        let sol = m.solve(1, Duration::from_secs(1), 1);
        assert_eq!(sol.status, Status::Optimal);
        assert!(!sol.bool_value(x));
    }

    #[test]
    fn derived_int_var_pinned_by_equality() {
        let mut m = Model::new();
        let a = m.new_bool_var();
        let b = m.new_bool_var();
        m.add_eq(vec![(1, a)], 1);
        m.add_eq(vec![(1, b)], 0);
        let idx = m.new_int_var(0, 5);
        m.add_eq(vec![(2, a), (3, b), (-1, idx)], 0);
        let sol = m.solve(1, Duration::from_secs(1), 1);
        assert_eq!(sol.status, Status::Optimal);
        assert_eq!(sol.value(idx), 2);
    }
}
