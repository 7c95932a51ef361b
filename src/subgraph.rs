// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The subgraph dependency analyzer (§4.7): computes which dependents
//! structurally depend on which independents by forward-reachability
//! labelling followed by one backward traversal per selected dependent.
//!
//! Link to [parent module](super)
//!
//! Grounded on the backward-traversal-with-re-labelling trick used by
//! `function::subgraph::sub_sparsity` elsewhere in this lineage
//! (`done[var_index] != row` reused across rows instead of a fresh
//! visited-set per row); extended here with the forward reachability
//! pass (Phase A) and `User` atomic-call-boundary handling that a
//! simpler operator model would not need.

use crate::op::{ArgKind, OpId};
use crate::tape::Tape;

/// Collapses every op inside a `User...User` bracket (the bracket's
/// own markers included) to the index of its opening `User` op, so the
/// whole atomic call is treated as one dependency-graph node (§4.7
/// `map_user_op`). Ops outside any bracket map to themselves.
fn build_user_group<B>(tape: &Tape<B>) -> Vec<usize> {
    let n_op = tape.num_op();
    let mut group = vec![0usize; n_op];
    let mut open: Option<usize> = None;
    for i in 0..n_op {
        let op = tape.get_op_info(i).op;
        match op {
            OpId::User => match open {
                None => {
                    group[i] = i;
                    open = Some(i);
                }
                Some(begin) => {
                    group[i] = begin;
                    open = None;
                }
            },
            OpId::UsrAp | OpId::UsrAv | OpId::UsrRp | OpId::UsrRv => {
                group[i] = open.expect("subgraph: usr marker outside a User bracket");
            }
            _ => group[i] = i,
        }
    }
    group
}

fn producer<B>(tape: &Tape<B>, user_group: &[usize], vid: usize) -> usize {
    user_group[tape.var2op(vid)]
}

/// Variable-argument op indices (after [build_user_group] collapsing)
/// that op `i` reads from, for the purpose of dependency propagation.
/// For a `User` begin marker this scans the bracket's `UsrAv` argument
/// markers (§4.7 "gather all variable arguments of the call").
fn variable_arg_producers<B>(tape: &Tape<B>, user_group: &[usize], i: usize) -> Vec<usize> {
    let info = tape.get_op_info(i);
    if info.op == OpId::User && user_group[i] == i {
        let n_in = info.args[1] as usize;
        let mut out = Vec::with_capacity(n_in);
        for s in 0..n_in {
            let a = tape.get_op_info(i + 1 + s);
            if a.op == OpId::UsrAv {
                out.push(producer(tape, user_group, a.args[0] as usize));
            }
        }
        out
    } else {
        info.args
            .iter()
            .zip(info.arg_type.iter())
            .filter(|&(_, &kind)| kind == ArgKind::Var)
            .map(|(&raw, _)| producer(tape, user_group, raw as usize))
            .collect()
    }
}

/// Phase A: forward reachability labelling. `in_subgraph[i]` becomes
/// `depend_yes` iff op `i` (collapsed through a `User` bracket) has a
/// variable argument reachable from a selected independent, and
/// `depend_no` otherwise; ops with no result (comparisons) and
/// non-begin bracket members are always `depend_no` -- their begin op
/// carries the label for the whole call (§4.7 Phase A).
fn label_reachability<B>(
    tape: &Tape<B>,
    user_group: &[usize],
    select_domain: &[bool],
    depend_yes: usize,
    depend_no: usize,
) -> Vec<usize> {
    assert_eq!(select_domain.len(), tape.num_domain(), "sub_sparsity: select_domain has the wrong length");
    let n_op = tape.num_op();
    let mut in_subgraph = vec![depend_no; n_op];
    let mut ind_count = 0usize;
    for i in 0..n_op {
        let info = tape.get_op_info(i);
        match info.op {
            OpId::Begin | OpId::End => in_subgraph[i] = depend_no,
            OpId::Inv => {
                let j = ind_count;
                ind_count += 1;
                in_subgraph[i] = if select_domain[j] { depend_yes } else { depend_no };
            }
            OpId::UsrAp | OpId::UsrAv | OpId::UsrRp | OpId::UsrRv => {
                in_subgraph[i] = depend_no;
            }
            OpId::User if user_group[i] != i => {
                // closing marker of the bracket; its begin carries the label.
                in_subgraph[i] = depend_no;
            }
            _ if info.op.n_res() > 0 || info.op == OpId::User => {
                let yes = variable_arg_producers(tape, user_group, i)
                    .into_iter()
                    .any(|p| in_subgraph[p] == depend_yes);
                in_subgraph[i] = if yes { depend_yes } else { depend_no };
            }
            _ => in_subgraph[i] = depend_no,
        }
    }
    in_subgraph
}

/// Computes the dependency sparsity pattern: for every selected
/// dependent `row` (`select_range[row]`) and every selected independent
/// `j` such that `row` depends on `j`, `(row, j)` appears in the result
/// (§4.7). This is a *dependency* pattern, not a derivative-value
/// pattern: a `CondExp`-selected branch counts as a dependency even
/// when the live derivative through it happens to be zero.
///
/// Re-uses Phase A's `in_subgraph` labelling as the per-dependent
/// visited marker of Phase B (the "re-labelling trick" of §4.7): once
/// `row` has been drained, every op it touched carries label `row`
/// (`< depend_yes`), so a later dependent's traversal can tell "already
/// visited for dependent row" apart from "still unvisited" without
/// reallocating a fresh visited set.
pub fn dependency_pattern<B>(
    tape: &Tape<B>,
    select_domain: &[bool],
    select_range: &[bool],
    trace: bool,
) -> Vec<(usize, usize)> {
    assert_eq!(select_range.len(), tape.num_range(), "sub_sparsity: select_range has the wrong length");
    let user_group = build_user_group(tape);
    let depend_yes = tape.num_range();
    let depend_no = depend_yes + 1;
    let mut in_subgraph = label_reachability(tape, &user_group, select_domain, depend_yes, depend_no);

    if trace {
        println!("Begin Trace: sub_sparsity: n_domain = {}, n_range = {}", tape.num_domain(), tape.num_range());
    }

    let mut result = Vec::new();
    let mut worklist = Vec::new();
    for row in 0..tape.num_range() {
        if !select_range[row] || tape.dep_is_parameter(row) {
            continue;
        }
        let dep_vid = tape.dep_taddr()[row] as usize;
        let start = producer(tape, &user_group, dep_vid);
        if in_subgraph[start] > depend_yes {
            continue;
        }
        worklist.clear();
        worklist.push(start);
        in_subgraph[start] = row;
        if trace {
            println!("row {row}, var_index {dep_vid}");
        }
        while let Some(i) = worklist.pop() {
            let op = tape.get_op_info(i).op;
            if op == OpId::Inv {
                let j = i - 1;
                result.push((row, j));
                continue;
            }
            for p in variable_arg_producers(tape, &user_group, i) {
                if in_subgraph[p] <= depend_yes && in_subgraph[p] != row {
                    in_subgraph[p] = row;
                    worklist.push(p);
                }
            }
        }
    }
    if trace {
        println!("End Trace: sub_sparsity: n_pattern = {}", result.len());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::ad_fun;
    use crate::record::independent;
    use crate::sparsity::PackSetVec;
    use crate::sweep::sparse::for_sparse_jac;

    #[test]
    fn each_domain_component_depends_on_itself_through_square() {
        let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
        let ay = vec![ax[0] * ax[0], ax[1] * ax[1], ax[2] * ax[2]];
        let f = ad_fun(&ay);
        let mut pattern = f.sub_sparsity(&[true, true, true], &[true, true, true], false);
        pattern.sort();
        assert_eq!(pattern, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn s5_subgraph_matches_sparse_jac_pattern() {
        // S5: f(x1,x2,x3) = (x1*x3, x2+x3); {(0,0),(0,2),(1,1),(1,2)}
        let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
        let ay = vec![ax[0] * ax[2], ax[1] + ax[2]];
        let f = ad_fun(&ay);
        let mut pattern = f.sub_sparsity(&[true, true, true], &[true, true], false);
        pattern.sort();
        assert_eq!(pattern, vec![(0, 0), (0, 2), (1, 1), (1, 2)]);
    }

    #[test]
    fn subgraph_equals_dense_dependency_for_all_true_selection() {
        // Property 5: subgraph(all true, all true) == for_sparse_jac(I) pattern.
        let ax = independent::<f64>(&[1.0, 2.0, 3.0]);
        let ay = vec![(ax[0] * ax[1]).sin() + ax[2], ax[2].cos()];
        let f = ad_fun(&ay);
        let n = f.domain();
        let mut r = PackSetVec::new();
        r.resize(n, n);
        for j in 0..n {
            r.add_element(j, j);
        }
        let jac = for_sparse_jac(f.tape(), n, &r);
        let mut dense: Vec<(usize, usize)> = Vec::new();
        for i in 0..f.range() {
            for j in jac.iter_row(i) {
                dense.push((i, j));
            }
        }
        dense.sort();
        let mut sub = f.sub_sparsity(&vec![true; n], &vec![true; f.range()], false);
        sub.sort();
        assert_eq!(sub, dense);
    }

    #[test]
    fn unselected_independent_is_excluded() {
        let ax = independent::<f64>(&[1.0, 2.0]);
        let ay = vec![ax[0] + ax[1]];
        let f = ad_fun(&ay);
        let pattern = f.sub_sparsity(&[true, false], &[true], false);
        assert_eq!(pattern, vec![(0, 0)]);
    }
}
