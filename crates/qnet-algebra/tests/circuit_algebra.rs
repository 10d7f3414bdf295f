//! Tests for circuit normal forms, permutation factorization, feedback
//! resolution and network connection.

use qnet_algebra::{
    Circuit, Connection, cid, connect, factorize_for_rhs, map_signals_circuit, p_sigma,
};

fn sym(name: &str, cdim: usize) -> Circuit {
    Circuit::symbol(name, cdim)
}

fn perm(p: &[usize]) -> Circuit {
    p_sigma(p).unwrap()
}

fn concat(ops: &[&Circuit]) -> Circuit {
    Circuit::concatenation(ops.iter().map(|c| (*c).clone()).collect()).unwrap()
}

fn series(ops: &[&Circuit]) -> Circuit {
    Circuit::series_product(ops.iter().map(|c| (*c).clone()).collect()).unwrap()
}

// ---------------------------------------------------------------------------
// Distributive law
// ---------------------------------------------------------------------------

#[test]
fn series_distributes_over_common_blocks() {
    let a = sym("A", 2);
    let (b, c, d, e) = (sym("B", 1), sym("C", 1), sym("D", 1), sym("E", 1));

    let lhs = series(&[&concat(&[&a, &b]), &concat(&[&c, &d, &e])]);
    let expected = concat(&[
        &series(&[&a, &concat(&[&c, &d])]),
        &series(&[&b, &e]),
    ]);
    assert_eq!(lhs, expected);
}

#[test]
fn series_distributes_from_the_left() {
    let a = sym("A", 2);
    let (b, c, d, e) = (sym("B", 1), sym("C", 1), sym("D", 1), sym("E", 1));
    let cde = concat(&[&c, &d, &e]);
    let ab = concat(&[&a, &b]);

    let lhs = series(&[&cde, &ab]);
    let expected = concat(&[
        &series(&[&concat(&[&c, &d]), &a]),
        &series(&[&e, &b]),
    ]);
    assert_eq!(lhs, expected);
}

#[test]
fn series_distributes_over_three_factors() {
    let a = sym("A", 2);
    let (b, c, d, e) = (sym("B", 1), sym("C", 1), sym("D", 1), sym("E", 1));
    let cde = concat(&[&c, &d, &e]);
    let ab = concat(&[&a, &b]);
    let expected = concat(&[
        &series(&[&a, &concat(&[&c, &d]), &a]),
        &series(&[&b, &e, &b]),
    ]);

    let chained = ab.series(&cde).unwrap().series(&ab).unwrap();
    assert_eq!(chained, expected);
    assert_eq!(series(&[&ab, &cde, &ab]), expected);
}

#[test]
fn permutation_moves_right_through_blocks() {
    let a = sym("A", 2);
    let (b, c) = (sym("B", 1), sym("C", 1));
    let swap = perm(&[1, 0]);

    let lhs = series(&[&swap, &concat(&[&b, &c])]);
    assert_eq!(lhs, Circuit::Series(vec![concat(&[&c, &b]), swap.clone()]));

    let qtp = perm(&[0, 1, 3, 2]);
    let lhs = series(&[&qtp, &concat(&[&a, &b, &c])]);
    let rhs = series(&[&concat(&[&a, &c, &b]), &qtp]);
    assert_eq!(lhs, rhs);
}

#[test]
fn permutation_absorbed_by_affected_block() {
    let a = sym("A", 2);
    let (b, c) = (sym("B", 1), sym("C", 1));
    let swap = perm(&[1, 0]);

    let qtp = perm(&[0, 1, 3, 2]);
    let lhs = series(&[&qtp, &concat(&[&b, &c, &a])]);
    assert_eq!(lhs, concat(&[&b, &c, &series(&[&swap, &a])]));

    let qtp2 = perm(&[1, 0, 3, 2]);
    let lhs = series(&[&qtp2, &concat(&[&a, &b, &c])]);
    let expected = concat(&[
        &series(&[&swap, &a]),
        &series(&[&concat(&[&c, &b]), &swap]),
    ]);
    assert_eq!(lhs, expected);

    assert_eq!(series(&[&qtp, &qtp2]), perm(&[1, 0, 2, 3]));
}

// ---------------------------------------------------------------------------
// Permutation factorization
// ---------------------------------------------------------------------------

#[test]
fn factorize_moves_whole_blocks() {
    let (a1, a2, a3, a4) = (sym("A1", 1), sym("A2", 2), sym("A3", 3), sym("A4", 4));
    let p = [9, 4, 5, 6, 7, 8, 0, 1, 2, 3];
    let rhs = concat(&[&a1, &a2, &a3, &a4]);

    let (new_lhs, permuted_rhs, new_rhs) = factorize_for_rhs(&p, &rhs).unwrap();
    assert_eq!(new_lhs, cid(10));
    assert_eq!(permuted_rhs, concat(&[&a4, &a2, &a3, &a1]));
    assert_eq!(new_rhs, perm(&p));
}

#[test]
fn factorize_absorbs_permutations_within_blocks() {
    let (a1, a2, a3) = (sym("A1", 1), sym("A2", 2), sym("A3", 3));
    let rhs = concat(&[&a2, &a3, &a1]);

    let (new_lhs, permuted_rhs, new_rhs) = factorize_for_rhs(&[0, 1, 4, 2, 3, 5], &rhs).unwrap();
    assert_eq!(new_lhs, cid(6));
    assert_eq!(
        permuted_rhs,
        concat(&[&a2, &series(&[&perm(&[2, 0, 1]), &a3]), &a1])
    );
    assert_eq!(new_rhs, cid(6));
}

#[test]
fn factorize_leaves_remainder_on_the_left() {
    let a = sym("A", 2);
    let rhs = concat(&[&cid(1), &a, &cid(1)]);

    let (new_lhs, permuted_rhs, new_rhs) = factorize_for_rhs(&[0, 3, 1, 2], &rhs).unwrap();
    assert_eq!(new_lhs, perm(&[0, 1, 3, 2]));
    assert_eq!(
        permuted_rhs,
        concat(&[&cid(1), &series(&[&perm(&[1, 0]), &a]), &cid(1)])
    );
    assert_eq!(new_rhs, cid(4));
}

#[test]
fn factorize_moves_block_past_identities() {
    let a = sym("A", 2);
    let p = perm(&[0, 3, 1, 2]);
    let p_r = perm(&[2, 0, 1]);
    assert_eq!(p, concat(&[&cid(1), &p_r]));

    let (new_lhs, permuted_rhs, new_rhs) =
        factorize_for_rhs(&[0, 3, 1, 2], &concat(&[&cid(2), &a])).unwrap();
    assert_eq!(new_lhs, cid(4));
    assert_eq!(permuted_rhs, concat(&[&cid(1), &a, &cid(1)]));
    assert_eq!(new_rhs, p);
}

#[test]
fn inverse_permutation_in_front_of_block() {
    let a = sym("A", 2);
    let p = perm(&[0, 3, 1, 2]);
    let p_r = perm(&[2, 0, 1]);
    let rhs = concat(&[&cid(2), &a]);
    let p_inv = p.series_inverse().unwrap();

    let expected = concat(&[
        &cid(1),
        &Circuit::Series(vec![
            perm(&[0, 2, 1]),
            Circuit::Concatenation(vec![
                Circuit::Series(vec![perm(&[1, 0]), a.clone()]),
                cid(1),
            ]),
            perm(&[2, 0, 1]),
        ]),
    ]);
    assert_eq!(series(&[&p_inv, &rhs]), expected);

    let sandwiched = p_inv.series(&rhs).unwrap().series(&p).unwrap();
    let inner = series(&[
        &p_r.series_inverse().unwrap(),
        &concat(&[&cid(1), &a]),
        &p_r,
    ]);
    assert_eq!(sandwiched, concat(&[&cid(1), &inner]));
}

#[test]
fn factorize_with_trailing_identity() {
    let a4 = sym("A4", 4);
    let rhs = concat(&[&a4, &cid(1)]);

    let (new_lhs, permuted_rhs, new_rhs) = factorize_for_rhs(&[4, 2, 1, 3, 0], &rhs).unwrap();
    assert_eq!(new_lhs, cid(5));
    assert_eq!(
        permuted_rhs,
        concat(&[&cid(1), &series(&[&perm(&[3, 1, 0, 2]), &a4])])
    );
    assert_eq!(new_rhs, map_signals_circuit(&[(4, 0)], 5).unwrap());
}

#[test]
fn factorize_mixed_block_structure() {
    let nand = sym("NAND1", 4);
    let rhs = concat(&[&cid(3), &nand]);

    let (new_lhs, permuted_rhs, new_rhs) =
        factorize_for_rhs(&[3, 4, 5, 0, 1, 6, 2], &rhs).unwrap();
    assert_eq!(new_lhs, perm(&[0, 1, 2, 6, 3, 4, 5]));
    assert_eq!(
        permuted_rhs,
        concat(&[&series(&[&perm(&[0, 1, 3, 2]), &nand]), &cid(3)])
    );
    assert_eq!(new_rhs, perm(&[4, 5, 6, 0, 1, 2, 3]));
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

fn feedback_symbols() -> (Circuit, Circuit, Circuit, Circuit, Circuit, Circuit) {
    (
        sym("A", 3),
        sym("B", 2),
        sym("C", 1),
        sym("D", 1),
        sym("A1", 1),
        sym("A2", 1),
    )
}

#[test]
fn feedback_acts_on_the_affected_block() {
    let (a, b, c, ..) = feedback_symbols();
    let fb_b = b.feedback_last().unwrap();

    assert_eq!(
        concat(&[&a, &b]).feedback_last().unwrap(),
        concat(&[&a, &fb_b])
    );
    assert_eq!(
        concat(&[&b, &c]).feedback(1, 1).unwrap(),
        concat(&[&fb_b, &c])
    );
}

#[test]
fn feedback_through_signal_permutations() {
    let (_, b, c, ..) = feedback_symbols();
    let fb_b = b.feedback_last().unwrap();
    let smq = map_signals_circuit(&[(2, 1)], 3).unwrap();
    assert_eq!(smq, smq.series_inverse().unwrap());

    let routed = series(&[&smq, &concat(&[&b, &c])]);
    assert_eq!(routed.feedback(2, 1).unwrap(), concat(&[&fb_b, &c]));

    let sandwiched = series(&[&smq, &concat(&[&b, &c]), &smq]);
    assert_eq!(sandwiched.feedback_last().unwrap(), concat(&[&fb_b, &c]));
}

#[test]
fn feedback_resolves_into_series() {
    let (a, b, c, d, a1, a2) = feedback_symbols();

    let looped = b.feedback(1, 0).unwrap();
    let substituted = looped
        .substitute(&[(b.clone(), concat(&[&c, &d]))])
        .unwrap();
    assert_eq!(substituted, series(&[&c, &d]));

    let expr = series(&[&a, &concat(&[&b, &cid(1)])]);
    let expected = series(&[&a.feedback_last().unwrap(), &b]);
    assert_eq!(expr.feedback_last().unwrap(), expected);

    let expr = series(&[
        &a,
        &concat(&[&b, &cid(1)]),
        &concat(&[&cid(1), &perm(&[1, 0])]),
    ]);
    assert_eq!(expr.feedback(2, 1).unwrap(), expected);

    let expr = series(&[
        &a,
        &concat(&[&cid(1), &perm(&[1, 0])]),
        &concat(&[&b, &cid(1)]),
        &concat(&[&cid(1), &perm(&[1, 0])]),
    ]);
    assert_eq!(
        expr.feedback(1, 1).unwrap(),
        series(&[&a.feedback(1, 1).unwrap(), &b])
    );

    let split = [(b.clone(), concat(&[&a1, &a2]))];
    let expr = series(&[&b, &concat(&[&cid(1), &c])]);
    assert_eq!(
        expr.feedback(0, 1).unwrap().substitute(&split).unwrap(),
        series(&[&a2, &c, &a1])
    );

    let expr = series(&[&concat(&[&cid(1), &c]), &perm(&[1, 0]), &b]);
    assert_eq!(
        expr.feedback(1, 1).unwrap().substitute(&split).unwrap(),
        series(&[&a2, &c, &a1])
    );
}

#[test]
fn feedback_closes_loop_through_two_components() {
    let (_, b, c, d, a1, a2) = feedback_symbols();
    let split = [(b.clone(), concat(&[&a1, &a2]))];

    let expr = series(&[
        &concat(&[&cid(1), &c]),
        &perm(&[1, 0]),
        &b,
        &concat(&[&cid(1), &d]),
    ]);
    assert_eq!(
        expr.feedback(1, 1).unwrap().substitute(&split).unwrap(),
        series(&[&a2, &d, &c, &a1])
    );
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

#[test]
fn connect_two_components_in_series() {
    let (a, b) = (sym("A", 1), sym("B", 1));
    let res = connect(&[a.clone(), b.clone()], &[Connection::new((0, 0), (1, 0))]).unwrap();
    assert_eq!(res, series(&[&b, &a]));
}

#[test]
fn connect_into_a_two_channel_component() {
    let (a, c) = (sym("A", 1), sym("C", 2));
    let res = connect(&[a.clone(), c.clone()], &[Connection::new((0, 0), (1, 0))]).unwrap();
    assert_eq!(res, series(&[&c, &concat(&[&a, &cid(1)])]));
}

#[test]
fn connect_two_sources_into_one_sink() {
    let (a, b, c) = (sym("A", 1), sym("B", 1), sym("C", 2));
    let res = connect(
        &[a.clone(), b.clone(), c.clone()],
        &[
            Connection::new((0, 0), (2, 0)),
            Connection::new((1, 0), (2, 1)),
        ],
    )
    .unwrap();
    assert_eq!(res, series(&[&c, &concat(&[&a, &b])]));
}

#[test]
fn connect_rejects_bad_references() {
    let (a, b) = (sym("A", 1), sym("B", 1));
    assert!(connect(&[a.clone(), b.clone()], &[Connection::new((0, 0), (2, 0))]).is_err());
    assert!(connect(&[a, b], &[Connection::new((0, 1), (1, 0))]).is_err());
}
