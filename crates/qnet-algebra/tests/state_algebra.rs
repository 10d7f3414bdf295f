//! Tests for operator actions on composite states.

use std::f64::consts::PI;

use num_complex::Complex64;
use qnet_algebra::{Ket, LocalSpace, Operator, Scalar};

fn qubit() -> LocalSpace {
    LocalSpace::new("q").with_basis(["g", "e"])
}

#[test]
fn jaynes_cummings_exchanges_one_excitation() {
    let a = Operator::destroy("c");
    let sigma_eg = Operator::sigma(qubit(), "e", "g");
    let h = a.adjoint() * sigma_eg.adjoint() + a * sigma_eg;

    let start = Ket::basis_at("c", 1)
        .unwrap()
        .tensor(&Ket::basis(qubit(), "g").unwrap())
        .unwrap();
    let expected = Ket::basis_at("c", 0)
        .unwrap()
        .tensor(&Ket::basis(qubit(), "e").unwrap())
        .unwrap();
    assert_eq!(h.act_on(&start).unwrap(), expected);
}

#[test]
fn displacements_compose_on_vacuum() {
    let d = Operator::displace("c", 1.0) * Operator::displace("c", 2.0);
    let vacuum = Ket::basis_at("c", 0).unwrap();
    assert_eq!(d.act_on(&vacuum).unwrap(), Ket::coherent("c", 3.0));
}

#[test]
fn symbolic_amplitude_is_eigenvalue() {
    let alpha = Scalar::symbol("alpha");
    let coh = Ket::coherent("c", alpha.clone());
    assert_eq!(
        Operator::destroy("c").act_on(&coh).unwrap(),
        alpha * coh
    );
}

#[test]
fn superposition_is_acted_on_termwise() {
    let a = Operator::destroy("c");
    let psi = Ket::sum([
        Ket::basis_at("c", 0).unwrap(),
        Ket::basis_at("c", 1).unwrap(),
    ])
    .unwrap();
    assert_eq!(a.act_on(&psi).unwrap(), Ket::basis_at("c", 0).unwrap());
}

#[test]
fn unresolved_actions_nest() {
    let b = Operator::symbol("B", LocalSpace::new("c"));
    let psi = Ket::symbol("psi", LocalSpace::new("c"));
    let once = b.act_on(&psi).unwrap();
    assert!(matches!(once, Ket::OperatorTimes(..)));
    let twice = b.act_on(&once).unwrap();
    assert_eq!(twice, Ket::OperatorTimes(b.clone() * b, Box::new(psi)));
}

#[test]
fn kets_serialize_to_json() {
    let ket = 2.0 * Ket::basis(qubit(), "e").unwrap();
    let json = serde_json::to_string(&ket).unwrap();
    let back: Ket = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ket);
}

// ============================================================================
// Local actions on Fock, spin and coherent states
// ============================================================================

fn fock(space: i32, n: usize) -> Ket {
    Ket::basis_at(space, n).unwrap()
}

fn fock2(n1: usize, n2: usize) -> Ket {
    fock(1, n1).tensor(&fock(2, n2)).unwrap()
}

#[test]
fn ladder_operators_on_fock_states() {
    assert_eq!(
        Operator::create(1).act_on(&fock(1, 2)).unwrap(),
        3f64.sqrt() * fock(1, 3)
    );
    assert_eq!(
        Operator::destroy(1).act_on(&fock(1, 2)).unwrap(),
        2f64.sqrt() * fock(1, 1)
    );
    assert_eq!(Operator::destroy(1).act_on(&fock(1, 0)).unwrap(), Ket::Zero);
    let coh = Ket::coherent(1, 10.0);
    assert_eq!(Operator::destroy(1).act_on(&coh).unwrap(), 10.0 * coh);
}

#[test]
fn spin_operators_with_integer_labels() {
    let h = LocalSpace::new("j").with_basis(-3..=3);
    let m2 = Ket::basis(h.clone(), 2).unwrap();
    assert_eq!(
        Operator::jplus(h.clone()).act_on(&m2).unwrap(),
        6f64.sqrt() * Ket::basis(h.clone(), 3).unwrap()
    );
    assert_eq!(
        Operator::jminus(h.clone()).act_on(&m2).unwrap(),
        10f64.sqrt() * Ket::basis(h.clone(), 1).unwrap()
    );
    assert_eq!(Operator::jz(h).act_on(&m2).unwrap(), 2.0 * m2);
}

#[test]
fn phase_on_fock_and_coherent_states() {
    let phase = Scalar::number(Complex64::new(0.0, 15.0)).exp();
    assert_eq!(
        Operator::phase(1, 5).act_on(&fock(1, 3)).unwrap(),
        phase * fock(1, 3)
    );
    assert_eq!(
        Operator::phase(1, PI)
            .act_on(&Ket::coherent(1, 3.0))
            .unwrap(),
        Ket::coherent(1, -3.0)
    );
}

#[test]
fn displacement_of_coherent_state_and_vacuum() {
    let beta = Complex64::new(5.0, 6.0);
    let phase = Scalar::number(Complex64::new(0.0, (beta * 3.0).im)).exp();
    assert_eq!(
        Operator::displace(1, beta)
            .act_on(&Ket::coherent(1, 3.0))
            .unwrap(),
        phase * Ket::coherent(1, Complex64::new(8.0, 6.0))
    );
    assert_eq!(
        Operator::displace(1, beta).act_on(&fock(1, 0)).unwrap(),
        Ket::coherent(1, beta)
    );
}

#[test]
fn sigma_projects_onto_basis_states() {
    let h = LocalSpace::new(1).with_basis([0, 1]);
    let one = Ket::basis(h.clone(), 1).unwrap();
    assert_eq!(
        Operator::sigma(h.clone(), 0, 1).act_on(&one).unwrap(),
        Ket::basis(h.clone(), 0).unwrap()
    );
    assert_eq!(Operator::sigma(h, 0, 0).act_on(&one).unwrap(), Ket::Zero);
}

#[test]
fn operators_act_on_their_tensor_factor() {
    let hop = Operator::create(1) * Operator::destroy(2);
    assert_eq!(hop.act_on(&fock2(2, 1)).unwrap(), 3f64.sqrt() * fock2(3, 0));
    assert_eq!(hop.act_on(&fock2(0, 1)).unwrap(), fock2(1, 0));
}

#[test]
fn operator_products_act_right_to_left() {
    let n = Operator::create(1) * Operator::destroy(1);
    let lower = Operator::create(1) * Operator::destroy(1) * Operator::destroy(1);
    assert_eq!(n.act_on(&fock2(1, 1)).unwrap(), fock2(1, 1));
    assert_eq!(lower.act_on(&fock2(2, 1)).unwrap(), 2f64.sqrt() * fock2(1, 1));
    assert_eq!(lower.act_on(&fock(1, 2)).unwrap(), 2f64.sqrt() * fock(1, 1));
    assert_eq!(n.act_on(&fock(1, 1)).unwrap(), fock(1, 1));
    assert_eq!(n.act_on(&fock(1, 0)).unwrap(), Ket::Zero);
}
