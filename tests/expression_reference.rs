//! Reference behaviour of the expression algebra: canonical-form identities,
//! differentiation chains, and Gaussian PDF normalisation.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ferrodiff::calculus::{EvalError, Expression};
use ferrodiff::math::trapezoid_integrate;

#[test]
fn equal_constructions_compare_equal() {
    // (x + 1)^2 built as an exponentiated sum equals the expanded polynomial.
    let x_plus_one = Expression::sum(
        1.0,
        vec![Expression::X, Expression::constant(1.0).unwrap()],
    )
    .unwrap();
    let exponentiated = Expression::monomial(1.0, 2.0, Some(x_plus_one.clone())).unwrap();
    let expanded = Expression::sum(
        1.0,
        vec![
            Expression::monomial(1.0, 2.0, None).unwrap(),
            Expression::monomial(2.0, 1.0, None).unwrap(),
            Expression::constant(1.0).unwrap(),
        ],
    )
    .unwrap();
    assert_eq!(exponentiated, expanded);

    // The same value again through arithmetic on the pieces.
    let via_multiplication = x_plus_one.mul(&x_plus_one).unwrap();
    assert_eq!(via_multiplication, expanded);
}

#[test]
fn derivative_chain_of_the_cube() {
    let x_cubed = Expression::monomial(1.0, 3.0, None).unwrap();
    let three_x_squared = Expression::monomial(3.0, 2.0, None).unwrap();
    let six_x = Expression::monomial(6.0, 1.0, None).unwrap();

    let first = x_cubed.differentiate().unwrap();
    let second = first.differentiate().unwrap();
    let third = second.differentiate().unwrap();

    assert_eq!(first, three_x_squared);
    assert_eq!(second, six_x);
    assert!(third.is_constant());

    let mut x = -10_000.0;
    while x < 10_000.0 {
        assert_relative_eq!(
            first.evaluate(x).unwrap(),
            three_x_squared.evaluate(x).unwrap(),
            max_relative = 1.0e-12
        );
        assert_relative_eq!(
            second.evaluate(x).unwrap(),
            six_x.evaluate(x).unwrap(),
            max_relative = 1.0e-12
        );
        x += 500.5;
    }
}

#[test]
fn sqrt_derivative_reference() {
    let sqrt_x = Expression::monomial(1.0, 0.5, None).unwrap();
    let derivative = sqrt_x.differentiate().unwrap();
    let closed_form = Expression::monomial(0.5, -0.5, None).unwrap();

    let mut x = 0.5;
    while x < 10_000.0 {
        assert_relative_eq!(
            derivative.evaluate(x).unwrap(),
            closed_form.evaluate(x).unwrap(),
            max_relative = 1.0e-10
        );
        x += 250.5;
    }

    assert_eq!(derivative.evaluate(0.0), Err(EvalError::DivisionByZero));
    assert_eq!(
        derivative.evaluate(-4.0),
        Err(EvalError::ComplexResultRequired)
    );
}

#[test]
fn gaussian_pdf_normalises_across_standard_deviations() {
    let mut sigma = 0.5;
    while sigma <= 10.0 {
        let pdf = Expression::gaussian_pdf(sigma, 0.0).unwrap();
        let mass = trapezoid_integrate(
            |x| pdf.evaluate(x).unwrap_or(0.0),
            -1000.0,
            1000.0,
            10_000,
        );
        assert_abs_diff_eq!(mass, 1.0, epsilon = 1.0e-10);
        sigma += 0.5;
    }
}

#[test]
fn gaussian_derivatives_via_factorised_form_match_direct_evaluation() {
    let pdf = Expression::gaussian_pdf(1.0, 0.0).unwrap();
    for order in [2, 4, 6] {
        let derivative = pdf.derivative(order).unwrap();
        let factorised = derivative.factorise().unwrap();
        for x in [-2.5, -1.0, 0.0, 0.5, 3.0] {
            assert_relative_eq!(
                factorised.evaluate(x).unwrap(),
                derivative.evaluate(x).unwrap(),
                max_relative = 1.0e-9,
                epsilon = 1.0e-12
            );
        }
    }
}

#[test]
fn composed_gaussian_shifts_its_mean() {
    // Composing a zero-mean Gaussian with x - mu reproduces the shifted PDF.
    let pdf = Expression::gaussian_pdf(2.0, 0.0).unwrap();
    let shift = Expression::sum(
        1.0,
        vec![Expression::X, Expression::constant(-3.0).unwrap()],
    )
    .unwrap();
    let shifted = pdf.compose(&shift).unwrap();
    let direct = Expression::gaussian_pdf(2.0, 3.0).unwrap();
    for x in [-1.0, 0.0, 3.0, 5.5] {
        assert_relative_eq!(
            shifted.evaluate(x).unwrap(),
            direct.evaluate(x).unwrap(),
            max_relative = 1.0e-10
        );
    }
}
