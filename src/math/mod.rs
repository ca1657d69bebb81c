//! Shared numeric kernels used across the algebra, PDE, and KDE modules.
//!
//! This module includes:
//! - linear interpolation and affine range mapping,
//! - uniform-grid (trapezoidal) quadrature,
//! - integer gcd and rational reconstruction of floating-point ratios,
//! - significant-figure rounding for display.

/// Linearly interpolates between `(x0, y0)` and `(x1, y1)` at `x`.
///
/// `x` may lie outside `[x0, x1]`, in which case the value is extrapolated
/// along the same line.
pub fn linear_interpolate(x0: f64, x1: f64, y0: f64, y1: f64, x: f64) -> f64 {
    let w = (x - x0) / (x1 - x0);
    (1.0 - w) * y0 + w * y1
}

/// Returns the affine map taking `[from_lo, from_hi]` onto `[to_lo, to_hi]`,
/// or `None` when the source interval is degenerate.
pub fn linear_map(
    from_lo: f64,
    from_hi: f64,
    to_lo: f64,
    to_hi: f64,
) -> Option<impl Fn(f64) -> f64> {
    if from_hi == from_lo {
        return None;
    }
    let scale = (to_hi - to_lo) / (from_hi - from_lo);
    Some(move |x: f64| to_lo + (x - from_lo) * scale)
}

/// Composite trapezoidal quadrature of `f` over `[a, b]` with `panels`
/// uniform panels.
///
/// For smooth integrands whose support is well inside `[a, b]` (Gaussians in
/// particular) the uniform trapezoidal rule converges superalgebraically, so
/// modest panel counts already reach machine precision.
pub fn trapezoid_integrate<F>(f: F, a: f64, b: f64, panels: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let n = panels.max(1);
    let h = (b - a) / n as f64;
    let mut sum = 0.5 * (f(a) + f(b));
    for i in 1..n {
        sum += f(a + i as f64 * h);
    }
    sum * h
}

/// Greatest common divisor; the result carries the sign convention
/// `gcd(a, b) >= 0` with `gcd(0, 0) == 0`.
pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

const RATIO_MAX_DENOMINATOR: i64 = 1 << 20;
const RATIO_RELATIVE_TOLERANCE: f64 = 1.0e-12;

/// Reconstructs the ratio `numerator / denominator` as a reduced fraction
/// `(p, q)` with `q > 0`, so that `numerator / p == denominator / q` up to
/// floating-point tolerance.
///
/// Returns `None` when either input is zero or the ratio is not close to a
/// fraction with denominator below an internal bound. Used to reconcile
/// non-integer monomial exponents.
pub fn simplify_ratio(numerator: f64, denominator: f64) -> Option<(i64, i64)> {
    if numerator == 0.0 || denominator == 0.0 {
        return None;
    }
    let ratio = numerator / denominator;
    if !ratio.is_finite() {
        return None;
    }
    let target = ratio.abs();

    // Continued-fraction convergents of the absolute ratio.
    let mut x = target;
    let (mut h0, mut h1): (i64, i64) = (1, 0);
    let (mut k0, mut k1): (i64, i64) = (0, 1);
    for _ in 0..64 {
        let whole = x.floor();
        if whole > RATIO_MAX_DENOMINATOR as f64 {
            return None;
        }
        let a = whole as i64;
        let h2 = a.checked_mul(h0)?.checked_add(h1)?;
        let k2 = a.checked_mul(k0)?.checked_add(k1)?;
        if k2 > RATIO_MAX_DENOMINATOR {
            return None;
        }
        h1 = h0;
        h0 = h2;
        k1 = k0;
        k0 = k2;

        let approx = h0 as f64 / k0 as f64;
        if (approx - target).abs() <= RATIO_RELATIVE_TOLERANCE * target.max(1.0) {
            let p = if ratio < 0.0 { -h0 } else { h0 };
            return Some((p, k0));
        }

        let frac = x - whole;
        if frac.abs() < f64::EPSILON {
            break;
        }
        x = 1.0 / frac;
    }
    None
}

/// Rounds `value` to `sig_figs` significant figures (not decimal places).
///
/// Zero, non-finite values, and a zero figure count pass through unchanged.
pub fn round_to_significant_figures(value: f64, sig_figs: usize) -> f64 {
    if value == 0.0 || !value.is_finite() || sig_figs == 0 {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let shift = sig_figs as i32 - 1 - magnitude;
    let factor = 10.0_f64.powi(shift);
    (value * factor).round() / factor
}
