//! Canonical immutable expression algebra over real functions of one
//! variable, with closed-form analytic differentiation.
//!
//! The central type is [`Expression`]: an immutable value in a closed algebra
//! whose constructors canonicalise on the way in, so that any two
//! mathematically equal constructions compare equal and hash equal. Analytic
//! differentiation is memoised process-wide by expression shape, which makes
//! repeated differentiation (as used by the KDE bandwidth selector) both fast
//! and exact.
//!
//! Numerical considerations:
//! - Construction rejects infinite coefficients outright; evaluation reports
//!   domain violations (negative base under a fractional exponent, division
//!   by zero) as typed errors instead of silently producing NaN.
//! - Canonicalisation prefers expanded sums over exponentiated sums, and a
//!   single natural exponent over products of exponents.

pub mod expression;

mod arithmetic;
mod differentiate;
mod display;

pub use display::DEFAULT_SIGNIFICANT_FIGURES;
pub use expression::Expression;

/// Domain errors raised when evaluating an expression at a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    /// A negative base was raised to a non-integer exponent.
    ComplexResultRequired,
    /// A zero base was raised to a negative exponent, or an equivalent
    /// division by zero occurred.
    DivisionByZero,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComplexResultRequired => {
                write!(f, "complex result required: negative base with fractional exponent")
            }
            Self::DivisionByZero => write!(f, "division by zero during evaluation"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Errors raised while constructing or algebraically combining expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgebraError {
    /// Division by the zero expression or the zero scalar.
    DivisionByZero,
    /// A constant fold would leave the real line (negative base under a
    /// fractional exponent).
    ComplexResultRequired,
    /// An infinite coefficient was produced or supplied.
    NonFiniteCoefficient,
}

impl std::fmt::Display for AlgebraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::ComplexResultRequired => {
                write!(f, "complex result required: negative base with fractional exponent")
            }
            Self::NonFiniteCoefficient => write!(f, "infinite coefficient"),
        }
    }
}

impl std::error::Error for AlgebraError {}
