//! Finite-difference solver for one-dimensional second-order linear
//! parabolic PDEs of the form `f_t = A(t,x)*f_xx + B(t,x)*f_x + C(t,x)*f`.
//!
//! The time discretisation is the variably implicit theta-method: theta = 0
//! is the explicit scheme, theta = 0.5 Crank-Nicolson, theta = 1 fully
//! implicit. Each step reduces to a tridiagonal system solved with the
//! Thomas algorithm under a diagonal-dominance guard; systems the guard
//! rejects fall back to Gaussian elimination transparently.
//!
//! Numerical considerations:
//! - Central differences in space give second-order spatial accuracy on the
//!   uniform grid; the theta blend controls temporal accuracy and stability.
//! - The explicit end of the blend is only stable under the usual CFL
//!   restriction relating the time step to the squared space step.

pub mod boundary;
pub mod theta;

pub use boundary::{BoundaryCondition, BoundaryKind};
pub use theta::ThetaSolver;

use crate::linalg::LinearSolveError;

/// Errors surfaced by the PDE solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdeError {
    /// Out-of-contract constructor argument.
    InvalidInput(String),
    /// Solving backwards in time is not implemented.
    ReverseTime,
    /// The Gaussian fallback could not find a unique solution for a step.
    Indeterminate,
}

impl std::fmt::Display for PdeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::ReverseTime => write!(f, "reverse time stepping is not implemented"),
            Self::Indeterminate => write!(f, "time step produced an indeterminate system"),
        }
    }
}

impl std::error::Error for PdeError {}

impl From<LinearSolveError> for PdeError {
    fn from(e: LinearSolveError) -> Self {
        match e {
            LinearSolveError::Indeterminate => Self::Indeterminate,
            other => Self::InvalidInput(other.to_string()),
        }
    }
}
