//! Ferrodiff is a numerical/symbolic mathematics library built around three
//! interlocking cores: a canonicalising differentiable-expression algebra, a
//! variable-implicitness (theta-method) finite-difference solver for
//! one-dimensional second-order linear parabolic PDEs, and the
//! tridiagonal/Gaussian direct-solver pair that backs it. On top of the core
//! sits a Gaussian kernel density estimator with automatic bandwidth
//! selection by the Improved Sheather-Jones fixed point.
//!
//! References used across modules include:
//! - Botev, Grotowski, and Kroese (2010), *Kernel density estimation via
//!   diffusion*, for the ISJ bandwidth recursion.
//! - Thomas (1949) and standard texts on the tridiagonal algorithm and its
//!   strict-diagonal-dominance stability precondition.
//! - Crank and Nicolson (1947) and the usual theta-scheme literature for the
//!   variably implicit time discretisation.
//!
//! Numerical considerations:
//! - Expression construction canonicalises eagerly; two mathematically equal
//!   constructions compare and hash equal, which is what makes the
//!   process-wide differentiation memo sound.
//! - The PDE stepper guards every Thomas solve with the diagonal-dominance
//!   check and falls back to Gaussian elimination when the check trips.
//! - The theta parameter blends explicit (0), Crank-Nicolson (0.5), and
//!   fully implicit (1) stepping; explicit stepping is only stable under the
//!   usual CFL restriction on the step sizes.
//!
//! # Quick Start
//! Differentiate a polynomial analytically:
//! ```rust
//! use ferrodiff::calculus::Expression;
//!
//! let x_cubed = Expression::monomial(1.0, 3.0, None).unwrap();
//! let slope = x_cubed.differentiate().unwrap();
//! assert_eq!(slope.evaluate(2.0).unwrap(), 12.0);
//! ```
//!
//! Solve the heat equation with Dirichlet boundaries:
//! ```rust
//! use ferrodiff::pde::{BoundaryCondition, ThetaSolver};
//!
//! let mut solver = ThetaSolver::from_initial_fn(
//!     0.5,
//!     |x: f64| (std::f64::consts::PI * x).sin(),
//!     |_t, _x| 1.0,
//!     |_t, _x| 0.0,
//!     |_t, _x| 0.0,
//!     BoundaryCondition::dirichlet(0.0, |_t| 0.0),
//!     BoundaryCondition::dirichlet(1.0, |_t| 0.0),
//!     0.02,
//!     1.0e-4,
//! )
//! .unwrap();
//! let u = solver.evaluate(0.1, 0.5).unwrap();
//! assert!(u > 0.0 && u < 1.0);
//! ```

pub mod calculus;
pub mod kde;
pub mod linalg;
pub mod math;
pub mod pde;

/// Common imports for ergonomic usage.
pub mod prelude {
    pub use crate::calculus::{AlgebraError, EvalError, Expression};
    pub use crate::kde::{gaussian_kde, KdeError, KernelDensityEstimate};
    pub use crate::linalg::{solve_gaussian, solve_tridiagonal, LinearSolveError};
    pub use crate::pde::{BoundaryCondition, BoundaryKind, PdeError, ThetaSolver};
}
