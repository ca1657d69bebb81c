//! Analytic differentiation with a process-wide shape memo.
//!
//! Differentiation is evaluated lazily: disregarding the outer coefficient,
//! an identical shape is explicitly differentiated at most once per process.
//! The memo stores `shape -> d(shape)/dx` under a mutex; concurrent callers
//! may race to compute the same derivative, in which case the last writer
//! wins with a structurally equal value, so the cache only ever affects
//! performance, never results.

use std::sync::{Mutex, OnceLock};

use rustc_hash::FxHashMap;

use crate::calculus::expression::Kind;
use crate::calculus::{AlgebraError, Expression};

static DERIVATIVES: OnceLock<Mutex<FxHashMap<Expression, Expression>>> = OnceLock::new();

fn memo() -> &'static Mutex<FxHashMap<Expression, Expression>> {
    DERIVATIVES.get_or_init(|| Mutex::new(FxHashMap::default()))
}

fn memo_get(shape: &Expression) -> Option<Expression> {
    let guard = memo().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.get(shape).cloned()
}

fn memo_store(shape: Expression, derivative: Expression) {
    let mut guard = memo().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.insert(shape, derivative);
}

impl Expression {
    /// Returns the first derivative of this expression.
    ///
    /// The result is not necessarily of the same kind: differentiating the
    /// monomial `x` yields the constant `1`.
    pub fn differentiate(&self) -> Result<Expression, AlgebraError> {
        let shape = self.with_coefficient(1.0)?;
        if let Some(cached) = memo_get(&shape) {
            return cached.scale(self.coefficient);
        }
        let result = self.differentiate_explicitly()?;
        // Dividing out a zero coefficient only happens for the zero
        // expression, whose derivative is zero.
        let shape_derivative = result
            .div_scalar(self.coefficient)
            .unwrap_or(Expression::ZERO);
        memo_store(shape, shape_derivative);
        Ok(result)
    }

    /// Differentiates `n` times. This cannot antidifferentiate: `n <= 0`
    /// returns the expression unchanged.
    pub fn derivative(&self, n: i32) -> Result<Expression, AlgebraError> {
        let mut result = self.clone();
        for _ in 0..n.max(0) {
            result = result.differentiate()?;
        }
        Ok(result)
    }

    fn differentiate_explicitly(&self) -> Result<Expression, AlgebraError> {
        match &self.kind {
            Kind::Constant => Ok(Expression::ZERO),
            Kind::Monomial { exponent, inner } => {
                let reduced = Expression::monomial_arc(
                    self.coefficient * exponent,
                    exponent - 1.0,
                    inner.clone(),
                )?;
                match inner {
                    None => Ok(reduced),
                    // Chain rule.
                    Some(g) => Expression::product(1.0, vec![g.differentiate()?, reduced]),
                }
            }
            Kind::NaturalExponent { inner } => match inner {
                None => Ok(self.clone()),
                Some(g) => Expression::product(1.0, vec![g.differentiate()?, self.clone()]),
            },
            Kind::Sum { terms } => {
                let mut differentiated = Vec::with_capacity(terms.len());
                for term in terms {
                    differentiated.push(term.differentiate()?);
                }
                Expression::sum(self.coefficient, differentiated)
            }
            Kind::Product { factors } => {
                // Product rule, pairing the first factor against the rest
                // bundled as a subproduct.
                let Some((first, rest)) = factors.split_first() else {
                    return Ok(Expression::ZERO);
                };
                let rest = Expression::product(
                    1.0,
                    rest.iter().map(|f| (**f).clone()).collect(),
                )?;
                let first_term =
                    Expression::product(1.0, vec![first.differentiate()?, rest.clone()])?;
                let second_term =
                    Expression::product(1.0, vec![(**first).clone(), rest.differentiate()?])?;
                Expression::sum(self.coefficient, vec![first_term, second_term])
            }
        }
    }
}
