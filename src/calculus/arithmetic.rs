//! Algebraic operations over [`Expression`] values.
//!
//! Every total operation first attempts its "clean" variant, which succeeds
//! only when the result is no more complex than either operand (two
//! monomials of equal exponent and inner, two natural exponents over the
//! same inner, and so on). On clean failure the total operation falls back
//! to a generic wrapper: a sum, a product, or an inverse monomial. This is
//! the mechanism that keeps the whole algebra in canonical form.

use std::sync::Arc;

use crate::calculus::expression::Kind;
use crate::calculus::{AlgebraError, Expression};
use crate::math::{gcd, simplify_ratio};

impl Expression {
    /// Adds another expression to this one.
    pub fn add(&self, addend: &Expression) -> Result<Expression, AlgebraError> {
        if let Some(clean) = self.add_cleanly(addend)? {
            return Ok(clean);
        }
        Expression::sum(1.0, vec![self.clone(), addend.clone()])
    }

    /// Subtracts another expression from this one.
    pub fn sub(&self, subtrahend: &Expression) -> Result<Expression, AlgebraError> {
        if let Some(clean) = self.sub_cleanly(subtrahend)? {
            return Ok(clean);
        }
        Expression::sum(1.0, vec![self.clone(), subtrahend.scale(-1.0)?])
    }

    /// Multiplies this expression by another.
    ///
    /// A sum on the left distributes the multiplicand over its terms; the
    /// product constructor does the same for a sum on the right, so products
    /// never end up containing sums.
    pub fn mul(&self, multiplicand: &Expression) -> Result<Expression, AlgebraError> {
        if let Kind::Constant = multiplicand.kind {
            return self.scale(multiplicand.coefficient);
        }
        if let Kind::Sum { terms } = &self.kind {
            let mut distributed = Vec::with_capacity(terms.len());
            for term in terms {
                distributed.push(term.mul(multiplicand)?);
            }
            return Expression::sum(self.coefficient, distributed);
        }
        if let Some(clean) = self.mul_cleanly(multiplicand)? {
            return Ok(clean);
        }
        Expression::product(1.0, vec![self.clone(), multiplicand.clone()])
    }

    /// Divides this expression by another. Division by the zero expression
    /// fails with [`AlgebraError::DivisionByZero`].
    pub fn div(&self, divisor: &Expression) -> Result<Expression, AlgebraError> {
        if divisor.is_zero() {
            return Err(AlgebraError::DivisionByZero);
        }
        if let Kind::Constant = divisor.kind {
            return self.div_scalar(divisor.coefficient);
        }
        if let Some(clean) = self.div_cleanly(divisor)? {
            return Ok(clean);
        }
        self.mul(&Expression::monomial(1.0, -1.0, Some(divisor.clone()))?)
    }

    /// Multiplies by a scalar.
    pub fn scale(&self, multiplicand: f64) -> Result<Expression, AlgebraError> {
        self.with_coefficient(self.coefficient * multiplicand)
    }

    /// Divides by a scalar; zero fails with
    /// [`AlgebraError::DivisionByZero`].
    pub fn div_scalar(&self, divisor: f64) -> Result<Expression, AlgebraError> {
        if divisor == 0.0 {
            return Err(AlgebraError::DivisionByZero);
        }
        self.with_coefficient(self.coefficient / divisor)
    }

    /// Raises this expression to an integer power.
    ///
    /// Non-negative powers that resist a clean rewrite are performed by
    /// repeated multiplication (which fully expands sums); negative powers
    /// wrap the positive power in an inverse monomial. Raising zero to a
    /// negative power fails.
    pub fn powi(&self, exponent: i64) -> Result<Expression, AlgebraError> {
        if let Some(clean) = self.pow_cleanly(exponent as f64)? {
            return Ok(clean);
        }
        if exponent >= 0 {
            if self.coefficient == 0.0 {
                return Ok(self.clone());
            }
            let mut power = Expression::constant(1.0)?;
            for _ in 0..exponent {
                power = power.mul(self)?;
            }
            Ok(power)
        } else {
            if self.coefficient == 0.0 {
                return Err(AlgebraError::DivisionByZero);
            }
            Expression::monomial(1.0, -1.0, Some(self.powi(-exponent)?))
        }
    }

    /// Raises this expression to a real power.
    pub fn powf(&self, exponent: f64) -> Result<Expression, AlgebraError> {
        if let Some(clean) = self.pow_cleanly(exponent)? {
            return Ok(clean);
        }
        if exponent.fract() == 0.0 {
            return self.powi(exponent as i64);
        }
        if exponent < 0.0 && self.coefficient == 0.0 {
            return Err(AlgebraError::DivisionByZero);
        }
        Expression::monomial(1.0, exponent, Some(self.clone()))
    }

    pub(crate) fn add_cleanly(
        &self,
        addend: &Expression,
    ) -> Result<Option<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Constant => match addend.kind {
                Kind::Constant => Ok(Some(Expression::constant(
                    self.coefficient + addend.coefficient,
                )?)),
                _ => Ok(None),
            },
            Kind::Monomial { exponent, inner } => match &addend.kind {
                Kind::Monomial {
                    exponent: other_exponent,
                    inner: other_inner,
                } if exponent == other_exponent && inner == other_inner => {
                    Ok(Some(Expression::monomial_arc(
                        self.coefficient + addend.coefficient,
                        *exponent,
                        inner.clone(),
                    )?))
                }
                _ => Ok(None),
            },
            Kind::NaturalExponent { inner } => match &addend.kind {
                Kind::NaturalExponent { inner: other_inner } if inner == other_inner => {
                    Ok(Some(Expression::natural_exponent_arc(
                        self.coefficient + addend.coefficient,
                        inner.clone(),
                    )?))
                }
                _ => Ok(None),
            },
            Kind::Sum { terms } => replace_combined(terms, self.coefficient, |term| {
                term.add_cleanly(addend)
            }),
            Kind::Product { .. } => {
                if self.with_coefficient(1.0)? == addend.with_coefficient(1.0)? {
                    Ok(Some(self.with_coefficient(
                        self.coefficient + addend.coefficient,
                    )?))
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub(crate) fn sub_cleanly(
        &self,
        subtrahend: &Expression,
    ) -> Result<Option<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Constant => match subtrahend.kind {
                Kind::Constant => Ok(Some(Expression::constant(
                    self.coefficient - subtrahend.coefficient,
                )?)),
                _ => Ok(None),
            },
            Kind::Monomial { exponent, inner } => match &subtrahend.kind {
                Kind::Monomial {
                    exponent: other_exponent,
                    inner: other_inner,
                } if exponent == other_exponent && inner == other_inner => {
                    Ok(Some(Expression::monomial_arc(
                        self.coefficient - subtrahend.coefficient,
                        *exponent,
                        inner.clone(),
                    )?))
                }
                _ => Ok(None),
            },
            Kind::NaturalExponent { inner } => match &subtrahend.kind {
                Kind::NaturalExponent { inner: other_inner } if inner == other_inner => {
                    Ok(Some(Expression::natural_exponent_arc(
                        self.coefficient - subtrahend.coefficient,
                        inner.clone(),
                    )?))
                }
                _ => Ok(None),
            },
            Kind::Sum { terms } => replace_combined(terms, self.coefficient, |term| {
                term.sub_cleanly(subtrahend)
            }),
            Kind::Product { .. } => {
                if self.with_coefficient(1.0)? == subtrahend.with_coefficient(1.0)? {
                    Ok(Some(self.with_coefficient(
                        self.coefficient - subtrahend.coefficient,
                    )?))
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub(crate) fn mul_cleanly(
        &self,
        multiplicand: &Expression,
    ) -> Result<Option<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Constant => Ok(Some(multiplicand.scale(self.coefficient)?)),
            Kind::Monomial { .. } => match &multiplicand.kind {
                Kind::Constant => Ok(Some(self.scale(multiplicand.coefficient)?)),
                Kind::Monomial { .. } => self.combine_monomials(multiplicand, false),
                _ => Ok(None),
            },
            Kind::NaturalExponent { .. } => match &multiplicand.kind {
                Kind::Constant => Ok(Some(self.scale(multiplicand.coefficient)?)),
                Kind::NaturalExponent { .. } => {
                    // exp(f) * exp(g) = exp(f + g)
                    let combined_inner =
                        self.operable_inner().add(&multiplicand.operable_inner())?;
                    Ok(Some(Expression::natural_exponent(
                        self.coefficient * multiplicand.coefficient,
                        Some(combined_inner),
                    )?))
                }
                _ => Ok(None),
            },
            Kind::Sum { terms } => {
                let mut multiplied = Vec::with_capacity(terms.len());
                for term in terms {
                    match term.mul_cleanly(multiplicand)? {
                        Some(product) => multiplied.push(product),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Expression::sum(self.coefficient, multiplied)?))
            }
            Kind::Product { factors } => match &multiplicand.kind {
                Kind::Product {
                    factors: other_factors,
                } => {
                    let mut current = self.clone();
                    for factor in other_factors {
                        match current.mul_cleanly(factor)? {
                            Some(product) => current = product,
                            None => return Ok(None),
                        }
                    }
                    Ok(Some(current.scale(multiplicand.coefficient)?))
                }
                _ => replace_combined_product(factors, self.coefficient, |factor| {
                    factor.mul_cleanly(multiplicand)
                }),
            },
        }
    }

    pub(crate) fn div_cleanly(
        &self,
        divisor: &Expression,
    ) -> Result<Option<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Constant => match &divisor.kind {
                Kind::Constant => {
                    if divisor.coefficient == 0.0 {
                        Ok(None)
                    } else {
                        Ok(Some(Expression::constant(
                            self.coefficient / divisor.coefficient,
                        )?))
                    }
                }
                // a / (b + c) is no simpler than either operand.
                Kind::Sum { .. } => Ok(None),
                _ => Ok(Some(Expression::monomial(
                    self.coefficient,
                    -1.0,
                    Some(divisor.clone()),
                )?)),
            },
            Kind::Monomial { .. } => match &divisor.kind {
                Kind::Constant => {
                    if divisor.coefficient == 0.0 {
                        Ok(None)
                    } else {
                        Ok(Some(self.div_scalar(divisor.coefficient)?))
                    }
                }
                Kind::Monomial { .. } => self.combine_monomials(divisor, true),
                _ => Ok(None),
            },
            Kind::NaturalExponent { .. } => match &divisor.kind {
                Kind::Constant => {
                    if divisor.coefficient == 0.0 {
                        Ok(None)
                    } else {
                        Ok(Some(self.div_scalar(divisor.coefficient)?))
                    }
                }
                Kind::NaturalExponent { .. } => {
                    // exp(f) / exp(g) = exp(f - g)
                    let combined_inner =
                        self.operable_inner().sub(&divisor.operable_inner())?;
                    Ok(Some(Expression::natural_exponent(
                        self.coefficient / divisor.coefficient,
                        Some(combined_inner),
                    )?))
                }
                _ => Ok(None),
            },
            Kind::Sum { terms } => {
                // Distributing a division over the terms never deepens the
                // sum, so it always counts as clean.
                let mut divided = Vec::with_capacity(terms.len());
                for term in terms {
                    divided.push(term.div(divisor)?);
                }
                Ok(Some(Expression::sum(self.coefficient, divided)?))
            }
            Kind::Product { factors } => match &divisor.kind {
                Kind::Product {
                    factors: other_factors,
                } => {
                    let mut current = self.clone();
                    for factor in other_factors {
                        match current.div_cleanly(factor)? {
                            Some(quotient) => current = quotient,
                            None => return Ok(None),
                        }
                    }
                    Ok(Some(current.div_scalar(divisor.coefficient)?))
                }
                _ => replace_combined_product(factors, self.coefficient, |factor| {
                    factor.div_cleanly(divisor)
                }),
            },
        }
    }

    pub(crate) fn pow_cleanly(
        &self,
        exponent: f64,
    ) -> Result<Option<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Constant => Ok(Some(Expression::constant(
                self.coefficient.powf(exponent),
            )?)),
            Kind::Monomial {
                exponent: own_exponent,
                inner,
            } => Ok(Some(Expression::monomial_arc(
                self.coefficient.powf(exponent),
                own_exponent * exponent,
                inner.clone(),
            )?)),
            Kind::NaturalExponent { .. } => Ok(Some(Expression::natural_exponent(
                self.coefficient.powf(exponent),
                Some(self.operable_inner().scale(exponent)?),
            )?)),
            Kind::Sum { .. } => Ok(None),
            Kind::Product { factors } => {
                let mut raised = Vec::with_capacity(factors.len());
                for factor in factors {
                    match factor.pow_cleanly(exponent)? {
                        Some(power) => raised.push(power),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Expression::product(
                    self.coefficient.powf(exponent),
                    raised,
                )?))
            }
        }
    }

    /// Clean multiplication or division of two monomials whose inner
    /// functions differ: a shared outer exponent is recovered via the gcd of
    /// integer exponents (or rational reconstruction of their ratio) and the
    /// operation recurses on the exponentiated inners.
    fn combine_monomials(
        &self,
        other: &Expression,
        divide: bool,
    ) -> Result<Option<Expression>, AlgebraError> {
        let (Kind::Monomial { exponent, inner }, Kind::Monomial {
            exponent: other_exponent,
            inner: other_inner,
        }) = (&self.kind, &other.kind)
        else {
            return Ok(None);
        };

        if inner == other_inner {
            let combined_exponent = if divide {
                exponent - other_exponent
            } else {
                exponent + other_exponent
            };
            let combined_coefficient = if divide {
                self.coefficient / other.coefficient
            } else {
                self.coefficient * other.coefficient
            };
            return Ok(Some(Expression::monomial_arc(
                combined_coefficient,
                combined_exponent,
                inner.clone(),
            )?));
        }

        let (outer, own_power, other_power) =
            match reconcile_exponents(*exponent, *other_exponent) {
                Some(split) => split,
                None => return Ok(None),
            };

        let own_base = match self.operable_inner().powi(own_power) {
            Ok(base) => base,
            Err(AlgebraError::DivisionByZero) => return Ok(None),
            Err(e) => return Err(e),
        };
        let other_base = match other.operable_inner().powi(other_power) {
            Ok(base) => base,
            Err(AlgebraError::DivisionByZero) => return Ok(None),
            Err(e) => return Err(e),
        };

        let combined_inner = if divide {
            own_base.div_cleanly(&other_base)?
        } else {
            own_base.mul_cleanly(&other_base)?
        };
        let combined_coefficient = if divide {
            self.coefficient / other.coefficient
        } else {
            self.coefficient * other.coefficient
        };
        match combined_inner {
            Some(inner) => Ok(Some(Expression::monomial(
                combined_coefficient,
                outer,
                Some(inner),
            )?)),
            None => Ok(None),
        }
    }
}

/// Splits a pair of monomial exponents into a shared outer exponent and two
/// integer inner powers with `p1 = outer * i1` and `p2 = outer * i2`.
fn reconcile_exponents(p1: f64, p2: f64) -> Option<(f64, i64, i64)> {
    if p1 == p2 {
        return Some((p1, 1, 1));
    }
    if p1.fract() == 0.0 && p2.fract() == 0.0 {
        let divisor = gcd(p1 as i64, p2 as i64);
        if divisor == 0 {
            return None;
        }
        return Some((divisor as f64, p1 as i64 / divisor, p2 as i64 / divisor));
    }
    let (i1, i2) = simplify_ratio(p1, p2)?;
    Some((p1 / i1 as f64, i1, i2))
}

/// Tries `combine` against each child; on the first success, replaces that
/// child with the combination and rebuilds through the sum constructor.
fn replace_combined<F>(
    terms: &[Arc<Expression>],
    coefficient: f64,
    mut combine: F,
) -> Result<Option<Expression>, AlgebraError>
where
    F: FnMut(&Expression) -> Result<Option<Expression>, AlgebraError>,
{
    for (i, term) in terms.iter().enumerate() {
        if let Some(combined) = combine(term)? {
            let mut updated: Vec<Expression> = Vec::with_capacity(terms.len());
            for (j, other) in terms.iter().enumerate() {
                if j != i {
                    updated.push((**other).clone());
                }
            }
            updated.push(combined);
            return Ok(Some(Expression::sum(coefficient, updated)?));
        }
    }
    Ok(None)
}

/// As [`replace_combined`], rebuilding through the product constructor.
fn replace_combined_product<F>(
    factors: &[Arc<Expression>],
    coefficient: f64,
    mut combine: F,
) -> Result<Option<Expression>, AlgebraError>
where
    F: FnMut(&Expression) -> Result<Option<Expression>, AlgebraError>,
{
    for (i, factor) in factors.iter().enumerate() {
        if let Some(combined) = combine(factor)? {
            let mut updated: Vec<Expression> = Vec::with_capacity(factors.len());
            for (j, other) in factors.iter().enumerate() {
                if j != i {
                    updated.push((**other).clone());
                }
            }
            updated.push(combined);
            return Ok(Some(Expression::product(coefficient, updated)?));
        }
    }
    Ok(None)
}
