//! The [`Expression`] value type and its canonicalising constructors.
//!
//! Every expression carries an outer coefficient and a kind; monomials and
//! natural exponents optionally carry an inner expression (absent meaning the
//! identity `x`). Constructors are the only way to build values and they
//! normalise aggressively: zero coefficients collapse to the unique zero,
//! nested monomials multiply out, exponentiated sums expand, products
//! containing sums distribute, and scalar content migrates to the outer
//! coefficient. No value violating the canonical form can exist.

use std::f64::consts::PI;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHasher};

use crate::calculus::{AlgebraError, EvalError};

/// An immutable, canonical, analytically differentiable function of one real
/// variable.
#[derive(Debug, Clone)]
pub struct Expression {
    pub(crate) coefficient: f64,
    pub(crate) kind: Kind,
}

#[derive(Debug, Clone)]
pub(crate) enum Kind {
    /// `f(x) = a`.
    Constant,
    /// `f(x) = a * g(x)^p`; `inner` of `None` means the identity.
    Monomial {
        exponent: f64,
        inner: Option<Arc<Expression>>,
    },
    /// `f(x) = a * exp(g(x))`.
    NaturalExponent { inner: Option<Arc<Expression>> },
    /// `f(x) = a * (t_1(x) + ... + t_n(x))`; canonical sums carry `a = 1`.
    Sum { terms: Vec<Arc<Expression>> },
    /// `f(x) = a * f_1(x) * ... * f_m(x)`; scalar content lives in `a`.
    Product { factors: Vec<Arc<Expression>> },
}

/// Discriminant used to bucket terms and factors during aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum KindTag {
    Constant,
    Monomial,
    NaturalExponent,
    Sum,
    Product,
}

/// Normalises `-0.0` to `0.0` and rejects infinities.
pub(crate) fn canonical_coefficient(c: f64) -> Result<f64, AlgebraError> {
    if c.is_infinite() {
        return Err(AlgebraError::NonFiniteCoefficient);
    }
    Ok(if c == 0.0 { 0.0 } else { c })
}

impl Expression {
    /// The unique zero expression.
    pub const ZERO: Expression = Expression {
        coefficient: 0.0,
        kind: Kind::Constant,
    };

    /// The identity `f(x) = x`.
    pub const X: Expression = Expression {
        coefficient: 1.0,
        kind: Kind::Monomial {
            exponent: 1.0,
            inner: None,
        },
    };

    /// Builds the constant function `f(x) = value`.
    pub fn constant(value: f64) -> Result<Expression, AlgebraError> {
        Ok(Expression {
            coefficient: canonical_coefficient(value)?,
            kind: Kind::Constant,
        })
    }

    /// Builds `coefficient * inner(x)^exponent` (`inner` of `None` meaning
    /// `x`), returning the simplest representation of that function.
    ///
    /// The result is not guaranteed to be a monomial: constant inners fold
    /// numerically, nested monomials collapse, natural-exponent inners
    /// rewrite to a scaled natural exponent, sums under a positive integer
    /// exponent expand, and product inners absorb the exponent into every
    /// factor.
    pub fn monomial(
        coefficient: f64,
        exponent: f64,
        inner: Option<Expression>,
    ) -> Result<Expression, AlgebraError> {
        Self::monomial_arc(coefficient, exponent, inner.map(Arc::new))
    }

    pub(crate) fn monomial_arc(
        coefficient: f64,
        exponent: f64,
        inner: Option<Arc<Expression>>,
    ) -> Result<Expression, AlgebraError> {
        let mut coefficient = canonical_coefficient(coefficient)?;
        if coefficient == 0.0 {
            return Ok(Expression::ZERO);
        }
        if exponent == 0.0 {
            return Self::constant(coefficient);
        }
        let mut inner = inner.filter(|g| **g != Expression::X);
        if let Some(g) = inner.clone() {
            if exponent == 1.0 {
                return g.scale(coefficient);
            }
            match &g.kind {
                Kind::Constant => {
                    let base = g.coefficient;
                    if base == 0.0 && exponent < 0.0 {
                        return Err(AlgebraError::DivisionByZero);
                    }
                    if base < 0.0 && exponent.fract() != 0.0 {
                        return Err(AlgebraError::ComplexResultRequired);
                    }
                    return Self::constant(coefficient * base.powf(exponent));
                }
                Kind::Monomial {
                    exponent: inner_exponent,
                    inner: inner_inner,
                } => {
                    return Self::monomial_arc(
                        coefficient * g.coefficient.powf(exponent),
                        exponent * inner_exponent,
                        inner_inner.clone(),
                    );
                }
                Kind::NaturalExponent { .. } => {
                    // exp(g)^p = exp(p*g), with the inner coefficient raised
                    // into the outer one.
                    let scaled_inner = {
                        let operable = g.operable_inner();
                        operable.with_coefficient(operable.coefficient * exponent)?
                    };
                    return Self::natural_exponent(
                        coefficient * g.coefficient.powf(exponent),
                        Some(scaled_inner),
                    );
                }
                Kind::Product { factors } => {
                    let mut raised = Vec::with_capacity(factors.len());
                    for factor in factors {
                        raised.push(Self::monomial_arc(1.0, exponent, Some(factor.clone()))?);
                    }
                    return Self::product(coefficient * g.coefficient.powf(exponent), raised);
                }
                Kind::Sum { .. } if exponent > 0.0 && exponent.fract() == 0.0 => {
                    return g.powi(exponent as i64)?.scale(coefficient);
                }
                _ => {}
            }

            // Pull a surviving inner's coefficient out into ours.
            if g.coefficient != 1.0 {
                coefficient =
                    canonical_coefficient(coefficient * g.coefficient.powf(exponent))?;
                if coefficient == 0.0 {
                    return Ok(Expression::ZERO);
                }
                inner = Some(Arc::new(g.with_coefficient(1.0)?));
            }
        }

        Ok(Expression {
            coefficient,
            kind: Kind::Monomial { exponent, inner },
        })
    }

    /// Builds `coefficient * exp(inner(x))` (`inner` of `None` meaning `x`),
    /// returning the simplest representation.
    ///
    /// Constant inners fold through `exp`; constant terms of a sum inner are
    /// absorbed into the outer coefficient, so `a*e^(x + c)` is always held
    /// as `(a*e^c)*e^x`.
    pub fn natural_exponent(
        coefficient: f64,
        inner: Option<Expression>,
    ) -> Result<Expression, AlgebraError> {
        Self::natural_exponent_arc(coefficient, inner.map(Arc::new))
    }

    pub(crate) fn natural_exponent_arc(
        coefficient: f64,
        inner: Option<Arc<Expression>>,
    ) -> Result<Expression, AlgebraError> {
        let coefficient = canonical_coefficient(coefficient)?;
        if coefficient == 0.0 {
            return Ok(Expression::ZERO);
        }
        let inner = inner.filter(|g| **g != Expression::X);
        if let Some(g) = inner.as_deref() {
            match &g.kind {
                Kind::Constant => {
                    return Self::constant(coefficient * g.coefficient.exp());
                }
                Kind::Sum { terms } => {
                    let mut absorbed = coefficient;
                    let mut retained = Vec::with_capacity(terms.len());
                    for term in terms {
                        if let Kind::Constant = term.kind {
                            absorbed *= term.coefficient.exp();
                        } else {
                            retained.push((**term).clone());
                        }
                    }
                    if retained.len() != terms.len() {
                        let reduced = Self::sum(1.0, retained)?;
                        return Self::natural_exponent_arc(
                            canonical_coefficient(absorbed)?,
                            Some(Arc::new(reduced)),
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(Expression {
            coefficient,
            kind: Kind::NaturalExponent { inner },
        })
    }

    /// Builds `coefficient * (terms_1 + ... + terms_n)`, returning the
    /// simplest representation.
    ///
    /// Nested sums flatten, the coefficient distributes into every term,
    /// terms of identical shape aggregate by adding coefficients, zero terms
    /// drop. No terms gives zero; a single surviving term is returned as-is.
    pub fn sum(coefficient: f64, terms: Vec<Expression>) -> Result<Expression, AlgebraError> {
        let coefficient = canonical_coefficient(coefficient)?;
        if coefficient == 0.0 {
            return Ok(Expression::ZERO);
        }

        let mut flattened = Vec::with_capacity(terms.len());
        for term in &terms {
            flatten_sum_term(&mut flattened, term, coefficient)?;
        }

        let mut buckets: FxHashMap<KindTag, Vec<Expression>> = FxHashMap::default();
        for term in flattened {
            aggregate_sum_term(&mut buckets, term)?;
        }

        let mut non_zero: Vec<Expression> = buckets.into_values().flatten().collect();
        if non_zero.is_empty() {
            return Ok(Expression::ZERO);
        }
        if non_zero.len() == 1 {
            return Ok(non_zero.swap_remove(0));
        }
        Ok(Expression {
            coefficient: 1.0,
            kind: Kind::Sum {
                terms: non_zero.into_iter().map(Arc::new).collect(),
            },
        })
    }

    /// Builds `coefficient * factors_1 * ... * factors_m`, returning the
    /// simplest representation.
    ///
    /// Nested products flatten, scalar content migrates to the coefficient,
    /// factors of identical shape aggregate by clean multiplication. Any sum
    /// among the factors forces full distribution, so the result is then a
    /// sum rather than a product. No factors gives the constant
    /// `coefficient`; a single surviving factor is returned scaled.
    pub fn product(
        coefficient: f64,
        factors: Vec<Expression>,
    ) -> Result<Expression, AlgebraError> {
        let mut coefficient = canonical_coefficient(coefficient)?;
        if coefficient == 0.0 {
            return Ok(Expression::ZERO);
        }

        let mut sums: Vec<Expression> = Vec::new();
        let mut buckets: FxHashMap<KindTag, Vec<Expression>> = FxHashMap::default();
        for factor in &factors {
            if flatten_product_factor(&mut buckets, &mut sums, &mut coefficient, factor)? {
                return Ok(Expression::ZERO);
            }
        }

        let final_factors: Vec<Expression> = buckets.into_values().flatten().collect();

        if !sums.is_empty() {
            // Distributing over the sums re-canonicalises the whole product
            // as a sum.
            let mut product = sums.remove(0);
            for factor in final_factors {
                product = product.mul(&factor)?;
            }
            while !sums.is_empty() {
                product = sums.remove(0).mul(&product)?;
            }
            return product.scale(coefficient);
        }

        let mut final_factors = final_factors;
        if final_factors.is_empty() {
            return Self::constant(coefficient);
        }
        if final_factors.len() == 1 {
            return final_factors.swap_remove(0).with_coefficient(coefficient);
        }
        Ok(Expression {
            coefficient,
            kind: Kind::Product {
                factors: final_factors.into_iter().map(Arc::new).collect(),
            },
        })
    }

    /// The Gaussian probability density with the given standard deviation
    /// and mean: `(1/(sigma*sqrt(2*pi))) * exp(-(x - mu)^2 / (2*sigma^2))`.
    pub fn gaussian_pdf(standard_deviation: f64, mean: f64) -> Result<Expression, AlgebraError> {
        let exponent_coefficient = -0.5 / standard_deviation.powi(2);
        let inner = Expression::sum(
            exponent_coefficient,
            vec![
                Expression::monomial(1.0, 2.0, None)?,
                Expression::monomial(-2.0 * mean, 1.0, None)?,
                Expression::constant(mean * mean)?,
            ],
        )?;
        let coefficient = 1.0 / (standard_deviation * (2.0 * PI).sqrt());
        Expression::natural_exponent(coefficient, Some(inner))
    }

    /// The outer coefficient.
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Whether this is the zero expression.
    pub fn is_zero(&self) -> bool {
        matches!(self.kind, Kind::Constant) && self.coefficient == 0.0
    }

    /// Whether this is a constant function.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, Kind::Constant)
    }

    pub(crate) fn tag(&self) -> KindTag {
        match self.kind {
            Kind::Constant => KindTag::Constant,
            Kind::Monomial { .. } => KindTag::Monomial,
            Kind::NaturalExponent { .. } => KindTag::NaturalExponent,
            Kind::Sum { .. } => KindTag::Sum,
            Kind::Product { .. } => KindTag::Product,
        }
    }

    /// The inner function of a monomial or natural exponent, with the
    /// identity made explicit. Sums and products have no inner slot.
    pub(crate) fn operable_inner(&self) -> Expression {
        match &self.kind {
            Kind::Monomial { inner, .. } | Kind::NaturalExponent { inner } => match inner {
                Some(g) => (**g).clone(),
                None => Expression::X,
            },
            _ => Expression::X,
        }
    }

    /// Evaluates the expression at `x`.
    pub fn evaluate(&self, x: f64) -> Result<f64, EvalError> {
        match &self.kind {
            Kind::Constant => Ok(self.coefficient),
            Kind::Monomial { exponent, inner } => {
                let base = match inner {
                    Some(g) => g.evaluate(x)?,
                    None => x,
                };
                if base == 0.0 && *exponent < 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                if base < 0.0 && exponent.fract() != 0.0 {
                    return Err(EvalError::ComplexResultRequired);
                }
                Ok(self.coefficient * base.powf(*exponent))
            }
            Kind::NaturalExponent { inner } => {
                let argument = match inner {
                    Some(g) => g.evaluate(x)?,
                    None => x,
                };
                Ok(self.coefficient * argument.exp())
            }
            Kind::Sum { terms } => {
                let mut total = 0.0;
                for term in terms {
                    total += term.evaluate(x)?;
                }
                Ok(self.coefficient * total)
            }
            Kind::Product { factors } => {
                let mut total = self.coefficient;
                for factor in factors {
                    total *= factor.evaluate(x)?;
                }
                Ok(total)
            }
        }
    }

    /// Substitutes `x -> inner(x)` throughout, re-canonicalising as it goes.
    ///
    /// Constants absorb composition. Termination follows from canonical
    /// inner nesting strictly decreasing on recursion.
    pub fn compose(&self, inner: &Expression) -> Result<Expression, AlgebraError> {
        match &self.kind {
            Kind::Constant => Ok(self.clone()),
            Kind::Monomial { exponent, inner: slot } => {
                let substituted = match slot {
                    Some(g) => g.compose(inner)?,
                    None => inner.clone(),
                };
                Expression::monomial(self.coefficient, *exponent, Some(substituted))
            }
            Kind::NaturalExponent { inner: slot } => {
                let substituted = match slot {
                    Some(g) => g.compose(inner)?,
                    None => inner.clone(),
                };
                Expression::natural_exponent(self.coefficient, Some(substituted))
            }
            Kind::Sum { terms } => {
                let mut composed = Vec::with_capacity(terms.len());
                for term in terms {
                    composed.push(term.compose(inner)?);
                }
                Expression::sum(self.coefficient, composed)
            }
            Kind::Product { factors } => {
                let mut composed = Vec::with_capacity(factors.len());
                for factor in factors {
                    composed.push(factor.compose(inner)?);
                }
                Expression::product(self.coefficient, composed)
            }
        }
    }

    /// Returns the same shape with the outer coefficient replaced.
    pub fn with_coefficient(&self, coefficient: f64) -> Result<Expression, AlgebraError> {
        if coefficient == self.coefficient {
            return Ok(self.clone());
        }
        match &self.kind {
            Kind::Constant => Self::constant(coefficient),
            Kind::Monomial { exponent, inner } => {
                Self::monomial_arc(coefficient, *exponent, inner.clone())
            }
            Kind::NaturalExponent { inner } => {
                Self::natural_exponent_arc(coefficient, inner.clone())
            }
            Kind::Sum { terms } => Self::sum(
                coefficient,
                terms.iter().map(|t| (**t).clone()).collect(),
            ),
            Kind::Product { factors } => Self::product(
                coefficient,
                factors.iter().map(|f| (**f).clone()).collect(),
            ),
        }
    }

    /// The multiplicative factors of this expression, each with coefficient
    /// one; the outer coefficient is not represented.
    pub(crate) fn factor_list(&self) -> Result<Vec<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Product { factors } => Ok(factors.iter().map(|f| (**f).clone()).collect()),
            _ => Ok(vec![self.with_coefficient(1.0)?]),
        }
    }

    /// Filters a candidate factor list down to the factors this expression
    /// actually contains, reducing exponents where a smaller power is the
    /// common part.
    pub(crate) fn common_factors(
        &self,
        candidates: &[Expression],
    ) -> Result<Vec<Expression>, AlgebraError> {
        match &self.kind {
            Kind::Constant | Kind::Sum { .. } => Ok(Vec::new()),
            Kind::Monomial { exponent, inner } => {
                let mut least: Option<f64> = None;
                for candidate in candidates {
                    if let Kind::Monomial {
                        exponent: candidate_exponent,
                        inner: candidate_inner,
                    } = &candidate.kind
                    {
                        if inner == candidate_inner {
                            let current = least.get_or_insert(*exponent);
                            if *candidate_exponent < *current {
                                *current = *candidate_exponent;
                            }
                        }
                    }
                }
                match least {
                    Some(common_exponent) => Ok(vec![Self::monomial_arc(
                        1.0,
                        common_exponent,
                        inner.clone(),
                    )?]),
                    None => Ok(Vec::new()),
                }
            }
            Kind::NaturalExponent { .. } => {
                let my_inner = self.operable_inner();
                let my_shape = my_inner.with_coefficient(1.0)?;
                let mut least: Option<f64> = None;
                for candidate in candidates {
                    if let Kind::NaturalExponent { .. } = candidate.kind {
                        let other_inner = candidate.operable_inner();
                        if my_shape == other_inner.with_coefficient(1.0)? {
                            let current = least.get_or_insert(my_inner.coefficient);
                            if other_inner.coefficient < *current {
                                *current = other_inner.coefficient;
                            }
                        }
                    }
                }
                match least {
                    Some(common_scale) => Ok(vec![Self::natural_exponent(
                        1.0,
                        Some(my_inner.with_coefficient(common_scale)?),
                    )?]),
                    None => Ok(Vec::new()),
                }
            }
            Kind::Product { factors } => {
                let mut established = Vec::new();
                for factor in factors {
                    established.extend(factor.common_factors(candidates)?);
                }
                Ok(established)
            }
        }
    }

    /// Extracts the factors common to every term of a sum and rewraps the
    /// expression as a product of those factors with the reduced sum.
    ///
    /// The result is exactly mathematically equivalent but may contain far
    /// fewer expensive calls (one shared `exp` instead of one per term),
    /// which is what the KDE pairwise functionals rely on. Non-sums are
    /// returned unchanged, as is any sum without a common factor.
    pub fn factorise(&self) -> Result<Expression, AlgebraError> {
        let Kind::Sum { terms } = &self.kind else {
            return Ok(self.clone());
        };
        let Some((first, rest)) = terms.split_first() else {
            return Ok(self.clone());
        };

        let mut common = first.factor_list()?;
        for term in rest {
            if common.is_empty() {
                break;
            }
            common = term.common_factors(&common)?;
        }
        if common.is_empty() {
            return Ok(self.clone());
        }

        let mut reduced = Vec::with_capacity(terms.len());
        for term in terms {
            let mut quotient = (**term).clone();
            for factor in &common {
                quotient = match quotient.div_cleanly(factor)? {
                    Some(q) => q,
                    None => return Ok(self.clone()),
                };
            }
            reduced.push(Arc::new(quotient));
        }

        // Built directly rather than through the product constructor: the
        // whole point is to keep the sum inside the product instead of
        // distributing back over it.
        let mut factors: Vec<Arc<Expression>> = common.into_iter().map(Arc::new).collect();
        factors.push(Arc::new(Expression {
            coefficient: 1.0,
            kind: Kind::Sum {
                terms: reduced,
            },
        }));
        Ok(Expression {
            coefficient: self.coefficient,
            kind: Kind::Product { factors },
        })
    }
}

fn flatten_sum_term(
    out: &mut Vec<Expression>,
    term: &Expression,
    scale: f64,
) -> Result<(), AlgebraError> {
    if let Kind::Sum { terms } = &term.kind {
        let nested_scale = canonical_coefficient(scale * term.coefficient)?;
        for nested in terms {
            flatten_sum_term(out, nested, nested_scale)?;
        }
        return Ok(());
    }
    let scaled = term.scale(scale)?;
    // Rescaling can itself canonicalise into a sum (a factorised product
    // distributes when its coefficient changes); flatten those too.
    if let Kind::Sum { .. } = scaled.kind {
        return flatten_sum_term(out, &scaled, 1.0);
    }
    if !scaled.is_zero() {
        out.push(scaled);
    }
    Ok(())
}

/// Inserts `term` into its kind bucket, first trying a clean addition
/// against every resident of that bucket; a successful combination is
/// removed and recursively reinserted.
fn aggregate_sum_term(
    buckets: &mut FxHashMap<KindTag, Vec<Expression>>,
    term: Expression,
) -> Result<(), AlgebraError> {
    let tag = term.tag();
    let combined = {
        let bucket = buckets.entry(tag).or_default();
        let mut found = None;
        for i in 0..bucket.len() {
            if let Some(sum) = bucket[i].add_cleanly(&term)? {
                bucket.remove(i);
                found = Some(sum);
                break;
            }
        }
        found
    };
    match combined {
        Some(sum) if sum.is_zero() => Ok(()),
        Some(sum) => aggregate_sum_term(buckets, sum),
        None => {
            buckets.entry(tag).or_default().push(term);
            Ok(())
        }
    }
}

/// Folds one factor into the product under construction. Returns `true`
/// when the factor annihilates the whole product.
fn flatten_product_factor(
    buckets: &mut FxHashMap<KindTag, Vec<Expression>>,
    sums: &mut Vec<Expression>,
    coefficient: &mut f64,
    factor: &Expression,
) -> Result<bool, AlgebraError> {
    if factor.is_zero() {
        return Ok(true);
    }
    *coefficient = canonical_coefficient(*coefficient * factor.coefficient)?;
    let stripped = factor.with_coefficient(1.0)?;
    match &stripped.kind {
        Kind::Constant => Ok(false),
        Kind::Product { factors } => {
            for nested in factors {
                if flatten_product_factor(buckets, sums, coefficient, nested)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Kind::Sum { .. } => {
            sums.push(stripped);
            Ok(false)
        }
        _ => {
            aggregate_product_factor(buckets, coefficient, stripped)?;
            Ok(false)
        }
    }
}

fn aggregate_product_factor(
    buckets: &mut FxHashMap<KindTag, Vec<Expression>>,
    coefficient: &mut f64,
    factor: Expression,
) -> Result<(), AlgebraError> {
    // Coefficients arising out of clean combinations migrate outward so the
    // stored factors stay at coefficient one.
    let factor = if factor.coefficient != 1.0 {
        *coefficient = canonical_coefficient(*coefficient * factor.coefficient)?;
        factor.with_coefficient(1.0)?
    } else {
        factor
    };
    if let Kind::Constant = factor.kind {
        return Ok(());
    }
    let tag = factor.tag();
    let combined = {
        let bucket = buckets.entry(tag).or_default();
        let mut found = None;
        for i in 0..bucket.len() {
            if let Some(product) = bucket[i].mul_cleanly(&factor)? {
                bucket.remove(i);
                found = Some(product);
                break;
            }
        }
        found
    };
    match combined {
        Some(product) => aggregate_product_factor(buckets, coefficient, product),
        None => {
            buckets.entry(tag).or_default().push(factor);
            Ok(())
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        if self.coefficient.to_bits() != other.coefficient.to_bits() {
            return false;
        }
        match (&self.kind, &other.kind) {
            (Kind::Constant, Kind::Constant) => true,
            (
                Kind::Monomial {
                    exponent: e1,
                    inner: i1,
                },
                Kind::Monomial {
                    exponent: e2,
                    inner: i2,
                },
            ) => e1.to_bits() == e2.to_bits() && i1 == i2,
            (Kind::NaturalExponent { inner: i1 }, Kind::NaturalExponent { inner: i2 }) => i1 == i2,
            (Kind::Sum { terms: a }, Kind::Sum { terms: b }) => multiset_eq(a, b),
            (Kind::Product { factors: a }, Kind::Product { factors: b }) => multiset_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Expression {}

fn multiset_eq(a: &[Arc<Expression>], b: &[Arc<Expression>]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<&Arc<Expression>> = b.iter().collect();
    for needle in a {
        match remaining.iter().position(|candidate| ***candidate == **needle) {
            Some(i) => {
                remaining.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coefficient.to_bits().hash(state);
        match &self.kind {
            Kind::Constant => 0u8.hash(state),
            Kind::Monomial { exponent, inner } => {
                1u8.hash(state);
                exponent.to_bits().hash(state);
                inner.hash(state);
            }
            Kind::NaturalExponent { inner } => {
                2u8.hash(state);
                inner.hash(state);
            }
            Kind::Sum { terms } => {
                3u8.hash(state);
                multiset_hash(terms, state);
            }
            Kind::Product { factors } => {
                4u8.hash(state);
                multiset_hash(factors, state);
            }
        }
    }
}

/// Order-invariant hashing: children are hashed independently and the
/// sorted sub-hashes feed the outer hasher.
fn multiset_hash<H: Hasher>(children: &[Arc<Expression>], state: &mut H) {
    let mut sub_hashes: Vec<u64> = children
        .iter()
        .map(|child| {
            let mut hasher = FxHasher::default();
            child.hash(&mut hasher);
            hasher.finish()
        })
        .collect();
    sub_hashes.sort_unstable();
    sub_hashes.hash(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hash_of(e: &Expression) -> u64 {
        let mut hasher = FxHasher::default();
        e.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn squared_sum_expands_to_polynomial() {
        let x_plus_one = Expression::sum(
            1.0,
            vec![Expression::X, Expression::constant(1.0).unwrap()],
        )
        .unwrap();
        let squared = Expression::monomial(1.0, 2.0, Some(x_plus_one)).unwrap();
        let expanded = Expression::sum(
            1.0,
            vec![
                Expression::monomial(1.0, 2.0, None).unwrap(),
                Expression::monomial(2.0, 1.0, None).unwrap(),
                Expression::constant(1.0).unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(squared, expanded);
        assert_eq!(hash_of(&squared), hash_of(&expanded));
    }

    #[test]
    fn squared_exponent_rewrites_to_scaled_exponent() {
        let e_to_x = Expression::natural_exponent(1.0, None).unwrap();
        let squared = Expression::monomial(1.0, 2.0, Some(e_to_x)).unwrap();
        let e_to_2x = Expression::natural_exponent(
            1.0,
            Some(Expression::monomial(2.0, 1.0, None).unwrap()),
        )
        .unwrap();
        assert_eq!(squared, e_to_2x);
    }

    #[test]
    fn constant_inner_folds_numerically() {
        let three_squared =
            Expression::monomial(1.0, 2.0, Some(Expression::constant(3.0).unwrap())).unwrap();
        assert_eq!(three_squared, Expression::constant(9.0).unwrap());

        let zero_negative =
            Expression::monomial(1.0, -1.0, Some(Expression::constant(0.0).unwrap()));
        assert_eq!(zero_negative, Err(AlgebraError::DivisionByZero));

        let negative_sqrt =
            Expression::monomial(1.0, 0.5, Some(Expression::constant(-4.0).unwrap()));
        assert_eq!(negative_sqrt, Err(AlgebraError::ComplexResultRequired));
    }

    #[test]
    fn nested_monomials_collapse() {
        let five_sqrt_x = Expression::monomial(5.0, 0.5, None).unwrap();
        let cubed = Expression::monomial(1.0, 3.0, Some(five_sqrt_x)).unwrap();
        assert_eq!(cubed, Expression::monomial(125.0, 1.5, None).unwrap());
    }

    #[test]
    fn exponent_pushes_into_product_factors() {
        let x_times_e_to_x = Expression::product(
            1.0,
            vec![
                Expression::X,
                Expression::natural_exponent(1.0, None).unwrap(),
            ],
        )
        .unwrap();
        let squared = Expression::monomial(1.0, 2.0, Some(x_times_e_to_x)).unwrap();
        let expected = Expression::product(
            1.0,
            vec![
                Expression::monomial(1.0, 2.0, None).unwrap(),
                Expression::natural_exponent(
                    1.0,
                    Some(Expression::monomial(2.0, 1.0, None).unwrap()),
                )
                .unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(squared, expected);
        assert_eq!(hash_of(&squared), hash_of(&expected));
    }

    #[test]
    fn sum_aggregates_like_terms_and_drops_zeros() {
        let aggregated = Expression::sum(
            1.0,
            vec![
                Expression::monomial(2.0, 2.0, None).unwrap(),
                Expression::monomial(3.0, 2.0, None).unwrap(),
                Expression::constant(0.0).unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(aggregated, Expression::monomial(5.0, 2.0, None).unwrap());
    }

    #[test]
    fn opposite_terms_cancel_to_zero() {
        let cancelled = Expression::sum(
            1.0,
            vec![
                Expression::monomial(1.0, 3.0, None).unwrap(),
                Expression::monomial(-1.0, 3.0, None).unwrap(),
            ],
        )
        .unwrap();
        assert!(cancelled.is_zero());
    }

    #[test]
    fn sum_equality_is_order_invariant() {
        let x2 = Expression::monomial(1.0, 2.0, None).unwrap();
        let ex = Expression::natural_exponent(1.0, None).unwrap();
        let one = Expression::constant(1.0).unwrap();
        let forward =
            Expression::sum(1.0, vec![x2.clone(), ex.clone(), one.clone()]).unwrap();
        let backward = Expression::sum(1.0, vec![one, ex, x2]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(hash_of(&forward), hash_of(&backward));
    }

    #[test]
    fn product_extracts_scalars_and_aggregates_powers() {
        let combined = Expression::product(
            2.0,
            vec![
                Expression::monomial(3.0, 2.0, None).unwrap(),
                Expression::monomial(1.0, 3.0, None).unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(combined, Expression::monomial(6.0, 5.0, None).unwrap());
    }

    #[test]
    fn product_with_zero_factor_is_zero() {
        let zeroed = Expression::product(
            3.0,
            vec![Expression::X, Expression::ZERO],
        )
        .unwrap();
        assert!(zeroed.is_zero());
    }

    #[test]
    fn product_distributes_over_sums() {
        // x * (x + 1) = x^2 + x
        let x_plus_one = Expression::sum(
            1.0,
            vec![Expression::X, Expression::constant(1.0).unwrap()],
        )
        .unwrap();
        let distributed = Expression::product(1.0, vec![Expression::X, x_plus_one]).unwrap();
        let expected = Expression::sum(
            1.0,
            vec![
                Expression::monomial(1.0, 2.0, None).unwrap(),
                Expression::X,
            ],
        )
        .unwrap();
        assert_eq!(distributed, expected);
    }

    #[test]
    fn infinite_coefficients_are_rejected() {
        assert_eq!(
            Expression::constant(f64::INFINITY),
            Err(AlgebraError::NonFiniteCoefficient)
        );
        assert_eq!(
            Expression::monomial(f64::NEG_INFINITY, 2.0, None),
            Err(AlgebraError::NonFiniteCoefficient)
        );
    }

    #[test]
    fn exponent_absorbs_constant_sum_terms() {
        // e^(x + 2) == e^2 * e^x
        let inner = Expression::sum(
            1.0,
            vec![Expression::X, Expression::constant(2.0).unwrap()],
        )
        .unwrap();
        let shifted = Expression::natural_exponent(1.0, Some(inner)).unwrap();
        let scaled = Expression::natural_exponent(2.0_f64.exp(), None).unwrap();
        assert_eq!(shifted, scaled);
    }

    #[test]
    fn evaluation_matches_classical_definitions() {
        let x_squared = Expression::monomial(1.0, 2.0, None).unwrap();
        let four_x_cubed = Expression::monomial(4.0, 3.0, None).unwrap();
        let six_over_x = Expression::monomial(6.0, -1.0, None).unwrap();
        let sqrt_x = Expression::monomial(1.0, 0.5, None).unwrap();

        let mut x = -10_000.0;
        while x < 10_000.0 {
            assert_relative_eq!(x_squared.evaluate(x).unwrap(), x * x, max_relative = 1.0e-10);
            assert_relative_eq!(
                four_x_cubed.evaluate(x).unwrap(),
                4.0 * x * x * x,
                max_relative = 1.0e-10
            );
            if x == 0.0 {
                assert_eq!(six_over_x.evaluate(x), Err(EvalError::DivisionByZero));
            } else {
                assert_relative_eq!(
                    six_over_x.evaluate(x).unwrap(),
                    6.0 / x,
                    max_relative = 1.0e-10
                );
            }
            if x < 0.0 {
                assert_eq!(sqrt_x.evaluate(x), Err(EvalError::ComplexResultRequired));
            } else {
                assert_relative_eq!(
                    sqrt_x.evaluate(x).unwrap(),
                    x.sqrt(),
                    max_relative = 1.0e-10
                );
            }
            x += 161.5;
        }
    }

    #[test]
    fn composition_substitutes_and_canonicalises() {
        // (x^2) o (x + 1) expands to x^2 + 2x + 1
        let x_squared = Expression::monomial(1.0, 2.0, None).unwrap();
        let x_plus_one = Expression::sum(
            1.0,
            vec![Expression::X, Expression::constant(1.0).unwrap()],
        )
        .unwrap();
        let composed = x_squared.compose(&x_plus_one).unwrap();
        for x in [-2.5, -1.0, 0.0, 0.3, 4.0] {
            assert_relative_eq!(
                composed.evaluate(x).unwrap(),
                (x + 1.0) * (x + 1.0),
                max_relative = 1.0e-12
            );
        }

        // Constants ignore composition.
        let five = Expression::constant(5.0).unwrap();
        assert_eq!(five.compose(&x_plus_one).unwrap(), five);
    }

    #[test]
    fn factorised_sum_preserves_values() {
        // x^3 + x^2 factorises through x^2
        let cubic = Expression::sum(
            1.0,
            vec![
                Expression::monomial(1.0, 3.0, None).unwrap(),
                Expression::monomial(1.0, 2.0, None).unwrap(),
            ],
        )
        .unwrap();
        let factorised = cubic.factorise().unwrap();
        for x in [-3.0, -0.5, 0.0, 1.0, 2.5] {
            assert_relative_eq!(
                factorised.evaluate(x).unwrap(),
                cubic.evaluate(x).unwrap(),
                max_relative = 1.0e-12,
                epsilon = 1.0e-12
            );
        }
    }

    #[test]
    fn gaussian_pdf_peaks_at_mean() {
        let pdf = Expression::gaussian_pdf(2.0, 1.0).unwrap();
        let peak = pdf.evaluate(1.0).unwrap();
        assert_relative_eq!(peak, 1.0 / (2.0 * (2.0 * PI).sqrt()), max_relative = 1.0e-12);
        assert!(pdf.evaluate(0.0).unwrap() < peak);
        assert!(pdf.evaluate(2.0).unwrap() < peak);
        assert_relative_eq!(
            pdf.evaluate(0.0).unwrap(),
            pdf.evaluate(2.0).unwrap(),
            max_relative = 1.0e-12
        );
    }
}
