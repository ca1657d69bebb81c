//! Human-readable rendering of expressions.

use std::fmt;

use crate::calculus::expression::Kind;
use crate::calculus::Expression;
use crate::math::round_to_significant_figures;

/// Significant figures used by the `Display` implementation.
pub const DEFAULT_SIGNIFICANT_FIGURES: usize = 3;

fn format_number(value: f64, sig_figs: usize) -> String {
    format!("{}", round_to_significant_figures(value, sig_figs))
}

impl Expression {
    /// Renders the expression with every numeric value rounded to
    /// `sig_figs` significant figures (not decimal places).
    pub fn format_sig(&self, sig_figs: usize) -> String {
        match &self.kind {
            Kind::Constant => format_number(self.coefficient, sig_figs),
            Kind::Monomial { exponent, inner } => {
                let mut rendered = String::new();
                if self.coefficient != 1.0 {
                    rendered.push_str(&format_number(self.coefficient, sig_figs));
                }
                match inner {
                    None => rendered.push('x'),
                    Some(g) => {
                        rendered.push('(');
                        rendered.push_str(&g.format_sig(sig_figs));
                        rendered.push(')');
                    }
                }
                if *exponent != 1.0 {
                    rendered.push('^');
                    rendered.push_str(&format_number(*exponent, sig_figs));
                }
                rendered
            }
            Kind::NaturalExponent { inner } => {
                let coefficient = if self.coefficient != 1.0 {
                    format_number(self.coefficient, sig_figs)
                } else {
                    String::new()
                };
                let argument = match inner {
                    None => "x".to_string(),
                    Some(g) => format!("({})", g.format_sig(sig_figs)),
                };
                format!("{coefficient}e^{argument}")
            }
            Kind::Sum { terms } => {
                let body = terms
                    .iter()
                    .map(|t| t.format_sig(sig_figs))
                    .collect::<Vec<_>>()
                    .join(" + ");
                if self.coefficient == 1.0 {
                    body
                } else {
                    format!("{}({body})", format_number(self.coefficient, sig_figs))
                }
            }
            Kind::Product { factors } => {
                let body = factors
                    .iter()
                    .map(|f| format!("({})", f.format_sig(sig_figs)))
                    .collect::<Vec<_>>()
                    .join("*");
                if self.coefficient == 1.0 {
                    body
                } else {
                    format!("{}{body}", format_number(self.coefficient, sig_figs))
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_sig(DEFAULT_SIGNIFICANT_FIGURES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monomials_render_compactly() {
        assert_eq!(
            Expression::monomial(3.0, 2.0, None).unwrap().to_string(),
            "3x^2"
        );
        assert_eq!(Expression::X.to_string(), "x");
        assert_eq!(
            Expression::monomial(1.0, 0.5, None).unwrap().to_string(),
            "x^0.5"
        );
    }

    #[test]
    fn exponents_render_with_parenthesised_inner() {
        let six_e_2x = Expression::natural_exponent(
            6.0,
            Some(Expression::monomial(2.0, 1.0, None).unwrap()),
        )
        .unwrap();
        assert_eq!(six_e_2x.to_string(), "6e^(2x)");
        assert_eq!(
            Expression::natural_exponent(1.0, None).unwrap().to_string(),
            "e^x"
        );
    }

    #[test]
    fn sums_join_terms_with_plus() {
        let sum = Expression::sum(
            1.0,
            vec![
                Expression::monomial(1.0, 2.0, None).unwrap(),
                Expression::constant(1.0).unwrap(),
            ],
        )
        .unwrap();
        let rendered = sum.to_string();
        // Term order inside a sum is not part of the canonical form.
        assert!(rendered == "x^2 + 1" || rendered == "1 + x^2", "{rendered}");
    }

    #[test]
    fn constants_round_to_significant_figures() {
        assert_eq!(Expression::constant(1234.5).unwrap().to_string(), "1230");
        assert_eq!(
            Expression::constant(0.0012345).unwrap().format_sig(2),
            "0.0012"
        );
    }
}
