//! Domain classification of expressions.

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{ExpressionError, TransformResult};
use crate::expression::{Constant, Expression};

/// Which independent variable an expression is a function of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// A function of time `t`
    Time,
    /// A function of the Laplace variable `s`
    Frequency,
    /// Involves neither time nor frequency
    Invariant,
}

impl Domain {
    pub fn is_invariant(&self) -> bool {
        matches!(self, Domain::Invariant)
    }

    /// The domain on the other side of the transform; invariant maps to itself
    pub fn opposite(&self) -> Domain {
        match self {
            Domain::Time => Domain::Frequency,
            Domain::Frequency => Domain::Time,
            Domain::Invariant => Domain::Invariant,
        }
    }

    /// Merge two domains under one operator
    fn combine(self, other: Domain, node: &str) -> TransformResult<Domain> {
        match (self, other) {
            (Domain::Invariant, d) | (d, Domain::Invariant) => Ok(d),
            (a, b) if a == b => Ok(a),
            (a, b) => Err(ExpressionError::domain_mismatch(node, a, b)),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Time => write!(f, "time"),
            Domain::Frequency => write!(f, "frequency"),
            Domain::Invariant => write!(f, "invariant"),
        }
    }
}

impl Expression {
    /// Classify the expression as time, frequency or invariant.
    ///
    /// Fails with [`ExpressionError::DomainMismatch`] when time- and
    /// frequency-domain quantities are combined under one node anywhere in
    /// the tree.
    pub fn domain(&self) -> TransformResult<Domain> {
        match self {
            Expression::Constant(_) => Ok(Domain::Invariant),
            Expression::Independent(variable) => Ok(variable.domain()),
            Expression::Voltage { domain, .. } | Expression::Current { domain, .. } => Ok(*domain),
            Expression::Sum(terms) | Expression::Product(terms) => {
                terms.iter().try_fold(Domain::Invariant, |acc, term| {
                    acc.combine(term.domain()?, self.kind_name())
                })
            }
            Expression::Exponent { base, exponent } => {
                let exponent_domain = exponent.domain()?;
                if matches!(base.as_ref(), Expression::Constant(Constant::E)) {
                    return Ok(exponent_domain);
                }
                let base_domain = base.domain()?;
                match (base_domain, exponent_domain) {
                    (d, Domain::Invariant) => Ok(d),
                    (b, e) => Err(ExpressionError::domain_mismatch(self.kind_name(), b, e)),
                }
            }
            Expression::Derivative(subject) => subject.domain(),
            Expression::Integral { integrand, lower, upper } => {
                let domain = integrand.domain()?;
                for bound in [lower, upper] {
                    let bound_domain = bound.domain()?;
                    if !domain.is_invariant() {
                        domain.combine(bound_domain, self.kind_name())?;
                    }
                }
                Ok(domain)
            }
        }
    }

    pub fn is_invariant(&self) -> TransformResult<bool> {
        Ok(self.domain()?.is_invariant())
    }
}
