//! Laplace transform rewrites between the time and frequency domains.
//!
//! Both directions are structural: each node is rewritten by a closed-form
//! identity (linearity, scalar multiplication, differentiation, running
//! integration, exponential shift) or the rewrite fails with
//! [`ExpressionError::UnknownTransform`]. Domain-invariant sub-trees are
//! passed through untouched. Initial conditions are taken as zero.
//!
//! | time domain            | frequency domain         |
//! |------------------------|--------------------------|
//! | `t`                    | `s`                      |
//! | `v(a,b)`, `i(a,b)`     | `V(a,b)`, `I(a,b)`       |
//! | `k·x(t)`               | `k·X(s)`                 |
//! | `ddt(x)`               | `s·X(s)`                 |
//! | `int(x, 0, t)`         | `X(s)·s^-1`              |
//! | `e^(a·t)`              | `(s + (-a))^-1`          |

use log::{debug, trace};

use crate::domain::Domain;
use crate::error::{ExpressionError, TransformResult};
use crate::expression::{Constant, Expression, Variable};

impl Expression {
    /// Convert a time-domain (or invariant) expression to the frequency domain
    pub fn to_frequency(&self) -> TransformResult<Expression> {
        let domain = self.domain()?;
        debug!("Transforming {} {} expression to frequency domain", domain, self.kind_name());

        match domain {
            Domain::Invariant => Ok(self.clone()),
            Domain::Time => forward(self),
            Domain::Frequency => Err(ExpressionError::unknown_transform(
                self.kind_name(),
                Domain::Frequency,
                "expression is already in the frequency domain",
            )),
        }
    }

    /// Convert a frequency-domain (or invariant) expression to the time domain
    pub fn to_time(&self) -> TransformResult<Expression> {
        let domain = self.domain()?;
        debug!("Transforming {} {} expression to time domain", domain, self.kind_name());

        match domain {
            Domain::Invariant => Ok(self.clone()),
            Domain::Frequency => inverse(self),
            Domain::Time => Err(ExpressionError::unknown_transform(
                self.kind_name(),
                Domain::Time,
                "expression is already in the time domain",
            )),
        }
    }
}

fn unknown_frequency(expr: &Expression, reason: String) -> ExpressionError {
    ExpressionError::unknown_transform(expr.kind_name(), Domain::Frequency, reason)
}

fn unknown_time(expr: &Expression, reason: String) -> ExpressionError {
    ExpressionError::unknown_transform(expr.kind_name(), Domain::Time, reason)
}

fn transform_all(
    terms: &[Expression],
    rewrite: fn(&Expression) -> TransformResult<Expression>,
) -> TransformResult<Vec<Expression>> {
    terms.iter().map(rewrite).collect()
}

/// Flags marking which factors depend on the independent variable
fn varying_flags(factors: &[Expression]) -> TransformResult<Vec<bool>> {
    factors
        .iter()
        .map(|factor| Ok(!factor.is_invariant()?))
        .collect()
}

/// `a` for an exponent of the form `a·t`, `t·a` or plain `t`
fn exponential_rate(exponent: &Expression) -> Option<Constant> {
    match exponent {
        Expression::Independent(Variable::Time) => Some(Constant::One),
        Expression::Product(factors) if factors.len() == 2 => match (&factors[0], &factors[1]) {
            (Expression::Constant(a), Expression::Independent(Variable::Time))
            | (Expression::Independent(Variable::Time), Expression::Constant(a)) => Some(*a),
            _ => None,
        },
        _ => None,
    }
}

/// `c` for a pole base of the form `s + c` or `c + s`
fn pole_offset(base: &Expression) -> Option<Constant> {
    match base {
        Expression::Sum(terms) if terms.len() == 2 => match (&terms[0], &terms[1]) {
            (Expression::Independent(Variable::Frequency), Expression::Constant(c))
            | (Expression::Constant(c), Expression::Independent(Variable::Frequency)) => Some(*c),
            _ => None,
        },
        _ => None,
    }
}

/// `s^-1`, the running integrator
fn is_integrator(expr: &Expression) -> bool {
    match expr {
        Expression::Exponent { base, exponent } => {
            base.is_variable(Variable::Frequency)
                && matches!(exponent.as_ref(), Expression::Constant(c) if c.is_minus_one())
        }
        _ => false,
    }
}

fn forward(expr: &Expression) -> TransformResult<Expression> {
    if expr.is_invariant()? {
        return Ok(expr.clone());
    }
    trace!("forward rewrite of {}", expr.kind_name());

    match expr {
        Expression::Constant(_) => Ok(expr.clone()),
        Expression::Independent(_) => Ok(Expression::frequency()),
        Expression::Voltage { which, .. } => Ok(Expression::voltage(*which, Domain::Frequency)),
        Expression::Current { which, .. } => Ok(Expression::current(*which, Domain::Frequency)),
        Expression::Sum(terms) => Ok(Expression::sum_of(transform_all(terms, forward)?)),
        Expression::Product(factors) => {
            let varying = varying_flags(factors)?;
            let count = varying.iter().filter(|&&v| v).count();
            if count > 1 {
                return Err(unknown_frequency(
                    expr,
                    format!("{} time-domain factors would need a convolution", count),
                ));
            }

            let mut terms = Vec::with_capacity(factors.len());
            for (factor, varies) in factors.iter().zip(varying) {
                terms.push(if varies { forward(factor)? } else { factor.clone() });
            }
            Ok(Expression::product_of(terms))
        }
        Expression::Derivative(subject) => Ok(Expression::product(Expression::frequency(), forward(subject)?)),
        Expression::Integral { integrand, lower, upper } => {
            if !lower.is_zero() || !upper.is_variable(Variable::Time) {
                return Err(unknown_frequency(
                    expr,
                    format!("only integrals from 0 to t are supported, found bounds {} and {}", lower, upper),
                ));
            }
            Ok(Expression::product(
                forward(integrand)?,
                Expression::reciprocal(Expression::frequency()),
            ))
        }
        Expression::Exponent { base, exponent } => {
            if !matches!(base.as_ref(), Expression::Constant(Constant::E)) {
                return Err(unknown_frequency(expr, format!("base {} is not e", base)));
            }
            let rate = exponential_rate(exponent)
                .ok_or_else(|| unknown_frequency(expr, format!("exponent {} is not of the form a*t", exponent)))?;

            Ok(Expression::reciprocal(Expression::sum(
                Expression::frequency(),
                Expression::Constant(rate.negated()),
            )))
        }
    }
}

fn inverse(expr: &Expression) -> TransformResult<Expression> {
    if expr.is_invariant()? {
        return Ok(expr.clone());
    }
    trace!("inverse rewrite of {}", expr.kind_name());

    match expr {
        Expression::Constant(_) => Ok(expr.clone()),
        Expression::Independent(_) => Ok(Expression::time()),
        Expression::Voltage { which, .. } => Ok(Expression::voltage(*which, Domain::Time)),
        Expression::Current { which, .. } => Ok(Expression::current(*which, Domain::Time)),
        Expression::Sum(terms) => Ok(Expression::sum_of(transform_all(terms, inverse)?)),
        Expression::Product(factors) => inverse_product(expr, factors),
        Expression::Exponent { base, exponent } => {
            let offset = match exponent.as_ref() {
                Expression::Constant(c) if c.is_minus_one() => pole_offset(base),
                _ => None,
            };
            match offset {
                Some(c) => Ok(Expression::exponent(
                    Expression::e(),
                    Expression::product(Expression::Constant(c.negated()), Expression::time()),
                )),
                None => Err(unknown_time(expr, format!("{} is not of the form (s + a)^-1", expr))),
            }
        }
        Expression::Derivative(_) | Expression::Integral { .. } => Err(unknown_time(
            expr,
            "no inverse rule for calculus over a frequency-domain operand".to_string(),
        )),
    }
}

/// Inverse of a product with several frequency-dependent factors.
///
/// Factors are taken off the ends in a single pass: end scalars move outside,
/// a trailing `s^-1` becomes a running integral and a leading `s` a
/// derivative, until one varying factor is left. Integrals nest inside
/// derivatives, so `s·X(s)·s^-1` maps to `ddt(int(x, 0, t))`.
fn inverse_product(expr: &Expression, factors: &[Expression]) -> TransformResult<Expression> {
    let varying = varying_flags(factors)?;
    let mut count = varying.iter().filter(|&&v| v).count();

    let (mut lo, mut hi) = (0, factors.len());
    let (mut leading, mut trailing) = (Vec::new(), Vec::new());
    let (mut derivatives, mut integrals) = (0, 0);
    while count > 1 && lo < hi {
        if !varying[hi - 1] {
            hi -= 1;
            trailing.push(factors[hi].clone());
        } else if is_integrator(&factors[hi - 1]) {
            hi -= 1;
            integrals += 1;
            count -= 1;
        } else if !varying[lo] {
            leading.push(factors[lo].clone());
            lo += 1;
        } else if factors[lo].is_variable(Variable::Frequency) {
            lo += 1;
            derivatives += 1;
            count -= 1;
        } else {
            break;
        }
    }

    if count > 1 {
        return Err(unknown_time(
            expr,
            format!("{} frequency-domain factors would need a convolution", count),
        ));
    }

    // Scalar multiple of a single signal
    let mut terms = Vec::with_capacity(hi - lo);
    for (factor, varies) in factors[lo..hi].iter().zip(&varying[lo..hi]) {
        terms.push(if *varies { inverse(factor)? } else { factor.clone() });
    }
    let mut result = Expression::product_of(terms);
    if lo == 0 && hi == factors.len() {
        return Ok(result);
    }

    trace!("peeled {} derivative(s) and {} integral(s)", derivatives, integrals);
    for _ in 0..integrals {
        result = Expression::running_integral(result);
    }
    for _ in 0..derivatives {
        result = Expression::derivative(result);
    }

    leading.push(result);
    leading.extend(trailing.into_iter().rev());
    Ok(Expression::product_of(leading))
}
