//! Symbolic expression tree over circuit voltages and currents.
//!
//! Expressions are immutable values. Every composite node owns its children,
//! and voltage/current terms refer to pins only through [`PinId`] handles.
//!
//! Sums and products are kept flat: building a sum from an operand that is
//! already a sum splices that operand's terms in place, so a [`Expression::Sum`]
//! produced by the constructors never has a direct `Sum` child (and likewise
//! for products). Term order is exactly construction order.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, Current, PinId, Voltage};
use crate::domain::Domain;

/// A literal scalar. `e`, `1` and `-1` are recognised symbolically so the
/// transform rules never compare floats against them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConstant")]
pub enum Constant {
    E,
    One,
    MinusOne,
    Arbitrary(f64),
}

/// Wire form of [`Constant`]; loaded values go through [`Constant::new`]
#[derive(Deserialize)]
#[serde(rename = "Constant")]
enum RawConstant {
    E,
    One,
    MinusOne,
    Arbitrary(f64),
}

impl From<RawConstant> for Constant {
    fn from(raw: RawConstant) -> Self {
        match raw {
            RawConstant::E => Constant::E,
            RawConstant::One => Constant::One,
            RawConstant::MinusOne => Constant::MinusOne,
            RawConstant::Arbitrary(value) => Constant::new(value),
        }
    }
}

impl Constant {
    /// Build a constant, recognising `1` and `-1`
    pub fn new(value: f64) -> Self {
        if value == 1.0 {
            Constant::One
        } else if value == -1.0 {
            Constant::MinusOne
        } else {
            Constant::Arbitrary(value)
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Constant::E => std::f64::consts::E,
            Constant::One => 1.0,
            Constant::MinusOne => -1.0,
            Constant::Arbitrary(value) => *value,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Constant::Arbitrary(value) if *value == 0.0)
    }

    pub fn is_minus_one(&self) -> bool {
        self.value() == -1.0
    }

    pub fn is_negative(&self) -> bool {
        self.value() < 0.0
    }

    pub fn negated(&self) -> Self {
        match self {
            Constant::One => Constant::MinusOne,
            Constant::MinusOne => Constant::One,
            other => Constant::new(-other.value()),
        }
    }
}

impl Default for Constant {
    fn default() -> Self {
        Constant::One
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::E => write!(f, "e"),
            Constant::One => write!(f, "1"),
            Constant::MinusOne => write!(f, "-1"),
            Constant::Arbitrary(value) => write!(f, "{}", value),
        }
    }
}

/// The independent variable: `t` in the time domain, `s` in the frequency domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variable {
    Time,
    Frequency,
}

impl Variable {
    pub fn domain(&self) -> Domain {
        match self {
            Variable::Time => Domain::Time,
            Variable::Frequency => Domain::Frequency,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Variable::Time => "t",
            Variable::Frequency => "s",
        }
    }
}

/// Built through the constructors below, which keep sums and products flat.
/// Deserialized trees are normalised the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawExpression")]
pub enum Expression {
    Constant(Constant),
    Exponent {
        base: Box<Expression>,
        exponent: Box<Expression>,
    },
    Sum(Vec<Expression>),
    Product(Vec<Expression>),
    Integral {
        integrand: Box<Expression>,
        lower: Box<Expression>,
        upper: Box<Expression>,
    },
    /// Time derivative of the subject
    Derivative(Box<Expression>),
    Independent(Variable),
    Voltage {
        which: Voltage,
        domain: Domain,
    },
    Current {
        which: Current,
        domain: Domain,
    },
}

/// Wire form of [`Expression`], rebuilt through the flattening constructors
#[derive(Deserialize)]
#[serde(rename = "Expression")]
enum RawExpression {
    Constant(Constant),
    Exponent {
        base: Box<Expression>,
        exponent: Box<Expression>,
    },
    Sum(Vec<Expression>),
    Product(Vec<Expression>),
    Integral {
        integrand: Box<Expression>,
        lower: Box<Expression>,
        upper: Box<Expression>,
    },
    Derivative(Box<Expression>),
    Independent(Variable),
    Voltage {
        which: Voltage,
        domain: Domain,
    },
    Current {
        which: Current,
        domain: Domain,
    },
}

impl From<RawExpression> for Expression {
    fn from(raw: RawExpression) -> Self {
        match raw {
            RawExpression::Constant(c) => Expression::Constant(c),
            RawExpression::Exponent { base, exponent } => Expression::Exponent { base, exponent },
            RawExpression::Sum(terms) => Expression::sum_of(terms),
            RawExpression::Product(factors) => Expression::product_of(factors),
            RawExpression::Integral { integrand, lower, upper } => {
                Expression::Integral { integrand, lower, upper }
            }
            RawExpression::Derivative(subject) => Expression::Derivative(subject),
            RawExpression::Independent(variable) => Expression::Independent(variable),
            RawExpression::Voltage { which, domain } => Expression::Voltage { which, domain },
            RawExpression::Current { which, domain } => Expression::Current { which, domain },
        }
    }
}

impl Expression {
    pub fn constant(value: f64) -> Self {
        Expression::Constant(Constant::new(value))
    }

    pub fn e() -> Self {
        Expression::Constant(Constant::E)
    }

    pub fn one() -> Self {
        Expression::Constant(Constant::One)
    }

    pub fn minus_one() -> Self {
        Expression::Constant(Constant::MinusOne)
    }

    pub fn zero() -> Self {
        Expression::Constant(Constant::Arbitrary(0.0))
    }

    pub fn independent(variable: Variable) -> Self {
        Expression::Independent(variable)
    }

    /// The time variable `t`
    pub fn time() -> Self {
        Expression::Independent(Variable::Time)
    }

    /// The frequency variable `s`
    pub fn frequency() -> Self {
        Expression::Independent(Variable::Frequency)
    }

    pub fn voltage(which: Voltage, domain: Domain) -> Self {
        Expression::Voltage { which, domain }
    }

    pub fn current(which: Current, domain: Domain) -> Self {
        Expression::Current { which, domain }
    }

    /// `left + right`, splicing nested sums
    pub fn sum(left: Expression, right: Expression) -> Self {
        let mut terms = Vec::new();
        splice_sum(&mut terms, left);
        splice_sum(&mut terms, right);
        Expression::Sum(terms)
    }

    /// `left · right`, splicing nested products
    pub fn product(left: Expression, right: Expression) -> Self {
        let mut terms = Vec::new();
        splice_product(&mut terms, left);
        splice_product(&mut terms, right);
        Expression::Product(terms)
    }

    /// Sum of any number of terms. A single term is returned as is and an
    /// empty list is the constant zero.
    pub fn sum_of<I: IntoIterator<Item = Expression>>(terms: I) -> Self {
        let mut flat = Vec::new();
        for term in terms {
            splice_sum(&mut flat, term);
        }
        match flat.len() {
            0 => Expression::zero(),
            1 => flat.remove(0),
            _ => Expression::Sum(flat),
        }
    }

    /// Product of any number of factors. A single factor is returned as is
    /// and an empty list is the constant one.
    pub fn product_of<I: IntoIterator<Item = Expression>>(factors: I) -> Self {
        let mut flat = Vec::new();
        for factor in factors {
            splice_product(&mut flat, factor);
        }
        match flat.len() {
            0 => Expression::one(),
            1 => flat.remove(0),
            _ => Expression::Product(flat),
        }
    }

    pub fn exponent(base: Expression, exponent: Expression) -> Self {
        Expression::Exponent {
            base: Box::new(base),
            exponent: Box::new(exponent),
        }
    }

    /// `x^-1`
    pub fn reciprocal(x: Expression) -> Self {
        Expression::exponent(x, Expression::minus_one())
    }

    pub fn derivative(subject: Expression) -> Self {
        Expression::Derivative(Box::new(subject))
    }

    pub fn integral(integrand: Expression, lower: Expression, upper: Expression) -> Self {
        Expression::Integral {
            integrand: Box::new(integrand),
            lower: Box::new(lower),
            upper: Box::new(upper),
        }
    }

    /// Integral of `integrand` from 0 to `t`
    pub fn running_integral(integrand: Expression) -> Self {
        Expression::integral(integrand, Expression::zero(), Expression::time())
    }

    /// `-self`; constants are negated in place, anything else is scaled by -1
    pub fn negated(self) -> Self {
        match self {
            Expression::Constant(c) => Expression::Constant(c.negated()),
            other => Expression::product(Expression::minus_one(), other),
        }
    }

    /// Terms of a sum or factors of a product, empty for every other node
    pub fn terms(&self) -> &[Expression] {
        match self {
            Expression::Sum(terms) | Expression::Product(terms) => terms,
            _ => &[],
        }
    }

    pub fn as_constant(&self) -> Option<Constant> {
        match self {
            Expression::Constant(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_variable(&self, variable: Variable) -> bool {
        matches!(self, Expression::Independent(v) if *v == variable)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expression::Constant(c) if c.is_zero())
    }

    /// Human-readable name of the node kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expression::Constant(_) => "constant",
            Expression::Exponent { .. } => "exponent",
            Expression::Sum(_) => "sum",
            Expression::Product(_) => "product",
            Expression::Integral { .. } => "integral",
            Expression::Derivative(_) => "derivative",
            Expression::Independent(_) => "independent variable",
            Expression::Voltage { .. } => "voltage term",
            Expression::Current { .. } => "current term",
        }
    }

    /// Total number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.children().map(Expression::node_count).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children().map(Expression::depth).max().unwrap_or(0)
    }

    fn children(&self) -> Box<dyn Iterator<Item = &Expression> + '_> {
        match self {
            Expression::Sum(terms) | Expression::Product(terms) => Box::new(terms.iter()),
            Expression::Exponent { base, exponent } => {
                Box::new([base.as_ref(), exponent.as_ref()].into_iter())
            }
            Expression::Integral { integrand, lower, upper } => {
                Box::new([integrand.as_ref(), lower.as_ref(), upper.as_ref()].into_iter())
            }
            Expression::Derivative(subject) => Box::new(std::iter::once(subject.as_ref())),
            Expression::Constant(_)
            | Expression::Independent(_)
            | Expression::Voltage { .. }
            | Expression::Current { .. } => Box::new(std::iter::empty()),
        }
    }

    /// Display the expression with pin names looked up in `circuit`
    pub fn render<'a>(&'a self, circuit: &'a Circuit) -> Rendered<'a> {
        Rendered {
            expr: self,
            circuit: Some(circuit),
        }
    }
}

fn splice_sum(terms: &mut Vec<Expression>, operand: Expression) {
    match operand {
        Expression::Sum(inner) => terms.extend(inner),
        other => terms.push(other),
    }
}

fn splice_product(terms: &mut Vec<Expression>, operand: Expression) {
    match operand {
        Expression::Product(inner) => terms.extend(inner),
        other => terms.push(other),
    }
}

impl Add for Expression {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        Expression::sum(self, rhs)
    }
}

impl Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        Expression::sum(self, rhs.negated())
    }
}

impl Mul for Expression {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        Expression::product(self, rhs)
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        self.negated()
    }
}

impl From<Constant> for Expression {
    fn from(constant: Constant) -> Self {
        Expression::Constant(constant)
    }
}

/// Display adapter resolving pin handles to names.
///
/// The text it writes is accepted back by the expression parser.
pub struct Rendered<'a> {
    expr: &'a Expression,
    circuit: Option<&'a Circuit>,
}

impl Rendered<'_> {
    fn child<'b>(&'b self, expr: &'b Expression) -> Rendered<'b> {
        Rendered {
            expr,
            circuit: self.circuit,
        }
    }

    fn pin(&self, id: PinId) -> String {
        self.circuit
            .and_then(|circuit| circuit.pin_name(id))
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    fn write_wrapped(&self, f: &mut fmt::Formatter<'_>, expr: &Expression, wrap: bool) -> fmt::Result {
        if wrap {
            write!(f, "({})", self.child(expr))
        } else {
            write!(f, "{}", self.child(expr))
        }
    }

    fn write_factors(&self, f: &mut fmt::Formatter<'_>, factors: &[Expression]) -> fmt::Result {
        for (i, factor) in factors.iter().enumerate() {
            if i > 0 {
                write!(f, "*")?;
            }
            let wrap = matches!(factor, Expression::Sum(_) | Expression::Product(_));
            self.write_wrapped(f, factor, wrap)?;
        }
        Ok(())
    }

    fn write_term(&self, f: &mut fmt::Formatter<'_>, term: &Expression) -> fmt::Result {
        match term {
            Expression::Constant(c) if c.is_negative() => {
                write!(f, " - {}", c.negated())
            }
            Expression::Product(factors)
                if factors.len() >= 2
                    && factors[0] == Expression::minus_one()
                    && !(factors.len() == 2 && factors[1].as_constant().is_some()) =>
            {
                write!(f, " - ")?;
                self.write_factors(f, &factors[1..])
            }
            other => {
                write!(f, " + ")?;
                self.write_wrapped(f, other, matches!(other, Expression::Sum(_)))
            }
        }
    }
}

fn is_atomic(expr: &Expression) -> bool {
    match expr {
        Expression::Constant(c) => !c.is_negative(),
        Expression::Independent(_)
        | Expression::Voltage { .. }
        | Expression::Current { .. }
        | Expression::Derivative(_)
        | Expression::Integral { .. } => true,
        _ => false,
    }
}

fn signal_prefix(upper: char, domain: Domain) -> String {
    match domain {
        Domain::Time => upper.to_ascii_lowercase().to_string(),
        Domain::Frequency => upper.to_string(),
        Domain::Invariant => format!("{}dc", upper),
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expression::Constant(c) => write!(f, "{}", c),
            Expression::Independent(variable) => write!(f, "{}", variable.symbol()),
            Expression::Voltage { which, domain } => write!(
                f,
                "{}({},{})",
                signal_prefix('V', *domain),
                self.pin(which.upper),
                self.pin(which.lower)
            ),
            Expression::Current { which, domain } => write!(
                f,
                "{}({},{})",
                signal_prefix('I', *domain),
                self.pin(which.src),
                self.pin(which.dst)
            ),
            Expression::Sum(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i == 0 {
                        self.write_wrapped(f, term, matches!(term, Expression::Sum(_)))?;
                    } else {
                        self.write_term(f, term)?;
                    }
                }
                Ok(())
            }
            Expression::Product(factors) => self.write_factors(f, factors),
            Expression::Exponent { base, exponent } => {
                self.write_wrapped(f, base, !is_atomic(base))?;
                write!(f, "^")?;
                self.write_wrapped(f, exponent, !is_atomic(exponent))
            }
            Expression::Derivative(subject) => write!(f, "ddt({})", self.child(subject)),
            Expression::Integral { integrand, lower, upper } => write!(
                f,
                "int({}, {}, {})",
                self.child(integrand),
                self.child(lower),
                self.child(upper)
            ),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = Rendered {
            expr: self,
            circuit: None,
        };
        fmt::Display::fmt(&rendered, f)
    }
}
