use nom::{
    bytes::complete::take_while,
    bytes::complete::take_while1,
    character::complete::{alpha0, alpha1, char, digit0, digit1, multispace0, one_of},
    combinator::{map, map_res, opt, recognize},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use regex::Regex;
use lazy_static::lazy_static;
use std::cell::RefCell;
use std::fs;
use anyhow::{anyhow, Result};

use crate::circuit::{Circuit, Current, Voltage};
use crate::domain::Domain;
use crate::expression::Expression;

lazy_static! {
    static ref VALUE_PATTERN: Regex = Regex::new(
        r"^([0-9]+\.?[0-9]*(?:[eE][+-]?[0-9]+)?)([a-zA-Z]*)$"
    ).unwrap();
}

/// One expression line of a worksheet
#[derive(Debug, Clone)]
pub struct WorksheetEntry {
    pub line: usize,
    pub source: String,
    pub expression: Expression,
}

/// A parsed worksheet: its expressions and the pins they reference
#[derive(Debug, Clone)]
pub struct Worksheet {
    pub title: String,
    pub circuit: Circuit,
    pub entries: Vec<WorksheetEntry>,
}

/// Parses expression text, registering every pin it mentions in a circuit.
///
/// ```text
/// sum     := product (('+' | '-') product)*
/// product := unary (('*' | '/') unary)*
/// unary   := '-' unary | power
/// power   := primary ('^' unary)?
/// primary := number | e | t | s | v(a,b) | V(a,b) | Vdc(a,b)
///          | i(a,b) | I(a,b) | Idc(a,b) | ddt(x) | int(x, lo, hi) | '(' sum ')'
/// ```
pub struct ExpressionParser<'c> {
    circuit: RefCell<&'c mut Circuit>,
}

impl<'c> ExpressionParser<'c> {
    pub fn new(circuit: &'c mut Circuit) -> Self {
        ExpressionParser {
            circuit: RefCell::new(circuit),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Expression> {
        let (rest, expr) = self
            .sum(text)
            .map_err(|e| anyhow!("Invalid expression '{}': {}", text.trim(), e))?;

        let rest = rest.trim();
        if !rest.is_empty() {
            return Err(anyhow!("Unexpected '{}' in expression '{}'", rest, text.trim()));
        }
        Ok(expr)
    }

    fn sum<'a>(&self, input: &'a str) -> IResult<&'a str, Expression> {
        let (mut input, mut acc) = self.product(input)?;
        loop {
            let op: IResult<&'a str, char> = preceded(multispace0, one_of("+-"))(input);
            let Ok((rest, op)) = op else {
                return Ok((input, acc));
            };
            let (rest, rhs) = self.product(rest)?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
            input = rest;
        }
    }

    fn product<'a>(&self, input: &'a str) -> IResult<&'a str, Expression> {
        let (mut input, mut acc) = self.unary(input)?;
        loop {
            let op: IResult<&'a str, char> = preceded(multispace0, one_of("*/"))(input);
            let Ok((rest, op)) = op else {
                return Ok((input, acc));
            };
            let (rest, rhs) = self.unary(rest)?;
            acc = if op == '*' {
                acc * rhs
            } else {
                acc * Expression::reciprocal(rhs)
            };
            input = rest;
        }
    }

    fn unary<'a>(&self, input: &'a str) -> IResult<&'a str, Expression> {
        let (input, _) = multispace0(input)?;
        let minus: IResult<&'a str, char> = char('-')(input);
        match minus {
            Ok((rest, _)) => {
                let (rest, operand) = self.unary(rest)?;
                Ok((rest, operand.negated()))
            }
            Err(_) => self.power(input),
        }
    }

    fn power<'a>(&self, input: &'a str) -> IResult<&'a str, Expression> {
        let (input, base) = self.primary(input)?;
        let caret: IResult<&'a str, char> = preceded(multispace0, char('^'))(input);
        match caret {
            Ok((rest, _)) => {
                let (rest, exponent) = self.unary(rest)?;
                Ok((rest, Expression::exponent(base, exponent)))
            }
            Err(_) => Ok((input, base)),
        }
    }

    fn primary<'a>(&self, input: &'a str) -> IResult<&'a str, Expression> {
        let (input, _) = multispace0(input)?;

        let open: IResult<&'a str, char> = char('(')(input);
        if let Ok((rest, _)) = open {
            let (rest, inner) = self.sum(rest)?;
            let (rest, _) = preceded(multispace0, char(')'))(rest)?;
            return Ok((rest, inner));
        }

        match parse_number(input) {
            Ok(result) => Ok(result),
            Err(nom::Err::Error(_)) => self.word(input),
            Err(e) => Err(e),
        }
    }

    fn word<'a>(&self, input: &'a str) -> IResult<&'a str, Expression> {
        let (rest, name) = parse_identifier(input)?;

        match name {
            "e" => Ok((rest, Expression::e())),
            "t" => Ok((rest, Expression::time())),
            "s" => Ok((rest, Expression::frequency())),
            "ddt" => {
                let (rest, args) = self.arguments(rest)?;
                match <[Expression; 1]>::try_from(args) {
                    Ok([subject]) => Ok((rest, Expression::derivative(subject))),
                    Err(_) => Err(nom::Err::Failure(Error::new(input, ErrorKind::Count))),
                }
            }
            "int" => {
                let (rest, args) = self.arguments(rest)?;
                match <[Expression; 3]>::try_from(args) {
                    Ok([integrand, lower, upper]) => Ok((rest, Expression::integral(integrand, lower, upper))),
                    Err(_) => Err(nom::Err::Failure(Error::new(input, ErrorKind::Count))),
                }
            }
            "v" | "V" | "Vdc" => {
                let (rest, (upper, lower)) = parse_pin_pair(rest)?;
                let mut circuit = self.circuit.borrow_mut();
                let which = Voltage::new(circuit.add_pin(upper), circuit.add_pin(lower));
                Ok((rest, Expression::voltage(which, signal_domain(name))))
            }
            "i" | "I" | "Idc" => {
                let (rest, (src, dst)) = parse_pin_pair(rest)?;
                let mut circuit = self.circuit.borrow_mut();
                let which = Current::new(circuit.add_pin(src), circuit.add_pin(dst));
                Ok((rest, Expression::current(which, signal_domain(name))))
            }
            _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
        }
    }

    fn arguments<'a>(&self, input: &'a str) -> IResult<&'a str, Vec<Expression>> {
        let (input, _) = pair(multispace0, char('('))(input)?;
        let (input, first) = self.sum(input)?;
        let mut args = vec![first];
        let mut input = input;
        loop {
            let comma: IResult<&'a str, char> = preceded(multispace0, char(','))(input);
            let Ok((rest, _)) = comma else {
                break;
            };
            let (rest, arg) = self.sum(rest)?;
            args.push(arg);
            input = rest;
        }
        let (input, _) = preceded(multispace0, char(')'))(input)?;
        Ok((input, args))
    }
}

/// Lowercase names are time-domain signals, capitalised names frequency-domain
/// ones and a `dc` suffix marks an invariant quantity
fn signal_domain(name: &str) -> Domain {
    if name.ends_with("dc") {
        Domain::Invariant
    } else if name.starts_with(|c: char| c.is_ascii_uppercase()) {
        Domain::Frequency
    } else {
        Domain::Time
    }
}

fn parse_number(input: &str) -> IResult<&str, Expression> {
    map(
        map_res(
            recognize(tuple((
                digit1,
                opt(pair(char('.'), digit0)),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
                alpha0,
            ))),
            parse_value_with_unit,
        ),
        Expression::constant,
    )(input)
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alpha1,
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn parse_pin_name(input: &str) -> IResult<&str, &str> {
    delimited(
        multispace0,
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
        multispace0,
    )(input)
}

fn parse_pin_pair(input: &str) -> IResult<&str, (&str, &str)> {
    delimited(
        pair(multispace0, char('(')),
        separated_pair(parse_pin_name, char(','), parse_pin_name),
        terminated(multispace0, char(')')),
    )(input)
}

/// Parse value with unit suffix (e.g., 1k, 1meg, 1m, 1u, 1n, 1p)
pub fn parse_value_with_unit(value_str: &str) -> Result<f64> {
    if let Some(captures) = VALUE_PATTERN.captures(value_str.trim()) {
        let value = captures[1].parse::<f64>()?;
        let unit = captures[2].to_lowercase();

        let multiplier = match unit.as_str() {
            "f" => 1e-15,
            "p" => 1e-12,
            "n" => 1e-9,
            "u" => 1e-6,
            "m" => 1e-3,
            "k" => 1e3,
            "meg" => 1e6,
            "g" => 1e9,
            "" => 1.0,
            _ => return Err(anyhow!("Unknown unit: {}", unit)),
        };

        Ok(value * multiplier)
    } else {
        value_str.trim().parse::<f64>().map_err(|e| anyhow!("Invalid value '{}': {}", value_str, e))
    }
}

/// Reads worksheet files: one expression per line, `*`/`;` comments,
/// `+` continuation lines, an optional `.title` and a terminating `.end`.
pub struct WorksheetParser;

impl Default for WorksheetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl WorksheetParser {
    pub fn new() -> Self {
        WorksheetParser
    }

    pub fn parse_file(&self, filename: &str) -> Result<Worksheet> {
        let content = fs::read_to_string(filename)
            .map_err(|e| anyhow!("Failed to read file '{}': {}", filename, e))?;

        self.parse_worksheet(&content)
    }

    pub fn parse_worksheet(&self, content: &str) -> Result<Worksheet> {
        let mut circuit = Circuit::new(String::new());
        let mut entries = Vec::new();
        let mut title = String::new();

        {
            let parser = ExpressionParser::new(&mut circuit);
            for (line_num, line) in self.preprocess_lines(content) {
                if line.starts_with('.') {
                    let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line.as_str(), ""));
                    match keyword.to_lowercase().as_str() {
                        ".title" => {
                            title = rest.trim().to_string();
                            continue;
                        }
                        ".end" => break,
                        _ => return Err(anyhow!("Unknown directive on line {}: {}", line_num, line)),
                    }
                }

                let expression = parser
                    .parse(&line)
                    .map_err(|e| anyhow!("Line {}: {}", line_num, e))?;
                entries.push(WorksheetEntry {
                    line: line_num,
                    source: line,
                    expression,
                });
            }
        }

        circuit.title = title.clone();
        Ok(Worksheet {
            title,
            circuit,
            entries,
        })
    }

    /// Join continuation lines and drop comments, keeping the number of the
    /// line each logical line starts on
    fn preprocess_lines(&self, content: &str) -> Vec<(usize, String)> {
        let mut processed_lines = Vec::new();
        let mut current: Option<(usize, String)> = None;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('*') || line.starts_with(';') {
                continue;
            }

            if let Some(continued) = line.strip_prefix('+') {
                if let Some((_, text)) = current.as_mut() {
                    text.push(' ');
                    text.push_str(continued.trim());
                    continue;
                }
            }

            if let Some(finished) = current.take() {
                processed_lines.push(finished);
            }
            current = Some((index + 1, line.to_string()));
        }

        if let Some(finished) = current {
            processed_lines.push(finished);
        }

        processed_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::PinId;

    fn parse(text: &str) -> Expression {
        let mut circuit = Circuit::new("Test".to_string());
        let expr = ExpressionParser::new(&mut circuit).parse(text).unwrap();
        expr
    }

    #[test]
    fn test_parse_value_with_unit() {
        assert_eq!(parse_value_with_unit("1k").unwrap(), 1000.0);
        assert_eq!(parse_value_with_unit("1.5meg").unwrap(), 1.5e6);
        assert_eq!(parse_value_with_unit("10m").unwrap(), 10e-3);
        assert_eq!(parse_value_with_unit("1u").unwrap(), 1e-6);
        assert_eq!(parse_value_with_unit("2e3").unwrap(), 2000.0);
        assert!(parse_value_with_unit("2e").is_err());
        assert!(parse_value_with_unit("3x").is_err());
    }

    #[test]
    fn test_parse_voltage_plus_constant() {
        let mut circuit = Circuit::new("Test".to_string());
        let expr = ExpressionParser::new(&mut circuit).parse("v(1, 0) + 5").unwrap();

        let v1 = Voltage::new(PinId(0), PinId(1));
        assert_eq!(expr, Expression::voltage(v1, Domain::Time) + Expression::constant(5.0));
        assert_eq!(circuit.pin_id("1"), Some(PinId(0)));
        assert_eq!(circuit.pin_id("0"), Some(PinId(1)));
    }

    #[test]
    fn test_signal_domains() {
        let v = |domain| Expression::voltage(Voltage::new(PinId(0), PinId(1)), domain);
        assert_eq!(parse("v(a,b)"), v(Domain::Time));
        assert_eq!(parse("V(a,b)"), v(Domain::Frequency));
        assert_eq!(parse("Vdc(a,b)"), v(Domain::Invariant));

        let i = Expression::current(Current::new(PinId(0), PinId(1)), Domain::Frequency);
        assert_eq!(parse("I(x, y)"), i);
    }

    #[test]
    fn test_precedence() {
        let expr = parse("2 + 3*t^2");
        assert_eq!(
            expr,
            Expression::constant(2.0)
                + Expression::constant(3.0)
                    * Expression::exponent(Expression::time(), Expression::constant(2.0))
        );

        let neg = parse("-t^2");
        assert_eq!(
            neg,
            Expression::exponent(Expression::time(), Expression::constant(2.0)).negated()
        );

        let decay = parse("e^(-3*t)");
        assert_eq!(
            decay,
            Expression::exponent(Expression::e(), Expression::constant(-3.0) * Expression::time())
        );
    }

    #[test]
    fn test_subtraction_and_division() {
        assert_eq!(
            parse("s - 3"),
            Expression::sum(Expression::frequency(), Expression::constant(-3.0))
        );
        assert_eq!(
            parse("1/(s + 2)"),
            Expression::product(
                Expression::one(),
                Expression::reciprocal(Expression::frequency() + Expression::constant(2.0))
            )
        );
    }

    #[test]
    fn test_calculus_functions() {
        let expr = parse("1m * ddt(v(out,0)) + int(i(out,0), 0, t)");
        let v = Expression::voltage(Voltage::new(PinId(0), PinId(1)), Domain::Time);
        let i = Expression::current(Current::new(PinId(0), PinId(1)), Domain::Time);
        assert_eq!(
            expr,
            Expression::constant(1e-3) * Expression::derivative(v)
                + Expression::integral(i, Expression::zero(), Expression::time())
        );
    }

    #[test]
    fn test_display_parses_back() {
        let mut circuit = Circuit::new("Round trip".to_string());
        let sources = [
            "v(in,0) + 5",
            "2*ddt(i(in,0))",
            "e^(-3*t)",
            "(s + 3)^(-1)",
            "V(in,0)*s^(-1)",
            "v(in,0) - 2*int(v(0,in), 0, t)",
            "Idc(in,0)*0.001",
        ];

        for source in sources {
            let expr = ExpressionParser::new(&mut circuit).parse(source).unwrap();
            let rendered = expr.render(&circuit).to_string();
            assert_eq!(rendered, source);

            let reparsed = ExpressionParser::new(&mut circuit).parse(&rendered).unwrap();
            assert_eq!(reparsed, expr);
        }
    }

    #[test]
    fn test_parse_errors() {
        let mut circuit = Circuit::new("Errors".to_string());
        let parser = ExpressionParser::new(&mut circuit);
        assert!(parser.parse("foo(1)").is_err());
        assert!(parser.parse("v(a,b) +").is_err());
        assert!(parser.parse("ddt(t, t)").is_err());
        assert!(parser.parse("int(t)").is_err());
        assert!(parser.parse("(t").is_err());
        assert!(parser.parse("3x").is_err());
        assert!(parser.parse("t t").is_err());
    }

    #[test]
    fn test_parse_worksheet() {
        let content = "\
.title RC network
* capacitor current
1u * ddt(v(out,0))
; running integral, split over two lines
int(v(in,out), 0,
+ t)
v(in,0) + 5
.end
e^(-t)
";
        let worksheet = WorksheetParser::new().parse_worksheet(content).unwrap();
        assert_eq!(worksheet.title, "RC network");
        assert_eq!(worksheet.circuit.title, "RC network");
        assert_eq!(worksheet.entries.len(), 3);
        assert_eq!(worksheet.entries[0].line, 3);
        assert_eq!(worksheet.entries[1].line, 5);
        assert_eq!(worksheet.entries[1].source, "int(v(in,out), 0, t)");
        assert_eq!(worksheet.circuit.pins.len(), 3);
    }

    #[test]
    fn test_directive_case() {
        let worksheet = WorksheetParser::new()
            .parse_worksheet(".TITLE Mixed case\nv(a,b)\n.END\ns\n")
            .unwrap();
        assert_eq!(worksheet.title, "Mixed case");
        assert_eq!(worksheet.entries.len(), 1);

        let bare = WorksheetParser::new().parse_worksheet(".title\nt\n").unwrap();
        assert_eq!(bare.title, "");
        assert_eq!(bare.entries.len(), 1);
    }

    #[test]
    fn test_worksheet_errors() {
        let parser = WorksheetParser::new();
        let err = parser.parse_worksheet("t\n.tran 1n 10n\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = parser.parse_worksheet(".titlefoo bar\nt\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));

        let err = parser.parse_worksheet("t\nv(a,\n").unwrap_err();
        assert!(err.to_string().starts_with("Line 2"));

        assert!(parser.parse_file("/nonexistent/worksheet.lap").is_err());
    }
}
