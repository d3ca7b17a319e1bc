// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Array expressions
//!
//! A small calculator language over named mesh arrays:
//!
//! - array names, numbers and the unit vectors `iHat`, `jHat`, `kHat`
//! - unary `-`, binary `+ - * /`, `.` for the dot product
//! - comparisons `< <= > >=`, yielding 1.0 or 0.0
//! - `mag`, `norm`, `acos`, `asin`, `atan`, `sin`, `cos`, `sqrt`, `abs`,
//!   `sign`, `min`, `max`
//!
//! `*`, `/` and `.` bind tighter than `+` and `-`, which bind tighter than
//! comparisons. `acos` and `asin` clamp their argument to [-1, 1],
//! `sign(0)` is 1 and `norm` of a zero vector is the zero vector.
//!
//! Trees are built either with [`Expr::parse`] or with the operator overloads
//! and builder methods, then type-checked against a mesh's arrays by
//! [`Expr::compile`] before evaluation.

use crate::error::{Error, Result};
use nalgebra::Vector3;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, one_of},
    combinator::{map, map_res, opt, recognize},
    multi::{many0, separated_list1},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
    IResult,
};
use std::fmt;
use std::ops;
use std::str::FromStr;
use urban_wind_core::{Attributes, FieldData};

/// A single evaluated tuple
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vector3<f64>),
}

/// Static type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Vector,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Vector => "vector",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::X => "iHat",
            Axis::Y => "jHat",
            Axis::Z => "kHat",
        }
    }

    fn unit(self) -> Vector3<f64> {
        match self {
            Axis::X => Vector3::x(),
            Axis::Y => Vector3::y(),
            Axis::Z => Vector3::z(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Dot,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Dot => ".",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }

    /// Scalar-by-scalar implementation, `None` for the dot product
    fn scalar_fn(self) -> Option<fn(f64, f64) -> f64> {
        Some(match self {
            BinaryOp::Add => |a, b| a + b,
            BinaryOp::Sub => |a, b| a - b,
            BinaryOp::Mul => |a, b| a * b,
            BinaryOp::Div => |a, b| a / b,
            BinaryOp::Less => |a, b| if a < b { 1.0 } else { 0.0 },
            BinaryOp::LessEqual => |a, b| if a <= b { 1.0 } else { 0.0 },
            BinaryOp::Greater => |a, b| if a > b { 1.0 } else { 0.0 },
            BinaryOp::GreaterEqual => |a, b| if a >= b { 1.0 } else { 0.0 },
            BinaryOp::Dot => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Mag,
    Norm,
    Acos,
    Asin,
    Atan,
    Sin,
    Cos,
    Sqrt,
    Abs,
    Sign,
    Min,
    Max,
}

impl Function {
    const ALL: [Function; 12] = [
        Function::Mag,
        Function::Norm,
        Function::Acos,
        Function::Asin,
        Function::Atan,
        Function::Sin,
        Function::Cos,
        Function::Sqrt,
        Function::Abs,
        Function::Sign,
        Function::Min,
        Function::Max,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::Mag => "mag",
            Function::Norm => "norm",
            Function::Acos => "acos",
            Function::Asin => "asin",
            Function::Atan => "atan",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Sign => "sign",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    fn unary_fn(self) -> Option<fn(f64) -> f64> {
        Some(match self {
            Function::Mag | Function::Abs => f64::abs,
            Function::Norm => |x| if x == 0.0 { 0.0 } else { x.signum() },
            Function::Acos => |x| x.clamp(-1.0, 1.0).acos(),
            Function::Asin => |x| x.clamp(-1.0, 1.0).asin(),
            Function::Atan => f64::atan,
            Function::Sin => f64::sin,
            Function::Cos => f64::cos,
            Function::Sqrt => f64::sqrt,
            Function::Sign => |x| if x >= 0.0 { 1.0 } else { -1.0 },
            Function::Min | Function::Max => return None,
        })
    }

    fn binary_fn(self) -> Option<fn(f64, f64) -> f64> {
        match self {
            Function::Min => Some(f64::min),
            Function::Max => Some(f64::max),
            _ => None,
        }
    }
}

/// Expression tree over named arrays
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Unit(Axis),
    Array(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    pub fn array(name: impl Into<String>) -> Self {
        Expr::Array(name.into())
    }

    pub fn number(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn i_hat() -> Self {
        Expr::Unit(Axis::X)
    }

    pub fn j_hat() -> Self {
        Expr::Unit(Axis::Y)
    }

    pub fn k_hat() -> Self {
        Expr::Unit(Axis::Z)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn dot(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Dot, self, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Less, self, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::GreaterEqual, self, rhs)
    }

    pub fn call(self, function: Function) -> Self {
        Expr::Call(function, vec![self])
    }

    pub fn mag(self) -> Self {
        self.call(Function::Mag)
    }

    pub fn norm(self) -> Self {
        self.call(Function::Norm)
    }

    pub fn acos(self) -> Self {
        self.call(Function::Acos)
    }

    pub fn sign(self) -> Self {
        self.call(Function::Sign)
    }

    pub fn max(self, other: Expr) -> Self {
        Expr::Call(Function::Max, vec![self, other])
    }

    /// Parse the textual form
    pub fn parse(text: &str) -> Result<Expr> {
        let error = |reason: String| Error::Expression {
            input: text.to_string(),
            reason,
        };
        match expression(text) {
            Ok((rest, expr)) => {
                let rest = rest.trim_start();
                if rest.is_empty() {
                    Ok(expr)
                } else {
                    Err(error(format!("unexpected input at '{rest}'")))
                }
            }
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                let at = e.input.trim_start();
                if at.is_empty() {
                    Err(error("unexpected end of expression".into()))
                } else {
                    Err(error(format!("cannot parse at '{at}'")))
                }
            }
            Err(nom::Err::Incomplete(_)) => Err(error("incomplete expression".into())),
        }
    }

    /// Names of all arrays the expression reads, in order of appearance
    pub fn arrays(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_arrays(&mut names);
        names
    }

    fn collect_arrays<'e>(&'e self, names: &mut Vec<&'e str>) {
        match self {
            Expr::Array(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Neg(e) => e.collect_arrays(names),
            Expr::Binary(_, l, r) => {
                l.collect_arrays(names);
                r.collect_arrays(names);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_arrays(names)),
            Expr::Number(_) | Expr::Unit(_) => {}
        }
    }

    /// Resolve array names against `arrays` and check operand types.
    /// `stage` names the caller in missing-array errors.
    pub fn compile<'a>(&self, arrays: &'a Attributes, stage: &'static str) -> Result<Compiled<'a>> {
        let mismatch = |reason: String| Error::TypeMismatch {
            expression: self.to_string(),
            reason,
        };

        Ok(match self {
            Expr::Number(v) => Compiled::Scalar(ScalarNode::Const(*v)),
            Expr::Unit(axis) => Compiled::Vector(VectorNode::Const(axis.unit())),
            Expr::Array(name) => match arrays.get(name).map(|a| &a.data) {
                Some(FieldData::Scalar(values)) => Compiled::Scalar(ScalarNode::Array(values)),
                Some(FieldData::Vector(values)) => Compiled::Vector(VectorNode::Array(values)),
                None => return Err(urban_wind_core::Error::missing_array(stage, name.as_str()).into()),
            },
            Expr::Neg(e) => match e.compile(arrays, stage)? {
                Compiled::Scalar(s) => Compiled::Scalar(ScalarNode::Unary(|x| -x, Box::new(s))),
                Compiled::Vector(v) => Compiled::Vector(VectorNode::Neg(Box::new(v))),
            },
            Expr::Binary(op, l, r) => {
                let (l, r) = (l.compile(arrays, stage)?, r.compile(arrays, stage)?);
                let kinds = (l.kind(), r.kind());
                match (op, l, r) {
                    (BinaryOp::Dot, Compiled::Vector(a), Compiled::Vector(b)) => {
                        Compiled::Scalar(ScalarNode::Dot(Box::new(a), Box::new(b)))
                    }
                    (BinaryOp::Add, Compiled::Vector(a), Compiled::Vector(b)) => {
                        Compiled::Vector(VectorNode::Add(Box::new(a), Box::new(b)))
                    }
                    (BinaryOp::Sub, Compiled::Vector(a), Compiled::Vector(b)) => {
                        Compiled::Vector(VectorNode::Sub(Box::new(a), Box::new(b)))
                    }
                    (BinaryOp::Mul, Compiled::Scalar(s), Compiled::Vector(v))
                    | (BinaryOp::Mul, Compiled::Vector(v), Compiled::Scalar(s)) => {
                        Compiled::Vector(VectorNode::Scale(Box::new(s), Box::new(v)))
                    }
                    (BinaryOp::Div, Compiled::Vector(v), Compiled::Scalar(s)) => {
                        Compiled::Vector(VectorNode::Divide(Box::new(v), Box::new(s)))
                    }
                    (op, Compiled::Scalar(a), Compiled::Scalar(b)) => {
                        let Some(f) = op.scalar_fn() else {
                            return Err(mismatch(format!("'{}' needs two vectors", op.symbol())));
                        };
                        Compiled::Scalar(ScalarNode::Binary(f, Box::new(a), Box::new(b)))
                    }
                    (op, _, _) => {
                        return Err(mismatch(format!(
                            "'{}' is not defined for {} and {}",
                            op.symbol(),
                            kinds.0,
                            kinds.1
                        )))
                    }
                }
            }
            Expr::Call(function, args) => {
                if args.len() != function.arity() {
                    return Err(mismatch(format!(
                        "{}() takes {} argument(s), got {}",
                        function.name(),
                        function.arity(),
                        args.len()
                    )));
                }
                let mut compiled = args
                    .iter()
                    .map(|a| a.compile(arrays, stage))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter();
                match (function, compiled.next(), compiled.next()) {
                    (Function::Mag, Some(Compiled::Vector(v)), None) => {
                        Compiled::Scalar(ScalarNode::Mag(Box::new(v)))
                    }
                    (Function::Norm, Some(Compiled::Vector(v)), None) => {
                        Compiled::Vector(VectorNode::Norm(Box::new(v)))
                    }
                    (f, Some(Compiled::Scalar(a)), None) => {
                        let Some(func) = f.unary_fn() else {
                            return Err(mismatch(format!("{}() needs a vector", f.name())));
                        };
                        Compiled::Scalar(ScalarNode::Unary(func, Box::new(a)))
                    }
                    (f, Some(Compiled::Scalar(a)), Some(Compiled::Scalar(b))) => {
                        let Some(func) = f.binary_fn() else {
                            return Err(mismatch(format!("{}() needs vectors", f.name())));
                        };
                        Compiled::Scalar(ScalarNode::Binary(func, Box::new(a), Box::new(b)))
                    }
                    (f, _, _) => {
                        return Err(mismatch(format!(
                            "{}() is not defined for vector arguments",
                            f.name()
                        )))
                    }
                }
            }
        })
    }
}

impl FromStr for Expr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Expr::parse(s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Unit(axis) => f.write_str(axis.name()),
            Expr::Array(name) => f.write_str(name),
            Expr::Neg(e) => write!(f, "-({e})"),
            Expr::Binary(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            Expr::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// Type-checked expression bound to concrete arrays
pub enum Compiled<'a> {
    Scalar(ScalarNode<'a>),
    Vector(VectorNode<'a>),
}

impl Compiled<'_> {
    pub fn kind(&self) -> ValueKind {
        match self {
            Compiled::Scalar(_) => ValueKind::Scalar,
            Compiled::Vector(_) => ValueKind::Vector,
        }
    }

    pub fn eval(&self, index: usize) -> Value {
        match self {
            Compiled::Scalar(s) => Value::Scalar(s.eval(index)),
            Compiled::Vector(v) => Value::Vector(v.eval(index)),
        }
    }
}

pub enum ScalarNode<'a> {
    Const(f64),
    Array(&'a [f64]),
    Unary(fn(f64) -> f64, Box<ScalarNode<'a>>),
    Binary(fn(f64, f64) -> f64, Box<ScalarNode<'a>>, Box<ScalarNode<'a>>),
    Dot(Box<VectorNode<'a>>, Box<VectorNode<'a>>),
    Mag(Box<VectorNode<'a>>),
}

impl ScalarNode<'_> {
    #[inline]
    pub fn eval(&self, i: usize) -> f64 {
        match self {
            ScalarNode::Const(v) => *v,
            ScalarNode::Array(values) => values[i],
            ScalarNode::Unary(f, a) => f(a.eval(i)),
            ScalarNode::Binary(f, a, b) => f(a.eval(i), b.eval(i)),
            ScalarNode::Dot(a, b) => a.eval(i).dot(&b.eval(i)),
            ScalarNode::Mag(v) => v.eval(i).norm(),
        }
    }
}

pub enum VectorNode<'a> {
    Const(Vector3<f64>),
    Array(&'a [Vector3<f64>]),
    Neg(Box<VectorNode<'a>>),
    Add(Box<VectorNode<'a>>, Box<VectorNode<'a>>),
    Sub(Box<VectorNode<'a>>, Box<VectorNode<'a>>),
    Scale(Box<ScalarNode<'a>>, Box<VectorNode<'a>>),
    Divide(Box<VectorNode<'a>>, Box<ScalarNode<'a>>),
    Norm(Box<VectorNode<'a>>),
}

impl VectorNode<'_> {
    #[inline]
    pub fn eval(&self, i: usize) -> Vector3<f64> {
        match self {
            VectorNode::Const(v) => *v,
            VectorNode::Array(values) => values[i],
            VectorNode::Neg(v) => -v.eval(i),
            VectorNode::Add(a, b) => a.eval(i) + b.eval(i),
            VectorNode::Sub(a, b) => a.eval(i) - b.eval(i),
            VectorNode::Scale(s, v) => v.eval(i) * s.eval(i),
            VectorNode::Divide(v, s) => v.eval(i) / s.eval(i),
            VectorNode::Norm(v) => v.eval(i).try_normalize(0.0).unwrap_or_else(Vector3::zeros),
        }
    }
}

// Parser

fn ws(input: &str) -> IResult<&str, ()> {
    map(take_while(|c: char| c.is_whitespace()), |_| ())(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map_res(recognize_float, |s: &str| s.parse::<f64>().map(Expr::Number))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// `name(args)` for known functions, otherwise a unit vector or array name
fn call_or_name(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;
    let (after_ws, _) = ws(rest)?;
    if !after_ws.starts_with('(') {
        let expr = match name {
            "iHat" => Expr::i_hat(),
            "jHat" => Expr::j_hat(),
            "kHat" => Expr::k_hat(),
            _ => Expr::array(name),
        };
        return Ok((rest, expr));
    }

    let failure = || nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Verify));
    let function = Function::from_name(name).ok_or_else(failure)?;
    let (rest, args) = delimited(
        char('('),
        separated_list1(preceded(ws, char(',')), expression),
        preceded(ws, char(')')),
    )(after_ws)?;
    if args.len() != function.arity() {
        return Err(failure());
    }
    Ok((rest, Expr::Call(function, args)))
}

fn parenthesized(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), expression, preceded(ws, char(')')))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    preceded(ws, alt((number, call_or_name, parenthesized)))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(pair(ws, char('-')), unary), |e| -e),
        primary,
    ))(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(preceded(ws, one_of("*/.")), unary))(input)?;
    let expr = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = match op {
            '*' => BinaryOp::Mul,
            '/' => BinaryOp::Div,
            _ => BinaryOp::Dot,
        };
        Expr::binary(op, lhs, rhs)
    });
    Ok((input, expr))
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(preceded(ws, one_of("+-")), term))(input)?;
    let expr = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
        Expr::binary(op, lhs, rhs)
    });
    Ok((input, expr))
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = additive(input)?;
    let (input, rhs) = opt(pair(
        preceded(ws, alt((tag("<="), tag(">="), tag("<"), tag(">")))),
        additive,
    ))(input)?;
    let expr = match rhs {
        None => lhs,
        Some((op, rhs)) => {
            let op = match op {
                "<=" => BinaryOp::LessEqual,
                ">=" => BinaryOp::GreaterEqual,
                "<" => BinaryOp::Less,
                _ => BinaryOp::Greater,
            };
            Expr::binary(op, lhs, rhs)
        }
    };
    Ok((input, expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use urban_wind_core::FieldArray;

    fn arrays() -> Attributes {
        let mut a = Attributes::new();
        a.insert(FieldArray::vector(
            "velocity",
            vec![Vector3::new(3.0, 4.0, 5.0), Vector3::zeros()],
        ));
        a.insert(FieldArray::scalar("speed", vec![2.0, -0.5]));
        a
    }

    fn eval(text: &str, index: usize) -> Value {
        let attributes = arrays();
        Expr::parse(text)
            .unwrap()
            .compile(&attributes, "test")
            .unwrap()
            .eval(index)
    }

    fn scalar(text: &str, index: usize) -> f64 {
        match eval(text, index) {
            Value::Scalar(s) => s,
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        assert_relative_eq!(scalar("1 + 2 * 3", 0), 7.0);
        assert_relative_eq!(scalar("(1 + 2) * 3", 0), 9.0);
        assert_relative_eq!(scalar("2 - 3 - 4", 0), -5.0);
        assert_relative_eq!(scalar("-2 * -3", 0), 6.0);
        assert_relative_eq!(scalar("1 + 1 < 3", 0), 1.0);
    }

    #[test]
    fn test_projection_and_magnitude() {
        assert_relative_eq!(scalar("velocity . kHat", 0), 5.0);
        assert_relative_eq!(
            scalar("mag((velocity . iHat) * iHat + (velocity . jHat) * jHat)", 0),
            5.0
        );
        assert_eq!(eval("velocity * 2", 0), Value::Vector(Vector3::new(6.0, 8.0, 10.0)));
        assert_eq!(eval("2 * velocity", 0), eval("velocity * 2", 0));
    }

    #[test]
    fn test_degenerate_inputs_are_total() {
        assert_eq!(eval("norm(velocity)", 1), Value::Vector(Vector3::zeros()));
        assert_relative_eq!(scalar("sign(0)", 0), 1.0);
        assert_relative_eq!(scalar("sign(speed)", 1), -1.0);
        assert_relative_eq!(scalar("acos(1.0000001)", 0), 0.0);
        assert_relative_eq!(scalar("acos(-1.0000001)", 0), std::f64::consts::PI);
        assert_relative_eq!(scalar("max(0, speed)", 1), 0.0);
        assert_relative_eq!(scalar("min(speed, 1)", 0), 1.0);
        assert_relative_eq!(scalar("mag(speed)", 1), 0.5);
    }

    #[test]
    fn test_comparison_flags() {
        assert_relative_eq!(scalar("speed < 0.0", 1), 1.0);
        assert_relative_eq!(scalar("speed < 0.0", 0), 0.0);
        assert_relative_eq!(scalar("speed >= 2", 0), 1.0);
        assert_relative_eq!(scalar("speed + 360.0 * (speed < 0.0)", 1), 359.5);
    }

    #[test]
    fn test_display_round_trips() {
        let text = "-(acos(-(velocity . iHat)) * 180.0 / 3.14159265 * sign(-(velocity . jHat)) - 90.0)";
        let expr = Expr::parse(text).unwrap();
        assert_eq!(Expr::parse(&expr.to_string()).unwrap(), expr);
        assert_eq!(expr.arrays(), vec!["velocity"]);
    }

    #[test]
    fn test_builder_matches_parser() {
        let built = (Expr::array("velocity").dot(Expr::i_hat())) * Expr::i_hat()
            + (Expr::array("velocity").dot(Expr::j_hat())) * Expr::j_hat();
        let parsed: Expr = "(velocity . iHat) * iHat + (velocity . jHat) * jHat".parse().unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "1 +", "velocity . ", "foo(1)", "mag(1, 2)", "(1 + 2", "1 2"] {
            assert!(
                matches!(Expr::parse(bad), Err(Error::Expression { .. })),
                "'{bad}' should not parse"
            );
        }
    }

    #[test]
    fn test_type_errors() {
        let attributes = arrays();
        for bad in [
            "velocity + 1",
            "velocity * velocity",
            "speed . velocity",
            "speed . 2",
            "acos(velocity)",
            "max(velocity, 1)",
            "1 / velocity",
        ] {
            let expr = Expr::parse(bad).unwrap();
            assert!(
                matches!(expr.compile(&attributes, "test"), Err(Error::TypeMismatch { .. })),
                "'{bad}' should not type-check"
            );
        }
        let missing = Expr::parse("pressure * 2").unwrap();
        assert!(matches!(
            missing.compile(&attributes, "test"),
            Err(Error::Core(urban_wind_core::Error::MissingArray { .. }))
        ));
    }
}
