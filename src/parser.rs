//! Textual query front end using nom.
//!
//! Parses operator chains written as method calls over a schema model into a
//! typed expression tree.
//!
//! # Syntax Overview
//!
//! ```text
//! Customers.Where(c => c.Age > 30 && c.City == 'Oslo').Select(c => new { c.Name, Years = c.Age }).Take(5)
//! ───┬───── ──┬── ─────────────┬─────────────────────  ──────────────────┬─────────────────────  ───┬───
//!    │        │                └── Lambda (predicate)                    └── Anonymous projection   │
//!    │        └── Query operator                                                                   │
//!    └── Model or table name from the schema                                   Limit ──────────────┘
//! ```
//!
//! Grouped rows expose `g.Key`, `g.Count()` and `g.Sum(e => ..)` (also
//! written `Count(g)`, `Sum(g, e => ..)`).

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, none_of, satisfy},
    combinator::{map, map_opt, not, opt, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, tuple},
};

use crate::ast::{BinaryOp, Expr, ShapeKind, TypeRef};
use crate::error::{ExqlError, ExqlResult};
use crate::mapping::ModelMeta;
use crate::schema::Schema;
use crate::value::{Value, ValueType};

/// Untyped parse result, resolved against a schema afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Literal(Value),
    Name(String),
    Member(Box<Syntax>, String),
    /// `target.method(args)`, or `method(args)` when `target` is `None`.
    Call {
        target: Option<Box<Syntax>>,
        method: String,
        args: Vec<Syntax>,
    },
    Binary(BinaryOp, Box<Syntax>, Box<Syntax>),
    Lambda(Vec<String>, Box<Syntax>),
    New(Vec<(String, Syntax)>),
}

/// Parse a query and resolve it against `schema`.
pub fn parse(input: &str, schema: &Schema) -> ExqlResult<Expr> {
    let syntax = parse_syntax(input)?;
    Resolver::new(schema).resolve(&syntax)
}

/// Parse without resolving names.
pub fn parse_syntax(input: &str) -> ExqlResult<Syntax> {
    let input = input.trim();

    match parse_expr(input) {
        Ok(("", syntax)) => Ok(syntax),
        Ok((remaining, _)) => Err(ExqlError::parse(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", remaining),
        )),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExqlError::parse(
            input.len() - e.input.len(),
            format!("Parse failed: {:?}", e.code),
        )),
        Err(nom::Err::Incomplete(_)) => Err(ExqlError::parse(input.len(), "Unexpected end of input")),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn fold_chain(first: Syntax, rest: Vec<(BinaryOp, Syntax)>) -> Syntax {
    rest.into_iter()
        .fold(first, |left, (op, right)| Syntax::Binary(op, Box::new(left), Box::new(right)))
}

/// Parse an expression: `||` binds loosest.
fn parse_expr(input: &str) -> IResult<&str, Syntax> {
    let (input, first) = parse_and(input)?;
    let (input, rest) = many0(pair(value(BinaryOp::Or, ws(tag("||"))), parse_and))(input)?;
    Ok((input, fold_chain(first, rest)))
}

fn parse_and(input: &str) -> IResult<&str, Syntax> {
    let (input, first) = parse_comparison(input)?;
    let (input, rest) = many0(pair(value(BinaryOp::And, ws(tag("&&"))), parse_comparison))(input)?;
    Ok((input, fold_chain(first, rest)))
}

fn parse_comparison(input: &str) -> IResult<&str, Syntax> {
    let (input, left) = parse_additive(input)?;
    let (input, tail) = opt(pair(ws(parse_comparison_op), parse_additive))(input)?;
    Ok((input, fold_chain(left, tail.into_iter().collect())))
}

fn parse_comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

fn parse_additive(input: &str) -> IResult<&str, Syntax> {
    let (input, first) = parse_multiplicative(input)?;
    let (input, rest) = many0(pair(
        ws(alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-'))))),
        parse_multiplicative,
    ))(input)?;
    Ok((input, fold_chain(first, rest)))
}

fn parse_multiplicative(input: &str) -> IResult<&str, Syntax> {
    let (input, first) = parse_postfix(input)?;
    let (input, rest) = many0(pair(
        ws(alt((value(BinaryOp::Mul, char('*')), value(BinaryOp::Div, char('/'))))),
        parse_postfix,
    ))(input)?;
    Ok((input, fold_chain(first, rest)))
}

/// Member access and method calls: `a.b`, `a.b(args)`.
fn parse_postfix(input: &str) -> IResult<&str, Syntax> {
    let (mut input, mut node) = parse_primary(input)?;

    loop {
        let Ok((rest, name)) = preceded(pair(multispace0, char('.')), ws(parse_identifier))(input) else {
            break;
        };
        match parse_call_args(rest) {
            Ok((after, args)) => {
                node = Syntax::Call {
                    target: Some(Box::new(node)),
                    method: name.to_string(),
                    args,
                };
                input = after;
            }
            Err(_) => {
                node = Syntax::Member(Box::new(node), name.to_string());
                input = rest;
            }
        }
    }

    Ok((input, node))
}

fn parse_primary(input: &str) -> IResult<&str, Syntax> {
    ws(alt((
        map(parse_number, Syntax::Literal),
        map(parse_quoted_string, |s| Syntax::Literal(Value::Text(s))),
        delimited(char('('), parse_expr, char(')')),
        parse_word,
    )))(input)
}

/// Keywords, free calls like `Count(g)`, and plain names.
fn parse_word(input: &str) -> IResult<&str, Syntax> {
    let (rest, word) = parse_identifier(input)?;

    match word {
        "true" => Ok((rest, Syntax::Literal(Value::Bool(true)))),
        "false" => Ok((rest, Syntax::Literal(Value::Bool(false)))),
        "null" => Ok((rest, Syntax::Literal(Value::Null))),
        "new" => {
            let (rest, members) = delimited(
                ws(char('{')),
                separated_list0(ws(char(',')), parse_member),
                ws(char('}')),
            )(rest)?;
            Ok((rest, Syntax::New(members)))
        }
        "date" if preceded(multispace0, char::<&str, nom::error::Error<&str>>('\''))(rest).is_ok() => {
            let (rest, text) = preceded(multispace0, parse_quoted_string)(rest)?;
            match parse_datetime(&text) {
                Some(at) => Ok((rest, Syntax::Literal(Value::DateTime(at)))),
                None => Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Verify,
                ))),
            }
        }
        _ => match parse_call_args(rest) {
            Ok((rest, args)) => Ok((
                rest,
                Syntax::Call {
                    target: None,
                    method: word.to_string(),
                    args,
                },
            )),
            Err(_) => Ok((rest, Syntax::Name(word.to_string()))),
        },
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// `name = expr`, or an expression whose last member names itself.
fn parse_member(input: &str) -> IResult<&str, (String, Syntax)> {
    alt((
        map(
            separated_pair(ws(parse_identifier), pair(char('='), not(char('='))), parse_expr),
            |(name, e)| (name.to_string(), e),
        ),
        map_opt(parse_expr, |e| implied_name(&e).map(|name| (name, e))),
    ))(input)
}

fn implied_name(node: &Syntax) -> Option<String> {
    match node {
        Syntax::Member(_, name) | Syntax::Name(name) => Some(name.clone()),
        _ => None,
    }
}

/// `(arg, ..)` where each argument is a lambda or an expression.
fn parse_call_args(input: &str) -> IResult<&str, Vec<Syntax>> {
    preceded(
        multispace0,
        delimited(
            char('('),
            separated_list0(ws(char(',')), alt((parse_lambda, parse_expr))),
            ws(char(')')),
        ),
    )(input)
}

/// `x => body` or `(a, b) => body`.
fn parse_lambda(input: &str) -> IResult<&str, Syntax> {
    let (input, params) = ws(alt((
        map(parse_identifier, |p: &str| vec![p.to_string()]),
        delimited(
            char('('),
            separated_list1(ws(char(',')), map(ws(parse_identifier), str::to_string)),
            char(')'),
        ),
    )))(input)?;
    let (input, _) = tag("=>")(input)?;
    let (input, body) = parse_expr(input)?;
    Ok((input, Syntax::Lambda(params, Box::new(body))))
}

/// Parse an identifier (model, member, method or parameter name).
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// Parse a number (integer or float).
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (input, num_str) = recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1)))))(input)?;

    if num_str.contains('.') {
        Ok((input, Value::Float(num_str.parse().unwrap_or(0.0))))
    } else {
        Ok((input, Value::Int(num_str.parse().unwrap_or(0))))
    }
}

/// Parse a quoted string: `'..'` with `''` escapes, or `".."`.
fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('\''),
            map(many0(alt((value('\'', tag("''")), none_of("'")))), |chars: Vec<char>| {
                chars.into_iter().collect()
            }),
            char('\''),
        ),
        delimited(char('"'), map(take_while(|c| c != '"'), str::to_string), char('"')),
    ))(input)
}

const GROUP_AGGREGATES: &[&str] = &["Count", "Sum", "Min", "Max", "Average"];

/// Name and type resolution over a parsed tree.
struct Resolver<'s> {
    schema: &'s Schema,
    scope: Vec<(String, TypeRef)>,
}

impl<'s> Resolver<'s> {
    fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            scope: Vec::new(),
        }
    }

    fn resolve(&mut self, node: &Syntax) -> ExqlResult<Expr> {
        match node {
            Syntax::Literal(v) => Ok(Expr::value(v.clone())),
            Syntax::Name(name) => self.name(name),
            Syntax::Member(target, field) => Ok(self.resolve(target)?.field(field.clone())),
            Syntax::Binary(op, left, right) => {
                let left = self.resolve(left)?;
                let right = self.resolve(right)?;
                Ok(Expr::binary(*op, left, right))
            }
            Syntax::New(members) => self.new_object(members),
            Syntax::Lambda(..) => Err(ExqlError::UnsupportedExpressionKind(
                "lambda outside a query operator".to_string(),
            )),
            Syntax::Call {
                target: Some(target),
                method,
                args,
            } => {
                let target = self.resolve(target)?;
                self.call(target, method, args)
            }
            Syntax::Call {
                target: None,
                method,
                args,
            } => {
                let (first, rest) = args.split_first().ok_or_else(|| {
                    ExqlError::UnsupportedExpressionKind(format!("{}() without a source", method))
                })?;
                let target = self.resolve(first)?;
                self.call(target, method, rest)
            }
        }
    }

    fn name(&self, name: &str) -> ExqlResult<Expr> {
        if let Some((_, ty)) = self.scope.iter().rev().find(|(n, _)| n == name) {
            return Ok(Expr::param(name, ty.clone()));
        }
        match self.schema.find(name) {
            Some(model) => Ok(Expr::table(model.clone())),
            None => Err(ExqlError::UnboundParameter(name.to_string())),
        }
    }

    fn lambda(&mut self, node: &Syntax, params: Vec<TypeRef>) -> ExqlResult<Expr> {
        let Syntax::Lambda(names, body) = node else {
            return Err(ExqlError::UnsupportedExpressionKind(
                "expected a lambda argument".to_string(),
            ));
        };
        if names.len() != params.len() {
            return Err(ExqlError::UnsupportedExpressionKind(format!(
                "lambda with {} parameters where {} expected",
                names.len(),
                params.len()
            )));
        }

        let depth = self.scope.len();
        self.scope.extend(names.iter().cloned().zip(params));
        let body = self.resolve(body);
        self.scope.truncate(depth);
        Ok(Expr::lambda(names.as_slice(), body?).quote())
    }

    fn call(&mut self, target: Expr, method: &str, args: &[Syntax]) -> ExqlResult<Expr> {
        match target.ty().clone() {
            TypeRef::Sequence(element) => self.operator(target, *element, method, args),
            TypeRef::Grouping { element, .. } if GROUP_AGGREGATES.contains(&method) => {
                let mut call_args = vec![target];
                if let Some(selector) = args.first() {
                    call_args.push(self.lambda(selector, vec![*element])?);
                }
                let ty = aggregate_type(method, call_args.get(1), TypeRef::Unknown);
                Ok(Expr::call(method, call_args, ty))
            }
            _ => {
                let args = args
                    .iter()
                    .map(|a| self.resolve(a))
                    .collect::<ExqlResult<Vec<_>>>()?;
                Ok(target.method(method, args))
            }
        }
    }

    fn operator(&mut self, source: Expr, element: TypeRef, method: &str, args: &[Syntax]) -> ExqlResult<Expr> {
        let same = source.ty().clone();
        let required = |index: usize| {
            args.get(index).ok_or_else(|| {
                ExqlError::UnsupportedExpressionKind(format!("{} is missing argument {}", method, index + 1))
            })
        };

        let (operands, ty) = match method {
            "Where" | "OrderBy" | "OrderByDescending" | "ThenBy" | "ThenByDescending" => {
                (vec![self.lambda(required(0)?, vec![element])?], same)
            }
            "Select" => {
                let projection = self.lambda(required(0)?, vec![element])?;
                let ty = TypeRef::sequence(projection.ty().clone());
                (vec![projection], ty)
            }
            "GroupBy" => {
                let key = self.lambda(required(0)?, vec![element.clone()])?;
                let ty = TypeRef::sequence(TypeRef::Grouping {
                    key: Box::new(key.ty().clone()),
                    element: Box::new(element),
                });
                (vec![key], ty)
            }
            "Join" => {
                let inner = self.resolve(required(0)?)?;
                let inner_element = inner.ty().element();
                let outer_key = self.lambda(required(1)?, vec![element.clone()])?;
                let inner_key = self.lambda(required(2)?, vec![inner_element.clone()])?;
                let result = self.lambda(required(3)?, vec![element, inner_element])?;
                let ty = TypeRef::sequence(result.ty().clone());
                (vec![inner, outer_key, inner_key, result], ty)
            }
            "Take" => (vec![self.resolve(required(0)?)?], same),
            "Distinct" => (vec![], same),
            "First" | "FirstOrDefault" => (self.optional_lambda(args, element.clone())?, element),
            "Count" | "LongCount" => (
                self.optional_lambda(args, element)?,
                TypeRef::Scalar(ValueType::Int),
            ),
            "Sum" | "Min" | "Max" | "Average" => {
                let selector = self.optional_lambda(args, element.clone())?;
                let ty = aggregate_type(method, selector.first(), element);
                (selector, ty)
            }
            _ => {
                return Err(ExqlError::UnsupportedExpressionKind(format!(
                    "query operator '{}'",
                    method
                )));
            }
        };

        let mut call_args = Vec::with_capacity(operands.len() + 1);
        call_args.push(source);
        call_args.extend(operands);
        Ok(Expr::call(method, call_args, ty))
    }

    fn optional_lambda(&mut self, args: &[Syntax], element: TypeRef) -> ExqlResult<Vec<Expr>> {
        match args.first() {
            Some(lambda) => Ok(vec![self.lambda(lambda, vec![element])?]),
            None => Ok(vec![]),
        }
    }

    fn new_object(&mut self, members: &[(String, Syntax)]) -> ExqlResult<Expr> {
        let members = members
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.resolve(value)?)))
            .collect::<ExqlResult<Vec<_>>>()?;
        let target = ModelMeta::anonymous(members.iter().map(|(name, e)| (name.clone(), e.ty().scalar())));
        Ok(Expr::new_object(Arc::new(target), ShapeKind::Named, members))
    }
}

fn aggregate_type(method: &str, selector: Option<&Expr>, fallback: TypeRef) -> TypeRef {
    match method {
        "Count" => TypeRef::Scalar(ValueType::Int),
        "Average" => TypeRef::Scalar(ValueType::Float),
        _ => selector.map(|s| s.ty().clone()).unwrap_or(fallback),
    }
}
