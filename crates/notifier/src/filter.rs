//! Filter expressions over build events.
//!
//! A CEL-compatible subset, sufficient for the filters typically written in
//! notifier configs:
//!
//! ```text
//! build.status in [Build.Status.SUCCESS, Build.Status.WORKING]
//! build.substitutions["_SERVICE_NAME"] == "api" && !("nightly" in build.tags)
//! "_SERVICE_NAME" in build.substitutions && build.substitutions._SERVICE_NAME.startsWith("web-")
//! size(build.tags) > 0
//! ```
//!
//! Supported: string, integer and boolean literals, `null`, lists,
//! `build.<field>` paths, `Build.Status.<NAME>` constants, indexing
//! (`map["KEY"]`, `map.KEY`, `list[0]`), `==`, `!=`, `<`, `<=`, `>`, `>=`,
//! `in` (lists and map keys), `&&`, `||`, `!`, parentheses, `size()` and the
//! string methods `startsWith`, `endsWith` and `contains`.
//!
//! Names, functions and argument counts are checked at compile time; value
//! types are checked during evaluation. As in CEL, a runtime error (such as
//! reading a substitution that is not set) propagates through comparisons and
//! `!`, and is absorbed only by `false && ...` / `true || ...`. An expression
//! that errors, or yields anything but `true`, does not match.

use std::cmp::Ordering;
use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::event::{BuildEvent, BuildStatus};
use crate::ports::EventFilter;

/// Why a filter expression failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("integer literal at offset {offset} is out of range")]
    IntegerOutOfRange { offset: usize },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unknown field '{path}'")]
    UnknownField { path: String },

    #[error("unknown build status '{name}'")]
    UnknownStatus { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("'{function}' takes {expected} argument(s), found {found}")]
    WrongArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    End,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "'{name}'"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Int(n) => write!(f, "{n}"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
            Self::EqEq => f.write_str("'=='"),
            Self::NotEq => f.write_str("'!='"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::AndAnd => f.write_str("'&&'"),
            Self::OrOr => f.write_str("'||'"),
            Self::Bang => f.write_str("'!'"),
            Self::End => f.write_str("end of expression"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '=' | '!' | '&' | '|' | '<' | '>' => {
                let next = chars.peek().map(|&(_, c)| c);
                let (token, pair) = match (ch, next) {
                    ('=', Some('=')) => (Token::EqEq, true),
                    ('!', Some('=')) => (Token::NotEq, true),
                    ('<', Some('=')) => (Token::Le, true),
                    ('>', Some('=')) => (Token::Ge, true),
                    ('&', Some('&')) => (Token::AndAnd, true),
                    ('|', Some('|')) => (Token::OrOr, true),
                    ('!', _) => (Token::Bang, false),
                    ('<', _) => (Token::Lt, false),
                    ('>', _) => (Token::Gt, false),
                    _ => return Err(FilterError::UnexpectedChar { ch, offset }),
                };
                if pair {
                    chars.next();
                }
                token
            }
            '"' | '\'' => {
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(FilterError::UnterminatedString { offset });
                }
                Token::Str(value)
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::from(c);
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = digits
                    .parse()
                    .map_err(|_| FilterError::IntegerOutOfRange { offset })?;
                Token::Int(n)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(ident)
            }
            _ => return Err(FilterError::UnexpectedChar { ch, offset }),
        };
        tokens.push(token);
    }

    tokens.push(Token::End);
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    ProjectId,
    Status,
    LogUrl,
    TriggerId,
    Tags,
    Substitutions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Size,
    StartsWith,
    EndsWith,
    Contains,
}

impl Function {
    fn named(name: &str) -> Option<Self> {
        match name {
            "size" => Some(Self::Size),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
        }
    }

    /// Argument count, receiver included.
    fn arity(self) -> usize {
        match self {
            Self::Size => 1,
            Self::StartsWith | Self::EndsWith | Self::Contains => 2,
        }
    }

    fn apply(self, args: &[Value]) -> Value {
        match (self, args) {
            (Self::Size, [Value::Str(s)]) => Value::size(s.chars().count()),
            (Self::Size, [Value::List(items)]) => Value::size(items.len()),
            (Self::Size, [Value::Map(map)]) => Value::size(map.len()),
            (Self::StartsWith, [Value::Str(s), Value::Str(prefix)]) => {
                Value::Bool(s.starts_with(prefix.as_str()))
            }
            (Self::EndsWith, [Value::Str(s), Value::Str(suffix)]) => {
                Value::Bool(s.ends_with(suffix.as_str()))
            }
            (Self::Contains, [Value::Str(s), Value::Str(needle)]) => {
                Value::Bool(s.contains(needle.as_str()))
            }
            _ => Value::Error(format!(
                "no matching overload for {}({})",
                self.name(),
                args.iter().map(Value::type_name).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Literal(Value),
    Field(Field),
    List(Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Relation(Relation, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// A runtime error; carries the reason for logging.
    Error(String),
}

impl Value {
    fn size(n: usize) -> Self {
        Self::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Error(_) => "error",
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::End)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FilterError> {
        let found = self.advance();
        if found == expected {
            Ok(())
        } else {
            Err(FilterError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    fn ident(&mut self) -> Result<String, FilterError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(FilterError::UnexpectedToken {
                expected: "identifier".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn parse(mut self) -> Result<Expr, FilterError> {
        if self.peek() == &Token::End {
            return Err(FilterError::Empty);
        }
        let expr = self.or()?;
        self.expect(Token::End)?;
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.and()?;
        while self.peek() == &Token::OrOr {
            self.advance();
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.comparison()?;
        while self.peek() == &Token::AndAnd {
            self.advance();
            lhs = Expr::And(Box::new(lhs), Box::new(self.comparison()?));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, FilterError> {
        let lhs = self.unary()?;
        let relation = match self.peek() {
            Token::EqEq => Relation::Eq,
            Token::NotEq => Relation::Ne,
            Token::Lt => Relation::Lt,
            Token::Le => Relation::Le,
            Token::Gt => Relation::Gt,
            Token::Ge => Relation::Ge,
            Token::Ident(kw) if kw == "in" => Relation::In,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.unary()?;
        Ok(Expr::Relation(relation, Box::new(lhs), Box::new(rhs)))
    }

    fn unary(&mut self) -> Result<Expr, FilterError> {
        if self.peek() == &Token::Bang {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    /// Member access, indexing and method calls after a primary.
    fn postfix(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.ident()?;
                    if self.peek() == &Token::LParen {
                        let mut args = vec![expr];
                        args.extend(self.call_args()?);
                        expr = Self::call(&name, args)?;
                    } else {
                        let key = Expr::Literal(Value::Str(name));
                        expr = Expr::Index(Box::new(expr), Box::new(key));
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let key = self.or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, FilterError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                args.push(self.or()?);
                if self.peek() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn call(name: &str, args: Vec<Expr>) -> Result<Expr, FilterError> {
        let function = Function::named(name).ok_or_else(|| FilterError::UnknownFunction {
            name: name.to_string(),
        })?;
        if args.len() != function.arity() {
            return Err(FilterError::WrongArgumentCount {
                function: name.to_string(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(function, args))
    }

    fn primary(&mut self) -> Result<Expr, FilterError> {
        match self.advance() {
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if self.peek() != &Token::RBracket {
                    loop {
                        items.push(self.or()?);
                        if self.peek() == &Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "build" => self.build_field(),
                "Build" => self.status_constant(),
                _ if self.peek() == &Token::LParen => {
                    let args = self.call_args()?;
                    Self::call(&name, args)
                }
                _ => Err(FilterError::UnknownField { path: name }),
            },
            other => Err(FilterError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn build_field(&mut self) -> Result<Expr, FilterError> {
        self.expect(Token::Dot)?;
        let name = self.ident()?;
        let field = match name.as_str() {
            "id" => Field::Id,
            "project_id" | "projectId" => Field::ProjectId,
            "status" => Field::Status,
            "log_url" | "logUrl" => Field::LogUrl,
            "build_trigger_id" | "buildTriggerId" => Field::TriggerId,
            "tags" => Field::Tags,
            "substitutions" => Field::Substitutions,
            _ => {
                return Err(FilterError::UnknownField {
                    path: format!("build.{name}"),
                })
            }
        };
        Ok(Expr::Field(field))
    }

    fn status_constant(&mut self) -> Result<Expr, FilterError> {
        self.expect(Token::Dot)?;
        let group = self.ident()?;
        if group != "Status" {
            return Err(FilterError::UnknownField {
                path: format!("Build.{group}"),
            });
        }
        self.expect(Token::Dot)?;
        let name = self.ident()?;
        match BuildStatus::from(name.as_str()) {
            BuildStatus::Other(name) => Err(FilterError::UnknownStatus { name }),
            status => Ok(Expr::Literal(Value::Str(status.as_str().to_string()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn lookup(field: Field, event: &BuildEvent) -> Value {
    match field {
        Field::Id => Value::Str(event.id.clone()),
        Field::ProjectId => Value::Str(event.project_id.clone()),
        Field::Status => Value::Str(event.status.as_str().to_string()),
        Field::LogUrl => Value::Str(event.log_url.clone()),
        Field::TriggerId => Value::Str(event.build_trigger_id.clone().unwrap_or_default()),
        Field::Tags => Value::List(event.tags.iter().cloned().map(Value::Str).collect()),
        Field::Substitutions => Value::Map(
            event
                .substitutions
                .iter()
                .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                .collect(),
        ),
    }
}

/// Evaluates every expression, stopping at the first error.
fn eval_all(exprs: &[Expr], event: &BuildEvent) -> Result<Vec<Value>, Value> {
    exprs
        .iter()
        .map(|e| match eval(e, event) {
            err @ Value::Error(_) => Err(err),
            value => Ok(value),
        })
        .collect()
}

fn index(target: Value, key: Value) -> Value {
    match (target, key) {
        (err @ Value::Error(_), _) | (_, err @ Value::Error(_)) => err,
        (Value::Map(mut map), Value::Str(key)) => map
            .remove(&key)
            .unwrap_or_else(|| Value::Error(format!("no such key: {key}"))),
        (Value::List(mut items), Value::Int(i)) => match usize::try_from(i) {
            Ok(pos) if pos < items.len() => items.swap_remove(pos),
            _ => Value::Error(format!("index out of range: {i}")),
        },
        (target, key) => Value::Error(format!(
            "cannot index {} with {}",
            target.type_name(),
            key.type_name()
        )),
    }
}

/// `&&` when `absorbing` is `false`, `||` when it is `true`.
fn logical(absorbing: bool, lhs: Value, rhs: impl FnOnce() -> Value) -> Value {
    if lhs == Value::Bool(absorbing) {
        return lhs;
    }
    match (lhs, rhs()) {
        (_, Value::Bool(b)) if b == absorbing => Value::Bool(b),
        (Value::Bool(_), Value::Bool(b)) => Value::Bool(b),
        (err @ Value::Error(_), _) | (_, err @ Value::Error(_)) => err,
        (lhs, rhs) => Value::Error(format!(
            "logical operator applied to {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )),
    }
}

fn relate(relation: Relation, lhs: Value, rhs: Value) -> Value {
    if lhs.is_error() {
        return lhs;
    }
    if rhs.is_error() {
        return rhs;
    }

    let ordering = match relation {
        Relation::Eq => return Value::Bool(lhs == rhs),
        Relation::Ne => return Value::Bool(lhs != rhs),
        Relation::In => {
            return match (&lhs, &rhs) {
                (_, Value::List(items)) => Value::Bool(items.contains(&lhs)),
                (Value::Str(key), Value::Map(map)) => Value::Bool(map.contains_key(key)),
                _ => Value::Error(format!(
                    "no matching overload for {} in {}",
                    lhs.type_name(),
                    rhs.type_name()
                )),
            }
        }
        Relation::Lt | Relation::Le | Relation::Gt | Relation::Ge => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => {
                return Value::Error(format!(
                    "cannot order {} against {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))
            }
        },
    };

    Value::Bool(match relation {
        Relation::Lt => ordering == Ordering::Less,
        Relation::Le => ordering != Ordering::Greater,
        Relation::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn eval(expr: &Expr, event: &BuildEvent) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Field(field) => lookup(*field, event),
        Expr::List(items) => eval_all(items, event).map_or_else(|err| err, Value::List),
        Expr::Index(target, key) => index(eval(target, event), eval(key, event)),
        Expr::Call(function, args) => match eval_all(args, event) {
            Ok(values) => function.apply(&values),
            Err(err) => err,
        },
        Expr::Not(inner) => match eval(inner, event) {
            Value::Bool(b) => Value::Bool(!b),
            err @ Value::Error(_) => err,
            other => Value::Error(format!("'!' applied to {}", other.type_name())),
        },
        Expr::And(lhs, rhs) => logical(false, eval(lhs, event), || eval(rhs, event)),
        Expr::Or(lhs, rhs) => logical(true, eval(lhs, event), || eval(rhs, event)),
        Expr::Relation(relation, lhs, rhs) => {
            relate(*relation, eval(lhs, event), eval(rhs, event))
        }
    }
}

// ---------------------------------------------------------------------------
// Public predicate
// ---------------------------------------------------------------------------

/// A compiled filter expression.
#[derive(Debug, Clone)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    /// Compiles `source` into a predicate.
    pub fn compile(source: &str) -> Result<Self, FilterError> {
        let parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
        };
        let expr = parser.parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Returns the expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl EventFilter for Predicate {
    fn apply(&self, event: &BuildEvent) -> bool {
        match eval(&self.expr, event) {
            Value::Bool(matched) => matched,
            Value::Error(reason) => {
                debug!(filter = %self.source, build_id = %event.id, %reason, "Filter evaluation failed");
                false
            }
            other => {
                debug!(
                    filter = %self.source,
                    build_id = %event.id,
                    result = other.type_name(),
                    "Filter did not yield a boolean"
                );
                false
            }
        }
    }
}
