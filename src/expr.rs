//! Expression rules: a small Python-flavoured language evaluated once per line.
//!
//! An expression is compiled once, then evaluated against three bindings:
//! `line` (the current line without its terminator), `lineno` (1-based) and
//! `filename`. The language has no I/O primitives; it can only compute a value
//! from its bindings.
//!
//! ```text
//! re.sub('failIf', 'assertFalse', line)
//! line.replace('\t', '    ').rstrip()
//! None if 'DEBUG' in line else line
//! '%d: ' if False else str(lineno) + ': ' + line
//! ```
//!
//! The value of the expression decides what happens to the line:
//!
//! | value          | effect                                  |
//! |----------------|-----------------------------------------|
//! | string         | replaces the line                       |
//! | `None`/`False` | deletes the line                        |
//! | `True`         | keeps the line unchanged                |
//! | integer        | replaces the line with its decimal text |
//! | list           | replaces the line with items joined by a space |

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// A runtime failure while evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EvalError(String);

/// Largest string (bytes) or list (items) that `*` may produce.
const MAX_REPEAT_LEN: usize = 1 << 26;

type EvalResult<T> = std::result::Result<T, EvalError>;

fn fail<T>(message: impl Into<String>) -> EvalResult<T> {
    Err(EvalError(message.into()))
}

/// Values produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(String),
    /// List, produced by `split`, `findall` or `[...]`
    List(Vec<Value>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }

    const fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::List(_) => "list",
        }
    }

    fn to_text(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => s.clone(),
            Self::List(items) => {
                let inner: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Self::Str(s) => format!("'{s}'"),
                        other => other.to_text(),
                    })
                    .collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

/// Per-line bindings visible to an expression.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    /// Current line, without terminator
    pub line: &'a str,
    /// 1-based line number in the original file
    pub lineno: usize,
    /// Name of the file being edited
    pub filename: &'a str,
}

/// What an expression decided for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Replace the line with this text
    Replace(String),
    /// Keep the line as it is
    Keep,
    /// Drop the line from the output
    Delete,
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExpression`] for syntax errors, unknown names or
    /// functions, wrong argument counts, and invalid literal regexes.
    pub fn compile(source: &str) -> Result<Self> {
        let invalid = |column: usize, reason: String| Error::InvalidExpression {
            expression: source.to_string(),
            column,
            reason,
        };

        let tokens = tokenize(source).map_err(|e| invalid(e.column, e.reason))?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.conditional().map_err(|e| invalid(e.column, e.reason))?;

        if !matches!(parser.peek(), Tok::End) {
            return Err(invalid(parser.column(), "unexpected trailing input".to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Returns the expression source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression to a raw value.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] on type mismatches, out-of-range indexes,
    /// failed conversions, or invalid dynamic regexes.
    pub fn evaluate(&self, bindings: &Bindings<'_>) -> EvalResult<Value> {
        eval(&self.root, bindings)
    }

    /// Evaluates the expression and maps its value to a line outcome.
    ///
    /// # Errors
    ///
    /// See [`Expression::evaluate`].
    pub fn apply(&self, bindings: &Bindings<'_>) -> EvalResult<LineOutcome> {
        Ok(match self.evaluate(bindings)? {
            Value::Str(s) => LineOutcome::Replace(s),
            Value::None | Value::Bool(false) => LineOutcome::Delete,
            Value::Bool(true) => LineOutcome::Keep,
            Value::Int(i) => LineOutcome::Replace(i.to_string()),
            Value::List(items) => LineOutcome::Replace(
                items.iter().map(Value::to_text).collect::<Vec<_>>().join(" "),
            ),
        })
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Int(i64),
    Str(String),
    Name(String),
    Sym(&'static str),
    End,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    column: usize,
}

#[derive(Debug)]
struct ParseError {
    column: usize,
    reason: String,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "+", "-", "*", "(", ")", "[", "]", ",", ".", ":", "<", ">",
];

fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let value = digits.parse::<i64>().map_err(|_| ParseError {
                column,
                reason: format!("integer literal {digits} is too large"),
            })?;
            tokens.push(Token {
                tok: Tok::Int(value),
                column,
            });
            continue;
        }

        let raw_prefix = matches!(c, 'r' | 'R') && matches!(chars.get(i + 1), Some('\'' | '"'));
        if c == '\'' || c == '"' || raw_prefix {
            if raw_prefix {
                i += 1;
            }
            let (text, next) = lex_string(&chars, i, raw_prefix)?;
            tokens.push(Token {
                tok: Tok::Str(text),
                column,
            });
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Name(chars[start..i].iter().collect()),
                column,
            });
            continue;
        }

        let symbol = SYMBOLS.iter().copied().find(|sym| {
            sym.chars()
                .enumerate()
                .all(|(offset, ch)| chars.get(i + offset) == Some(&ch))
        });
        match symbol {
            Some(sym) => {
                tokens.push(Token {
                    tok: Tok::Sym(sym),
                    column,
                });
                i += sym.len();
            }
            None => {
                return Err(ParseError {
                    column,
                    reason: format!("unexpected character '{c}'"),
                });
            }
        }
    }

    tokens.push(Token {
        tok: Tok::End,
        column: chars.len() + 1,
    });
    Ok(tokens)
}

/// Lexes a quoted string starting at the opening quote.
/// Returns the unescaped text and the index after the closing quote.
fn lex_string(chars: &[char], open: usize, raw: bool) -> ParseResult<(String, usize)> {
    let quote = chars[open];
    let mut text = String::new();
    let mut i = open + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((text, i + 1));
        }
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if raw {
                text.push('\\');
                text.push(next);
            } else {
                match next {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    '\\' | '\'' | '"' => text.push(next),
                    // Unknown escapes stay verbatim so regexes like '\d' work.
                    other => {
                        text.push('\\');
                        text.push(other);
                    }
                }
            }
            i += 2;
            continue;
        }
        text.push(c);
        i += 1;
    }

    Err(ParseError {
        column: open + 1,
        reason: "unterminated string literal".to_string(),
    })
}

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Var {
    Line,
    LineNo,
    FileName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Len,
    Str,
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegexFn {
    Sub,
    Search,
    Match,
    FullMatch,
    FindAll,
    Split,
}

impl RegexFn {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sub" => Self::Sub,
            "search" => Self::Search,
            "match" => Self::Match,
            "fullmatch" => Self::FullMatch,
            "findall" => Self::FindAll,
            "split" => Self::Split,
            _ => return None,
        })
    }

    /// Argument count range, pattern included.
    const fn arity(self) -> (usize, usize) {
        match self {
            Self::Sub => (3, 4),
            Self::Split => (2, 3),
            Self::Search | Self::Match | Self::FullMatch | Self::FindAll => (2, 2),
        }
    }

    fn build(self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        match self {
            Self::Match => Regex::new(&format!(r"\A(?:{pattern})")),
            Self::FullMatch => Regex::new(&format!(r"\A(?:{pattern})\z")),
            _ => Regex::new(pattern),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Replace,
    Upper,
    Lower,
    Strip,
    LStrip,
    RStrip,
    StartsWith,
    EndsWith,
    Split,
    Join,
    Find,
    Count,
    Capitalize,
}

/// String methods with their accepted argument counts.
static METHODS: Lazy<HashMap<&'static str, (Method, usize, usize)>> = Lazy::new(|| {
    [
        ("replace", (Method::Replace, 2, 3)),
        ("upper", (Method::Upper, 0, 0)),
        ("lower", (Method::Lower, 0, 0)),
        ("strip", (Method::Strip, 0, 1)),
        ("lstrip", (Method::LStrip, 0, 1)),
        ("rstrip", (Method::RStrip, 0, 1)),
        ("startswith", (Method::StartsWith, 1, 1)),
        ("endswith", (Method::EndsWith, 1, 1)),
        ("split", (Method::Split, 0, 1)),
        ("join", (Method::Join, 1, 1)),
        ("find", (Method::Find, 1, 1)),
        ("count", (Method::Count, 1, 1)),
        ("capitalize", (Method::Capitalize, 0, 0)),
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone)]
enum RegexArg {
    Compiled(Regex),
    Dynamic(Box<Node>),
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Var(Var),
    List(Vec<Node>),
    Neg(Box<Node>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Compare(CmpOp, Box<Node>, Box<Node>),
    Cond {
        then: Box<Node>,
        test: Box<Node>,
        otherwise: Box<Node>,
    },
    Index(Box<Node>, Box<Node>),
    Slice(Box<Node>, Option<Box<Node>>, Option<Box<Node>>),
    Call(Func, Vec<Node>),
    Method(Box<Node>, Method, Vec<Node>),
    Regex(RegexFn, RegexArg, Vec<Node>),
}

// ============================================================================
// Parser
// ============================================================================

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "if", "else"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn column(&self) -> usize {
        self.tokens[self.pos].column
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, reason: impl Into<String>) -> ParseResult<T> {
        Err(ParseError {
            column: self.column(),
            reason: reason.into(),
        })
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Name(name) if name == keyword)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        let found = self.at_sym(sym);
        if found {
            self.advance();
        }
        found
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.at_keyword(keyword);
        if found {
            self.advance();
        }
        found
    }

    fn expect_sym(&mut self, sym: &str) -> ParseResult<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            self.error(format!("expected '{sym}'"))
        }
    }

    fn conditional(&mut self) -> ParseResult<Node> {
        let then = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let test = self.or_expr()?;
        if !self.eat_keyword("else") {
            return self.error("expected 'else' in conditional expression");
        }
        let otherwise = self.conditional()?;
        Ok(Node::Cond {
            then: Box::new(then),
            test: Box::new(test),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_expr(&mut self) -> ParseResult<Node> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Node> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> ParseResult<Node> {
        if self.eat_keyword("not") {
            return Ok(Node::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Node> {
        let left = self.additive()?;
        let op = match self.peek() {
            Tok::Sym("==") => CmpOp::Eq,
            Tok::Sym("!=") => CmpOp::Ne,
            Tok::Sym("<") => CmpOp::Lt,
            Tok::Sym("<=") => CmpOp::Le,
            Tok::Sym(">") => CmpOp::Gt,
            Tok::Sym(">=") => CmpOp::Ge,
            Tok::Name(name) if name == "in" => CmpOp::In,
            Tok::Name(name)
                if name == "not"
                    && matches!(&self.tokens[self.pos + 1].tok, Tok::Name(next) if next == "in") =>
            {
                self.advance();
                CmpOp::NotIn
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Node::Compare(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> ParseResult<Node> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinOp::Add
            } else if self.eat_sym("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.multiplicative()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Node> {
        let mut left = self.unary()?;
        while self.eat_sym("*") {
            let right = self.unary()?;
            left = Node::Binary(BinOp::Mul, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Node> {
        if self.eat_sym("-") {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Node> {
        let mut node = self.primary()?;
        loop {
            if self.eat_sym("[") {
                node = self.subscript(node)?;
            } else if self.eat_sym(".") {
                node = self.method(node)?;
            } else {
                return Ok(node);
            }
        }
    }

    fn subscript(&mut self, target: Node) -> ParseResult<Node> {
        let start = if self.at_sym(":") {
            None
        } else {
            Some(self.conditional()?)
        };

        if self.eat_sym(":") {
            let end = if self.at_sym("]") {
                None
            } else {
                Some(Box::new(self.conditional()?))
            };
            self.expect_sym("]")?;
            return Ok(Node::Slice(Box::new(target), start.map(Box::new), end));
        }

        self.expect_sym("]")?;
        match start {
            Some(index) => Ok(Node::Index(Box::new(target), Box::new(index))),
            None => self.error("empty subscript"),
        }
    }

    fn method(&mut self, target: Node) -> ParseResult<Node> {
        let column = self.column();
        let Tok::Name(name) = self.advance() else {
            return Err(ParseError {
                column,
                reason: "expected a method name after '.'".to_string(),
            });
        };
        let Some(&(method, min, max)) = METHODS.get(name.as_str()) else {
            return Err(ParseError {
                column,
                reason: format!("unknown string method '{name}'"),
            });
        };
        let args = self.call_args()?;
        check_arity(&name, args.len(), min, max, column)?;
        Ok(Node::Method(Box::new(target), method, args))
    }

    fn call_args(&mut self) -> ParseResult<Vec<Node>> {
        self.expect_sym("(")?;
        let mut args = Vec::new();
        while !self.eat_sym(")") {
            args.push(self.conditional()?);
            if !self.eat_sym(",") {
                self.expect_sym(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Node> {
        let column = self.column();
        match self.advance() {
            Tok::Int(i) => Ok(Node::Literal(Value::Int(i))),
            Tok::Str(s) => Ok(Node::Literal(Value::Str(s))),
            Tok::Sym("(") => {
                let inner = self.conditional()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Sym("[") => {
                let mut items = Vec::new();
                while !self.eat_sym("]") {
                    items.push(self.conditional()?);
                    if !self.eat_sym(",") {
                        self.expect_sym("]")?;
                        break;
                    }
                }
                Ok(Node::List(items))
            }
            Tok::Name(name) => self.name(&name, column),
            Tok::End => Err(ParseError {
                column,
                reason: "unexpected end of expression".to_string(),
            }),
            Tok::Sym(sym) => Err(ParseError {
                column,
                reason: format!("unexpected '{sym}'"),
            }),
        }
    }

    fn name(&mut self, name: &str, column: usize) -> ParseResult<Node> {
        let func = match name {
            "True" => return Ok(Node::Literal(Value::Bool(true))),
            "False" => return Ok(Node::Literal(Value::Bool(false))),
            "None" => return Ok(Node::Literal(Value::None)),
            "line" => return Ok(Node::Var(Var::Line)),
            "lineno" => return Ok(Node::Var(Var::LineNo)),
            "filename" => return Ok(Node::Var(Var::FileName)),
            "re" => return self.regex_call(),
            "len" => Func::Len,
            "str" => Func::Str,
            "int" => Func::Int,
            keyword if KEYWORDS.contains(&keyword) => {
                return Err(ParseError {
                    column,
                    reason: format!("unexpected keyword '{keyword}'"),
                });
            }
            other => {
                return Err(ParseError {
                    column,
                    reason: format!(
                        "unknown name '{other}' (available: line, lineno, filename, re, len, str, int)"
                    ),
                });
            }
        };
        let args = self.call_args()?;
        check_arity(name, args.len(), 1, 1, column)?;
        Ok(Node::Call(func, args))
    }

    fn regex_call(&mut self) -> ParseResult<Node> {
        self.expect_sym(".")?;
        let column = self.column();
        let Tok::Name(name) = self.advance() else {
            return Err(ParseError {
                column,
                reason: "expected a function name after 're.'".to_string(),
            });
        };
        let Some(func) = RegexFn::from_name(&name) else {
            return Err(ParseError {
                column,
                reason: format!(
                    "unknown function 're.{name}' (available: sub, search, match, fullmatch, findall, split)"
                ),
            });
        };

        let mut args = self.call_args()?;
        let (min, max) = func.arity();
        check_arity(&format!("re.{name}"), args.len(), min, max, column)?;

        let pattern = match args.remove(0) {
            Node::Literal(Value::Str(pattern)) => {
                let compiled = func.build(&pattern).map_err(|e| ParseError {
                    column,
                    reason: format!("invalid regex {pattern:?}: {e}"),
                })?;
                RegexArg::Compiled(compiled)
            }
            other => RegexArg::Dynamic(Box::new(other)),
        };
        Ok(Node::Regex(func, pattern, args))
    }
}

fn check_arity(name: &str, given: usize, min: usize, max: usize, column: usize) -> ParseResult<()> {
    if (min..=max).contains(&given) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{min} to {max}")
    };
    Err(ParseError {
        column,
        reason: format!("{name}() takes {expected} argument(s) ({given} given)"),
    })
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval(node: &Node, env: &Bindings<'_>) -> EvalResult<Value> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Var(Var::Line) => Ok(Value::Str(env.line.to_string())),
        Node::Var(Var::LineNo) => Ok(Value::Int(i64::try_from(env.lineno).unwrap_or(i64::MAX))),
        Node::Var(Var::FileName) => Ok(Value::Str(env.filename.to_string())),
        Node::List(items) => Ok(Value::List(
            items.iter().map(|item| eval(item, env)).collect::<EvalResult<_>>()?,
        )),
        Node::Neg(inner) => match eval(inner, env)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError("integer overflow".to_string())),
            other => fail(format!("bad operand type for unary -: '{}'", other.type_name())),
        },
        Node::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.truthy())),
        Node::And(left, right) => {
            let left = eval(left, env)?;
            if left.truthy() { eval(right, env) } else { Ok(left) }
        }
        Node::Or(left, right) => {
            let left = eval(left, env)?;
            if left.truthy() { Ok(left) } else { eval(right, env) }
        }
        Node::Binary(op, left, right) => binary(*op, eval(left, env)?, eval(right, env)?),
        Node::Compare(op, left, right) => compare(*op, &eval(left, env)?, &eval(right, env)?),
        Node::Cond {
            then,
            test,
            otherwise,
        } => {
            if eval(test, env)?.truthy() {
                eval(then, env)
            } else {
                eval(otherwise, env)
            }
        }
        Node::Index(target, index) => {
            let index = expect_int(&eval(index, env)?, "index")?;
            match eval(target, env)? {
                Value::Str(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    match position(chars.len(), index) {
                        Some(at) => Ok(Value::Str(chars[at].to_string())),
                        None => fail("string index out of range"),
                    }
                }
                Value::List(mut items) => match position(items.len(), index) {
                    Some(at) => Ok(items.swap_remove(at)),
                    None => fail("list index out of range"),
                },
                other => fail(format!("'{}' object is not subscriptable", other.type_name())),
            }
        }
        Node::Slice(target, start, end) => {
            let start = start
                .as_ref()
                .map(|n| eval(n, env).and_then(|v| expect_int(&v, "slice start")))
                .transpose()?;
            let end = end
                .as_ref()
                .map(|n| eval(n, env).and_then(|v| expect_int(&v, "slice end")))
                .transpose()?;
            match eval(target, env)? {
                Value::Str(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let (from, to) = slice_bounds(chars.len(), start, end);
                    Ok(Value::Str(chars[from..to].iter().collect()))
                }
                Value::List(items) => {
                    let (from, to) = slice_bounds(items.len(), start, end);
                    Ok(Value::List(items[from..to].to_vec()))
                }
                other => fail(format!("'{}' object is not subscriptable", other.type_name())),
            }
        }
        Node::Call(func, args) => call(*func, eval(&args[0], env)?),
        Node::Method(target, method, args) => {
            let target = eval(target, env)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<EvalResult<Vec<_>>>()?;
            call_method(*method, target, &args)
        }
        Node::Regex(func, pattern, args) => {
            let dynamic;
            let regex = match pattern {
                RegexArg::Compiled(regex) => regex,
                RegexArg::Dynamic(node) => {
                    let source = eval(node, env)?;
                    let source = expect_str(&source, "regex pattern")?;
                    dynamic = func
                        .build(source)
                        .map_err(|e| EvalError(format!("invalid regex {source:?}: {e}")))?;
                    &dynamic
                }
            };
            let args = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<EvalResult<Vec<_>>>()?;
            call_regex(*func, regex, &args)
        }
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> EvalResult<Value> {
    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
    };
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (BinOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (op, Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| EvalError("integer overflow".to_string()))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            let times = repeat_count(s.len(), n)?;
            Ok(Value::Str(s.repeat(times)))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n)) => {
            let times = repeat_count(items.len(), n)?;
            Ok(Value::List(
                std::iter::repeat_n(items, times).flatten().collect(),
            ))
        }
        (_, left, right) => fail(format!(
            "unsupported operand types for {symbol}: '{}' and '{}'",
            left.type_name(),
            right.type_name()
        )),
    }
}

/// Repetition count for `seq * n`, refusing results above [`MAX_REPEAT_LEN`].
fn repeat_count(len: usize, n: i64) -> EvalResult<usize> {
    let times = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => fail(format!("repeated sequence too long ({len} x {n})")),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let ordering = |left: &Value, right: &Value| match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => fail(format!(
            "cannot order '{}' and '{}'",
            left.type_name(),
            right.type_name()
        )),
    };
    let contains = |needle: &Value, haystack: &Value| match (needle, haystack) {
        (Value::Str(n), Value::Str(h)) => Ok(h.contains(n.as_str())),
        (needle, Value::List(items)) => Ok(items.contains(needle)),
        _ => fail(format!(
            "'in' requires a str or list on the right, not '{}'",
            haystack.type_name()
        )),
    };

    let result = match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt => ordering(left, right)?.is_lt(),
        CmpOp::Le => ordering(left, right)?.is_le(),
        CmpOp::Gt => ordering(left, right)?.is_gt(),
        CmpOp::Ge => ordering(left, right)?.is_ge(),
        CmpOp::In => contains(left, right)?,
        CmpOp::NotIn => !contains(left, right)?,
    };
    Ok(Value::Bool(result))
}

fn call(func: Func, arg: Value) -> EvalResult<Value> {
    match (func, arg) {
        (Func::Len, Value::Str(s)) => Ok(Value::Int(count_to_int(s.chars().count()))),
        (Func::Len, Value::List(items)) => Ok(Value::Int(count_to_int(items.len()))),
        (Func::Str, value) => Ok(Value::Str(value.to_text())),
        (Func::Int, Value::Int(i)) => Ok(Value::Int(i)),
        (Func::Int, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (Func::Int, Value::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError(format!("invalid literal for int(): {s:?}"))),
        (func, other) => fail(format!(
            "{}() does not accept '{}'",
            match func {
                Func::Len => "len",
                Func::Str => "str",
                Func::Int => "int",
            },
            other.type_name()
        )),
    }
}

fn call_method(method: Method, target: Value, args: &[Value]) -> EvalResult<Value> {
    let s = expect_str(&target, "string method target")?;
    let value = match method {
        Method::Replace => {
            let old = expect_str(&args[0], "replace() old")?;
            let new = expect_str(&args[1], "replace() new")?;
            match args.get(2).map(|v| expect_int(v, "replace() count")).transpose()? {
                Some(count) if count >= 0 => {
                    Value::Str(s.replacen(old, new, usize::try_from(count).unwrap_or(usize::MAX)))
                }
                _ => Value::Str(s.replace(old, new)),
            }
        }
        Method::Upper => Value::Str(s.to_uppercase()),
        Method::Lower => Value::Str(s.to_lowercase()),
        Method::Strip | Method::LStrip | Method::RStrip => {
            let set = args.first().map(|v| expect_str(v, "strip() chars")).transpose()?;
            let trimmed = match (method, set) {
                (Method::Strip, None) => s.trim(),
                (Method::LStrip, None) => s.trim_start(),
                (Method::RStrip, None) => s.trim_end(),
                (Method::Strip, Some(set)) => s.trim_matches(|c: char| set.contains(c)),
                (Method::LStrip, Some(set)) => s.trim_start_matches(|c: char| set.contains(c)),
                (_, Some(set)) => s.trim_end_matches(|c: char| set.contains(c)),
                _ => s,
            };
            Value::Str(trimmed.to_string())
        }
        Method::StartsWith => Value::Bool(s.starts_with(expect_str(&args[0], "startswith()")?)),
        Method::EndsWith => Value::Bool(s.ends_with(expect_str(&args[0], "endswith()")?)),
        Method::Split => {
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
                Some(sep) => {
                    let sep = expect_str(sep, "split() separator")?;
                    if sep.is_empty() {
                        return fail("split() separator must not be empty");
                    }
                    s.split(sep).map(|p| Value::Str(p.to_string())).collect()
                }
            };
            Value::List(parts)
        }
        Method::Join => match &args[0] {
            Value::List(items) => Value::Str(
                items
                    .iter()
                    .map(Value::to_text)
                    .collect::<Vec<_>>()
                    .join(s),
            ),
            other => return fail(format!("join() expects a list, not '{}'", other.type_name())),
        },
        Method::Find => {
            let needle = expect_str(&args[0], "find()")?;
            Value::Int(
                s.find(needle)
                    .map_or(-1, |at| count_to_int(s[..at].chars().count())),
            )
        }
        Method::Count => {
            let needle = expect_str(&args[0], "count()")?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Value::Int(count_to_int(count))
        }
        Method::Capitalize => {
            let mut chars = s.chars();
            Value::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            })
        }
    };
    Ok(value)
}

fn call_regex(func: RegexFn, regex: &Regex, args: &[Value]) -> EvalResult<Value> {
    match func {
        RegexFn::Sub => {
            let replacement = python_replacement(expect_str(&args[0], "re.sub() replacement")?);
            let subject = expect_str(&args[1], "re.sub() string")?;
            let count = args
                .get(2)
                .map(|v| expect_int(v, "re.sub() count"))
                .transpose()?
                .unwrap_or(0);
            let replaced = if count <= 0 {
                regex.replace_all(subject, replacement.as_str())
            } else {
                regex.replacen(
                    subject,
                    usize::try_from(count).unwrap_or(usize::MAX),
                    replacement.as_str(),
                )
            };
            Ok(Value::Str(replaced.into_owned()))
        }
        RegexFn::Search | RegexFn::Match | RegexFn::FullMatch => {
            Ok(Value::Bool(regex.is_match(expect_str(&args[0], "regex subject")?)))
        }
        RegexFn::FindAll => {
            let subject = expect_str(&args[0], "re.findall() string")?;
            let groups = regex.captures_len() - 1;
            let found = regex
                .captures_iter(subject)
                .map(|caps| {
                    let text = |i: usize| Value::Str(caps.get(i).map_or("", |m| m.as_str()).to_string());
                    match groups {
                        0 => text(0),
                        1 => text(1),
                        n => Value::List((1..=n).map(text).collect()),
                    }
                })
                .collect();
            Ok(Value::List(found))
        }
        RegexFn::Split => {
            let subject = expect_str(&args[0], "re.split() string")?;
            let limit = args
                .get(1)
                .map(|v| expect_int(v, "re.split() maxsplit"))
                .transpose()?
                .unwrap_or(0);
            let parts: Vec<Value> = if limit <= 0 {
                regex.split(subject).map(|p| Value::Str(p.to_string())).collect()
            } else {
                regex
                    .splitn(subject, usize::try_from(limit).unwrap_or(usize::MAX).saturating_add(1))
                    .map(|p| Value::Str(p.to_string()))
                    .collect()
            };
            Ok(Value::List(parts))
        }
    }
}

/// Translates Python replacement syntax (`\1`, `\g<name>`) to the regex crate's (`${1}`).
fn python_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut rest = replacement;

    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '$' => out.push_str("$$"),
            '\\' => {
                let digits = rest.chars().take_while(char::is_ascii_digit).count();
                if digits > 0 {
                    out.push_str(&format!("${{{}}}", &rest[..digits]));
                    rest = &rest[digits..];
                } else if let Some((name, after)) =
                    rest.strip_prefix("g<").and_then(|r| r.split_once('>'))
                {
                    out.push_str(&format!("${{{name}}}"));
                    rest = after;
                } else {
                    let unescaped = match rest.chars().next() {
                        Some('n') => Some('\n'),
                        Some('t') => Some('\t'),
                        Some('r') => Some('\r'),
                        Some('\\') => Some('\\'),
                        _ => None,
                    };
                    match unescaped {
                        Some(ch) => {
                            out.push(ch);
                            rest = &rest[1..];
                        }
                        None => out.push('\\'),
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn expect_str<'v>(value: &'v Value, what: &str) -> EvalResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => fail(format!("{what} must be a str, not '{}'", other.type_name())),
    }
}

fn expect_int(value: &Value, what: &str) -> EvalResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        other => fail(format!("{what} must be an int, not '{}'", other.type_name())),
    }
}

fn count_to_int(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Resolves a possibly negative index against a length.
fn position(len: usize, index: i64) -> Option<usize> {
    let len = count_to_int(len);
    let at = if index < 0 { len + index } else { index };
    (0..len).contains(&at).then(|| usize::try_from(at).unwrap_or(0))
}

/// Python slice clamping: negative bounds count from the end, out-of-range bounds clamp.
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let signed_len = count_to_int(len);
    let clamp = |i: i64| {
        let at = if i < 0 { (signed_len + i).max(0) } else { i.min(signed_len) };
        usize::try_from(at).unwrap_or(0)
    };
    let from = start.map_or(0, clamp);
    let to = end.map_or(len, clamp);
    (from, to.max(from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, line: &str) -> LineOutcome {
        let expr = Expression::compile(source).unwrap();
        expr.apply(&Bindings {
            line,
            lineno: 3,
            filename: "notes.txt",
        })
        .unwrap()
    }

    fn replaced(source: &str, line: &str) -> String {
        match run(source, line) {
            LineOutcome::Replace(text) => text,
            other => panic!("expected a replacement, got {other:?}"),
        }
    }

    fn compile_error(source: &str) -> String {
        Expression::compile(source).unwrap_err().to_string()
    }

    #[test]
    fn test_simple_replace() {
        assert_eq!(
            replaced("re.sub('cat', 'horse', line)", "What a nice cat!"),
            "What a nice horse!"
        );
    }

    #[test]
    fn test_replace_all_of_line_gives_empty_line() {
        assert_eq!(replaced("re.sub('all of it', '', line)", "all of it"), "");
    }

    #[test]
    fn test_python_group_references() {
        assert_eq!(
            replaced(r"re.sub(r'(\w+)@(\w+)', r'\2 at \1', line)", "me@host"),
            "host at me"
        );
        assert_eq!(
            replaced(r"re.sub('(?P<word>fo+)', r'<\g<word>>', line)", "a foo"),
            "a <foo>"
        );
        assert_eq!(replaced("re.sub('x', '$5', line)", "x"), "$5");
    }

    #[test]
    fn test_sub_with_count() {
        assert_eq!(replaced("re.sub('a', 'b', line, 1)", "aaa"), "baa");
    }

    #[test]
    fn test_bindings() {
        assert_eq!(
            replaced("filename + ':' + str(lineno) + ': ' + line", "body"),
            "notes.txt:3: body"
        );
    }

    #[test]
    fn test_none_and_false_delete() {
        assert_eq!(run("None if 'DEBUG' in line else line", "DEBUG x"), LineOutcome::Delete);
        assert_eq!(run("'DEBUG' not in line", "DEBUG x"), LineOutcome::Delete);
        assert_eq!(run("'DEBUG' not in line", "info"), LineOutcome::Keep);
    }

    #[test]
    fn test_other_falsy_results_keep_the_line() {
        assert_eq!(run("''", "text"), LineOutcome::Replace(String::new()));
        assert_eq!(replaced("0", "text"), "0");
        assert_eq!(replaced("[]", "text"), "");
    }

    #[test]
    fn test_list_results_join_with_space() {
        assert_eq!(replaced("line.split()[1:]", "drop  the first"), "the first");
        assert_eq!(replaced("re.findall(r'\\d+', line)", "a1b22c333"), "1 22 333");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(replaced("line.upper()", "abc"), "ABC");
        assert_eq!(replaced("line.rstrip()", "abc   "), "abc");
        assert_eq!(replaced("line.strip('-')", "--abc--"), "abc");
        assert_eq!(replaced("line.replace('\\t', '    ')", "\tx"), "    x");
        assert_eq!(replaced("'-'.join(line.split(','))", "a,b,c"), "a-b-c");
        assert_eq!(replaced("line.capitalize()", "hELLO"), "Hello");
        assert_eq!(replaced("str(line.find('b'))", "abc"), "1");
        assert_eq!(replaced("str(line.count('a'))", "banana"), "3");
    }

    #[test]
    fn test_indexing_and_slicing() {
        assert_eq!(replaced("line[0]", "héllo"), "h");
        assert_eq!(replaced("line[-1]", "héllo"), "o");
        assert_eq!(replaced("line[1:3]", "héllo"), "él");
        assert_eq!(replaced("line[:-2]", "hello"), "hel");
        assert_eq!(replaced("line[10:]", "hello"), "");
    }

    #[test]
    fn test_conditionals_and_logic() {
        assert_eq!(replaced("line if lineno > 2 else 'early'", "late"), "late");
        assert_eq!(replaced("line.startswith('#') and line or '# ' + line", "x"), "# x");
        assert_eq!(replaced("'x' * 3", ""), "xxx");
        assert_eq!(replaced("str(len(line) - 1)", "four"), "3");
    }

    #[test]
    fn test_regex_predicates() {
        assert_eq!(run("re.match('b', line)", "abc"), LineOutcome::Delete);
        assert_eq!(run("re.search('b', line)", "abc"), LineOutcome::Keep);
        assert_eq!(run("re.fullmatch('a.c', line)", "abc"), LineOutcome::Keep);
    }

    #[test]
    fn test_dynamic_pattern() {
        assert_eq!(replaced("re.sub(line[0], '_', line)", "xaxbx"), "_a_b_");
        assert_eq!(replaced("re.split(',\\s*', line)[1]", "a, b,c"), "b");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(compile_error("invalid expression").contains("unknown name 'invalid'"));
        assert!(compile_error("line +").contains("unexpected end"));
        assert!(compile_error("'open").contains("unterminated"));
        assert!(compile_error("line ; 1").contains("unexpected character"));
    }

    #[test]
    fn test_missing_argument_is_caught_at_compile_time() {
        let err = compile_error("re.sub('def test', 'def toast')");
        assert!(err.contains("re.sub() takes 3 to 4 argument(s) (2 given)"), "{err}");
    }

    #[test]
    fn test_invalid_literal_regex_is_caught_at_compile_time() {
        let err = Expression::compile("re.sub('(', 'x', line)").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("invalid regex"));
    }

    fn eval_error(source: &str, line: &str) -> String {
        Expression::compile(source)
            .unwrap()
            .apply(&Bindings {
                line,
                lineno: 1,
                filename: "f",
            })
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_negating_min_int_is_an_error() {
        let err = eval_error("str(-int(line))", "-9223372036854775808");
        assert!(err.contains("integer overflow"), "{err}");
        assert_eq!(replaced("str(-int(line))", "-42"), "42");
    }

    #[test]
    fn test_huge_repetition_is_an_error() {
        let err = eval_error("line * 9223372036854775807", "ab");
        assert!(err.contains("too long"), "{err}");
        let err = eval_error("str(len([line] * 9223372036854775807))", "ab");
        assert!(err.contains("too long"), "{err}");
        assert_eq!(replaced("line * 3", "ab"), "ababab");
        assert_eq!(replaced("line * -1", "ab"), "");
    }

    #[test]
    fn test_runtime_type_error() {
        let expr = Expression::compile("line + 1").unwrap();
        let err = expr
            .apply(&Bindings {
                line: "x",
                lineno: 1,
                filename: "f",
            })
            .unwrap_err();
        assert!(err.to_string().contains("unsupported operand types for +"));
    }

    #[test]
    fn test_int_conversion_failure() {
        let expr = Expression::compile("str(int(line) + 1)").unwrap();
        let bindings = |line| Bindings {
            line,
            lineno: 1,
            filename: "f",
        };
        assert_eq!(expr.apply(&bindings("41")).unwrap(), LineOutcome::Replace("42".into()));
        assert!(expr.apply(&bindings("forty")).is_err());
    }

    #[test]
    fn test_python_replacement_translation() {
        assert_eq!(python_replacement(r"\1-\2"), "${1}-${2}");
        assert_eq!(python_replacement(r"\g<name>"), "${name}");
        assert_eq!(python_replacement("cost: $1"), "cost: $$1");
        assert_eq!(python_replacement(r"a\nb"), "a\nb");
        assert_eq!(python_replacement(r"\q"), r"\q");
    }
}
