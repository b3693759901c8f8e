//! Compiled rules: the uniform "line sequence in, line sequence out" contract.
//!
//! A [`Rule`] is one of three forms:
//!
//! - **Expression**: one or more [`Expression`]s applied to each line in turn.
//! - **Function**: a transform from a [`Registry`], called once per file with
//!   all lines and the file name.
//! - **Executable**: an external program fed the file on stdin.
//!
//! All three run caller-supplied logic with the privileges of the current
//! process. Never compile rules from untrusted input.

use crate::encoding::TextEncoding;
use crate::error::{Error, Result};
use crate::executable::ExecutableRule;
use crate::expr::{Bindings, Expression, LineOutcome};
use crate::registry::{Registry, TransformFn};
use crate::text::SourceText;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a rule sees for one file.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// Name used for the `filename` binding and in error messages
    pub file_name: &'a str,
    /// Decoded content of the file
    pub source: &'a SourceText,
}

/// Output of a rule for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    /// Replacement lines, rendered against the original terminators
    Lines(Vec<String>),
    /// Replacement text, used verbatim
    Text(String),
}

/// A compiled transformation applied once per file.
///
/// Implementations must be deterministic for identical input.
pub trait LineRule: Send + Sync {
    /// Transforms the content of one file.
    ///
    /// # Errors
    ///
    /// Returns a per-file error ([`Error::RuleEvaluation`] or
    /// [`Error::RuleExecution`]) if the rule fails.
    fn apply(&self, input: &RuleInput<'_>) -> Result<Transformed>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Expressions chained left to right over every line.
#[derive(Debug, Clone)]
pub struct ExpressionRule {
    expressions: Vec<Expression>,
}

impl ExpressionRule {
    /// Compiles every expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExpression`] for the first expression that
    /// does not compile, or [`Error::Config`] if the list is empty.
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::config("at least one expression is required"));
        }
        let expressions = sources
            .iter()
            .map(|source| Expression::compile(source.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { expressions })
    }

    /// Returns the compiled expressions.
    #[must_use]
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }
}

impl LineRule for ExpressionRule {
    fn apply(&self, input: &RuleInput<'_>) -> Result<Transformed> {
        let lines = input.source.lines();
        let mut out = Vec::with_capacity(lines.len());

        'lines: for (index, original) in lines.iter().enumerate() {
            let lineno = index + 1;
            let mut current = original.clone();

            for expression in &self.expressions {
                let bindings = Bindings {
                    line: &current,
                    lineno,
                    filename: input.file_name,
                };
                let outcome = expression.apply(&bindings).map_err(|e| {
                    Error::evaluation(
                        input.file_name,
                        Some(lineno),
                        format!("`{}`: {e}", expression.source()),
                    )
                })?;
                match outcome {
                    LineOutcome::Replace(text) => current = text,
                    LineOutcome::Keep => {}
                    LineOutcome::Delete => continue 'lines,
                }
            }

            out.push(current);
        }

        Ok(Transformed::Lines(out))
    }

    fn describe(&self) -> String {
        let sources: Vec<&str> = self.expressions.iter().map(Expression::source).collect();
        format!("expression(s) {sources:?}")
    }
}

/// A registry transform called with all lines and the file name.
#[derive(Clone)]
pub struct FunctionRule {
    reference: String,
    transform: Arc<TransformFn>,
}

impl FunctionRule {
    /// Resolves `reference` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleResolution`] if the reference cannot be resolved.
    pub fn resolve(reference: &str, registry: &Registry) -> Result<Self> {
        let transform = registry.resolve(reference)?;
        Ok(Self {
            reference: reference.to_string(),
            transform,
        })
    }
}

impl fmt::Debug for FunctionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRule")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl LineRule for FunctionRule {
    fn apply(&self, input: &RuleInput<'_>) -> Result<Transformed> {
        (self.transform)(input.source.lines(), input.file_name)
            .map(Transformed::Lines)
            .map_err(|e| Error::evaluation(input.file_name, None, format!("{}: {e:#}", self.reference)))
    }

    fn describe(&self) -> String {
        format!("function {}", self.reference)
    }
}

/// A compiled rule in one of its three forms.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Per-line expressions
    Expression(ExpressionRule),
    /// Whole-file transform from the registry
    Function(FunctionRule),
    /// External program
    Executable(ExecutableRule),
}

impl Rule {
    /// Compiles the configured rule source.
    ///
    /// Expressions win over a function or executable given alongside them;
    /// the ignored source is logged. A function together with an executable
    /// is rejected.
    ///
    /// # Errors
    ///
    /// Returns a configuration-class error if no source is given, if both a
    /// function and an executable are given, or if the chosen source fails
    /// to compile or resolve.
    pub fn compile(
        expressions: &[String],
        function: Option<&str>,
        executable: Option<&str>,
        registry: &Registry,
        encoding: TextEncoding,
    ) -> Result<Self> {
        let rule = if expressions.is_empty() {
            match (function, executable) {
                (Some(_), Some(_)) => {
                    return Err(Error::config(
                        "a function and an executable cannot be combined; pick one",
                    ));
                }
                (Some(reference), None) => Self::Function(FunctionRule::resolve(reference, registry)?),
                (None, Some(command)) => Self::Executable(ExecutableRule::resolve(command, encoding)?),
                (None, None) => {
                    return Err(Error::config(
                        "no rule given: pass an expression, a function, or an executable",
                    ));
                }
            }
        } else {
            if let Some(reference) = function {
                warn!("Ignoring function '{}': expressions take precedence", reference);
            }
            if let Some(command) = executable {
                warn!("Ignoring executable '{}': expressions take precedence", command);
            }
            Self::Expression(ExpressionRule::compile(expressions)?)
        };

        debug!("Compiled rule: {}", rule.describe());
        Ok(rule)
    }
}

impl LineRule for Rule {
    fn apply(&self, input: &RuleInput<'_>) -> Result<Transformed> {
        match self {
            Self::Expression(rule) => rule.apply(input),
            Self::Function(rule) => rule.apply(input),
            Self::Executable(rule) => rule.apply(input),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Expression(rule) => rule.describe(),
            Self::Function(rule) => rule.describe(),
            Self::Executable(rule) => rule.describe(),
        }
    }
}
