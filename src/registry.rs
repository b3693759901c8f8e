//! Named transforms for function rules, looked up as `module:function`.
//!
//! The embedding program registers transforms before a run; the built-in
//! `text` module is always available to the command line.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Signature of a transform usable by function rules: `(lines, file_name) -> lines`.
pub type TransformFn = dyn Fn(&[String], &str) -> anyhow::Result<Vec<String>> + Send + Sync;

type LinesOnlyFn = dyn Fn(&[String]) -> anyhow::Result<Vec<String>> + Send + Sync;

/// A named transform registered by the embedding program.
///
/// Function rules always call their transform with the full line sequence and
/// the file name. A transform declared with [`Transform::lines`] only takes the
/// lines, so resolving it fails with a diagnostic instead of silently
/// dropping the file name.
#[derive(Clone)]
pub enum Transform {
    /// Two-argument transform
    WithName(Arc<TransformFn>),
    /// One-argument transform; registered but not resolvable
    LinesOnly(Arc<LinesOnlyFn>),
}

impl Transform {
    /// Wraps a `(lines, file_name) -> lines` closure.
    pub fn lines_with_name<F>(f: F) -> Self
    where
        F: Fn(&[String], &str) -> anyhow::Result<Vec<String>> + Send + Sync + 'static,
    {
        Self::WithName(Arc::new(f))
    }

    /// Wraps a `lines -> lines` closure.
    pub fn lines<F>(f: F) -> Self
    where
        F: Fn(&[String]) -> anyhow::Result<Vec<String>> + Send + Sync + 'static,
    {
        Self::LinesOnly(Arc::new(f))
    }

    /// Number of parameters the transform declares.
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Self::WithName(_) => 2,
            Self::LinesOnly(_) => 1,
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transform(arity = {})", self.arity())
    }
}

/// A parsed `module:function` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    /// Module name with any directories and extension removed
    pub module: String,
    /// Function name inside the module
    pub function: String,
}

impl FunctionRef {
    /// Parses `module:function`.
    ///
    /// The module part may be a path such as `tools/fixers.py`; only its file
    /// stem names the module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleResolution`] if either part is missing.
    pub fn parse(reference: &str) -> Result<Self> {
        let Some((module_path, function)) = reference.rsplit_once(':') else {
            return Err(Error::resolution(
                reference,
                "expected the form module:function",
            ));
        };

        let module = Path::new(module_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        if module.is_empty() || function.trim().is_empty() {
            return Err(Error::resolution(
                reference,
                "expected the form module:function",
            ));
        }

        Ok(Self {
            module,
            function: function.trim().to_string(),
        })
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.function)
    }
}

/// Transforms addressable as `module:function` from function rules.
#[derive(Clone, Default)]
pub struct Registry {
    modules: BTreeMap<String, BTreeMap<String, Transform>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `text` module.
    ///
    /// | reference           | effect                                   |
    /// |---------------------|------------------------------------------|
    /// | `text:rstrip`       | strips trailing whitespace               |
    /// | `text:squeeze_blank`| collapses runs of blank lines into one   |
    /// | `text:uniq`         | drops adjacent duplicate lines           |
    /// | `text:sort`         | sorts lines                              |
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new()
            .with(
                "text",
                "rstrip",
                Transform::lines_with_name(|lines, _| {
                    Ok(lines.iter().map(|l| l.trim_end().to_string()).collect())
                }),
            )
            .with(
                "text",
                "squeeze_blank",
                Transform::lines_with_name(|lines, _| {
                    let mut out: Vec<String> = Vec::with_capacity(lines.len());
                    for line in lines {
                        let blank = line.trim().is_empty();
                        if blank && out.last().is_some_and(|prev| prev.trim().is_empty()) {
                            continue;
                        }
                        out.push(line.clone());
                    }
                    Ok(out)
                }),
            )
            .with(
                "text",
                "uniq",
                Transform::lines_with_name(|lines, _| {
                    let mut out = lines.to_vec();
                    out.dedup();
                    Ok(out)
                }),
            )
            .with(
                "text",
                "sort",
                Transform::lines_with_name(|lines, _| {
                    let mut out = lines.to_vec();
                    out.sort();
                    Ok(out)
                }),
            )
    }

    /// Registers a transform, replacing any previous one with the same name.
    pub fn register(
        &mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        transform: Transform,
    ) -> &mut Self {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(function.into(), transform);
        self
    }

    /// Builder-style variant of [`Registry::register`].
    #[must_use]
    pub fn with(
        mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        transform: Transform,
    ) -> Self {
        self.register(module, function, transform);
        self
    }

    /// Returns every registered reference as `module:function`, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|(module, functions)| {
                functions.keys().map(move |function| format!("{module}:{function}"))
            })
            .collect()
    }

    /// Resolves a `module:function` reference to a callable transform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleResolution`] if the reference is malformed, the
    /// module or function is not registered, or the transform does not take
    /// `(lines, file_name)`.
    pub fn resolve(&self, reference: &str) -> Result<Arc<TransformFn>> {
        let parsed = FunctionRef::parse(reference)?;

        let Some(functions) = self.modules.get(&parsed.module) else {
            let available: Vec<&str> = self.modules.keys().map(String::as_str).collect();
            return Err(Error::resolution(
                reference,
                format!(
                    "module '{}' is not registered (available: {})",
                    parsed.module,
                    list_or_none(&available)
                ),
            ));
        };

        let Some(transform) = functions.get(&parsed.function) else {
            let available: Vec<&str> = functions.keys().map(String::as_str).collect();
            return Err(Error::resolution(
                reference,
                format!(
                    "module '{}' has no function '{}' (available: {})",
                    parsed.module,
                    parsed.function,
                    list_or_none(&available)
                ),
            ));
        };

        match transform {
            Transform::WithName(f) => Ok(Arc::clone(f)),
            Transform::LinesOnly(_) => Err(Error::resolution(
                reference,
                format!(
                    "'{parsed}' takes 1 argument (lines) but function rules call it with 2 \
                     (lines, file_name); register it with Transform::lines_with_name"
                ),
            )),
        }
    }
}

fn list_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.names())
            .finish()
    }
}
