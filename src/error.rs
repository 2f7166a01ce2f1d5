//! Error and warning types.
//!
//! Every failure in the pipeline is a [`CompileError`] whose [`ErrorKind`]
//! places it in the compiler's taxonomy. Errors are values: they abort the
//! compilation of one file and are never stored in the cache.
//!
//! # Example
//!
//! ```rust
//! use mtm_compiler::error::{CompileError, ErrorKind};
//!
//! let err = CompileError::frontmatter("src/App.mtm", "missing `target`")
//!     .with_suggestion("add `target: reactjs` to the frontmatter");
//!
//! assert_eq!(err.kind.type_name(), "FrontmatterError");
//! assert_eq!(err.report().suggestion.as_deref(), Some("add `target: reactjs` to the frontmatter"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::Target;
use crate::location::Location;

/// The category of a compile failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed header, missing/invalid target, malformed channel entry.
    Frontmatter,
    /// Unparseable body or unterminated template block.
    Syntax,
    /// A declared type annotation disagrees with the inferred type.
    TypeConflict {
        /// The annotated type.
        declared: String,
        /// The type inferred from the initializer.
        inferred: String,
    },
    /// The reactive graph contains a cycle.
    CircularDependency {
        /// Every variable on the cycle, in traversal order.
        members: Vec<String>,
    },
    /// A backend could not render a construct.
    Framework {
        /// The backend that failed.
        target: Target,
    },
    /// Cache failure; callers degrade to a fresh parse.
    Cache,
    /// A worker job exceeded its time budget.
    Timeout {
        /// The budget that was exceeded.
        limit: Duration,
    },
    /// The source file could not be read.
    Io,
}

impl ErrorKind {
    /// The name reported as `type` on the error surface.
    pub fn type_name(&self) -> &'static str {
        match self {
            ErrorKind::Frontmatter => "FrontmatterError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::TypeConflict { .. } => "TypeConflictError",
            ErrorKind::CircularDependency { .. } => "CircularDependencyError",
            ErrorKind::Framework { .. } => "FrameworkError",
            ErrorKind::Cache => "CacheError",
            ErrorKind::Timeout { .. } => "TimeoutError",
            ErrorKind::Io => "IoError",
        }
    }
}

/// A compile failure for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    /// Taxonomy entry.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The file being compiled.
    pub file: String,
    /// Optional hint on how to fix the problem.
    pub suggestion: Option<String>,
    /// Where in the file the problem is, if known.
    pub location: Option<Location>,
}

impl CompileError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: file.into(),
            suggestion: None,
            location: None,
        }
    }

    /// A frontmatter error.
    pub fn frontmatter(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Frontmatter, file, message)
    }

    /// A syntax error.
    pub fn syntax(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, file, message)
    }

    /// A type conflict between an annotation and the inferred type.
    pub fn type_conflict(
        file: impl Into<String>,
        name: &str,
        declared: impl Into<String>,
        inferred: impl Into<String>,
    ) -> Self {
        let declared = declared.into();
        let inferred = inferred.into();
        let message = format!(
            "`${name}` is declared as `{declared}` but its initializer is `{inferred}`"
        );
        Self::new(ErrorKind::TypeConflict { declared, inferred }, file, message)
    }

    /// A reactive dependency cycle.
    pub fn circular_dependency(file: impl Into<String>, members: Vec<String>) -> Self {
        let path = members
            .iter()
            .chain(members.first())
            .map(|m| format!("${m}"))
            .collect::<Vec<_>>()
            .join(" -> ");
        let message = format!("circular reactive dependency: {path}");
        Self::new(ErrorKind::CircularDependency { members }, file, message).with_suggestion(
            "break the cycle by making one variable a plain value or by updating it from a function",
        )
    }

    /// A backend-scoped code generation failure.
    pub fn framework(file: impl Into<String>, target: Target, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Framework { target }, file, message)
    }

    /// A cache failure.
    pub fn cache(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, file, message)
    }

    /// A worker job timeout.
    pub fn timeout(file: impl Into<String>, limit: Duration) -> Self {
        let message = format!("compilation did not finish within {}ms", limit.as_millis());
        Self::new(ErrorKind::Timeout { limit }, file, message)
    }

    /// An unreadable source file.
    pub fn io(file: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(ErrorKind::Io, file, format!("{err:#}"))
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach a source location.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Members of the cycle, for circular dependency errors.
    pub fn cycle_members(&self) -> Option<&[String]> {
        match &self.kind {
            ErrorKind::CircularDependency { members } => Some(members),
            _ => None,
        }
    }

    /// The serializable error surface.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind.type_name().to_string(),
            message: self.message.clone(),
            file: self.file.clone(),
            suggestion: self.suggestion.clone(),
            line: self.location.map(|l| l.start.line),
            column: self.location.map(|l| l.start.column),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{}: {}:{}: {}", self.kind.type_name(), self.file, loc, self.message)?,
            None => write!(f, "{}: {}: {}", self.kind.type_name(), self.file, self.message)?,
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  hint: {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// `{type, message, file, suggestion?}` as exposed to tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error type name, e.g. `SyntaxError`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// File the error belongs to.
    pub file: String,
    /// Optional fix hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// 1-indexed line, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-indexed column, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// Non-fatal findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum WarningKind {
    /// A `$name` reference that names no declaration or prop.
    UnresolvedReference { name: String },
    /// Legacy and modern idioms in the same file.
    MixedSyntax,
    /// `!` on a function declaration has no effect.
    ReactiveFunction { name: String },
    /// A failed reparse was answered with the last good compilation.
    StaleFallback { reason: String },
    /// A method call modifies reactive state in place, which the target
    /// does not observe.
    InPlaceMutation { name: String, method: String, target: Target },
}

impl WarningKind {
    /// Short stable code for the warning.
    pub fn code(&self) -> &'static str {
        match self {
            WarningKind::UnresolvedReference { .. } => "unresolved-reference",
            WarningKind::MixedSyntax => "mixed-syntax",
            WarningKind::ReactiveFunction { .. } => "reactive-function",
            WarningKind::StaleFallback { .. } => "stale-fallback",
            WarningKind::InPlaceMutation { .. } => "in-place-mutation",
        }
    }

    /// Get the warning message.
    pub fn message(&self) -> String {
        match self {
            WarningKind::UnresolvedReference { name } => format!(
                "`${name}` does not refer to any declaration or prop in this file"
            ),
            WarningKind::MixedSyntax => {
                "this file mixes `signal(...)` declarations with `$name` declarations".to_string()
            }
            WarningKind::ReactiveFunction { name } => {
                format!("`${name}!` is a function; the `!` marker is ignored")
            }
            WarningKind::StaleFallback { reason } => {
                format!("using the last successful compilation: {reason}")
            }
            WarningKind::InPlaceMutation { name, method, target } => format!(
                "`${name}.{method}(...)` changes `${name}` in place, which {target} does not track; assign a new value instead"
            ),
        }
    }
}

/// A reported warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// What was found.
    pub kind: WarningKind,
    /// File the warning belongs to.
    pub file: String,
    /// Where, if known.
    pub location: Option<Location>,
}

impl Warning {
    /// Create a new warning.
    pub fn new(kind: WarningKind, file: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            kind,
            file: file.into(),
            location,
        }
    }

    /// Get the warning message.
    pub fn message(&self) -> String {
        self.kind.message()
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "warning[{}]: {}:{}: {}", self.kind.code(), self.file, loc, self.message()),
            None => write!(f, "warning[{}]: {}: {}", self.kind.code(), self.file, self.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Position;

    #[test]
    fn test_type_names() {
        assert_eq!(CompileError::syntax("a.mtm", "x").kind.type_name(), "SyntaxError");
        assert_eq!(
            CompileError::timeout("a.mtm", Duration::from_secs(1)).kind.type_name(),
            "TimeoutError"
        );
        assert_eq!(
            CompileError::framework("a.mtm", Target::Vue, "x").kind.type_name(),
            "FrameworkError"
        );
    }

    #[test]
    fn test_type_conflict_names_both_types() {
        let err = CompileError::type_conflict("a.mtm", "count", "string", "number");
        assert!(err.message.contains("string"));
        assert!(err.message.contains("number"));
        assert_eq!(
            err.kind,
            ErrorKind::TypeConflict {
                declared: "string".to_string(),
                inferred: "number".to_string()
            }
        );
    }

    #[test]
    fn test_circular_dependency_members() {
        let err = CompileError::circular_dependency("a.mtm", vec!["a".into(), "b".into()]);
        assert_eq!(err.cycle_members(), Some(&["a".to_string(), "b".to_string()][..]));
        assert!(err.message.contains("$a -> $b -> $a"));
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_report_serialization() {
        let err = CompileError::syntax("src/App.mtm", "unexpected `)`")
            .at(Location::at(Position::new(4, 7, 30)));
        let json = serde_json::to_value(err.report()).unwrap();

        assert_eq!(json["type"], "SyntaxError");
        assert_eq!(json["file"], "src/App.mtm");
        assert_eq!(json["line"], 4);
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_display() {
        let err = CompileError::syntax("App.mtm", "unexpected end of input")
            .at(Location::at(Position::new(2, 3, 10)))
            .with_suggestion("close the block");
        assert_eq!(
            err.to_string(),
            "SyntaxError: App.mtm:2:3: unexpected end of input\n  hint: close the block"
        );
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::new(
            WarningKind::UnresolvedReference { name: "missing".into() },
            "App.mtm",
            None,
        );
        assert!(warning.to_string().starts_with("warning[unresolved-reference]"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompileError>();
        assert_send_sync::<Warning>();
    }
}
