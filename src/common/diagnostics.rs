//! Recoverable problems collected while checking a compilation unit.

use std::fmt;

use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Fixed catalog of user-facing messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Message {
    #[error("This case label is dominated by one of the preceding case labels")]
    Dominated,
    #[error("Duplicate case")]
    DuplicateCase,
    #[error("The default case is already defined")]
    DuplicateDefault,
    #[error("Illegal fall-through to a pattern")]
    FallThroughToPattern,
    #[error("Illegal fall-through from a case label pattern")]
    FallThroughFromPattern,
    #[error("A switch label may not have more than one pattern case label element")]
    MultiplePatterns,
    #[error("A null case label and patterns cannot co-exist in the same case label")]
    NullWithPattern,
    #[error("A null case label has to be either the only expression in a case label or the first expression followed only by a default")]
    NullNotFirst,
    #[error("A 'default' can occur after 'case' only as a second case label expression and that too only if 'null' precedes in 'case null, default'")]
    MisplacedDefault,
    #[error("A switch label may not have both a pattern case label element and a default case label element")]
    PatternWithDefault,
    #[error("Cannot mix pattern with other case labels")]
    MixedPatternAndConstant,
    #[error("The switch statement cannot have more than one unconditional pattern")]
    DuplicateUnconditional,
    #[error("Switch case cannot have both unconditional pattern and default label")]
    UnconditionalAndDefault,
    #[error("A switch expression should have a default case")]
    ExpressionNotExhaustive,
    #[error("An enhanced switch statement should be exhaustive; a default label expected")]
    StatementNotExhaustive,
    #[error("The switch statement should have a default case")]
    MissingDefault,
    #[error("Local variable {0} referenced from a guard must be final or effectively final")]
    GuardCaptureNotFinal(String),
    #[error("Local variable {0} defined in an enclosing scope must be final or effectively final")]
    LambdaCaptureNotFinal(String),
    #[error("A pattern variable with the same name is already defined in the statement")]
    DuplicateBinding,
    #[error("A guard is only allowed on a case label with a pattern")]
    GuardWithoutPattern,
    #[error("This case label has a guard that is a constant expression with value 'false'")]
    FalseGuard,
    #[error("{0}")]
    Resolve(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn error(span: Span, message: Message) -> Self {
        Self { severity: Severity::Error, span, message: message.to_string() }
    }

    pub fn warning(span: Span, message: Message) -> Self {
        Self { severity: Severity::Warning, span, message: message.to_string() }
    }

    pub fn with_severity(span: Span, severity: Severity, message: Message) -> Self {
        Self { severity, span, message: message.to_string() }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.span, self.message)
    }
}

/// Append-only diagnostic list for one compilation unit.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identical reports at the same position are kept once.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        let duplicate = self
            .items
            .iter()
            .any(|d| d.span == diagnostic.span && d.message == diagnostic.message);
        if !duplicate {
            log::trace!("diagnostic: {}", diagnostic);
            self.items.push(diagnostic);
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Stable sort by start position; reports at one position keep their order.
    pub fn into_sorted(mut self) -> Vec<Diagnostic> {
        self.items.sort_by_key(|d| (d.span.start.line, d.span.start.column));
        self.items
    }
}
