//! Attributed syntax tree consumed by the checker and the code generator.
//!
//! The tree is produced by an external parser and type checker: names are
//! resolved to internal class names (`java/lang/String`), every expression
//! carries its static type, and method calls carry their erased descriptor.

mod nodes;
mod visitor;

pub use nodes::*;
pub use visitor::*;

use std::fmt;

/// Source location information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Location {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// Span of source code (start and end locations)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn from_to(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start: Location::new(start_line, start_col, 0),
            end: Location::new(end_line, end_col, 0),
        }
    }

    /// Single-line span, handy for trees built by hand.
    pub fn line(line: usize) -> Self {
        Self::from_to(line, 1, line, 1)
    }

    pub fn contains(&self, other: &Span) -> bool {
        (self.start.line, self.start.column) <= (other.start.line, other.start.column)
            && (other.end.line, other.end.column) <= (self.end.line, self.end.column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// AST node trait that all located nodes implement
pub trait AstNode {
    fn span(&self) -> Span;
}
