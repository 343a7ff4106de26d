//! Shared symbol information and diagnostics used by every pass.

pub mod diagnostics;
pub mod hierarchy;

pub use diagnostics::{Diagnostic, Diagnostics, Message, Severity};
pub use hierarchy::{FunctionalMethod, ResolveError, TypeHierarchyOracle, TypeInfo};
