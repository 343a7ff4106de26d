//! Switch review: label structure, dominance, fall-through and exhaustiveness.
//!
//! [`review_switch`] is the only way to obtain a [`ValidatedSwitch`], which the
//! lowering pass requires. A switch with any Error diagnostic is never
//! validated, so the code generator cannot lower a switch that failed review.

use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Message};
use crate::common::hierarchy::{ResolveResult, TypeHierarchyOracle};
use crate::config::Config;

pub mod dominance;
pub mod exhaustiveness;
pub mod fallthrough;
pub mod labels;

pub use dominance::PatternDominanceChecker;
pub use exhaustiveness::ExhaustivenessProver;

/// What the selector expression looks like to the lowering pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorKind {
    Boolean,
    Int(PrimitiveType),
    Boxed(PrimitiveType),
    String,
    Enum(String),
    Reference,
}

impl SelectorKind {
    pub fn classify(selector: &TypeRef, oracle: &TypeHierarchyOracle) -> ResolveResult<Self> {
        if let Some(p) = selector.primitive_type() {
            return Ok(if p == PrimitiveType::Boolean { SelectorKind::Boolean } else { SelectorKind::Int(p) });
        }
        let erased = TypeHierarchyOracle::erase(selector);
        let name = match erased.class_name() {
            Some(name) => name,
            None => return Ok(SelectorKind::Reference),
        };
        if let Some(p) = PrimitiveType::from_box_class(name) {
            return Ok(SelectorKind::Boxed(p));
        }
        if name == crate::consts::STRING {
            return Ok(SelectorKind::String);
        }
        if oracle.is_enum(name)? {
            return Ok(SelectorKind::Enum(name.to_string()));
        }
        Ok(SelectorKind::Reference)
    }

    /// Selector types a pre-pattern switch statement accepts.
    pub fn is_legacy(&self) -> bool {
        match self {
            SelectorKind::Int(p) | SelectorKind::Boxed(p) => {
                matches!(p, PrimitiveType::Char | PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Int)
            }
            SelectorKind::String | SelectorKind::Enum(_) => true,
            SelectorKind::Boolean | SelectorKind::Reference => false,
        }
    }
}

/// A switch that passed review. Only this module can construct one.
#[derive(Debug)]
pub struct ValidatedSwitch<'a> {
    switch: &'a SwitchConstruct,
    selector: SelectorKind,
    exhaustive: bool,
    enhanced: bool,
}

impl<'a> ValidatedSwitch<'a> {
    pub fn construct(&self) -> &'a SwitchConstruct {
        self.switch
    }

    pub fn selector_kind(&self) -> &SelectorKind {
        &self.selector
    }

    pub fn is_exhaustive(&self) -> bool {
        self.exhaustive
    }

    /// Uses patterns, `case null`, or a selector type older switches reject.
    pub fn is_enhanced(&self) -> bool {
        self.enhanced
    }

    /// Exhaustive without an explicit `default`: the lowered code needs a throwing fallback.
    pub fn needs_synthetic_default(&self) -> bool {
        self.exhaustive && !self.switch.has_default() && (self.switch.is_expression || self.enhanced)
    }
}

#[derive(Debug)]
pub struct SwitchReview<'a> {
    pub diagnostics: Vec<Diagnostic>,
    pub outcome: Option<ValidatedSwitch<'a>>,
}

impl SwitchReview<'_> {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub fn is_enhanced(switch: &SwitchConstruct, selector: &SelectorKind) -> bool {
    !selector.is_legacy() || switch.has_patterns() || switch.has_null()
}

/// Runs every switch check in order and validates the switch when no error was found.
pub fn review_switch<'a>(switch: &'a SwitchConstruct, oracle: &TypeHierarchyOracle, config: &Config) -> SwitchReview<'a> {
    log::debug!("review start: switch at {} cases={}", switch.span, switch.cases.len());
    let mut diagnostics = labels::check_labels(switch);

    let selector = match SelectorKind::classify(switch.selector_type(), oracle) {
        Ok(kind) => kind,
        Err(e) => {
            diagnostics.push(Diagnostic::error(switch.selector.span, Message::Resolve(e.to_string())));
            return SwitchReview { diagnostics, outcome: None };
        }
    };
    let labels: Vec<&CaseLabel> = switch.labels().collect();

    diagnostics.extend(PatternDominanceChecker::new(oracle).check(switch.selector_type(), &labels));
    if !switch.uses_arrows {
        diagnostics.extend(fallthrough::check_fall_through(switch));
    }

    let enhanced = is_enhanced(switch, &selector);
    let exhaustive = match ExhaustivenessProver::new(oracle).is_exhaustive(switch.selector_type(), &labels) {
        Ok(exhaustive) => exhaustive,
        Err(e) => {
            diagnostics.push(Diagnostic::error(switch.span, Message::Resolve(e.to_string())));
            false
        }
    };
    diagnostics.extend(exhaustiveness::exhaustiveness_diagnostic(switch, exhaustive, enhanced, config));

    let failed = diagnostics.iter().any(Diagnostic::is_error);
    log::debug!(
        "review end: exhaustive={} enhanced={} diagnostics={} validated={}",
        exhaustive,
        enhanced,
        diagnostics.len(),
        !failed
    );
    let outcome = if failed { None } else { Some(ValidatedSwitch { switch, selector, exhaustive, enhanced }) };
    SwitchReview { diagnostics, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::hierarchy::TypeInfo;

    fn oracle() -> TypeHierarchyOracle {
        TypeHierarchyOracle::builder()
            .register(TypeInfo::interface("I").sealed(&["A", "B"]))
            .register(TypeInfo::class("A").final_().implements("I"))
            .register(TypeInfo::class("B").final_().implements("I"))
            .register(TypeInfo::enumeration("Color", &["RED", "GREEN"]))
            .build()
    }

    fn sealed_switch(cases: Vec<SwitchCase>) -> SwitchConstruct {
        SwitchConstruct::expression(Expr::local("i", TypeRef::class("I")), cases, TypeRef::int())
    }

    #[test]
    fn exhaustive_sealed_expression_is_validated() {
        let switch = sealed_switch(vec![
            SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("A"), "a"), Expr::int(0)),
            SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("B"), "b"), Expr::int(1)),
        ]);
        let review = review_switch(&switch, &oracle(), &Config::default());
        assert!(review.diagnostics.is_empty());
        let validated = review.outcome.unwrap();
        assert!(validated.is_exhaustive());
        assert!(validated.needs_synthetic_default());
        assert_eq!(validated.selector_kind(), &SelectorKind::Reference);
    }

    #[test]
    fn failing_switch_is_not_validated() {
        let switch = sealed_switch(vec![SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("A"), "a"), Expr::int(0))]);
        let review = review_switch(&switch, &oracle(), &Config::default());
        assert!(review.outcome.is_none());
        assert_eq!(review.diagnostics[0].message, "A switch expression should have a default case");
    }

    #[test]
    fn classify_selectors() {
        let oracle = oracle();
        assert_eq!(SelectorKind::classify(&TypeRef::class("Color"), &oracle).unwrap(), SelectorKind::Enum("Color".into()));
        assert_eq!(
            SelectorKind::classify(&TypeRef::class("java/lang/Integer"), &oracle).unwrap(),
            SelectorKind::Boxed(PrimitiveType::Int)
        );
        assert!(SelectorKind::classify(&TypeRef::class("Missing"), &oracle).is_err());
        assert!(!SelectorKind::Reference.is_legacy());
    }
}
