//! Dominance between case labels.
//!
//! Labels are visited in source order and each one is compared with every
//! earlier label. Reordering two labels can therefore change the result: a
//! supertype pattern written before a subtype pattern dominates it, the other
//! order is fine.

use std::collections::HashSet;

use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Message};
use crate::common::hierarchy::{ResolveResult, TypeHierarchyOracle};

pub struct PatternDominanceChecker<'o> {
    oracle: &'o TypeHierarchyOracle,
}

#[derive(Default)]
struct Seen<'l> {
    default: bool,
    null: bool,
    unconditional: bool,
    constants: HashSet<ConstantKey<'l>>,
    /// Unguarded patterns; only these dominate later patterns.
    patterns: Vec<&'l Pattern>,
    /// Every pattern, guarded or not; any of them dominates a later constant.
    all_patterns: Vec<&'l Pattern>,
}

/// Value of a case constant as the selector sees it, so that `'A'` and `65`
/// collide under an integral selector.
#[derive(Debug, PartialEq, Eq, Hash)]
enum ConstantKey<'l> {
    Int(i32),
    Bool(bool),
    Str(&'l str),
    Enum { owner: &'l str, name: &'l str },
}

impl<'l> ConstantKey<'l> {
    fn of(constant: &'l CaseConstant) -> Self {
        match constant {
            CaseConstant::Int(v) => ConstantKey::Int(*v),
            CaseConstant::Char(c) => ConstantKey::Int(*c as i32),
            CaseConstant::Bool(b) => ConstantKey::Bool(*b),
            CaseConstant::Str(s) => ConstantKey::Str(s),
            CaseConstant::Enum { owner, name, .. } => ConstantKey::Enum { owner, name },
        }
    }
}

impl<'o> PatternDominanceChecker<'o> {
    pub fn new(oracle: &'o TypeHierarchyOracle) -> Self {
        Self { oracle }
    }

    /// Diagnostics for every dominated, duplicated or conflicting label.
    /// Resolution failures stop the check for the remaining labels.
    pub fn check(&self, selector: &TypeRef, labels: &[&CaseLabel]) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let mut seen = Seen::default();
        for label in labels {
            if let Err(e) = self.check_label(selector, label, &mut seen, &mut out) {
                out.push(Diagnostic::error(label.span, Message::Resolve(e.to_string())));
                break;
            }
        }
        out
    }

    fn check_label<'l>(
        &self,
        selector: &TypeRef,
        label: &'l CaseLabel,
        seen: &mut Seen<'l>,
        out: &mut Vec<Diagnostic>,
    ) -> ResolveResult<()> {
        let span = label.span;
        for element in &label.elements {
            match element {
                CaseLabelElement::Default => {
                    if seen.default {
                        out.push(Diagnostic::error(span, Message::DuplicateDefault));
                    } else if seen.unconditional {
                        out.push(Diagnostic::error(span, Message::UnconditionalAndDefault));
                    }
                    seen.default = true;
                }
                CaseLabelElement::Null => {
                    if seen.null {
                        out.push(Diagnostic::error(span, Message::DuplicateCase));
                    } else if seen.default || seen.unconditional {
                        out.push(Diagnostic::error(span, Message::Dominated));
                    }
                    seen.null = true;
                }
                CaseLabelElement::Constant(constant) => {
                    if !seen.constants.insert(ConstantKey::of(constant)) {
                        out.push(Diagnostic::error(span, Message::DuplicateCase));
                        continue;
                    }
                    let constant_type = constant_type(constant, selector);
                    if self.dominates_constant(&seen.all_patterns, &constant_type)? {
                        out.push(Diagnostic::error(span, Message::Dominated));
                    }
                }
                CaseLabelElement::Pattern(pattern) => {
                    let mut dominated = seen.default;
                    if !dominated {
                        for earlier in &seen.patterns {
                            if self.dominates(earlier, pattern)? {
                                dominated = true;
                                break;
                            }
                        }
                    }
                    if dominated {
                        out.push(Diagnostic::error(pattern_span(pattern, span), Message::Dominated));
                    }
                    if !label.is_guarded() && self.is_unconditional(pattern, selector)? {
                        if seen.unconditional {
                            out.push(Diagnostic::error(span, Message::DuplicateUnconditional));
                        } else if seen.default {
                            out.push(Diagnostic::error(span, Message::UnconditionalAndDefault));
                        }
                        seen.unconditional = true;
                    }
                }
            }
        }
        if !label.is_guarded() {
            seen.patterns.extend(label.patterns());
        }
        seen.all_patterns.extend(label.patterns());
        Ok(())
    }

    fn dominates_constant(&self, patterns: &[&Pattern], constant_type: &TypeRef) -> ResolveResult<bool> {
        for pattern in patterns {
            if let Pattern::Type(tp) = pattern {
                if self.oracle.is_subtype(constant_type, &tp.type_ref)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// `earlier` matches every value `later` matches.
    pub fn dominates(&self, earlier: &Pattern, later: &Pattern) -> ResolveResult<bool> {
        match (earlier, later) {
            (Pattern::Type(e), _) => self.oracle.is_subtype(later.type_ref(), &e.type_ref),
            (Pattern::Record(_), Pattern::Type(_)) => Ok(false),
            (Pattern::Record(e), Pattern::Record(l)) => {
                let same_record = TypeHierarchyOracle::erase(&e.type_ref) == TypeHierarchyOracle::erase(&l.type_ref);
                if !same_record || e.components.len() != l.components.len() {
                    return Ok(false);
                }
                for (ec, lc) in e.components.iter().zip(&l.components) {
                    if !self.dominates(ec, lc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// A type pattern matching every value of the selector type, `null` aside.
    pub fn is_unconditional(&self, pattern: &Pattern, selector: &TypeRef) -> ResolveResult<bool> {
        match pattern {
            Pattern::Type(tp) => self.oracle.is_subtype(&TypeHierarchyOracle::boxed(selector), &tp.type_ref),
            Pattern::Record(_) => Ok(false),
        }
    }
}

/// Boxed type of a case constant, taking the selector's primitive into account
/// (`case 65` under a `char` selector is a `Character`).
pub fn constant_type(constant: &CaseConstant, selector: &TypeRef) -> TypeRef {
    let selector_prim = selector
        .primitive_type()
        .or_else(|| selector.class_name().and_then(PrimitiveType::from_box_class));
    let boxed = |p: PrimitiveType| TypeRef::class(p.box_class().unwrap_or(crate::consts::OBJECT));
    match constant {
        CaseConstant::Int(_) => match selector_prim {
            Some(p) if p.is_int_like() && p != PrimitiveType::Boolean => boxed(p),
            _ => boxed(PrimitiveType::Int),
        },
        CaseConstant::Char(_) => boxed(PrimitiveType::Char),
        CaseConstant::Bool(_) => boxed(PrimitiveType::Boolean),
        CaseConstant::Str(_) => TypeRef::string(),
        CaseConstant::Enum { owner, .. } => TypeRef::class(owner.clone()),
    }
}

fn pattern_span(pattern: &Pattern, label_span: Span) -> Span {
    let span = pattern.span();
    if span == Span::default() {
        label_span
    } else {
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::hierarchy::TypeInfo;

    fn oracle() -> TypeHierarchyOracle {
        TypeHierarchyOracle::builder()
            .register(TypeInfo::record(
                "Point",
                vec![
                    crate::common::hierarchy::RecordComponent { name: "x".into(), type_ref: TypeRef::object() },
                    crate::common::hierarchy::RecordComponent { name: "y".into(), type_ref: TypeRef::object() },
                ],
            ))
            .build()
    }

    fn run(selector: TypeRef, labels: Vec<CaseLabel>) -> Vec<String> {
        let oracle = oracle();
        let refs: Vec<&CaseLabel> = labels.iter().collect();
        PatternDominanceChecker::new(&oracle)
            .check(&selector, &refs)
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    fn integer() -> TypeRef {
        TypeRef::class("java/lang/Integer")
    }

    fn number() -> TypeRef {
        TypeRef::class("java/lang/Number")
    }

    #[test]
    fn supertype_first_dominates_and_order_matters() {
        let dominated = run(
            TypeRef::object(),
            vec![CaseLabel::of_type(number(), "n"), CaseLabel::of_type(integer(), "i"), CaseLabel::default_label()],
        );
        assert_eq!(dominated, vec![Message::Dominated.to_string()]);

        let clean = run(
            TypeRef::object(),
            vec![CaseLabel::of_type(integer(), "i"), CaseLabel::of_type(number(), "n"), CaseLabel::default_label()],
        );
        assert!(clean.is_empty());
    }

    #[test]
    fn guarded_pattern_does_not_dominate() {
        let msgs = run(
            TypeRef::object(),
            vec![
                CaseLabel::of_type(number(), "n").when(Expr::local("flag", TypeRef::boolean())),
                CaseLabel::of_type(integer(), "i"),
            ],
        );
        assert!(msgs.is_empty());
        let msgs = run(
            TypeRef::object(),
            vec![CaseLabel::of_type(number(), "n").when(Expr::boolean(true)), CaseLabel::of_type(integer(), "i")],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);
    }

    #[test]
    fn pattern_dominates_constant_through_boxing() {
        let msgs = run(
            integer(),
            vec![CaseLabel::of_type(integer(), "i"), CaseLabel::of_constants(vec![CaseConstant::Int(42)])],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);
    }

    #[test]
    fn guarded_pattern_still_dominates_later_constant() {
        // case Integer i when flag -> ...; case 1 -> ...; case Integer j -> ...
        let msgs = run(
            integer(),
            vec![
                CaseLabel::of_type(integer(), "i").when(Expr::local("flag", TypeRef::boolean())),
                CaseLabel::of_constants(vec![CaseConstant::Int(1)]),
                CaseLabel::of_type(integer(), "j"),
            ],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);
    }

    #[test]
    fn char_and_int_constants_with_same_value_are_duplicates() {
        let msgs = run(
            TypeRef::primitive(PrimitiveType::Char),
            vec![
                CaseLabel::of_constants(vec![CaseConstant::Char('A')]),
                CaseLabel::of_constants(vec![CaseConstant::Int(65)]),
            ],
        );
        assert_eq!(msgs, vec![Message::DuplicateCase.to_string()]);

        let msgs = run(
            TypeRef::primitive(PrimitiveType::Char),
            vec![
                CaseLabel::of_constants(vec![CaseConstant::Char('A')]),
                CaseLabel::of_constants(vec![CaseConstant::Int(66)]),
            ],
        );
        assert!(msgs.is_empty());
    }

    #[test]
    fn second_unconditional_is_reported_twice() {
        let msgs = run(
            TypeRef::object(),
            vec![CaseLabel::of_type(TypeRef::object(), "a"), CaseLabel::of_type(TypeRef::object(), "b")],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string(), Message::DuplicateUnconditional.to_string()]);
    }

    #[test]
    fn default_interactions() {
        let msgs = run(
            TypeRef::object(),
            vec![CaseLabel::default_label(), CaseLabel::of_type(TypeRef::string(), "s")],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);

        let msgs = run(
            TypeRef::object(),
            vec![CaseLabel::of_type(TypeRef::object(), "o"), CaseLabel::default_label()],
        );
        assert_eq!(msgs, vec![Message::UnconditionalAndDefault.to_string()]);

        let msgs = run(TypeRef::int(), vec![CaseLabel::default_label(), CaseLabel::default_label()]);
        assert_eq!(msgs, vec![Message::DuplicateDefault.to_string()]);

        let msgs = run(
            TypeRef::int(),
            vec![CaseLabel::default_label(), CaseLabel::of_constants(vec![CaseConstant::Int(1)])],
        );
        assert!(msgs.is_empty());
    }

    #[test]
    fn null_and_duplicate_constants() {
        let msgs = run(
            TypeRef::object(),
            vec![CaseLabel::of_type(TypeRef::object(), "o"), CaseLabel::null_label()],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);

        let msgs = run(TypeRef::string(), vec![CaseLabel::null_label(), CaseLabel::null_label()]);
        assert_eq!(msgs, vec![Message::DuplicateCase.to_string()]);

        let msgs = run(
            TypeRef::string(),
            vec![
                CaseLabel::of_constants(vec![CaseConstant::Str("a".into())]),
                CaseLabel::of_constants(vec![CaseConstant::Str("a".into())]),
            ],
        );
        assert_eq!(msgs, vec![Message::DuplicateCase.to_string()]);
    }

    #[test]
    fn record_patterns_dominate_componentwise() {
        let point = || TypeRef::class("Point");
        let loose = Pattern::record(
            point(),
            vec![Pattern::type_pattern(TypeRef::object(), "a"), Pattern::type_pattern(TypeRef::object(), "b")],
        );
        let tight = Pattern::record(
            point(),
            vec![Pattern::type_pattern(TypeRef::string(), "c"), Pattern::type_pattern(integer(), "d")],
        );
        let msgs = run(TypeRef::object(), vec![CaseLabel::of_pattern(loose.clone()), CaseLabel::of_pattern(tight.clone())]);
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);
        let msgs = run(TypeRef::object(), vec![CaseLabel::of_pattern(tight), CaseLabel::of_pattern(loose)]);
        assert!(msgs.is_empty());

        let msgs = run(
            TypeRef::object(),
            vec![
                CaseLabel::of_type(point(), "p"),
                CaseLabel::of_pattern(Pattern::record(point(), vec![
                    Pattern::type_pattern(TypeRef::object(), "x"),
                    Pattern::type_pattern(TypeRef::object(), "y"),
                ])),
            ],
        );
        assert_eq!(msgs, vec![Message::Dominated.to_string()]);
    }

    #[test]
    fn unresolved_type_is_reported() {
        let msgs = run(TypeRef::object(), vec![CaseLabel::of_type(TypeRef::class("p/Nope"), "x")]);
        assert_eq!(msgs, vec!["p.Nope cannot be resolved to a type".to_string()]);
    }
}
