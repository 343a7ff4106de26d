use std::collections::HashSet;

use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Message};

/// Per-label structural rules, checked before any type relation is consulted.
pub fn check_labels(switch: &SwitchConstruct) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for case in &switch.cases {
        check_label(&case.label, &mut out);
    }
    out
}

fn check_label(label: &CaseLabel, out: &mut Vec<Diagnostic>) {
    let span = label.span;
    let elements = &label.elements;
    let pattern_count = label.patterns().count();
    let has_constant = label.constants().next().is_some();

    if pattern_count > 1 {
        out.push(Diagnostic::error(span, Message::MultiplePatterns));
    }

    if let Some(null_at) = elements.iter().position(|e| matches!(e, CaseLabelElement::Null)) {
        if pattern_count > 0 {
            out.push(Diagnostic::error(span, Message::NullWithPattern));
        } else {
            let tail_ok = elements[null_at + 1..].iter().all(|e| matches!(e, CaseLabelElement::Default));
            if null_at != 0 || !tail_ok || elements.len() > 2 {
                out.push(Diagnostic::error(span, Message::NullNotFirst));
            }
        }
    }

    if label.has_default() {
        if pattern_count > 0 {
            out.push(Diagnostic::error(span, Message::PatternWithDefault));
        } else if elements.len() > 1 {
            let is_null_default =
                elements.len() == 2 && matches!(elements[0], CaseLabelElement::Null) && matches!(elements[1], CaseLabelElement::Default);
            if !is_null_default {
                out.push(Diagnostic::error(span, Message::MisplacedDefault));
            }
        }
    }

    if pattern_count > 0 && has_constant {
        out.push(Diagnostic::error(span, Message::MixedPatternAndConstant));
    }

    if let Some(guard) = &label.guard {
        if pattern_count == 0 {
            out.push(Diagnostic::error(guard.span, Message::GuardWithoutPattern));
        } else if guard.is_false_literal() {
            out.push(Diagnostic::error(guard.span, Message::FalseGuard));
        }
    }

    let mut names = HashSet::new();
    for (name, _) in label.bindings() {
        if name != "_" && !names.insert(name) {
            out.push(Diagnostic::error(span, Message::DuplicateBinding));
        }
    }
}
