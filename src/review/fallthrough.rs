use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Message};

/// How control can arrive at the next case label of a statement-group switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Only a jump from the selector reaches the next label.
    NeedsBreakBoundary,
    /// The previous group completes normally into the next label.
    FallsThroughAllowed,
    /// The previous label declares pattern variables and has no statements.
    FallsThroughIllegal,
}

/// Pattern variables are only definitely matched when their label is the
/// entry point, so no path may fall into a binding label or out of an empty one.
pub fn check_fall_through(switch: &SwitchConstruct) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut boundary = Boundary::NeedsBreakBoundary;
    for case in &switch.cases {
        let binds = declares_bindings(&case.label);
        match boundary {
            Boundary::NeedsBreakBoundary => {}
            Boundary::FallsThroughAllowed => {
                if binds {
                    out.push(Diagnostic::error(case.label.span, Message::FallThroughToPattern));
                }
            }
            Boundary::FallsThroughIllegal => {
                out.push(Diagnostic::error(case.label.span, Message::FallThroughFromPattern));
            }
        }
        boundary = next_boundary(case, binds);
    }
    out
}

fn next_boundary(case: &SwitchCase, binds: bool) -> Boundary {
    match &case.body {
        CaseBody::Expr(_) => Boundary::NeedsBreakBoundary,
        CaseBody::Block(stmts) if stmts.is_empty() => {
            if binds {
                Boundary::FallsThroughIllegal
            } else {
                Boundary::FallsThroughAllowed
            }
        }
        CaseBody::Block(stmts) => {
            if can_complete_normally(stmts) {
                Boundary::FallsThroughAllowed
            } else {
                Boundary::NeedsBreakBoundary
            }
        }
    }
}

fn declares_bindings(label: &CaseLabel) -> bool {
    label.bindings().iter().any(|(name, _)| *name != "_")
}

/// Conservative reachability of the end of a statement list.
pub fn can_complete_normally(stmts: &[Stmt]) -> bool {
    stmts.last().map_or(true, stmt_completes_normally)
}

fn stmt_completes_normally(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } | Stmt::Throw { .. } | Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Yield { .. } => false,
        Stmt::Block(block) => can_complete_normally(&block.statements),
        Stmt::If { then_branch, else_branch: Some(else_branch), .. } => {
            stmt_completes_normally(then_branch) || stmt_completes_normally(else_branch)
        }
        Stmt::While { cond, body, .. } => !cond.is_true_literal() || breaks_out(body),
        _ => true,
    }
}

/// An unlabeled `break` that leaves the loop `stmt` belongs to.
fn breaks_out(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Break { .. } => true,
        Stmt::Block(block) => block.statements.iter().any(breaks_out),
        Stmt::If { then_branch, else_branch, .. } => {
            breaks_out(then_branch) || else_branch.as_deref().map_or(false, breaks_out)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(label: CaseLabel, stmts: Vec<Stmt>) -> SwitchCase {
        SwitchCase::block(label, stmts)
    }

    fn call() -> Stmt {
        Stmt::Expr { expr: Expr::int(1), span: Span::default() }
    }

    fn brk() -> Stmt {
        Stmt::Break { span: Span::default() }
    }

    fn run(cases: Vec<SwitchCase>) -> Vec<String> {
        let switch = SwitchConstruct::new(Expr::local("o", TypeRef::object()), cases, false, false);
        check_fall_through(&switch).into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn falling_into_a_pattern_is_illegal() {
        let msgs = run(vec![
            group(CaseLabel::of_type(TypeRef::class("java/lang/Integer"), "i"), vec![call()]),
            group(CaseLabel::of_type(TypeRef::string(), "s"), vec![call(), brk()]),
            group(CaseLabel::default_label(), vec![brk()]),
        ]);
        assert_eq!(msgs, vec![Message::FallThroughToPattern.to_string()]);
    }

    #[test]
    fn falling_out_of_an_empty_pattern_label_is_illegal() {
        let msgs = run(vec![
            group(CaseLabel::of_type(TypeRef::class("java/lang/Integer"), "i"), vec![]),
            group(CaseLabel::default_label(), vec![brk()]),
        ]);
        assert_eq!(msgs, vec![Message::FallThroughFromPattern.to_string()]);
    }

    #[test]
    fn breaks_and_plain_labels_are_fine() {
        let msgs = run(vec![
            group(CaseLabel::of_type(TypeRef::class("java/lang/Integer"), "i"), vec![call(), brk()]),
            group(CaseLabel::of_type(TypeRef::string(), "s"), vec![Stmt::Throw { expr: Expr::null(), span: Span::default() }]),
            group(CaseLabel::null_label(), vec![]),
            group(CaseLabel::default_label(), vec![call()]),
        ]);
        assert!(msgs.is_empty());
    }

    #[test]
    fn if_else_that_always_leaves() {
        let leave = Stmt::If {
            cond: Expr::local("b", TypeRef::boolean()),
            then_branch: Box::new(brk()),
            else_branch: Some(Box::new(Stmt::Return { value: None, span: Span::default() })),
            span: Span::default(),
        };
        assert!(!can_complete_normally(&[leave]));
        let infinite = Stmt::While { cond: Expr::boolean(true), body: Box::new(Stmt::Block(Block::new(vec![call()]))), span: Span::default() };
        assert!(!can_complete_normally(&[infinite]));
    }
}
