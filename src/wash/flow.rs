//! Flow facts for locals: effectively-final analysis.
//!
//! Locals are numbered in the order [`crate::ast::Visitor`] declares them, so
//! any later pass walking the same method with [`LocalScopes`] sees the same
//! [`LocalId`] for the same declaration.

use crate::ast::*;

pub type LocalId = usize;

/// Lexical scopes mapping names to declaration ids.
#[derive(Debug)]
pub struct LocalScopes {
    frames: Vec<Vec<(String, LocalId)>>,
    next: LocalId,
}

impl LocalScopes {
    pub fn new() -> Self {
        Self { frames: vec![Vec::new()], next: 0 }
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn declare(&mut self, name: &str) -> LocalId {
        let id = self.next;
        self.next += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name.to_string(), id));
        }
        id
    }

    pub fn lookup(&self, name: &str) -> Option<LocalId> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Every visible local, innermost declaration first for shadowed names.
    pub fn visible(&self) -> Vec<(String, LocalId)> {
        self.visible_in(&self.frames)
    }

    /// Visible locals excluding the innermost frame.
    pub fn visible_outside_innermost(&self) -> Vec<(String, LocalId)> {
        let outer = self.frames.len().saturating_sub(1);
        self.visible_in(&self.frames[..outer])
    }

    fn visible_in(&self, frames: &[Vec<(String, LocalId)>]) -> Vec<(String, LocalId)> {
        let mut out: Vec<(String, LocalId)> = Vec::new();
        for (name, id) in frames.iter().rev().flat_map(|f| f.iter().rev()) {
            if !out.iter().any(|(n, _)| n == name) {
                out.push((name.clone(), *id));
            }
        }
        out
    }
}

impl Default for LocalScopes {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct LocalFact {
    pub name: String,
    pub type_ref: TypeRef,
    pub kind: LocalKind,
    pub is_final: bool,
    /// Written while possibly already holding a value, or written from a
    /// loop or lambda nested deeper than the declaration.
    pub reassigned: bool,
    loop_depth: usize,
    lambda_depth: usize,
}

impl LocalFact {
    pub fn is_effectively_final(&self) -> bool {
        self.is_final || !self.reassigned
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowFacts {
    locals: Vec<LocalFact>,
}

impl FlowFacts {
    pub fn get(&self, id: LocalId) -> Option<&LocalFact> {
        self.locals.get(id)
    }

    pub fn is_effectively_final(&self, id: LocalId) -> bool {
        self.locals.get(id).map_or(true, LocalFact::is_effectively_final)
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

/// Where a `break`, `continue` or `yield` leaves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpTarget {
    Loop,
    SwitchStatement,
    SwitchExpression,
}

/// Per-local "possibly assigned" bits; the complement is definite unassignment.
type Assigned = Vec<bool>;

fn join(a: &[bool], b: &[bool]) -> Assigned {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(false) || b.get(i).copied().unwrap_or(false))
        .collect()
}

/// Tracks writes to every local of one method.
///
/// Alternatives (`if`/`else`, `?:`, switch cases) start from the same state
/// and are joined afterwards, so one write on each arm still counts as a
/// single assignment. A statement that cannot complete normally leaves every
/// local definitely unassigned, and jumps carry their state to the end of
/// their target.
pub struct Flow {
    scopes: LocalScopes,
    facts: FlowFacts,
    loop_depth: usize,
    lambda_depth: usize,
    assigned: Assigned,
    jumps: Vec<(JumpTarget, Assigned)>,
}

impl Flow {
    pub fn analyze_method(method: &MethodDecl) -> FlowFacts {
        let mut flow = Flow {
            scopes: LocalScopes::new(),
            facts: FlowFacts::default(),
            loop_depth: 0,
            lambda_depth: 0,
            assigned: Vec::new(),
            jumps: Vec::new(),
        };
        for param in &method.params {
            flow.declare(&param.name, &param.type_ref, LocalKind::Parameter, param.is_final);
        }
        if let Some(body) = &method.body {
            walk_block(&mut flow, body);
        }
        log::trace!("flow: {} locals in {}", flow.facts.len(), method.name);
        flow.facts
    }

    fn declare(&mut self, name: &str, ty: &TypeRef, kind: LocalKind, is_final: bool) {
        let id = self.scopes.declare(name);
        self.facts.locals.push(LocalFact {
            name: name.to_string(),
            type_ref: ty.clone(),
            kind,
            is_final,
            reassigned: false,
            loop_depth: self.loop_depth,
            lambda_depth: self.lambda_depth,
        });
        if self.assigned.len() <= id {
            self.assigned.resize(id + 1, false);
        }
        self.assigned[id] = kind != LocalKind::Declared { initialized: false };
    }

    /// `compound` is set for `++`/`--`, which read the old value.
    fn record_write(&mut self, name: &str, compound: bool) {
        let id = match self.scopes.lookup(name) {
            Some(id) => id,
            None => return,
        };
        let maybe_assigned = self.assigned.get(id).copied().unwrap_or(true);
        let (loop_depth, lambda_depth) = (self.loop_depth, self.lambda_depth);
        if let Some(fact) = self.facts.locals.get_mut(id) {
            let first_write = fact.kind == LocalKind::Declared { initialized: false }
                && !compound
                && !maybe_assigned
                && loop_depth == fact.loop_depth
                && lambda_depth == fact.lambda_depth;
            if !first_write {
                fact.reassigned = true;
            }
        }
        if let Some(bit) = self.assigned.get_mut(id) {
            *bit = true;
        }
    }

    /// The current point cannot complete normally.
    fn kill(&mut self) {
        self.assigned.iter_mut().for_each(|bit| *bit = false);
    }

    fn jump(&mut self, matches: impl Fn(JumpTarget) -> bool) {
        if let Some((_, state)) = self.jumps.iter_mut().rev().find(|(target, _)| matches(*target)) {
            *state = join(state, &self.assigned);
        }
        self.kill();
    }

    fn walk_while(&mut self, cond: &Expr, body: &Stmt) {
        self.jumps.push((JumpTarget::Loop, Vec::new()));
        self.loop_depth += 1;
        self.visit_expr(cond);
        let exit = self.assigned.clone();
        self.visit_stmt(body);
        self.loop_depth -= 1;
        let jumped = self.jumps.pop().map(|(_, state)| state).unwrap_or_default();
        self.assigned = join(&join(&exit, &self.assigned), &jumped);
    }

    fn walk_if(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
        self.visit_expr(cond);
        let before = self.assigned.clone();
        self.visit_stmt(then_branch);
        let after_then = std::mem::replace(&mut self.assigned, before);
        if let Some(else_branch) = else_branch {
            self.visit_stmt(else_branch);
        }
        self.assigned = join(&after_then, &self.assigned);
    }
}

impl Visitor for Flow {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::LocalVar { name, type_ref, init, is_final, .. } => {
                if let Some(init) = init {
                    self.visit_expr(init);
                }
                let kind = LocalKind::Declared { initialized: init.is_some() };
                self.declare(name, type_ref, kind, *is_final);
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.walk_if(cond, then_branch, else_branch.as_deref())
            }
            Stmt::While { cond, body, .. } => self.walk_while(cond, body),
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
                self.kill();
            }
            Stmt::Throw { expr, .. } => {
                self.visit_expr(expr);
                self.kill();
            }
            Stmt::Yield { value, .. } => {
                self.visit_expr(value);
                self.jump(|t| t == JumpTarget::SwitchExpression);
            }
            Stmt::Break { .. } => self.jump(|t| t != JumpTarget::SwitchExpression),
            Stmt::Continue { .. } => self.jump(|t| t == JumpTarget::Loop),
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Assign { target, value } => {
                match &target.kind {
                    ExprKind::Local(_) => {}
                    _ => self.visit_expr(target),
                }
                self.visit_expr(value);
                if let ExprKind::Local(name) = &target.kind {
                    self.record_write(name, false);
                }
            }
            ExprKind::Increment { name, .. } => self.record_write(name, true),
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                self.visit_expr(cond);
                let before = self.assigned.clone();
                self.visit_expr(then_expr);
                let after_then = std::mem::replace(&mut self.assigned, before);
                self.visit_expr(else_expr);
                self.assigned = join(&after_then, &self.assigned);
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_switch(&mut self, switch: &SwitchConstruct) {
        self.visit_expr(&switch.selector);
        let start = self.assigned.clone();
        let target = if switch.is_expression { JumpTarget::SwitchExpression } else { JumpTarget::SwitchStatement };
        self.jumps.push((target, Vec::new()));
        let mut end = start.clone();
        let mut fallthrough: Option<Assigned> = None;
        for case in &switch.cases {
            self.assigned = match fallthrough.take() {
                Some(previous) => join(&start, &previous),
                None => start.clone(),
            };
            self.scopes.push();
            for (name, ty) in case.label.bindings() {
                self.declare(name, ty, LocalKind::Binding, false);
            }
            if let Some(guard) = &case.label.guard {
                self.visit_guard(guard);
            }
            match &case.body {
                CaseBody::Expr(expr) => self.visit_expr(expr),
                CaseBody::Block(stmts) => {
                    for stmt in stmts {
                        self.visit_stmt(stmt);
                    }
                }
            }
            self.scopes.pop();
            if switch.uses_arrows {
                end = join(&end, &self.assigned);
            } else {
                fallthrough = Some(self.assigned.clone());
            }
        }
        if let Some(last) = fallthrough {
            end = join(&end, &last);
        }
        let jumped = self.jumps.pop().map(|(_, state)| state).unwrap_or_default();
        self.assigned = join(&end, &jumped);
    }

    fn visit_lambda(&mut self, lambda: &LambdaExpr) {
        // the body runs later, so nothing it assigns reaches the code after it
        let saved = self.assigned.clone();
        self.lambda_depth += 1;
        walk_lambda(self, lambda);
        self.lambda_depth -= 1;
        self.assigned = saved;
    }

    fn enter_scope(&mut self) {
        self.scopes.push();
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn enter_loop(&mut self) {
        self.loop_depth += 1;
    }

    fn exit_loop(&mut self) {
        self.loop_depth -= 1;
    }

    fn declare_local(&mut self, name: &str, ty: &TypeRef, kind: LocalKind) {
        self.declare(name, ty, kind, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, init: Option<Expr>) -> Stmt {
        Stmt::LocalVar { name: name.into(), type_ref: TypeRef::int(), init, is_final: false, span: Span::default() }
    }

    fn assign(name: &str, value: i32) -> Stmt {
        let target = Expr::local(name, TypeRef::int());
        let expr = Expr::new(
            ExprKind::Assign { target: Box::new(target), value: Box::new(Expr::int(value)) },
            TypeRef::int(),
            Span::default(),
        );
        Stmt::Expr { expr, span: Span::default() }
    }

    fn method(stmts: Vec<Stmt>) -> MethodDecl {
        MethodDecl::new("m", vec![Parameter::new("p", TypeRef::int())], TypeRef::void(), Some(Block::new(stmts)))
    }

    fn final_by_name(facts: &FlowFacts, name: &str) -> bool {
        (0..facts.len())
            .filter_map(|id| facts.get(id))
            .find(|f| f.name == name)
            .map(LocalFact::is_effectively_final)
            .unwrap()
    }

    #[test]
    fn reassigned_locals_are_not_effectively_final() {
        let facts = Flow::analyze_method(&method(vec![
            local("a", Some(Expr::int(1))),
            local("b", Some(Expr::int(1))),
            assign("b", 2),
            local("c", None),
            assign("c", 3),
            assign("p", 4),
        ]));
        assert!(final_by_name(&facts, "a"));
        assert!(!final_by_name(&facts, "b"));
        assert!(final_by_name(&facts, "c"));
        assert!(!final_by_name(&facts, "p"));
    }

    #[test]
    fn writes_in_loops_and_increments() {
        let incr = Stmt::Expr {
            expr: Expr::new(ExprKind::Increment { name: "i".into(), delta: 1, prefix: false }, TypeRef::int(), Span::default()),
            span: Span::default(),
        };
        let facts = Flow::analyze_method(&method(vec![
            local("i", Some(Expr::int(0))),
            local("late", None),
            Stmt::While {
                cond: Expr::local("b", TypeRef::boolean()),
                body: Box::new(Stmt::Block(Block::new(vec![incr, assign("late", 1)]))),
                span: Span::default(),
            },
        ]));
        assert!(!final_by_name(&facts, "i"));
        assert!(!final_by_name(&facts, "late"));
    }

    fn flag() -> Expr {
        Expr::local("b", TypeRef::boolean())
    }

    fn if_else(then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
        Stmt::If {
            cond: flag(),
            then_branch: Box::new(Stmt::Block(Block::new(then_branch))),
            else_branch: else_branch.map(|stmts| Box::new(Stmt::Block(Block::new(stmts)))),
            span: Span::default(),
        }
    }

    #[test]
    fn one_write_on_each_arm_is_a_single_assignment() {
        // int x; if (b) x = 1; else x = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("x", None),
            if_else(vec![assign("x", 1)], Some(vec![assign("x", 2)])),
        ]));
        assert!(final_by_name(&facts, "x"));

        // int y; if (b) y = 1; y = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("y", None),
            if_else(vec![assign("y", 1)], None),
            assign("y", 2),
        ]));
        assert!(!final_by_name(&facts, "y"));
    }

    #[test]
    fn abrupt_branch_leaves_local_unassigned() {
        // int x; if (b) { x = 1; return; } x = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("x", None),
            if_else(vec![assign("x", 1), Stmt::Return { value: None, span: Span::default() }], None),
            assign("x", 2),
        ]));
        assert!(final_by_name(&facts, "x"));
    }

    #[test]
    fn conditional_arms_are_joined() {
        // int x; int r = b ? (x = 1) : (x = 2);
        let write = |value| {
            Expr::new(
                ExprKind::Assign { target: Box::new(Expr::local("x", TypeRef::int())), value: Box::new(Expr::int(value)) },
                TypeRef::int(),
                Span::default(),
            )
        };
        let conditional = Expr::new(
            ExprKind::Conditional { cond: Box::new(flag()), then_expr: Box::new(write(1)), else_expr: Box::new(write(2)) },
            TypeRef::int(),
            Span::default(),
        );
        let facts = Flow::analyze_method(&method(vec![local("x", None), local("r", Some(conditional))]));
        assert!(final_by_name(&facts, "x"));
    }

    #[test]
    fn switch_cases_are_alternatives_unless_they_fall_through() {
        let case = |value, body| SwitchCase::block(CaseLabel::of_constants(vec![CaseConstant::Int(value)]), body);
        let brk = || Stmt::Break { span: Span::default() };
        let switch = |cases, arrows| {
            Stmt::Switch(Box::new(SwitchConstruct::new(Expr::local("p", TypeRef::int()), cases, false, arrows)))
        };

        // case 1 -> x = 1; case 2 -> x = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("x", None),
            switch(vec![case(1, vec![assign("x", 1)]), case(2, vec![assign("x", 2)])], true),
        ]));
        assert!(final_by_name(&facts, "x"));

        // case 1: x = 1; break; case 2: x = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("x", None),
            switch(vec![case(1, vec![assign("x", 1), brk()]), case(2, vec![assign("x", 2)])], false),
        ]));
        assert!(final_by_name(&facts, "x"));

        // case 1: x = 1; case 2: x = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("x", None),
            switch(vec![case(1, vec![assign("x", 1)]), case(2, vec![assign("x", 2)])], false),
        ]));
        assert!(!final_by_name(&facts, "x"));

        // case 1: x = 1; break; default: } x = 2;
        let facts = Flow::analyze_method(&method(vec![
            local("x", None),
            switch(
                vec![case(1, vec![assign("x", 1), brk()]), SwitchCase::block(CaseLabel::default_label(), vec![])],
                false,
            ),
            assign("x", 2),
        ]));
        assert!(!final_by_name(&facts, "x"));
    }

    #[test]
    fn scopes_resolve_innermost_first() {
        let mut scopes = LocalScopes::new();
        let outer = scopes.declare("x");
        scopes.push();
        let inner = scopes.declare("x");
        assert_eq!(scopes.lookup("x"), Some(inner));
        assert_eq!(scopes.visible_outside_innermost(), vec![("x".to_string(), outer)]);
        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(outer));
    }
}
