//! Read-only traversal over statements and expressions.
//!
//! Every pass that tracks locals (flow, capture analysis, the semantic driver)
//! walks through these functions, so local declarations are reported in the
//! same order everywhere.

use super::*;

/// How a local came into scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Parameter,
    Declared { initialized: bool },
    Binding,
}

pub trait Visitor: Sized {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr)
    }

    fn visit_switch(&mut self, switch: &SwitchConstruct) {
        walk_switch(self, switch)
    }

    fn visit_lambda(&mut self, lambda: &LambdaExpr) {
        walk_lambda(self, lambda)
    }

    fn visit_guard(&mut self, guard: &Expr) {
        self.visit_expr(guard)
    }

    fn enter_scope(&mut self) {}

    fn exit_scope(&mut self) {}

    fn enter_loop(&mut self) {}

    fn exit_loop(&mut self) {}

    fn declare_local(&mut self, _name: &str, _ty: &TypeRef, _kind: LocalKind) {}
}

pub fn walk_block<V: Visitor>(v: &mut V, block: &Block) {
    v.enter_scope();
    for stmt in &block.statements {
        v.visit_stmt(stmt);
    }
    v.exit_scope();
}

pub fn walk_stmt<V: Visitor>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Expr { expr, .. } => v.visit_expr(expr),
        Stmt::LocalVar { name, type_ref, init, .. } => {
            if let Some(init) = init {
                v.visit_expr(init);
            }
            v.declare_local(name, type_ref, LocalKind::Declared { initialized: init.is_some() });
        }
        Stmt::Block(block) => walk_block(v, block),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            v.visit_expr(cond);
            v.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                v.visit_stmt(else_branch);
            }
        }
        Stmt::While { cond, body, .. } => {
            v.enter_loop();
            v.visit_expr(cond);
            v.visit_stmt(body);
            v.exit_loop();
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        Stmt::Yield { value, .. } => v.visit_expr(value),
        Stmt::Throw { expr, .. } => v.visit_expr(expr),
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
        Stmt::Switch(switch) => v.visit_switch(switch),
    }
}

pub fn walk_expr<V: Visitor>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Local(_) | ExprKind::This | ExprKind::Increment { .. } => {}
        ExprKind::Field { target, .. } => {
            if let Some(target) = target {
                v.visit_expr(target);
            }
        }
        ExprKind::MethodCall { target, args, .. } => {
            if let Some(target) = target {
                v.visit_expr(target);
            }
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::New { args, .. } => {
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::Assign { target, value } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        ExprKind::InstanceOf { expr: inner, target, binding } => {
            v.visit_expr(inner);
            if let Some(binding) = binding {
                v.declare_local(binding, target, LocalKind::Binding);
            }
        }
        ExprKind::Cast { expr: inner, .. } => v.visit_expr(inner),
        ExprKind::Conditional { cond, then_expr, else_expr } => {
            v.visit_expr(cond);
            v.visit_expr(then_expr);
            v.visit_expr(else_expr);
        }
        ExprKind::Lambda(lambda) => v.visit_lambda(lambda),
        ExprKind::MethodRef(method_ref) => {
            if let MethodRefKind::Bound(receiver) = &method_ref.kind {
                v.visit_expr(receiver);
            }
        }
        ExprKind::Switch(switch) => v.visit_switch(switch),
    }
}

pub fn walk_switch<V: Visitor>(v: &mut V, switch: &SwitchConstruct) {
    v.visit_expr(&switch.selector);
    for case in &switch.cases {
        v.enter_scope();
        for (name, ty) in case.label.bindings() {
            v.declare_local(name, ty, LocalKind::Binding);
        }
        if let Some(guard) = &case.label.guard {
            v.visit_guard(guard);
        }
        match &case.body {
            CaseBody::Expr(expr) => v.visit_expr(expr),
            CaseBody::Block(stmts) => {
                for stmt in stmts {
                    v.visit_stmt(stmt);
                }
            }
        }
        v.exit_scope();
    }
}

pub fn walk_lambda<V: Visitor>(v: &mut V, lambda: &LambdaExpr) {
    v.enter_scope();
    for param in &lambda.params {
        v.declare_local(&param.name, &param.type_ref, LocalKind::Parameter);
    }
    match &lambda.body {
        LambdaBody::Expr(expr) => v.visit_expr(expr),
        LambdaBody::Block(block) => walk_block(v, block),
    }
    v.exit_scope();
}
