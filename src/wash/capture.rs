//! Capture analysis for lambda bodies and case guards.

use std::collections::{BTreeSet, HashSet};

use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Message};
use crate::wash::flow::LocalId;

/// A local of the enclosing method that the analyzed code may refer to.
#[derive(Debug, Clone)]
pub struct VisibleLocal {
    pub id: LocalId,
    pub name: String,
    pub type_ref: TypeRef,
    pub effectively_final: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnclosingScope {
    pub locals: Vec<VisibleLocal>,
    /// Inside a static method or initializer; `this` is unavailable.
    pub is_static: bool,
}

impl EnclosingScope {
    pub fn new(locals: Vec<VisibleLocal>, is_static: bool) -> Self {
        Self { locals, is_static }
    }

    fn lookup(&self, name: &str) -> Option<&VisibleLocal> {
        self.locals.iter().find(|l| l.name == name)
    }
}

/// What a lambda body needs from its surroundings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedEnvironment {
    pub captures_instance: bool,
    /// In first-reference order; becomes the leading parameters of the body method.
    pub captured_locals: Vec<(String, TypeRef)>,
    pub captured_type_vars: BTreeSet<String>,
}

impl CapturedEnvironment {
    pub fn is_capture_free(&self) -> bool {
        !self.captures_instance && self.captured_locals.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureAnalysis {
    pub env: CapturedEnvironment,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct LambdaCaptureAnalyzer;

impl LambdaCaptureAnalyzer {
    pub fn analyze(lambda: &LambdaExpr, scope: &EnclosingScope) -> CaptureAnalysis {
        let mut walker = CaptureWalker::new(scope, Message::LambdaCaptureNotFinal);
        walk_lambda(&mut walker, lambda);
        for p in &lambda.params {
            p.type_ref.collect_type_vars(&mut walker.type_vars);
        }
        lambda.return_type.collect_type_vars(&mut walker.type_vars);
        walker.finish()
    }

    /// Guards see the label's own pattern variables; only outer locals count as captured.
    pub fn analyze_guard(guard: &Expr, scope: &EnclosingScope) -> CaptureAnalysis {
        let mut walker = CaptureWalker::new(scope, Message::GuardCaptureNotFinal);
        walker.visit_expr(guard);
        walker.finish()
    }
}

struct CaptureWalker<'s> {
    scope: &'s EnclosingScope,
    inner: Vec<Vec<String>>,
    message: fn(String) -> Message,
    env: CapturedEnvironment,
    type_vars: Vec<String>,
    reported: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> CaptureWalker<'s> {
    fn new(scope: &'s EnclosingScope, message: fn(String) -> Message) -> Self {
        Self {
            scope,
            inner: vec![Vec::new()],
            message,
            env: CapturedEnvironment::default(),
            type_vars: Vec::new(),
            reported: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    fn is_inner(&self, name: &str) -> bool {
        self.inner.iter().any(|frame| frame.iter().any(|n| n == name))
    }

    fn reference(&mut self, name: &str, span: Span) {
        if self.is_inner(name) {
            return;
        }
        let local = match self.scope.lookup(name) {
            Some(local) => local,
            None => return,
        };
        if !self.env.captured_locals.iter().any(|(n, _)| n == name) {
            self.env.captured_locals.push((name.to_string(), local.type_ref.clone()));
        }
        if !local.effectively_final && self.reported.insert(name.to_string()) {
            self.diagnostics.push(Diagnostic::error(span, (self.message)(name.to_string())));
        }
    }

    fn finish(self) -> CaptureAnalysis {
        let mut env = self.env;
        env.captured_type_vars = self.type_vars.into_iter().collect();
        CaptureAnalysis { env, diagnostics: self.diagnostics }
    }
}

impl Visitor for CaptureWalker<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::LocalVar { type_ref, .. } = stmt {
            type_ref.collect_type_vars(&mut self.type_vars);
        }
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &Expr) {
        expr.ty.collect_type_vars(&mut self.type_vars);
        match &expr.kind {
            ExprKind::This => self.env.captures_instance = true,
            ExprKind::Field { target: None, is_static: false, .. } => self.env.captures_instance = true,
            ExprKind::MethodCall { target: None, invoke, .. } if *invoke != InvokeKind::Static => {
                self.env.captures_instance = true
            }
            ExprKind::Local(name) | ExprKind::Increment { name, .. } => self.reference(name, expr.span),
            ExprKind::InstanceOf { target, .. } | ExprKind::Cast { target, .. } => {
                target.collect_type_vars(&mut self.type_vars)
            }
            _ => {}
        }
        walk_expr(self, expr)
    }

    fn enter_scope(&mut self) {
        self.inner.push(Vec::new());
    }

    fn exit_scope(&mut self) {
        self.inner.pop();
    }

    fn declare_local(&mut self, name: &str, _ty: &TypeRef, _kind: LocalKind) {
        if let Some(frame) = self.inner.last_mut() {
            frame.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(locals: &[(&str, bool)]) -> EnclosingScope {
        EnclosingScope::new(
            locals
                .iter()
                .enumerate()
                .map(|(id, (name, ef))| VisibleLocal {
                    id,
                    name: name.to_string(),
                    type_ref: TypeRef::string(),
                    effectively_final: *ef,
                })
                .collect(),
            false,
        )
    }

    fn lambda(params: Vec<Parameter>, body: Expr) -> LambdaExpr {
        LambdaExpr {
            params,
            body: LambdaBody::Expr(Box::new(body)),
            target: FunctionalTarget::new(TypeRef::class("java/util/function/Function")),
            return_type: TypeRef::object(),
            span: Span::default(),
        }
    }

    fn concat(a: Expr, b: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary { op: BinaryOp::Add, left: Box::new(a), right: Box::new(b) },
            TypeRef::string(),
            Span::default(),
        )
    }

    #[test]
    fn own_parameters_only_is_capture_free() {
        let l = lambda(vec![Parameter::new("s", TypeRef::string())], Expr::local("s", TypeRef::string()));
        let analysis = LambdaCaptureAnalyzer::analyze(&l, &scope(&[("s2", true)]));
        assert!(analysis.env.is_capture_free());
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn locals_captured_in_first_reference_order() {
        let body = concat(
            Expr::local("b", TypeRef::string()),
            concat(Expr::local("a", TypeRef::string()), Expr::local("b", TypeRef::string())),
        );
        let l = lambda(vec![], body);
        let analysis = LambdaCaptureAnalyzer::analyze(&l, &scope(&[("a", true), ("b", true)]));
        let names: Vec<&str> = analysis.env.captured_locals.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(!analysis.env.captures_instance);
    }

    #[test]
    fn unqualified_instance_members_capture_this() {
        let field = Expr::new(
            ExprKind::Field { target: None, owner: "C".into(), name: "f".into(), is_static: false },
            TypeRef::string(),
            Span::default(),
        );
        let analysis = LambdaCaptureAnalyzer::analyze(&lambda(vec![], field), &scope(&[]));
        assert!(analysis.env.captures_instance);

        let static_field = Expr::new(
            ExprKind::Field { target: None, owner: "C".into(), name: "F".into(), is_static: true },
            TypeRef::string(),
            Span::default(),
        );
        let analysis = LambdaCaptureAnalyzer::analyze(&lambda(vec![], static_field), &scope(&[]));
        assert!(!analysis.env.captures_instance);
    }

    #[test]
    fn mutated_local_is_reported_once() {
        let body = concat(Expr::local("x", TypeRef::string()), Expr::local("x", TypeRef::string()));
        let analysis = LambdaCaptureAnalyzer::analyze(&lambda(vec![], body.clone()), &scope(&[("x", false)]));
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(
            analysis.diagnostics[0].message,
            "Local variable x defined in an enclosing scope must be final or effectively final"
        );

        let guard = LambdaCaptureAnalyzer::analyze_guard(&body, &scope(&[("x", false)]));
        assert_eq!(guard.diagnostics[0].message, "Local variable x referenced from a guard must be final or effectively final");
    }

    #[test]
    fn type_variables_do_not_force_instance_capture() {
        let t = TypeRef::type_var("T");
        let l = lambda(vec![Parameter::new("t", t.clone())], Expr::local("t", t));
        let analysis = LambdaCaptureAnalyzer::analyze(&l, &scope(&[]));
        assert!(analysis.env.is_capture_free());
        assert!(analysis.env.captured_type_vars.contains("T"));
    }
}
