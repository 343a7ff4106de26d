//! Semantic checks over method bodies.
//!
//! For every method the analyzer first runs [`flow::Flow`] to learn which
//! locals are effectively final, then walks the body again:
//!
//! - every switch goes through [`crate::review::review_switch`]
//! - every case guard and lambda body goes through [`capture::LambdaCaptureAnalyzer`]
//!
//! Diagnostics are collected per method so the class generator can decide
//! which methods become problem methods.

pub mod capture;
pub mod flow;

use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Diagnostics};
use crate::common::hierarchy::TypeHierarchyOracle;
use crate::config::Config;
use crate::review::review_switch;

use capture::{EnclosingScope, LambdaCaptureAnalyzer, VisibleLocal};
use flow::{Flow, FlowFacts, LocalId, LocalScopes};

#[derive(Debug, Clone)]
pub struct MethodAnalysis {
    pub name: String,
    pub descriptor: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl MethodAnalysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

#[derive(Debug, Clone)]
pub struct ClassAnalysis {
    pub class_name: String,
    pub methods: Vec<MethodAnalysis>,
}

impl ClassAnalysis {
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodAnalysis> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn has_errors(&self) -> bool {
        self.methods.iter().any(MethodAnalysis::has_errors)
    }

    /// All diagnostics of the class in source order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut sink = Diagnostics::new();
        for m in &self.methods {
            sink.extend(m.diagnostics.iter().cloned());
        }
        sink.into_sorted()
    }
}

pub struct SemanticAnalyzer<'a> {
    oracle: &'a TypeHierarchyOracle,
    config: &'a Config,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(oracle: &'a TypeHierarchyOracle, config: &'a Config) -> Self {
        Self { oracle, config }
    }

    pub fn analyze_class(&self, class: &ClassDecl) -> ClassAnalysis {
        log::debug!("wash: analyzing {} ({} methods)", class.name, class.methods.len());
        let methods = class.methods.iter().map(|m| self.analyze_method(m)).collect();
        ClassAnalysis { class_name: class.name.clone(), methods }
    }

    pub fn analyze_method(&self, method: &MethodDecl) -> MethodAnalysis {
        let facts = Flow::analyze_method(method);
        let mut walker = MethodWalker {
            oracle: self.oracle,
            config: self.config,
            facts: &facts,
            scopes: LocalScopes::new(),
            types: Vec::new(),
            is_static: method.is_static(),
            diagnostics: Diagnostics::new(),
        };
        for param in &method.params {
            walker.declare_local(&param.name, &param.type_ref, LocalKind::Parameter);
        }
        if let Some(body) = &method.body {
            walk_block(&mut walker, body);
        }
        let diagnostics = walker.diagnostics.into_sorted();
        if !diagnostics.is_empty() {
            log::debug!("wash: {} diagnostics in {}", diagnostics.len(), method.name);
        }
        MethodAnalysis {
            name: method.name.clone(),
            descriptor: crate::codegen::descriptor::method_descriptor_of(method),
            diagnostics,
        }
    }
}

struct MethodWalker<'a> {
    oracle: &'a TypeHierarchyOracle,
    config: &'a Config,
    facts: &'a FlowFacts,
    scopes: LocalScopes,
    /// Declared type per local id.
    types: Vec<TypeRef>,
    is_static: bool,
    diagnostics: Diagnostics,
}

impl MethodWalker<'_> {
    fn scope_of(&self, visible: Vec<(String, LocalId)>) -> EnclosingScope {
        let locals = visible
            .into_iter()
            .map(|(name, id)| VisibleLocal {
                id,
                type_ref: self.types.get(id).cloned().unwrap_or_else(TypeRef::object),
                effectively_final: self.facts.is_effectively_final(id),
                name,
            })
            .collect();
        EnclosingScope::new(locals, self.is_static)
    }
}

impl Visitor for MethodWalker<'_> {
    fn visit_switch(&mut self, switch: &SwitchConstruct) {
        let review = review_switch(switch, self.oracle, self.config);
        self.diagnostics.extend(review.diagnostics);
        walk_switch(self, switch)
    }

    fn visit_guard(&mut self, guard: &Expr) {
        let scope = self.scope_of(self.scopes.visible_outside_innermost());
        let analysis = LambdaCaptureAnalyzer::analyze_guard(guard, &scope);
        self.diagnostics.extend(analysis.diagnostics);
        self.visit_expr(guard)
    }

    fn visit_lambda(&mut self, lambda: &LambdaExpr) {
        let scope = self.scope_of(self.scopes.visible());
        let analysis = LambdaCaptureAnalyzer::analyze(lambda, &scope);
        log::trace!(
            "wash: lambda at {} captures_instance={} locals={:?}",
            lambda.span,
            analysis.env.captures_instance,
            analysis.env.captured_locals
        );
        self.diagnostics.extend(analysis.diagnostics);
        walk_lambda(self, lambda)
    }

    fn enter_scope(&mut self) {
        self.scopes.push();
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_local(&mut self, name: &str, ty: &TypeRef, _kind: LocalKind) {
        let id = self.scopes.declare(name);
        if self.types.len() <= id {
            self.types.resize(id + 1, TypeRef::object());
        }
        self.types[id] = ty.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::hierarchy::TypeInfo;

    fn local_var(name: &str, init: Expr) -> Stmt {
        Stmt::LocalVar { name: name.into(), type_ref: TypeRef::int(), init: Some(init), is_final: false, span: Span::default() }
    }

    #[test]
    fn mutated_local_in_guard_is_reported() {
        let oracle = TypeHierarchyOracle::builder().register(TypeInfo::class("Foo")).build();
        let config = Config::default();
        let guard = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Gt,
                left: Box::new(Expr::local("limit", TypeRef::int())),
                right: Box::new(Expr::int(0)),
            },
            TypeRef::boolean(),
            Span::line(4),
        );
        let switch = SwitchConstruct::new(
            Expr::local("o", TypeRef::object()),
            vec![
                SwitchCase::block(CaseLabel::of_type(TypeRef::class("Foo"), "f").when(guard), vec![]),
                SwitchCase::block(CaseLabel::default_label(), vec![]),
            ],
            false,
            true,
        );
        let bump = Stmt::Expr {
            expr: Expr::new(ExprKind::Increment { name: "limit".into(), delta: 1, prefix: false }, TypeRef::int(), Span::line(5)),
            span: Span::line(5),
        };
        let body = Block::new(vec![local_var("limit", Expr::int(3)), Stmt::Switch(Box::new(switch)), bump]);
        let method = MethodDecl::new("m", vec![Parameter::new("o", TypeRef::object())], TypeRef::void(), Some(body));

        let analysis = SemanticAnalyzer::new(&oracle, &config).analyze_method(&method);
        assert!(analysis.has_errors());
        assert_eq!(
            analysis.diagnostics[0].message,
            "Local variable limit referenced from a guard must be final or effectively final"
        );
        assert_eq!(analysis.descriptor, "(Ljava/lang/Object;)V");
    }

    #[test]
    fn local_assigned_once_on_each_branch_can_be_captured() {
        // int x; if (b) x = 1; else x = 2; IntSupplier r = () -> x;
        let oracle = TypeHierarchyOracle::with_builtins();
        let config = Config::default();
        let int_local = |name: &str| Expr::local(name, TypeRef::int());
        let assign = |value| Stmt::Expr {
            expr: Expr::new(
                ExprKind::Assign { target: Box::new(int_local("x")), value: Box::new(Expr::int(value)) },
                TypeRef::int(),
                Span::line(3),
            ),
            span: Span::line(3),
        };
        let supplier = TypeRef::class("java/util/function/IntSupplier");
        let lambda = LambdaExpr {
            params: vec![],
            body: LambdaBody::Expr(Box::new(int_local("x"))),
            target: FunctionalTarget::new(supplier.clone()),
            return_type: TypeRef::int(),
            span: Span::line(4),
        };
        let body = Block::new(vec![
            Stmt::LocalVar { name: "x".into(), type_ref: TypeRef::int(), init: None, is_final: false, span: Span::line(2) },
            Stmt::If {
                cond: Expr::local("b", TypeRef::boolean()),
                then_branch: Box::new(assign(1)),
                else_branch: Some(Box::new(assign(2))),
                span: Span::line(3),
            },
            Stmt::LocalVar {
                name: "r".into(),
                type_ref: supplier.clone(),
                init: Some(Expr::new(ExprKind::Lambda(Box::new(lambda)), supplier, Span::line(4))),
                is_final: false,
                span: Span::line(4),
            },
        ]);
        let method = MethodDecl::new("m", vec![Parameter::new("b", TypeRef::boolean())], TypeRef::void(), Some(body));

        let analysis = SemanticAnalyzer::new(&oracle, &config).analyze_method(&method);
        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
    }
}
