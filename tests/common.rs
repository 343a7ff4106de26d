// Common test utilities
#![allow(dead_code)]

use jpatc::ast::*;
use jpatc::codegen::attribute::CodeAttribute;
use jpatc::codegen::opcodes::instructions;
use jpatc::common::hierarchy::{RecordComponent, TypeInfo};
use jpatc::{Compilation, TypeHierarchyOracle};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `sealed interface Shape permits Circle, Square`, an enum `Color` and `record Point(int x, int y)`.
pub fn oracle_with(decls: &[&ClassDecl]) -> TypeHierarchyOracle {
    let mut builder = TypeHierarchyOracle::builder()
        .register(TypeInfo::interface("p/Shape").sealed(&["p/Circle", "p/Square"]))
        .register(TypeInfo::class("p/Circle").final_().implements("p/Shape"))
        .register(TypeInfo::class("p/Square").final_().implements("p/Shape"))
        .register(TypeInfo::enumeration("p/Color", &["RED", "GREEN", "BLUE"]))
        .register(TypeInfo::record(
            "p/Point",
            vec![
                RecordComponent { name: "x".into(), type_ref: TypeRef::int() },
                RecordComponent { name: "y".into(), type_ref: TypeRef::int() },
            ],
        ));
    for decl in decls {
        builder = builder.register_decl(decl);
    }
    builder.build()
}

pub fn line(n: usize) -> Span {
    Span::line(n)
}

pub fn static_method(name: &str, params: Vec<Parameter>, ret: TypeRef, body: Vec<Stmt>) -> MethodDecl {
    let mut m = MethodDecl::new(name, params, ret, Some(Block::new(body)));
    m.modifiers.push(Modifier::Static);
    m.span = line(1);
    m
}

pub fn class_with(name: &str, methods: Vec<MethodDecl>) -> ClassDecl {
    let mut class = ClassDecl::new(name, ClassKind::Class);
    class.methods = methods;
    class
}

pub fn return_switch(switch: SwitchConstruct, ty: TypeRef, at: usize) -> Stmt {
    let span = line(at);
    Stmt::Return { value: Some(Expr::new(ExprKind::Switch(Box::new(switch)), ty, span)), span }
}

/// `return switch (v) { case Circle c -> 1; case Square s -> 2; }`
pub fn shape_switch(at: usize) -> SwitchConstruct {
    SwitchConstruct::expression(
        Expr::local("v", TypeRef::class("p/Shape")),
        vec![
            SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("p/Circle"), "c").at(line(at + 1)), Expr::int(1)),
            SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("p/Square"), "s").at(line(at + 2)), Expr::int(2)),
        ],
        TypeRef::int(),
    )
    .at(line(at))
}

pub fn code_of(compilation: &Compilation, method: &str) -> Vec<u8> {
    let cf = &compilation.class_file;
    let method = cf.find_method(method).expect("method present");
    let code = method.attribute(&cf.constant_pool, "Code").expect("Code attribute");
    CodeAttribute::parse(&code.info).expect("well-formed Code").2.to_vec()
}

pub fn count_op(code: &[u8], op: u8) -> usize {
    instructions(code).into_iter().filter(|(_, o)| *o == op).count()
}

/// Every string constant of the class.
pub fn strings(compilation: &Compilation) -> Vec<String> {
    let cp = &compilation.class_file.constant_pool;
    cp.entries()
        .filter_map(|(_, c)| match c {
            jpatc::codegen::Constant::String(utf8) => cp.utf8(*utf8).ok().map(str::to_string),
            _ => None,
        })
        .collect()
}
