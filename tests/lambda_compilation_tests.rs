mod common;

use common::*;
use jpatc::ast::*;
use jpatc::codegen::defs::access_flags::*;
use jpatc::codegen::opcodes::*;
use jpatc::common::diagnostics::Message;
use jpatc::config::LambdaNaming;
use jpatc::{compile_class, Config};

fn supplier() -> TypeRef {
    TypeRef::class("java/util/function/IntSupplier")
}

fn lambda_returning(value: Expr, target: FunctionalTarget, at: usize) -> Expr {
    let lambda = LambdaExpr {
        params: vec![],
        body: LambdaBody::Expr(Box::new(value)),
        target,
        return_type: TypeRef::int(),
        span: line(at),
    };
    Expr::new(ExprKind::Lambda(Box::new(lambda)), supplier(), line(at))
}

fn returning(expr: Expr) -> Stmt {
    let span = expr.span;
    Stmt::Return { value: Some(expr), span }
}

#[test]
fn capturing_lambda_passes_locals_to_lifted_method() {
    init_logging();
    // static IntSupplier make(int n) { return () -> n; }
    let body = vec![returning(lambda_returning(Expr::local("n", TypeRef::int()), FunctionalTarget::new(supplier()), 2))];
    let make = static_method("make", vec![Parameter::new("n", TypeRef::int())], supplier(), body);
    let class = class_with("p/Lambdas", vec![make]);
    let oracle = oracle_with(&[&class]);

    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
    let cf = &compilation.class_file;
    let lifted = cf.find_method_by_descriptor("lambda$0", "(I)I").expect("lifted body takes the capture");
    assert_eq!(lifted.access_flags, ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC);

    let code = code_of(&compilation, "make");
    assert_eq!(count_op(&code, INVOKEDYNAMIC), 1);
    assert!(cf.find_method("$deserializeLambda$").is_none());
}

#[test]
fn per_member_naming_includes_the_declaring_method() {
    init_logging();
    let body = vec![returning(lambda_returning(Expr::int(3), FunctionalTarget::new(supplier()), 2))];
    let class = class_with("p/Lambdas", vec![static_method("make", vec![], supplier(), body)]);
    let oracle = oracle_with(&[&class]);
    let config = Config::default().with_lambda_naming(LambdaNaming::PerMember);

    let compilation = compile_class(&class, &oracle, &config).unwrap();
    assert!(compilation.class_file.find_method("lambda$make$0").is_some());
}

#[test]
fn serializable_lambda_gets_deserialize_hook() {
    init_logging();
    let target = FunctionalTarget::new(supplier()).with_markers(vec![TypeRef::class("java/io/Serializable")]);
    let body = vec![returning(lambda_returning(Expr::int(7), target, 2))];
    let class = class_with("p/Lambdas", vec![static_method("make", vec![], supplier(), body)]);
    let oracle = oracle_with(&[&class]);

    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
    let cf = &compilation.class_file;
    let hook = cf
        .find_method_by_descriptor("$deserializeLambda$", "(Ljava/lang/invoke/SerializedLambda;)Ljava/lang/Object;")
        .expect("deserialization hook");
    assert_eq!(hook.access_flags, ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC);
    let names: Vec<String> = cf
        .constant_pool
        .entries()
        .filter_map(|(_, c)| match c {
            jpatc::codegen::Constant::Utf8(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    assert!(names.iter().any(|n| n == "altMetafactory"));
}

#[test]
fn lambda_capturing_reassigned_local_becomes_problem_method() {
    init_logging();
    // int n = 0; n++; return () -> n;
    let body = vec![
        Stmt::LocalVar { name: "n".into(), type_ref: TypeRef::int(), init: Some(Expr::int(0)), is_final: false, span: line(2) },
        Stmt::Expr {
            expr: Expr::new(ExprKind::Increment { name: "n".into(), delta: 1, prefix: false }, TypeRef::int(), line(3)),
            span: line(3),
        },
        returning(lambda_returning(Expr::local("n", TypeRef::int()), FunctionalTarget::new(supplier()), 4)),
    ];
    let class = class_with("p/Lambdas", vec![static_method("make", vec![], supplier(), body)]);
    let oracle = oracle_with(&[&class]);

    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
    assert_eq!(compilation.problem_methods, vec!["make".to_string()]);
    let expected = format!("Unresolved compilation problem: \n\t{}\n", Message::LambdaCaptureNotFinal("n".into()));
    assert!(strings(&compilation).contains(&expected), "{:?}", strings(&compilation));
    // the body was never lowered, so nothing was lifted
    assert!(compilation.class_file.find_method("lambda$0").is_none());
}

#[test]
fn bound_method_reference_checks_its_receiver() {
    init_logging();
    // static IntSupplier len(String s) { return s::length; }
    let method_ref = MethodRefExpr {
        target: FunctionalTarget::new(supplier()),
        kind: MethodRefKind::Bound(Box::new(Expr::local("s", TypeRef::string()))),
        owner: "java/lang/String".into(),
        name: "length".into(),
        descriptor: "()I".into(),
        owner_is_interface: false,
        instantiated: "()I".into(),
        span: line(2),
    };
    let expr = Expr::new(ExprKind::MethodRef(Box::new(method_ref)), supplier(), line(2));
    let class = class_with(
        "p/Lambdas",
        vec![static_method("len", vec![Parameter::new("s", TypeRef::string())], supplier(), vec![returning(expr)])],
    );
    let oracle = oracle_with(&[&class]);

    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
    let code = code_of(&compilation, "len");
    assert_eq!(count_op(&code, INVOKESTATIC), 1);
    assert_eq!(count_op(&code, INVOKEDYNAMIC), 1);
    // method references are not lifted
    assert!(compilation.class_file.find_method("lambda$0").is_none());
}

fn bootstrap_indices(compilation: &jpatc::Compilation, method: &str) -> Vec<u16> {
    let code = code_of(compilation, method);
    let cp = &compilation.class_file.constant_pool;
    jpatc::codegen::opcodes::instructions(&code)
        .into_iter()
        .filter(|(_, op)| *op == INVOKEDYNAMIC)
        .map(|(pc, _)| match cp.get(u16::from_be_bytes([code[pc + 1], code[pc + 2]])).unwrap() {
            jpatc::codegen::Constant::InvokeDynamic(bootstrap, _) => *bootstrap,
            other => panic!("invokedynamic operand is {:?}", other),
        })
        .collect()
}

#[test]
fn bootstrap_entries_follow_declaration_order() {
    init_logging();
    // static IntSupplier a() { IntSupplier first = () -> 1; return () -> 2; }
    // static IntSupplier b() { return () -> 3; }
    let a = static_method(
        "a",
        vec![],
        supplier(),
        vec![
            Stmt::LocalVar {
                name: "first".into(),
                type_ref: supplier(),
                init: Some(lambda_returning(Expr::int(1), FunctionalTarget::new(supplier()), 2)),
                is_final: false,
                span: line(2),
            },
            returning(lambda_returning(Expr::int(2), FunctionalTarget::new(supplier()), 3)),
        ],
    );
    let b = static_method("b", vec![], supplier(), vec![returning(lambda_returning(Expr::int(3), FunctionalTarget::new(supplier()), 6))]);
    let class = class_with("p/Lambdas", vec![a, b]);
    let oracle = oracle_with(&[&class]);

    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
    assert_eq!(bootstrap_indices(&compilation, "a"), vec![0, 1]);
    assert_eq!(bootstrap_indices(&compilation, "b"), vec![2]);

    let table = compilation.class_file.attribute("BootstrapMethods").unwrap();
    assert_eq!(u16::from_be_bytes([table.info[0], table.info[1]]), 3);
}
