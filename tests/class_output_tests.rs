mod common;

use common::*;
use jpatc::ast::*;
use jpatc::codegen::GenericSignatureEncoder;
use jpatc::verify::signature::{
    is_valid_class_signature, is_valid_field_signature, is_valid_method_signature, parse_type_parameters,
};
use jpatc::{compile_class, compile_unit, write_class_file, Config, TypeHierarchyOracle};

fn utf8_at(cf: &jpatc::codegen::ClassFile, info: &[u8]) -> String {
    cf.constant_pool.utf8(u16::from_be_bytes([info[0], info[1]])).unwrap().to_string()
}

/// `class Box<T extends Comparable<T>> { List<T> items; <R> R map(Function<? super T, ? extends R> f) }`
fn generic_box() -> ClassDecl {
    let t = TypeRef::type_var_bounded("T", TypeRef::class("java/lang/Comparable"));
    let mut class = ClassDecl::new("p/Box", ClassKind::Class);
    class.type_params =
        vec![TypeParam::new("T", vec![TypeRef::class("java/lang/Comparable").with_type_args(vec![TypeRef::type_var("T")])])];
    class.fields.push(FieldDecl::new("items", TypeRef::class("java/util/List").with_type_args(vec![t.clone()])));

    let function = TypeRef::class("java/util/function/Function").with_args(vec![
        TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Super, t)) }),
        TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Extends, TypeRef::type_var("R"))) }),
    ]);
    let mut map = MethodDecl::new("map", vec![Parameter::new("f", function)], TypeRef::type_var("R"), None);
    map.modifiers = vec![Modifier::Public, Modifier::Abstract];
    map.type_params = vec![TypeParam::new("R", vec![])];
    class.methods.push(map);
    class.modifiers = vec![Modifier::Public, Modifier::Abstract];
    class
}

#[test]
fn generic_signatures_are_emitted_and_parse() {
    init_logging();
    let class = generic_box();
    let oracle = TypeHierarchyOracle::builder().register_decl(&class).build();
    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
    let cf = &compilation.class_file;

    let class_signature = utf8_at(cf, &cf.attribute("Signature").unwrap().info);
    assert_eq!(class_signature, "<T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;");
    assert!(is_valid_class_signature(&class_signature));
    let params = parse_type_parameters(&class_signature).unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].name, "T");
    assert_eq!(params[0].class_bound, None);
    assert_eq!(params[0].interface_bounds, vec!["Ljava/lang/Comparable<TT;>;".to_string()]);

    let field = &cf.fields[0];
    let field_signature = utf8_at(cf, &field.attributes[0].info);
    assert_eq!(field_signature, "Ljava/util/List<TT;>;");
    assert!(is_valid_field_signature(&field_signature));

    let map = cf.find_method("map").unwrap();
    let method_signature = utf8_at(cf, &map.attribute(&cf.constant_pool, "Signature").unwrap().info);
    assert_eq!(method_signature, "<R:Ljava/lang/Object;>(Ljava/util/function/Function<-TT;+TR;>;)TR;");
    assert!(is_valid_method_signature(&method_signature));
    let params = parse_type_parameters(&method_signature).unwrap();
    assert_eq!(params[0].name, "R");
    assert_eq!(params[0].class_bound.as_deref(), Some("Ljava/lang/Object;"));
}

#[test]
fn encoder_skips_non_generic_members() {
    let oracle = TypeHierarchyOracle::with_builtins();
    let encoder = GenericSignatureEncoder::new(&oracle);
    let field = FieldDecl::new("name", TypeRef::string());
    assert_eq!(encoder.encode_field(&field), None);
}

#[test]
fn class_file_lands_in_its_package_directory() {
    init_logging();
    let m = static_method(
        "area",
        vec![Parameter::new("v", TypeRef::class("p/Shape"))],
        TypeRef::int(),
        vec![return_switch(shape_switch(2), TypeRef::int(), 2)],
    );
    let class = class_with("p/Shapes", vec![m]);
    let oracle = oracle_with(&[&class]);
    let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = write_class_file(&compilation, dir.path()).unwrap();
    assert_eq!(path, dir.path().join("p").join("Shapes.class"));
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes, compilation.bytes);
    assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    // major version follows the magic and minor version
    assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), 65);
}

#[test]
fn unit_compiles_every_class_and_interface() {
    init_logging();
    let mut shape = ClassDecl::new("p/Shape", ClassKind::Interface);
    shape.modifiers = vec![Modifier::Public, Modifier::Sealed];
    shape.permits = vec![TypeRef::class("p/Circle")];
    let mut circle = ClassDecl::new("p/Circle", ClassKind::Class);
    circle.modifiers = vec![Modifier::Public, Modifier::Final];
    circle.implements = vec![TypeRef::class("p/Shape")];
    let unit = CompilationUnit { package: Some("p".into()), types: vec![shape, circle], span: Span::default() };

    let oracle = TypeHierarchyOracle::builder().register_unit(&unit).build();
    let compiled = compile_unit(&unit, &oracle, &Config::default()).unwrap();
    let names: Vec<&str> = compiled.iter().map(|c| c.class_name.as_str()).collect();
    assert_eq!(names, vec!["p/Shape", "p/Circle"]);

    let dir = tempfile::tempdir().unwrap();
    for compilation in &compiled {
        write_class_file(compilation, dir.path()).unwrap();
    }
    assert!(dir.path().join("p/Shape.class").is_file());
    assert!(dir.path().join("p/Circle.class").is_file());
}
