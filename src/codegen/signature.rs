//! Signature attribute strings for generic declarations (JVMS 4.7.9.1).
//!
//! A signature is only produced when the erased descriptor loses generic
//! information the declaration actually uses. Raw uses of generic types,
//! synthetic and bridge methods and lifted lambda bodies never get one.

use crate::ast::*;
use crate::common::hierarchy::{ResolveResult, TypeHierarchyOracle};
use crate::consts::OBJECT;

pub struct GenericSignatureEncoder<'a> {
    oracle: &'a TypeHierarchyOracle,
}

impl<'a> GenericSignatureEncoder<'a> {
    pub fn new(oracle: &'a TypeHierarchyOracle) -> Self {
        Self { oracle }
    }

    /// `<T:..>Super;Iface;` when the class declares type parameters or extends
    /// or implements a parameterized type.
    pub fn encode_class(&self, class: &ClassDecl) -> ResolveResult<Option<String>> {
        let generic_supers = class.extends.iter().chain(&class.implements).any(needs_signature);
        if class.type_params.is_empty() && !generic_supers {
            return Ok(None);
        }
        let mut sig = self.type_params(&class.type_params)?;
        match (&class.extends, class.is_interface()) {
            (Some(superclass), false) => sig.push_str(&type_signature(superclass)),
            _ => sig.push_str(&type_signature(&TypeRef::class(OBJECT))),
        }
        for interface in &class.implements {
            sig.push_str(&type_signature(interface));
        }
        log::trace!("signature of class {}: {}", class.name, sig);
        Ok(Some(sig))
    }

    pub fn encode_method(&self, method: &MethodDecl) -> ResolveResult<Option<String>> {
        if method.synthetic || method.bridge || method.name.starts_with("lambda$") {
            return Ok(None);
        }
        let throws_type_var = method.throws.iter().any(TypeRef::mentions_type_var);
        let generic = !method.type_params.is_empty()
            || needs_signature(&method.return_type)
            || method.params.iter().any(|p| needs_signature(&p.type_ref))
            || throws_type_var;
        if !generic {
            return Ok(None);
        }
        let mut sig = self.type_params(&method.type_params)?;
        sig.push('(');
        for p in &method.params {
            sig.push_str(&type_signature(&p.type_ref));
        }
        sig.push(')');
        sig.push_str(&type_signature(&method.return_type));
        if throws_type_var {
            for thrown in &method.throws {
                sig.push('^');
                sig.push_str(&type_signature(thrown));
            }
        }
        Ok(Some(sig))
    }

    pub fn encode_field(&self, field: &FieldDecl) -> Option<String> {
        needs_signature(&field.type_ref).then(|| type_signature(&field.type_ref))
    }

    fn type_params(&self, params: &[TypeParam]) -> ResolveResult<String> {
        if params.is_empty() {
            return Ok(String::new());
        }
        let mut sig = String::from("<");
        for param in params {
            sig.push_str(&param.name);
            match param.bounds.split_first() {
                None => {
                    sig.push(':');
                    sig.push_str(&type_signature(&TypeRef::class(OBJECT)));
                }
                Some((first, rest)) => {
                    // an interface first bound leaves the class bound empty
                    let first_is_interface = match first.class_name() {
                        Some(name) => self.oracle.is_interface(name)?,
                        None => false,
                    };
                    sig.push(':');
                    if first_is_interface {
                        sig.push(':');
                    }
                    sig.push_str(&type_signature(first));
                    for bound in rest {
                        sig.push(':');
                        sig.push_str(&type_signature(bound));
                    }
                }
            }
        }
        sig.push('>');
        Ok(sig)
    }
}

/// True when the erasure of `ty` drops something a signature would keep.
pub fn needs_signature(ty: &TypeRef) -> bool {
    ty.is_parameterized() || ty.mentions_type_var()
}

/// Java type signature of `ty`.
pub fn type_signature(ty: &TypeRef) -> String {
    let mut sig = "[".repeat(ty.array_dims);
    match &ty.kind {
        TypeKind::Primitive(p) => sig.push(p.descriptor()),
        TypeKind::TypeVar { name, .. } => {
            sig.push('T');
            sig.push_str(name);
            sig.push(';');
        }
        TypeKind::Class { .. } => {
            sig.push_str(&class_type_body(ty));
            sig.push(';');
        }
    }
    sig
}

/// `Lp/Outer<..>.Inner<..>` without the closing `;`.
fn class_type_body(ty: &TypeRef) -> String {
    let (name, args, owner) = match &ty.kind {
        TypeKind::Class { name, args, owner } => (name, args, owner),
        _ => return type_signature(ty),
    };
    let mut body = match owner.as_deref().filter(|o| o.is_parameterized()) {
        Some(outer) => {
            let outer_name = outer.class_name().unwrap_or_default();
            let simple = name
                .strip_prefix(outer_name)
                .and_then(|rest| rest.strip_prefix('$'))
                .unwrap_or_else(|| name.rsplit('$').next().unwrap_or(name));
            format!("{}.{}", class_type_body(outer), simple)
        }
        None => format!("L{}", name),
    };
    if !args.is_empty() {
        body.push('<');
        for arg in args {
            match arg {
                TypeArg::Type(t) => body.push_str(&type_signature(t)),
                TypeArg::Wildcard(WildcardType { bound: None }) => body.push('*'),
                TypeArg::Wildcard(WildcardType { bound: Some((kind, bound)) }) => {
                    body.push(if *kind == BoundKind::Extends { '+' } else { '-' });
                    body.push_str(&type_signature(bound));
                }
            }
        }
        body.push('>');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> TypeHierarchyOracle {
        TypeHierarchyOracle::builder()
            .register(crate::common::hierarchy::TypeInfo::class("p/X").generic(&["T"]))
            .register(crate::common::hierarchy::TypeInfo::class("p/X$MX").generic(&["U"]))
            .build()
    }

    #[test]
    fn class_with_interface_first_bound() {
        let oracle = oracle();
        let encoder = GenericSignatureEncoder::new(&oracle);
        let mut class = ClassDecl::new("p/Box", ClassKind::Class);
        class.type_params = vec![
            TypeParam::new("T", vec![TypeRef::class("java/lang/Runnable")]),
            TypeParam::new("N", vec![TypeRef::class("java/lang/Number"), TypeRef::class("java/lang/Runnable")]),
        ];
        class.implements = vec![TypeRef::class("java/lang/Comparable").with_type_args(vec![TypeRef::type_var("T")])];
        assert_eq!(
            encoder.encode_class(&class).unwrap().as_deref(),
            Some("<T::Ljava/lang/Runnable;N:Ljava/lang/Number;:Ljava/lang/Runnable;>Ljava/lang/Object;Ljava/lang/Comparable<TT;>;")
        );
    }

    #[test]
    fn plain_class_has_no_signature() {
        let oracle = oracle();
        let encoder = GenericSignatureEncoder::new(&oracle);
        let mut class = ClassDecl::new("p/Plain", ClassKind::Class);
        class.implements = vec![TypeRef::class("java/lang/Runnable")];
        assert_eq!(encoder.encode_class(&class).unwrap(), None);
    }

    #[test]
    fn raw_member_type_is_omitted_and_parameterized_owner_is_encoded() {
        let oracle = oracle();
        let encoder = GenericSignatureEncoder::new(&oracle);
        let raw = FieldDecl::new("f", TypeRef::class("p/X$MX"));
        assert_eq!(encoder.encode_field(&raw), None);

        let owner = TypeRef::class("p/X").with_type_args(vec![TypeRef::string()]);
        let nested = TypeRef::class("p/X$MX").with_type_args(vec![TypeRef::class("java/lang/Thread")]).with_owner(owner);
        let field = FieldDecl::new("g", nested);
        assert_eq!(
            encoder.encode_field(&field).as_deref(),
            Some("Lp/X<Ljava/lang/String;>.MX<Ljava/lang/Thread;>;")
        );
    }

    #[test]
    fn wildcards_and_throws() {
        let oracle = oracle();
        let encoder = GenericSignatureEncoder::new(&oracle);
        let list = |arg: TypeArg| TypeRef::class("java/util/List").with_args(vec![arg]);
        let mut m = MethodDecl::new(
            "copy",
            vec![
                Parameter::new("src", list(TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Extends, TypeRef::type_var("E"))) }))),
                Parameter::new("dst", list(TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Super, TypeRef::type_var("E"))) }))),
                Parameter::new("any", list(TypeArg::Wildcard(WildcardType { bound: None }))),
            ],
            TypeRef::void(),
            None,
        );
        m.type_params = vec![TypeParam::new("E", vec![]), TypeParam::new("X", vec![TypeRef::class("java/lang/Exception")])];
        m.throws = vec![TypeRef::type_var("X")];
        assert_eq!(
            encoder.encode_method(&m).unwrap().as_deref(),
            Some("<E:Ljava/lang/Object;X:Ljava/lang/Exception;>(Ljava/util/List<+TE;>;Ljava/util/List<-TE;>;Ljava/util/List<*>;)V^TX;")
        );
    }

    #[test]
    fn synthetic_and_lambda_methods_never_get_one() {
        let oracle = oracle();
        let encoder = GenericSignatureEncoder::new(&oracle);
        let generic_param = vec![Parameter::new("t", TypeRef::type_var("T"))];
        let mut lambda = MethodDecl::new("lambda$0", generic_param.clone(), TypeRef::void(), None);
        assert_eq!(encoder.encode_method(&lambda).unwrap(), None);
        lambda.name = "bridge".into();
        lambda.bridge = true;
        assert_eq!(encoder.encode_method(&lambda).unwrap(), None);
        let plain = MethodDecl::new("m", vec![Parameter::new("s", TypeRef::string())], TypeRef::int(), None);
        assert_eq!(encoder.encode_method(&plain).unwrap(), None);
    }
}
