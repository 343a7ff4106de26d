//! Utilities to build and take apart method/field descriptors

use crate::ast::{MethodDecl, PrimitiveType, TypeKind, TypeRef};
use crate::common::hierarchy::TypeHierarchyOracle;

use super::error::{CodeGenError, CodeGenResult};

/// Field descriptor of the erasure of `ty`.
pub fn type_to_descriptor(ty: &TypeRef) -> String {
    let erased = TypeHierarchyOracle::erase(ty);
    let mut desc = "[".repeat(erased.array_dims);
    match &erased.kind {
        TypeKind::Primitive(p) => desc.push(p.descriptor()),
        TypeKind::Class { name, .. } => {
            desc.push('L');
            desc.push_str(name);
            desc.push(';');
        }
        // erase() never leaves a type variable behind
        TypeKind::TypeVar { .. } => desc.push_str("Ljava/lang/Object;"),
    }
    desc
}

pub fn method_descriptor(params: &[TypeRef], ret: &TypeRef) -> String {
    let mut d = String::from("(");
    for p in params {
        d.push_str(&type_to_descriptor(p));
    }
    d.push(')');
    d.push_str(&type_to_descriptor(ret));
    d
}

pub fn method_descriptor_of(method: &MethodDecl) -> String {
    let params: Vec<TypeRef> = method.params.iter().map(|p| p.type_ref.clone()).collect();
    method_descriptor(&params, &method.return_type)
}

/// Splits a method descriptor into parameter field descriptors and the return descriptor.
pub fn parse_method_descriptor(descriptor: &str) -> CodeGenResult<(Vec<String>, String)> {
    let invalid = || CodeGenError::InvalidDescriptor { descriptor: descriptor.to_string() };
    let inner = descriptor.strip_prefix('(').ok_or_else(invalid)?;
    let close = inner.find(')').ok_or_else(invalid)?;
    let (params_part, ret_part) = (&inner[..close], &inner[close + 1..]);

    let mut params = Vec::new();
    let mut rest = params_part;
    while !rest.is_empty() {
        let len = field_descriptor_len(rest).ok_or_else(invalid)?;
        params.push(rest[..len].to_string());
        rest = &rest[len..];
    }
    if ret_part != "V" && field_descriptor_len(ret_part) != Some(ret_part.len()) {
        return Err(invalid());
    }
    Ok((params, ret_part.to_string()))
}

/// Length of the leading field descriptor in `s`.
pub fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(i + 1),
        b'L' => s[i..].find(';').map(|end| i + end + 1),
        _ => None,
    }
}

/// Primitive type of a one-character field descriptor.
pub fn primitive_of_descriptor(descriptor: &str) -> Option<PrimitiveType> {
    Some(match descriptor {
        "Z" => PrimitiveType::Boolean,
        "B" => PrimitiveType::Byte,
        "C" => PrimitiveType::Char,
        "S" => PrimitiveType::Short,
        "I" => PrimitiveType::Int,
        "J" => PrimitiveType::Long,
        "F" => PrimitiveType::Float,
        "D" => PrimitiveType::Double,
        _ => return None,
    })
}

/// Erased type named by a field descriptor (or `V`).
pub fn descriptor_to_type(descriptor: &str) -> TypeRef {
    let dims = descriptor.bytes().take_while(|b| *b == b'[').count();
    let base = &descriptor[dims..];
    let ty = match primitive_of_descriptor(base) {
        Some(p) => TypeRef::primitive(p),
        None if base == "V" => TypeRef::void(),
        None => TypeRef::class(descriptor_to_internal(base)),
    };
    ty.array_of(dims)
}

/// Class name usable in a `CONSTANT_Class`: the internal name, or the descriptor for arrays.
pub fn class_constant_name(ty: &TypeRef) -> String {
    let erased = TypeHierarchyOracle::erase(ty);
    match erased.class_name() {
        Some(name) => name.to_string(),
        None => type_to_descriptor(&erased),
    }
}

/// Inverse of [`type_to_descriptor`] for reference descriptors: `Ljava/lang/String;` to `java/lang/String`.
pub fn descriptor_to_internal(descriptor: &str) -> &str {
    descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor)
}

/// Number of local/stack slots the parameters of `descriptor` occupy.
pub fn parameter_slots(descriptor: &str) -> CodeGenResult<usize> {
    let (params, _) = parse_method_descriptor(descriptor)?;
    Ok(params.iter().map(|p| if p == "J" || p == "D" { 2 } else { 1 }).sum())
}
