use crate::codegen::attribute::{AttributeInfo, CodeAttribute};
use crate::codegen::class::ClassFile;
use crate::codegen::constpool::ConstantPool;
use crate::codegen::defs::access_flags::{ACC_ABSTRACT, ACC_STATIC};
use crate::codegen::descriptor::parameter_slots;
use crate::codegen::method::MethodInfo;

use super::signature::{is_valid_field_signature, is_valid_method_signature};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MemberVerifyError {
    #[error("Member name or descriptor at {0} is not a Utf8 constant")]
    InvalidNameOrDescriptor(u16),
    #[error("Duplicate member {0}")]
    DuplicateMember(String),
    #[error("Method {0} must have a Code attribute")]
    MissingCodeAttribute(String),
    #[error("Abstract method {0} must not have a Code attribute")]
    ForbiddenCodeAttribute(String),
    #[error("Duplicate {attribute} attribute on {member}")]
    DuplicateAttribute { member: String, attribute: String },
    #[error("Malformed Code attribute on {0}")]
    MalformedCode(String),
    #[error("Method {member} declares {max_locals} locals but its parameters need {needed}")]
    TooFewLocals { member: String, max_locals: u16, needed: usize },
    #[error("Invalid signature {signature:?} on {member}")]
    InvalidSignature { member: String, signature: String },
}

pub type Result<T> = std::result::Result<T, MemberVerifyError>;

/// Verify fields and methods of `class_file`.
pub fn verify(class_file: &ClassFile) -> Result<()> {
    let cp = &class_file.constant_pool;
    let mut seen = std::collections::HashSet::new();
    for field in &class_file.fields {
        let (name, descriptor) = name_and_descriptor(cp, field.name_index, field.descriptor_index)?;
        let member = format!("{}:{}", name, descriptor);
        if !seen.insert(name.to_string()) {
            return Err(MemberVerifyError::DuplicateMember(member));
        }
        verify_unique_attributes(cp, &member, &field.attributes)?;
        verify_signature(cp, &member, &field.attributes, is_valid_field_signature)?;
    }

    seen.clear();
    for method in &class_file.methods {
        let (name, descriptor) = name_and_descriptor(cp, method.name_index, method.descriptor_index)?;
        let member = format!("{}{}", name, descriptor);
        if !seen.insert(member.clone()) {
            return Err(MemberVerifyError::DuplicateMember(member));
        }
        verify_unique_attributes(cp, &member, &method.attributes)?;
        verify_signature(cp, &member, &method.attributes, is_valid_method_signature)?;
        verify_code(cp, &member, descriptor, method)?;
    }
    Ok(())
}

fn name_and_descriptor<'a>(cp: &'a ConstantPool, name: u16, descriptor: u16) -> Result<(&'a str, &'a str)> {
    let name = cp.utf8(name).map_err(|_| MemberVerifyError::InvalidNameOrDescriptor(name))?;
    let descriptor = cp.utf8(descriptor).map_err(|_| MemberVerifyError::InvalidNameOrDescriptor(descriptor))?;
    Ok((name, descriptor))
}

fn verify_unique_attributes(cp: &ConstantPool, member: &str, attributes: &[AttributeInfo]) -> Result<()> {
    let mut names = std::collections::HashSet::new();
    for attribute in attributes {
        let name = attribute
            .name(cp)
            .map_err(|_| MemberVerifyError::InvalidNameOrDescriptor(attribute.name_index))?;
        if !names.insert(name) {
            return Err(MemberVerifyError::DuplicateAttribute { member: member.to_string(), attribute: name.to_string() });
        }
    }
    Ok(())
}

fn verify_signature(
    cp: &ConstantPool,
    member: &str,
    attributes: &[AttributeInfo],
    is_valid: fn(&str) -> bool,
) -> Result<()> {
    let Some(attribute) = attributes.iter().find(|a| a.name(cp).map_or(false, |n| n == "Signature")) else {
        return Ok(());
    };
    let signature = attribute
        .info
        .get(0..2)
        .and_then(|b| cp.utf8(u16::from_be_bytes([b[0], b[1]])).ok())
        .unwrap_or_default();
    if is_valid(signature) {
        Ok(())
    } else {
        Err(MemberVerifyError::InvalidSignature { member: member.to_string(), signature: signature.to_string() })
    }
}

fn verify_code(cp: &ConstantPool, member: &str, descriptor: &str, method: &MethodInfo) -> Result<()> {
    let is_abstract = method.access_flags & ACC_ABSTRACT != 0;
    let code = method.attribute(cp, "Code");
    match (code, is_abstract) {
        (None, true) => Ok(()),
        (Some(_), true) => Err(MemberVerifyError::ForbiddenCodeAttribute(member.to_string())),
        (None, false) => Err(MemberVerifyError::MissingCodeAttribute(member.to_string())),
        (Some(attribute), false) => {
            let (_, max_locals, code) = CodeAttribute::parse(&attribute.info)
                .ok_or_else(|| MemberVerifyError::MalformedCode(member.to_string()))?;
            if code.is_empty() {
                return Err(MemberVerifyError::MalformedCode(member.to_string()));
            }
            let receiver = usize::from(method.access_flags & ACC_STATIC == 0);
            let needed = parameter_slots(descriptor).map_err(|_| MemberVerifyError::MalformedCode(member.to_string()))? + receiver;
            if (max_locals as usize) < needed {
                return Err(MemberVerifyError::TooFewLocals { member: member.to_string(), max_locals, needed });
            }
            Ok(())
        }
    }
}
