use crate::codegen::class::ClassFile;
use crate::codegen::constpool::Constant;
use crate::codegen::defs::access_flags::{ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE};
use crate::codegen::defs::major_versions;

use super::constant_pool::{self, ConstantPoolVerifyError};
use super::members::{self, MemberVerifyError};
use super::signature::is_valid_class_signature;

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Unsupported class file version {0}")]
    UnsupportedVersion(u16),
    #[error("this_class {0} is not a Class constant")]
    InvalidThisClass(u16),
    #[error("super_class {0} is not a Class constant")]
    InvalidSuperClass(u16),
    #[error("Invalid class access flags: 0x{0:04x}")]
    InvalidClassAccessFlags(u16),
    #[error("Duplicate class attribute: {0}")]
    DuplicateClassAttribute(String),
    #[error("Invalid class signature {0:?}")]
    InvalidClassSignature(String),
    #[error(transparent)]
    ConstantPool(#[from] ConstantPoolVerifyError),
    #[error(transparent)]
    Member(#[from] MemberVerifyError),
}

/// Verify the ClassFile by running every structural check in turn.
pub fn verify(class_file: &ClassFile) -> VerifyResult<()> {
    if !(major_versions::JAVA_8..=major_versions::JAVA_21).contains(&class_file.major_version) {
        return Err(VerifyError::UnsupportedVersion(class_file.major_version));
    }
    constant_pool::verify(class_file)?;
    verify_access_flags(class_file)?;
    verify_this_class(class_file)?;
    verify_super_class(class_file)?;
    members::verify(class_file)?;
    verify_class_attributes(class_file)?;
    log::trace!(
        "verified {} ({} methods, {} constants)",
        class_file.class_name().unwrap_or("?"),
        class_file.methods.len(),
        class_file.constant_pool.len()
    );
    Ok(())
}

fn verify_access_flags(class_file: &ClassFile) -> VerifyResult<()> {
    let flags = class_file.access_flags;
    let is_interface = flags & ACC_INTERFACE != 0;
    let abstract_and_final = flags & ACC_ABSTRACT != 0 && flags & ACC_FINAL != 0;
    let interface_not_abstract = is_interface && (flags & ACC_ABSTRACT == 0 || flags & ACC_FINAL != 0);
    if abstract_and_final || interface_not_abstract {
        return Err(VerifyError::InvalidClassAccessFlags(flags));
    }
    Ok(())
}

fn verify_this_class(class_file: &ClassFile) -> VerifyResult<()> {
    match class_file.constant_pool.get(class_file.this_class) {
        Ok(Constant::Class(_)) => Ok(()),
        _ => Err(VerifyError::InvalidThisClass(class_file.this_class)),
    }
}

fn verify_super_class(class_file: &ClassFile) -> VerifyResult<()> {
    let super_class = class_file.super_class;
    // Only java/lang/Object has no superclass.
    if super_class == 0 && class_file.class_name().map_or(false, |n| n == crate::consts::OBJECT) {
        return Ok(());
    }
    match class_file.constant_pool.get(super_class) {
        Ok(Constant::Class(_)) => Ok(()),
        _ => Err(VerifyError::InvalidSuperClass(super_class)),
    }
}

fn verify_class_attributes(class_file: &ClassFile) -> VerifyResult<()> {
    let cp = &class_file.constant_pool;
    let mut seen = std::collections::HashSet::new();
    for attribute in &class_file.attributes {
        let name = attribute.name(cp).map_err(|_| ConstantPoolVerifyError::InvalidConstantPoolIndex(attribute.name_index))?;
        if !seen.insert(name) {
            return Err(VerifyError::DuplicateClassAttribute(name.to_string()));
        }
        if name == "Signature" {
            let signature = attribute
                .info
                .get(0..2)
                .and_then(|b| cp.utf8(u16::from_be_bytes([b[0], b[1]])).ok())
                .unwrap_or_default();
            if !is_valid_class_signature(signature) {
                return Err(VerifyError::InvalidClassSignature(signature.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::attribute::make_signature_attribute;
    use crate::codegen::defs::access_flags::{ACC_PUBLIC, ACC_SUPER};

    fn minimal() -> ClassFile {
        let mut cf = ClassFile::new();
        cf.access_flags = ACC_PUBLIC | ACC_SUPER;
        cf.this_class = cf.constant_pool.add_class("p/Point").unwrap();
        cf.super_class = cf.constant_pool.add_class("java/lang/Object").unwrap();
        cf
    }

    #[test]
    fn minimal_class_passes() {
        assert_eq!(verify(&minimal()), Ok(()));
    }

    #[test]
    fn missing_superclass_is_rejected() {
        let mut cf = minimal();
        cf.super_class = 0;
        assert_eq!(verify(&cf), Err(VerifyError::InvalidSuperClass(0)));
    }

    #[test]
    fn newer_class_files_are_rejected() {
        let mut cf = minimal();
        cf.major_version = 70;
        assert_eq!(verify(&cf), Err(VerifyError::UnsupportedVersion(70)));
    }

    #[test]
    fn interfaces_must_be_abstract() {
        let mut cf = minimal();
        cf.access_flags = ACC_PUBLIC | ACC_INTERFACE;
        assert!(matches!(verify(&cf), Err(VerifyError::InvalidClassAccessFlags(_))));
    }

    #[test]
    fn class_signature_is_parsed() {
        let mut cf = minimal();
        let attribute = make_signature_attribute(&mut cf.constant_pool, "<T:Ljava/lang/Object;>").unwrap();
        cf.attributes.push(attribute);
        assert!(matches!(verify(&cf), Err(VerifyError::InvalidClassSignature(_))));

        let mut cf = minimal();
        let attribute = make_signature_attribute(&mut cf.constant_pool, "<T:Ljava/lang/Object;>Ljava/lang/Object;").unwrap();
        cf.attributes.push(attribute);
        assert_eq!(verify(&cf), Ok(()));
    }
}
