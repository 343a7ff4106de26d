use crate::codegen::class::ClassFile;
use crate::codegen::constpool::{constant_tags, Constant, ReferenceKind};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConstantPoolVerifyError {
    #[error("Invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("Constant pool entry {index} refers to a {found} where {expected} was expected")]
    InvalidConstantPoolIndexType { index: u16, expected: &'static str, found: &'static str },
    #[error("Invalid method handle reference kind {kind} at {index}")]
    InvalidReferenceKind { index: u16, kind: u8 },
    #[error("BootstrapMethods attribute not defined")]
    BootstrapMethodsNotDefined,
    #[error("Malformed BootstrapMethods attribute")]
    MalformedBootstrapMethods,
    #[error("Invalid bootstrap method index {bootstrap} at {index} (table has {len} entries)")]
    InvalidBootstrapMethodIndex { index: u16, bootstrap: u16, len: usize },
    #[error("Bootstrap method {0} has a non-loadable static argument")]
    InvalidBootstrapArgument(usize),
}

pub type Result<T> = std::result::Result<T, ConstantPoolVerifyError>;

/// One parsed entry of a `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

/// Verify every constant-pool cross reference of `class_file`.
pub fn verify(class_file: &ClassFile) -> Result<()> {
    let bootstrap_methods = bootstrap_methods(class_file)?;
    for (index, constant) in class_file.constant_pool.entries() {
        for (target, tags) in constant.references() {
            expect_tag(class_file, target, tags)?;
        }
        match constant {
            Constant::MethodHandle(kind, reference) => verify_method_handle(class_file, index, *kind, *reference)?,
            Constant::InvokeDynamic(bootstrap, _) => {
                let table = bootstrap_methods.as_ref().ok_or(ConstantPoolVerifyError::BootstrapMethodsNotDefined)?;
                if *bootstrap as usize >= table.len() {
                    return Err(ConstantPoolVerifyError::InvalidBootstrapMethodIndex {
                        index,
                        bootstrap: *bootstrap,
                        len: table.len(),
                    });
                }
            }
            _ => {}
        }
    }
    if let Some(table) = &bootstrap_methods {
        verify_bootstrap_methods(class_file, table)?;
    }
    Ok(())
}

/// Parses the class's `BootstrapMethods` attribute, if it has one.
pub fn bootstrap_methods(class_file: &ClassFile) -> Result<Option<Vec<RawBootstrapMethod>>> {
    let Some(attribute) = class_file.attribute("BootstrapMethods") else {
        return Ok(None);
    };
    let mut reader = U16Reader { bytes: &attribute.info, pos: 0 };
    let count = reader.next()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let method_ref = reader.next()?;
        let argc = reader.next()?;
        let arguments = (0..argc).map(|_| reader.next()).collect::<Result<Vec<_>>>()?;
        methods.push(RawBootstrapMethod { method_ref, arguments });
    }
    if reader.pos != attribute.info.len() {
        return Err(ConstantPoolVerifyError::MalformedBootstrapMethods);
    }
    Ok(Some(methods))
}

fn verify_bootstrap_methods(class_file: &ClassFile, table: &[RawBootstrapMethod]) -> Result<()> {
    use constant_tags::*;
    const LOADABLE: &[u8] = &[CONSTANT_INTEGER, CONSTANT_STRING, CONSTANT_CLASS, CONSTANT_METHODTYPE, CONSTANT_METHODHANDLE];
    for (i, method) in table.iter().enumerate() {
        expect_tag(class_file, method.method_ref, &[CONSTANT_METHODHANDLE])?;
        for &argument in &method.arguments {
            match class_file.constant_pool.get(argument) {
                Ok(constant) if LOADABLE.contains(&constant.tag()) => {}
                _ => return Err(ConstantPoolVerifyError::InvalidBootstrapArgument(i)),
            }
        }
    }
    Ok(())
}

fn verify_method_handle(class_file: &ClassFile, index: u16, kind: u8, reference: u16) -> Result<()> {
    use constant_tags::*;
    let kind_enum = ReferenceKind::from_u8(kind).ok_or(ConstantPoolVerifyError::InvalidReferenceKind { index, kind })?;
    let allowed: &[u8] = match kind_enum {
        ReferenceKind::GetField | ReferenceKind::GetStatic | ReferenceKind::PutField | ReferenceKind::PutStatic => {
            &[CONSTANT_FIELDREF]
        }
        ReferenceKind::InvokeVirtual | ReferenceKind::NewInvokeSpecial => &[CONSTANT_METHODREF],
        ReferenceKind::InvokeStatic | ReferenceKind::InvokeSpecial => &[CONSTANT_METHODREF, CONSTANT_INTERFACEMETHODREF],
        ReferenceKind::InvokeInterface => &[CONSTANT_INTERFACEMETHODREF],
    };
    expect_tag(class_file, reference, allowed)
}

fn expect_tag(class_file: &ClassFile, index: u16, tags: &[u8]) -> Result<()> {
    let constant = class_file
        .constant_pool
        .get(index)
        .map_err(|_| ConstantPoolVerifyError::InvalidConstantPoolIndex(index))?;
    if tags.contains(&constant.tag()) {
        Ok(())
    } else {
        Err(ConstantPoolVerifyError::InvalidConstantPoolIndexType {
            index,
            expected: tag_name(tags[0]),
            found: constant.kind_name(),
        })
    }
}

fn tag_name(tag: u8) -> &'static str {
    use constant_tags::*;
    match tag {
        CONSTANT_UTF8 => "Utf8",
        CONSTANT_CLASS => "Class",
        CONSTANT_NAMEANDTYPE => "NameAndType",
        CONSTANT_FIELDREF => "Fieldref",
        CONSTANT_METHODREF => "Methodref",
        CONSTANT_INTERFACEMETHODREF => "InterfaceMethodref",
        CONSTANT_METHODHANDLE => "MethodHandle",
        _ => "constant",
    }
}

struct U16Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl U16Reader<'_> {
    fn next(&mut self) -> Result<u16> {
        let pair = self
            .bytes
            .get(self.pos..self.pos + 2)
            .ok_or(ConstantPoolVerifyError::MalformedBootstrapMethods)?;
        self.pos += 2;
        Ok(u16::from_be_bytes([pair[0], pair[1]]))
    }
}
