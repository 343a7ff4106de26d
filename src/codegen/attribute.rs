//! Attribute structures for Java class files

use super::constpool::ConstantPool;
use super::error::ConstPoolResult;

/// A serialized attribute: name index plus raw `info` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn named(constant_pool: &mut ConstantPool, name: &str, info: Vec<u8>) -> ConstPoolResult<Self> {
        Ok(Self::new(constant_pool.add_utf8(name)?, info))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6 + self.info.len());
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&(self.info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.info);
        bytes
    }

    /// Attribute name, looked up in the pool it was created against.
    pub fn name<'a>(&self, constant_pool: &'a ConstantPool) -> ConstPoolResult<&'a str> {
        constant_pool.utf8(self.name_index)
    }
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self { max_stack, max_locals, code, attributes: Vec::new() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.max_stack.to_be_bytes());
        bytes.extend_from_slice(&self.max_locals.to_be_bytes());
        bytes.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.code);
        // No exception handlers are generated.
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&(self.attributes.len() as u16).to_be_bytes());
        for attribute in &self.attributes {
            bytes.extend_from_slice(&attribute.to_bytes());
        }
        bytes
    }

    /// Parses the fixed part of a `Code` attribute body back into `(max_stack, max_locals, code)`.
    pub fn parse(info: &[u8]) -> Option<(u16, u16, &[u8])> {
        let max_stack = u16::from_be_bytes([*info.first()?, *info.get(1)?]);
        let max_locals = u16::from_be_bytes([*info.get(2)?, *info.get(3)?]);
        let len = u32::from_be_bytes([*info.get(4)?, *info.get(5)?, *info.get(6)?, *info.get(7)?]) as usize;
        let code = info.get(8..8 + len)?;
        Some((max_stack, max_locals, code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

pub fn make_line_number_table_attribute(
    constant_pool: &mut ConstantPool,
    entries: &[LineNumberEntry],
) -> ConstPoolResult<AttributeInfo> {
    let mut info = Vec::with_capacity(2 + entries.len() * 4);
    info.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for e in entries {
        info.extend_from_slice(&e.start_pc.to_be_bytes());
        info.extend_from_slice(&e.line_number.to_be_bytes());
    }
    AttributeInfo::named(constant_pool, "LineNumberTable", info)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

pub fn make_local_variable_table_attribute(
    constant_pool: &mut ConstantPool,
    entries: &[LocalVariableEntry],
) -> ConstPoolResult<AttributeInfo> {
    let mut info = Vec::with_capacity(2 + entries.len() * 10);
    info.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for e in entries {
        info.extend_from_slice(&e.start_pc.to_be_bytes());
        info.extend_from_slice(&e.length.to_be_bytes());
        info.extend_from_slice(&constant_pool.add_utf8(&e.name)?.to_be_bytes());
        info.extend_from_slice(&constant_pool.add_utf8(&e.descriptor)?.to_be_bytes());
        info.extend_from_slice(&e.index.to_be_bytes());
    }
    AttributeInfo::named(constant_pool, "LocalVariableTable", info)
}

pub fn make_signature_attribute(constant_pool: &mut ConstantPool, signature: &str) -> ConstPoolResult<AttributeInfo> {
    let index = constant_pool.add_utf8(signature)?;
    AttributeInfo::named(constant_pool, "Signature", index.to_be_bytes().to_vec())
}

pub fn make_source_file_attribute(constant_pool: &mut ConstantPool, file: &str) -> ConstPoolResult<AttributeInfo> {
    let index = constant_pool.add_utf8(file)?;
    AttributeInfo::named(constant_pool, "SourceFile", index.to_be_bytes().to_vec())
}

/// One `InnerClasses` entry for a referenced nested class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access_flags: u16,
}

pub fn make_inner_classes_attribute(
    constant_pool: &mut ConstantPool,
    entries: &[InnerClassEntry],
) -> ConstPoolResult<AttributeInfo> {
    let mut info = Vec::with_capacity(2 + entries.len() * 8);
    info.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for e in entries {
        info.extend_from_slice(&constant_pool.add_class(&e.inner)?.to_be_bytes());
        let outer = match &e.outer {
            Some(o) => constant_pool.add_class(o)?,
            None => 0,
        };
        info.extend_from_slice(&outer.to_be_bytes());
        let name = match &e.simple_name {
            Some(n) => constant_pool.add_utf8(n)?,
            None => 0,
        };
        info.extend_from_slice(&name.to_be_bytes());
        info.extend_from_slice(&e.access_flags.to_be_bytes());
    }
    AttributeInfo::named(constant_pool, "InnerClasses", info)
}
