//! Constant pool and constants for Java class files
//!
//! Entries are de-duplicated and indices are 1-based, as the class-file format
//! expects. Every `add_*` returns the index of an existing identical entry
//! when there is one.

use std::collections::HashMap;

use super::error::{ConstPoolError, ConstPoolResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
}

pub mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
    pub const CONSTANT_METHODHANDLE: u8 = 15;
    pub const CONSTANT_METHODTYPE: u8 = 16;
    pub const CONSTANT_INVOKEDYNAMIC: u8 = 18;
}

impl Constant {
    pub fn tag(&self) -> u8 {
        use constant_tags::*;
        match self {
            Constant::Utf8(_) => CONSTANT_UTF8,
            Constant::Integer(_) => CONSTANT_INTEGER,
            Constant::Class(_) => CONSTANT_CLASS,
            Constant::String(_) => CONSTANT_STRING,
            Constant::FieldRef(..) => CONSTANT_FIELDREF,
            Constant::MethodRef(..) => CONSTANT_METHODREF,
            Constant::InterfaceMethodRef(..) => CONSTANT_INTERFACEMETHODREF,
            Constant::NameAndType(..) => CONSTANT_NAMEANDTYPE,
            Constant::MethodHandle(..) => CONSTANT_METHODHANDLE,
            Constant::MethodType(_) => CONSTANT_METHODTYPE,
            Constant::InvokeDynamic(..) => CONSTANT_INVOKEDYNAMIC,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::FieldRef(..) => "Fieldref",
            Constant::MethodRef(..) => "Methodref",
            Constant::InterfaceMethodRef(..) => "InterfaceMethodref",
            Constant::NameAndType(..) => "NameAndType",
            Constant::MethodHandle(..) => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::InvokeDynamic(..) => "InvokeDynamic",
        }
    }

    /// Constant-pool indices this entry refers to, with the tags they must carry.
    pub fn references(&self) -> Vec<(u16, &'static [u8])> {
        use constant_tags::*;
        const UTF8: &[u8] = &[CONSTANT_UTF8];
        const CLASS: &[u8] = &[CONSTANT_CLASS];
        const NAT: &[u8] = &[CONSTANT_NAMEANDTYPE];
        const MEMBER: &[u8] = &[CONSTANT_FIELDREF, CONSTANT_METHODREF, CONSTANT_INTERFACEMETHODREF];
        match self {
            Constant::Utf8(_) | Constant::Integer(_) => vec![],
            Constant::Class(i) | Constant::String(i) | Constant::MethodType(i) => vec![(*i, UTF8)],
            Constant::FieldRef(c, n) | Constant::MethodRef(c, n) | Constant::InterfaceMethodRef(c, n) => {
                vec![(*c, CLASS), (*n, NAT)]
            }
            Constant::NameAndType(n, d) => vec![(*n, UTF8), (*d, UTF8)],
            Constant::MethodHandle(_, r) => vec![(*r, MEMBER)],
            Constant::InvokeDynamic(_, n) => vec![(*n, NAT)],
        }
    }
}

/// `reference_kind` of a `CONSTANT_MethodHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl ReferenceKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        Some(match kind {
            1 => ReferenceKind::GetField,
            2 => ReferenceKind::GetStatic,
            3 => ReferenceKind::PutField,
            4 => ReferenceKind::PutStatic,
            5 => ReferenceKind::InvokeVirtual,
            6 => ReferenceKind::InvokeStatic,
            7 => ReferenceKind::InvokeSpecial,
            8 => ReferenceKind::NewInvokeSpecial,
            9 => ReferenceKind::InvokeInterface,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    pub(crate) constants: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries; the class-file `constant_pool_count` is this plus one.
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn get(&self, index: u16) -> ConstPoolResult<&Constant> {
        if index == 0 {
            return Err(ConstPoolError::InvalidIndex(index));
        }
        self.constants.get(index as usize - 1).ok_or(ConstPoolError::InvalidIndex(index))
    }

    /// `(index, constant)` pairs in pool order.
    pub fn entries(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.constants.iter().enumerate().map(|(i, c)| (i as u16 + 1, c))
    }

    pub fn add(&mut self, constant: Constant) -> ConstPoolResult<u16> {
        if let Some(index) = self.lookup.get(&constant) {
            return Ok(*index);
        }
        if self.constants.len() >= u16::MAX as usize - 1 {
            return Err(ConstPoolError::OutOfSpace);
        }
        self.constants.push(constant.clone());
        let index = self.constants.len() as u16;
        self.lookup.insert(constant, index);
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> ConstPoolResult<u16> {
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, name: &str) -> ConstPoolResult<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> ConstPoolResult<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name_index, descriptor_index))
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> ConstPoolResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class_index, name_and_type_index))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> ConstPoolResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef(class_index, name_and_type_index))
    }

    pub fn add_interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> ConstPoolResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef(class_index, name_and_type_index))
    }

    pub fn add_string(&mut self, value: &str) -> ConstPoolResult<u16> {
        let utf8_index = self.add_utf8(value)?;
        self.add(Constant::String(utf8_index))
    }

    pub fn add_integer(&mut self, value: i32) -> ConstPoolResult<u16> {
        self.add(Constant::Integer(value))
    }

    pub fn add_method_handle(
        &mut self,
        kind: ReferenceKind,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> ConstPoolResult<u16> {
        let reference_index = match kind {
            ReferenceKind::GetField | ReferenceKind::GetStatic | ReferenceKind::PutField | ReferenceKind::PutStatic => {
                self.add_field_ref(class, name, descriptor)?
            }
            ReferenceKind::InvokeInterface => self.add_interface_method_ref(class, name, descriptor)?,
            _ if is_interface => self.add_interface_method_ref(class, name, descriptor)?,
            _ => self.add_method_ref(class, name, descriptor)?,
        };
        self.add(Constant::MethodHandle(kind as u8, reference_index))
    }

    pub fn add_method_type(&mut self, descriptor: &str) -> ConstPoolResult<u16> {
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::MethodType(descriptor_index))
    }

    pub fn add_invoke_dynamic(&mut self, bootstrap_index: u16, name: &str, descriptor: &str) -> ConstPoolResult<u16> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InvokeDynamic(bootstrap_index, name_and_type_index))
    }

    pub fn utf8(&self, index: u16) -> ConstPoolResult<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            other => Err(ConstPoolError::WrongKind { index, expected: "Utf8", found: other.kind_name() }),
        }
    }

    pub fn class_name(&self, index: u16) -> ConstPoolResult<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(ConstPoolError::WrongKind { index, expected: "Class", found: other.kind_name() }),
        }
    }

    /// `(name, descriptor)` of a NameAndType entry.
    pub fn name_and_type(&self, index: u16) -> ConstPoolResult<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType(n, d) => Ok((self.utf8(*n)?, self.utf8(*d)?)),
            other => Err(ConstPoolError::WrongKind { index, expected: "NameAndType", found: other.kind_name() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_deduplicated_and_one_based() {
        let mut cp = ConstantPool::new();
        let a = cp.add_method_ref("java/lang/Object", "<init>", "()V").unwrap();
        let b = cp.add_method_ref("java/lang/Object", "<init>", "()V").unwrap();
        assert_eq!(a, b);
        let first = cp.entries().next().unwrap();
        assert_eq!(first.0, 1);
        assert_eq!(cp.utf8(1).unwrap(), "java/lang/Object");
        assert!(cp.get(0).is_err());
        assert_eq!(cp.class_name(2).unwrap(), "java/lang/Object");
    }

    #[test]
    fn method_handles_pick_interface_refs() {
        let mut cp = ConstantPool::new();
        let h = cp
            .add_method_handle(ReferenceKind::InvokeStatic, "I", "m", "()V", true)
            .unwrap();
        match cp.get(h).unwrap() {
            Constant::MethodHandle(kind, target) => {
                assert_eq!(*kind, 6);
                assert!(matches!(cp.get(*target).unwrap(), Constant::InterfaceMethodRef(..)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
