//! MethodInfo structure

use super::attribute::AttributeInfo;
use super::constpool::ConstantPool;
use super::error::ConstPoolResult;

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    pub fn new(access_flags: u16, name_index: u16, descriptor_index: u16) -> Self {
        Self { access_flags, name_index, descriptor_index, attributes: Vec::new() }
    }

    pub fn name<'a>(&self, constant_pool: &'a ConstantPool) -> ConstPoolResult<&'a str> {
        constant_pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, constant_pool: &'a ConstantPool) -> ConstPoolResult<&'a str> {
        constant_pool.utf8(self.descriptor_index)
    }

    pub fn attribute<'a>(&'a self, constant_pool: &ConstantPool, name: &str) -> Option<&'a AttributeInfo> {
        self.attributes.iter().find(|a| a.name(constant_pool).map_or(false, |n| n == name))
    }
}
