//! BootstrapMethods table of one class.
//!
//! Every `invokedynamic` call site names its bootstrap method by position in
//! this table, so entries are only ever appended and an index handed out is
//! never invalidated. Identical entries (the same method reference twice, two
//! type switches over the same labels) share one slot; lambda entries never
//! compare equal because each names its own synthetic body method.

use super::attribute::AttributeInfo;
use super::constpool::{ConstantPool, ReferenceKind};
use super::error::ConstPoolResult;

const LOOKUP: &str = "Ljava/lang/invoke/MethodHandles$Lookup;";
const CALL_SITE: &str = "Ljava/lang/invoke/CallSite;";

/// The bootstrap methods this compiler knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapKind {
    Metafactory,
    AltMetafactory,
    StringConcat,
    TypeSwitch,
    EnumSwitch,
}

impl BootstrapKind {
    pub fn owner(self) -> &'static str {
        match self {
            BootstrapKind::Metafactory | BootstrapKind::AltMetafactory => "java/lang/invoke/LambdaMetafactory",
            BootstrapKind::StringConcat => "java/lang/invoke/StringConcatFactory",
            BootstrapKind::TypeSwitch | BootstrapKind::EnumSwitch => "java/lang/runtime/SwitchBootstraps",
        }
    }

    pub fn method_name(self) -> &'static str {
        match self {
            BootstrapKind::Metafactory => "metafactory",
            BootstrapKind::AltMetafactory => "altMetafactory",
            BootstrapKind::StringConcat => "makeConcatWithConstants",
            BootstrapKind::TypeSwitch => "typeSwitch",
            BootstrapKind::EnumSwitch => "enumSwitch",
        }
    }

    pub fn descriptor(self) -> String {
        let prefix = format!("({}Ljava/lang/String;Ljava/lang/invoke/MethodType;", LOOKUP);
        match self {
            BootstrapKind::Metafactory => format!(
                "{}Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;){}",
                prefix, CALL_SITE
            ),
            BootstrapKind::StringConcat => format!("{}Ljava/lang/String;[Ljava/lang/Object;){}", prefix, CALL_SITE),
            BootstrapKind::AltMetafactory | BootstrapKind::TypeSwitch | BootstrapKind::EnumSwitch => {
                format!("{}[Ljava/lang/Object;){}", prefix, CALL_SITE)
            }
        }
    }

    pub fn is_lambda(self) -> bool {
        matches!(self, BootstrapKind::Metafactory | BootstrapKind::AltMetafactory)
    }
}

/// A static argument, before it is interned in the constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BootstrapArg {
    Int(i32),
    String(String),
    /// Internal name of a class or interface.
    Class(String),
    MethodType(String),
    MethodHandle { kind: ReferenceKind, owner: String, name: String, descriptor: String, is_interface: bool },
}

impl BootstrapArg {
    fn intern(&self, cp: &mut ConstantPool) -> ConstPoolResult<u16> {
        match self {
            BootstrapArg::Int(v) => cp.add_integer(*v),
            BootstrapArg::String(s) => cp.add_string(s),
            BootstrapArg::Class(name) => cp.add_class(name),
            BootstrapArg::MethodType(descriptor) => cp.add_method_type(descriptor),
            BootstrapArg::MethodHandle { kind, owner, name, descriptor, is_interface } => {
                cp.add_method_handle(*kind, owner, name, descriptor, *is_interface)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethodEntry {
    pub kind: BootstrapKind,
    pub args: Vec<BootstrapArg>,
}

impl BootstrapMethodEntry {
    pub fn new(kind: BootstrapKind, args: Vec<BootstrapArg>) -> Self {
        Self { kind, args }
    }
}

/// Pool indices of one entry, in class-file order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedEntry {
    method_ref: u16,
    args: Vec<u16>,
}

#[derive(Debug, Default, Clone)]
pub struct BootstrapMethodsTable {
    entries: Vec<BootstrapMethodEntry>,
    resolved: Vec<ResolvedEntry>,
}

impl BootstrapMethodsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&BootstrapMethodEntry> {
        self.entries.get(index as usize)
    }

    pub fn entries(&self) -> &[BootstrapMethodEntry] {
        &self.entries
    }

    /// Index of `entry`, appending it (and interning its constants) when no
    /// identical entry exists yet.
    pub fn add(&mut self, cp: &mut ConstantPool, entry: BootstrapMethodEntry) -> ConstPoolResult<u16> {
        if let Some(existing) = self.entries.iter().position(|e| *e == entry) {
            log::trace!("bootstrap entry #{} reused for {}", existing, entry.kind.method_name());
            return Ok(existing as u16);
        }
        let method_ref = cp.add_method_handle(
            ReferenceKind::InvokeStatic,
            entry.kind.owner(),
            entry.kind.method_name(),
            &entry.kind.descriptor(),
            false,
        )?;
        let args = entry.args.iter().map(|a| a.intern(cp)).collect::<ConstPoolResult<Vec<_>>>()?;
        let index = self.entries.len();
        log::trace!("bootstrap entry #{}: {} with {} static args", index, entry.kind.method_name(), args.len());
        self.entries.push(entry);
        self.resolved.push(ResolvedEntry { method_ref, args });
        assert_eq!(self.entries.len(), self.resolved.len(), "bootstrap entries and their pool indices diverged");
        Ok(index as u16)
    }

    /// Attribute body: `num_bootstrap_methods` followed by each entry.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.resolved.len() as u16).to_be_bytes());
        for entry in &self.resolved {
            bytes.extend_from_slice(&entry.method_ref.to_be_bytes());
            bytes.extend_from_slice(&(entry.args.len() as u16).to_be_bytes());
            for arg in &entry.args {
                bytes.extend_from_slice(&arg.to_be_bytes());
            }
        }
        bytes
    }

    /// `None` when no call site was emitted.
    pub fn to_attribute(&self, cp: &mut ConstantPool) -> ConstPoolResult<Option<AttributeInfo>> {
        if self.is_empty() {
            return Ok(None);
        }
        AttributeInfo::named(cp, "BootstrapMethods", self.to_bytes()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::constpool::Constant;

    fn type_switch(labels: &[&str]) -> BootstrapMethodEntry {
        BootstrapMethodEntry::new(
            BootstrapKind::TypeSwitch,
            labels.iter().map(|l| BootstrapArg::Class(l.to_string())).collect(),
        )
    }

    #[test]
    fn identical_entries_share_an_index() {
        let mut cp = ConstantPool::new();
        let mut table = BootstrapMethodsTable::new();
        let a = table.add(&mut cp, type_switch(&["java/lang/String"])).unwrap();
        let b = table.add(&mut cp, type_switch(&["java/lang/Integer"])).unwrap();
        let c = table.add(&mut cp, type_switch(&["java/lang/String"])).unwrap();
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn entry_bytes_reference_method_handles() {
        let mut cp = ConstantPool::new();
        let mut table = BootstrapMethodsTable::new();
        table
            .add(&mut cp, BootstrapMethodEntry::new(BootstrapKind::StringConcat, vec![BootstrapArg::String("\u{1}!".into())]))
            .unwrap();
        let bytes = table.to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 1);
        let handle = u16::from_be_bytes([bytes[2], bytes[3]]);
        assert!(matches!(cp.get(handle).unwrap(), Constant::MethodHandle(6, _)));
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 1);
        let arg = u16::from_be_bytes([bytes[6], bytes[7]]);
        assert!(matches!(cp.get(arg).unwrap(), Constant::String(_)));
    }

    #[test]
    fn empty_table_has_no_attribute() {
        let mut cp = ConstantPool::new();
        assert!(BootstrapMethodsTable::new().to_attribute(&mut cp).unwrap().is_none());
    }

    #[test]
    fn switch_bootstrap_descriptor() {
        assert_eq!(
            BootstrapKind::TypeSwitch.descriptor(),
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;"
        );
    }
}
