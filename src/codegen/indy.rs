//! Call-site synthesis for `invokedynamic`.
//!
//! Each `build_*` method records one bootstrap entry (or reuses an identical
//! one) and interns the `CONSTANT_InvokeDynamic` the instruction refers to.

use crate::ast::{FunctionalTarget, MethodRefExpr, MethodRefKind};
use crate::common::hierarchy::{FunctionalMethod, TypeHierarchyOracle};
use crate::consts::{SERIALIZABLE, STRING_CONCAT_MAX_ARGS};

use super::bootstrap::{BootstrapArg, BootstrapKind, BootstrapMethodEntry, BootstrapMethodsTable};
use super::constpool::{ConstantPool, ReferenceKind};
use super::defs::{lambda_flags, CONSTRUCTOR_METHOD_NAME};
use super::descriptor::class_constant_name;
use super::error::{CodeGenError, CodeGenResult};

const RECIPE_ARG: char = '\u{1}';
const RECIPE_CONSTANT: char = '\u{2}';

/// Operands of one `invokedynamic` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteDescriptor {
    pub bootstrap_index: u16,
    /// Pool index of the `CONSTANT_InvokeDynamic`.
    pub pool_index: u16,
    pub name: String,
    pub descriptor: String,
}

/// The method a lambda or method reference is linked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplMethod {
    pub kind: ReferenceKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

impl ImplMethod {
    fn handle(&self) -> BootstrapArg {
        BootstrapArg::MethodHandle {
            kind: self.kind,
            owner: self.owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            is_interface: self.is_interface,
        }
    }
}

/// A linked lambda or method reference. Serializable ones feed `$deserializeLambda$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionalCallSite {
    pub call_site: CallSiteDescriptor,
    pub interface: String,
    pub sam: FunctionalMethod,
    pub implementation: ImplMethod,
    /// Descriptors of the captured values, in call-site order.
    pub captured: Vec<String>,
    pub instantiated: String,
    pub serializable: bool,
}

/// One piece of a string concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatPart {
    Constant(String),
    /// A dynamic argument with the given field descriptor.
    Arg(String),
}

/// A static label of a `typeSwitch`/`enumSwitch` call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchLabel {
    Class(String),
    Int(i32),
    Str(String),
    /// Constant name; only valid for `enumSwitch`.
    EnumName(String),
}

pub struct InvokeDynamicSiteBuilder<'a> {
    oracle: &'a TypeHierarchyOracle,
    cp: &'a mut ConstantPool,
    table: &'a mut BootstrapMethodsTable,
}

impl<'a> InvokeDynamicSiteBuilder<'a> {
    pub fn new(oracle: &'a TypeHierarchyOracle, cp: &'a mut ConstantPool, table: &'a mut BootstrapMethodsTable) -> Self {
        Self { oracle, cp, table }
    }

    /// A lambda whose body was lifted into `implementation`; `captured` are the
    /// descriptors of the values pushed before the call site (receiver first).
    pub fn build_lambda(
        &mut self,
        target: &FunctionalTarget,
        implementation: ImplMethod,
        captured: Vec<String>,
        instantiated: &str,
    ) -> CodeGenResult<FunctionalCallSite> {
        self.link(target, implementation, captured, instantiated)
    }

    /// For `expr::name` the receiver is the single captured value.
    pub fn build_method_ref(&mut self, mref: &MethodRefExpr) -> CodeGenResult<FunctionalCallSite> {
        let (kind, name, captured) = match &mref.kind {
            MethodRefKind::Static => (ReferenceKind::InvokeStatic, mref.name.clone(), Vec::new()),
            MethodRefKind::Bound(_) => (virtual_kind(mref.owner_is_interface), mref.name.clone(), vec![format!("L{};", mref.owner)]),
            MethodRefKind::Unbound => (virtual_kind(mref.owner_is_interface), mref.name.clone(), Vec::new()),
            MethodRefKind::Constructor => (ReferenceKind::NewInvokeSpecial, CONSTRUCTOR_METHOD_NAME.to_string(), Vec::new()),
        };
        let implementation = ImplMethod {
            kind,
            owner: mref.owner.clone(),
            name,
            descriptor: mref.descriptor.clone(),
            is_interface: mref.owner_is_interface,
        };
        self.link(&mref.target, implementation, captured, &mref.instantiated)
    }

    fn link(
        &mut self,
        target: &FunctionalTarget,
        implementation: ImplMethod,
        captured: Vec<String>,
        instantiated: &str,
    ) -> CodeGenResult<FunctionalCallSite> {
        let interface = class_constant_name(&target.interface);
        let sam = self.oracle.functional_method(&interface)?;
        let serializable = self.is_serializable(target)?;
        let mut markers = Vec::new();
        for marker in &target.markers {
            let name = class_constant_name(marker);
            if name != SERIALIZABLE && name != interface {
                markers.push(name);
            }
        }

        let mut flags = 0;
        if serializable {
            flags |= lambda_flags::FLAG_SERIALIZABLE;
        }
        if !markers.is_empty() {
            flags |= lambda_flags::FLAG_MARKERS;
        }
        if !sam.bridges.is_empty() {
            flags |= lambda_flags::FLAG_BRIDGES;
        }

        let mut args = vec![
            BootstrapArg::MethodType(sam.descriptor.clone()),
            implementation.handle(),
            BootstrapArg::MethodType(instantiated.to_string()),
        ];
        let kind = if flags == 0 {
            BootstrapKind::Metafactory
        } else {
            // flags, then markers, then bridges: LambdaMetafactory reads them positionally
            args.push(BootstrapArg::Int(flags));
            if !markers.is_empty() {
                args.push(BootstrapArg::Int(markers.len() as i32));
                args.extend(markers.iter().cloned().map(BootstrapArg::Class));
            }
            if !sam.bridges.is_empty() {
                args.push(BootstrapArg::Int(sam.bridges.len() as i32));
                args.extend(sam.bridges.iter().cloned().map(BootstrapArg::MethodType));
            }
            BootstrapKind::AltMetafactory
        };
        log::debug!(
            "linking {}::{} to {} via {} (flags={})",
            interface,
            sam.name,
            implementation.name,
            kind.method_name(),
            flags
        );

        let descriptor = format!("({})L{};", captured.concat(), interface);
        let call_site = self.call_site(BootstrapMethodEntry::new(kind, args), &sam.name, descriptor)?;
        Ok(FunctionalCallSite {
            call_site,
            interface,
            sam,
            implementation,
            captured,
            instantiated: instantiated.to_string(),
            serializable,
        })
    }

    fn is_serializable(&self, target: &FunctionalTarget) -> CodeGenResult<bool> {
        for t in std::iter::once(&target.interface).chain(&target.markers) {
            let name = class_constant_name(t);
            if self.oracle.is_subclass(&name, SERIALIZABLE)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `makeConcatWithConstants`. Constants holding a recipe tag character are
    /// passed as separate static arguments.
    pub fn build_string_concat(&mut self, parts: &[ConcatPart]) -> CodeGenResult<CallSiteDescriptor> {
        let mut recipe = String::new();
        let mut constants = Vec::new();
        let mut arg_descriptors = Vec::new();
        for part in parts {
            match part {
                ConcatPart::Arg(descriptor) => {
                    recipe.push(RECIPE_ARG);
                    arg_descriptors.push(descriptor.as_str());
                }
                ConcatPart::Constant(text) if text.contains([RECIPE_ARG, RECIPE_CONSTANT]) => {
                    recipe.push(RECIPE_CONSTANT);
                    constants.push(BootstrapArg::String(text.clone()));
                }
                ConcatPart::Constant(text) => recipe.push_str(text),
            }
        }
        if arg_descriptors.len() > STRING_CONCAT_MAX_ARGS {
            return Err(CodeGenError::unsupported(format!(
                "string concatenation with {} operands",
                arg_descriptors.len()
            )));
        }
        let mut args = vec![BootstrapArg::String(recipe)];
        args.extend(constants);
        let descriptor = format!("({})Ljava/lang/String;", arg_descriptors.concat());
        self.call_site(BootstrapMethodEntry::new(BootstrapKind::StringConcat, args), "makeConcatWithConstants", descriptor)
    }

    /// `typeSwitch` over a reference selector with erased descriptor `selector`.
    pub fn build_type_switch(&mut self, selector: &str, labels: &[SwitchLabel]) -> CodeGenResult<CallSiteDescriptor> {
        let args = labels
            .iter()
            .map(|label| match label {
                SwitchLabel::EnumName(name) => {
                    Err(CodeGenError::unsupported(format!("enum constant {} as a typeSwitch label", name)))
                }
                other => Ok(switch_arg(other)),
            })
            .collect::<CodeGenResult<Vec<_>>>()?;
        let descriptor = format!("({}I)I", selector);
        self.call_site(BootstrapMethodEntry::new(BootstrapKind::TypeSwitch, args), "typeSwitch", descriptor)
    }

    /// `enumSwitch` over `enum_class`: constant names and type patterns.
    pub fn build_enum_switch(&mut self, enum_class: &str, labels: &[SwitchLabel]) -> CodeGenResult<CallSiteDescriptor> {
        let args = labels.iter().map(switch_arg).collect();
        let descriptor = format!("(L{};I)I", enum_class);
        self.call_site(BootstrapMethodEntry::new(BootstrapKind::EnumSwitch, args), "enumSwitch", descriptor)
    }

    fn call_site(&mut self, entry: BootstrapMethodEntry, name: &str, descriptor: String) -> CodeGenResult<CallSiteDescriptor> {
        let bootstrap_index = self.table.add(self.cp, entry)?;
        let pool_index = self.cp.add_invoke_dynamic(bootstrap_index, name, &descriptor)?;
        Ok(CallSiteDescriptor { bootstrap_index, pool_index, name: name.to_string(), descriptor })
    }
}

fn virtual_kind(is_interface: bool) -> ReferenceKind {
    if is_interface {
        ReferenceKind::InvokeInterface
    } else {
        ReferenceKind::InvokeVirtual
    }
}

fn switch_arg(label: &SwitchLabel) -> BootstrapArg {
    match label {
        SwitchLabel::Class(name) => BootstrapArg::Class(name.clone()),
        SwitchLabel::Int(v) => BootstrapArg::Int(*v),
        SwitchLabel::Str(s) | SwitchLabel::EnumName(s) => BootstrapArg::String(s.clone()),
    }
}
