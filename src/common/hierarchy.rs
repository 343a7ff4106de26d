//! Type hierarchy oracle.
//!
//! Answers subtype, sealed-permits, finality and erasure queries for the
//! checker and the code generator. The oracle is assembled once with an
//! [`OracleBuilder`] and is read-only afterwards, so one instance can be shared
//! (for example behind an `Arc`) by every compilation unit of a build.

use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::ast::{ClassDecl, ClassKind, CompilationUnit, Modifier, TypeKind, TypeRef};
use crate::codegen::descriptor;
use crate::consts::{HIERARCHY_MAX_BFS_STEPS, OBJECT, OBJECT_PUBLIC_METHODS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{0} cannot be resolved to a type")]
    UnresolvedType(String),
    #[error("{0} is not an enum type")]
    NotAnEnum(String),
    #[error("{0} is not a record type")]
    NotARecord(String),
    #[error("The target type of this expression must be a functional interface: {0}")]
    NotFunctional(String),
    #[error("Cycle or excessive depth detected in the hierarchy of {0}")]
    HierarchyTooDeep(String),
}

impl ResolveError {
    pub fn unresolved(internal_name: &str) -> Self {
        ResolveError::UnresolvedType(source_name(internal_name))
    }
}

/// `p/Outer$Inner` as written in source: `p.Outer.Inner`.
pub fn source_name(internal_name: &str) -> String {
    internal_name.replace(['/', '$'], ".")
}

pub type ResolveResult<T> = Result<T, ResolveError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFlavor {
    Class,
    Interface,
    Enum,
    Record,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub name: String,
    pub descriptor: String,
    pub is_abstract: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
    pub name: String,
    pub type_ref: TypeRef,
}

/// Symbol-table view of one class or interface.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub flavor: TypeFlavor,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub permits: Vec<String>,
    pub type_params: Vec<String>,
    pub enum_constants: Vec<String>,
    pub record_components: Vec<RecordComponent>,
    pub methods: Vec<MethodSig>,
}

impl TypeInfo {
    pub fn class(name: impl Into<String>) -> Self {
        let name = name.into();
        let superclass = if name == OBJECT { None } else { Some(OBJECT.to_string()) };
        Self {
            name,
            flavor: TypeFlavor::Class,
            is_final: false,
            is_abstract: false,
            is_sealed: false,
            superclass,
            interfaces: Vec::new(),
            permits: Vec::new(),
            type_params: Vec::new(),
            enum_constants: Vec::new(),
            record_components: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let mut info = Self::class(name);
        info.flavor = TypeFlavor::Interface;
        info.is_abstract = true;
        info
    }

    pub fn enumeration(name: impl Into<String>, constants: &[&str]) -> Self {
        let mut info = Self::class(name);
        info.flavor = TypeFlavor::Enum;
        info.is_final = true;
        info.superclass = Some(crate::consts::ENUM.to_string());
        info.enum_constants = constants.iter().map(|c| c.to_string()).collect();
        info
    }

    pub fn record(name: impl Into<String>, components: Vec<RecordComponent>) -> Self {
        let mut info = Self::class(name);
        info.flavor = TypeFlavor::Record;
        info.is_final = true;
        info.superclass = Some(crate::consts::RECORD.to_string());
        info.record_components = components;
        info
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Marks the type sealed. An empty list means "infer from registered subtypes".
    pub fn sealed(mut self, permits: &[&str]) -> Self {
        self.is_sealed = true;
        self.permits = permits.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn generic(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodSig {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_abstract: true,
            is_static: false,
        });
        self
    }

    pub fn with_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodSig {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_abstract: false,
            is_static: false,
        });
        self
    }

    /// Symbol entry for a declaration of the current compilation.
    pub fn from_decl(decl: &ClassDecl) -> Self {
        let mut info = match decl.kind {
            ClassKind::Class => TypeInfo::class(decl.name.clone()),
            ClassKind::Interface => TypeInfo::interface(decl.name.clone()),
            ClassKind::Enum => {
                let constants: Vec<&str> = decl.enum_constants.iter().map(String::as_str).collect();
                TypeInfo::enumeration(decl.name.clone(), &constants)
            }
            ClassKind::Record => TypeInfo::record(
                decl.name.clone(),
                decl.record_components
                    .iter()
                    .map(|p| RecordComponent { name: p.name.clone(), type_ref: p.type_ref.clone() })
                    .collect(),
            ),
        };
        if let Some(name) = decl.extends.as_ref().and_then(TypeRef::class_name) {
            info.superclass = Some(name.to_string());
        }
        info.interfaces = decl
            .implements
            .iter()
            .filter_map(|t| t.class_name().map(str::to_string))
            .collect();
        info.is_final |= decl.has_modifier(Modifier::Final);
        info.is_abstract |= decl.has_modifier(Modifier::Abstract);
        info.is_sealed = decl.has_modifier(Modifier::Sealed);
        info.permits = decl
            .permits
            .iter()
            .filter_map(|t| t.class_name().map(str::to_string))
            .collect();
        info.type_params = decl.type_params.iter().map(|p| p.name.clone()).collect();
        for method in &decl.methods {
            let is_abstract = method.body.is_none()
                && !method.is_static()
                && (decl.is_interface() || method.has_modifier(Modifier::Abstract));
            info.methods.push(MethodSig {
                name: method.name.clone(),
                descriptor: descriptor::method_descriptor_of(method),
                is_abstract,
                is_static: method.is_static(),
            });
        }
        info
    }
}

/// Single abstract method of a functional interface, plus the erasure-distinct
/// descriptors of the same method inherited from superinterfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionalMethod {
    pub interface: String,
    pub name: String,
    pub descriptor: String,
    pub bridges: Vec<String>,
}

static BUILTIN_TYPES: Lazy<Vec<TypeInfo>> = Lazy::new(|| {
    let comparable = "java/lang/Comparable";
    let serializable = "java/io/Serializable";
    let number = "java/lang/Number";
    let mut types = vec![
        TypeInfo::class(OBJECT),
        TypeInfo::interface(serializable),
        TypeInfo::interface("java/lang/Cloneable"),
        TypeInfo::interface("java/lang/CharSequence"),
        TypeInfo::interface(comparable).generic(&["T"]).with_abstract_method("compareTo", "(Ljava/lang/Object;)I"),
        TypeInfo::class("java/lang/String")
            .final_()
            .implements(serializable)
            .implements(comparable)
            .implements("java/lang/CharSequence"),
        TypeInfo::class(number).abstract_().implements(serializable),
        TypeInfo::class("java/lang/Boolean").final_().implements(serializable).implements(comparable),
        TypeInfo::class("java/lang/Character").final_().implements(serializable).implements(comparable),
        TypeInfo::class(crate::consts::ENUM).abstract_().generic(&["E"]).implements(comparable).implements(serializable),
        TypeInfo::class(crate::consts::RECORD).abstract_(),
        TypeInfo::class("java/lang/Throwable").implements(serializable),
        TypeInfo::class("java/lang/Exception").extends("java/lang/Throwable"),
        TypeInfo::class("java/lang/Error").extends("java/lang/Throwable"),
        TypeInfo::class("java/lang/RuntimeException").extends("java/lang/Exception"),
        TypeInfo::class("java/lang/IllegalArgumentException").extends("java/lang/RuntimeException"),
        TypeInfo::class("java/lang/IllegalStateException").extends("java/lang/RuntimeException"),
        TypeInfo::class("java/lang/MatchException").final_().extends("java/lang/RuntimeException"),
        TypeInfo::class("java/lang/Thread").implements("java/lang/Runnable"),
        TypeInfo::interface("java/lang/Runnable").with_abstract_method("run", "()V"),
        TypeInfo::interface("java/lang/Iterable").generic(&["T"]),
        TypeInfo::interface("java/util/Collection").generic(&["E"]).implements("java/lang/Iterable"),
        TypeInfo::interface("java/util/List").generic(&["E"]).implements("java/util/Collection"),
        TypeInfo::interface("java/util/Map").generic(&["K", "V"]),
        TypeInfo::interface("java/util/concurrent/Callable")
            .generic(&["V"])
            .with_abstract_method("call", "()Ljava/lang/Object;"),
        TypeInfo::interface("java/util/Comparator")
            .generic(&["T"])
            .with_abstract_method("compare", "(Ljava/lang/Object;Ljava/lang/Object;)I")
            .with_abstract_method("equals", "(Ljava/lang/Object;)Z"),
        TypeInfo::interface("java/util/function/Function")
            .generic(&["T", "R"])
            .with_abstract_method("apply", "(Ljava/lang/Object;)Ljava/lang/Object;"),
        TypeInfo::interface("java/util/function/BiFunction")
            .generic(&["T", "U", "R"])
            .with_abstract_method("apply", "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;"),
        TypeInfo::interface("java/util/function/Supplier")
            .generic(&["T"])
            .with_abstract_method("get", "()Ljava/lang/Object;"),
        TypeInfo::interface("java/util/function/Consumer")
            .generic(&["T"])
            .with_abstract_method("accept", "(Ljava/lang/Object;)V"),
        TypeInfo::interface("java/util/function/Predicate")
            .generic(&["T"])
            .with_abstract_method("test", "(Ljava/lang/Object;)Z"),
        TypeInfo::interface("java/util/function/IntSupplier").with_abstract_method("getAsInt", "()I"),
        TypeInfo::interface("java/util/function/IntUnaryOperator").with_abstract_method("applyAsInt", "(I)I"),
        TypeInfo::interface("java/util/function/ToIntFunction")
            .generic(&["T"])
            .with_abstract_method("applyAsInt", "(Ljava/lang/Object;)I"),
    ];
    for boxed in [
        "java/lang/Byte",
        "java/lang/Short",
        "java/lang/Integer",
        "java/lang/Long",
        "java/lang/Float",
        "java/lang/Double",
    ] {
        types.push(TypeInfo::class(boxed).final_().extends(number).implements(comparable));
    }
    types
});

/// Collects type entries; `build` freezes them into a [`TypeHierarchyOracle`].
#[derive(Debug, Clone)]
pub struct OracleBuilder {
    types: HashMap<String, TypeInfo>,
    order: Vec<String>,
}

impl OracleBuilder {
    /// Builder pre-populated with the `java.lang` / `java.util.function` types the core relies on.
    pub fn new() -> Self {
        let mut builder = Self::empty();
        for info in BUILTIN_TYPES.iter() {
            builder = builder.register(info.clone());
        }
        builder
    }

    pub fn empty() -> Self {
        Self { types: HashMap::new(), order: Vec::new() }
    }

    pub fn register(mut self, info: TypeInfo) -> Self {
        if !self.types.contains_key(&info.name) {
            self.order.push(info.name.clone());
        }
        self.types.insert(info.name.clone(), info);
        self
    }

    pub fn register_decl(self, decl: &ClassDecl) -> Self {
        self.register(TypeInfo::from_decl(decl))
    }

    pub fn register_unit(mut self, unit: &CompilationUnit) -> Self {
        for decl in &unit.types {
            self = self.register_decl(decl);
        }
        self
    }

    pub fn build(mut self) -> TypeHierarchyOracle {
        // A sealed type without a permits clause permits its direct subtypes.
        let inferred: Vec<(String, Vec<String>)> = self
            .order
            .iter()
            .filter(|name| self.types.get(*name).map_or(false, |t| t.is_sealed && t.permits.is_empty()))
            .map(|sealed| {
                let subs = self
                    .order
                    .iter()
                    .filter(|candidate| {
                        self.types.get(*candidate).map_or(false, |t| {
                            t.superclass.as_deref() == Some(sealed.as_str()) || t.interfaces.contains(sealed)
                        })
                    })
                    .cloned()
                    .collect();
                (sealed.clone(), subs)
            })
            .collect();
        for (sealed, subs) in inferred {
            log::trace!("inferred permits for {}: {:?}", sealed, subs);
            if let Some(info) = self.types.get_mut(&sealed) {
                info.permits = subs;
            }
        }
        TypeHierarchyOracle { types: self.types }
    }
}

impl Default for OracleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TypeHierarchyOracle {
    types: HashMap<String, TypeInfo>,
}

impl TypeHierarchyOracle {
    pub fn builder() -> OracleBuilder {
        OracleBuilder::new()
    }

    /// Oracle holding only the built-in types.
    pub fn with_builtins() -> Self {
        OracleBuilder::new().build()
    }

    pub fn lookup(&self, name: &str) -> ResolveResult<&TypeInfo> {
        self.types.get(name).ok_or_else(|| ResolveError::unresolved(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Name-based subtyping over the class/interface graph.
    pub fn is_subclass(&self, sub: &str, sup: &str) -> ResolveResult<bool> {
        self.lookup(sub)?;
        self.lookup(sup)?;
        if sub == sup || sup == OBJECT {
            return Ok(true);
        }
        let mut queue = VecDeque::from([sub.to_string()]);
        let mut seen = HashSet::new();
        let mut steps = 0usize;
        while let Some(current) = queue.pop_front() {
            steps += 1;
            if steps > HIERARCHY_MAX_BFS_STEPS {
                return Err(ResolveError::HierarchyTooDeep(source_name(sub)));
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if current == sup {
                return Ok(true);
            }
            let info = self.lookup(&current)?;
            if let Some(superclass) = &info.superclass {
                queue.push_back(superclass.clone());
            }
            queue.extend(info.interfaces.iter().cloned());
        }
        Ok(false)
    }

    /// `a <: b` after erasing both sides.
    pub fn is_subtype(&self, a: &TypeRef, b: &TypeRef) -> ResolveResult<bool> {
        let a = Self::erase(a);
        let b = Self::erase(b);
        if a.is_primitive() || b.is_primitive() {
            return Ok(a == b);
        }
        if a.array_dims > 0 {
            if b.array_dims == 0 {
                let name = b.class_name().unwrap_or(OBJECT);
                return Ok(matches!(name, "java/lang/Object" | "java/lang/Cloneable" | "java/io/Serializable"));
            }
            let (ae, be) = match (a.element_type(), b.element_type()) {
                (Some(ae), Some(be)) => (ae, be),
                _ => return Ok(false),
            };
            if ae.is_primitive() || be.is_primitive() {
                return Ok(ae == be);
            }
            return self.is_subtype(&ae, &be);
        }
        if b.array_dims > 0 {
            return Ok(false);
        }
        match (a.class_name(), b.class_name()) {
            (Some(sub), Some(sup)) => self.is_subclass(sub, sup),
            _ => Ok(false),
        }
    }

    /// `None` when `name` is not sealed.
    pub fn sealed_permits(&self, name: &str) -> ResolveResult<Option<&[String]>> {
        let info = self.lookup(name)?;
        Ok(if info.is_sealed { Some(&info.permits) } else { None })
    }

    pub fn is_final(&self, name: &str) -> ResolveResult<bool> {
        let info = self.lookup(name)?;
        Ok(info.is_final || matches!(info.flavor, TypeFlavor::Enum | TypeFlavor::Record))
    }

    /// Type arguments and owner types dropped, type variables replaced by their bound.
    pub fn erase(t: &TypeRef) -> TypeRef {
        match &t.kind {
            TypeKind::Primitive(_) => t.clone(),
            TypeKind::Class { name, .. } => TypeRef::class(name.clone()).array_of(t.array_dims),
            TypeKind::TypeVar { bound, .. } => {
                let erased = bound.as_deref().map(Self::erase).unwrap_or_else(TypeRef::object);
                erased.array_of(t.array_dims)
            }
        }
    }

    pub fn is_interface(&self, name: &str) -> ResolveResult<bool> {
        Ok(self.lookup(name)?.flavor == TypeFlavor::Interface)
    }

    /// Interfaces and abstract classes have no direct instances.
    pub fn is_abstract(&self, name: &str) -> ResolveResult<bool> {
        let info = self.lookup(name)?;
        Ok(info.is_abstract || info.flavor == TypeFlavor::Interface)
    }

    pub fn is_enum(&self, name: &str) -> ResolveResult<bool> {
        Ok(self.lookup(name)?.flavor == TypeFlavor::Enum)
    }

    pub fn is_record(&self, name: &str) -> ResolveResult<bool> {
        Ok(self.lookup(name)?.flavor == TypeFlavor::Record)
    }

    pub fn is_generic(&self, name: &str) -> ResolveResult<bool> {
        Ok(!self.lookup(name)?.type_params.is_empty())
    }

    pub fn enum_constants(&self, name: &str) -> ResolveResult<&[String]> {
        let info = self.lookup(name)?;
        if info.flavor != TypeFlavor::Enum {
            return Err(ResolveError::NotAnEnum(source_name(name)));
        }
        Ok(&info.enum_constants)
    }

    pub fn record_components(&self, name: &str) -> ResolveResult<&[RecordComponent]> {
        let info = self.lookup(name)?;
        if info.flavor != TypeFlavor::Record {
            return Err(ResolveError::NotARecord(source_name(name)));
        }
        Ok(&info.record_components)
    }

    /// Wrapper type for primitives; reference types are returned erased.
    pub fn boxed(t: &TypeRef) -> TypeRef {
        match t.primitive_type().and_then(|p| p.box_class()) {
            Some(wrapper) => TypeRef::class(wrapper),
            None => Self::erase(t),
        }
    }

    /// Locates the single abstract method of a functional interface.
    pub fn functional_method(&self, interface: &str) -> ResolveResult<FunctionalMethod> {
        if !self.is_interface(interface)? {
            return Err(ResolveError::NotFunctional(source_name(interface)));
        }
        let mut abstract_methods: Vec<(String, String)> = Vec::new();
        let mut concrete: HashSet<(String, String)> = HashSet::new();
        let mut queue = VecDeque::from([interface.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if seen.len() > HIERARCHY_MAX_BFS_STEPS {
                return Err(ResolveError::HierarchyTooDeep(source_name(interface)));
            }
            let info = self.lookup(&current)?;
            for m in info.methods.iter().filter(|m| !m.is_static) {
                let key = (m.name.clone(), m.descriptor.clone());
                if !m.is_abstract {
                    concrete.insert(key);
                    continue;
                }
                let is_object_method = OBJECT_PUBLIC_METHODS
                    .iter()
                    .any(|(n, d)| *n == m.name && *d == m.descriptor);
                if is_object_method || concrete.contains(&key) || abstract_methods.contains(&key) {
                    continue;
                }
                abstract_methods.push(key);
            }
            queue.extend(info.interfaces.iter().cloned());
        }
        let (name, descriptor) = match abstract_methods.first() {
            Some(first) => first.clone(),
            None => return Err(ResolveError::NotFunctional(source_name(interface))),
        };
        if abstract_methods.iter().any(|(n, _)| *n != name) {
            return Err(ResolveError::NotFunctional(source_name(interface)));
        }
        let bridges = abstract_methods
            .into_iter()
            .skip(1)
            .map(|(_, d)| d)
            .filter(|d| *d != descriptor)
            .collect();
        Ok(FunctionalMethod { interface: interface.to_string(), name, descriptor, bridges })
    }
}
