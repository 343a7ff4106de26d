//! jpatc: pattern-switch checking and invokedynamic lowering for a Java-like compiler.
//!
//! ## Architecture
//!
//! The crate starts from an attributed syntax tree (names resolved, every
//! expression typed) and ends with class-file bytes:
//!
//! - **common**: the [`TypeHierarchyOracle`] and diagnostics shared by every pass
//! - **review**: switch review (dominance, fall-through, exhaustiveness)
//! - **wash**: per-method semantic analysis, including lambda capture checks
//! - **codegen**: class writer, switch lowering, invokedynamic sites, signatures
//! - **verify**: structural checks on the generated class file
//!
//! ## Compilation Flow
//!
//! ```text
//! ClassDecl → Wash (review + capture) → ClassWriter → Verify → .class bytes
//!                                            ↓
//!                          Gen → SwitchLowering / InvokeDynamicSiteBuilder
//! ```

pub mod ast;
pub mod codegen;
pub mod common;
pub mod config;
pub mod consts;
pub mod error;
pub mod review;
pub mod verify;
pub mod wash;

use std::path::{Path, PathBuf};

pub use common::{Diagnostic, Severity, TypeHierarchyOracle};
pub use config::Config;
pub use error::{Error, Result};

use ast::{ClassDecl, ClassKind, CompilationUnit};
use codegen::{class_file_to_bytes, ClassFile, ClassWriter, LoweredSwitch};
use wash::SemanticAnalyzer;

/// Result of compiling one class.
#[derive(Debug)]
pub struct Compilation {
    /// Internal name, e.g. `p/Shapes`.
    pub class_name: String,
    pub class_file: ClassFile,
    pub bytes: Vec<u8>,
    /// Every diagnostic of the class in source order, warnings included.
    pub diagnostics: Vec<Diagnostic>,
    pub switches: Vec<LoweredSwitch>,
    /// Methods whose bodies were replaced because they had errors.
    pub problem_methods: Vec<String>,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Run the semantic checks only; no code is generated.
pub fn check_class(class: &ClassDecl, oracle: &TypeHierarchyOracle, config: &Config) -> Vec<Diagnostic> {
    SemanticAnalyzer::new(oracle, config).analyze_class(class).diagnostics()
}

/// Compile one class or interface declaration to class-file bytes.
///
/// User errors do not fail the call: the affected methods are emitted as
/// problem methods and the diagnostics are returned with the class.
pub fn compile_class(class: &ClassDecl, oracle: &TypeHierarchyOracle, config: &Config) -> Result<Compilation> {
    log::debug!("Phase 1 - semantic analysis of {}", class.name);
    let analysis = SemanticAnalyzer::new(oracle, config).analyze_class(class);
    let diagnostics = analysis.diagnostics();
    if analysis.has_errors() {
        log::info!("{}: {} diagnostics, errors present", class.name, diagnostics.len());
    }

    log::debug!("Phase 2 - code generation for {}", class.name);
    let written = ClassWriter::new(oracle, config).write_class(class, &analysis)?;

    log::debug!("Phase 3 - verification of {}", class.name);
    verify::verify(&written.class_file)?;

    let bytes = class_file_to_bytes(&written.class_file);
    log::debug!("{}: {} bytes, {} switches lowered", class.name, bytes.len(), written.switches.len());
    Ok(Compilation {
        class_name: class.name.clone(),
        class_file: written.class_file,
        bytes,
        diagnostics,
        switches: written.switches,
        problem_methods: written.problem_methods,
    })
}

/// Compile every class and interface of `unit`.
///
/// Records and enums only contribute to the oracle; declarations of those
/// kinds are skipped here.
pub fn compile_unit(unit: &CompilationUnit, oracle: &TypeHierarchyOracle, config: &Config) -> Result<Vec<Compilation>> {
    log::debug!("compiling unit with {} types", unit.types.len());
    unit.types
        .iter()
        .filter(|decl| {
            let emitted = matches!(decl.kind, ClassKind::Class | ClassKind::Interface);
            if !emitted {
                log::debug!("skipping {:?} {}", decl.kind, decl.name);
            }
            emitted
        })
        .map(|decl| compile_class(decl, oracle, config))
        .collect()
}

/// Write `<dir>/<class_name>.class`, creating package directories as needed.
pub fn write_class_file(compilation: &Compilation, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let mut path = dir.as_ref().to_path_buf();
    path.extend(compilation.class_name.split('/'));
    path.set_extension("class");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &compilation.bytes)?;
    log::debug!("wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, MethodDecl, TypeRef};

    fn empty_class(name: &str) -> ClassDecl {
        let mut class = ClassDecl::new(name, ClassKind::Class);
        class.methods.push(MethodDecl::new("run", Vec::new(), TypeRef::void(), Some(Block::new(Vec::new()))));
        class
    }

    #[test]
    fn compiles_a_trivial_class() {
        let class = empty_class("p/Empty");
        let oracle = TypeHierarchyOracle::builder().register_decl(&class).build();
        let compilation = compile_class(&class, &oracle, &Config::default()).unwrap();
        assert_eq!(compilation.class_name, "p/Empty");
        assert_eq!(&compilation.bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert!(!compilation.has_errors());
        assert!(compilation.problem_methods.is_empty());
    }

    #[test]
    fn units_skip_records_and_enums() {
        let mut unit = CompilationUnit { package: Some("p".into()), types: Vec::new(), span: Default::default() };
        unit.types.push(empty_class("p/Empty"));
        let mut color = ClassDecl::new("p/Color", ClassKind::Enum);
        color.enum_constants = vec!["RED".into()];
        unit.types.push(color);
        let oracle = TypeHierarchyOracle::builder().register_unit(&unit).build();
        let compiled = compile_unit(&unit, &oracle, &Config::default()).unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].class_name, "p/Empty");
    }
}
