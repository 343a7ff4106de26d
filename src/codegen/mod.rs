//! Bytecode generation.
//!
//! [`class_writer::ClassWriter`] drives one class: method bodies go through
//! [`gen::Gen`], switches through [`switch_lowering`], lambdas, method
//! references, string concatenation and pattern switches become
//! `invokedynamic` sites built by [`indy::InvokeDynamicSiteBuilder`].

pub mod attribute;
pub mod bootstrap;
pub mod class;
pub mod class_writer;
pub mod code;
pub mod constpool;
pub mod defs;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod frame;
pub mod gen;
pub mod indy;
pub mod lambda;
pub mod method;
pub mod opcodes;
pub mod signature;
pub mod string_switch;
pub mod switch_lowering;
pub mod switch_optimizer;
pub mod writer;

pub use bootstrap::{BootstrapArg, BootstrapKind, BootstrapMethodEntry, BootstrapMethodsTable};
pub use class::ClassFile;
pub use class_writer::{ClassWriter, WrittenClass};
pub use constpool::{Constant, ConstantPool};
pub use error::{CodeGenError, CodeGenResult, ConstPoolError};
pub use indy::InvokeDynamicSiteBuilder;
pub use signature::GenericSignatureEncoder;
pub use switch_lowering::{LoweredSwitch, LoweringShape};
pub use writer::class_file_to_bytes;
