//! Specific error types for code generation operations

use thiserror::Error;

/// Errors that can occur during constant pool operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstPoolError {
    #[error("Constant pool is out of space")]
    OutOfSpace,
    #[error("Invalid constant pool index: {0}")]
    InvalidIndex(u16),
    #[error("Constant pool entry {index} is a {found}, expected {expected}")]
    WrongKind { index: u16, expected: &'static str, found: &'static str },
}

/// Errors that can occur while lowering a method body
#[derive(Error, Debug)]
pub enum CodeGenError {
    #[error("Constant pool error: {0}")]
    ConstPool(#[from] ConstPoolError),
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),
    #[error("Unknown local variable '{name}'")]
    UnknownLocal { name: String },
    #[error("Unsupported construct: {what}")]
    Unsupported { what: String },
    #[error("'{keyword}' outside of an enclosing {context}")]
    MisplacedJump { keyword: &'static str, context: &'static str },
    #[error("Switch at {location} was not validated")]
    UnvalidatedSwitch { location: String },
    #[error("Method '{name}' has more than 65535 bytes of code")]
    CodeTooLarge { name: String },
    #[error("Invalid descriptor: {descriptor}")]
    InvalidDescriptor { descriptor: String },
    #[error("Resolution error: {0}")]
    Resolve(#[from] crate::common::hierarchy::ResolveError),
}

/// Errors that can occur during bytecode generation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("Stack underflow at pc {pc}")]
    StackUnderflow { pc: usize },
    #[error("Branch target too far: {offset}")]
    BranchTooFar { offset: i32 },
    #[error("Label {0} was never placed")]
    UnplacedLabel(usize),
    #[error("Local variable index out of bounds: {index}")]
    LocalIndexOutOfBounds { index: usize },
}

impl CodeGenError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }
}

/// Generic result type for code generation operations
pub type CodeGenResult<T> = Result<T, CodeGenError>;

/// Generic result type for constant pool operations
pub type ConstPoolResult<T> = Result<T, ConstPoolError>;

/// Generic result type for bytecode operations
pub type BytecodeResult<T> = Result<T, BytecodeError>;
