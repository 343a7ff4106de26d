//! Structural checks over generated class files.
//!
//! These run after code generation and before serialization. They do not
//! replace the JVM's type-checking verifier; they catch malformed constant
//! pool references, bootstrap tables that do not line up with their
//! `invokedynamic` entries, and unparsable `Signature` attributes.

pub mod constant_pool;
pub mod members;
pub mod signature;
mod verifier;

pub use verifier::{verify, VerifyError, VerifyResult};
