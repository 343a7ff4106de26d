use thiserror::Error;

use crate::codegen::error::CodeGenError;
use crate::common::hierarchy::ResolveError;
use crate::verify::VerifyError;

/// Result type for jpatc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a compilation request.
///
/// Recoverable user errors never show up here; they are collected as
/// [`crate::common::diagnostics::Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Semantic error: {message}")]
    Semantic { message: String },

    #[error("Code generation error: {0}")]
    CodeGen(#[from] CodeGenError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Class file verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature { feature: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn semantic_error(message: impl Into<String>) -> Self {
        Self::Semantic { message: message.into() }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature { feature: feature.into() }
    }
}
