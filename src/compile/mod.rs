pub mod ast;
pub mod checker;
pub mod codegen;
pub mod javac;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod splice;
pub mod symtab;
pub mod types;

use thiserror::Error;

pub use self::javac::{CompiledMember, Javac};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("parse error at {line}:{column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("type error: {message}")]
    TypeError { message: String },
    #[error("codegen error: {message}")]
    CodegenError { message: String },
    #[error("method not found: {name}")]
    MethodNotFound { name: String },
    #[error("no such class: {name}")]
    NoSuchClass { name: String },
    #[error("no such field: {name}")]
    NoSuchField { name: String },
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// An internal contract violation, never caused by the source text alone.
    #[error("fatal compiler error: {0}")]
    Fatal(String),
}

impl CompileError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        CompileError::TypeError {
            message: message.into(),
        }
    }

    pub(crate) fn codegen(message: impl Into<String>) -> Self {
        CompileError::CodegenError {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Run the checker (folding, string concatenation rewrite, type errors)
    /// before generating code.
    pub type_check: bool,
    /// Packages searched, in order, for simple class names, in dotted form.
    pub imported_packages: Vec<String>,
    /// Emit a trailing `return` when a void method body can complete normally.
    pub append_void_return: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            type_check: true,
            imported_packages: vec!["java.lang".to_string()],
            append_void_return: true,
        }
    }
}
