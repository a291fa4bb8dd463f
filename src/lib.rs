//! A compiler from Java source fragments (member declarations, statement
//! blocks and expressions) to JVM bytecode, for inserting code into existing
//! class files.
//!
//! ```rust
//! use classfile_compiler::class_pool::{ClassModel, ClassPool};
//! use classfile_compiler::compile::Javac;
//! use classfile_compiler::constant_info::ConstPool;
//! use classfile_compiler::descriptor::JType;
//!
//! let mut classes = ClassPool::with_jdk();
//! classes.insert(ClassModel::new("demo/Calc"));
//! let mut pool = ConstPool::new();
//! let mut javac = Javac::new(&classes, &mut pool, "demo/Calc");
//! javac.record_params(&[JType::INT, JType::INT], true).unwrap();
//! javac.record_return_type(JType::INT, false).unwrap();
//! javac.compile_stmnt("{ return $1 + $2; }").unwrap();
//! let code = javac.finish_code().unwrap();
//! assert!(code.max_locals >= 2);
//! ```

#[macro_use]
extern crate bitflags;

pub mod class_pool;
pub mod code_attribute;
pub mod compile;
pub mod constant_info;
pub mod descriptor;
pub mod types;

pub use compile::{CompileError, CompileOptions};
