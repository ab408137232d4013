//! A WebAssembly 2.0 runtime: decoder, validator and interpreter.
//!
//! kwasm takes a module from binary bytes to executing code:
//!
//! - [`parser`] -- Binary format decoder. Reads `.wasm` bytes into a [`parser::module::Module`],
//!   and the [`parser::validate`] pass that type-checks it into a [`parser::validate::ValidatedModule`].
//! - [`runtime`] -- The [`runtime::Store`], instantiation and import linking, and the
//!   stack-machine interpreter with its memories, tables and globals.
//! - [`encoder`] -- Binary encoder and a small [`encoder::ModuleBuilder`] for assembling
//!   modules in code.
//!
//! # Example
//!
//! Build a module, decode and validate it, instantiate it, and call an
//! exported function:
//!
//! ```
//! use kwasm::encoder::ModuleBuilder;
//! use kwasm::parser::{decode, instruction::InstructionKind, module::{FunctionType, ValueType}};
//! use kwasm::parser::validate::compile;
//! use kwasm::runtime::{ImportObject, Store, Value};
//!
//! let mut builder = ModuleBuilder::new();
//! let ty = builder.add_type(FunctionType::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32]));
//! let add = builder.add_function(ty, vec![], vec![
//!     InstructionKind::LocalGet { local_idx: 0 },
//!     InstructionKind::LocalGet { local_idx: 1 },
//!     InstructionKind::I32Add,
//! ]);
//! builder.export_function("add", add);
//! let bytes = builder.encode();
//!
//! let module = compile(decode(&bytes)?)?;
//! let mut store = Store::new();
//! let instance = store.instantiate(module, &ImportObject::new())?;
//! let results = store.invoke_export(instance, "add", &[Value::I32(2), Value::I32(3)])?;
//! assert_eq!(results, vec![Value::I32(5)]);
//! # Ok::<(), kwasm::Error>(())
//! ```
//!
//! # Specification
//!
//! Targets the [WebAssembly 2.0 specification](https://webassembly.github.io/spec/core/)
//! core instruction set, including bulk memory operations, reference types,
//! multi-value blocks, sign extension and saturating truncation. SIMD,
//! threads and the text format are not supported.

pub mod encoder;
pub mod parser;
pub mod runtime;

use thiserror::Error;

/// Any failure on the way from bytes to results
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] parser::error::DecodeError),
    #[error(transparent)]
    Validation(#[from] parser::validate::ValidationError),
    #[error(transparent)]
    Link(#[from] runtime::LinkError),
    #[error(transparent)]
    Runtime(#[from] runtime::RuntimeError),
}
