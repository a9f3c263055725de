//! Reconstruction of structured Java syntax trees from JVM class files.

pub mod ast;
pub(crate) mod bytecode;
pub mod cfg;
pub mod classfile;
pub mod engine;
pub mod error;
pub mod ir;
pub mod members;
pub(crate) mod opcodes;
pub mod report;
pub mod resolver;
pub mod scan;
pub mod structure;
pub mod synth;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
