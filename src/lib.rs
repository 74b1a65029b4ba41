//! Ahead-of-time code generation for a small Scheme dialect. Source text is
//! read into an AST by [`frontend`], then [`middle::codegen`] lowers it into
//! an SSA [`middle::ir::Module`] ready for an LLVM-style toolchain.

use thiserror::Error;

use crate::{
    frontend::{SourceFile, reader::ReadError, reader::Reader},
    middle::codegen::{CodegenOptions, CompilationOutput, Diagnostic, compile_program},
};

pub mod frontend;
pub mod index;
pub mod middle;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Codegen(#[from] Diagnostic),
}

/// Reads and compiles one source file into a module
pub fn compile_source(
    source_file: &SourceFile,
    options: &CodegenOptions,
) -> Result<CompilationOutput, CompileError> {
    let program = Reader::read_program(source_file)?;

    Ok(compile_program(&program, options)?)
}
