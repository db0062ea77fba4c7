//! Compiler-emitted file formats: swiftc output file maps and Makefile-style
//! dependency files.

pub mod depfile;
pub mod error;
pub mod filemap;

pub use depfile::{DepFile, DepRule};
pub use error::CompilerError;
pub use filemap::{
    CompilationInfo, CompilationInfoReader, CompilationInfoWriter, FileCompilationInfo,
    FilemapEditor, ModuleCompilationInfo, StaticCompilationInfoReader,
};
