#![forbid(unsafe_code)]
//! Filesystem collaborators shared by the rcache crates.

pub mod error;
pub mod fs;
pub mod hash;

pub use error::UtilError;
pub use fs::{DirScanner, FileReader, FileWriter, LocalFs};
