//! Raw dependency readers over compiler dependency files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rcache_compiler::{CompilerError, DepFile};
use rcache_util::FileReader;

use crate::error::EngineError;

/// Source of the dependencies a compilation reported.
pub trait DependenciesReader {
    /// Every dependency, deduplicated in first-seen order.
    ///
    /// # Errors
    /// Returns an error if the underlying file cannot be read or parsed.
    fn find_dependencies(&self) -> Result<Vec<String>, EngineError>;

    /// The primary input of each compiled file.
    ///
    /// # Errors
    /// Returns an error if the underlying file cannot be read or parsed.
    fn find_inputs(&self) -> Result<Vec<String>, EngineError>;

    /// Dependencies keyed by the file that produced them.
    ///
    /// # Errors
    /// Returns an error if the underlying file cannot be read or parsed.
    fn read_files_and_dependencies(&self) -> Result<BTreeMap<String, Vec<String>>, EngineError>;
}

/// Reads a single Makefile-style `.d` file.
#[derive(Debug, Clone)]
pub struct FileDependenciesReader<R> {
    path: PathBuf,
    reader: R,
}

impl<R: FileReader> FileDependenciesReader<R> {
    pub fn new(path: &Path, reader: R) -> Self {
        Self {
            path: path.to_path_buf(),
            reader,
        }
    }

    fn parse(&self) -> Result<DepFile, EngineError> {
        DepFile::from_path(&self.path, &self.reader).map_err(|e| match e {
            CompilerError::ReadingFailed { path } => EngineError::InputUnreadable { path },
            other => EngineError::from(other),
        })
    }
}

impl<R: FileReader> DependenciesReader for FileDependenciesReader<R> {
    fn find_dependencies(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.parse()?.dependencies())
    }

    fn find_inputs(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.parse()?.inputs())
    }

    fn read_files_and_dependencies(&self) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        Ok(self.parse()?.files_and_dependencies())
    }
}

/// Several readers presented as one, e.g. all `.d` files of a module.
#[derive(Debug, Clone)]
pub struct CombinedDependenciesReader<D> {
    readers: Vec<D>,
}

impl<D: DependenciesReader> CombinedDependenciesReader<D> {
    pub fn new(readers: Vec<D>) -> Self {
        Self { readers }
    }
}

impl<D: DependenciesReader> DependenciesReader for CombinedDependenciesReader<D> {
    fn find_dependencies(&self) -> Result<Vec<String>, EngineError> {
        let mut all = Vec::new();
        for reader in &self.readers {
            all.extend(reader.find_dependencies()?);
        }
        Ok(dedup_in_order(all))
    }

    fn find_inputs(&self) -> Result<Vec<String>, EngineError> {
        let mut all = Vec::new();
        for reader in &self.readers {
            all.extend(reader.find_inputs()?);
        }
        Ok(dedup_in_order(all))
    }

    fn read_files_and_dependencies(&self) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for reader in &self.readers {
            for (file, dependencies) in reader.read_files_and_dependencies()? {
                let entry = merged.entry(file).or_default();
                entry.extend(dependencies);
            }
        }
        for dependencies in merged.values_mut() {
            *dependencies = dedup_in_order(std::mem::take(dependencies));
        }
        Ok(merged)
    }
}

fn dedup_in_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
