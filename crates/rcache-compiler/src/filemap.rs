//! Structured read/write of the swiftc output file map.
//!
//! On disk the file map is a JSON object keyed by source file path. The entry
//! with the empty key holds module-level outputs:
//!
//! ```json
//! {
//!   "": { "dependencies": "/out/Module.d", "swift-dependencies": "/out/Module.swiftdeps" },
//!   "/src/A.swift": {
//!     "dependencies": "/out/A.d",
//!     "object": "/out/A.o",
//!     "swift-dependencies": "/out/A.swiftdeps"
//!   }
//! }
//! ```
//!
//! Which fields are present depends on the build mode: whole-module builds drop
//! the per-file `dependencies` and `swift-dependencies`, index-only builds drop
//! `object`, and incremental builds drop the module `dependencies`.

use std::path::{Path, PathBuf};

use rcache_util::{FileReader, FileWriter};
use serde_json::{Map, Value};

use crate::error::CompilerError;

const MODULE_KEY: &str = "";
const DEPENDENCIES: &str = "dependencies";
const SWIFT_DEPENDENCIES: &str = "swift-dependencies";
const OBJECT: &str = "object";

/// All inputs and outputs of one swiftc invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationInfo {
    pub module: ModuleCompilationInfo,
    pub files: Vec<FileCompilationInfo>,
}

/// Module-level outputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleCompilationInfo {
    /// Not present for incremental builds.
    pub dependencies: Option<PathBuf>,
    /// Always present in a file map written by swiftc; optional only for
    /// statically described invocations.
    pub swift_dependencies: Option<PathBuf>,
}

/// Outputs for a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCompilationInfo {
    pub file: PathBuf,
    /// Not present for whole-module builds.
    pub dependencies: Option<PathBuf>,
    /// Not present for index-only builds.
    pub object: Option<PathBuf>,
    /// Not present for whole-module builds.
    pub swift_dependencies: Option<PathBuf>,
}

impl CompilationInfo {
    /// Every dependency (`.d`) file named by the descriptor, module entry first.
    pub fn dependency_files(&self) -> Vec<PathBuf> {
        self.module
            .dependencies
            .iter()
            .chain(self.files.iter().filter_map(|f| f.dependencies.as_ref()))
            .cloned()
            .collect()
    }

    /// Decode a parsed file map. `origin` names the source in error messages.
    ///
    /// # Errors
    /// Returns `InvalidFormat` if an entry is not an object of strings and
    /// `MissingField` if the module entry lacks `swift-dependencies`.
    pub fn from_json(value: &Value, origin: &str) -> Result<Self, CompilerError> {
        let Some(object) = value.as_object() else {
            return Err(invalid(origin, "top level is not an object"));
        };
        let Some(module_entry) = object.get(MODULE_KEY) else {
            return Err(invalid(origin, "no module entry (empty key)"));
        };

        let module_fields = string_fields(module_entry, MODULE_KEY, origin)?;
        let module = ModuleCompilationInfo {
            dependencies: module_fields.path(DEPENDENCIES),
            swift_dependencies: Some(module_fields.required_path(SWIFT_DEPENDENCIES)?),
        };

        let mut files = Vec::new();
        for (key, entry) in object {
            if key.is_empty() {
                continue;
            }
            let fields = string_fields(entry, key, origin)?;
            files.push(FileCompilationInfo {
                file: PathBuf::from(key),
                dependencies: fields.path(DEPENDENCIES),
                object: fields.path(OBJECT),
                swift_dependencies: fields.path(SWIFT_DEPENDENCIES),
            });
        }

        Ok(Self { module, files })
    }

    /// Encode as a file map, omitting absent fields.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            MODULE_KEY.to_owned(),
            entry([
                (DEPENDENCIES, self.module.dependencies.as_deref()),
                (SWIFT_DEPENDENCIES, self.module.swift_dependencies.as_deref()),
            ]),
        );
        for file in &self.files {
            object.insert(
                file.file.to_string_lossy().into_owned(),
                entry([
                    (DEPENDENCIES, file.dependencies.as_deref()),
                    (OBJECT, file.object.as_deref()),
                    (SWIFT_DEPENDENCIES, file.swift_dependencies.as_deref()),
                ]),
            );
        }
        Value::Object(object)
    }
}

fn entry<const N: usize>(fields: [(&str, Option<&Path>); N]) -> Value {
    let object = fields
        .into_iter()
        .filter_map(|(key, path)| {
            path.map(|p| (key.to_owned(), Value::String(p.to_string_lossy().into_owned())))
        })
        .collect();
    Value::Object(object)
}

/// A file map entry whose values have all been checked to be strings.
struct StringFields<'a> {
    object: &'a Map<String, Value>,
    key: &'a str,
    origin: &'a str,
}

impl StringFields<'_> {
    fn path(&self, field: &str) -> Option<PathBuf> {
        self.object
            .get(field)
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    fn required_path(&self, field: &str) -> Result<PathBuf, CompilerError> {
        self.path(field).ok_or_else(|| CompilerError::MissingField {
            path: format!("{} (entry \"{}\")", self.origin, self.key),
            field: field.to_owned(),
        })
    }
}

fn string_fields<'a>(
    value: &'a Value,
    key: &'a str,
    origin: &'a str,
) -> Result<StringFields<'a>, CompilerError> {
    let Some(object) = value.as_object() else {
        return Err(invalid(origin, &format!("entry \"{key}\" is not an object")));
    };
    if let Some((field, _)) = object.iter().find(|(_, v)| !v.is_string()) {
        return Err(invalid(
            origin,
            &format!("field `{field}` of entry \"{key}\" is not a string"),
        ));
    }
    Ok(StringFields {
        object,
        key,
        origin,
    })
}

fn invalid(origin: &str, message: &str) -> CompilerError {
    CompilerError::InvalidFormat {
        path: origin.to_owned(),
        message: message.to_owned(),
    }
}

/// Supplies the compilation description of the current invocation.
pub trait CompilationInfoReader {
    /// # Errors
    /// Returns an error if the description cannot be read or decoded.
    fn read(&self) -> Result<CompilationInfo, CompilerError>;
}

/// Persists a (possibly modified) compilation description.
pub trait CompilationInfoWriter {
    /// # Errors
    /// Returns an error if the description cannot be encoded or written.
    fn write(&self, info: &CompilationInfo) -> Result<(), CompilerError>;
}

/// A description assembled from command-line arguments rather than a file map
/// (single-file frontend invocations).
#[derive(Debug, Clone)]
pub struct StaticCompilationInfoReader {
    info: CompilationInfo,
}

impl StaticCompilationInfoReader {
    pub fn new(
        module_dependencies: Option<PathBuf>,
        swift_dependencies: Option<PathBuf>,
        files: Vec<FileCompilationInfo>,
    ) -> Self {
        Self {
            info: CompilationInfo {
                module: ModuleCompilationInfo {
                    dependencies: module_dependencies,
                    swift_dependencies,
                },
                files,
            },
        }
    }
}

impl CompilationInfoReader for StaticCompilationInfoReader {
    fn read(&self) -> Result<CompilationInfo, CompilerError> {
        Ok(self.info.clone())
    }
}

/// Reads and rewrites a file map on disk.
#[derive(Debug, Clone)]
pub struct FilemapEditor<F> {
    path: PathBuf,
    fs: F,
}

impl<F> FilemapEditor<F> {
    pub fn new(path: &Path, fs: F) -> Self {
        Self {
            path: path.to_path_buf(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<F: FileReader> CompilationInfoReader for FilemapEditor<F> {
    fn read(&self) -> Result<CompilationInfo, CompilerError> {
        let origin = self.path.display().to_string();
        let Some(content) = self.fs.contents(&self.path)? else {
            return Err(CompilerError::ReadingFailed { path: origin });
        };
        let value: Value = serde_json::from_slice(&content)
            .map_err(|e| invalid(&origin, &e.to_string()))?;
        CompilationInfo::from_json(&value, &origin)
    }
}

impl<F: FileWriter> CompilationInfoWriter for FilemapEditor<F> {
    fn write(&self, info: &CompilationInfo) -> Result<(), CompilerError> {
        let data =
            serde_json::to_vec_pretty(&info.to_json()).map_err(|source| CompilerError::Serialize {
                path: self.path.display().to_string(),
                source,
            })?;
        self.fs.write(&self.path, &data)?;
        Ok(())
    }
}
