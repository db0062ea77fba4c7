//! Virtual filesystem overlays.
//!
//! A build may compile against a VFS overlay that presents headers at virtual
//! locations backed by files elsewhere on disk. Dependency files then report
//! virtual paths, which must be mapped back to physical files before they can
//! be classified or hashed.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;
use rcache_config::OverlayMerge;
use rcache_util::FileReader;
use serde::Deserialize;

use crate::error::EngineError;
use crate::reader::DependenciesReader;

/// One virtual path and the file backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayMapping {
    pub virtual_path: PathBuf,
    pub local: PathBuf,
}

/// Supplies the overlay mappings.
pub trait OverlayReader {
    /// # Errors
    /// Returns an error if the overlay descriptor is missing, malformed, or
    /// uses an unsupported layout.
    fn provide_mappings(&self) -> Result<Vec<OverlayMapping>, EngineError>;
}

impl<T: OverlayReader + ?Sized> OverlayReader for &T {
    fn provide_mappings(&self) -> Result<Vec<OverlayMapping>, EngineError> {
        (**self).provide_mappings()
    }
}

#[derive(Debug, Deserialize)]
struct OverlayDescriptor {
    roots: Vec<OverlayRoot>,
}

#[derive(Debug, Deserialize)]
struct OverlayRoot {
    name: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    contents: Vec<OverlayEntry>,
}

#[derive(Debug, Deserialize)]
struct OverlayEntry {
    name: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(rename = "external-contents")]
    external_contents: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EntryKind {
    File,
    Directory,
}

/// Reads an overlay descriptor (the `-ivfsoverlay` format).
///
/// Xcode writes these as `.yaml` files in JSON syntax; only that flow form
/// is accepted, whatever the extension.
#[derive(Debug, Clone)]
pub struct JsonOverlayReader<R> {
    path: PathBuf,
    reader: R,
}

impl<R: FileReader> JsonOverlayReader<R> {
    pub fn new(path: &Path, reader: R) -> Self {
        Self {
            path: path.to_path_buf(),
            reader,
        }
    }
}

impl<R: FileReader> OverlayReader for JsonOverlayReader<R> {
    fn provide_mappings(&self) -> Result<Vec<OverlayMapping>, EngineError> {
        let origin = self.path.display().to_string();
        let Some(content) = self.reader.contents(&self.path)? else {
            return Err(EngineError::OverlayMissing { path: origin });
        };
        let descriptor: OverlayDescriptor =
            serde_json::from_slice(&content).map_err(|e| EngineError::OverlayInvalid {
                path: origin.clone(),
                message: e.to_string(),
            })?;

        let mut mappings = Vec::new();
        for root in descriptor.roots {
            if root.kind != EntryKind::Directory {
                return Err(EngineError::UnsupportedOverlayShape {
                    path: origin,
                    message: format!("root `{}` is not a directory", root.name),
                });
            }
            for entry in root.contents {
                if entry.kind != EntryKind::File {
                    return Err(EngineError::UnsupportedOverlayShape {
                        path: origin,
                        message: format!("nested directory `{}` in `{}`", entry.name, root.name),
                    });
                }
                let Some(external) = entry.external_contents else {
                    return Err(EngineError::OverlayInvalid {
                        path: origin,
                        message: format!("file `{}` has no external-contents", entry.name),
                    });
                };
                mappings.push(OverlayMapping {
                    virtual_path: Path::new(&root.name).join(&entry.name),
                    local: PathBuf::from(external),
                });
            }
        }
        tracing::debug!(path = %origin, mappings = mappings.len(), "loaded overlay");
        Ok(mappings)
    }
}

/// Direction of the rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingOrder {
    LocalToVirtual,
    VirtualToLocal,
}

/// Rewrites the paths returned by a [`DependenciesReader`] through overlay
/// mappings. Only exact matches are rewritten.
pub struct OverlayDependencyRewriter<D, O> {
    inner: D,
    overlay: O,
    order: MappingOrder,
    merge: OverlayMerge,
    mappings: OnceCell<HashMap<String, String>>,
}

impl<D: DependenciesReader, O: OverlayReader> OverlayDependencyRewriter<D, O> {
    pub fn new(inner: D, overlay: O, order: MappingOrder, merge: OverlayMerge) -> Self {
        Self {
            inner,
            overlay,
            order,
            merge,
            mappings: OnceCell::new(),
        }
    }

    /// Loaded on first use. When several mappings share a source path the
    /// first one wins.
    fn mappings(&self) -> Result<&HashMap<String, String>, EngineError> {
        self.mappings.get_or_try_init(|| {
            let mut table = HashMap::new();
            for mapping in self.overlay.provide_mappings()? {
                let (from, to) = match self.order {
                    MappingOrder::LocalToVirtual => (mapping.local, mapping.virtual_path),
                    MappingOrder::VirtualToLocal => (mapping.virtual_path, mapping.local),
                };
                table
                    .entry(from.to_string_lossy().into_owned())
                    .or_insert_with(|| to.to_string_lossy().into_owned());
            }
            Ok(table)
        })
    }

    fn remap_all(&self, paths: Vec<String>) -> Result<Vec<String>, EngineError> {
        let mappings = self.mappings()?;
        Ok(paths
            .into_iter()
            .map(|path| remap(mappings, path))
            .collect())
    }
}

fn remap(mappings: &HashMap<String, String>, path: String) -> String {
    match mappings.get(&path) {
        Some(mapped) => mapped.clone(),
        None => path,
    }
}

impl<D: DependenciesReader, O: OverlayReader> DependenciesReader
    for OverlayDependencyRewriter<D, O>
{
    fn find_dependencies(&self) -> Result<Vec<String>, EngineError> {
        self.remap_all(self.inner.find_dependencies()?)
    }

    fn find_inputs(&self) -> Result<Vec<String>, EngineError> {
        self.remap_all(self.inner.find_inputs()?)
    }

    /// Dependency lists come back sorted and deduplicated. Keys that collapse
    /// onto one path are merged, or rejected under [`OverlayMerge::Strict`].
    fn read_files_and_dependencies(&self) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        let raw = self.inner.read_files_and_dependencies()?;
        let mappings = self.mappings()?;

        let mut remapped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (file, dependencies) in raw {
            let key = remap(mappings, file);
            let values = dependencies.into_iter().map(|d| remap(mappings, d));
            match remapped.get_mut(&key) {
                Some(existing) => {
                    if self.merge == OverlayMerge::Strict {
                        return Err(EngineError::OverlayDuplication { path: key });
                    }
                    tracing::debug!(
                        path = %key,
                        "merging dependencies of overlay-mapped duplicates"
                    );
                    existing.extend(values);
                }
                None => {
                    remapped.insert(key, values.collect());
                }
            }
        }
        for dependencies in remapped.values_mut() {
            dependencies.sort();
            dependencies.dedup();
        }
        Ok(remapped)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::fs;

    use rcache_util::LocalFs;

    use super::*;

    const OVERLAY: &str = r#"{
        "version": 0,
        "case-sensitive": "false",
        "roots": [
            {
                "name": "/virtual/include",
                "type": "directory",
                "contents": [
                    { "external-contents": "/local/A.h", "name": "A.h", "type": "file" },
                    { "external-contents": "/local/B.h", "name": "B.h", "type": "file" }
                ]
            }
        ]
    }"#;

    fn overlay_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("overlay.json");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    struct StaticOverlay {
        mappings: Vec<OverlayMapping>,
        loads: Cell<usize>,
    }

    impl StaticOverlay {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                mappings: pairs
                    .iter()
                    .map(|(v, l)| OverlayMapping {
                        virtual_path: PathBuf::from(v),
                        local: PathBuf::from(l),
                    })
                    .collect(),
                loads: Cell::new(0),
            }
        }
    }

    impl OverlayReader for StaticOverlay {
        fn provide_mappings(&self) -> Result<Vec<OverlayMapping>, EngineError> {
            self.loads.set(self.loads.get() + 1);
            Ok(self.mappings.clone())
        }
    }

    struct StaticDependencies {
        dependencies: Vec<String>,
        files: BTreeMap<String, Vec<String>>,
    }

    impl StaticDependencies {
        fn new(dependencies: &[&str]) -> Self {
            Self {
                dependencies: dependencies.iter().map(|d| (*d).to_owned()).collect(),
                files: BTreeMap::new(),
            }
        }

        fn with_file(mut self, file: &str, dependencies: &[&str]) -> Self {
            self.files.insert(
                file.to_owned(),
                dependencies.iter().map(|d| (*d).to_owned()).collect(),
            );
            self
        }
    }

    impl DependenciesReader for StaticDependencies {
        fn find_dependencies(&self) -> Result<Vec<String>, EngineError> {
            Ok(self.dependencies.clone())
        }

        fn find_inputs(&self) -> Result<Vec<String>, EngineError> {
            Ok(self.dependencies.iter().take(1).cloned().collect())
        }

        fn read_files_and_dependencies(
            &self,
        ) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
            Ok(self.files.clone())
        }
    }

    #[test]
    fn parses_json_overlay() {
        let (_tmp, path) = overlay_file(OVERLAY);
        let mappings = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap();
        assert_eq!(
            mappings,
            vec![
                OverlayMapping {
                    virtual_path: PathBuf::from("/virtual/include/A.h"),
                    local: PathBuf::from("/local/A.h"),
                },
                OverlayMapping {
                    virtual_path: PathBuf::from("/virtual/include/B.h"),
                    local: PathBuf::from("/local/B.h"),
                },
            ]
        );
    }

    #[test]
    fn yaml_named_overlay_in_json_syntax() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("all-product-headers.yaml");
        fs::write(&path, OVERLAY).unwrap();
        let mappings = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap();
        assert_eq!(mappings.len(), 2);
    }

    #[test]
    fn block_style_yaml_is_invalid() {
        let (_tmp, path) = overlay_file("roots:\n  - name: /virtual\n    type: directory\n");
        let err = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap_err();
        assert!(matches!(err, EngineError::OverlayInvalid { .. }));
    }

    #[test]
    fn missing_overlay_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = JsonOverlayReader::new(&tmp.path().join("none.json"), LocalFs)
            .provide_mappings()
            .unwrap_err();
        assert!(matches!(err, EngineError::OverlayMissing { .. }));
    }

    #[test]
    fn malformed_overlay_is_invalid() {
        let (_tmp, path) = overlay_file("{ \"roots\": 12 }");
        let err = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap_err();
        assert!(matches!(err, EngineError::OverlayInvalid { .. }));
    }

    #[test]
    fn nested_directory_is_unsupported() {
        let (_tmp, path) = overlay_file(
            r#"{ "roots": [ { "name": "/v", "type": "directory", "contents": [
                { "name": "sub", "type": "directory" } ] } ] }"#,
        );
        let err = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOverlayShape { .. }));
    }

    #[test]
    fn file_root_is_unsupported() {
        let (_tmp, path) = overlay_file(
            r#"{ "roots": [
                { "name": "/v/A.h", "type": "file", "external-contents": "/l/A.h" }
            ] }"#,
        );
        let err = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOverlayShape { .. }));
    }

    #[test]
    fn file_without_external_contents_is_invalid() {
        let (_tmp, path) = overlay_file(
            r#"{ "roots": [ { "name": "/v", "type": "directory", "contents": [
                { "name": "A.h", "type": "file" } ] } ] }"#,
        );
        let err = JsonOverlayReader::new(&path, LocalFs).provide_mappings().unwrap_err();
        assert!(matches!(err, EngineError::OverlayInvalid { .. }));
    }

    #[test]
    fn virtual_to_local_rewrites_exact_matches_only() {
        let overlay = StaticOverlay::new(&[("/virtual/A.h", "/local/A.h")]);
        let inner = StaticDependencies::new(&["/virtual/A.h", "/virtual/A.hpp", "/other/C.h"]);
        let rewriter = OverlayDependencyRewriter::new(
            inner,
            &overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Union,
        );

        assert_eq!(
            rewriter.find_dependencies().unwrap(),
            vec!["/local/A.h", "/virtual/A.hpp", "/other/C.h"]
        );
        assert_eq!(rewriter.find_inputs().unwrap(), vec!["/local/A.h"]);
    }

    #[test]
    fn local_to_virtual_uses_local_side() {
        let overlay = StaticOverlay::new(&[("/virtual/A.h", "/local/A.h")]);
        let inner = StaticDependencies::new(&["/local/A.h", "/virtual/A.h"]);
        let rewriter = OverlayDependencyRewriter::new(
            inner,
            &overlay,
            MappingOrder::LocalToVirtual,
            OverlayMerge::Union,
        );

        assert_eq!(
            rewriter.find_dependencies().unwrap(),
            vec!["/virtual/A.h", "/virtual/A.h"]
        );
    }

    #[test]
    fn first_mapping_wins() {
        let overlay = StaticOverlay::new(&[("/v/A.h", "/first/A.h"), ("/v/A.h", "/second/A.h")]);
        let rewriter = OverlayDependencyRewriter::new(
            StaticDependencies::new(&["/v/A.h"]),
            &overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Union,
        );
        assert_eq!(rewriter.find_dependencies().unwrap(), vec!["/first/A.h"]);
    }

    #[test]
    fn mappings_load_once() {
        let overlay = StaticOverlay::new(&[("/v/A.h", "/l/A.h")]);
        let rewriter = OverlayDependencyRewriter::new(
            StaticDependencies::new(&["/v/A.h"]).with_file("/v/A.h", &["/v/A.h"]),
            &overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Union,
        );

        rewriter.find_dependencies().unwrap();
        rewriter.find_inputs().unwrap();
        rewriter.read_files_and_dependencies().unwrap();

        assert_eq!(overlay.loads.get(), 1);
    }

    #[test]
    fn overlay_errors_propagate() {
        let tmp = tempfile::tempdir().unwrap();
        let overlay = JsonOverlayReader::new(&tmp.path().join("missing.json"), LocalFs);
        let rewriter = OverlayDependencyRewriter::new(
            StaticDependencies::new(&["/v/A.h"]),
            overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Union,
        );
        assert!(matches!(
            rewriter.find_dependencies().unwrap_err(),
            EngineError::OverlayMissing { .. }
        ));
    }

    #[test]
    fn files_and_dependencies_remap_keys_and_values() {
        let overlay = StaticOverlay::new(&[("/v/A.h", "/l/A.h"), ("/v/A.m", "/l/A.m")]);
        let inner = StaticDependencies::new(&[]).with_file("/v/A.m", &["/v/A.h", "/x/Z.h"]);
        let rewriter = OverlayDependencyRewriter::new(
            inner,
            &overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Union,
        );

        let map = rewriter.read_files_and_dependencies().unwrap();
        assert_eq!(
            map.get("/l/A.m").unwrap(),
            &vec!["/l/A.h".to_owned(), "/x/Z.h".to_owned()]
        );
    }

    #[test]
    fn colliding_keys_are_merged_sorted() {
        let overlay = StaticOverlay::new(&[("/v/A.m", "/l/A.m")]);
        let inner = StaticDependencies::new(&[])
            .with_file("/v/A.m", &["/z.h", "/shared.h"])
            .with_file("/l/A.m", &["/shared.h", "/a.h"]);
        let rewriter = OverlayDependencyRewriter::new(
            inner,
            &overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Union,
        );

        let map = rewriter.read_files_and_dependencies().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get("/l/A.m").unwrap(),
            &vec!["/a.h".to_owned(), "/shared.h".to_owned(), "/z.h".to_owned()]
        );
    }

    #[test]
    fn colliding_keys_fail_in_strict_mode() {
        let overlay = StaticOverlay::new(&[("/v/A.m", "/l/A.m")]);
        let inner = StaticDependencies::new(&[])
            .with_file("/v/A.m", &["/a.h"])
            .with_file("/l/A.m", &["/b.h"]);
        let rewriter = OverlayDependencyRewriter::new(
            inner,
            &overlay,
            MappingOrder::VirtualToLocal,
            OverlayMerge::Strict,
        );

        let err = rewriter.read_files_and_dependencies().unwrap_err();
        assert!(matches!(err, EngineError::OverlayDuplication { path } if path == "/l/A.m"));
    }
}
