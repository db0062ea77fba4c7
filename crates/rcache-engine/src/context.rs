//! Build context derived from the build system environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rcache_config::RcConfig;

use crate::dependency::{ClassifierRoots, PathClassifier};
use crate::error::EngineError;
use crate::remap::{PathRemapper, RemapRule};

/// Remapping placeholders filled from the environment, in rule order.
const DEFAULT_REMAP_ENVS: [&str; 5] = [
    "SRCROOT",
    "BUILD_DIR",
    "DEVELOPER_DIR",
    "TARGET_TEMP_DIR",
    "DERIVED_FILE_DIR",
];

/// Everything a build phase needs to know about where it runs.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub roots: ClassifierRoots,
    pub remapper: PathRemapper,
    pub marker_path: PathBuf,
    pub env: HashMap<String, String>,
}

impl BuildContext {
    /// # Errors
    /// Returns `MissingEnv` if a required variable is not set.
    pub fn from_env(env: HashMap<String, String>, config: &RcConfig) -> Result<Self, EngineError> {
        let product = PathBuf::from(require(&env, "BUILT_PRODUCTS_DIR")?);
        let intermediate = PathBuf::from(require(&env, "TARGET_TEMP_DIR")?);
        let roots = ClassifierRoots {
            toolchain: PathBuf::from(require(&env, "DEVELOPER_DIR")?),
            source: PathBuf::from(require(&env, "SRCROOT")?),
            derived_files: PathBuf::from(require(&env, "DERIVED_FILE_DIR")?),
            bundle: env
                .get("WRAPPER_NAME")
                .filter(|name| !name.is_empty())
                .map(|name| product.join(name)),
            product,
            intermediate: intermediate.clone(),
        };

        let mut rules: Vec<RemapRule> = DEFAULT_REMAP_ENVS
            .iter()
            .filter_map(|name| {
                env.get(*name)
                    .map(|value| RemapRule::new(format!("$({name})"), value.clone()))
            })
            .collect();
        rules.extend(
            config
                .path_mappings
                .iter()
                .map(|(generic, local)| RemapRule::new(generic.clone(), local.clone())),
        );

        Ok(Self {
            roots,
            remapper: PathRemapper::new(rules),
            marker_path: intermediate.join(&config.marker_filename),
            env,
        })
    }

    /// # Errors
    /// Returns `InvalidPattern` if an exclusion pattern does not compile.
    pub fn classifier(&self, config: &RcConfig) -> Result<PathClassifier, EngineError> {
        PathClassifier::new(&self.roots, &config.irrelevant_dependencies_paths)
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    pub fn source_root(&self) -> &Path {
        &self.roots.source
    }
}

fn require<'a>(env: &'a HashMap<String, String>, name: &str) -> Result<&'a str, EngineError> {
    env.get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| EngineError::MissingEnv {
            name: name.to_owned(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn env() -> HashMap<String, String> {
        [
            ("DEVELOPER_DIR", "/Xcode/Developer"),
            ("BUILT_PRODUCTS_DIR", "/Build/Products/Debug"),
            ("SRCROOT", "/src"),
            ("TARGET_TEMP_DIR", "/Build/Intermediates/App.build"),
            ("DERIVED_FILE_DIR", "/Build/Intermediates/App.build/DerivedSources"),
            ("BUILD_DIR", "/Build"),
            ("WRAPPER_NAME", "App.app"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
    }

    #[test]
    fn derives_roots() {
        let context = BuildContext::from_env(env(), &RcConfig::default()).unwrap();
        assert_eq!(context.roots.toolchain, PathBuf::from("/Xcode/Developer"));
        assert_eq!(context.roots.source, PathBuf::from("/src"));
        assert_eq!(
            context.roots.bundle,
            Some(PathBuf::from("/Build/Products/Debug/App.app"))
        );
        assert_eq!(
            context.marker_path,
            PathBuf::from("/Build/Intermediates/App.build/rc.enabled")
        );
    }

    #[test]
    fn missing_required_variable() {
        let mut vars = env();
        vars.remove("SRCROOT");
        let err = BuildContext::from_env(vars, &RcConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::MissingEnv { name } if name == "SRCROOT"));
    }

    #[test]
    fn no_wrapper_means_no_bundle() {
        let mut vars = env();
        vars.remove("WRAPPER_NAME");
        let context = BuildContext::from_env(vars, &RcConfig::default()).unwrap();
        assert_eq!(context.roots.bundle, None);
    }

    #[test]
    fn default_rules_then_configured_mappings() {
        let mut config = RcConfig::default();
        config
            .path_mappings
            .insert("$(PODS_ROOT)".to_owned(), "/src/Pods".to_owned());
        let context = BuildContext::from_env(env(), &config).unwrap();

        let generics: Vec<&str> = context
            .remapper
            .rules()
            .iter()
            .map(|r| r.generic.as_str())
            .collect();
        assert_eq!(
            generics,
            vec![
                "$(SRCROOT)",
                "$(BUILD_DIR)",
                "$(DEVELOPER_DIR)",
                "$(TARGET_TEMP_DIR)",
                "$(DERIVED_FILE_DIR)",
                "$(PODS_ROOT)",
            ]
        );
        assert_eq!(
            context.remapper.to_generic("/src/Pods/A.h /src/B.h"),
            "$(PODS_ROOT)/A.h $(SRCROOT)/B.h"
        );
    }

    #[test]
    fn derived_sources_map_to_the_innermost_directory() {
        let context = BuildContext::from_env(env(), &RcConfig::default()).unwrap();
        assert_eq!(
            context.remapper.path_to_generic(Path::new(
                "/Build/Intermediates/App.build/DerivedSources/GeneratedAssetSymbols.swift"
            )),
            "$(DERIVED_FILE_DIR)/GeneratedAssetSymbols.swift"
        );
        assert_eq!(
            context
                .remapper
                .path_to_generic(Path::new("/Build/Intermediates/App.build/Objects/A.o")),
            "$(TARGET_TEMP_DIR)/Objects/A.o"
        );
    }

    #[test]
    fn custom_marker_name() {
        let config = RcConfig {
            marker_filename: "cache.marker".to_owned(),
            ..RcConfig::default()
        };
        let context = BuildContext::from_env(env(), &config).unwrap();
        assert!(context.marker_path.ends_with("cache.marker"));
    }

    #[test]
    fn classifier_uses_configured_exclusions() {
        let config = RcConfig {
            irrelevant_dependencies_paths: vec!["Generated".to_owned()],
            ..RcConfig::default()
        };
        let context = BuildContext::from_env(env(), &config).unwrap();
        let classifier = context.classifier(&config).unwrap();
        assert_eq!(
            classifier.kind_of(Path::new("/src/Generated/A.swift")),
            crate::dependency::DependencyKind::UserExcluded
        );
    }
}
