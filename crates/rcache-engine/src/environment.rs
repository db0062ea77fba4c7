//! Environment fingerprint of the build step.

use std::collections::HashMap;

use once_cell::unsync::OnceCell;

use crate::fingerprint::{FingerprintAccumulator, RawFingerprint};

/// Variables that always contribute, in order.
pub const FINGERPRINT_ENVS: [&str; 11] = [
    "GCC_PREPROCESSOR_DEFINITIONS",
    "CLANG_COVERAGE_MAPPING",
    "TARGET_NAME",
    "CONFIGURATION",
    "PLATFORM_NAME",
    "XCODE_PRODUCT_BUILD_VERSION",
    "CURRENT_PROJECT_VERSION",
    "DYLIB_COMPATIBILITY_VERSION",
    "DYLIB_CURRENT_VERSION",
    "PRODUCT_MODULE_NAME",
    "ARCHS",
];

/// Appended last. Bump it whenever the meaning of the variable list changes so
/// every existing cache entry is invalidated.
pub const FINGERPRINT_VERSION: &str = "5";

/// Fingerprint of the build settings that affect every compilation of a target.
///
/// Computed on the first call to [`generate`](Self::generate) and cached for
/// the lifetime of the instance.
pub struct EnvironmentFingerprintGenerator<A> {
    env: HashMap<String, String>,
    custom_envs: Vec<String>,
    accumulator: A,
    fingerprint: OnceCell<RawFingerprint>,
}

impl<A: FingerprintAccumulator> EnvironmentFingerprintGenerator<A> {
    pub fn new(env: HashMap<String, String>, custom_envs: Vec<String>, accumulator: A) -> Self {
        Self {
            env,
            custom_envs,
            accumulator,
            fingerprint: OnceCell::new(),
        }
    }

    /// Unset variables contribute an empty string.
    pub fn generate(&mut self) -> RawFingerprint {
        let Self {
            env,
            custom_envs,
            accumulator,
            fingerprint,
        } = self;
        fingerprint
            .get_or_init(|| {
                accumulator.reset();
                let names = FINGERPRINT_ENVS
                    .iter()
                    .copied()
                    .chain(custom_envs.iter().map(String::as_str));
                for name in names {
                    accumulator.append_str(env.get(name).map_or("", String::as_str));
                }
                accumulator.append_str(FINGERPRINT_VERSION);
                let value = accumulator.generate();
                tracing::debug!(fingerprint = %value, "computed environment fingerprint");
                value
            })
            .clone()
    }
}
