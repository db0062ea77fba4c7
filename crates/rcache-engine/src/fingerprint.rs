//! Fingerprint accumulation.

use std::fmt;
use std::path::{Path, PathBuf};

use rcache_util::FileReader;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// An opaque digest. Only ever compared and stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFingerprint(String);

impl RawFingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-sensitive digest builder.
pub trait FingerprintAccumulator {
    /// Drop everything appended so far.
    fn reset(&mut self);

    fn append_str(&mut self, text: &str);

    /// Append the content of `path`.
    ///
    /// Content that is not valid UTF-8 contributes nothing.
    ///
    /// # Errors
    /// Returns `MissingExpectedFile` if nothing exists at `path`, or an I/O
    /// error if it cannot be read.
    fn append_file(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Digest of everything appended since the last reset. Does not reset.
    fn generate(&self) -> RawFingerprint;
}

/// SHA-256 over the appended content.
///
/// Every append is length-prefixed, so moving bytes from one append to the
/// next changes the digest.
pub struct Sha256Accumulator<R> {
    reader: R,
    hasher: Sha256,
}

impl<R: FileReader> Sha256Accumulator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Sha256::new(),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}

impl<R: FileReader> FingerprintAccumulator for Sha256Accumulator<R> {
    fn reset(&mut self) {
        self.hasher = Sha256::new();
    }

    fn append_str(&mut self, text: &str) {
        self.update(text.as_bytes());
    }

    fn append_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let Some(content) = self.reader.contents(path)? else {
            tracing::error!(path = %path.display(), "file expected for fingerprinting is missing");
            return Err(EngineError::missing_expected(path));
        };
        match std::str::from_utf8(&content) {
            Ok(text) => self.update(text.as_bytes()),
            Err(_) => {
                tracing::debug!(
                    path = %path.display(),
                    "skipping non-UTF-8 content in fingerprint"
                );
            }
        }
        Ok(())
    }

    fn generate(&self) -> RawFingerprint {
        RawFingerprint(rcache_util::hash::hex(self.hasher.clone()))
    }
}

/// Result of [`FingerprintGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Digest of the appended content alone.
    pub raw: RawFingerprint,
    /// Content digest combined with the environment fingerprint.
    pub context_specific: RawFingerprint,
}

/// Combines appended content with an environment fingerprint.
pub struct FingerprintGenerator<A> {
    env_fingerprint: RawFingerprint,
    accumulator: A,
}

impl<A: FingerprintAccumulator> FingerprintGenerator<A> {
    pub fn new(env_fingerprint: RawFingerprint, accumulator: A) -> Self {
        Self {
            env_fingerprint,
            accumulator,
        }
    }

    pub fn append_str(&mut self, text: &str) {
        self.accumulator.append_str(text);
    }

    /// # Errors
    /// See [`FingerprintAccumulator::append_file`].
    pub fn append_file(&mut self, path: &Path) -> Result<(), EngineError> {
        self.accumulator.append_file(path)
    }

    /// Append every file in order, stopping at the first failure.
    ///
    /// # Errors
    /// See [`FingerprintAccumulator::append_file`].
    pub fn append_files(&mut self, paths: &[PathBuf]) -> Result<(), EngineError> {
        paths.iter().try_for_each(|path| self.append_file(path))
    }

    pub fn reset(&mut self) {
        self.accumulator.reset();
    }

    pub fn generate(&self) -> Fingerprint {
        let raw = self.accumulator.generate();
        let context_specific = RawFingerprint(rcache_util::hash::sha256_multi(&[
            raw.as_str(),
            self.env_fingerprint.as_str(),
        ]));
        Fingerprint {
            raw,
            context_specific,
        }
    }
}

/// Content-only digest of `paths` in the given order.
///
/// # Errors
/// Returns `MissingExpectedFile` for the first path that does not exist.
pub fn content_fingerprint(
    reader: impl FileReader,
    paths: &[PathBuf],
) -> Result<RawFingerprint, EngineError> {
    let mut accumulator = Sha256Accumulator::new(reader);
    for path in paths {
        accumulator.append_file(path)?;
    }
    Ok(accumulator.generate())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use proptest::prelude::*;
    use rcache_util::hash::sha256_bytes;
    use rcache_util::LocalFs;

    use super::*;

    #[test]
    fn empty_accumulator_is_empty_digest() {
        let accumulator = Sha256Accumulator::new(LocalFs);
        assert_eq!(accumulator.generate().as_str(), sha256_bytes(b""));
    }

    #[test]
    fn generate_is_idempotent() {
        let mut accumulator = Sha256Accumulator::new(LocalFs);
        accumulator.append_str("abc");
        assert_eq!(accumulator.generate(), accumulator.generate());
    }

    #[test]
    fn appends_are_order_sensitive() {
        let mut first = Sha256Accumulator::new(LocalFs);
        first.append_str("a");
        first.append_str("b");
        let mut second = Sha256Accumulator::new(LocalFs);
        second.append_str("b");
        second.append_str("a");
        assert_ne!(first.generate(), second.generate());
    }

    #[test]
    fn reset_clears_state() {
        let mut accumulator = Sha256Accumulator::new(LocalFs);
        accumulator.append_str("stale");
        accumulator.reset();
        accumulator.append_str("fresh");

        let mut clean = Sha256Accumulator::new(LocalFs);
        clean.append_str("fresh");
        assert_eq!(accumulator.generate(), clean.generate());
    }

    #[test]
    fn file_content_hashes_like_the_same_string() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("Module-Swift.h");
        fs::write(&file, "Some $(SRCROOT)").unwrap();

        let mut from_file = Sha256Accumulator::new(LocalFs);
        from_file.append_file(&file).unwrap();
        let mut from_str = Sha256Accumulator::new(LocalFs);
        from_str.append_str("Some $(SRCROOT)");

        assert_eq!(from_file.generate(), from_str.generate());
    }

    #[test]
    fn append_boundaries_change_the_digest() {
        let mut first = Sha256Accumulator::new(LocalFs);
        first.append_str("AB");
        first.append_str("");
        let mut second = Sha256Accumulator::new(LocalFs);
        second.append_str("A");
        second.append_str("B");
        assert_ne!(first.generate(), second.generate());
    }

    #[test]
    fn moving_code_between_adjacent_files_changes_the_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("A.swift");
        let b = tmp.path().join("B.swift");
        let files = [a.clone(), b.clone()];

        fs::write(&a, "func a() {}\nfunc b() {}\n").unwrap();
        fs::write(&b, "").unwrap();
        let mut before =
            FingerprintGenerator::new(RawFingerprint::new("env"), Sha256Accumulator::new(LocalFs));
        before.append_files(&files).unwrap();

        fs::write(&a, "func a() {}\n").unwrap();
        fs::write(&b, "func b() {}\n").unwrap();
        let mut after =
            FingerprintGenerator::new(RawFingerprint::new("env"), Sha256Accumulator::new(LocalFs));
        after.append_files(&files).unwrap();

        assert_ne!(
            before.generate().context_specific,
            after.generate().context_specific
        );
    }

    #[test]
    fn missing_file_is_an_error_naming_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("A.o");

        let mut accumulator = Sha256Accumulator::new(LocalFs);
        let err = accumulator.append_file(&missing).unwrap_err();

        assert!(matches!(
            &err,
            EngineError::MissingExpectedFile { path } if *path == missing.display().to_string()
        ));
    }

    #[test]
    fn non_utf8_file_contributes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let binary = tmp.path().join("image.png");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let mut accumulator = Sha256Accumulator::new(LocalFs);
        accumulator.append_str("x");
        accumulator.append_file(&binary).unwrap();

        let mut plain = Sha256Accumulator::new(LocalFs);
        plain.append_str("x");
        assert_eq!(accumulator.generate(), plain.generate());
    }

    #[test]
    fn environment_changes_context_specific_only() {
        let mut first = FingerprintGenerator::new(
            RawFingerprint::new("env-a"),
            Sha256Accumulator::new(LocalFs),
        );
        let mut second = FingerprintGenerator::new(
            RawFingerprint::new("env-b"),
            Sha256Accumulator::new(LocalFs),
        );
        first.append_str("content");
        second.append_str("content");

        let a = first.generate();
        let b = second.generate();
        assert_eq!(a.raw, b.raw);
        assert_ne!(a.context_specific, b.context_specific);
    }

    #[test]
    fn environment_and_content_are_not_interchangeable() {
        let mut first =
            FingerprintGenerator::new(RawFingerprint::new("x"), Sha256Accumulator::new(LocalFs));
        first.append_str("y");
        let mut second =
            FingerprintGenerator::new(RawFingerprint::new("y"), Sha256Accumulator::new(LocalFs));
        second.append_str("x");

        assert_ne!(
            first.generate().context_specific,
            second.generate().context_specific
        );
    }

    #[test]
    fn append_files_stops_at_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("a.swift");
        fs::write(&present, "a").unwrap();
        let missing = tmp.path().join("b.swift");

        let mut generator =
            FingerprintGenerator::new(RawFingerprint::default(), Sha256Accumulator::new(LocalFs));
        let err = generator.append_files(&[present, missing]).unwrap_err();
        assert!(matches!(err, EngineError::MissingExpectedFile { .. }));
    }

    #[test]
    fn content_fingerprint_ignores_file_location() {
        let tmp = tempfile::tempdir().unwrap();
        let producer = tmp.path().join("producer.xcassets");
        let consumer = tmp.path().join("consumer.xcassets");
        fs::write(&producer, "catalog").unwrap();
        fs::write(&consumer, "catalog").unwrap();

        assert_eq!(
            content_fingerprint(LocalFs, &[producer]).unwrap(),
            content_fingerprint(LocalFs, &[consumer]).unwrap()
        );
    }

    proptest! {
        #[test]
        fn same_appends_give_same_fingerprint(parts in prop::collection::vec(".*", 0..8)) {
            let env = RawFingerprint::new("env");
            let mut first = FingerprintGenerator::new(env.clone(), Sha256Accumulator::new(LocalFs));
            let mut second = FingerprintGenerator::new(env, Sha256Accumulator::new(LocalFs));
            for part in &parts {
                first.append_str(part);
                second.append_str(part);
            }
            prop_assert_eq!(first.generate(), second.generate());
        }
    }
}
