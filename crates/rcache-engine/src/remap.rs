//! Conversion between generic placeholders and local absolute paths.

use std::path::{Path, PathBuf};

use rcache_util::{FileReader, FileWriter};

use crate::error::EngineError;

/// A placeholder such as `$(SRCROOT)` and the local path it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapRule {
    pub generic: String,
    pub local: String,
}

impl RemapRule {
    pub fn new(generic: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            generic: generic.into(),
            local: local.into(),
        }
    }
}

/// Which form text is converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapDirection {
    ToLocal,
    ToGeneric,
}

/// Ordered remapping rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRemapper {
    rules: Vec<RemapRule>,
}

impl PathRemapper {
    /// Rules with an empty side are dropped.
    pub fn new(rules: Vec<RemapRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter(|rule| !rule.generic.is_empty() && !rule.local.is_empty())
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[RemapRule] {
        &self.rules
    }

    /// Replace placeholders with local paths, rules in declared order.
    pub fn to_local(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_owned(), |acc, rule| acc.replace(&rule.generic, &rule.local))
    }

    /// Replace local paths with placeholders, longest local path first so
    /// `/src/Pods` is not partially taken by `/src`.
    ///
    /// A local path only matches where it ends a path component: `/src` is
    /// replaced in `/src/A.h` but not in `/srcExtra/A.h`.
    pub fn to_generic(&self, text: &str) -> String {
        let mut ordered: Vec<&RemapRule> = self.rules.iter().collect();
        ordered.sort_by(|a, b| b.local.len().cmp(&a.local.len()));
        ordered.into_iter().fold(text.to_owned(), |acc, rule| {
            replace_components(&acc, &rule.local, &rule.generic)
        })
    }

    pub fn apply(&self, text: &str, direction: RemapDirection) -> String {
        match direction {
            RemapDirection::ToLocal => self.to_local(text),
            RemapDirection::ToGeneric => self.to_generic(text),
        }
    }

    pub fn path_to_local(&self, path: &str) -> PathBuf {
        PathBuf::from(self.to_local(path))
    }

    pub fn path_to_generic(&self, path: &Path) -> String {
        self.to_generic(&path.to_string_lossy())
    }
}

fn replace_components(text: &str, local: &str, generic: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(local) {
        let (before, tail) = rest.split_at(pos);
        out.push_str(before);
        let after = tail.strip_prefix(local).unwrap_or_default();
        let at_boundary = local.ends_with('/') || !after.chars().next().is_some_and(is_name_char);
        out.push_str(if at_boundary { generic } else { local });
        rest = after;
    }
    out.push_str(rest);
    out
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '@')
}

/// Rewrites whole text files in place.
#[derive(Debug, Clone)]
pub struct FileRemapper<F> {
    remapper: PathRemapper,
    fs: F,
}

impl<F: FileReader + FileWriter> FileRemapper<F> {
    pub fn new(remapper: PathRemapper, fs: F) -> Self {
        Self { remapper, fs }
    }

    /// Rewrite `path`. Unchanged content is not written back.
    ///
    /// # Errors
    /// Returns `MissingExpectedFile` if the file is absent, `InvalidFormat` if
    /// it is not UTF-8, or an I/O error if it cannot be read or written.
    pub fn remap(&self, path: &Path, direction: RemapDirection) -> Result<(), EngineError> {
        let Some(content) = self.fs.contents(path)? else {
            return Err(EngineError::missing_expected(path));
        };
        let text = String::from_utf8(content).map_err(|_| EngineError::InvalidFormat {
            path: path.display().to_string(),
            message: "content is not UTF-8".to_owned(),
        })?;
        let remapped = self.remapper.apply(&text, direction);
        if remapped != text {
            self.fs.write(path, remapped.as_bytes())?;
            tracing::debug!(path = %path.display(), ?direction, "remapped file");
        }
        Ok(())
    }
}
