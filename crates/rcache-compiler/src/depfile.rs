//! Makefile-style dependency files (`.d`) emitted by clang and swiftc.
//!
//! Handles `target... : prerequisite...` rules, backslash-newline
//! continuations, `\ ` escaped spaces, `\#` escaped hashes, `$$` escaped
//! dollars, blank lines and `#` comments.

use std::collections::BTreeMap;
use std::path::Path;

use rcache_util::FileReader;

use crate::error::CompilerError;

/// One `targets : prerequisites` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRule {
    pub targets: Vec<String>,
    pub prerequisites: Vec<String>,
}

/// A parsed dependency file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepFile {
    pub rules: Vec<DepRule>,
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Colon,
}

impl DepFile {
    /// Read and parse a dependency file.
    ///
    /// # Errors
    /// Returns `ReadingFailed` if the file does not exist and `InvalidFormat`
    /// if a line is not a rule.
    pub fn from_path(path: &Path, reader: &impl FileReader) -> Result<Self, CompilerError> {
        let origin = path.display().to_string();
        let Some(content) = reader.contents(path)? else {
            return Err(CompilerError::ReadingFailed { path: origin });
        };
        let text = String::from_utf8_lossy(&content);
        Self::parse(&text, &origin)
    }

    /// Parse dependency file content. `origin` names the source in error messages.
    ///
    /// # Errors
    /// Returns `InvalidFormat` if a non-empty line has no `:` separator.
    pub fn parse(content: &str, origin: &str) -> Result<Self, CompilerError> {
        let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");

        let mut rules = Vec::new();
        for (index, line) in joined.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let tokens = tokenize(trimmed);
            let Some(colon) = tokens.iter().position(|t| *t == Token::Colon) else {
                return Err(CompilerError::InvalidFormat {
                    path: origin.to_owned(),
                    message: format!("line {} is not a `target: prerequisites` rule", index + 1),
                });
            };

            let mut targets = Vec::new();
            let mut prerequisites = Vec::new();
            for (position, token) in tokens.into_iter().enumerate() {
                if let Token::Word(word) = token {
                    if position < colon {
                        targets.push(word);
                    } else {
                        prerequisites.push(word);
                    }
                }
            }
            rules.push(DepRule {
                targets,
                prerequisites,
            });
        }

        Ok(Self { rules })
    }

    /// Every prerequisite of every rule, deduplicated in first-seen order.
    pub fn dependencies(&self) -> Vec<String> {
        dedup(self.rules.iter().flat_map(|r| r.prerequisites.iter()))
    }

    /// The primary input of each rule (its first prerequisite), deduplicated.
    pub fn inputs(&self) -> Vec<String> {
        dedup(self.rules.iter().filter_map(|r| r.prerequisites.first()))
    }

    /// Prerequisites keyed by target. Targets named by several rules accumulate.
    pub fn files_and_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for rule in &self.rules {
            for target in &rule.targets {
                let entry = map.entry(target.clone()).or_default();
                for prerequisite in &rule.prerequisites {
                    if !entry.contains(prerequisite) {
                        entry.push(prerequisite.clone());
                    }
                }
            }
        }
        map
    }
}

fn dedup<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut seen_colon = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next) if matches!(next, ' ' | '#' | '\\') => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            '$' if chars.peek() == Some(&'$') => {
                current.push('$');
                chars.next();
            }
            ':' if !seen_colon && chars.peek().map_or(true, |n| n.is_whitespace()) => {
                if !current.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut current)));
                }
                tokens.push(Token::Colon);
                seen_colon = true;
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut current)));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(Token::Word(current));
    }
    tokens
}
