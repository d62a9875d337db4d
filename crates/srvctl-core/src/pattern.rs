// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered include/exclude rules over file-system paths.
//!
//! A [`PatternFilter`] starts from its [`DefaultPolicy`] and then tests every
//! rule in registration order. An include match sets the decision to
//! included, an exclude match sets it to excluded, regardless of what came
//! before. The value left after the last rule is the answer, so a later rule
//! always overrides an earlier one:
//!
//! ```text
//! default: exclude
//! include  /a/.*            /a/secret.txt -> included
//! exclude  /a/secret\.txt   /a/secret.txt -> excluded   (final)
//! ```
//!
//! Rules are unanchored regular expressions searched in the absolute,
//! forward-slash-normalized path. Directories are tested with a trailing `/`
//! so `/logs/` matches the `logs` directory itself as well as its contents.

use regex::Regex;
use std::path::Path;
use thiserror::Error;

/// Pattern compilation errors.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Base decision before any rule is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    IncludeByDefault,
    ExcludeByDefault,
}

/// Effect of a matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
struct PatternRule {
    polarity: Polarity,
    regex: Regex,
}

/// Immutable, ordered rule list.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    default_policy: DefaultPolicy,
    rules: Vec<PatternRule>,
}

impl PatternFilter {
    pub fn builder(default_policy: DefaultPolicy) -> PatternFilterBuilder {
        PatternFilterBuilder {
            default_policy,
            rules: Vec::new(),
        }
    }

    /// Filter with no rules.
    pub fn include_all() -> Self {
        Self::builder(DefaultPolicy::IncludeByDefault).build()
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Decide membership for an already normalized path.
    pub fn evaluate(&self, path: &str) -> bool {
        let mut included = self.default_policy == DefaultPolicy::IncludeByDefault;
        for rule in &self.rules {
            if rule.regex.is_match(path) {
                included = rule.polarity == Polarity::Include;
            }
        }
        included
    }

    /// Decide membership for a file-system path.
    pub fn evaluate_path(&self, path: &Path, is_dir: bool) -> bool {
        let mut normalized = normalize_path(path);
        if is_dir && !normalized.ends_with('/') {
            normalized.push('/');
        }
        self.evaluate(&normalized)
    }
}

/// Accumulates rules in order; [`PatternFilterBuilder::build`] freezes them.
#[derive(Debug, Clone)]
pub struct PatternFilterBuilder {
    default_policy: DefaultPolicy,
    rules: Vec<PatternRule>,
}

impl PatternFilterBuilder {
    /// Append an include rule.
    pub fn include(self, pattern: &str) -> Result<Self, PatternError> {
        let regex = compile(pattern)?;
        Ok(self.rule(Polarity::Include, regex))
    }

    /// Append an exclude rule.
    pub fn exclude(self, pattern: &str) -> Result<Self, PatternError> {
        let regex = compile(pattern)?;
        Ok(self.rule(Polarity::Exclude, regex))
    }

    /// Append an already compiled rule.
    pub fn rule(mut self, polarity: Polarity, regex: Regex) -> Self {
        self.rules.push(PatternRule { polarity, regex });
        self
    }

    /// Include `path` and everything below it.
    pub fn include_tree(self, path: &Path) -> Self {
        let regex = tree_regex(path);
        self.rule(Polarity::Include, regex)
    }

    /// Exclude `path` and everything below it.
    pub fn exclude_tree(self, path: &Path) -> Self {
        let regex = tree_regex(path);
        self.rule(Polarity::Exclude, regex)
    }

    /// Exclude exactly `path`.
    pub fn exclude_file(self, path: &Path) -> Self {
        let regex = file_regex(path);
        self.rule(Polarity::Exclude, regex)
    }

    /// Include exactly `path`.
    pub fn include_file(self, path: &Path) -> Self {
        let regex = file_regex(path);
        self.rule(Polarity::Include, regex)
    }

    /// Include exactly the directory `path`, not its contents.
    pub fn include_dir(self, path: &Path) -> Self {
        let text = normalize_path(path);
        let text = text.trim_end_matches('/');
        let regex = Regex::new(&format!("^{}/$", regex::escape(text))).expect("escaped pattern");
        self.rule(Polarity::Include, regex)
    }

    pub fn build(self) -> PatternFilter {
        PatternFilter {
            default_policy: self.default_policy,
            rules: self.rules,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError::Invalid {
        pattern: pattern.to_string(),
        source,
    })
}

fn tree_regex(path: &Path) -> Regex {
    let prefix = normalize_path(path);
    let prefix = prefix.trim_end_matches('/');
    // Escaped input always compiles.
    Regex::new(&format!("^{}(/|$)", regex::escape(prefix))).expect("escaped pattern")
}

fn file_regex(path: &Path) -> Regex {
    let text = normalize_path(path);
    Regex::new(&format!("^{}$", regex::escape(&text))).expect("escaped pattern")
}

/// Convert a path to the forward-slash form rules are matched against.
pub fn normalize_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Escape a literal (server name, install path) for embedding in a rule.
pub fn quote(literal: &str) -> String {
    regex::escape(literal)
}

/// Translate an ant-style glob into a regex fragment.
///
/// `**` matches across directories, `*` and `?` stay within one segment.
/// The result is not anchored.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // "**/" also matches zero directories
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '\\' => out.push('/'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}
