// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Run-name patterns for bulk operations.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid run pattern: {0}")]
pub struct PatternError(#[from] regex::Error);

/// A whole-name regex with an optional required substring.
///
/// Empty patterns (and the empty non-capturing group `(?:)`) match every
/// name.
#[derive(Debug, Clone)]
pub struct RunPattern {
    regex: Option<Regex>,
    substring: Option<String>,
}

fn is_match_all(pattern: &str) -> bool {
    matches!(pattern.trim(), "" | "(?:)" | ".*" | "^.*$")
}

impl RunPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = if is_match_all(pattern) {
            None
        } else {
            Some(Regex::new(&format!("^(?:{pattern})$"))?)
        };
        Ok(Self {
            regex,
            substring: None,
        })
    }

    /// A pattern that additionally requires `substring` to appear in the name.
    pub fn with_substring(pattern: &str, substring: &str) -> Result<Self, PatternError> {
        let mut compiled = Self::new(pattern)?;
        if !substring.is_empty() {
            compiled.substring = Some(substring.to_string());
        }
        Ok(compiled)
    }

    pub fn match_all() -> Self {
        Self {
            regex: None,
            substring: None,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let regex_ok = self.regex.as_ref().map_or(true, |re| re.is_match(name));
        let substring_ok = self
            .substring
            .as_deref()
            .map_or(true, |sub| name.contains(sub));
        regex_ok && substring_ok
    }

    pub fn is_match_all(&self) -> bool {
        self.regex.is_none() && self.substring.is_none()
    }
}
