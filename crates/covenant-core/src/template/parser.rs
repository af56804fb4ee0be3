//! Template parsing and placeholder substitution.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::TemplateError;

lazy_static! {
    static ref METADATA_LINE: Regex = Regex::new(r"^#\s*([A-Za-z0-9_-]+)\s*:\s*(.*?)\s*$").unwrap();
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// A loaded contract template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Contract-type identifier the template is registered under
    pub key: String,
    pub body: String,
    /// Leading `#key: value` lines, keys lowercased
    pub metadata: BTreeMap<String, String>,
}

impl Template {
    /// Split leading metadata lines from the body.
    ///
    /// Metadata stops at the first line that is not `#key: value`. One blank
    /// separator line after the metadata block is dropped.
    pub fn parse(key: impl Into<String>, raw: &str) -> Self {
        let mut metadata = BTreeMap::new();
        let mut offset = 0;

        for line in raw.split_inclusive('\n') {
            let content = line.trim_end_matches(['\r', '\n']);
            match METADATA_LINE.captures(content) {
                Some(caps) => {
                    metadata.insert(caps[1].to_lowercase(), caps[2].to_string());
                    offset += line.len();
                }
                None => break,
            }
        }

        let mut body = &raw[offset..];
        if !metadata.is_empty() {
            if let Some(rest) = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')) {
                body = rest;
            }
        }

        Self {
            key: key.into(),
            body: body.to_string(),
            metadata,
        }
    }

    pub fn from_file(key: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(key, &raw))
    }

    /// Human-readable title: the `title` metadata entry, or the key.
    pub fn title(&self) -> &str {
        self.metadata
            .get("title")
            .map(String::as_str)
            .unwrap_or(&self.key)
    }

    pub fn placeholders(&self) -> BTreeSet<String> {
        find_placeholders(&self.body)
    }

    /// Replace known placeholders; unknown ones are left intact.
    pub fn render(&self, values: &BTreeMap<String, String>) -> String {
        substitute(&self.body, values)
    }
}

/// Names of all `{placeholder}` tokens in `text`.
pub fn find_placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Single-pass substitution: values containing braces are never re-expanded.
pub fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
