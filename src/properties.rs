//! String property table handed to adapters, loaded from property files and
//! `key=value` overrides on the command line.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PropertiesError {
    #[error("failed to read property file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin}:{line}: expected `key=value`, got `{text}`")]
    Syntax {
        origin: String,
        line: usize,
        text: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, PropertiesError> {
        let text = fs::read_to_string(path).map_err(|source| PropertiesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse `key=value` or `key: value` lines. Blank lines and lines
    /// starting with `#` or `!` are skipped.
    pub fn parse(text: &str, origin: &str) -> Result<Self, PropertiesError> {
        let mut properties = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = split_pair(line).ok_or_else(|| PropertiesError::Syntax {
                origin: origin.to_string(),
                line: index + 1,
                text: line.to_string(),
            })?;
            properties.set(key, value);
        }
        Ok(properties)
    }

    /// Parse a single command-line override.
    pub fn parse_override(arg: &str) -> Result<(String, String), PropertiesError> {
        split_pair(arg.trim())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .ok_or_else(|| PropertiesError::Syntax {
                origin: "command line".to_string(),
                line: 1,
                text: arg.to_string(),
            })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: Properties) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    let at = line.find(['=', ':'])?;
    let key = line[..at].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[at + 1..].trim()))
}
