//! Institution id to parser lookup.
//!
//! A [`RegistryBuilder`] collects registrations and is consumed by
//! [`RegistryBuilder::freeze`]; the resulting [`ParserRegistry`] has no way to
//! register anything further.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parsers::{AmexExcelParser, CibcCostcoParser, StatementParser};

pub const DEFAULT_PARSERS_TOML: &str = include_str!("../defaults/parsers.toml");

pub type ParserFactory = fn() -> Box<dyn StatementParser>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Parser for '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("Unknown parser class '{0}'")]
    UnknownParserClass(String),
    #[error("No parser registered for '{id}'. Available parsers: {available}")]
    NotRegistered { id: String, available: String },
    #[error("Invalid parser configuration: {0}")]
    InvalidConfig(String),
}

/// One `[[parsers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParserConfig {
    pub financial_institution: String,
    pub class: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsersFile {
    #[serde(default)]
    pub parsers: Vec<ParserConfig>,
}

impl ParsersFile {
    pub fn from_toml(toml_content: &str) -> Result<Self, RegistryError> {
        toml::from_str(toml_content).map_err(|e| RegistryError::InvalidConfig(e.to_string()))
    }

    pub fn packaged() -> Result<Self, RegistryError> {
        Self::from_toml(DEFAULT_PARSERS_TOML)
    }
}

struct Entry {
    id: String,
    factory: ParserFactory,
    extensions: Vec<String>,
}

/// Resolves a configured class reference to a factory. Only the final path
/// segment is significant, so `outlay_import::parsers::AmexExcelParser` and
/// `parsers.amex.AmexExcelParser` resolve alike.
pub fn factory_for_class(class: &str) -> Option<ParserFactory> {
    let name = class.rsplit([':', '.']).next().unwrap_or(class).trim();
    match name {
        "AmexExcelParser" => Some(amex as ParserFactory),
        "CibcCostcoParser" => Some(cibc_costco as ParserFactory),
        _ => None,
    }
}

fn amex() -> Box<dyn StatementParser> {
    Box::new(AmexExcelParser::new())
}

fn cibc_costco() -> Box<dyn StatementParser> {
    Box::new(CibcCostcoParser::new())
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, factory: ParserFactory) -> Result<&mut Self, RegistryError> {
        self.register_with_extensions(id, factory, Vec::new())
    }

    pub fn register_with_extensions(
        &mut self,
        id: &str,
        factory: ParserFactory,
        extensions: Vec<String>,
    ) -> Result<&mut Self, RegistryError> {
        if self.entries.iter().any(|e| e.id == id) {
            return Err(RegistryError::AlreadyRegistered(id.to_string()));
        }
        self.entries.push(Entry {
            id: id.to_string(),
            factory,
            extensions: extensions.iter().map(|e| normalize_extension(e)).collect(),
        });
        Ok(self)
    }

    pub fn register_config(&mut self, config: &ParserConfig) -> Result<&mut Self, RegistryError> {
        let factory = factory_for_class(&config.class)
            .ok_or_else(|| RegistryError::UnknownParserClass(config.class.clone()))?;
        self.register_with_extensions(&config.financial_institution, factory, config.extensions.clone())
    }

    pub fn from_config(file: &ParsersFile) -> Result<Self, RegistryError> {
        let mut builder = Self::new();
        for entry in &file.parsers {
            builder.register_config(entry)?;
        }
        Ok(builder)
    }

    pub fn freeze(self) -> ParserRegistry {
        tracing::debug!(parsers = self.entries.len(), "parser registry frozen");
        ParserRegistry {
            entries: self.entries,
        }
    }
}

/// Frozen parser lookup, built once at startup and shared read-only afterwards.
pub struct ParserRegistry {
    entries: Vec<Entry>,
}

impl ParserRegistry {
    /// Registry over the parsers shipped in `defaults/parsers.toml`.
    pub fn packaged() -> Result<Self, RegistryError> {
        Ok(RegistryBuilder::from_config(&ParsersFile::packaged()?)?.freeze())
    }

    /// Fresh parser instance for `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn StatementParser>, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| (e.factory)())
            .ok_or_else(|| RegistryError::NotRegistered {
                id: id.to_string(),
                available: self.available().join(", "),
            })
    }

    /// Registered ids in registration order.
    pub fn available(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Ids whose configured extensions accept this file.
    pub fn institutions_for(&self, path: &Path) -> Vec<&str> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Vec::new();
        };
        let ext = normalize_extension(ext);
        self.entries
            .iter()
            .filter(|e| e.extensions.contains(&ext))
            .map(|e| e.id.as_str())
            .collect()
    }
}

fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}
