use std::{collections::BTreeSet, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ReadError;

pub const DEFAULT_MAX_COLUMN_SCAN: usize = 500;
pub const DEFAULT_MAX_HEADER_SEARCH_ROWS: usize = 100;
pub const DEFAULT_MAX_BLANK_ROWS: usize = 150;
pub const DEFAULT_HEADER_ROW_THRESHOLD: usize = 1;
pub const DEFAULT_STRIP_PATTERN: &str = "[^a-z0-9,.]";

const UNDEFINED_TOKENS: &[&str] = &[
    "-", "--", "---", "n/a", "n/d", "null", "undefined", "none", "\"", "\"\"", ".", ",", "?",
    "#div/0!",
];

const TRUE_TOKENS: &[&str] = &[
    "true",
    "yes",
    "y",
    "1",
    "sim",
    "s",
    "verdadeiro",
    "v",
    "si",
    "sin",
    "positivo",
    "ok",
    "on",
    "ativo",
];

const FALSE_TOKENS: &[&str] = &[
    "false",
    "no",
    "n",
    "0",
    "n0",
    "não",
    "nao",
    "na0",
    "f",
    "falso",
    "negativo",
    "desabilitado",
    "desligado",
    "off",
    "inativo",
];

fn token_set(tokens: &[&str]) -> BTreeSet<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Keep the original letter case when comparing headers.
    pub case_sensitive: bool,
    /// Remove diacritics (`ç` → `c`, `ã` → `a`).
    pub strip_accents: bool,
    /// Remove every character matched by [`NormalizerConfig::strip_pattern`].
    pub apply_pattern: bool,
    pub strip_pattern: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strip_accents: true,
            apply_pattern: true,
            strip_pattern: DEFAULT_STRIP_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Cells scanned per row while looking for the header.
    pub max_column_scan: usize,
    /// Rows examined before giving up on the header.
    pub max_header_search_rows: usize,
    /// Consecutive content-less rows after the header that end the sheet.
    pub max_blank_rows: usize,
    /// Consecutive rows that may together form one logical header.
    pub header_row_threshold: usize,
    pub include_hidden_sheets: bool,
    /// Treat [`ReaderConfig::undefined_tokens`] as null for non-text fields.
    pub undefined_as_null: bool,
    pub undefined_tokens: BTreeSet<String>,
    /// Compare headers with equality instead of containment for every field.
    pub exact_header_match: bool,
    pub true_tokens: BTreeSet<String>,
    pub false_tokens: BTreeSet<String>,
    pub normalizer: NormalizerConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_column_scan: DEFAULT_MAX_COLUMN_SCAN,
            max_header_search_rows: DEFAULT_MAX_HEADER_SEARCH_ROWS,
            max_blank_rows: DEFAULT_MAX_BLANK_ROWS,
            header_row_threshold: DEFAULT_HEADER_ROW_THRESHOLD,
            include_hidden_sheets: false,
            undefined_as_null: false,
            undefined_tokens: token_set(UNDEFINED_TOKENS),
            exact_header_match: false,
            true_tokens: token_set(TRUE_TOKENS),
            false_tokens: token_set(FALSE_TOKENS),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl ReaderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: ReaderConfig =
            serde_yaml::from_reader(reader).context("Parsing reader config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReadError> {
        if self.header_row_threshold == 0 {
            return Err(ReadError::InvalidConfig(
                "header_row_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_column_scan == 0 {
            return Err(ReadError::InvalidConfig(
                "max_column_scan must be at least 1".to_string(),
            ));
        }
        if let Some(token) = self.true_tokens.intersection(&self.false_tokens).next() {
            return Err(ReadError::InvalidConfig(format!(
                "token '{token}' is listed as both true and false"
            )));
        }
        Ok(())
    }
}
