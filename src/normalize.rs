use std::borrow::Cow;

use regex::Regex;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{config::NormalizerConfig, error::ReadError};

#[derive(Debug, Clone)]
pub struct StringNormalizer {
    case_sensitive: bool,
    strip_accents: bool,
    strip_pattern: Option<Regex>,
}

impl StringNormalizer {
    pub fn new(config: &NormalizerConfig) -> Result<Self, ReadError> {
        let strip_pattern = if config.apply_pattern {
            let regex = Regex::new(&config.strip_pattern).map_err(|err| {
                ReadError::InvalidConfig(format!(
                    "strip_pattern '{}' is not a valid regex: {err}",
                    config.strip_pattern
                ))
            })?;
            Some(regex)
        } else {
            None
        };
        Ok(Self {
            case_sensitive: config.case_sensitive,
            strip_accents: config.strip_accents,
            strip_pattern,
        })
    }

    /// Returns the canonical form of `text`. The result may be empty, in which
    /// case the text carries nothing comparable.
    pub fn normalize(&self, text: &str) -> String {
        let mut value: String = text
            .trim()
            .chars()
            .map(|ch| match ch {
                '\n' | '\r' | '\t' => ' ',
                other => other,
            })
            .collect();

        if !self.case_sensitive {
            value = value.to_lowercase();
        }

        if self.strip_accents {
            value = remove_accents(&value);
        }

        if let Some(pattern) = &self.strip_pattern
            && let Cow::Owned(stripped) = pattern.replace_all(&value, "")
        {
            value = stripped;
        }

        value
    }
}

fn remove_accents(input: &str) -> String {
    input.nfd().filter(|ch| !is_combining_mark(*ch)).collect()
}
