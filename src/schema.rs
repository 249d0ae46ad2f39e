use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    config::ReaderConfig,
    data::{DeclaredType, FieldType, SheetField},
    error::ReadError,
    normalize::StringNormalizer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Record key the coerced value is stored under.
    pub field: String,
    pub header: String,
    pub column_index: Option<usize>,
    pub exact_match: bool,
    pub required: bool,
    pub value_type: DeclaredType,
}

impl FieldDecl {
    pub fn new(field: impl Into<String>, value_type: impl Into<DeclaredType>) -> Self {
        Self {
            field: field.into(),
            header: String::new(),
            column_index: None,
            exact_match: false,
            required: false,
            value_type: value_type.into(),
        }
    }

    /// Declaration typed after the Rust field it will be read into.
    pub fn of<T: SheetField>(field: impl Into<String>) -> Self {
        Self::new(field, T::TYPE)
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn column(mut self, index: usize) -> Self {
        self.column_index = Some(index);
        self
    }

    pub fn exact(mut self) -> Self {
        self.exact_match = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field: String,
    /// Header text as declared.
    pub name: String,
    pub normalized: String,
    pub column_index: Option<usize>,
    pub exact_match: bool,
    /// Recorded for reporting only; a missing value is not rejected.
    pub required: bool,
    pub field_type: FieldType,
}

impl FieldDescriptor {
    /// Descriptors without a positional override are resolved by header text.
    pub fn is_name_based(&self) -> bool {
        self.column_index.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    descriptors: Vec<FieldDescriptor>,
    normalizer: StringNormalizer,
}

impl Schema {
    pub fn build(decls: &[FieldDecl], config: &ReaderConfig) -> Result<Self, ReadError> {
        if decls.is_empty() {
            return Err(ReadError::Schema(
                "no fields declared for mapping".to_string(),
            ));
        }
        let normalizer = StringNormalizer::new(&config.normalizer)?;

        let mut descriptors: Vec<FieldDescriptor> = Vec::with_capacity(decls.len());
        let mut field_ids: HashSet<&str> = HashSet::new();
        let mut names: HashMap<String, usize> = HashMap::new();
        let mut columns: BTreeMap<usize, usize> = BTreeMap::new();

        for decl in decls {
            let normalized = normalizer.normalize(&decl.header);
            if normalized.is_empty() && decl.column_index.is_none() {
                return Err(ReadError::Schema(format!(
                    "field '{}' declares neither a header name nor a column index",
                    decl.field
                )));
            }
            if !field_ids.insert(decl.field.as_str()) {
                return Err(ReadError::Schema(format!(
                    "field '{}' is declared more than once",
                    decl.field
                )));
            }
            if !normalized.is_empty()
                && let Some(previous) = names.get(&normalized)
            {
                return Err(ReadError::Schema(format!(
                    "fields '{}' and '{}' share the header name '{}'",
                    descriptors[*previous].field, decl.field, normalized
                )));
            }
            if let Some(column) = decl.column_index
                && let Some(previous) = columns.get(&column)
            {
                return Err(ReadError::Schema(format!(
                    "fields '{}' and '{}' share column index {column}",
                    descriptors[*previous].field, decl.field
                )));
            }
            let field_type = match &decl.value_type {
                DeclaredType::Known(field_type) => *field_type,
                DeclaredType::Unknown(name) => {
                    return Err(ReadError::Schema(format!(
                        "field '{}' has unsupported value type '{name}'",
                        decl.field
                    )));
                }
            };

            let position = descriptors.len();
            if !normalized.is_empty() {
                names.insert(normalized.clone(), position);
            }
            if let Some(column) = decl.column_index {
                columns.insert(column, position);
            }
            descriptors.push(FieldDescriptor {
                field: decl.field.clone(),
                name: decl.header.clone(),
                normalized,
                column_index: decl.column_index,
                exact_match: decl.exact_match,
                required: decl.required,
                field_type,
            });
        }

        if !config.exact_header_match {
            check_overlapping_names(&descriptors)?;
        }

        Ok(Self {
            descriptors,
            normalizer,
        })
    }

    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn normalizer(&self) -> &StringNormalizer {
        &self.normalizer
    }
}

/// Two loosely matched names where one contains the other could both bind
/// to the same header cell.
fn check_overlapping_names(descriptors: &[FieldDescriptor]) -> Result<(), ReadError> {
    let loose: Vec<&FieldDescriptor> = descriptors
        .iter()
        .filter(|d| d.is_name_based() && !d.exact_match)
        .collect();
    for (idx, left) in loose.iter().enumerate() {
        for right in &loose[idx + 1..] {
            if left.normalized.contains(&right.normalized)
                || right.normalized.contains(&left.normalized)
            {
                return Err(ReadError::Schema(format!(
                    "header names '{}' ({}) and '{}' ({}) overlap; mark one as exact or give it a column index",
                    left.name, left.field, right.name, right.field
                )));
            }
        }
    }
    Ok(())
}

/// Field declarations loaded from YAML.
///
/// ```yaml
/// fields:
///   - field: code
///     header: Código
///     type: i64
///   - field: note
///     column: 4
///     type: Option<string>
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldTable {
    pub fields: Vec<FieldEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldEntry {
    pub field: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub column: Option<usize>,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default = "default_entry_type")]
    pub value_type: String,
}

fn default_entry_type() -> String {
    "Option<string>".to_string()
}

impl FieldTable {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening field table {path:?}"))?;
        let reader = BufReader::new(file);
        let table: FieldTable =
            serde_yaml::from_reader(reader).context("Parsing field table YAML")?;
        Ok(table)
    }

    pub fn decls(&self) -> Vec<FieldDecl> {
        self.fields
            .iter()
            .map(|entry| FieldDecl {
                field: entry.field.clone(),
                header: entry.header.clone(),
                column_index: entry.column,
                exact_match: entry.exact,
                required: entry.required,
                value_type: DeclaredType::from(entry.value_type.as_str()),
            })
            .collect()
    }
}
