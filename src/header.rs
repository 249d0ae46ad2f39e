//! Header row detection.
//!
//! Rows are offered one at a time to a [`HeaderResolver`]. Each row's cells
//! are matched against the schema's descriptors and the partial result is kept
//! in a [`HeaderWindow`] slot. When the union of the most recent
//! `header_row_threshold` slots binds every descriptor, the header is found
//! and a [`SchemaMapping`] is fixed for the rest of the sheet.

use std::collections::{BTreeMap, HashMap, VecDeque};

use log::debug;

use crate::{
    config::ReaderConfig,
    error::ReadError,
    schema::Schema,
    source::Row,
};

/// Bounded FIFO of per-row column→descriptor bindings.
#[derive(Debug, Clone)]
pub struct HeaderWindow {
    capacity: usize,
    slots: VecDeque<BTreeMap<usize, usize>>,
}

impl HeaderWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: VecDeque::with_capacity(capacity),
        }
    }

    /// Opens a slot for the next row, evicting the oldest one when full.
    pub fn start_row(&mut self) {
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(BTreeMap::new());
    }

    pub fn bind(&mut self, column: usize, descriptor: usize) {
        if let Some(slot) = self.slots.back_mut() {
            slot.insert(column, descriptor);
        }
    }

    pub fn clear_current(&mut self) {
        if let Some(slot) = self.slots.back_mut() {
            slot.clear();
        }
    }

    /// Union of all slots; later rows win on the same column.
    pub fn merged(&self) -> BTreeMap<usize, usize> {
        let mut merged = BTreeMap::new();
        for slot in &self.slots {
            merged.extend(slot.iter().map(|(column, descriptor)| (*column, *descriptor)));
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Resolved column layout of a sheet. Every descriptor is bound to exactly one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    by_column: BTreeMap<usize, usize>,
    by_descriptor: Vec<usize>,
}

impl SchemaMapping {
    fn new(by_column: BTreeMap<usize, usize>, descriptor_count: usize) -> Self {
        let mut by_descriptor = vec![0; descriptor_count];
        for (column, descriptor) in &by_column {
            by_descriptor[*descriptor] = *column;
        }
        Self {
            by_column,
            by_descriptor,
        }
    }

    pub fn descriptor_at(&self, column: usize) -> Option<usize> {
        self.by_column.get(&column).copied()
    }

    pub fn column_of(&self, descriptor: usize) -> Option<usize> {
        self.by_descriptor.get(descriptor).copied()
    }

    /// Mapped columns in declaration order of their descriptors.
    pub fn columns(&self) -> &[usize] {
        &self.by_descriptor
    }

    pub fn len(&self) -> usize {
        self.by_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }
}

pub struct HeaderResolver<'a> {
    schema: &'a Schema,
    config: &'a ReaderConfig,
    indexed: HashMap<usize, usize>,
    window: HeaderWindow,
    mapping: Option<SchemaMapping>,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(schema: &'a Schema, config: &'a ReaderConfig) -> Self {
        let indexed = schema
            .descriptors()
            .iter()
            .enumerate()
            .filter_map(|(idx, d)| d.column_index.map(|column| (column, idx)))
            .collect();
        Self {
            schema,
            config,
            indexed,
            window: HeaderWindow::new(config.header_row_threshold),
            mapping: None,
        }
    }

    pub fn mapping(&self) -> Option<&SchemaMapping> {
        self.mapping.as_ref()
    }

    /// Feeds one candidate row. Returns `true` once the header is complete.
    pub fn offer(&mut self, row: &Row) -> Result<bool, ReadError> {
        if self.mapping.is_some() {
            return Ok(true);
        }
        self.window.start_row();

        for cell in row.cells.iter().take(self.config.max_column_scan) {
            if let Some(&descriptor) = self.indexed.get(&cell.column) {
                self.window.bind(cell.column, descriptor);
                continue;
            }
            let key = self.schema.normalizer().normalize(&cell.text());
            if key.is_empty() {
                continue;
            }
            match self.match_name(&key) {
                NameMatch::None => {}
                NameMatch::One(descriptor) => self.window.bind(cell.column, descriptor),
                NameMatch::Many => {
                    debug!(
                        "Row {} is not a header: cell '{}' matches more than one field",
                        row.position,
                        cell.text()
                    );
                    self.window.clear_current();
                    return Ok(false);
                }
            }
        }

        let merged = self.window.merged();
        if merged.len() != self.schema.len() {
            return Ok(false);
        }

        let mut seen: HashMap<usize, usize> = HashMap::new();
        for (column, descriptor) in &merged {
            if let Some(previous) = seen.insert(*descriptor, *column) {
                return Err(ReadError::HeaderAmbiguity(format!(
                    "field '{}' matches columns {previous} and {column}",
                    self.schema.descriptors()[*descriptor].field
                )));
            }
        }

        self.mapping = Some(SchemaMapping::new(merged, self.schema.len()));
        Ok(true)
    }

    fn match_name(&self, key: &str) -> NameMatch {
        let mut found = NameMatch::None;
        for (idx, descriptor) in self.schema.descriptors().iter().enumerate() {
            if !descriptor.is_name_based() {
                continue;
            }
            let hit = if self.config.exact_header_match || descriptor.exact_match {
                key == descriptor.normalized
            } else {
                key.contains(descriptor.normalized.as_str())
                    || descriptor.normalized.contains(key)
            };
            if hit {
                if matches!(found, NameMatch::One(_)) {
                    return NameMatch::Many;
                }
                found = NameMatch::One(idx);
            }
        }
        found
    }
}

enum NameMatch {
    None,
    One(usize),
    Many,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::FieldDecl,
        source::{Cell, CellValue},
    };

    fn text_row(position: usize, values: &[&str]) -> Row {
        let cells = values
            .iter()
            .enumerate()
            .map(|(column, value)| Cell::new(column, CellValue::Text(value.to_string())))
            .collect();
        Row::new(position, cells)
    }

    fn schema(config: &ReaderConfig) -> Schema {
        Schema::build(
            &[
                FieldDecl::of::<String>("name").header("Nome"),
                FieldDecl::of::<i32>("age").header("Idade"),
                FieldDecl::of::<Option<String>>("city").header("Municipio"),
                FieldDecl::of::<Option<String>>("state").header("UF").exact(),
            ],
            config,
        )
        .unwrap()
    }

    #[test]
    fn window_evicts_oldest_slot() {
        let mut window = HeaderWindow::new(2);
        window.start_row();
        window.bind(0, 0);
        window.start_row();
        window.bind(1, 1);
        window.start_row();
        window.bind(1, 2);
        assert_eq!(window.len(), 2);
        let merged = window.merged();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(&1), Some(&2));
    }

    #[test]
    fn single_row_header_is_found_immediately() {
        let config = ReaderConfig::default();
        let schema = schema(&config);
        let mut resolver = HeaderResolver::new(&schema, &config);

        assert!(!resolver.offer(&text_row(1, &["Relatório de clientes"])).unwrap());
        let found = resolver
            .offer(&text_row(2, &["Nome completo", "Idade (anos)", "Municipio", "UF"]))
            .unwrap();
        assert!(found);
        let mapping = resolver.mapping().unwrap();
        assert_eq!(mapping.columns(), &[0, 1, 2, 3]);
    }

    #[test]
    fn split_header_needs_two_row_window() {
        let config = ReaderConfig {
            header_row_threshold: 2,
            ..ReaderConfig::default()
        };
        let schema = schema(&config);
        let mut resolver = HeaderResolver::new(&schema, &config);

        assert!(!resolver.offer(&text_row(1, &["Nome", "Idade"])).unwrap());
        assert!(resolver.offer(&text_row(2, &["", "", "Municipio", "UF"])).unwrap());

        let single = ReaderConfig::default();
        let mut narrow = HeaderResolver::new(&schema, &single);
        assert!(!narrow.offer(&text_row(1, &["Nome", "Idade"])).unwrap());
        assert!(!narrow.offer(&text_row(2, &["", "", "Municipio", "UF"])).unwrap());
    }

    #[test]
    fn ambiguous_cell_abandons_the_row() {
        let config = ReaderConfig::default();
        let schema = schema(&config);
        let mut resolver = HeaderResolver::new(&schema, &config);
        let row = text_row(1, &["Nome", "Idade", "Municipio", "UF", "Nome e Idade"]);
        assert!(!resolver.offer(&row).unwrap());
        assert!(resolver.mapping().is_none());
    }

    #[test]
    fn duplicate_binding_fails_finalization() {
        let config = ReaderConfig {
            header_row_threshold: 2,
            ..ReaderConfig::default()
        };
        let schema = schema(&config);
        let mut resolver = HeaderResolver::new(&schema, &config);
        assert!(!resolver.offer(&text_row(1, &["Nome", "Idade", "Municipio"])).unwrap());
        let err = resolver
            .offer(&text_row(2, &["", "", "", "", "Nome"]))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HeaderAmbiguity);
    }

    #[test]
    fn column_override_binds_without_text() {
        let config = ReaderConfig::default();
        let schema = Schema::build(
            &[
                FieldDecl::of::<String>("name").header("Nome"),
                FieldDecl::of::<Option<String>>("notes").column(3),
            ],
            &config,
        )
        .unwrap();
        let mut resolver = HeaderResolver::new(&schema, &config);
        assert!(resolver.offer(&text_row(1, &["x", "Nome", "y", "whatever"])).unwrap());
        let mapping = resolver.mapping().unwrap();
        assert_eq!(mapping.column_of(0), Some(1));
        assert_eq!(mapping.column_of(1), Some(3));
        assert_eq!(mapping.descriptor_at(3), Some(1));
    }

    #[test]
    fn exact_flag_requires_equality() {
        let config = ReaderConfig::default();
        let schema = schema(&config);
        let mut resolver = HeaderResolver::new(&schema, &config);
        assert!(!resolver.offer(&text_row(1, &["Nome", "Idade", "Municipio", "UF sigla"])).unwrap());
    }
}
