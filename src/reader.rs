use log::{debug, info, warn};

use crate::{
    coerce::coerce_cell,
    config::ReaderConfig,
    data::{Record, SheetRecord},
    error::{ErrorKind, ReadError, SourceError},
    header::{HeaderResolver, SchemaMapping},
    schema::{FieldDecl, Schema},
    source::{Row, SheetInfo, WorkbookSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    SeekingHeader,
    Mapped,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ProcessingCounters {
    /// Rows offered to the resolver without completing the header.
    rows_before_header: usize,
    /// Consecutive rows after the header with no content in mapped columns.
    blank_run: usize,
}

/// Outcome of reading one sheet. A failed report never carries records.
#[derive(Debug)]
pub struct SheetReport<T> {
    pub succeeded: bool,
    pub sheet_name: Option<String>,
    pub records: Vec<T>,
    pub error: Option<ReadError>,
}

impl<T> SheetReport<T> {
    fn success(sheet_name: String, records: Vec<T>) -> Self {
        Self {
            succeeded: true,
            sheet_name: Some(sheet_name),
            records,
            error: None,
        }
    }

    fn failure(sheet_name: Option<String>, error: ReadError) -> Self {
        Self {
            succeeded: false,
            sheet_name,
            records: Vec::new(),
            error: Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ReadError::kind)
    }

    pub fn into_result(self) -> Result<Vec<T>, ReadError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.records),
        }
    }
}

struct RowDriver<'a> {
    schema: &'a Schema,
    config: &'a ReaderConfig,
    resolver: HeaderResolver<'a>,
    mapping: Option<SchemaMapping>,
    state: DriverState,
    counters: ProcessingCounters,
    last_position: usize,
    records: Vec<Record>,
}

impl<'a> RowDriver<'a> {
    fn new(schema: &'a Schema, config: &'a ReaderConfig) -> Self {
        Self {
            schema,
            config,
            resolver: HeaderResolver::new(schema, config),
            mapping: None,
            state: DriverState::SeekingHeader,
            counters: ProcessingCounters::default(),
            last_position: 0,
            records: Vec::new(),
        }
    }

    fn push(&mut self, row: Result<Row, SourceError>) -> Result<DriverState, ReadError> {
        let outcome = match self.state {
            DriverState::SeekingHeader => self.seek(row),
            DriverState::Mapped => self.map(row),
            DriverState::Completed | DriverState::Failed => return Ok(self.state),
        };
        if outcome.is_err() {
            self.state = DriverState::Failed;
        }
        outcome
    }

    fn seek(&mut self, row: Result<Row, SourceError>) -> Result<DriverState, ReadError> {
        let row = row?;
        if self.resolver.offer(&row)? {
            info!("Header found at row {}", row.position);
            self.mapping = self.resolver.mapping().cloned();
            if let Some(mapping) = &self.mapping {
                for (descriptor, column) in self.schema.descriptors().iter().zip(mapping.columns()) {
                    debug!("Field '{}' mapped to column {column}", descriptor.field);
                }
            }
            self.last_position = row.position;
            self.state = DriverState::Mapped;
            return Ok(self.state);
        }

        self.counters.rows_before_header += 1;
        let limit = self.config.max_header_search_rows;
        if self.counters.rows_before_header > limit || row.position > limit {
            return Err(ReadError::HeaderNotFound { limit });
        }
        self.last_position = row.position;
        Ok(self.state)
    }

    fn map(&mut self, row: Result<Row, SourceError>) -> Result<DriverState, ReadError> {
        let Some(mapping) = self.mapping.as_ref() else {
            return Ok(self.state);
        };
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!("Treating unreadable row as blank: {err}");
                self.counters.blank_run += 1;
                return Ok(self.stop_after_blank_run());
            }
        };

        let gap = row.position.saturating_sub(self.last_position);
        if gap > self.config.max_blank_rows {
            info!(
                "Stopping at row {}: {gap} row(s) since the last processed row",
                row.position
            );
            self.state = DriverState::Completed;
            return Ok(self.state);
        }

        if has_content(&row, mapping) {
            let record = build_record(&row, mapping, self.schema, self.config)
                .map_err(|err| err.at_row(row.position))?;
            self.records.push(record);
            self.counters.blank_run = 0;
        } else {
            self.counters.blank_run += 1;
        }
        self.last_position = row.position;
        Ok(self.stop_after_blank_run())
    }

    fn stop_after_blank_run(&mut self) -> DriverState {
        if self.counters.blank_run > self.config.max_blank_rows {
            info!(
                "Stopping after {} consecutive blank row(s)",
                self.counters.blank_run
            );
            self.state = DriverState::Completed;
        }
        self.state
    }

    fn finish(self) -> Result<Vec<Record>, ReadError> {
        match self.state {
            DriverState::SeekingHeader => Err(ReadError::HeaderNotFound {
                limit: self.config.max_header_search_rows,
            }),
            _ => Ok(self.records),
        }
    }
}

fn has_content(row: &Row, mapping: &SchemaMapping) -> bool {
    mapping
        .columns()
        .iter()
        .any(|column| row.cell(*column).is_some_and(|cell| !cell.is_empty()))
}

fn build_record(
    row: &Row,
    mapping: &SchemaMapping,
    schema: &Schema,
    config: &ReaderConfig,
) -> Result<Record, ReadError> {
    let mut values = Vec::with_capacity(schema.len());
    for (descriptor, column) in schema.descriptors().iter().zip(mapping.columns()) {
        let value = coerce_cell(row.cell(*column), descriptor, config)?;
        values.push((descriptor.field.clone(), value));
    }
    Ok(Record::new(values))
}

/// Runs the header/record state machine over any row sequence.
pub fn process_rows<I>(rows: I, schema: &Schema, config: &ReaderConfig) -> Result<Vec<Record>, ReadError>
where
    I: IntoIterator<Item = Result<Row, SourceError>>,
{
    let mut driver = RowDriver::new(schema, config);
    for row in rows {
        if driver.push(row)? == DriverState::Completed {
            break;
        }
    }
    driver.finish()
}

/// Sheets selectable by index, honoring `include_hidden_sheets`.
pub fn visible_sheets<S>(source: &mut S, config: &ReaderConfig) -> Result<Vec<SheetInfo>, ReadError>
where
    S: WorkbookSource + ?Sized,
{
    let sheets = source.sheets()?;
    Ok(sheets
        .into_iter()
        .filter(|sheet| config.include_hidden_sheets || sheet.is_visible())
        .collect())
}

pub fn count_sheets<S>(source: &mut S, config: &ReaderConfig) -> Result<usize, ReadError>
where
    S: WorkbookSource + ?Sized,
{
    Ok(visible_sheets(source, config)?.len())
}

/// Maps one sheet into records keyed by the declared field names.
pub fn read_sheet_records<S>(
    source: &mut S,
    sheet_index: usize,
    decls: &[FieldDecl],
    config: &ReaderConfig,
) -> SheetReport<Record>
where
    S: WorkbookSource + ?Sized,
{
    let sheet = match select_sheet(source, sheet_index, config) {
        Ok(sheet) => sheet,
        Err(err) => return SheetReport::failure(None, err),
    };
    info!("Reading sheet '{}' (index {sheet_index})", sheet.name);
    match read_records(source, &sheet, decls, config) {
        Ok(records) => {
            info!(
                "Mapped {} record(s) from sheet '{}'",
                records.len(),
                sheet.name
            );
            SheetReport::success(sheet.name, records)
        }
        Err(err) => {
            warn!("Reading sheet '{}' failed: {err}", sheet.name);
            SheetReport::failure(Some(sheet.name), err)
        }
    }
}

/// Maps one sheet into `T` values.
pub fn read_sheet<T, S>(source: &mut S, sheet_index: usize, config: &ReaderConfig) -> SheetReport<T>
where
    T: SheetRecord,
    S: WorkbookSource + ?Sized,
{
    let report = read_sheet_records(source, sheet_index, &T::fields(), config);
    let sheet_name = report.sheet_name;
    if let Some(err) = report.error {
        return SheetReport::failure(sheet_name, err);
    }
    let converted: Result<Vec<T>, ReadError> =
        report.records.into_iter().map(T::from_record).collect();
    match converted {
        Ok(records) => SheetReport {
            succeeded: true,
            sheet_name,
            records,
            error: None,
        },
        Err(err) => SheetReport::failure(sheet_name, err),
    }
}

fn select_sheet<S>(source: &mut S, sheet_index: usize, config: &ReaderConfig) -> Result<SheetInfo, ReadError>
where
    S: WorkbookSource + ?Sized,
{
    visible_sheets(source, config)?
        .into_iter()
        .nth(sheet_index)
        .ok_or(ReadError::SheetNotFound { index: sheet_index })
}

fn read_records<S>(
    source: &mut S,
    sheet: &SheetInfo,
    decls: &[FieldDecl],
    config: &ReaderConfig,
) -> Result<Vec<Record>, ReadError>
where
    S: WorkbookSource + ?Sized,
{
    config.validate()?;
    let schema = Schema::build(decls, config)?;
    let rows = source.rows(sheet)?;
    process_rows(rows, &schema, config)
}
