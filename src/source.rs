//! Row and cell model shared with spreadsheet decoders.
//!
//! Decoding the container itself (zip/XML, sheet enumeration, shared strings)
//! is left to a [`WorkbookSource`] implementation. The engine only needs a
//! lazy, strictly increasing stream of [`Row`]s for one sheet.
//!
//! [`MemoryWorkbook`] is a source over in-memory grids; the calamine-backed
//! source lives in [`crate::xlsx`].

use std::{borrow::Cow, fmt};

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::SourceError;

/// Lazy, finite, non-restartable sequence of rows for one sheet.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row, SourceError>> + 'a>;

pub trait WorkbookSource {
    /// All sheets in workbook order, hidden ones included.
    fn sheets(&mut self) -> Result<Vec<SheetInfo>, SourceError>;

    fn rows(&mut self, sheet: &SheetInfo) -> Result<RowStream<'_>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetVisibility {
    Visible,
    Hidden,
    VeryHidden,
}

impl fmt::Display for SheetVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SheetVisibility::Visible => "visible",
            SheetVisibility::Hidden => "hidden",
            SheetVisibility::VeryHidden => "very-hidden",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    /// Position in the workbook, counting hidden sheets.
    pub index: usize,
    pub name: String,
    pub visibility: SheetVisibility,
}

impl SheetInfo {
    pub fn is_visible(&self) -> bool {
        self.visibility == SheetVisibility::Visible
    }
}

/// Type tag of a cell as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Empty,
    Boolean,
    Number,
    Text,
    Date,
    /// Cached result of a formula; the engine reads it through its text form.
    Formula,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// 0-based column index.
    pub column: usize,
    pub value: CellValue,
    pub formula: bool,
}

impl Cell {
    pub fn new(column: usize, value: CellValue) -> Self {
        Self {
            column,
            value,
            formula: false,
        }
    }

    pub fn formula(column: usize, cached: CellValue) -> Self {
        Self {
            column,
            value: cached,
            formula: true,
        }
    }

    pub fn cell_type(&self) -> CellType {
        if self.is_empty() {
            return CellType::Empty;
        }
        if self.formula {
            return CellType::Formula;
        }
        match self.value {
            CellValue::Empty => CellType::Empty,
            CellValue::Bool(_) => CellType::Boolean,
            CellValue::Number(_) => CellType::Number,
            CellValue::Text(_) => CellType::Text,
            CellValue::DateTime(_) => CellType::Date,
        }
    }

    /// Empty cells and zero-length strings both count as holding no value.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Displayed text of the cell.
    pub fn text(&self) -> Cow<'_, str> {
        match &self.value {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Text(text) => Cow::Borrowed(text.as_str()),
            CellValue::Bool(value) => Cow::Borrowed(if *value { "TRUE" } else { "FALSE" }),
            CellValue::Number(number) => Cow::Owned(format_number(*number)),
            CellValue::DateTime(dt) => Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Native date/time accessor: date cells directly, numeric cells as
    /// spreadsheet serial dates.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match &self.value {
            CellValue::DateTime(dt) => Some(*dt),
            CellValue::Number(serial) => excel_serial_to_datetime(*serial),
            _ => None,
        }
    }
}

pub(crate) fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        (number as i64).to_string()
    } else {
        number.to_string()
    }
}

/// Converts a 1900-system serial date into a timestamp, rounded to the millisecond.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // Serials below 60 predate the phantom 1900-02-29.
    let adjusted = if serial < 60.0 { serial + 1.0 } else { serial };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (adjusted * 86_400_000.0).round();
    if millis > i64::MAX as f64 {
        return None;
    }
    epoch.checked_add_signed(Duration::milliseconds(millis as i64))
}

/// Inverse of [`excel_serial_to_datetime`] for dates after 1900-03-01.
pub fn datetime_to_excel_serial(value: NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (value - epoch).num_milliseconds() as f64 / 86_400_000.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based row number in the sheet.
    pub position: usize,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(position: usize, cells: Vec<Cell>) -> Self {
        Self { position, cells }
    }

    pub fn cell(&self, column: usize) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.column == column)
    }
}

#[derive(Debug, Clone)]
struct MemorySheet {
    info: SheetInfo,
    rows: Vec<Result<Row, String>>,
}

/// In-memory workbook built row by row.
///
/// Rows are stored sparsely: a sheet may skip positions, as real decoders do
/// for rows that are absent from the file.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Vec<MemorySheet>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, name: &str, visibility: SheetVisibility) -> MemorySheetBuilder<'_> {
        let index = self.sheets.len();
        self.sheets.push(MemorySheet {
            info: SheetInfo {
                index,
                name: name.to_string(),
                visibility,
            },
            rows: Vec::new(),
        });
        MemorySheetBuilder {
            sheet: &mut self.sheets[index],
        }
    }
}

pub struct MemorySheetBuilder<'a> {
    sheet: &'a mut MemorySheet,
}

impl MemorySheetBuilder<'_> {
    fn next_position(&self) -> usize {
        self.sheet
            .rows
            .last()
            .map(|row| match row {
                Ok(row) => row.position + 1,
                Err(_) => self.sheet.rows.len() + 1,
            })
            .unwrap_or(1)
    }

    /// Appends a row at the next position; `CellValue::Empty` entries keep their column slot.
    pub fn row<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = CellValue>,
    {
        let position = self.next_position();
        self.row_at(position, values)
    }

    pub fn row_at<I>(&mut self, position: usize, values: I) -> &mut Self
    where
        I: IntoIterator<Item = CellValue>,
    {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(column, value)| Cell::new(column, value))
            .collect();
        self.sheet.rows.push(Ok(Row::new(position, cells)));
        self
    }

    pub fn cells(&mut self, position: usize, cells: Vec<Cell>) -> &mut Self {
        self.sheet.rows.push(Ok(Row::new(position, cells)));
        self
    }

    pub fn text_row(&mut self, values: &[&str]) -> &mut Self {
        self.row(values.iter().map(|value| {
            if value.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(value.to_string())
            }
        }))
    }

    /// Appends `count` rows with no cells.
    pub fn blank_rows(&mut self, count: usize) -> &mut Self {
        for _ in 0..count {
            let position = self.next_position();
            self.sheet.rows.push(Ok(Row::new(position, Vec::new())));
        }
        self
    }

    /// Appends a row the decoder fails to read.
    pub fn broken_row(&mut self, message: &str) -> &mut Self {
        self.sheet.rows.push(Err(message.to_string()));
        self
    }
}

impl WorkbookSource for MemoryWorkbook {
    fn sheets(&mut self) -> Result<Vec<SheetInfo>, SourceError> {
        Ok(self.sheets.iter().map(|sheet| sheet.info.clone()).collect())
    }

    fn rows(&mut self, sheet: &SheetInfo) -> Result<RowStream<'_>, SourceError> {
        let stored = self
            .sheets
            .get(sheet.index)
            .filter(|stored| stored.info.name == sheet.name)
            .ok_or_else(|| SourceError::MissingSheet(sheet.name.clone()))?;
        let rows = stored.rows.iter().enumerate().map(|(idx, row)| match row {
            Ok(row) => Ok(row.clone()),
            Err(message) => Err(SourceError::Row {
                position: idx + 1,
                message: message.clone(),
            }),
        });
        Ok(Box::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_type_reports_formula_before_value() {
        let cell = Cell::formula(2, CellValue::Number(4.0));
        assert_eq!(cell.cell_type(), CellType::Formula);
        assert_eq!(Cell::new(0, CellValue::Text(String::new())).cell_type(), CellType::Empty);
        assert_eq!(Cell::new(0, CellValue::Bool(true)).cell_type(), CellType::Boolean);
    }

    #[test]
    fn number_text_drops_integral_fraction() {
        assert_eq!(Cell::new(0, CellValue::Number(42.0)).text(), "42");
        assert_eq!(Cell::new(0, CellValue::Number(0.1)).text(), "0.1");
    }

    #[test]
    fn serial_dates_follow_1900_system() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(excel_serial_to_datetime(45418.5), Some(expected));
        assert_eq!(datetime_to_excel_serial(expected), 45418.5);

        let first = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0);
        assert_eq!(excel_serial_to_datetime(1.0), first);
        assert_eq!(excel_serial_to_datetime(-3.0), None);
    }

    #[test]
    fn memory_workbook_keeps_sparse_positions_and_broken_rows() {
        let mut workbook = MemoryWorkbook::new();
        workbook
            .add_sheet("Data", SheetVisibility::Visible)
            .text_row(&["a", "b"])
            .row_at(10, [CellValue::Number(1.0)])
            .broken_row("bad xml")
            .text_row(&["c"]);

        let sheets = workbook.sheets().unwrap();
        let rows: Vec<_> = workbook.rows(&sheets[0]).unwrap().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].as_ref().unwrap().position, 1);
        assert_eq!(rows[1].as_ref().unwrap().position, 10);
        assert!(rows[2].is_err());
        assert_eq!(rows[3].as_ref().unwrap().position, 4);
    }
}
