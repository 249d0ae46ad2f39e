use std::{fs::File, io::BufReader, path::Path};

use calamine::{Data, DataType, Range, Reader, SheetVisible, Sheets, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;

use crate::{
    error::SourceError,
    source::{Cell, CellValue, Row, RowStream, SheetInfo, SheetVisibility, WorkbookSource},
};

/// Workbook opened through calamine (xlsx, xlsm, xlsb, xls, ods).
pub struct XlsxWorkbook {
    workbook: Sheets<BufReader<File>>,
}

impl XlsxWorkbook {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let workbook = open_workbook_auto(path)?;
        Ok(Self { workbook })
    }
}

impl WorkbookSource for XlsxWorkbook {
    fn sheets(&mut self) -> Result<Vec<SheetInfo>, SourceError> {
        Ok(self
            .workbook
            .sheets_metadata()
            .iter()
            .enumerate()
            .map(|(index, sheet)| SheetInfo {
                index,
                name: sheet.name.clone(),
                visibility: match sheet.visible {
                    SheetVisible::Visible => SheetVisibility::Visible,
                    SheetVisible::Hidden => SheetVisibility::Hidden,
                    SheetVisible::VeryHidden => SheetVisibility::VeryHidden,
                },
            })
            .collect())
    }

    fn rows(&mut self, sheet: &SheetInfo) -> Result<RowStream<'_>, SourceError> {
        let range = self.workbook.worksheet_range(&sheet.name)?;
        // Not every format exposes formulas.
        let formulas = self.workbook.worksheet_formula(&sheet.name).ok();
        debug!(
            "Sheet '{}' spans {} row(s) x {} column(s)",
            sheet.name,
            range.height(),
            range.width()
        );
        Ok(Box::new(RangeRows {
            range,
            formulas,
            next: 0,
        }))
    }
}

/// Owned iterator over a decoded worksheet range.
struct RangeRows {
    range: Range<Data>,
    formulas: Option<Range<String>>,
    next: usize,
}

impl Iterator for RangeRows {
    type Item = Result<Row, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.range.height() {
            return None;
        }
        let (start_row, start_col) = self.range.start().unwrap_or_default();
        let relative = self.next;
        self.next += 1;

        let absolute_row = start_row as usize + relative;
        let mut cells = Vec::new();
        for col in 0..self.range.width() {
            let Some(data) = self.range.get((relative, col)) else {
                continue;
            };
            let value = cell_value(data);
            if value == CellValue::Empty {
                continue;
            }
            let column = start_col as usize + col;
            let is_formula = self.formulas.as_ref().is_some_and(|formulas| {
                formulas
                    .get_value((absolute_row as u32, column as u32))
                    .is_some_and(|formula| !formula.is_empty())
            });
            cells.push(Cell {
                column,
                value,
                formula: is_formula,
            });
        }
        Some(Ok(Row::new(absolute_row + 1, cells)))
    }
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) => match data.as_datetime() {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Text(data.to_string()),
        },
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    value
        .parse::<NaiveDateTime>()
        .ok()
        .or_else(|| {
            value
                .parse::<NaiveDate>()
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
