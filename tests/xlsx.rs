mod common;

use std::str::FromStr;

use chrono::NaiveDate;
use common::fixture_path;
use rust_decimal::Decimal;
use sheet_mapper::{
    CellType, ErrorKind, FieldTable, FieldValue, ReaderConfig, SheetVisibility, WorkbookSource,
    XlsxWorkbook, count_sheets, read_sheet_records, visible_sheets,
};

fn open_fixture() -> XlsxWorkbook {
    XlsxWorkbook::open(&fixture_path("clientes.xlsx")).expect("open fixture workbook")
}

fn fixture_fields() -> Vec<sheet_mapper::FieldDecl> {
    FieldTable::load(&fixture_path("clientes.yml"))
        .expect("load field table")
        .decls()
}

#[test]
fn lists_sheets_with_visibility() {
    let mut workbook = open_fixture();
    let sheets = workbook.sheets().expect("sheets");
    let summary: Vec<(&str, SheetVisibility)> = sheets
        .iter()
        .map(|sheet| (sheet.name.as_str(), sheet.visibility))
        .collect();
    assert_eq!(
        summary,
        [
            ("Clientes", SheetVisibility::Visible),
            ("Oculta", SheetVisibility::Hidden),
            ("Vazia", SheetVisibility::Visible),
        ]
    );

    let config = ReaderConfig::default();
    assert_eq!(count_sheets(&mut workbook, &config).unwrap(), 2);
    let all = ReaderConfig {
        include_hidden_sheets: true,
        ..ReaderConfig::default()
    };
    assert_eq!(visible_sheets(&mut workbook, &all).unwrap().len(), 3);
}

#[test]
fn rows_carry_sheet_positions_and_formula_flags() {
    let mut workbook = open_fixture();
    let sheets = workbook.sheets().expect("sheets");
    let rows: Vec<_> = workbook
        .rows(&sheets[0])
        .expect("rows")
        .map(|row| row.expect("decoded row"))
        .collect();

    let header = rows.iter().find(|row| row.position == 3).expect("header row");
    assert_eq!(header.cell(0).map(|cell| cell.text().into_owned()), Some("Código".to_string()));

    let carla = rows.iter().find(|row| row.position == 6).expect("row 6");
    let balance = carla.cell(2).expect("formula cell");
    assert_eq!(balance.cell_type(), CellType::Formula);
    assert_eq!(balance.text(), "3001");

    let since = carla.cell(4).expect("date cell");
    let expected = NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(since.as_datetime(), Some(expected));
}

#[test]
fn maps_customer_sheet_into_records() {
    let mut workbook = open_fixture();
    let report = read_sheet_records(&mut workbook, 0, &fixture_fields(), &ReaderConfig::default());
    assert!(report.succeeded, "{:?}", report.error);
    assert_eq!(report.sheet_name.as_deref(), Some("Clientes"));
    assert_eq!(report.records.len(), 3);

    let bruno = &report.records[1];
    assert_eq!(bruno.get("code"), Some(&FieldValue::Integer(2)));
    assert_eq!(
        bruno.get("balance"),
        Some(&FieldValue::Decimal(Decimal::from_str("1234.50").unwrap()))
    );
    assert_eq!(bruno.get("active"), Some(&FieldValue::Boolean(true)));

    let carla = &report.records[2];
    assert_eq!(
        carla.get("balance"),
        Some(&FieldValue::Decimal(Decimal::from(3001)))
    );
    assert_eq!(carla.get("active"), Some(&FieldValue::Boolean(false)));
}

#[test]
fn sheet_without_header_reports_failure() {
    let mut workbook = open_fixture();
    let report = read_sheet_records(&mut workbook, 1, &fixture_fields(), &ReaderConfig::default());
    assert!(!report.succeeded);
    assert_eq!(report.sheet_name.as_deref(), Some("Vazia"));
    assert_eq!(report.error_kind(), Some(ErrorKind::HeaderNotFound));
    assert!(report.records.is_empty());

    let report = read_sheet_records(&mut workbook, 5, &fixture_fields(), &ReaderConfig::default());
    assert_eq!(report.error_kind(), Some(ErrorKind::SheetNotFound));
}

#[test]
fn missing_file_is_a_workbook_error() {
    assert!(XlsxWorkbook::open(&fixture_path("missing.xlsx")).is_err());
}
