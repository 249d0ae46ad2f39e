pub mod cli;
pub mod coerce;
pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod header;
pub mod io_utils;
pub mod normalize;
pub mod reader;
pub mod schema;
pub mod source;
pub mod table;
pub mod xlsx;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};

pub use crate::{
    config::{NormalizerConfig, ReaderConfig},
    data::{DeclaredType, FieldType, FieldValue, Record, SheetField, SheetRecord, ValueKind},
    error::{ErrorKind, ReadError, SourceError},
    reader::{SheetReport, count_sheets, process_rows, read_sheet, read_sheet_records, visible_sheets},
    schema::{FieldDecl, FieldDescriptor, FieldTable, Schema},
    source::{Cell, CellType, CellValue, MemoryWorkbook, Row, SheetInfo, SheetVisibility, WorkbookSource},
    xlsx::XlsxWorkbook,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_mapper", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Check(args) => handle_check(&args),
        Commands::Extract(args) => extract::execute(&args),
    }
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let mut config = extract::load_config(args.config.as_deref())?;
    config.include_hidden_sheets |= args.include_hidden;
    let mut workbook = XlsxWorkbook::open(&args.input)
        .with_context(|| format!("Opening workbook {:?}", args.input))?;
    let sheets = visible_sheets(&mut workbook, &config)?;
    let rows: Vec<Vec<String>> = sheets
        .iter()
        .enumerate()
        .map(|(selection, sheet)| {
            vec![
                selection.to_string(),
                sheet.name.clone(),
                sheet.visibility.to_string(),
            ]
        })
        .collect();
    let headers = ["index", "name", "visibility"].map(String::from);
    print!("{}", table::render_table(&headers, &rows));
    info!("Listed {} sheet(s) of {:?}", sheets.len(), args.input);
    Ok(())
}

fn handle_check(args: &cli::CheckArgs) -> Result<()> {
    let mut config = extract::load_config(args.config.as_deref())?;
    config.exact_header_match |= args.exact_headers;
    let table = FieldTable::load(&args.fields)
        .with_context(|| format!("Loading field table {:?}", args.fields))?;
    let schema = Schema::build(&table.decls(), &config)
        .with_context(|| format!("Validating field table {:?}", args.fields))?;

    let rows: Vec<Vec<String>> = schema
        .descriptors()
        .iter()
        .map(|descriptor| {
            vec![
                descriptor.field.clone(),
                descriptor.name.clone(),
                descriptor.normalized.clone(),
                descriptor
                    .column_index
                    .map(|column| column.to_string())
                    .unwrap_or_default(),
                descriptor.exact_match.to_string(),
                descriptor.required.to_string(),
                descriptor.field_type.to_string(),
            ]
        })
        .collect();
    let headers = [
        "field",
        "header",
        "normalized",
        "column",
        "exact",
        "required",
        "type",
    ]
    .map(String::from);
    print!("{}", table::render_table(&headers, &rows));
    info!("Field table {:?} defines {} field(s)", args.fields, schema.len());
    Ok(())
}
