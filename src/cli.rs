use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about = "Map spreadsheet sheets into typed records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the sheets of a workbook with their selection index
    Sheets(SheetsArgs),
    /// Validate a field table and print the resolved descriptors
    Check(CheckArgs),
    /// Locate the header of a sheet and write its rows as typed records
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// Workbook to inspect (xlsx, xlsm, xlsb, xls, ods)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Also list hidden and very hidden sheets
    #[arg(long = "include-hidden")]
    pub include_hidden: bool,
    /// Reader configuration YAML
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Field table YAML describing the target record
    #[arg(short = 'f', long = "fields")]
    pub fields: PathBuf,
    /// Reader configuration YAML
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Compare headers with equality for every field
    #[arg(long = "exact-headers")]
    pub exact_headers: bool,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Workbook to read (xlsx, xlsm, xlsb, xls, ods)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Field table YAML describing the target record
    #[arg(short = 'f', long = "fields")]
    pub fields: PathBuf,
    /// Index of the sheet among the selectable sheets
    #[arg(short = 's', long = "sheet", default_value_t = 0)]
    pub sheet: usize,
    /// Reader configuration YAML
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Output file (stdout if omitted or '-')
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output format
    #[arg(long = "format", value_enum, default_value = "csv")]
    pub format: OutputFormat,
    /// CSV delimiter character for output (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Number of consecutive rows that may form one header
    #[arg(long = "header-rows")]
    pub header_rows: Option<usize>,
    /// Compare headers with equality for every field
    #[arg(long = "exact-headers")]
    pub exact_headers: bool,
    /// Read placeholder tokens such as 'n/a' or '-' as empty values
    #[arg(long = "undefined-as-null")]
    pub undefined_as_null: bool,
    /// Count hidden sheets when selecting by index
    #[arg(long = "include-hidden")]
    pub include_hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Table,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
