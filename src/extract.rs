use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    cli::{ExtractArgs, OutputFormat},
    config::ReaderConfig,
    data::{FieldValue, Record},
    io_utils,
    reader::read_sheet_records,
    schema::FieldTable,
    table,
    xlsx::XlsxWorkbook,
};

pub(crate) fn load_config(path: Option<&Path>) -> Result<ReaderConfig> {
    match path {
        Some(path) => {
            ReaderConfig::load(path).with_context(|| format!("Loading reader config {path:?}"))
        }
        None => Ok(ReaderConfig::default()),
    }
}

pub fn execute(args: &ExtractArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(rows) = args.header_rows {
        config.header_row_threshold = rows;
    }
    config.exact_header_match |= args.exact_headers;
    config.undefined_as_null |= args.undefined_as_null;
    config.include_hidden_sheets |= args.include_hidden;
    config.validate()?;
    debug!("Reader config: {config:?}");

    let table = FieldTable::load(&args.fields)
        .with_context(|| format!("Loading field table {:?}", args.fields))?;
    let decls = table.decls();
    let fields: Vec<String> = decls.iter().map(|decl| decl.field.clone()).collect();

    info!(
        "Extracting sheet {} of '{}' into {} field(s)",
        args.sheet,
        args.input.display(),
        fields.len()
    );
    let mut workbook = XlsxWorkbook::open(&args.input)
        .with_context(|| format!("Opening workbook {:?}", args.input))?;
    let report = read_sheet_records(&mut workbook, args.sheet, &decls, &config);
    let sheet_name = report.sheet_name.clone().unwrap_or_default();
    let records = report
        .into_result()
        .with_context(|| format!("Reading sheet {} of {:?}", args.sheet, args.input))?;

    let output = args.output.as_deref();
    match args.format {
        OutputFormat::Csv => {
            let delimiter = io_utils::resolve_output_delimiter(output, args.delimiter);
            write_csv(output, delimiter, &fields, &records)?
        }
        OutputFormat::Json => write_json(output, &records)?,
        OutputFormat::Table => {
            let mut writer = io_utils::open_output(output)?;
            writer.write_all(table::render_records(&fields, &records).as_bytes())?;
            writer.flush()?;
        }
    }
    info!(
        "Wrote {} record(s) from sheet '{sheet_name}'",
        records.len()
    );
    Ok(())
}

fn write_csv(
    output: Option<&Path>,
    delimiter: u8,
    fields: &[String],
    records: &[Record],
) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(output, delimiter)?;
    writer
        .write_record(fields)
        .context("Writing CSV header")?;
    for record in records {
        let values = record
            .values()
            .iter()
            .map(|(_, value)| value.as_ref().map(FieldValue::as_display).unwrap_or_default());
        writer.write_record(values).context("Writing CSV record")?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

fn write_json(output: Option<&Path>, records: &[Record]) -> Result<()> {
    let mut writer = io_utils::open_output(output)?;
    serde_json::to_writer_pretty(&mut writer, records).context("Serializing records as JSON")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
