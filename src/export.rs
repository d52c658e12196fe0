use crate::error::ExportError;
use crate::types::ExtractionRecord;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const SHEET_NAME: &str = "Data";
pub const ROW_HEADERS: [&str; 4] = ["Description", "Quantity", "Unit Price", "Total"];
const FIELD_HEADERS: [&str; 2] = ["Field", "Value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self, ExportError> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// One line item flattened for tabular export. Null cells are empty strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

impl ExportRow {
    fn cells(&self) -> [&str; 4] {
        [&self.description, &self.quantity, &self.unit_price, &self.total]
    }
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// `extraction-<identifier>.<ext>`; the identifier is reduced to `[A-Za-z0-9._-]`.
pub fn export_file_name(identifier: Option<&str>, fallback: &str, format: ExportFormat) -> String {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>()
            .trim_matches(|c| c == '_' || c == '.')
            .to_string()
    };
    let id = identifier
        .map(clean)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| clean(fallback));
    let id = if id.is_empty() { "document".to_string() } else { id };
    format!("extraction-{}.{}", id, format.extension())
}

pub fn to_json(record: &ExtractionRecord) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec_pretty(record)?)
}

fn csv_block<'a, I>(header: &[&str], records: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = Vec<&'a str>>,
{
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Item table, a blank line, then the `Field,Value` section.
pub fn to_csv(rows: &[ExportRow], fields: &[(String, String)]) -> Result<Vec<u8>, ExportError> {
    let mut out = csv_block(&ROW_HEADERS, rows.iter().map(|r| r.cells().to_vec()))?;
    if !fields.is_empty() {
        out.push(b'\n');
        out.extend(csv_block(
            &FIELD_HEADERS,
            fields.iter().map(|(k, v)| vec![k.as_str(), v.as_str()]),
        )?);
    }
    Ok(out)
}

/// Remove characters that corrupt sheet XML (control chars other than tab/newline/CR).
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|c| {
            let u = *c as u32;
            *c == '\t' || *c == '\n' || *c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

fn write_text_cell_safe(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    format: &Format,
) -> Result<(), XlsxError> {
    let cleaned = sanitize_cell(text);
    worksheet.write_string_with_format(row, col, &cleaned, format).map(|_| ())
}

/// Plain decimal strings become number cells; anything else stays text.
fn write_number_cell_safe(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    number_format: &Format,
    text_format: &Format,
) -> Result<(), XlsxError> {
    match value.trim().parse::<f64>() {
        Ok(num) if num.is_finite() => worksheet
            .write_number_with_format(row, col, num, number_format)
            .map(|_| ()),
        _ => write_text_cell_safe(worksheet, row, col, value, text_format),
    }
}

/// Estimate column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

/// Single `Data` sheet with the same rows as the CSV export.
pub fn to_xlsx(rows: &[ExportRow], fields: &[(String, String)]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(rust_xlsxwriter::Color::RGB(0x1E3A8A))
        .set_font_color(rust_xlsxwriter::Color::RGB(0xFFFFFF));
    let text_format = Format::new().set_text_wrap();
    let amount_format = Format::new()
        .set_num_format("#,##0.00")
        .set_align(FormatAlign::Right);

    let mut widths: Vec<f64> = ROW_HEADERS.iter().map(|h| estimate_text_width(h)).collect();
    for row in rows {
        let w = estimate_text_width(&row.description);
        if w > widths[0] {
            widths[0] = w;
        }
    }
    for (key, value) in fields {
        widths[0] = widths[0].max(estimate_text_width(key));
        widths[1] = widths[1].max(estimate_text_width(value));
    }
    for (col, w) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, *w)?;
    }

    for (col, header) in ROW_HEADERS.iter().enumerate() {
        write_text_cell_safe(worksheet, 0, col as u16, header, &header_format)?;
    }
    let mut next_row = 1u32;
    for row in rows {
        write_text_cell_safe(worksheet, next_row, 0, &row.description, &text_format)?;
        for (offset, value) in [&row.quantity, &row.unit_price, &row.total].iter().enumerate() {
            let col = (offset + 1) as u16;
            if value.is_empty() {
                continue;
            }
            write_number_cell_safe(worksheet, next_row, col, value, &amount_format, &text_format)?;
        }
        next_row += 1;
    }

    if !fields.is_empty() {
        next_row += 1;
        for (col, header) in FIELD_HEADERS.iter().enumerate() {
            write_text_cell_safe(worksheet, next_row, col as u16, header, &header_format)?;
        }
        next_row += 1;
        for (key, value) in fields {
            write_text_cell_safe(worksheet, next_row, 0, key, &text_format)?;
            write_text_cell_safe(worksheet, next_row, 1, value, &text_format)?;
            next_row += 1;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    Ok(workbook.save_to_buffer()?)
}

/// Write an artifact into `dir`, or the user's Downloads (then Desktop) folder. Existing files
/// with the same name are overwritten.
pub fn write_artifact(artifact: &ExportArtifact, dir: Option<&Path>) -> Result<PathBuf, ExportError> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => dirs::download_dir()
            .or_else(dirs::desktop_dir)
            .ok_or(ExportError::NoExportDir)?,
    };
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)?;
    Ok(path)
}
