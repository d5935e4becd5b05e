use rust_xlsxwriter::{Color, Format, FormatAlign, FormatPattern, Workbook, Worksheet};
use tracing::info;

use crate::error::{ReportError, ReportResult};
use crate::models::sales::{ProductRollup, SalesRecord, SalesSummary};

pub const SUMMARY_SHEET: &str = "Summary";
pub const RAW_DATA_SHEET: &str = "Raw data";

const SUMMARY_COLUMN_WIDTH: f64 = 30.0;
const WIDTH_PADDING: usize = 2;
const HEADER_FILL: u32 = 0x4F81BD;

/// Builds the two-sheet workbook: a label/value summary and the raw records.
///
/// `rollups` must agree with `summary`; a mismatch means the inputs came from
/// different runs and is reported as a render error.
pub fn render_workbook(
    summary: &SalesSummary,
    rollups: &[ProductRollup],
    raw_records: &[SalesRecord],
) -> ReportResult<Vec<u8>> {
    if raw_records.is_empty() {
        return Err(ReportError::Render(
            "cannot render a raw data sheet without records".to_string(),
        ));
    }
    let rolled_up = rollups
        .iter()
        .try_fold(0u64, |sum, r| sum.checked_add(r.total_quantity))
        .ok_or(ReportError::QuantityOverflow)?;
    if rolled_up != summary.total_units {
        return Err(ReportError::Render(format!(
            "rollups total {} units but summary reports {}",
            rolled_up, summary.total_units
        )));
    }

    let mut workbook = Workbook::new();
    workbook.push_worksheet(summary_sheet(summary)?);
    workbook.push_worksheet(raw_data_sheet(raw_records)?);

    let bytes = workbook.save_to_buffer()?;
    info!(
        "Successfully rendered workbook with {} raw rows, size: {} bytes",
        raw_records.len(),
        bytes.len()
    );
    Ok(bytes)
}

fn summary_sheet(summary: &SalesSummary) -> ReportResult<Worksheet> {
    let bold = Format::new().set_bold();
    let mut sheet = Worksheet::new();
    sheet.set_name(SUMMARY_SHEET)?;

    sheet.write_string_with_format(0, 0, "Executive Summary", &bold)?;
    sheet.write_blank(0, 1, &bold)?;

    for (row, (label, value)) in (1u32..).zip(summary.lines()) {
        sheet.write_string_with_format(row, 0, label, &bold)?;
        if row == 1 {
            sheet.write_number(row, 1, summary.total_units as f64)?;
        } else {
            sheet.write_string(row, 1, value)?;
        }
    }

    sheet.set_column_width(0, SUMMARY_COLUMN_WIDTH)?;
    sheet.set_column_width(1, SUMMARY_COLUMN_WIDTH)?;
    Ok(sheet)
}

fn raw_data_sheet(records: &[SalesRecord]) -> ReportResult<Worksheet> {
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_pattern(FormatPattern::Solid)
        .set_align(FormatAlign::Center);

    let mut sheet = Worksheet::new();
    sheet.set_name(RAW_DATA_SHEET)?;

    for (col, name) in (0u16..).zip(SalesRecord::COLUMNS) {
        sheet.write_string_with_format(0, col, name, &header)?;
    }

    for (row, record) in (1u32..).zip(records) {
        sheet.write_string(row, 0, &record.product)?;
        sheet.write_number(row, 1, record.quantity as f64)?;
        sheet.write_number(row, 2, record.unit_price)?;
    }

    for (col, width) in (0u16..).zip(column_widths(records)) {
        sheet.set_column_width(col, width)?;
    }
    Ok(sheet)
}

/// Longest rendered value per column, header included, plus padding.
pub fn column_widths(records: &[SalesRecord]) -> [f64; 3] {
    let mut longest = SalesRecord::COLUMNS.map(|name| name.chars().count());
    for record in records {
        let cells = [
            record.product.chars().count(),
            record.quantity.to_string().len(),
            display_decimal(record.unit_price).len(),
        ];
        for (max, len) in longest.iter_mut().zip(cells) {
            *max = (*max).max(len);
        }
    }
    longest.map(|len| (len + WIDTH_PADDING) as f64)
}

/// Decimal text as a spreadsheet shows it by default: whole values keep one
/// fractional digit.
fn display_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
