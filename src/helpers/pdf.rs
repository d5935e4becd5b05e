use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::info;

use crate::error::{ReportError, ReportResult};
use crate::models::sales::{format_price, ProductRollup, SalesSummary};

// US Letter, one inch margins.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 10.0;
const TABLE_SIZE: f32 = 10.0;
const ROW_HEIGHT: f32 = 18.0;
const CELL_PADDING: f32 = 6.0;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

const TABLE_HEADER: [&str; 3] = ["Product", "Total Quantity", "Average Price"];

/// Renders the sales summary and the per-product table into a PDF document.
///
/// Output contains no timestamps, so equal inputs give equal bytes.
pub fn render_pdf(summary: &SalesSummary, rollups: &[ProductRollup]) -> ReportResult<Vec<u8>> {
    if rollups.is_empty() {
        return Err(ReportError::Render(
            "cannot render a product table without rollups".to_string(),
        ));
    }

    let mut layout = Layout::new();

    layout.centered_line("Sales Report", BOLD, TITLE_SIZE);
    layout.skip(12.0);

    layout.line("Executive Summary", BOLD, HEADING_SIZE);
    for (label, value) in summary.lines() {
        layout.labelled_line(label, &value);
    }
    layout.skip(12.0);

    layout.line("Summary by Product", BOLD, HEADING_SIZE);

    let rows: Vec<[String; 3]> = rollups
        .iter()
        .map(|r| {
            [
                r.product.clone(),
                r.total_quantity.to_string(),
                format_price(r.average_unit_price),
            ]
        })
        .collect();
    layout.table(&rows);

    let pages = layout.finish();
    info!("Laid out sales report on {} page(s)", pages.len());

    let bytes = build_document(pages)?;
    info!("Successfully rendered PDF, size: {} bytes", bytes.len());
    Ok(bytes)
}

fn build_document(pages: Vec<Vec<Operation>>) -> ReportResult<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Sales Report"),
        "Producer" => Object::string_literal("sales-report-bot"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut output_buffer: Vec<u8> = Vec::new();
    doc.save_to(&mut output_buffer)?;
    Ok(output_buffer)
}

fn font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Top-down page flow. Coordinates are PDF user space (origin bottom-left).
struct Layout {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        let finished = std::mem::take(&mut self.current);
        self.pages.push(finished);
        self.cursor = PAGE_HEIGHT - MARGIN;
    }

    /// Breaks the page unless `height` more points fit above the bottom margin.
    fn reserve(&mut self, height: f32) {
        if self.cursor - height < MARGIN {
            self.new_page();
        }
    }

    fn skip(&mut self, height: f32) {
        self.cursor -= height;
    }

    fn line(&mut self, text: &str, font: &str, size: f32) {
        let height = size * 1.5;
        self.reserve(height);
        self.cursor -= height;
        self.text(MARGIN, self.cursor + size * 0.4, text, font, size, 0.0);
    }

    fn centered_line(&mut self, text: &str, font: &str, size: f32) {
        let height = size * 1.5;
        self.reserve(height);
        self.cursor -= height;
        let x = (PAGE_WIDTH - text_width(text, size)) / 2.0;
        self.text(x, self.cursor + size * 0.4, text, font, size, 0.0);
    }

    /// `label: value` with the label in bold.
    fn labelled_line(&mut self, label: &str, value: &str) {
        let height = BODY_SIZE * 1.5;
        self.reserve(height);
        self.cursor -= height;
        let baseline = self.cursor + BODY_SIZE * 0.4;
        let label = format!("{}:", label);
        self.text(MARGIN, baseline, &label, BOLD, BODY_SIZE, 0.0);
        let offset = text_width(&label, BODY_SIZE) + text_width(" ", BODY_SIZE);
        let value = fit_text(value, PAGE_WIDTH - 2.0 * MARGIN - offset, BODY_SIZE);
        self.text(MARGIN + offset, baseline, &value, REGULAR, BODY_SIZE, 0.0);
    }

    fn table(&mut self, rows: &[[String; 3]]) {
        let mut widths = [0.0f32; 3];
        for (i, header) in TABLE_HEADER.iter().enumerate() {
            widths[i] = text_width(header, TABLE_SIZE);
        }
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(text_width(cell, TABLE_SIZE));
            }
        }
        let available = PAGE_WIDTH - 2.0 * MARGIN;
        for width in widths.iter_mut() {
            *width = (*width + 2.0 * CELL_PADDING).min(available / 3.0);
        }
        let table_width: f32 = widths.iter().sum();
        let left = (PAGE_WIDTH - table_width) / 2.0;

        self.reserve(2.0 * ROW_HEIGHT);
        self.header_row(left, &widths);
        for row in rows {
            if self.cursor - ROW_HEIGHT < MARGIN {
                self.new_page();
                self.header_row(left, &widths);
            }
            self.body_row(left, &widths, row);
        }
    }

    fn header_row(&mut self, left: f32, widths: &[f32; 3]) {
        self.cursor -= ROW_HEIGHT;
        let table_width: f32 = widths.iter().sum();
        self.current.extend([
            Operation::new("rg", vec![Object::Real(0.5), Object::Real(0.5), Object::Real(0.5)]),
            Operation::new(
                "re",
                vec![
                    Object::Real(left),
                    Object::Real(self.cursor),
                    Object::Real(table_width),
                    Object::Real(ROW_HEIGHT),
                ],
            ),
            Operation::new("f", vec![]),
        ]);

        let mut x = left;
        for (header, width) in TABLE_HEADER.iter().zip(widths) {
            let header = fit_text(header, width - 2.0 * CELL_PADDING, TABLE_SIZE);
            self.text(
                x + CELL_PADDING,
                self.cursor + (ROW_HEIGHT - TABLE_SIZE) / 2.0 + 1.5,
                &header,
                REGULAR,
                TABLE_SIZE,
                0.96,
            );
            x += width;
        }
        self.grid(left, widths);
    }

    fn body_row(&mut self, left: f32, widths: &[f32; 3], row: &[String; 3]) {
        self.cursor -= ROW_HEIGHT;
        let baseline = self.cursor + (ROW_HEIGHT - TABLE_SIZE) / 2.0 + 1.5;

        let mut x = left;
        for (i, (cell, width)) in row.iter().zip(widths).enumerate() {
            let cell = fit_text(cell, width - 2.0 * CELL_PADDING, TABLE_SIZE);
            let cell_x = if i == 0 {
                x + CELL_PADDING
            } else {
                x + (width - text_width(&cell, TABLE_SIZE)) / 2.0
            };
            self.text(cell_x, baseline, &cell, REGULAR, TABLE_SIZE, 0.0);
            x += width;
        }
        self.grid(left, widths);
    }

    /// Strokes one cell outline per column for the row at the cursor.
    fn grid(&mut self, left: f32, widths: &[f32; 3]) {
        self.current.extend([
            Operation::new("RG", vec![0.into(), 0.into(), 0.into()]),
            Operation::new("w", vec![1.into()]),
        ]);
        let mut x = left;
        for width in widths {
            self.current.push(Operation::new(
                "re",
                vec![
                    Object::Real(x),
                    Object::Real(self.cursor),
                    Object::Real(*width),
                    Object::Real(ROW_HEIGHT),
                ],
            ));
            x += width;
        }
        self.current.push(Operation::new("S", vec![]));
    }

    fn text(&mut self, x: f32, y: f32, text: &str, font: &str, size: f32, gray: f32) {
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("g", vec![Object::Real(gray)]),
            Operation::new("Tf", vec![font.into(), Object::Real(size)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_text(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

const ELLIPSIS: char = '\u{2026}';

/// Shortens `text` to fit `max_width` points, marking the cut with an ellipsis.
fn fit_text(text: &str, max_width: f32, size: f32) -> String {
    if text_width(text, size) <= max_width {
        return text.to_string();
    }
    let budget = max_width - char_width(ELLIPSIS) as f32 * size / 1000.0;
    let mut used = 0.0;
    let mut fitted = String::new();
    for c in text.chars() {
        let advance = char_width(c) as f32 * size / 1000.0;
        if used + advance > budget {
            break;
        }
        used += advance;
        fitted.push(c);
    }
    fitted.push(ELLIPSIS);
    fitted
}

/// WinAnsiEncoding bytes; anything the encoding lacks becomes '?'.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars().map(|c| winansi_byte(c).unwrap_or(b'?')).collect()
}

fn winansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        '\u{0}'..='\u{7f}' | '\u{a0}'..='\u{ff}' => return Some(c as u8),
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Helvetica advance widths (1/1000 em) for printable ASCII.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

fn char_width(c: char) -> u32 {
    match c {
        ' '..='~' => u32::from(HELVETICA_WIDTHS[c as usize - 32]),
        '…' | '—' | '‰' | '™' | 'Œ' | 'œ' => 1000,
        '‘' | '’' | '‚' => 222,
        '“' | '”' | '„' => 333,
        '•' => 350,
        _ => 556,
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text.chars().map(char_width).sum();
    units as f32 * size / 1000.0
}
