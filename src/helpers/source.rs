use calamine::{open_workbook_auto, Data, Range, Reader};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::DataSource;
use crate::error::SourceError;
use crate::models::sales::SalesRecord;

/// Supplies the records for one run.
pub trait RecordSource: Send + Sync {
    fn load(&self) -> Result<Vec<SalesRecord>, SourceError>;

    fn describe(&self) -> String;
}

/// Builds the record source selected in configuration.
pub fn from_config(source: &DataSource) -> Box<dyn RecordSource> {
    match source {
        DataSource::Excel { path } => Box::new(ExcelSource::new(path)),
        DataSource::Csv { path } => Box::new(CsvSource::new(path)),
        DataSource::Sqlite { path, query } => Box::new(SqliteSource::new(path, query)),
    }
}

const PRODUCT_NAMES: [&str; 2] = ["product", "producto"];
const QUANTITY_NAMES: [&str; 2] = ["quantity", "cantidad"];
const UNIT_PRICE_NAMES: [&str; 3] = ["unit_price", "precio_unitario", "unit price"];

/// Positions of the three record columns within a header row.
#[derive(Debug, PartialEq)]
struct ColumnMap {
    product: usize,
    quantity: usize,
    unit_price: usize,
}

impl ColumnMap {
    fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self, SourceError> {
        let find = |names: &[&str], column: &'static str| {
            headers
                .iter()
                .position(|h| {
                    let h = h.as_ref().trim();
                    names.iter().any(|n| h.eq_ignore_ascii_case(n))
                })
                .ok_or(SourceError::MissingColumn(column))
        };

        Ok(Self {
            product: find(&PRODUCT_NAMES, "product")?,
            quantity: find(&QUANTITY_NAMES, "quantity")?,
            unit_price: find(&UNIT_PRICE_NAMES, "unit_price")?,
        })
    }
}

/// 2^64, the first float that no longer fits a `u64`.
const QUANTITY_LIMIT: f64 = 18_446_744_073_709_551_616.0;

fn invalid_quantity(row: usize, value: impl std::fmt::Display) -> SourceError {
    SourceError::InvalidRow {
        row,
        message: format!("quantity must be a non-negative integer, got {}", value),
    }
}

fn checked_quantity(row: usize, value: f64) -> Result<u64, SourceError> {
    if value.is_finite() && value >= 0.0 && value < QUANTITY_LIMIT && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(invalid_quantity(row, value))
    }
}

fn integer_quantity(row: usize, value: i64) -> Result<u64, SourceError> {
    u64::try_from(value).map_err(|_| invalid_quantity(row, value))
}

/// Integer text is taken exactly; anything else must be a whole float like `3.0`.
fn quantity_from_text(row: usize, text: &str) -> Result<u64, SourceError> {
    let text = text.trim();
    if let Ok(value) = text.parse::<u64>() {
        return Ok(value);
    }
    match text.parse::<f64>() {
        Ok(value) => checked_quantity(row, value),
        Err(_) => Err(SourceError::InvalidRow {
            row,
            message: format!("quantity is not a number: {:?}", text),
        }),
    }
}

fn checked_price(row: usize, value: f64) -> Result<f64, SourceError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SourceError::InvalidRow {
            row,
            message: format!("unit price must be a non-negative number, got {}", value),
        })
    }
}

/// First worksheet of an Excel (or ODS) workbook.
pub struct ExcelSource {
    path: PathBuf,
}

impl ExcelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for ExcelSource {
    fn load(&self) -> Result<Vec<SalesRecord>, SourceError> {
        info!("Loading sales records from workbook: {}", self.path.display());
        let mut workbook = open_workbook_auto(&self.path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| SourceError::Open {
                path: self.path.display().to_string(),
                message: "workbook has no sheets".to_string(),
            })??;

        let records = records_from_range(&range)?;
        info!("Loaded {} records from workbook", records.len());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("excel:{}", self.path.display())
    }
}

static EMPTY: Data = Data::Empty;

fn records_from_range(range: &Range<Data>) -> Result<Vec<SalesRecord>, SourceError> {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string()).collect(),
        None => return Ok(Vec::new()),
    };
    let columns = ColumnMap::resolve(&headers)?;

    let mut records = Vec::new();
    // Row numbers are 1-based and count the header, as a spreadsheet shows them.
    for (index, row) in rows.enumerate() {
        let line = index + 2;
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }

        let cell = |i: usize| row.get(i).unwrap_or(&EMPTY);
        let product = cell(columns.product).to_string();
        if product.trim().is_empty() {
            return Err(SourceError::InvalidRow {
                row: line,
                message: "product is empty".to_string(),
            });
        }
        let quantity = quantity_cell(line, cell(columns.quantity))?;
        let unit_price =
            checked_price(line, number(line, "unit_price", cell(columns.unit_price))?)?;

        records.push(SalesRecord::new(product, quantity, unit_price));
    }
    Ok(records)
}

fn quantity_cell(row: usize, cell: &Data) -> Result<u64, SourceError> {
    match cell {
        Data::Int(i) => integer_quantity(row, *i),
        Data::Float(f) => checked_quantity(row, *f),
        Data::String(s) => quantity_from_text(row, s),
        other => Err(SourceError::InvalidRow {
            row,
            message: format!("quantity is not a number: {:?}", other),
        }),
    }
}

fn number(row: usize, column: &str, cell: &Data) -> Result<f64, SourceError> {
    let parsed = match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| SourceError::InvalidRow {
        row,
        message: format!("{} is not a number: {:?}", column, cell),
    })
}

/// CSV file with a header row.
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvSource {
    fn load(&self) -> Result<Vec<SalesRecord>, SourceError> {
        info!("Loading sales records from csv: {}", self.path.display());
        let file = std::fs::File::open(&self.path).map_err(|e| SourceError::Open {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let records = records_from_csv(file)?;
        info!("Loaded {} records from csv", records.len());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

fn records_from_csv<R: std::io::Read>(reader: R) -> Result<Vec<SalesRecord>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = ColumnMap::resolve(&headers)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let line = index + 2;
        let field = |i: usize| row.get(i).unwrap_or("");

        let product = field(columns.product);
        if product.is_empty() {
            return Err(SourceError::InvalidRow {
                row: line,
                message: "product is empty".to_string(),
            });
        }
        let quantity = quantity_from_text(line, field(columns.quantity))?;
        let unit_price =
            checked_price(line, parse_field(line, "unit_price", field(columns.unit_price))?)?;

        records.push(SalesRecord::new(product, quantity, unit_price));
    }
    Ok(records)
}

fn parse_field(row: usize, column: &str, value: &str) -> Result<f64, SourceError> {
    value.parse::<f64>().map_err(|_| SourceError::InvalidRow {
        row,
        message: format!("{} is not a number: {:?}", column, value),
    })
}

/// Rows returned by a query against a SQLite database.
pub struct SqliteSource {
    path: PathBuf,
    query: String,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
        }
    }

    fn open(path: &Path) -> Result<Connection, SourceError> {
        Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|e| {
            SourceError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl RecordSource for SqliteSource {
    fn load(&self) -> Result<Vec<SalesRecord>, SourceError> {
        info!("Querying sales records from database: {}", self.path.display());
        let conn = Self::open(&self.path)?;
        let records = records_from_query(&conn, &self.query)?;
        info!("Loaded {} records from database", records.len());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

fn records_from_query(conn: &Connection, query: &str) -> Result<Vec<SalesRecord>, SourceError> {
    let mut stmt = conn.prepare(query)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let columns = ColumnMap::resolve(&names)?;
    if names.len() > 3 {
        warn!("Query returned {} columns, extra columns are ignored", names.len());
    }

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(columns.product)?,
            row.get::<_, Value>(columns.quantity)?,
            row.get::<_, f64>(columns.unit_price)?,
        ))
    })?;

    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        let (product, quantity, unit_price) = row?;
        let line = index + 1;
        let quantity = match quantity {
            Value::Integer(i) => integer_quantity(line, i)?,
            Value::Real(f) => checked_quantity(line, f)?,
            Value::Text(text) => quantity_from_text(line, &text)?,
            other => {
                return Err(SourceError::InvalidRow {
                    row: line,
                    message: format!("quantity is not a number: {:?}", other),
                });
            }
        };
        records.push(SalesRecord::new(
            product,
            quantity,
            checked_price(line, unit_price)?,
        ));
    }
    Ok(records)
}
