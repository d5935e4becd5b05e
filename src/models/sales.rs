use serde::Serialize;
use std::fmt;

/// One row of sales input.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub product: String,
    pub quantity: u64,
    pub unit_price: f64,
}

impl SalesRecord {
    pub fn new(product: impl Into<String>, quantity: u64, unit_price: f64) -> Self {
        Self {
            product: product.into(),
            quantity,
            unit_price,
        }
    }

    /// Column headers in the order the fields are laid out.
    pub const COLUMNS: [&'static str; 3] = ["product", "quantity", "unit_price"];
}

/// Whole-run statistics computed from every record.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SalesSummary {
    pub total_units: u64,
    pub average_unit_price: f64,
    pub top_product: String,
}

impl SalesSummary {
    /// The three label/value lines shown in both reports.
    pub fn lines(&self) -> [(&'static str, String); 3] {
        [
            ("Total units sold", self.total_units.to_string()),
            ("Average unit price", format_price(self.average_unit_price)),
            ("Top-selling product", self.top_product.clone()),
        ]
    }
}

/// Per-product statistics.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProductRollup {
    pub product: String,
    pub total_quantity: u64,
    pub average_unit_price: f64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pdf,
    Workbook,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Workbook => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Workbook => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// A rendered report file ready to hand to a dispatcher.
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    pub kind: ArtifactKind,
    pub filename: String,
    pub content: Vec<u8>,
}

impl ReportArtifact {
    /// Names the artifact `sales_report_<stamp>.<ext>`.
    pub fn new(kind: ArtifactKind, stamp: &str, content: Vec<u8>) -> Self {
        Self {
            kind,
            filename: format!("sales_report_{}.{}", stamp, kind.extension()),
            content,
        }
    }
}

impl fmt::Display for ReportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.filename, self.content.len())
    }
}

pub fn format_price(value: f64) -> String {
    format!("${:.2}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lines_format_price_with_two_decimals() {
        let summary = SalesSummary {
            total_units: 10,
            average_unit_price: 8.0,
            top_product: "A".to_string(),
        };
        let lines = summary.lines();
        assert_eq!(lines[0], ("Total units sold", "10".to_string()));
        assert_eq!(lines[1], ("Average unit price", "$8.00".to_string()));
        assert_eq!(lines[2], ("Top-selling product", "A".to_string()));
    }

    #[test]
    fn artifact_names_follow_kind() {
        let pdf = ReportArtifact::new(ArtifactKind::Pdf, "2024-01-02_03-04-05", vec![1, 2]);
        assert_eq!(pdf.filename, "sales_report_2024-01-02_03-04-05.pdf");
        assert_eq!(pdf.to_string(), "sales_report_2024-01-02_03-04-05.pdf (2 bytes)");

        let xlsx = ReportArtifact::new(ArtifactKind::Workbook, "x", Vec::new());
        assert_eq!(xlsx.filename, "sales_report_x.xlsx");
        assert!(xlsx.kind.content_type().contains("spreadsheetml"));
    }
}
