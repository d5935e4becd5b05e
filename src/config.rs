use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Where a run reads its sales records from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Excel { path: PathBuf },
    Csv { path: PathBuf },
    Sqlite { path: PathBuf, query: String },
}

/// Configuration for the report service
#[derive(Clone)]
pub struct ReportConfig {
    pub source: DataSource,
    pub sender: String,
    pub recipient: String,
    pub error_recipient: Option<String>,
    pub resend_api_key: String,
    pub interval: Duration,
    pub output_dir: Option<PathBuf>,
    pub listen_addr: SocketAddr,
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("source", &self.source)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("error_recipient", &self.error_recipient)
            .field("resend_api_key", &"<redacted>")
            .field("interval", &self.interval)
            .field("output_dir", &self.output_dir)
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ReportConfig {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let source = match or("REPORT_SOURCE", "excel").to_ascii_lowercase().as_str() {
            "excel" => DataSource::Excel {
                path: or("REPORT_EXCEL_PATH", "data/sales.xlsx").into(),
            },
            "csv" => DataSource::Csv {
                path: or("REPORT_CSV_PATH", "data/sales.csv").into(),
            },
            "sqlite" | "db" => DataSource::Sqlite {
                path: or("REPORT_DB_PATH", "data/sales.db").into(),
                query: or("REPORT_DB_QUERY", "SELECT * FROM sales;"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "REPORT_SOURCE",
                    message: format!("'{}' is not one of excel, csv, sqlite", other),
                });
            }
        };

        let minutes: u64 = or("REPORT_INTERVAL_MINUTES", "2")
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "REPORT_INTERVAL_MINUTES",
                message: format!("{}", e),
            })?;
        if minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "REPORT_INTERVAL_MINUTES",
                message: "must be at least 1".to_string(),
            });
        }

        let listen_addr: SocketAddr = or("REPORT_LISTEN_ADDR", "0.0.0.0:3000")
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "REPORT_LISTEN_ADDR",
                message: format!("{}", e),
            })?;

        Ok(Self {
            source,
            sender: required("REPORT_SENDER")?,
            recipient: required("REPORT_RECIPIENT")?,
            error_recipient: get("REPORT_ERROR_RECIPIENT"),
            resend_api_key: required("RESEND_API_KEY")?,
            interval: Duration::from_secs(minutes * 60),
            output_dir: get("REPORT_OUTPUT_DIR").map(PathBuf::from),
            listen_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("REPORT_SENDER", "bot@example.com"),
        ("REPORT_RECIPIENT", "sales@example.com"),
        ("RESEND_API_KEY", "re_test"),
    ];

    #[test]
    fn defaults_to_excel_every_two_minutes() {
        let config = ReportConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(
            config.source,
            DataSource::Excel {
                path: PathBuf::from("data/sales.xlsx")
            }
        );
        assert_eq!(config.interval, Duration::from_secs(120));
        assert_eq!(config.error_recipient, None);
        assert_eq!(config.output_dir, None);
        assert_eq!(config.listen_addr.port(), 3000);
    }

    #[test]
    fn sqlite_source_reads_path_and_query() {
        let mut pairs = BASE.to_vec();
        pairs.push(("REPORT_SOURCE", "SQLite"));
        pairs.push(("REPORT_DB_PATH", "bd/datos.db"));
        pairs.push(("REPORT_DB_QUERY", "SELECT * FROM ventas;"));
        pairs.push(("REPORT_INTERVAL_MINUTES", "15"));

        let config = ReportConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.source,
            DataSource::Sqlite {
                path: PathBuf::from("bd/datos.db"),
                query: "SELECT * FROM ventas;".to_string(),
            }
        );
        assert_eq!(config.interval, Duration::from_secs(900));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let err = ReportConfig::from_lookup(lookup(&BASE[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RESEND_API_KEY")));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = ReportConfig::from_lookup(lookup(&BASE)).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("re_test"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn unknown_source_and_bad_interval_are_invalid() {
        let mut pairs = BASE.to_vec();
        pairs.push(("REPORT_SOURCE", "parquet"));
        let err = ReportConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REPORT_SOURCE", .. }));

        let mut pairs = BASE.to_vec();
        pairs.push(("REPORT_INTERVAL_MINUTES", "0"));
        let err = ReportConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "REPORT_INTERVAL_MINUTES",
                ..
            }
        ));
    }
}
