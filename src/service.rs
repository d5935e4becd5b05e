use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::Serialize;
use std::{
    fs, io,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::{ReportError, ReportResult},
    helpers::{
        aggregate::aggregate, email::Dispatcher, pdf::render_pdf, source::RecordSource,
        workbook::render_workbook,
    },
    models::sales::{ArtifactKind, ReportArtifact, SalesRecord},
};

/// Run stamp down to the millisecond, so back-to-back runs get distinct names.
const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%3f";

/// Result of one delivered run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub records: usize,
    pub artifacts: Vec<String>,
    pub delivery_id: String,
}

/// Aggregates the records and renders both reports, PDF first.
///
/// Either both artifacts are returned or neither is.
pub fn build_artifacts(records: &[SalesRecord], stamp: &str) -> ReportResult<Vec<ReportArtifact>> {
    let (summary, rollups) = aggregate(records)?;
    let pdf = render_pdf(&summary, &rollups)?;
    let workbook = render_workbook(&summary, &rollups, records)?;

    Ok(vec![
        ReportArtifact::new(ArtifactKind::Pdf, stamp, pdf),
        ReportArtifact::new(ArtifactKind::Workbook, stamp, workbook),
    ])
}

/// Loads, renders and delivers sales reports. At most one run executes at a
/// time.
pub struct ReportService<D: Dispatcher> {
    source: Box<dyn RecordSource>,
    dispatcher: D,
    output_dir: Option<PathBuf>,
    run_lock: Mutex<()>,
}

impl<D: Dispatcher> ReportService<D> {
    pub fn new(source: Box<dyn RecordSource>, dispatcher: D, output_dir: Option<PathBuf>) -> Self {
        info!("Creating ReportService reading from {}", source.describe());
        Self {
            source,
            dispatcher,
            output_dir,
            run_lock: Mutex::new(()),
        }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Runs once, waiting for any run already in progress to finish first.
    pub async fn run_once(&self) -> ReportResult<RunOutcome> {
        let _guard = self.run_lock.lock().await;
        self.execute().await
    }

    /// Runs once unless another run is in progress, in which case the trigger
    /// is dropped with [`ReportError::RunInProgress`].
    pub async fn try_run(&self) -> ReportResult<RunOutcome> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("Report run requested while another run is in progress, dropping trigger");
            return Err(ReportError::RunInProgress);
        };
        self.execute().await
    }

    async fn execute(&self) -> ReportResult<RunOutcome> {
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        info!("Starting report run {}", stamp);

        match self.produce_and_deliver(&stamp).await {
            Ok(outcome) => {
                info!(
                    "Report run {} delivered {:?} with ID: {}",
                    stamp, outcome.artifacts, outcome.delivery_id
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Report run {} failed: {}", stamp, e);
                let error_msg = format!("Report run {} failed: {}", stamp, e);
                if let Err(notify_err) = self.dispatcher.notify_failure(&error_msg).await {
                    error!("Could not report the failure: {}", notify_err);
                }
                Err(e)
            }
        }
    }

    async fn produce_and_deliver(&self, stamp: &str) -> ReportResult<RunOutcome> {
        let records = self.source.load()?;
        info!("Loaded {} sales records", records.len());

        let artifacts = build_artifacts(&records, stamp)?;
        for artifact in &artifacts {
            info!("Generated {}", artifact);
        }

        if let Some(dir) = &self.output_dir {
            save_artifacts(dir, &artifacts)?;
        }

        let delivery_id = self.dispatcher.deliver(&artifacts).await?;

        Ok(RunOutcome {
            records: records.len(),
            artifacts: artifacts.into_iter().map(|a| a.filename).collect(),
            delivery_id,
        })
    }

    /// Fires a run every `interval` until `shutdown` resolves.
    ///
    /// The timer is re-armed only after a run completes, so runs never
    /// overlap however long one takes.
    pub async fn run_scheduled<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Scheduler active, reports every {:?}", interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            // Failures are already logged and reported; wait for the next tick.
            if let Ok(outcome) = self.run_once().await {
                info!(
                    "Scheduled run finished: {} records, {} artifacts",
                    outcome.records,
                    outcome.artifacts.len()
                );
            }
        }
    }
}

impl<D: Dispatcher> ReportService<D> {
    /// Create an Axum router exposing a manual trigger and a health check
    pub fn router(self: Arc<Self>) -> Router {
        info!("Creating report service router");
        Router::new()
            .route("/report-run", post(report_run::<D>))
            .route("/health", get(health))
            .with_state(self)
    }
}

/// Writes every artifact into `dir`, or none of them.
///
/// Each file is written under a temporary name and renamed once all writes
/// succeeded. Existing files are never replaced.
pub fn save_artifacts(dir: &Path, artifacts: &[ReportArtifact]) -> ReportResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let tmp = dir.join(format!(".{}.partial", artifact.filename));
        if let Err(e) = fs::write(&tmp, &artifact.content) {
            error!("Failed to write {}: {}", tmp.display(), e);
            let _ = fs::remove_file(&tmp);
            discard(&staged);
            return Err(e.into());
        }
        staged.push((tmp, dir.join(&artifact.filename)));
    }

    let mut saved = Vec::with_capacity(staged.len());
    for (index, (tmp, target)) in staged.iter().enumerate() {
        let moved = if fs::symlink_metadata(target).is_ok() {
            Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ))
        } else {
            fs::rename(tmp, target)
        };
        if let Err(e) = moved {
            error!("Failed to move {} into place: {}", target.display(), e);
            discard(&staged[index..]);
            for path in &saved {
                let _ = fs::remove_file(path);
            }
            return Err(e.into());
        }
        saved.push(target.clone());
    }

    info!("Saved {} artifact(s) to {}", saved.len(), dir.display());
    Ok(saved)
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

// Route handlers
async fn report_run<D: Dispatcher>(State(service): State<Arc<ReportService<D>>>) -> Response {
    info!("Received manual report trigger");

    match service.try_run().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(ReportError::RunInProgress) => (
            StatusCode::CONFLICT,
            ReportError::RunInProgress.to_string(),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing report: {}", e),
        )
            .into_response(),
    }
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sales-report-bot-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn artifacts_share_the_run_stamp() {
        let records = vec![SalesRecord::new("A", 1, 2.0)];
        let artifacts = build_artifacts(&records, "2024-01-01_00-00-00").unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "sales_report_2024-01-01_00-00-00.pdf",
                "sales_report_2024-01-01_00-00-00.xlsx"
            ]
        );
        assert!(artifacts[0].content.starts_with(b"%PDF"));
        assert!(artifacts[1].content.starts_with(b"PK"));
    }

    #[test]
    fn empty_records_produce_no_artifacts() {
        assert!(matches!(
            build_artifacts(&[], "x"),
            Err(ReportError::EmptyInput)
        ));
    }

    #[test]
    fn saved_artifacts_land_under_final_names() {
        let dir = temp_dir("save");
        let artifacts = vec![
            ReportArtifact::new(ArtifactKind::Pdf, "s", b"pdf".to_vec()),
            ReportArtifact::new(ArtifactKind::Workbook, "s", b"xlsx".to_vec()),
        ];

        let saved = save_artifacts(&dir, &artifacts).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(fs::read(dir.join("sales_report_s.pdf")).unwrap(), b"pdf");
        assert_eq!(fs::read(dir.join("sales_report_s.xlsx")).unwrap(), b"xlsx");

        let leftovers = fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    fn artifacts() -> Vec<ReportArtifact> {
        vec![
            ReportArtifact::new(ArtifactKind::Pdf, "s", b"pdf".to_vec()),
            ReportArtifact::new(ArtifactKind::Workbook, "s", b"xlsx".to_vec()),
        ]
    }

    fn partials(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".partial"))
            .collect()
    }

    #[test]
    fn failed_move_rolls_back_earlier_files() {
        let dir = temp_dir("rollback");
        fs::create_dir_all(dir.join("sales_report_s.xlsx")).unwrap();

        let err = save_artifacts(&dir, &artifacts()).unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
        assert!(!dir.join("sales_report_s.pdf").exists());
        assert!(dir.join("sales_report_s.xlsx").is_dir());
        assert!(partials(&dir).is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn existing_report_is_not_overwritten() {
        let dir = temp_dir("existing");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("sales_report_s.pdf"), b"earlier run").unwrap();

        let err = save_artifacts(&dir, &artifacts()).unwrap_err();
        match err {
            ReportError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::AlreadyExists),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read(dir.join("sales_report_s.pdf")).unwrap(), b"earlier run");
        assert!(!dir.join("sales_report_s.xlsx").exists());
        assert!(partials(&dir).is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = temp_dir("write");
        // A directory where the workbook's temporary file should go.
        fs::create_dir_all(dir.join(".sales_report_s.xlsx.partial")).unwrap();

        let err = save_artifacts(&dir, &artifacts()).unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
        assert!(!dir.join(".sales_report_s.pdf.partial").exists());
        assert!(!dir.join("sales_report_s.pdf").exists());
        assert!(!dir.join("sales_report_s.xlsx").exists());
        assert!(partials(&dir).is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn run_stamps_carry_milliseconds() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let first = day.and_hms_milli_opt(14, 5, 7, 42).unwrap();
        let second = day.and_hms_milli_opt(14, 5, 7, 43).unwrap();

        let stamp = first.format(STAMP_FORMAT).to_string();
        assert_eq!(stamp, "2024-03-09_14-05-07-042");

        // Two runs inside the same second still get their own files.
        let next = second.format(STAMP_FORMAT).to_string();
        let a = ReportArtifact::new(ArtifactKind::Pdf, &stamp, Vec::new());
        let b = ReportArtifact::new(ArtifactKind::Pdf, &next, Vec::new());
        assert_ne!(a.filename, b.filename);
    }
}
