use resend_rs::{
    types::{Attachment, CreateEmailBaseOptions},
    Resend,
};
use std::future::Future;
use tracing::{error, info};

use crate::config::ReportConfig;
use crate::error::DispatchError;
use crate::models::sales::ReportArtifact;

pub const REPORT_SUBJECT: &str = "Automated sales reports";
pub const ERROR_SUBJECT: &str = "Error from sales report bot";

/// Delivers the artifacts of a finished run.
pub trait Dispatcher: Send + Sync + 'static {
    /// Sends every artifact in one delivery; returns the transport's id for it.
    fn deliver(
        &self,
        artifacts: &[ReportArtifact],
    ) -> impl Future<Output = Result<String, DispatchError>> + Send;

    /// Reports a failed run. Artifacts are never attached.
    fn notify_failure(
        &self,
        _error_info: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send {
        async { Ok(()) }
    }
}

/// Mails reports through the Resend API.
#[derive(Clone)]
pub struct ResendDispatcher {
    resend: Resend,
    sender: String,
    recipient: String,
    error_recipient: Option<String>,
}

impl ResendDispatcher {
    pub fn new(resend: Resend, config: &ReportConfig) -> Self {
        Self {
            resend,
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
            error_recipient: config.error_recipient.clone(),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(Resend::new(&config.resend_api_key), config)
    }
}

impl Dispatcher for ResendDispatcher {
    async fn deliver(&self, artifacts: &[ReportArtifact]) -> Result<String, DispatchError> {
        if artifacts.is_empty() {
            return Err(DispatchError::Rejected("no artifacts to deliver".to_string()));
        }

        info!(
            "Preparing report email from {} to {} with {} attachment(s)",
            self.sender,
            self.recipient,
            artifacts.len()
        );

        let mut email = CreateEmailBaseOptions::new(
            self.sender.as_str(),
            [self.recipient.as_str()],
            REPORT_SUBJECT,
        )
        .with_text(&report_email_text(artifacts));

        for artifact in artifacts {
            info!("Attaching {}", artifact);
            email = email.with_attachment(
                Attachment::from_content(artifact.content.clone())
                    .with_filename(&artifact.filename)
                    .with_content_type(artifact.kind.content_type()),
            );
        }

        match self.resend.emails.send(email).await {
            Ok(response) => {
                info!("Report email sent to {} with ID: {}", self.recipient, response.id);
                Ok(response.id.to_string())
            }
            Err(e) => {
                error!("Failed to send report email: {}", e);
                Err(e.into())
            }
        }
    }

    async fn notify_failure(&self, error_info: &str) -> Result<(), DispatchError> {
        let Some(to) = self.error_recipient.as_deref() else {
            return Ok(());
        };

        info!("Sending error information email to {}", to);
        let email =
            CreateEmailBaseOptions::new(self.sender.as_str(), [to], ERROR_SUBJECT).with_text(error_info);

        match self.resend.emails.send(email).await {
            Ok(response) => {
                info!("Error info email sent successfully with ID: {}", response.id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send error info email: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Plain-text body listing the attached files.
pub fn report_email_text(artifacts: &[ReportArtifact]) -> String {
    let mut text = String::from("The latest sales reports are attached:\n");
    for artifact in artifacts {
        text.push_str("  - ");
        text.push_str(&artifact.filename);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sales::ArtifactKind;

    #[test]
    fn body_lists_every_attachment() {
        let artifacts = vec![
            ReportArtifact::new(ArtifactKind::Pdf, "2024-05-01_10-00-00", vec![0; 4]),
            ReportArtifact::new(ArtifactKind::Workbook, "2024-05-01_10-00-00", vec![0; 8]),
        ];
        let text = report_email_text(&artifacts);
        assert_eq!(
            text,
            "The latest sales reports are attached:\n  - sales_report_2024-05-01_10-00-00.pdf\n  - sales_report_2024-05-01_10-00-00.xlsx\n"
        );
    }
}
