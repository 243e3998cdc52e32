use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info};

use crate::cfg::SmartsheetConfig;
use crate::error::ExportError;
use crate::output::OutputTarget;
use crate::secret::SecretString;

const EXCEL_MIME: &str = "application/vnd.ms-excel";
const ASSUME_USER_HEADER: &str = "Assume-User";

/// Writes one report to disk in spreadsheet form.
#[async_trait]
pub trait ReportExporter: Send + Sync {
    async fn export_report(
        &self,
        report_id: &str,
        target: &OutputTarget,
    ) -> Result<PathBuf, ExportError>;
}

pub struct SmartsheetClient {
    http: reqwest::Client,
    base_url: String,
    api_token: SecretString,
    assume_user: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    error_code: i64,
    message: String,
}

impl SmartsheetClient {
    pub fn new(cfg: &SmartsheetConfig) -> Result<Self, ExportError> {
        info!("Initializing Smartsheet client for {}", cfg.base_url);

        let http = reqwest::Client::builder()
            .user_agent(concat!("report_pull/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            api_token: cfg.api_token.clone(),
            assume_user: (!cfg.assume_user.is_empty()).then(|| cfg.assume_user.clone()),
        })
    }

    fn report_url(&self, report_id: &str) -> String {
        format!("{}/reports/{}", self.base_url, urlencoding::encode(report_id))
    }
}

#[async_trait]
impl ReportExporter for SmartsheetClient {
    async fn export_report(
        &self,
        report_id: &str,
        target: &OutputTarget,
    ) -> Result<PathBuf, ExportError> {
        let url = self.report_url(report_id);
        info!("Exporting report {} as Excel", report_id);
        debug!("GET {}", url);

        let mut request = self
            .http
            .get(&url)
            .bearer_auth(self.api_token.expose())
            .header(ACCEPT, EXCEL_MIME);
        if let Some(user) = &self.assume_user {
            debug!("Assuming user {}", user);
            request = request.header(ASSUME_USER_HEADER, urlencoding::encode(user).into_owned());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let bytes = response.bytes().await?;
        debug!("Received {} bytes", bytes.len());
        write_report(target, &bytes).await
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> ExportError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => ExportError::Api {
            status: status.as_u16(),
            code: parsed.error_code,
            message: parsed.message,
        },
        Err(_) => ExportError::Api {
            status: status.as_u16(),
            code: 0,
            message: if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.trim().to_string()
            },
        },
    }
}

/// Create the target directory if needed and write the exported bytes.
pub async fn write_report(target: &OutputTarget, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    let path = target.path();
    let write_error = |source| ExportError::Write {
        path: path.display().to_string(),
        source,
    };

    tokio::fs::create_dir_all(&target.directory)
        .await
        .map_err(write_error)?;
    tokio::fs::write(&path, bytes).await.map_err(write_error)?;

    info!("Saved report to {}", path.display());
    Ok(path)
}
