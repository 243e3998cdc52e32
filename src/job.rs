use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info, warn};

use crate::{
    cfg::Cfg,
    notify::{self, DeliveryOutcome, NotificationDispatcher},
    output,
    smartsheet::ReportExporter,
};

pub async fn run_job(cfg: &Cfg, exporter: &dyn ReportExporter) -> Result<PathBuf> {
    info!("Starting job execution");

    cfg.validate()?;

    let target = output::resolve(
        &cfg.smartsheet.name_template,
        Local::now().naive_local(),
        cfg.output_override.as_deref(),
        &cfg.target_dir,
    )
    .context("failed to resolve output path")?;

    if cfg.verbose {
        println!("Saving report to {}", target.path().display());
    }
    debug!("Output target: {:?}", target);

    let path = exporter
        .export_report(&cfg.smartsheet.report_id, &target)
        .await
        .with_context(|| format!("failed to export report {}", cfg.smartsheet.report_id))?;

    info!("Exported report {} to {}", cfg.smartsheet.report_id, path.display());
    Ok(path)
}

/// Run the job; on failure email the admin, then hand back the original error.
pub async fn run_with_error_handling(
    cfg: &Cfg,
    exporter: &dyn ReportExporter,
    dispatcher: &NotificationDispatcher,
) -> Result<PathBuf> {
    match run_job(cfg, exporter).await {
        Ok(path) => {
            info!("Job completed successfully");
            Ok(path)
        }
        Err(e) => {
            warn!("Job failed with error: {:#}", e);
            report_failure(cfg, dispatcher, &e).await;
            Err(e)
        }
    }
}

/// Email the admin about `err`. Delivery problems are logged and returned as
/// an outcome, never as an error.
pub async fn report_failure(
    cfg: &Cfg,
    dispatcher: &NotificationDispatcher,
    err: &anyhow::Error,
) -> DeliveryOutcome {
    let (subject, body) = match notify::failure_report(&cfg.smartsheet.report_id, err) {
        Ok(report) => report,
        Err(render_err) => {
            warn!("Could not render failure notification: {}", render_err);
            return DeliveryOutcome::Failed(render_err.to_string());
        }
    };

    let outcome = dispatcher.attempt_send(&subject, &body, None).await;
    match &outcome {
        DeliveryOutcome::Sent => info!("Failure notification sent"),
        DeliveryOutcome::Failed(reason) => {
            warn!("Failure notification was not delivered: {}", reason)
        }
    }
    outcome
}
