//! Best-effort failure notifications over SMTP.
//!
//! Nothing in here returns an error to the caller: a broken mail path is
//! logged and reported as [`DeliveryOutcome::Failed`] so it can never mask
//! the failure being reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use minijinja::{context, AutoEscape, Environment};
use tracing::{debug, error, info, warn};

use crate::address::{self, EmailAddress};
use crate::cfg::{MailConfig, TlsMode};
use crate::error::NotifyError;

pub const FAILURE_SUBJECT: &str = "Smartsheet report export failed";

/// One notification email, built fresh for each failure.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<PathBuf>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
}

/// Seam between message building and delivery, so tests can swap in a mock.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_email(&self, message: Message) -> Result<(), String>;
}

/// Delivers through the configured SMTP server with TLS and login.
pub struct SmtpMailTransport {
    config: MailConfig,
}

impl SmtpMailTransport {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
        let host = &self.config.server;
        if host.is_empty() {
            return Err("MAIL_SERVER is not set".to_string());
        }

        let tls_parameters = TlsParameters::new(host.clone())
            .map_err(|e| format!("TLS configuration error: {}", e))?;
        let tls = match self.config.tls {
            TlsMode::Tls => Tls::Wrapper(tls_parameters),
            TlsMode::Starttls => Tls::Required(tls_parameters),
        };

        let builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(self.config.port)
            .tls(tls);

        let builder = if self.config.login.is_empty() {
            warn!("MAIL_LOGIN is empty, sending without authentication");
            builder
        } else {
            builder.credentials(Credentials::new(
                self.config.login.clone(),
                self.config.password.expose().to_string(),
            ))
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send_email(&self, message: Message) -> Result<(), String> {
        let transport = self.build_transport()?;
        debug!(server = %self.config.server, port = self.config.port, "sending notification");
        transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

pub struct NotificationDispatcher {
    config: MailConfig,
    transport: Arc<dyn MailTransport>,
}

impl NotificationDispatcher {
    pub fn new(config: MailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }

    pub fn from_config(config: &MailConfig) -> Self {
        Self::new(
            config.clone(),
            Arc::new(SmtpMailTransport::new(config.clone())),
        )
    }

    /// Build and send one email. Failures are logged and returned as
    /// [`DeliveryOutcome::Failed`], never as an error.
    pub async fn attempt_send(
        &self,
        subject: &str,
        html_body: &str,
        attachment: Option<&Path>,
    ) -> DeliveryOutcome {
        match self.send(subject, html_body, attachment).await {
            Ok(()) => {
                info!(subject = %subject, "notification email sent");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                error!(error = %e, subject = %subject, "failed to send notification email");
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn send(
        &self,
        subject: &str,
        html_body: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        let request = self.build_request(subject, html_body, attachment)?;
        debug!(
            to = %join(&request.to),
            cc = %join(&request.cc),
            bcc = request.bcc.len(),
            "built notification request"
        );
        let message = self.build_message(&request).await?;
        self.transport
            .send_email(message)
            .await
            .map_err(NotifyError::SendFailed)
    }

    pub fn build_request(
        &self,
        subject: &str,
        html_body: &str,
        attachment: Option<&Path>,
    ) -> Result<NotificationRequest, NotifyError> {
        let request = NotificationRequest {
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            attachment: attachment.map(Path::to_path_buf),
            to: address::parse_list(&self.config.to)?,
            cc: address::parse_list(&self.config.cc)?,
            bcc: address::parse_list(&self.config.bcc)?,
        };

        if request.to.is_empty() && request.cc.is_empty() && request.bcc.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        Ok(request)
    }

    pub async fn build_message(
        &self,
        request: &NotificationRequest,
    ) -> Result<Message, NotifyError> {
        let from = address::parse(&self.config.from)?.to_mailbox()?;
        let mut builder = Message::builder().from(from).subject(&request.subject);
        for recipient in &request.to {
            builder = builder.to(recipient.to_mailbox()?);
        }
        for recipient in &request.cc {
            builder = builder.cc(recipient.to_mailbox()?);
        }
        for recipient in &request.bcc {
            builder = builder.bcc(recipient.to_mailbox()?);
        }

        let html = SinglePart::html(request.html_body.clone());
        let message = match &request.attachment {
            None => builder.singlepart(html),
            Some(path) => {
                let attachment = read_attachment(path).await?;
                builder.multipart(MultiPart::mixed().singlepart(html).singlepart(attachment))
            }
        };
        message.map_err(|e| NotifyError::Build(e.to_string()))
    }
}

fn join(addresses: &[EmailAddress]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn read_attachment(path: &Path) -> Result<SinglePart, NotifyError> {
    let attachment_error = |message: String| NotifyError::Attachment {
        path: path.display().to_string(),
        message,
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| attachment_error(e.to_string()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| attachment_error("no file name".to_string()))?;
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| attachment_error(e.to_string()))?;

    Ok(Attachment::new(file_name).body(bytes, content_type))
}

const FAILURE_BODY_TEMPLATE: &str = "\
<html><body>
<p>Export of Smartsheet report {{ report_id }} failed at {{ failed_at }}.</p>
<pre>{{ trace }}</pre>
</body></html>
";

/// Subject and HTML body describing a failed export. The error chain is
/// HTML-escaped by the template engine.
pub fn failure_report(
    report_id: &str,
    err: &anyhow::Error,
) -> Result<(String, String), NotifyError> {
    let subject = if report_id.is_empty() {
        FAILURE_SUBJECT.to_string()
    } else {
        format!("{}: report {}", FAILURE_SUBJECT, report_id)
    };

    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    let body = env
        .render_str(
            FAILURE_BODY_TEMPLATE,
            context! {
                report_id => report_id,
                failed_at => Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                trace => format!("{:?}", err),
            },
        )
        .map_err(|e| NotifyError::Template(e.to_string()))?;

    Ok((subject, body))
}
