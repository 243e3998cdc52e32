use thiserror::Error;

/// Errors produced while parsing `Name <address>` strings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty email address")]
    Empty,
    #[error("unterminated angle-bracket address: '{0}'")]
    Unterminated(String),
    #[error("invalid email address '{address}': {message}")]
    Invalid { address: String, message: String },
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("invalid file name template '{0}'")]
    InvalidTemplate(String),
    #[error("path '{0}' has no file name component")]
    NoFileName(String),
    #[error("file name in '{0}' is not valid UTF-8")]
    NonUtf8FileName(String),
    #[error("cannot determine current directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Failures of the remote report export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("request to Smartsheet failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Smartsheet returned {status} (errorCode {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },
    #[error("failed to write report to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures on the notification path. These never leave the dispatcher.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("address error: {0}")]
    Address(#[from] AddressError),
    #[error("no recipients configured")]
    NoRecipients,
    #[error("failed to read attachment {path}: {message}")]
    Attachment { path: String, message: String },
    #[error("failed to render notification body: {0}")]
    Template(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to send notification: {0}")]
    SendFailed(String),
}
