use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use config::{Config, Environment, File};
use tracing::{debug, info};

use crate::args::Args;
use crate::error::ConfigError;
use crate::secret::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://api.smartsheet.com/2.0";
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct Cfg {
    pub smartsheet: SmartsheetConfig,
    pub target_dir: PathBuf,
    pub mail: MailConfig,

    // Set from the command line only
    pub output_override: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct SmartsheetConfig {
    pub api_token: SecretString,
    pub report_id: String,
    pub name_template: String,
    pub assume_user: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS, usually port 465).
    Tls,
    /// Plain connect, then STARTTLS before authenticating.
    Starttls,
}

impl FromStr for TlsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(TlsMode::Tls),
            "starttls" => Ok(TlsMode::Starttls),
            other => Err(ConfigError::Invalid {
                key: "MAIL_TLS",
                message: format!("expected 'tls' or 'starttls', got '{}'", other),
            }),
        }
    }
}

/// Transport and recipient settings for failure notifications.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub login: String,
    pub password: SecretString,
    pub tls: TlsMode,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: IMPLICIT_TLS_PORT,
            login: String::new(),
            password: SecretString::default(),
            tls: TlsMode::Tls,
            from: String::new(),
            to: String::new(),
            cc: String::new(),
            bcc: String::new(),
        }
    }
}

impl Cfg {
    pub fn load(args: &Args) -> Result<Self> {
        info!("Loading configuration from environment and {}", args.config);

        let mut builder = Config::builder();
        if Path::new(&args.config).exists() {
            builder = builder.add_source(File::with_name(&args.config).required(false));
        } else {
            debug!("Config file not found, using environment only");
        }
        let config = builder
            .add_source(Environment::default())
            .build()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let mut cfg = Self::from_config(&config)?;

        if let Some(file) = &args.file {
            debug!("Overriding output path from command line");
            cfg.output_override = Some(file.clone());
        }
        cfg.verbose = args.verbose;

        debug!("Final configuration: {:?}", cfg);
        Ok(cfg)
    }

    /// Read every recognized key. Missing keys become empty strings; required
    /// values are checked by [`Cfg::validate`].
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            config
                .get_string(&key.to_ascii_lowercase())
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let port = match get("MAIL_PORT").as_str() {
            "" => IMPLICIT_TLS_PORT,
            raw => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "MAIL_PORT",
                message: format!("'{}': {}", raw, e),
            })?,
        };
        let tls = match get("MAIL_TLS").as_str() {
            "" if port == IMPLICIT_TLS_PORT => TlsMode::Tls,
            "" => TlsMode::Starttls,
            raw => raw.parse()?,
        };
        let base_url = match get("SMARTSHEET_BASE_URL") {
            url if url.is_empty() => DEFAULT_BASE_URL.to_string(),
            url => url.trim_end_matches('/').to_string(),
        };

        Ok(Self {
            smartsheet: SmartsheetConfig {
                api_token: SecretString::new(get("SMARTSHEET_API")),
                report_id: get("SMARTSHEET_ID"),
                name_template: get("SMARTSHEET_NAME"),
                assume_user: get("SMARTSHEET_USER"),
                base_url,
            },
            target_dir: PathBuf::from(get("TARGET_DIR")),
            mail: MailConfig {
                server: get("MAIL_SERVER"),
                port,
                login: get("MAIL_LOGIN"),
                password: SecretString::new(get("MAIL_PASSWORD")),
                tls,
                from: get("MAIL_FROM"),
                to: get("MAIL_TO"),
                cc: get("MAIL_CC"),
                bcc: get("MAIL_BCC"),
            },
            output_override: None,
            verbose: false,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smartsheet.api_token.is_empty() {
            return Err(ConfigError::Missing("SMARTSHEET_API"));
        }
        if self.smartsheet.report_id.is_empty() {
            return Err(ConfigError::Missing("SMARTSHEET_ID"));
        }
        if self.output_override.is_none() && self.smartsheet.name_template.is_empty() {
            return Err(ConfigError::Missing("SMARTSHEET_NAME"));
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn config_with(pairs: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder
                .set_override(key.to_ascii_lowercase(), value.to_string())
                .unwrap();
        }
        builder.build().unwrap()
    }

    pub(crate) fn sample_cfg() -> Cfg {
        Cfg::from_config(&config_with(&[
            ("SMARTSHEET_API", "token-123"),
            ("SMARTSHEET_ID", "4242"),
            ("SMARTSHEET_NAME", "boat_sales_%Y%m%d"),
            ("SMARTSHEET_USER", "reports@example.com"),
            ("TARGET_DIR", "/out"),
            ("MAIL_SERVER", "smtp.example.com"),
            ("MAIL_LOGIN", "robot"),
            ("MAIL_PASSWORD", "hunter2"),
            ("MAIL_FROM", "Robot <robot@example.com>"),
            ("MAIL_TO", "Admin <admin@example.com>"),
            ("MAIL_CC", ""),
            ("MAIL_BCC", ""),
        ]))
        .unwrap()
    }

    #[test]
    fn reads_recognized_keys() {
        let cfg = sample_cfg();
        assert_eq!(cfg.smartsheet.api_token.expose(), "token-123");
        assert_eq!(cfg.smartsheet.report_id, "4242");
        assert_eq!(cfg.smartsheet.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.target_dir, PathBuf::from("/out"));
        assert_eq!(cfg.mail.port, 465);
        assert_eq!(cfg.mail.tls, TlsMode::Tls);
        assert_eq!(cfg.mail.cc, "");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn secrets_do_not_leak_into_debug_output() {
        let rendered = format!("{:?}", sample_cfg());
        assert!(!rendered.contains("token-123"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn port_selects_tls_mode() {
        let cfg = Cfg::from_config(&config_with(&[("MAIL_PORT", "587")])).unwrap();
        assert_eq!(cfg.mail.port, 587);
        assert_eq!(cfg.mail.tls, TlsMode::Starttls);

        let cfg = Cfg::from_config(&config_with(&[("MAIL_PORT", "2525"), ("MAIL_TLS", "TLS")]))
            .unwrap();
        assert_eq!(cfg.mail.tls, TlsMode::Tls);
    }

    #[test]
    fn rejects_bad_port_and_tls() {
        assert!(matches!(
            Cfg::from_config(&config_with(&[("MAIL_PORT", "smtp")])),
            Err(ConfigError::Invalid { key: "MAIL_PORT", .. })
        ));
        assert!(matches!(
            Cfg::from_config(&config_with(&[("MAIL_TLS", "none")])),
            Err(ConfigError::Invalid { key: "MAIL_TLS", .. })
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = Cfg::from_config(&config_with(&[(
            "SMARTSHEET_BASE_URL",
            "https://api.smartsheet.eu/2.0/",
        )]))
        .unwrap();
        assert_eq!(cfg.smartsheet.base_url, "https://api.smartsheet.eu/2.0");
    }

    #[test]
    fn validate_requires_token_id_and_name() {
        let empty = Cfg::from_config(&config_with(&[])).unwrap();
        assert!(matches!(
            empty.validate(),
            Err(ConfigError::Missing("SMARTSHEET_API"))
        ));

        let mut cfg = sample_cfg();
        cfg.smartsheet.report_id.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("SMARTSHEET_ID"))));

        let mut cfg = sample_cfg();
        cfg.smartsheet.name_template.clear();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Missing("SMARTSHEET_NAME"))
        ));
        cfg.output_override = Some(PathBuf::from("/tmp/custom.xlsx"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_applies_command_line_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "smartsheet_id = \"from-file\"\nsmartsheet_name = \"daily_%d\"\n",
        )
        .unwrap();

        let args = Args {
            file: Some(PathBuf::from("/tmp/override.xlsx")),
            verbose: true,
            log_level: "info".to_string(),
            env_file: PathBuf::from(".env"),
            config: file.to_string_lossy().into_owned(),
        };
        let cfg = Cfg::load(&args).unwrap();
        assert_eq!(cfg.output_override, Some(PathBuf::from("/tmp/override.xlsx")));
        assert!(cfg.verbose);
        if std::env::var("SMARTSHEET_ID").is_err() {
            assert_eq!(cfg.smartsheet.report_id, "from-file");
        }
    }
}
