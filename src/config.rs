//! Relay configuration, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default message body for normal delivery. `{filename}` is replaced with
/// the document's file name.
pub const DEFAULT_BODY_TEMPLATE: &str = "Hello,\n\n\
Please find attached the file {filename}.\n\n\
Regards,\nAutomated document relay";

/// Default message body for the operator error notification. `{filename}`
/// and `{error}` are replaced.
pub const DEFAULT_ERROR_TEMPLATE: &str = "Hello,\n\n\
A problem was found while processing the file {filename}:\n\n\
{error}\n\n\
Please check the document and try again.\n\n\
Regards,\nAutomated document relay";

/// Wait after a creation event before touching the file, so a writer that
/// has not finished flushing is not raced.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// SMTP host for outbound mail.
    pub smtp_host: String,
    /// SMTP port (STARTTLS).
    pub smtp_port: u16,
    /// Sender address; also the operator address for error notifications.
    pub sender: String,
    /// SMTP credential for the sender.
    pub password: SecretString,
    /// Directory watched for new documents (non-recursive).
    pub watch_dir: PathBuf,
    /// Destination for documents whose aggregate outcome is success.
    pub sent_dir: PathBuf,
    /// Destination for documents whose aggregate outcome is failure.
    pub failed_dir: PathBuf,
    /// Recognized document extension, matched case-insensitively.
    pub extension: String,
    /// Body template for normal delivery (`{filename}`).
    pub body_template: String,
    /// Body template for error notifications (`{filename}`, `{error}`).
    pub error_template: String,
    /// Delay between a creation event and first read of the file.
    pub settle_delay: Duration,
    /// How long `stop` waits for an in-flight document before abandoning it.
    pub shutdown_deadline: Duration,
}

impl RelayConfig {
    /// Build config from environment variables.
    ///
    /// Required: `DOCRELAY_SMTP_HOST`, `DOCRELAY_SENDER`,
    /// `DOCRELAY_PASSWORD`, `DOCRELAY_WATCH_DIR`. Everything else has a
    /// default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let smtp_host = require_env("DOCRELAY_SMTP_HOST")?;
        let sender = require_env("DOCRELAY_SENDER")?;
        let password = SecretString::from(require_env("DOCRELAY_PASSWORD")?);
        let watch_dir = PathBuf::from(require_env("DOCRELAY_WATCH_DIR")?);

        let smtp_port = match std::env::var("DOCRELAY_SMTP_PORT") {
            Ok(raw) => parse_port(&raw)?,
            Err(_) => 587,
        };

        let sent_dir = std::env::var("DOCRELAY_SENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| watch_dir.join("sent"));

        let failed_dir = std::env::var("DOCRELAY_FAILED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| watch_dir.join("failed"));

        let extension = std::env::var("DOCRELAY_EXTENSION")
            .unwrap_or_else(|_| "pdf".to_string())
            .trim_start_matches('.')
            .to_ascii_lowercase();

        let body_template = std::env::var("DOCRELAY_BODY_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_BODY_TEMPLATE.to_string());

        let error_template = std::env::var("DOCRELAY_ERROR_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_ERROR_TEMPLATE.to_string());

        let shutdown_secs: u64 = std::env::var("DOCRELAY_SHUTDOWN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            smtp_host,
            smtp_port,
            sender,
            password,
            watch_dir,
            sent_dir,
            failed_dir,
            extension,
            body_template,
            error_template,
            settle_delay: SETTLE_DELAY,
            shutdown_deadline: Duration::from_secs(shutdown_secs),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let port: u32 = raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: "DOCRELAY_SMTP_PORT".to_string(),
        message: format!("not a number: {raw}"),
    })?;
    if port == 0 || port > 65535 {
        return Err(ConfigError::InvalidValue {
            key: "DOCRELAY_SMTP_PORT".to_string(),
            message: format!("port out of range: {port}"),
        });
    }
    Ok(port as u16)
}
