//! Outbound dispatch: message construction and SMTP transport.

use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::RelayConfig;
use crate::error::ProcessError;

/// Capability trait for sending one message per validated recipient.
///
/// `error_detail` selects the message shape: `None` attaches the document
/// itself, `Some` renders the error template instead and carries no
/// attachment (used only for the operator notification).
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        document: &Path,
        error_detail: Option<&str>,
    ) -> Result<(), ProcessError>;
}

// ── SMTP dispatcher ─────────────────────────────────────────────────

/// Sends over a STARTTLS SMTP session with credential auth.
///
/// A fresh session is opened per message and closed after submission.
/// Nothing is retried: any failure at connect, authenticate, or submit
/// surfaces as a single [`ProcessError::Dispatch`].
pub struct SmtpDispatcher {
    config: RelayConfig,
}

impl SmtpDispatcher {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn send(
        &self,
        recipient: &str,
        document: &Path,
        error_detail: Option<&str>,
    ) -> Result<(), ProcessError> {
        let filename = filename_of(document);

        // The attachment variant carries the document bytes; a read failure
        // here is a dispatch failure for this recipient, not a crash.
        let payload = match error_detail {
            None => Some(tokio::fs::read(document).await.map_err(|e| {
                ProcessError::Dispatch {
                    recipient: recipient.to_string(),
                    reason: format!("failed to read attachment: {e}"),
                }
            })?),
            Some(_) => None,
        };

        let message = build_message(&self.config, recipient, &filename, payload, error_detail)?;

        let host = self.config.smtp_host.clone();
        let port = self.config.smtp_port;
        let creds = Credentials::new(
            self.config.sender.clone(),
            self.config.password.expose_secret().to_string(),
        );
        let to = recipient.to_string();

        // Blocking transport; run off the async worker.
        tokio::task::spawn_blocking(move || {
            let transport = SmtpTransport::starttls_relay(&host)
                .map_err(|e| ProcessError::Dispatch {
                    recipient: to.clone(),
                    reason: format!("SMTP relay error: {e}"),
                })?
                .port(port)
                .credentials(creds)
                .build();

            transport
                .send(&message)
                .map_err(|e| ProcessError::Dispatch {
                    recipient: to.clone(),
                    reason: format!("SMTP send failed: {e}"),
                })?;
            Ok::<_, ProcessError>(())
        })
        .await
        .map_err(|e| ProcessError::Other(format!("dispatch task panicked: {e}")))??;

        info!(recipient, filename = %filename, "Email sent");
        Ok(())
    }
}

// ── Message construction (pure, tested) ─────────────────────────────

/// Render a body template, substituting `{filename}` and, when present,
/// `{error}`.
pub fn render_template(template: &str, filename: &str, error: Option<&str>) -> String {
    let rendered = template.replace("{filename}", filename);
    match error {
        Some(detail) => rendered.replace("{error}", detail),
        None => rendered,
    }
}

/// Subject line identifying the filename, per message shape.
pub fn subject_for(filename: &str, is_error: bool) -> String {
    if is_error {
        format!("Processing error for file: {filename}")
    } else {
        format!("Automated delivery of file: {filename}")
    }
}

/// Build the outbound message.
///
/// `payload` is the document's raw bytes for the attachment variant; the
/// error-notification variant passes `None` and gets a plain body only.
pub fn build_message(
    config: &RelayConfig,
    recipient: &str,
    filename: &str,
    payload: Option<Vec<u8>>,
    error_detail: Option<&str>,
) -> Result<Message, ProcessError> {
    let dispatch_err = |reason: String| ProcessError::Dispatch {
        recipient: recipient.to_string(),
        reason,
    };

    let from: Mailbox = config
        .sender
        .parse()
        .map_err(|e| dispatch_err(format!("invalid sender address: {e}")))?;
    let to: Mailbox = recipient
        .parse()
        .map_err(|e| dispatch_err(format!("invalid recipient address: {e}")))?;

    let (template, is_error) = match error_detail {
        Some(_) => (config.error_template.as_str(), true),
        None => (config.body_template.as_str(), false),
    };
    let body = render_template(template, filename, error_detail);

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(subject_for(filename, is_error));

    let message = match payload {
        Some(bytes) => {
            let attachment = Attachment::new(filename.to_string()).body(
                bytes,
                ContentType::parse("application/octet-stream")
                    .map_err(|e| dispatch_err(format!("invalid content type: {e}")))?,
            );
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(attachment),
            )
        }
        None => builder.body(body),
    }
    .map_err(|e| dispatch_err(format!("failed to build message: {e}")))?;

    Ok(message)
}

fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BODY_TEMPLATE, DEFAULT_ERROR_TEMPLATE};
    use secrecy::SecretString;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_config() -> RelayConfig {
        RelayConfig {
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            sender: "relay@test.com".into(),
            password: SecretString::from("secret"),
            watch_dir: PathBuf::from("/tmp/watch"),
            sent_dir: PathBuf::from("/tmp/watch/sent"),
            failed_dir: PathBuf::from("/tmp/watch/failed"),
            extension: "pdf".into(),
            body_template: DEFAULT_BODY_TEMPLATE.into(),
            error_template: DEFAULT_ERROR_TEMPLATE.into(),
            settle_delay: Duration::from_secs(2),
            shutdown_deadline: Duration::from_secs(5),
        }
    }

    #[test]
    fn template_substitutes_filename() {
        let body = render_template("file: {filename}", "scan.pdf", None);
        assert_eq!(body, "file: scan.pdf");
    }

    #[test]
    fn template_substitutes_error_detail() {
        let body = render_template("{filename}: {error}", "scan.pdf", Some("no valid address"));
        assert_eq!(body, "scan.pdf: no valid address");
    }

    #[test]
    fn subjects_identify_the_filename() {
        assert!(subject_for("scan.pdf", false).contains("scan.pdf"));
        assert!(subject_for("scan.pdf", true).contains("scan.pdf"));
        assert_ne!(subject_for("scan.pdf", false), subject_for("scan.pdf", true));
    }

    #[test]
    fn attachment_message_carries_document_bytes() {
        let msg = build_message(
            &test_config(),
            "alice@example.com",
            "scan.pdf",
            Some(b"%PDF-1.4 fake".to_vec()),
            None,
        )
        .unwrap();
        let formatted = String::from_utf8_lossy(&msg.formatted()).into_owned();
        assert!(formatted.contains("Automated delivery of file: scan.pdf"));
        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("attachment"));
        assert!(formatted.contains("scan.pdf"));
    }

    #[test]
    fn error_notification_has_no_attachment() {
        let msg = build_message(
            &test_config(),
            "relay@test.com",
            "scan.pdf",
            None,
            Some("no valid address found in document"),
        )
        .unwrap();
        let formatted = String::from_utf8_lossy(&msg.formatted()).into_owned();
        assert!(formatted.contains("Processing error for file: scan.pdf"));
        assert!(formatted.contains("no valid address found in document"));
        assert!(!formatted.contains("multipart/mixed"));
    }

    #[test]
    fn invalid_recipient_is_a_dispatch_error() {
        let err = build_message(&test_config(), "not an address", "scan.pdf", None, None)
            .unwrap_err();
        assert!(matches!(err, ProcessError::Dispatch { .. }));
    }
}
