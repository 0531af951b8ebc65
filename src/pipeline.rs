//! Per-document processing pipeline.
//!
//! Flow for each detected document:
//! 1. Extract text
//! 2. Scan for candidate addresses, validate each independently
//! 3. Dispatch once per valid recipient (or notify the operator when none
//!    survived validation)
//! 4. Route the file to the sent/failed folder on the aggregate outcome
//! 5. Publish one stats delta
//!
//! Partial success is policy-failure: if any individual send fails the
//! document routes to the failed folder, every failed send counts one
//! error, and the aggregate failure adds exactly one more. The
//! no-valid-recipient path counts exactly one error with no extra
//! increment. That asymmetry is carried over from the original system on
//! purpose; see DESIGN.md before "fixing" it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::error::ProcessError;
use crate::extract::TextExtractor;
use crate::route::DocumentRouter;
use crate::scan;
use crate::stats::{StatsDelta, StatsSender};
use crate::validate::{RecipientValidator, Verdict};

/// Diagnostic embedded in the operator notification when no candidate
/// survives validation.
pub const NO_VALID_ADDRESS: &str = "no valid address found in document";

/// Aggregate outcome of one document, governing its final route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Result of one dispatch attempt for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Everything that happened to one document, terminal state included.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub dispatches: Vec<DispatchOutcome>,
    pub delta: StatsDelta,
    /// Where the document ended up, if routing itself succeeded.
    pub routed_to: Option<PathBuf>,
    pub completed_at: DateTime<Utc>,
}

/// The orchestrator. Wires extractor, validator, dispatcher and router into
/// the per-document state machine; every collaborator is a capability trait
/// so tests run without real DNS, SMTP or PDFs.
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    validator: Arc<dyn RecipientValidator>,
    dispatcher: Arc<dyn Dispatcher>,
    router: Arc<dyn DocumentRouter>,
    stats: StatsSender,
    config: RelayConfig,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        validator: Arc<dyn RecipientValidator>,
        dispatcher: Arc<dyn Dispatcher>,
        router: Arc<dyn DocumentRouter>,
        stats: StatsSender,
        config: RelayConfig,
    ) -> Self {
        Self {
            extractor,
            validator,
            dispatcher,
            router,
            stats,
            config,
        }
    }

    /// Process a single document from extraction through routing.
    ///
    /// Never returns an error: every failure is converted into a failed
    /// route plus a statistics increment, so the watch loop survives
    /// arbitrarily many bad documents.
    pub async fn process(&self, path: &Path) -> ProcessReport {
        info!(path = %path.display(), "Processing document");

        let report = match self.run(path).await {
            Ok(report) => report,
            Err(err) => {
                // Short-circuit: extraction or another step failed outright.
                error!(path = %path.display(), error = %err, "Document processing failed");
                let routed_to = self.route_by_outcome(path, Outcome::Failed);
                ProcessReport {
                    path: path.to_path_buf(),
                    outcome: Outcome::Failed,
                    dispatches: Vec::new(),
                    delta: StatsDelta {
                        processed: 1,
                        sent: 0,
                        errors: 1,
                    },
                    routed_to,
                    completed_at: Utc::now(),
                }
            }
        };

        if self.stats.send(report.delta).is_err() {
            debug!("Stats channel closed; delta dropped");
        }
        report
    }

    async fn run(&self, path: &Path) -> Result<ProcessReport, ProcessError> {
        let text = self.extract_text(path).await?;
        let recipients = self.validated_recipients(&text).await;

        if recipients.is_empty() {
            return Ok(self.notify_operator_and_fail(path).await);
        }

        let mut dispatches = Vec::with_capacity(recipients.len());
        let mut sent: u64 = 0;
        let mut failed: u64 = 0;

        for recipient in &recipients {
            match self.dispatcher.send(recipient, path, None).await {
                Ok(()) => {
                    sent += 1;
                    dispatches.push(DispatchOutcome {
                        recipient: recipient.clone(),
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!(recipient, error = %e, "Dispatch failed");
                    dispatches.push(DispatchOutcome {
                        recipient: recipient.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let outcome = if failed == 0 {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        };
        let routed_to = self.route_by_outcome(path, outcome);

        // Each failed send counts one error; an aggregate failure adds
        // exactly one more at route time.
        let errors = failed + u64::from(outcome == Outcome::Failed);

        info!(
            path = %path.display(),
            recipients = recipients.len(),
            sent,
            failed,
            outcome = ?outcome,
            "Document processed"
        );

        Ok(ProcessReport {
            path: path.to_path_buf(),
            outcome,
            dispatches,
            delta: StatsDelta {
                processed: 1,
                sent,
                errors,
            },
            routed_to,
            completed_at: Utc::now(),
        })
    }

    async fn extract_text(&self, path: &Path) -> Result<String, ProcessError> {
        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|e| ProcessError::Other(format!("extraction task panicked: {e}")))?
    }

    /// Validate every candidate independently, in scan order. Rejected
    /// candidates are dropped silently; they never receive a dispatch and
    /// are not counted as errors.
    async fn validated_recipients(&self, text: &str) -> Vec<String> {
        let mut recipients = Vec::new();
        for candidate in scan::scan_addresses(text) {
            match self.validator.validate(candidate).await {
                Verdict::Valid => recipients.push(candidate.to_string()),
                Verdict::Rejected(reason) => {
                    debug!(candidate, reason = reason.label(), "Candidate dropped");
                }
            }
        }
        recipients
    }

    /// No candidate survived validation: send exactly one error
    /// notification to the operator's own address and fail the document.
    /// The notification's own send result does not change the counters.
    async fn notify_operator_and_fail(&self, path: &Path) -> ProcessReport {
        warn!(path = %path.display(), "{NO_VALID_ADDRESS}");

        if let Err(e) = self
            .dispatcher
            .send(&self.config.sender, path, Some(NO_VALID_ADDRESS))
            .await
        {
            error!(error = %e, "Failed to send operator notification");
        }

        let routed_to = self.route_by_outcome(path, Outcome::Failed);
        ProcessReport {
            path: path.to_path_buf(),
            outcome: Outcome::Failed,
            dispatches: Vec::new(),
            delta: StatsDelta {
                processed: 1,
                sent: 0,
                errors: 1,
            },
            routed_to,
            completed_at: Utc::now(),
        }
    }

    /// Routing is the last step and has no fallback: a failure here is
    /// logged and the document stays where it is.
    fn route_by_outcome(&self, path: &Path, outcome: Outcome) -> Option<PathBuf> {
        let dest = match outcome {
            Outcome::Succeeded => &self.config.sent_dir,
            Outcome::Failed => &self.config.failed_dir,
        };
        match self.router.route(path, dest) {
            Ok(routed) => Some(routed),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Routing failed");
                None
            }
        }
    }
}
