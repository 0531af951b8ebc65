//! Folder watching and the serialized relay worker.
//!
//! `NotifyWatcher` bridges filesystem creation events into an async stream;
//! `Relay` drains that stream one document at a time, so a slow lookup or
//! SMTP session for one document delays detection of the next by design.
//! Shutdown is cooperative: `RelayHandle::stop` asks the worker to stop
//! accepting events and reports whether the in-flight document finished
//! within the deadline.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::WatchError;
use crate::pipeline::Pipeline;

/// A folder-watch creation event.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Stream of creation events from the watched folder.
pub type EventStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

/// Bridge an event receiver into a stream.
pub fn into_stream(rx: mpsc::UnboundedReceiver<WatchEvent>) -> EventStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|ev| (ev, rx))
    }))
}

/// Does this event name a non-directory path ending in the recognized
/// document extension (case-insensitive)?
pub fn is_document_event(event: &WatchEvent, extension: &str) -> bool {
    if event.is_dir {
        return false;
    }
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    event
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(&suffix))
}

// ── Notify watcher ──────────────────────────────────────────────────

/// Watches one directory (non-recursive) for file creation.
///
/// Holds the underlying watcher; dropping this stops event delivery.
pub struct NotifyWatcher {
    _watcher: RecommendedWatcher,
}

impl NotifyWatcher {
    /// Start watching `dir` and return the event stream.
    pub fn start(dir: &Path) -> Result<(Self, EventStream), WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_)) {
                        for path in event.paths {
                            let is_dir = path.is_dir();
                            // Receiver gone means we are shutting down.
                            let _ = tx.send(WatchEvent { path, is_dir });
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Watcher error"),
            })
            .map_err(|e| WatchError::StartupFailed(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::WatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!(dir = %dir.display(), "Watching folder");
        Ok((Self { _watcher: watcher }, into_stream(rx)))
    }
}

// ── Relay worker ────────────────────────────────────────────────────

/// The serialized worker: one background task, one document fully processed
/// before the next event is accepted.
pub struct Relay {
    pipeline: Arc<Pipeline>,
    settle_delay: Duration,
    extension: String,
}

impl Relay {
    pub fn new(pipeline: Arc<Pipeline>, settle_delay: Duration, extension: String) -> Self {
        Self {
            pipeline,
            settle_delay,
            extension,
        }
    }

    /// Spawn the worker task over an event stream.
    pub fn spawn(self, mut events: EventStream) -> RelayHandle {
        let Relay {
            pipeline,
            settle_delay,
            extension,
        } = self;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_notify = Arc::new(Notify::new());

        let flag = Arc::clone(&stop_flag);
        let notified = Arc::clone(&stop_notify);

        let handle = tokio::spawn(async move {
            loop {
                if flag.load(Ordering::Relaxed) {
                    info!("Relay worker stopping");
                    return;
                }
                tokio::select! {
                    _ = notified.notified() => {
                        info!("Relay worker stopping");
                        return;
                    }
                    maybe = events.next() => {
                        let Some(event) = maybe else {
                            info!("Event stream closed; relay worker exiting");
                            return;
                        };
                        if !is_document_event(&event, &extension) {
                            continue;
                        }
                        info!(path = %event.path.display(), "New document detected");
                        // Settle delay: give the writer time to finish.
                        tokio::time::sleep(settle_delay).await;
                        pipeline.process(&event.path).await;
                    }
                }
            }
        });

        RelayHandle {
            stop_flag,
            stop_notify,
            handle,
        }
    }
}

/// Handle to a running relay worker.
pub struct RelayHandle {
    stop_flag: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl RelayHandle {
    /// Ask the worker to stop accepting events and wait up to `deadline`
    /// for the in-flight document to finish.
    ///
    /// Returns `true` when the worker honored the deadline. On `false` the
    /// task is abandoned, not interrupted: no partial-document rollback is
    /// attempted.
    pub async fn stop(self, deadline: Duration) -> bool {
        self.stop_flag.store(true, Ordering::Relaxed);
        self.stop_notify.notify_one();

        match tokio::time::timeout(deadline, self.handle).await {
            Ok(_) => {
                info!("Relay worker stopped cleanly");
                true
            }
            Err(_) => {
                warn!(?deadline, "Relay worker did not stop within deadline; abandoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BODY_TEMPLATE, DEFAULT_ERROR_TEMPLATE, RelayConfig};
    use crate::dispatch::Dispatcher;
    use crate::error::ProcessError;
    use crate::extract::TextExtractor;
    use crate::route::FsRouter;
    use crate::stats::{StatsTotals, stats_channel};
    use crate::validate::{RecipientValidator, Verdict};
    use async_trait::async_trait;
    use secrecy::SecretString;

    fn event(path: &Path, is_dir: bool) -> WatchEvent {
        WatchEvent {
            path: path.to_path_buf(),
            is_dir,
        }
    }

    #[test]
    fn filter_accepts_matching_extension_case_insensitive() {
        assert!(is_document_event(&event(Path::new("/in/a.pdf"), false), "pdf"));
        assert!(is_document_event(&event(Path::new("/in/B.PDF"), false), "pdf"));
        assert!(is_document_event(&event(Path::new("/in/c.PdF"), false), "pdf"));
    }

    #[test]
    fn filter_rejects_directories_and_other_files() {
        assert!(!is_document_event(&event(Path::new("/in/a.pdf"), true), "pdf"));
        assert!(!is_document_event(&event(Path::new("/in/notes.txt"), false), "pdf"));
        assert!(!is_document_event(&event(Path::new("/in/pdf"), false), "pdf"));
    }

    // ── Worker doubles ──────────────────────────────────────────────

    struct UnreadableExtractor;

    impl TextExtractor for UnreadableExtractor {
        fn extract(&self, path: &Path) -> Result<String, ProcessError> {
            Err(ProcessError::Unreadable {
                path: path.to_path_buf(),
                reason: "test double".into(),
            })
        }
    }

    struct AlwaysValid;

    #[async_trait]
    impl RecipientValidator for AlwaysValid {
        async fn validate(&self, _address: &str) -> Verdict {
            Verdict::Valid
        }
    }

    struct NullDispatcher;

    #[async_trait]
    impl Dispatcher for NullDispatcher {
        async fn send(
            &self,
            _recipient: &str,
            _document: &Path,
            _error_detail: Option<&str>,
        ) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn relay_processes_serially_and_honors_shutdown_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("B.PDF");
        let skip = dir.path().join("notes.txt");
        for p in [&a, &b, &skip] {
            std::fs::write(p, b"x").unwrap();
        }

        let config = RelayConfig {
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            sender: "operator@test.com".into(),
            password: SecretString::from("secret"),
            watch_dir: dir.path().to_path_buf(),
            sent_dir: dir.path().join("sent"),
            failed_dir: dir.path().join("failed"),
            extension: "pdf".into(),
            settle_delay: Duration::ZERO,
            shutdown_deadline: Duration::from_secs(5),
            body_template: DEFAULT_BODY_TEMPLATE.into(),
            error_template: DEFAULT_ERROR_TEMPLATE.into(),
        };

        let (stats_tx, mut stats_rx) = stats_channel();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(UnreadableExtractor),
            Arc::new(AlwaysValid),
            Arc::new(NullDispatcher),
            Arc::new(FsRouter),
            stats_tx,
            config,
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let handle =
            Relay::new(pipeline, Duration::ZERO, "pdf".into()).spawn(into_stream(rx));

        tx.send(event(&a, false)).unwrap();
        tx.send(event(&skip, false)).unwrap();
        tx.send(event(&dir.path().join("sub"), true)).unwrap();
        tx.send(event(&b, false)).unwrap();

        // Both documents are unreadable, so each produces one failure delta.
        let mut totals = StatsTotals::default();
        totals.apply(stats_rx.recv().await.unwrap());
        totals.apply(stats_rx.recv().await.unwrap());
        assert_eq!(totals.processed, 2);
        assert_eq!(totals.errors, 2);

        assert!(dir.path().join("failed").join("a.pdf").exists());
        assert!(dir.path().join("failed").join("B.PDF").exists());
        assert!(skip.exists());

        assert!(handle.stop(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn closed_event_stream_stops_worker() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            sender: "operator@test.com".into(),
            password: SecretString::from("secret"),
            watch_dir: dir.path().to_path_buf(),
            sent_dir: dir.path().join("sent"),
            failed_dir: dir.path().join("failed"),
            extension: "pdf".into(),
            settle_delay: Duration::ZERO,
            shutdown_deadline: Duration::from_secs(5),
            body_template: DEFAULT_BODY_TEMPLATE.into(),
            error_template: DEFAULT_ERROR_TEMPLATE.into(),
        };
        let (stats_tx, _stats_rx) = stats_channel();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(UnreadableExtractor),
            Arc::new(AlwaysValid),
            Arc::new(NullDispatcher),
            Arc::new(FsRouter),
            stats_tx,
            config,
        ));

        let (tx, rx) = mpsc::unbounded_channel::<WatchEvent>();
        let handle =
            Relay::new(pipeline, Duration::ZERO, "pdf".into()).spawn(into_stream(rx));
        drop(tx);

        assert!(handle.stop(Duration::from_secs(5)).await);
    }
}
