//! Streaming orchestration
//!
//! Drives the whole pipeline: one synthetic verification incident at
//! startup, then the live follow loop. Every appended non-empty line is
//! paired with a fresh metrics snapshot and handed to the incident sink,
//! strictly one line at a time. Shutdown is cooperative: the loop
//! observes the shutdown channel between lines and never interrupts an
//! in-flight transmission.

mod tail;

pub use tail::LogTail;

use crate::client::{calculate_severity, extract_log_level, truncate_chars, IncidentSink};
use crate::observability::{ForwarderMetrics, StructuredLogger};
use crate::sampler::SnapshotSource;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Synthetic line sent once at startup to verify collector connectivity
pub const VERIFICATION_LINE: &str =
    "TEST INCIDENT: Log forwarder startup verification - this is a test message";

const LINE_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("Log file not found: {}", .0.display())]
    LogFileMissing(PathBuf),
    #[error("Failed to start log follower: {0}")]
    TailSpawn(#[source] std::io::Error),
    #[error("Log follower has no stdout pipe")]
    MissingStdout,
}

/// Lifecycle phases, published on the watch channel and exported through
/// the operational API and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwarderState {
    Starting,
    Verifying,
    Streaming,
    Stopping,
    Stopped,
}

impl std::fmt::Display for ForwarderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ForwarderState::Starting => "starting",
            ForwarderState::Verifying => "verifying",
            ForwarderState::Streaming => "streaming",
            ForwarderState::Stopping => "stopping",
            ForwarderState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

pub struct StreamingForwarder {
    log_file: PathBuf,
    sampler: Box<dyn SnapshotSource>,
    sink: Arc<dyn IncidentSink>,
    state_tx: watch::Sender<ForwarderState>,
    shutdown_rx: watch::Receiver<bool>,
    metrics: ForwarderMetrics,
    logger: StructuredLogger,
}

impl StreamingForwarder {
    pub fn new(
        log_file: impl Into<PathBuf>,
        sampler: Box<dyn SnapshotSource>,
        sink: Arc<dyn IncidentSink>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ForwarderState::Starting);
        Self {
            log_file: log_file.into(),
            sampler,
            sink,
            state_tx,
            shutdown_rx,
            metrics: ForwarderMetrics::new(),
            logger: StructuredLogger::new(crate::client::STREAMING_SERVICE_NAME),
        }
    }

    /// Subscribe to lifecycle transitions
    pub fn state_receiver(&self) -> watch::Receiver<ForwarderState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ForwarderState {
        *self.state_tx.borrow()
    }

    /// Run the full lifecycle until shutdown or the follower exits
    pub async fn run(&mut self) -> Result<(), ForwarderError> {
        self.set_state(ForwarderState::Verifying);
        self.send_verification().await;

        self.set_state(ForwarderState::Streaming);
        let outcome = self.stream().await;

        self.set_state(ForwarderState::Stopping);
        if let Err(e) = &outcome {
            error!(error = %e, "Streaming ended with error");
        }
        self.set_state(ForwarderState::Stopped);
        outcome
    }

    fn set_state(&self, state: ForwarderState) {
        self.state_tx.send_replace(state);
        self.metrics.set_state(&state.to_string());
        self.logger.log_state_change(&state.to_string());
    }

    /// Connectivity self-check, never fatal
    async fn send_verification(&mut self) {
        match self.sampler.sample().await {
            Ok(snapshot) => {
                let delivered = self
                    .sink
                    .send_log_as_incident(VERIFICATION_LINE, &snapshot)
                    .await;
                self.logger.log_verification(delivered);
            }
            Err(e) => {
                self.metrics.inc_sampling_errors();
                warn!(error = %e, "Skipping startup verification, sampling failed");
            }
        }
    }

    async fn stream(&mut self) -> Result<(), ForwarderError> {
        let mut tail = LogTail::follow(&self.log_file)?;
        info!(path = %self.log_file.display(), "Following log file");

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                maybe_line = tail.next_line() => {
                    match maybe_line {
                        Some(raw) => {
                            let line = raw.trim();
                            if line.is_empty() {
                                continue;
                            }
                            self.forward_line(line).await;
                        }
                        None => {
                            warn!("Log follower exited on its own");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Shutdown requested, stopping stream");
                    break;
                }
            }
        }

        tail.stop().await;
        Ok(())
    }

    async fn forward_line(&mut self, line: &str) {
        let started = Instant::now();
        let snapshot = match self.sampler.sample().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.inc_sampling_errors();
                error!(error = %e, "Metrics sampling failed, skipping transmission");
                return;
            }
        };
        self.metrics
            .observe_sampling_duration(started.elapsed().as_secs_f64());

        let delivered = self.sink.send_log_as_incident(line, &snapshot).await;
        self.metrics.inc_lines_forwarded();
        if !delivered {
            self.metrics.inc_delivery_failures();
        }
        self.logger.log_line_forwarded(
            truncate_chars(line, LINE_PREVIEW_CHARS),
            calculate_severity(line),
            extract_log_level(line),
            delivered,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricsSnapshot;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct MockSampler {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SnapshotSource for MockSampler {
        async fn sample(&mut self) -> Result<MetricsSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("sampling unavailable")
            }
            Ok(MetricsSnapshot::fixture())
        }
    }

    #[derive(Default)]
    struct MockSink {
        lines: Mutex<Vec<String>>,
        deliver: bool,
    }

    #[async_trait]
    impl IncidentSink for MockSink {
        async fn send_log_as_incident(&self, line: &str, _snapshot: &MetricsSnapshot) -> bool {
            self.lines.lock().unwrap().push(line.to_string());
            self.deliver
        }
    }

    fn forwarder_parts(
        path: impl Into<PathBuf>,
        fail_sampling: bool,
    ) -> (
        StreamingForwarder,
        Arc<MockSink>,
        Arc<AtomicUsize>,
        watch::Sender<bool>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let sampler = MockSampler {
            calls: calls.clone(),
            fail: fail_sampling,
        };
        let sink = Arc::new(MockSink {
            lines: Mutex::new(Vec::new()),
            deliver: true,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let forwarder =
            StreamingForwarder::new(path, Box::new(sampler), sink.clone(), shutdown_rx);
        (forwarder, sink, calls, shutdown_tx)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met within 5s");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_verification_precedes_streamed_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(&path, "ERROR: first\n").unwrap();

        let (mut forwarder, sink, _calls, shutdown_tx) = forwarder_parts(&path, false);
        let state_rx = forwarder.state_receiver();
        let handle = tokio::spawn(async move { forwarder.run().await });

        wait_until(|| sink.lines.lock().unwrap().len() >= 2).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines[0], VERIFICATION_LINE);
        assert_eq!(lines[1], "ERROR: first");
        assert_eq!(*state_rx.borrow(), ForwarderState::Stopped);
    }

    #[tokio::test]
    async fn test_every_line_gets_its_own_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let (mut forwarder, sink, calls, shutdown_tx) = forwarder_parts(&path, false);
        let handle = tokio::spawn(async move { forwarder.run().await });

        wait_until(|| sink.lines.lock().unwrap().len() >= 3).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // One sample for verification plus one per forwarded line
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(&path, "\n   \nreal line\n\n").unwrap();

        let (mut forwarder, sink, _calls, shutdown_tx) = forwarder_parts(&path, false);
        let handle = tokio::spawn(async move { forwarder.run().await });

        wait_until(|| sink.lines.lock().unwrap().len() >= 2).await;
        // Give any stray blank line a moment to arrive before asserting
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "real line");
    }

    #[tokio::test]
    async fn test_missing_log_file_is_fatal_after_verification() {
        let temp = TempDir::new().unwrap();
        let (mut forwarder, sink, _calls, _shutdown_tx) =
            forwarder_parts(temp.path().join("absent.log"), false);
        let state_rx = forwarder.state_receiver();

        let result = forwarder.run().await;

        assert!(matches!(result, Err(ForwarderError::LogFileMissing(_))));
        // Verification still went out before the failed follow
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
        assert_eq!(*state_rx.borrow(), ForwarderState::Stopped);
    }

    #[tokio::test]
    async fn test_sampling_failure_suppresses_transmission() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(&path, "ERROR: never sent\n").unwrap();

        let (mut forwarder, sink, calls, shutdown_tx) = forwarder_parts(&path, true);
        let handle = tokio::spawn(async move { forwarder.run().await });

        // The failing sampler is still consulted for verification and the line
        wait_until(|| calls.load(Ordering::SeqCst) >= 2).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_flag_checked_between_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (mut forwarder, _sink, _calls, shutdown_tx) = forwarder_parts(&path, false);
        let state_rx = forwarder.state_receiver();
        let handle = tokio::spawn(async move { forwarder.run().await });

        let mut streaming_rx = state_rx.clone();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *streaming_rx.borrow() != ForwarderState::Streaming {
                streaming_rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(*state_rx.borrow(), ForwarderState::Stopped);
    }
}
