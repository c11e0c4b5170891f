//! Batch conversion of many XML files
//!
//! [`BatchDriver`] owns the ordered list of pending files and calls the
//! [`Converter`] once per file. Progress and results go to a [`BatchReporter`];
//! [`spawn`] runs a driver on a worker thread and forwards the same
//! notifications as [`BatchEvent`]s over a channel.

use crate::converter::Converter;
use crate::error::ConversionError;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// What the batch does after a file fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop; the failed file and everything after it stay pending.
    #[default]
    Halt,
    /// Record the failure and move on to the next file.
    Continue,
}

/// Shared flag that stops a batch from starting further conversions.
///
/// A conversion already running is always allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives batch notifications. Every method defaults to doing nothing.
pub trait BatchReporter {
    /// Called after each attempted file.
    fn progress(&mut self, _done: usize, _total: usize) {}

    fn converted(&mut self, _input: &Path, _output: &Path) {}

    fn failed(&mut self, _error: &ConversionError) {}

    /// Called once, after the last file or when the batch stops early.
    fn finished(&mut self, _summary: &BatchSummary) {}
}

/// Silent reporter.
impl BatchReporter for () {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedFile {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub input: PathBuf,
    pub message: String,
}

/// Result of one [`BatchDriver::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Files pending when the run started.
    pub total: usize,
    pub converted: Vec<ConvertedFile>,
    pub failed: Vec<FailedFile>,
    /// Files not converted when the run ended, in their original order.
    pub pending: Vec<PathBuf>,
    pub cancelled: bool,
}

/// How a batch ended, from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// There was nothing to convert.
    Empty,
    Success { count: usize },
    PartialSuccess { count: usize, total: usize },
    /// Nothing was converted.
    Failure,
}

impl BatchSummary {
    pub fn outcome(&self) -> BatchOutcome {
        let count = self.converted.len();
        if self.total == 0 {
            BatchOutcome::Empty
        } else if count == self.total {
            BatchOutcome::Success { count }
        } else if count > 0 {
            BatchOutcome::PartialSuccess {
                count,
                total: self.total,
            }
        } else {
            BatchOutcome::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome(), BatchOutcome::Success { .. })
    }
}

/// Converts a list of files one at a time, in the order given.
pub struct BatchDriver {
    converter: Converter,
    policy: ErrorPolicy,
    pending: VecDeque<PathBuf>,
    cancel: CancelToken,
}

impl BatchDriver {
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            converter: Converter::default(),
            policy: ErrorPolicy::default(),
            pending: files.into_iter().collect(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Token that cancels this driver's runs from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Files still waiting to be converted.
    pub fn pending(&self) -> impl Iterator<Item = &Path> {
        self.pending.iter().map(PathBuf::as_path)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Convert every pending file.
    ///
    /// A file leaves the pending list once it is converted, or once its
    /// failure is recorded under [`ErrorPolicy::Continue`]. Under
    /// [`ErrorPolicy::Halt`] a failed file stays pending, so calling `run`
    /// again retries from that file.
    pub fn run<R: BatchReporter + ?Sized>(&mut self, reporter: &mut R) -> BatchSummary {
        let total = self.pending.len();
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        let mut attempted = 0;

        while let Some(input) = self.pending.front().cloned() {
            if self.cancel.is_cancelled() {
                debug!(remaining = self.pending.len(), "batch cancelled");
                summary.cancelled = true;
                break;
            }

            let halt = match self.converter.convert(&input) {
                Ok(output) => {
                    self.pending.pop_front();
                    reporter.converted(&input, &output);
                    summary.converted.push(ConvertedFile { input, output });
                    false
                }
                Err(error) => {
                    debug!(%error, "conversion failed");
                    reporter.failed(&error);
                    summary.failed.push(FailedFile {
                        input: error.path.clone(),
                        message: error.cause.to_string(),
                    });
                    if self.policy == ErrorPolicy::Continue {
                        self.pending.pop_front();
                    }
                    self.policy == ErrorPolicy::Halt
                }
            };

            attempted += 1;
            reporter.progress(attempted, total);

            if halt {
                break;
            }
        }

        summary.pending = self.pending.iter().cloned().collect();
        reporter.finished(&summary);
        summary
    }
}

//==============================================================================
// Background worker
//==============================================================================

/// Notification posted by a batch running on a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Progress { done: usize, total: usize },
    Converted { input: PathBuf, output: PathBuf },
    Failed { input: PathBuf, message: String },
    Finished(BatchSummary),
}

struct ChannelReporter {
    tx: Sender<BatchEvent>,
}

impl ChannelReporter {
    fn post(&self, event: BatchEvent) {
        // A receiver that stopped listening does not stop the batch
        if self.tx.send(event).is_err() {
            debug!("batch event receiver dropped");
        }
    }
}

impl BatchReporter for ChannelReporter {
    fn progress(&mut self, done: usize, total: usize) {
        self.post(BatchEvent::Progress { done, total });
    }

    fn converted(&mut self, input: &Path, output: &Path) {
        self.post(BatchEvent::Converted {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        });
    }

    fn failed(&mut self, error: &ConversionError) {
        self.post(BatchEvent::Failed {
            input: error.path.clone(),
            message: error.cause.to_string(),
        });
    }

    fn finished(&mut self, summary: &BatchSummary) {
        self.post(BatchEvent::Finished(summary.clone()));
    }
}

/// A batch running on its own thread.
pub struct BatchHandle {
    events: Receiver<BatchEvent>,
    cancel: CancelToken,
    worker: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    /// Events in the order they happened; the iterator ends when the worker exits.
    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    /// Stop before the next file; the current one still completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker and return its summary.
    pub fn join(self) -> thread::Result<BatchSummary> {
        self.worker.join()
    }
}

/// Run `driver` on a background thread.
pub fn spawn(mut driver: BatchDriver) -> std::io::Result<BatchHandle> {
    let (tx, rx) = channel();
    let cancel = driver.cancel_token();

    let worker = thread::Builder::new()
        .name("xml2xlsx-batch".to_string())
        .spawn(move || {
            let mut reporter = ChannelReporter { tx };
            driver.run(&mut reporter)
        })?;

    Ok(BatchHandle {
        events: rx,
        cancel,
        worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(total: usize, converted: usize) -> BatchSummary {
        BatchSummary {
            total,
            converted: (0..converted)
                .map(|i| ConvertedFile {
                    input: PathBuf::from(format!("{}.xml", i)),
                    output: PathBuf::from(format!("{}.xlsx", i)),
                })
                .collect(),
            ..BatchSummary::default()
        }
    }

    #[test]
    fn test_outcome_variants() {
        assert_eq!(summary(0, 0).outcome(), BatchOutcome::Empty);
        assert_eq!(summary(3, 3).outcome(), BatchOutcome::Success { count: 3 });
        assert_eq!(
            summary(3, 1).outcome(),
            BatchOutcome::PartialSuccess { count: 1, total: 3 }
        );
        assert_eq!(summary(2, 0).outcome(), BatchOutcome::Failure);
        assert!(summary(1, 1).is_success());
        assert!(!summary(0, 0).is_success());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_empty_batch_reports_finished() {
        struct Count(usize);
        impl BatchReporter for Count {
            fn finished(&mut self, _summary: &BatchSummary) {
                self.0 += 1;
            }
        }

        let mut reporter = Count(0);
        let result = BatchDriver::new(Vec::new()).run(&mut reporter);
        assert_eq!(result.outcome(), BatchOutcome::Empty);
        assert_eq!(reporter.0, 1);
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(BatchOutcome::PartialSuccess { count: 1, total: 2 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "partial_success", "count": 1, "total": 2})
        );
    }
}
