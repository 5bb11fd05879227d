// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Batch discovery and dispatch
//!
//! Every eligible file becomes a task on one queue. A fixed number of
//! workers drain the queue and report each terminal state on a result
//! channel, which the dispatcher aggregates into the batch summary.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::ledger::{LedgerWriter, LEDGER_FILE};
use crate::media::NormalizerRegistry;
use crate::pipeline::{FailureKind, MediaTask, Pipeline, TaskOutcome, TaskSettings, TEMP_DIR};
use crate::{Result, StocktagError};

/// Read side of the batch cancellation flag
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Write side of the batch cancellation flag
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Create a connected cancellation handle and token
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    /// Stop every task that has not started yet
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let changed = rx.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if changed.is_err() {
            // Handle dropped without cancelling: never resolves.
            std::future::pending::<()>().await;
        }
    }
}

/// Emitted after every terminal task state
#[derive(Debug)]
pub struct Progress<'a> {
    /// Progress units so far (skipped tasks add none)
    pub completed: usize,
    pub total: usize,
    pub outcome: &'a TaskOutcome,
}

/// Result of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub completed: usize,
    pub ledger_rows: usize,
    pub elapsed_secs: f64,
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Succeeded { .. } => self.succeeded += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Skipped { .. } => self.skipped += 1,
        }
        self.completed += outcome.progress_units();
        self.outcomes.push(outcome);
    }

    /// Failed sources with their failure stage and reason
    pub fn failures(&self) -> impl Iterator<Item = (&Path, FailureKind, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            TaskOutcome::Failed { source, kind, reason, .. } => Some((source.as_path(), *kind, reason.as_str())),
            _ => None,
        })
    }
}

/// Check if a discovered file should be queued at all
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip temporary files
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    !skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n))
}

/// Recursively collect supported media under `input`, sorted by path.
///
/// `exclude` (normally the output directory) is not descended into when it
/// lies inside the input tree, so earlier results are never re-queued.
pub fn discover_media(input: &Path, exclude: Option<&Path>, registry: &NormalizerRegistry) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Err(StocktagError::Config(format!(
            "Input folder does not exist: {}",
            input.display()
        )));
    }

    let input_canonical = input.canonicalize()?;
    let excluded = exclude
        .and_then(|p| p.canonicalize().ok())
        .filter(|p| *p != input_canonical);

    let mut files = Vec::new();
    walk(input, excluded.as_deref(), registry, &mut files);
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, excluded: Option<&Path>, registry: &NormalizerRegistry, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read {:?}: {}", dir, e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        // file_type() does not follow links.
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_symlink() && path.is_dir() {
            debug!("Not following directory link {:?}", path);
            continue;
        }
        if file_type.is_dir() {
            let skip = excluded
                .map(|ex| path.canonicalize().map(|c| c == ex).unwrap_or(false))
                .unwrap_or(false);
            if skip {
                debug!("Not descending into output folder {:?}", path);
                continue;
            }
            walk(&path, excluded, registry, files);
        } else if path.is_file() && should_process(&path) && registry.is_supported(&path) {
            files.push(path);
        }
    }
}

/// Runs batches of tasks on a bounded worker pool
pub struct Dispatcher {
    pipeline: Pipeline,
    workers: usize,
    settings: Arc<TaskSettings>,
}

impl Dispatcher {
    pub fn new(pipeline: Pipeline, workers: usize, settings: TaskSettings) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
            settings: Arc::new(settings),
        }
    }

    /// Process `files`, writing results under `output_dir`.
    ///
    /// Returns once every task has reached a terminal state, the ledger has
    /// been flushed and the batch scratch folder removed.
    pub async fn run<F>(
        &self,
        files: Vec<PathBuf>,
        output_dir: &Path,
        cancel: CancelToken,
        mut on_progress: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(&Progress<'_>),
    {
        let started = Instant::now();
        let total = files.len();
        let mut summary = BatchSummary { total, ..Default::default() };

        std::fs::create_dir_all(output_dir)?;
        let temp_root = output_dir.join(TEMP_DIR);
        let scratch_dir = temp_root.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&scratch_dir)?;

        let (ledger, ledger_writer) = LedgerWriter::spawn(output_dir.join(LEDGER_FILE));

        // Queue every task upfront
        let (task_tx, task_rx) = mpsc::unbounded_channel::<MediaTask>();
        for (i, path) in files.into_iter().enumerate() {
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                warn!("Skipping path without a file name: {:?}", path);
                continue;
            };
            let input_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let task = MediaTask {
                index: i + 1,
                total,
                file_name,
                input_dir,
                output_dir: output_dir.to_path_buf(),
                scratch_dir: scratch_dir.clone(),
                settings: self.settings.clone(),
                ledger: ledger.clone(),
                cancel: cancel.clone(),
            };
            if task_tx.send(task).is_err() {
                break;
            }
        }
        drop(task_tx);
        drop(ledger);

        let pool_size = self.workers.min(total.max(1));
        info!("Dispatching {} files on {} workers", total, pool_size);

        let queue = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<TaskOutcome>();
        let mut workers = Vec::with_capacity(pool_size);
        for worker_id in 0..pool_size {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                queue.clone(),
                result_tx.clone(),
                self.pipeline.clone(),
                self.settings.delay,
                cancel.clone(),
            )));
        }
        drop(result_tx);

        while let Some(outcome) = result_rx.recv().await {
            let progress = Progress {
                completed: summary.completed + outcome.progress_units(),
                total,
                outcome: &outcome,
            };
            on_progress(&progress);
            summary.record(outcome);
        }

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker aborted: {}", e);
            }
        }

        summary.ledger_rows = ledger_writer.finish().await?;
        cleanup_scratch(&scratch_dir, &temp_root);
        summary.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped in {:.1}s",
            summary.succeeded, summary.failed, summary.skipped, summary.elapsed_secs
        );
        Ok(summary)
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<MediaTask>>>,
    results: mpsc::UnboundedSender<TaskOutcome>,
    pipeline: Pipeline,
    delay: Duration,
    cancel: CancelToken,
) {
    debug!("[Worker {}] Started", worker_id);
    loop {
        let next = queue.lock().await.recv().await;
        let Some(task) = next else { break };

        let outcome = pipeline.run(task).await;
        let ran = outcome.progress_units() > 0;
        if results.send(outcome).is_err() {
            break;
        }

        // Pace requests to the API; a cancelled batch does not wait.
        if ran && !delay.is_zero() && !cancel.is_cancelled() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
    debug!("[Worker {}] Finished", worker_id);
}

fn cleanup_scratch(scratch_dir: &Path, temp_root: &Path) {
    if let Err(e) = std::fs::remove_dir_all(scratch_dir) {
        warn!("Could not remove scratch folder {:?}: {}", scratch_dir, e);
    }
    // Left in place when another batch is still using it.
    let _ = std::fs::remove_dir(temp_root);
}
