// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-file processing
//!
//! A task normalizes its file, asks the model for a description, resolves
//! keywords, category and filename, moves the file into place and records a
//! ledger row. Whatever goes wrong, the source ends up either at its final
//! path with a ledger row or in the `Error` folder.

use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::describe::{request_description, DescriptionRequest, Describer};
use crate::dispatcher::CancelToken;
use crate::ledger::{LedgerHandle, LedgerRow};
use crate::media::{NormalizerRegistry, Scratch};
use crate::metadata::{category_code, claim_unique_path, dotted_extension, output_stem, resolve_keywords};
use crate::{AppConfig, Result, StocktagError};

/// Folder inside the output directory that receives failed files
pub const ERROR_DIR: &str = "Error";

/// Folder inside the output directory that holds scratch files
pub const TEMP_DIR: &str = "__temp";

/// Limits shared by every task of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub max_title_length: usize,
    pub max_keywords: usize,
    pub custom_keywords: Option<String>,
    pub delay: Duration,
}

impl TaskSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_title_length: config.max_title_length,
            max_keywords: config.max_keywords,
            custom_keywords: config.custom_keywords().map(String::from),
            delay: Duration::from_secs(config.delay),
        }
    }

    fn description_request(&self) -> DescriptionRequest {
        DescriptionRequest {
            max_title_length: self.max_title_length,
            max_keywords: self.max_keywords,
            custom_keywords: self.custom_keywords.clone(),
        }
    }
}

/// One file's unit of work
#[derive(Debug, Clone)]
pub struct MediaTask {
    /// 1-based position in the batch
    pub index: usize,
    pub total: usize,
    pub file_name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub settings: Arc<TaskSettings>,
    pub ledger: LedgerHandle,
    pub cancel: CancelToken,
}

impl MediaTask {
    pub fn source_path(&self) -> PathBuf {
        self.input_dir.join(&self.file_name)
    }
}

/// Stage at which a task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Normalization,
    Description,
    Persistence,
    Unexpected,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Normalization => "normalization",
            FailureKind::Description => "description",
            FailureKind::Persistence => "persistence",
            FailureKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Terminal state of a task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded {
        source: PathBuf,
        destination: PathBuf,
        row: LedgerRow,
    },
    Failed {
        source: PathBuf,
        kind: FailureKind,
        reason: String,
        /// Where the file was parked, if it could be moved
        moved_to: Option<PathBuf>,
    },
    Skipped {
        source: PathBuf,
    },
}

impl TaskOutcome {
    /// Progress contributed by this outcome
    pub fn progress_units(&self) -> usize {
        match self {
            TaskOutcome::Succeeded { .. } | TaskOutcome::Failed { .. } => 1,
            TaskOutcome::Skipped { .. } => 0,
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            TaskOutcome::Succeeded { source, .. }
            | TaskOutcome::Failed { source, .. }
            | TaskOutcome::Skipped { source } => source,
        }
    }
}

struct Failure {
    kind: FailureKind,
    reason: String,
    /// Current location of the file when it is no longer at the source path
    file_at: Option<PathBuf>,
}

impl Failure {
    fn new(kind: FailureKind, error: impl std::fmt::Display) -> Self {
        Self { kind, reason: error.to_string(), file_at: None }
    }
}

/// Shared collaborators of every task
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<NormalizerRegistry>,
    describer: Arc<dyn Describer>,
}

impl Pipeline {
    pub fn new(registry: Arc<NormalizerRegistry>, describer: Arc<dyn Describer>) -> Self {
        Self { registry, describer }
    }

    /// Run one task to its terminal state
    pub async fn run(&self, task: MediaTask) -> TaskOutcome {
        let source = task.source_path();

        if task.cancel.is_cancelled() {
            debug!("[{}/{}] Skipping {:?}: batch cancelled", task.index, task.total, source);
            return TaskOutcome::Skipped { source };
        }

        info!("[{}/{}] Processing {:?}", task.index, task.total, source);

        match self.execute(&task, &source).await {
            Ok((destination, row)) => {
                info!("[{}/{}] Renamed to {:?}", task.index, task.total, destination);
                TaskOutcome::Succeeded { source, destination, row }
            }
            Err(failure) => {
                warn!(
                    "[{}/{}] {} failed for {:?}: {}",
                    task.index, task.total, failure.kind, source, failure.reason
                );
                let current = failure.file_at.clone().unwrap_or_else(|| source.clone());
                let moved_to = divert(current, task.file_name.clone(), task.output_dir.clone()).await;
                TaskOutcome::Failed {
                    source,
                    kind: failure.kind,
                    reason: failure.reason,
                    moved_to,
                }
            }
        }
    }

    async fn execute(&self, task: &MediaTask, source: &Path) -> std::result::Result<(PathBuf, LedgerRow), Failure> {
        // Normalize. The scratch guard lives until the task returns.
        let registry = self.registry.clone();
        let normalize_source = source.to_path_buf();
        let scratch = Scratch::new(task.scratch_dir.clone(), task.index);
        let (image, mime_type, _scratch) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut scratch = scratch;
            let normalized = registry.normalize(&normalize_source, &mut scratch)?;
            let bytes = std::fs::read(&normalized.path)?;
            Ok((bytes, normalized.mime_type, scratch))
        })
        .await
        .map_err(|e| Failure::new(FailureKind::Unexpected, e))?
        .map_err(|e| Failure::new(FailureKind::Normalization, e))?;

        // Describe
        let settings = &task.settings;
        let description =
            request_description(self.describer.as_ref(), &image, mime_type, &settings.description_request()).await;
        if !description.is_complete() {
            return Err(Failure::new(
                FailureKind::Description,
                StocktagError::Description(format!(
                    "model reply missing {}",
                    description.missing_fields().join(", ")
                )),
            ));
        }

        // Resolve
        let keywords = resolve_keywords(
            &description.keywords,
            settings.custom_keywords.as_deref(),
            settings.max_keywords,
        );
        let code = category_code(&description.category);
        if code.is_empty() {
            debug!("No category matched {:?}", description.category);
        }
        let stem = output_stem(&description.title, settings.max_title_length, Local::now().date_naive());
        let extension = dotted_extension(&task.file_name);

        // Move into place
        let output_dir = task.output_dir.clone();
        let from = source.to_path_buf();
        let destination = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let destination = claim_unique_path(&output_dir, &stem, &extension)?;
            if let Err(e) = move_file(&from, &destination) {
                let _ = std::fs::remove_file(&destination);
                return Err(e);
            }
            Ok(destination)
        })
        .await
        .map_err(|e| Failure::new(FailureKind::Unexpected, e))?
        .map_err(|e| Failure::new(FailureKind::Unexpected, e))?;

        // Record
        let final_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let row = LedgerRow::new(&final_name, &description.title, &keywords, code);
        if let Err(e) = task.ledger.append(row.clone()).await {
            return Err(Failure {
                kind: FailureKind::Persistence,
                reason: e.to_string(),
                file_at: Some(destination),
            });
        }

        Ok((destination, row))
    }
}

/// Move `from` to `to`, copying across filesystems when a rename is refused
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.exists() {
                return Err(StocktagError::FileSystem(rename_err));
            }
            debug!("Rename {:?} -> {:?} failed ({}), copying instead", from, to, rename_err);
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)?;
            Ok(())
        }
    }
}

/// Park a failed file in `<output>/Error`, keeping its original name when
/// free. Returns the new location, or `None` if the file is gone or could
/// not be moved.
pub fn move_to_error(current: &Path, file_name: &str, output_dir: &Path) -> Result<Option<PathBuf>> {
    if !current.exists() {
        return Ok(None);
    }

    let error_dir = output_dir.join(ERROR_DIR);
    std::fs::create_dir_all(&error_dir)?;

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let target = claim_unique_path(&error_dir, &stem, &dotted_extension(file_name))?;
    if let Err(e) = move_file(current, &target) {
        let _ = std::fs::remove_file(&target);
        return Err(e);
    }
    Ok(Some(target))
}

async fn divert(current: PathBuf, file_name: String, output_dir: PathBuf) -> Option<PathBuf> {
    let result = tokio::task::spawn_blocking(move || move_to_error(&current, &file_name, &output_dir)).await;
    match result {
        Ok(Ok(moved)) => moved,
        Ok(Err(e)) => {
            error!("Could not move failed file to {}: {}", ERROR_DIR, e);
            None
        }
        Err(e) => {
            error!("Error-folder move aborted: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::dispatcher::cancellation;
    use crate::ledger::{read_rows, LedgerWriter, LEDGER_FILE};
    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};

    struct Fixed(&'static str);

    #[async_trait]
    impl Describer for Fixed {
        async fn describe(&self, _image: &[u8], mime_type: &str, _prompt: &str) -> Result<String> {
            assert_eq!(mime_type, "image/jpeg");
            Ok(self.0.to_string())
        }
    }

    struct Env {
        _root: tempfile::TempDir,
        input: PathBuf,
        output: PathBuf,
        scratch: PathBuf,
    }

    fn env() -> Env {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        let scratch = output.join(TEMP_DIR).join("batch");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&scratch).unwrap();
        Env { _root: root, input, output, scratch }
    }

    fn write_png(path: &Path) {
        DynamicImage::ImageRgb8(RgbImage::new(64, 48)).save(path).unwrap();
    }

    fn task(env: &Env, file_name: &str, ledger: LedgerHandle, cancel: CancelToken) -> MediaTask {
        MediaTask {
            index: 1,
            total: 1,
            file_name: file_name.to_string(),
            input_dir: env.input.clone(),
            output_dir: env.output.clone(),
            scratch_dir: env.scratch.clone(),
            settings: Arc::new(TaskSettings {
                max_title_length: 120,
                max_keywords: 3,
                custom_keywords: Some("Sunset, sky".to_string()),
                delay: Duration::ZERO,
            }),
            ledger,
            cancel,
        }
    }

    fn pipeline(reply: &'static str) -> Pipeline {
        Pipeline::new(
            Arc::new(NormalizerRegistry::new(&ToolsConfig::default())),
            Arc::new(Fixed(reply)),
        )
    }

    #[tokio::test]
    async fn test_success_renames_and_records() {
        let env = env();
        write_png(&env.input.join("beach.png"));
        let (ledger, writer) = LedgerWriter::spawn(env.output.join(LEDGER_FILE));
        let (_handle, cancel) = cancellation();

        let outcome = pipeline("Title: A Red Car!\nKeywords: sky, beach, mountain, sunset\nCategory: This looks like Nature photography")
            .run(task(&env, "beach.png", ledger, cancel))
            .await;
        writer.finish().await.unwrap();

        let today = Local::now().format("%Y%m%d").to_string();
        let expected = env.output.join(format!("{}_A_Red_Car.png", today));
        match outcome {
            TaskOutcome::Succeeded { destination, row, .. } => {
                assert_eq!(destination, expected);
                assert_eq!(row.keywords, "Sunset, sky, beach");
                assert_eq!(row.category, "12");
                assert_eq!(row.title, "A Red Car");
            }
            other => panic!("Expected success, got {:?}", other),
        }
        assert!(expected.exists());
        assert!(!env.input.join("beach.png").exists());
        assert!(!env.scratch.join("resize_1.jpg").exists());

        let rows = read_rows(&env.output.join(LEDGER_FILE)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, format!("{}_A_Red_Car.png", today));
    }

    #[tokio::test]
    async fn test_incomplete_reply_goes_to_error() {
        let env = env();
        write_png(&env.input.join("lake.png"));
        let (ledger, writer) = LedgerWriter::spawn(env.output.join(LEDGER_FILE));
        let (_handle, cancel) = cancellation();

        let outcome = pipeline("Title: Lake\nCategory: Nature")
            .run(task(&env, "lake.png", ledger, cancel))
            .await;
        assert_eq!(writer.finish().await.unwrap(), 0);

        match outcome {
            TaskOutcome::Failed { kind, reason, moved_to, .. } => {
                assert_eq!(kind, FailureKind::Description);
                assert_eq!(reason, "Description failed: model reply missing keywords");
                assert_eq!(moved_to, Some(env.output.join(ERROR_DIR).join("lake.png")));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        assert!(env.output.join(ERROR_DIR).join("lake.png").exists());
        assert!(!env.output.join(LEDGER_FILE).exists());
        assert!(!env.scratch.join("resize_1.jpg").exists());
    }

    #[tokio::test]
    async fn test_undecodable_image_is_normalization_failure() {
        let env = env();
        std::fs::write(env.input.join("bad.jpg"), b"garbage").unwrap();
        let (ledger, _writer) = LedgerWriter::spawn(env.output.join(LEDGER_FILE));
        let (_handle, cancel) = cancellation();

        let outcome = pipeline("Title: x\nKeywords: y\nCategory: z")
            .run(task(&env, "bad.jpg", ledger, cancel))
            .await;

        assert!(matches!(
            outcome,
            TaskOutcome::Failed { kind: FailureKind::Normalization, .. }
        ));
        assert!(env.output.join(ERROR_DIR).join("bad.jpg").exists());
    }

    #[tokio::test]
    async fn test_ledger_failure_parks_renamed_file_in_error() {
        let env = env();
        write_png(&env.input.join("owl.png"));
        // A directory where the ledger file should be makes every append fail.
        let ledger_path = env.output.join(LEDGER_FILE);
        std::fs::create_dir_all(&ledger_path).unwrap();
        let (ledger, _writer) = LedgerWriter::spawn(ledger_path);
        let (_handle, cancel) = cancellation();

        let outcome = pipeline("Title: Owl\nKeywords: owl\nCategory: Animals")
            .run(task(&env, "owl.png", ledger, cancel))
            .await;

        assert!(matches!(
            outcome,
            TaskOutcome::Failed { kind: FailureKind::Persistence, .. }
        ));
        assert!(env.output.join(ERROR_DIR).join("owl.png").exists());
        let today = Local::now().format("%Y%m%d").to_string();
        assert!(!env.output.join(format!("{}_Owl.png", today)).exists());
    }

    #[tokio::test]
    async fn test_cancelled_task_is_skipped_untouched() {
        let env = env();
        write_png(&env.input.join("skip.png"));
        let (ledger, _writer) = LedgerWriter::spawn(env.output.join(LEDGER_FILE));
        let (handle, cancel) = cancellation();
        handle.cancel();

        let outcome = pipeline("Title: x\nKeywords: y\nCategory: z")
            .run(task(&env, "skip.png", ledger, cancel))
            .await;

        assert_eq!(outcome.progress_units(), 0);
        assert!(matches!(outcome, TaskOutcome::Skipped { .. }));
        assert!(env.input.join("skip.png").exists());
    }

    #[test]
    fn test_error_folder_disambiguates() {
        let env = env();
        let first = env.input.join("dup.png");
        std::fs::write(&first, b"1").unwrap();
        let moved = move_to_error(&first, "dup.png", &env.output).unwrap();
        assert_eq!(moved, Some(env.output.join(ERROR_DIR).join("dup.png")));

        std::fs::write(&first, b"2").unwrap();
        let moved = move_to_error(&first, "dup.png", &env.output).unwrap();
        assert_eq!(moved, Some(env.output.join(ERROR_DIR).join("dup_1.png")));
    }

    #[test]
    fn test_missing_file_is_not_moved() {
        let env = env();
        let moved = move_to_error(&env.input.join("gone.png"), "gone.png", &env.output).unwrap();
        assert_eq!(moved, None);
    }
}
