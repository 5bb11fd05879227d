// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! CSV metadata ledger
//!
//! One writer owns the ledger file. Tasks hand it rows through a channel and
//! wait for the acknowledgement, so appends never interleave and every task
//! learns whether its own row reached the disk.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::metadata::strip_punctuation;
use crate::{Result, StocktagError};

/// Ledger file name inside the output directory
pub const LEDGER_FILE: &str = "metadata_export.csv";

/// Column headers
pub const HEADER: [&str; 5] = ["Filename", "Title", "Keywords", "Category", "Releases"];

/// Pending appends buffered ahead of the writer
const QUEUE_DEPTH: usize = 64;

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub filename: String,
    pub title: String,
    pub keywords: String,
    pub category: String,
    pub releases: String,
}

impl LedgerRow {
    /// Row for a successfully renamed file. The title loses its punctuation.
    pub fn new(filename: &str, title: &str, keywords: &[String], category_code: &str) -> Self {
        Self {
            filename: filename.to_string(),
            title: strip_punctuation(title).trim().to_string(),
            keywords: keywords.join(", "),
            category: category_code.to_string(),
            releases: String::new(),
        }
    }

    fn fields(&self) -> [&str; 5] {
        [&self.filename, &self.title, &self.keywords, &self.category, &self.releases]
    }
}

/// Append `row` to the ledger at `path`, writing the header first when the
/// file is empty after opening it for append.
pub fn append_row(path: &Path, row: &LedgerRow) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let position = file.seek(SeekFrom::End(0))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    if position == 0 {
        writer.write_record(HEADER)?;
    }
    writer.write_record(row.fields())?;
    writer.flush()?;
    Ok(())
}

/// Read every data row back (header skipped)
pub fn read_rows(path: &Path) -> Result<Vec<LedgerRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(LedgerRow {
            filename: record.get(0).unwrap_or_default().to_string(),
            title: record.get(1).unwrap_or_default().to_string(),
            keywords: record.get(2).unwrap_or_default().to_string(),
            category: record.get(3).unwrap_or_default().to_string(),
            releases: record.get(4).unwrap_or_default().to_string(),
        });
    }
    Ok(rows)
}

struct AppendRequest {
    row: LedgerRow,
    ack: oneshot::Sender<Result<()>>,
}

/// Cloneable sender side of the ledger
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    tx: mpsc::Sender<AppendRequest>,
}

impl LedgerHandle {
    /// Queue a row and wait until it is written
    pub async fn append(&self, row: LedgerRow) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AppendRequest { row, ack })
            .await
            .map_err(|_| StocktagError::Persistence("ledger writer has stopped".to_string()))?;
        done.await
            .map_err(|_| StocktagError::Persistence("ledger writer dropped the row".to_string()))?
    }
}

/// The writer thread; finishes once every handle is dropped
pub struct LedgerWriter {
    join: JoinHandle<usize>,
}

impl LedgerWriter {
    /// Start the writer for `path`
    pub fn spawn(path: PathBuf) -> (LedgerHandle, LedgerWriter) {
        let (tx, mut rx) = mpsc::channel::<AppendRequest>(QUEUE_DEPTH);
        let join = tokio::task::spawn_blocking(move || {
            let mut written = 0;
            while let Some(request) = rx.blocking_recv() {
                let result = append_row(&path, &request.row)
                    .map_err(|e| StocktagError::Persistence(e.to_string()));
                match &result {
                    Ok(()) => {
                        written += 1;
                        debug!("Ledger row written for {}", request.row.filename);
                    }
                    Err(e) => error!("Ledger write for {} failed: {}", request.row.filename, e),
                }
                let _ = request.ack.send(result);
            }
            written
        });

        (LedgerHandle { tx }, LedgerWriter { join })
    }

    /// Wait for the writer to drain; returns the number of rows written
    pub async fn finish(self) -> Result<usize> {
        Ok(self.join.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> LedgerRow {
        LedgerRow::new(name, "A Red Car!", &["car".to_string(), "red".to_string()], "22")
    }

    fn header_count(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| *l == "Filename,Title,Keywords,Category,Releases")
            .count()
    }

    #[test]
    fn test_row_fields() {
        let row = row("20240501_A_Red_Car.jpg");
        assert_eq!(row.title, "A Red Car");
        assert_eq!(row.keywords, "car, red");
        assert_eq!(row.releases, "");
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        append_row(&path, &row("a.jpg")).unwrap();
        append_row(&path, &row("b.jpg")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Filename,Title,Keywords,Category,Releases\n\
             a.jpg,A Red Car,\"car, red\",22,\n\
             b.jpg,A Red Car,\"car, red\",22,\n"
        );
    }

    #[test]
    fn test_existing_ledger_gets_no_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        std::fs::write(&path, "Filename,Title,Keywords,Category,Releases\nold.jpg,Old,,,\n").unwrap();
        append_row(&path, &row("new.jpg")).unwrap();

        assert_eq!(header_count(&path), 1);
        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].filename, "new.jpg");
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        std::fs::write(&path, "").unwrap();
        append_row(&path, &row("a.jpg")).unwrap();
        assert_eq!(header_count(&path), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        let (handle, writer) = LedgerWriter::spawn(path.clone());

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    handle.append(row(&format!("w{}_{}.jpg", worker, i))).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(handle);

        assert_eq!(writer.finish().await.unwrap(), 200);
        assert_eq!(header_count(&path), 1);
        assert_eq!(read_rows(&path).unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_write_failure_reported_to_sender() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join(LEDGER_FILE);
        let (handle, writer) = LedgerWriter::spawn(path);

        let result = handle.append(row("a.jpg")).await;
        assert!(matches!(result, Err(StocktagError::Persistence(_))));
        drop(handle);
        assert_eq!(writer.finish().await.unwrap(), 0);
    }
}
