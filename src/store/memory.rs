use super::record::header_row;
use super::{Column, SheetBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// In-process worksheet with the same row semantics as the real one: no uniqueness,
/// appends always land below the last row. Used by tests and `--demo`.
///
/// `with_latency` widens the window between a read and the write that follows it, which
/// is where duplicate appends happen without per-identity serialization.
#[derive(Debug)]
pub struct MemorySheet {
    rows: Mutex<Vec<Vec<String>>>,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::with_rows(vec![header_row()])
    }

    /// A worksheet with nothing in it, not even the header.
    pub fn empty() -> Self {
        Self::with_rows(Vec::new())
    }

    fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While unavailable every backend call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Appends a row directly, as an administrator editing the sheet would.
    pub fn push_row(&self, values: &[&str]) {
        self.rows()
            .push(values.iter().map(|v| v.to_string()).collect());
    }

    /// Overwrites one cell directly, as an administrator editing the sheet would.
    pub fn set_cell(&self, row: usize, column: Column, value: &str) {
        let mut rows = self.rows();
        if row > rows.len() {
            rows.resize(row, Vec::new());
        }
        if let Some(cells) = row.checked_sub(1).and_then(|i| rows.get_mut(i)) {
            if cells.len() <= column.index() {
                cells.resize(column.index() + 1, String::new());
            }
            cells[column.index()] = value.to_string();
        }
    }

    pub fn cell(&self, row: usize, column: Column) -> String {
        self.rows()
            .get(row.saturating_sub(1))
            .and_then(|cells| cells.get(column.index()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn swap_rows(&self, a: usize, b: usize) {
        self.rows().swap(a - 1, b - 1);
    }

    /// Number of rows carrying this identity, the first row included.
    pub fn count_records(&self, chat_id: &str) -> usize {
        self.rows()
            .iter()
            .filter(|cells| cells.first().map(|id| id.trim()) == Some(chat_id))
            .count()
    }

    pub fn record_rows(&self) -> usize {
        self.rows().len().saturating_sub(1)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<Vec<String>>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Api {
                status: 503,
                body: "worksheet is offline".to_string(),
            })
        }
    }
}

impl Default for MemorySheet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetBackend for MemorySheet {
    async fn column_values(&self, column: Column) -> Result<Vec<String>, StoreError> {
        self.round_trip().await?;
        Ok(self
            .rows()
            .iter()
            .map(|cells| cells.get(column.index()).cloned().unwrap_or_default())
            .collect())
    }

    async fn row_values(&self, row: usize) -> Result<Vec<String>, StoreError> {
        self.round_trip().await?;
        Ok(self
            .rows()
            .get(row.saturating_sub(1))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_cells(&self, row: usize, cells: &[(Column, String)]) -> Result<(), StoreError> {
        self.round_trip().await?;
        for (column, value) in cells {
            self.set_cell(row, *column, value);
        }
        Ok(())
    }

    async fn append_row(&self, values: &[String]) -> Result<Option<usize>, StoreError> {
        self.round_trip().await?;
        let mut rows = self.rows();
        rows.push(values.to_vec());
        Ok(Some(rows.len()))
    }
}
