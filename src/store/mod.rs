//! Status store
//!
//! Typed access to the membership worksheet. The worksheet has no index, no uniqueness
//! constraint and no transactions, so this layer keeps an in-process identity → row index
//! (the worksheet stays the source of truth) and serializes every mutation per identity.
//! Two concurrent upserts for an unseen identity would otherwise both observe "absent"
//! and both append.

pub mod memory;
pub mod record;
pub mod sheets;

pub use memory::MemorySheet;
pub use record::{Column, Profile, UserRecord};
pub use sheets::SheetsClient;

use crate::error::StoreError;
use crate::locks::IdentityLocks;
use crate::status::{Status, StatusTaxonomy};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use record::{cell, format_timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Row/column access to the backing worksheet. Rows are 1-based; row 1 normally holds the header.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Every value of one column from row 1 down. Blank cells read as empty strings.
    async fn column_values(&self, column: Column) -> Result<Vec<String>, StoreError>;

    /// Cells A..F of one row. Trailing blank cells may be missing.
    async fn row_values(&self, row: usize) -> Result<Vec<String>, StoreError>;

    async fn write_cells(&self, row: usize, cells: &[(Column, String)]) -> Result<(), StoreError>;

    /// Appends a row below the last one. Returns the row number when the backend reports it.
    async fn append_row(&self, values: &[String]) -> Result<Option<usize>, StoreError>;
}

/// Position of a record in the worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocator(pub usize);

impl RowLocator {
    pub fn row(self) -> usize {
        self.0
    }
}

pub struct StatusStore {
    backend: Arc<dyn SheetBackend>,
    taxonomy: StatusTaxonomy,
    index: RwLock<HashMap<String, usize>>,
    writes: IdentityLocks,
    header_present: AtomicBool,
}

impl StatusStore {
    pub fn new(backend: Arc<dyn SheetBackend>, taxonomy: StatusTaxonomy) -> Self {
        Self {
            backend,
            taxonomy,
            index: RwLock::new(HashMap::new()),
            writes: IdentityLocks::new(),
            header_present: AtomicBool::new(false),
        }
    }

    pub fn taxonomy(&self) -> &StatusTaxonomy {
        &self.taxonomy
    }

    pub async fn lookup(&self, chat_id: &str) -> Result<Option<RowLocator>, StoreError> {
        Ok(self
            .locate(chat_id.trim())
            .await?
            .map(|(row, _)| RowLocator(row)))
    }

    pub async fn get_record(&self, chat_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .locate(chat_id.trim())
            .await?
            .map(|(_, cells)| UserRecord::from_cells(&cells, &self.taxonomy)))
    }

    /// Normalized status; Observer when there is no record or the cell is blank.
    pub async fn get_status(&self, chat_id: &str) -> Result<Status, StoreError> {
        Ok(self
            .get_record(chat_id)
            .await?
            .map(|record| record.status)
            .unwrap_or_default())
    }

    pub async fn upsert(&self, profile: &Profile) -> Result<UserRecord, StoreError> {
        self.upsert_at(profile, Local::now().naive_local()).await
    }

    /// Insert-if-absent-else-update. Existing rows get fresh metadata and `updated_at`;
    /// the status cell is never written and `created_at` only when it is blank.
    pub async fn upsert_at(
        &self,
        profile: &Profile,
        now: NaiveDateTime,
    ) -> Result<UserRecord, StoreError> {
        let chat_id = profile.chat_id.trim();
        let _guard = self.writes.lock(chat_id).await;

        match self.locate(chat_id).await? {
            Some((row, cells)) => {
                let stamp = format_timestamp(now);
                let mut record = UserRecord::from_cells(&cells, &self.taxonomy);
                record.username = profile.username.trim().to_string();
                record.full_name = profile.full_name();
                record.updated_at = stamp.clone();

                let mut updates = vec![
                    (Column::Username, record.username.clone()),
                    (Column::FullName, record.full_name.clone()),
                    (Column::UpdatedAt, stamp.clone()),
                ];
                if record.created_at.is_empty() {
                    record.created_at = stamp.clone();
                    updates.push((Column::CreatedAt, stamp));
                }

                self.backend.write_cells(row, &updates).await?;
                log::debug!("Updated record for {chat_id} at row {row}");
                Ok(record)
            }
            None => {
                self.ensure_header().await?;
                let record = UserRecord::first_seen(profile, now);
                let row = self
                    .backend
                    .append_row(&record.to_cells(&self.taxonomy))
                    .await?;

                match row {
                    Some(row) => {
                        self.index.write().await.insert(record.chat_id.clone(), row);
                        log::info!("Created record for {chat_id} at row {row}");
                    }
                    None => log::info!("Created record for {chat_id}"),
                }
                Ok(record)
            }
        }
    }

    /// Header row, for connectivity diagnostics.
    pub async fn header(&self) -> Result<Vec<String>, StoreError> {
        self.backend.row_values(1).await
    }

    /// Writes the header into row 1 when the worksheet starts out blank, so the first
    /// record lands on row 2.
    async fn ensure_header(&self) -> Result<(), StoreError> {
        if self.header_present.load(Ordering::Acquire) {
            return Ok(());
        }
        let first = self.backend.row_values(1).await?;
        if first.iter().all(|value| value.trim().is_empty()) {
            log::warn!("Worksheet has no header row, writing one");
            let header: Vec<_> = Column::ALL
                .iter()
                .map(|column| (*column, column.header().to_string()))
                .collect();
            self.backend.write_cells(1, &header).await?;
        }
        self.header_present.store(true, Ordering::Release);
        Ok(())
    }

    /// Forget every cached row position. The next lookup rescans.
    pub async fn invalidate(&self) {
        self.index.write().await.clear();
    }

    pub async fn indexed(&self) -> usize {
        self.index.read().await.len()
    }

    /// Row and cells for an identity. A cached position is trusted only after the row
    /// is re-read and still carries the same identity.
    async fn locate(&self, chat_id: &str) -> Result<Option<(usize, Vec<String>)>, StoreError> {
        if chat_id.is_empty() {
            return Ok(None);
        }

        let cached = self.index.read().await.get(chat_id).copied();
        if let Some(row) = cached {
            let cells = self.backend.row_values(row).await?;
            if cell(&cells, Column::ChatId) == chat_id {
                return Ok(Some((row, cells)));
            }
            log::warn!("Index entry for {chat_id} points at row {row} which no longer holds it");
        }

        match self.rescan(chat_id).await? {
            Some(row) => {
                let cells = self.backend.row_values(row).await?;
                Ok(Some((row, cells)))
            }
            None => Ok(None),
        }
    }

    /// Full scan of the identity column. Rebuilds the whole index and returns the row
    /// for `chat_id`. Duplicate identities resolve to the first row.
    async fn rescan(&self, chat_id: &str) -> Result<Option<usize>, StoreError> {
        let ids = self.backend.column_values(Column::ChatId).await?;

        let mut index = HashMap::with_capacity(ids.len());
        for (offset, value) in ids.iter().enumerate() {
            let id = value.trim();
            // Row 1 is data unless it carries the header.
            if id.is_empty() || (offset == 0 && id == Column::ChatId.header()) {
                continue;
            }
            let row = offset + 1;
            if let Some(first) = index.get(id) {
                log::warn!("Duplicate records for {id}: rows {first} and {row}, using row {first}");
                continue;
            }
            index.insert(id.to_string(), row);
        }

        log::debug!("Indexed {} records from the worksheet", index.len());
        let found = index.get(chat_id).copied();
        *self.index.write().await = index;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Tier;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn store_with(sheet: Arc<MemorySheet>) -> StatusStore {
        StatusStore::new(sheet, StatusTaxonomy::default())
    }

    #[tokio::test]
    async fn test_sequential_upserts_keep_one_record() {
        let sheet = Arc::new(MemorySheet::new());
        let store = store_with(sheet.clone());
        let mut profile = Profile::new(555);

        store.upsert_at(&profile, at(10, 0)).await.unwrap();
        profile.username = "anna".to_string();
        let record = store.upsert_at(&profile, at(11, 30)).await.unwrap();

        assert_eq!(sheet.count_records("555"), 1);
        assert_eq!(record.created_at, "2025-06-01 10:00");
        assert_eq!(record.updated_at, "2025-06-01 11:30");

        let stored = store.get_record("555").await.unwrap().unwrap();
        assert_eq!(stored, record);
        assert_eq!(stored.username, "anna");
    }

    #[tokio::test]
    async fn test_missing_record_is_observer() {
        let store = store_with(Arc::new(MemorySheet::new()));
        assert_eq!(store.get_status("404").await.unwrap(), Status::OBSERVER);
        assert_eq!(store.lookup("404").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_status_cell_is_observer() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.push_row(&["10", "a", "", "", "", ""]);
        sheet.push_row(&["11", "b", "", "   ", "", ""]);
        let store = store_with(sheet);

        assert_eq!(store.get_status("10").await.unwrap(), Status::OBSERVER);
        assert_eq!(store.get_status("11").await.unwrap(), Status::OBSERVER);
    }

    #[tokio::test]
    async fn test_upsert_never_touches_status() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.push_row(&["77", "old", "Old Name", "Партнер", "2024-01-01 00:00", "2024-01-01 00:00"]);
        let store = store_with(sheet.clone());

        let mut profile = Profile::new(77);
        profile.first_name = "New".to_string();
        let record = store.upsert_at(&profile, at(9, 0)).await.unwrap();

        assert_eq!(record.status, Status::Known(Tier::Partner));
        assert_eq!(record.created_at, "2024-01-01 00:00");
        assert_eq!(sheet.cell(2, Column::Status), "Партнер");
        assert_eq!(sheet.cell(2, Column::FullName), "New");
        assert_eq!(sheet.cell(2, Column::UpdatedAt), "2025-06-01 09:00");
    }

    #[tokio::test]
    async fn test_blank_created_at_is_backfilled() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.push_row(&["12", "", "", "Участник"]);
        let store = store_with(sheet.clone());

        store.upsert_at(&Profile::new(12), at(8, 15)).await.unwrap();
        assert_eq!(sheet.cell(2, Column::CreatedAt), "2025-06-01 08:15");
        assert_eq!(sheet.cell(2, Column::Status), "Участник");
    }

    #[tokio::test]
    async fn test_lookup_skips_header_and_trims() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.push_row(&[" 31 ", "", "", "Резидент"]);
        let store = store_with(sheet);

        assert_eq!(store.lookup("chat_id").await.unwrap(), None);
        assert_eq!(store.lookup("31").await.unwrap(), Some(RowLocator(2)));
        assert_eq!(
            store.get_status("31").await.unwrap(),
            Status::Known(Tier::Resident)
        );
    }

    #[tokio::test]
    async fn test_stale_index_entry_is_rebuilt() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.push_row(&["1", "", "", "Участник"]);
        sheet.push_row(&["2", "", "", ""]);
        let store = store_with(sheet.clone());

        assert_eq!(store.lookup("2").await.unwrap(), Some(RowLocator(3)));

        // Someone sorts the worksheet by hand.
        sheet.swap_rows(2, 3);
        assert_eq!(store.lookup("2").await.unwrap(), Some(RowLocator(2)));
        assert_eq!(
            store.get_status("1").await.unwrap(),
            Status::Known(Tier::Participant)
        );
    }

    #[tokio::test]
    async fn test_rows_added_outside_the_process_are_found() {
        let sheet = Arc::new(MemorySheet::new());
        let store = store_with(sheet.clone());
        store.upsert_at(&Profile::new(1), at(7, 0)).await.unwrap();

        sheet.push_row(&["2", "", "", "Резидент"]);
        assert_eq!(
            store.get_status("2").await.unwrap(),
            Status::Known(Tier::Resident)
        );
        assert_eq!(store.indexed().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rows_resolve_to_first() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.push_row(&["5", "", "", "Резидент"]);
        sheet.push_row(&["5", "", "", ""]);
        let store = store_with(sheet);

        assert_eq!(store.lookup("5").await.unwrap(), Some(RowLocator(2)));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_for_unseen_identity() {
        let sheet = Arc::new(MemorySheet::new().with_latency(Duration::from_millis(5)));
        let store = Arc::new(store_with(sheet.clone()));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert(&Profile::new(900)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(sheet.count_records("900"), 1);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let sheet = Arc::new(MemorySheet::new());
        let store = store_with(sheet.clone());
        sheet.set_available(false);

        assert!(store.upsert(&Profile::new(3)).await.is_err());
        assert!(store.get_status("3").await.is_err());

        sheet.set_available(true);
        assert_eq!(sheet.count_records("3"), 0);
        store.upsert(&Profile::new(3)).await.unwrap();
        assert_eq!(sheet.count_records("3"), 1);
    }

    #[tokio::test]
    async fn test_blank_worksheet_gets_header_before_first_record() {
        let sheet = Arc::new(MemorySheet::empty());
        let store = store_with(sheet.clone());
        store.upsert_at(&Profile::new(555), at(10, 0)).await.unwrap();

        assert_eq!(sheet.cell(1, Column::ChatId), "chat_id");
        assert_eq!(sheet.cell(2, Column::ChatId), "555");

        // A restarted process starts with an empty index.
        let restarted = store_with(sheet.clone());
        assert_eq!(restarted.lookup("555").await.unwrap(), Some(RowLocator(2)));
        restarted.upsert_at(&Profile::new(555), at(11, 0)).await.unwrap();
        assert_eq!(sheet.count_records("555"), 1);
    }

    #[tokio::test]
    async fn test_record_in_first_row_is_found() {
        let sheet = Arc::new(MemorySheet::empty());
        sheet.push_row(&["42", "", "", "Участник"]);
        let store = store_with(sheet.clone());

        assert_eq!(store.lookup("42").await.unwrap(), Some(RowLocator(1)));
        assert_eq!(
            store.get_status("42").await.unwrap(),
            Status::Known(Tier::Participant)
        );
        store.upsert(&Profile::new(42)).await.unwrap();
        assert_eq!(sheet.count_records("42"), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rescan() {
        let sheet = Arc::new(MemorySheet::new());
        let store = store_with(sheet);
        store.upsert_at(&Profile::new(8), at(6, 0)).await.unwrap();
        assert_eq!(store.indexed().await, 1);

        store.invalidate().await;
        assert_eq!(store.indexed().await, 0);
        assert_eq!(store.lookup("8").await.unwrap(), Some(RowLocator(2)));
    }
}
