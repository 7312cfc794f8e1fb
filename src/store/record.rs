use crate::status::{Status, StatusTaxonomy, Tier};
use chrono::NaiveDateTime;

/// Cell format of `created_at` / `updated_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Fixed worksheet layout, row 1 is the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ChatId,
    Username,
    FullName,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::ChatId,
        Column::Username,
        Column::FullName,
        Column::Status,
        Column::CreatedAt,
        Column::UpdatedAt,
    ];

    pub fn index(self) -> usize {
        match self {
            Column::ChatId => 0,
            Column::Username => 1,
            Column::FullName => 2,
            Column::Status => 3,
            Column::CreatedAt => 4,
            Column::UpdatedAt => 5,
        }
    }

    pub fn letter(self) -> char {
        (b'A' + self.index() as u8) as char
    }

    /// Header cell text in row 1.
    pub fn header(self) -> &'static str {
        match self {
            Column::ChatId => "chat_id",
            Column::Username => "username",
            Column::FullName => "full_name",
            Column::Status => "status",
            Column::CreatedAt => "created_at",
            Column::UpdatedAt => "updated_at",
        }
    }
}

pub fn header_row() -> Vec<String> {
    Column::ALL.iter().map(|c| c.header().to_string()).collect()
}

/// What an inbound event tells us about a chat identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub chat_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_bot: bool,
}

impl Profile {
    pub fn new(chat_id: impl ToString) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub chat_id: String,
    pub username: String,
    pub full_name: String,
    pub status: Status,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRecord {
    /// A first-seen identity. Status always starts at the baseline tier.
    pub fn first_seen(profile: &Profile, at: NaiveDateTime) -> Self {
        let stamp = format_timestamp(at);
        Self {
            chat_id: profile.chat_id.trim().to_string(),
            username: profile.username.trim().to_string(),
            full_name: profile.full_name(),
            status: Status::OBSERVER,
            created_at: stamp.clone(),
            updated_at: stamp,
        }
    }

    pub fn from_cells(cells: &[String], taxonomy: &StatusTaxonomy) -> Self {
        Self {
            chat_id: cell(cells, Column::ChatId).to_string(),
            username: cell(cells, Column::Username).to_string(),
            full_name: cell(cells, Column::FullName).to_string(),
            status: taxonomy.normalize(cell(cells, Column::Status)),
            created_at: cell(cells, Column::CreatedAt).to_string(),
            updated_at: cell(cells, Column::UpdatedAt).to_string(),
        }
    }

    /// Row values in column order. Known tiers are written with their configured label.
    pub fn to_cells(&self, taxonomy: &StatusTaxonomy) -> Vec<String> {
        let status = match &self.status {
            Status::Known(tier) => taxonomy.label(*tier).to_string(),
            Status::Unrecognized(raw) => raw.clone(),
        };
        vec![
            self.chat_id.clone(),
            self.username.clone(),
            self.full_name.clone(),
            status,
            self.created_at.clone(),
            self.updated_at.clone(),
        ]
    }

    pub fn tier(&self) -> Option<Tier> {
        self.status.tier()
    }
}

/// Trimmed cell value; missing trailing cells read as empty.
pub fn cell(cells: &[String], column: Column) -> &str {
    cells
        .get(column.index())
        .map(|value| value.trim())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, 42)
            .unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(at(9, 5)), "2025-03-14 09:05");
    }

    #[test]
    fn test_header_row_matches_columns() {
        assert_eq!(
            header_row(),
            vec!["chat_id", "username", "full_name", "status", "created_at", "updated_at"]
        );
        assert_eq!(Column::UpdatedAt.letter(), 'F');
    }

    #[test]
    fn test_full_name() {
        let mut profile = Profile::new(7);
        assert_eq!(profile.full_name(), "");

        profile.first_name = "Анна".to_string();
        assert_eq!(profile.full_name(), "Анна");

        profile.last_name = "Петрова".to_string();
        assert_eq!(profile.full_name(), "Анна Петрова");
    }

    #[test]
    fn test_short_rows_read_as_blank() {
        let taxonomy = StatusTaxonomy::default();
        let cells = vec!["555".to_string(), "anna".to_string()];
        let record = UserRecord::from_cells(&cells, &taxonomy);

        assert_eq!(record.chat_id, "555");
        assert_eq!(record.full_name, "");
        assert_eq!(record.status, Status::OBSERVER);
        assert_eq!(record.created_at, "");
    }

    #[test]
    fn test_first_seen_cells() {
        let taxonomy = StatusTaxonomy::default();
        let record = UserRecord::first_seen(&Profile::new(555), at(10, 0));

        assert_eq!(
            record.to_cells(&taxonomy),
            vec!["555", "", "", "Наблюдатель", "2025-03-14 10:00", "2025-03-14 10:00"]
        );
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(Column::ChatId.letter(), 'A');
        assert_eq!(Column::Status.letter(), 'D');
        assert_eq!(Column::UpdatedAt.letter(), 'F');
    }
}
