//! Google Sheets backend
//!
//! Talks to the Sheets REST API (v4) with a service-account bearer token. Values are
//! written RAW so identities stay strings and timestamps are not reinterpreted.

use super::{Column, SheetBackend};
use crate::error::{ConfigError, StoreError};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The subset of a service-account key file needed for the JWT bearer flow.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidServiceKey(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

pub struct SheetsClient {
    client: Client,
    spreadsheet_id: String,
    worksheet: String,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    token: Mutex<Option<AccessToken>>,
}

impl SheetsClient {
    pub fn new(
        spreadsheet_id: &str,
        worksheet: &str,
        key: ServiceAccountKey,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ConfigError::InvalidServiceKey(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("member-gate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidServiceKey(e.to_string()))?;

        Ok(Self {
            client,
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheet: worksheet.to_string(),
            key,
            signing_key,
            token: Mutex::new(None),
        })
    }

    /// Cached bearer token, refreshed a minute before it expires.
    async fn bearer(&self) -> Result<String, StoreError> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if Instant::now() < current.refresh_at {
                return Ok(current.value.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| StoreError::Auth(e.to_string()))?;

        log::debug!("Requesting access token for {}", self.key.client_email);
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let response = check(response).await?;
        let granted: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let lifetime = Duration::from_secs(granted.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = granted.access_token;
        *token = Some(AccessToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    fn range(&self, a1: &str) -> String {
        sheet_range(&self.worksheet, a1)
    }

    async fn get_values(&self, a1: &str, major_dimension: &str) -> Result<ValueRange, StoreError> {
        let url = values_url(&self.spreadsheet_id, &self.range(a1), "")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("majorDimension", major_dimension)])
            .send()
            .await?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SheetBackend for SheetsClient {
    async fn column_values(&self, column: Column) -> Result<Vec<String>, StoreError> {
        let letter = column.letter();
        let range = self.get_values(&format!("{letter}:{letter}"), "COLUMNS").await?;
        Ok(range.values.into_iter().next().unwrap_or_default())
    }

    async fn row_values(&self, row: usize) -> Result<Vec<String>, StoreError> {
        let first = Column::ChatId.letter();
        let last = Column::UpdatedAt.letter();
        let range = self
            .get_values(&format!("{first}{row}:{last}{row}"), "ROWS")
            .await?;
        Ok(range.values.into_iter().next().unwrap_or_default())
    }

    async fn write_cells(&self, row: usize, cells: &[(Column, String)]) -> Result<(), StoreError> {
        let data: Vec<_> = cells
            .iter()
            .map(|(column, value)| {
                json!({
                    "range": self.range(&format!("{}{row}", column.letter())),
                    "values": [[value]],
                })
            })
            .collect();

        let url = values_url(&self.spreadsheet_id, "", ":batchUpdate")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.bearer().await?)
            .json(&json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn append_row(&self, values: &[String]) -> Result<Option<usize>, StoreError> {
        let url = values_url(&self.spreadsheet_id, &self.range("A:F"), ":append")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.bearer().await?)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [values] }))
            .send()
            .await?;
        let appended: AppendResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        // The row is written at this point; an unreadable range only costs a rescan later.
        match row_from_range(&appended.updates.updated_range) {
            Ok(row) => Ok(Some(row)),
            Err(e) => {
                log::warn!("{e}");
                Ok(None)
            }
        }
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        body,
    })
}

/// A1 range on a named worksheet. Names are always quoted; embedded quotes are doubled.
pub fn sheet_range(worksheet: &str, a1: &str) -> String {
    format!("'{}'!{}", worksheet.replace('\'', "''"), a1)
}

/// `values/{range}{suffix}` under the spreadsheet, with the range percent-encoded as one
/// path segment. An empty range addresses `values{suffix}` itself (batch endpoints).
pub fn values_url(spreadsheet_id: &str, range: &str, suffix: &str) -> Result<Url, StoreError> {
    let mut url = Url::parse(SHEETS_API).map_err(|e| StoreError::Decode(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| StoreError::Decode("Sheets API base cannot hold a path".to_string()))?;
        segments.push(spreadsheet_id);
        if range.is_empty() {
            segments.push(&format!("values{suffix}"));
        } else {
            segments.push("values").push(&format!("{range}{suffix}"));
        }
    }
    Ok(url)
}

lazy_static! {
    static ref RANGE_START_ROW: Option<Regex> = Regex::new(r"!\$?[A-Za-z]+\$?(\d+)").ok();
}

/// First row number of a range such as `'Sheet'!A7:F7`.
pub fn row_from_range(range: &str) -> Result<usize, StoreError> {
    RANGE_START_ROW
        .as_ref()
        .and_then(|pattern| pattern.captures(range))
        .and_then(|captures| captures.get(1))
        .and_then(|row| row.as_str().parse().ok())
        .ok_or_else(|| StoreError::MalformedRange(range.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_range_quoting() {
        assert_eq!(sheet_range("СТИЛЬ", "A:A"), "'СТИЛЬ'!A:A");
        assert_eq!(sheet_range("Bob's list", "A2:F2"), "'Bob''s list'!A2:F2");
    }

    #[test]
    fn test_values_url() {
        let url = values_url("abc123", "'Members'!A2:F2", "").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'Members'!A2:F2"
        );

        let url = values_url("abc123", "'Members'!A:F", ":append").unwrap();
        assert!(url.as_str().ends_with("/values/'Members'!A:F:append"));

        let url = values_url("abc123", "", ":batchUpdate").unwrap();
        assert!(url.as_str().ends_with("/abc123/values:batchUpdate"));
    }

    #[test]
    fn test_values_url_encodes_worksheet_name() {
        let url = values_url("id", &sheet_range("My Sheet", "A:A"), "").unwrap();
        assert!(url.as_str().contains("My%20Sheet"));
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn test_row_from_range() {
        assert_eq!(row_from_range("'СТИЛЬ'!A7:F7").unwrap(), 7);
        assert_eq!(row_from_range("Sheet1!A120:F120").unwrap(), 120);
        assert_eq!(row_from_range("Sheet1!$A$3:$F$3").unwrap(), 3);
        assert!(matches!(
            row_from_range("Sheet1"),
            Err(StoreError::MalformedRange(_))
        ));
    }

    #[test]
    fn test_service_key_parsing() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email":"bot@project.iam.gserviceaccount.com","private_key":"---"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);

        assert!(matches!(
            ServiceAccountKey::from_json("{}"),
            Err(ConfigError::InvalidServiceKey(_))
        ));
    }

    #[test]
    fn test_invalid_private_key_is_rejected() {
        let key = ServiceAccountKey {
            client_email: "bot@example.com".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };
        assert!(SheetsClient::new("id", "Sheet1", key, Duration::from_secs(5)).is_err());
    }
}
