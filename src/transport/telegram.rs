use super::updates::{Update, User};
use super::{ChatTransport, InlineKeyboard};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// Bot API client. Every call carries its own timeout; long polls extend it by the
/// poll duration.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("member-gate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            timeout,
        })
    }

    /// Identity check of the configured token.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", json!({}), self.timeout).await
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_seconds: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let mut body = json!({
            "timeout": poll_seconds,
            "allowed_updates": ["message", "callback_query", "chat_member"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call(
            "getUpdates",
            body,
            self.timeout + Duration::from_secs(poll_seconds),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("{method}: {e}")))?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api {
                code: parsed.error_code.unwrap_or(status.as_u16() as i64),
                description: parsed
                    .description
                    .unwrap_or_else(|| format!("{method} failed")),
            }),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = json!(keyboard);
        }
        self.call::<Value>("sendMessage", body, self.timeout).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), TransportError> {
        self.call::<bool>(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
            self.timeout,
        )
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.call::<bool>(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
            self.timeout,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let parsed: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message to delete not found"}"#,
        )
        .unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error_code, Some(400));
        assert!(parsed.result.is_none());
    }

    #[test]
    fn test_base_url() {
        let client =
            TelegramClient::new("https://api.telegram.org/", "123:abc", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:abc");
    }

    #[test]
    fn test_keyboard_serialization() {
        let keyboard = InlineKeyboard::single("Получить доступ", "get_access");
        assert_eq!(
            json!(keyboard),
            json!({"inline_keyboard": [[{"text": "Получить доступ", "callback_data": "get_access"}]]})
        );
    }
}
