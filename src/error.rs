/// Failures talking to the tabular store. Never retried: a write whose outcome is
/// unknown may already have landed, and replaying an append would duplicate the row.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Store API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Could not decode store response: {0}")]
    Decode(String),
    #[error("Store authentication failed: {0}")]
    Auth(String),
    #[error("Malformed range in store response: {0}")]
    MalformedRange(String),
}

/// Failures of outbound chat actions. These are logged and swallowed by every flow
/// that performs them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Chat API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("Could not decode chat API response: {0}")]
    Decode(String),
}

impl TransportError {
    /// The message a delete targeted no longer exists.
    pub fn is_message_gone(&self) -> bool {
        match self {
            TransportError::Api { description, .. } => {
                let description = description.to_lowercase();
                description.contains("message to delete not found")
                    || description.contains("message not found")
            }
            _ => false,
        }
    }

    /// The user has not opened a private chat with the bot, or has blocked it.
    pub fn is_unreachable_user(&self) -> bool {
        match self {
            TransportError::Api { code, description } => {
                *code == 403
                    || description.contains("bot was blocked")
                    || description.contains("chat not found")
            }
            _ => false,
        }
    }
}

/// Startup configuration problems. Fatal: the process exits before serving events.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Telegram bot token is not configured (set telegram.bot_token or BOT_TOKEN)")]
    MissingBotToken,
    #[error("Spreadsheet id is not configured (set store.spreadsheet_id or SHEET_ID)")]
    MissingSpreadsheetId,
    #[error("Worksheet name is empty")]
    MissingWorksheet,
    #[error("Service account key is not configured (set store.service_key_path or GOOGLE_SERVICE_KEY)")]
    MissingServiceKey,
    #[error("Invalid service account key: {0}")]
    InvalidServiceKey(String),
    #[error("Unsupported status taxonomy version {found} (expected {expected})")]
    UnsupportedTaxonomy { found: u32, expected: u32 },
    #[error("Status taxonomy has no label for {0}")]
    MissingTierLabel(String),
    #[error("The baseline tier cannot be allowed to post")]
    ObserverAllowed,
    #[error("Invalid liveness bind address '{0}'")]
    InvalidBind(String),
    #[error("Invalid keep-alive URL '{0}'")]
    InvalidKeepAliveUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_gone_detection() {
        let gone = TransportError::Api {
            code: 400,
            description: "Bad Request: message to delete not found".to_string(),
        };
        assert!(gone.is_message_gone());

        let forbidden = TransportError::Api {
            code: 400,
            description: "Bad Request: message can't be deleted".to_string(),
        };
        assert!(!forbidden.is_message_gone());
        assert!(!TransportError::Decode("x".to_string()).is_message_gone());
    }

    #[test]
    fn test_unreachable_user_detection() {
        let blocked = TransportError::Api {
            code: 403,
            description: "Forbidden: bot was blocked by the user".to_string(),
        };
        assert!(blocked.is_unreachable_user());
        assert!(!TransportError::Decode("x".to_string()).is_unreachable_user());
    }
}
