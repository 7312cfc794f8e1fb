use crate::error::ConfigError;
use crate::status::StatusTaxonomy;
use crate::transport::telegram::DEFAULT_API_BASE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub store: StoreConfig,
    pub taxonomy: StatusTaxonomy,
    pub messages: MessagesConfig,
    pub liveness: LivenessConfig,
    pub keepalive: KeepAliveConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Usually left empty and supplied through `BOT_TOKEN`.
    pub bot_token: Option<String>,
    pub api_base: String,
    pub poll_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
    /// Path to a service-account key file. `GOOGLE_SERVICE_KEY` (the JSON itself) wins.
    pub service_key_path: Option<String>,
    #[serde(skip)]
    pub service_key_json: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub welcome: String,
    pub access_button: String,
    pub onboarding: Vec<String>,
    pub denied_notice: String,
    /// `{status}` is replaced with the caller's status label.
    pub status_reply: String,
    pub new_member: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Public URL of this service. No probe runs when unset.
    pub url: Option<String>,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub max_concurrent_events: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout_seconds: 30,
            request_timeout_seconds: 5,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            worksheet: "СТИЛЬ".to_string(),
            service_key_path: None,
            service_key_json: None,
            request_timeout_seconds: 5,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            welcome: "Привет! Это БАЗА. Статус по умолчанию — «Наблюдатель».".to_string(),
            access_button: "Получить доступ".to_string(),
            onboarding: vec![
                "1/5. Всем новым — «Наблюдатель».".to_string(),
                "2/5. Писать могут: «Участник», «Партнёр», «Резидент».".to_string(),
                "3/5. Тарифы: Участник 2 000₽/мес; Партнёр 10 000₽/мес.".to_string(),
                "4/5. Напиши «Хочу доступ» — пришлём оплату и включим права.".to_string(),
                "5/5. Раз в неделю — дайджест мероприятий.".to_string(),
            ],
            denied_notice: "Пока статус «Наблюдатель», писать в чат нельзя.\n\
                            Нажми «Получить доступ» в /start — пришлю инструкцию."
                .to_string(),
            status_reply: "Текущий статус: {status}".to_string(),
            new_member: "Добро пожаловать в БАЗУ! Статус по умолчанию — «Наблюдатель». \
                         Нажми /start, чтобы узнать, как получить доступ."
                .to_string(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:10000".to_string(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_seconds: 60,
            timeout_seconds: 5,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_events: 32,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Secrets from the process environment take precedence over the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(token) = present("BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(id) = present("SHEET_ID") {
            self.store.spreadsheet_id = Some(id);
        }
        if let Some(key) = present("GOOGLE_SERVICE_KEY") {
            self.store.service_key_json = Some(key);
        }
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.telegram
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingBotToken)
    }

    pub fn spreadsheet_id(&self) -> Result<&str, ConfigError> {
        self.store
            .spreadsheet_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingSpreadsheetId)
    }

    /// Service-account key JSON, from the environment or the configured file.
    pub fn service_key(&self) -> Result<String, ConfigError> {
        if let Some(json) = &self.store.service_key_json {
            return Ok(json.clone());
        }
        match &self.store.service_key_path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| ConfigError::InvalidServiceKey(format!("{path}: {e}"))),
            None => Err(ConfigError::MissingServiceKey),
        }
    }

    pub fn liveness_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.liveness
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.liveness.bind.clone()))
    }

    /// Everything the daemon needs before it may serve events.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bot_token()?;
        self.spreadsheet_id()?;
        if self.store.worksheet.trim().is_empty() {
            return Err(ConfigError::MissingWorksheet);
        }
        if self.store.service_key_json.is_none() && self.store.service_key_path.is_none() {
            return Err(ConfigError::MissingServiceKey);
        }
        self.taxonomy.validate()?;
        if self.liveness.enabled {
            self.liveness_addr()?;
        }
        if let Some(url) = &self.keepalive.url {
            Url::parse(url).map_err(|_| ConfigError::InvalidKeepAliveUrl(url.clone()))?;
        }
        Ok(())
    }
}

impl MessagesConfig {
    pub fn status_reply(&self, label: &str) -> String {
        self.status_reply.replace("{status}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Tier;
    use std::collections::HashMap;

    fn complete() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = Some("123:abc".to_string());
        config.store.spreadsheet_id = Some("sheet".to_string());
        config.store.service_key_json = Some("{}".to_string());
        config
    }

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.store.worksheet, "СТИЛЬ");
        assert_eq!(parsed.keepalive.interval_seconds, 60);
        assert_eq!(parsed.messages.onboarding.len(), 5);
        assert_eq!(parsed.taxonomy.allowed.len(), 3);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str(
            "store:\n  spreadsheet_id: abc\nrouter:\n  max_concurrent_events: 4\n",
        )
        .unwrap();

        assert_eq!(parsed.store.spreadsheet_id.as_deref(), Some("abc"));
        assert_eq!(parsed.store.worksheet, "СТИЛЬ");
        assert_eq!(parsed.router.max_concurrent_events, 4);
        assert_eq!(parsed.liveness.bind, "0.0.0.0:10000");
    }

    #[test]
    fn test_taxonomy_from_yaml() {
        let parsed: Config = serde_yaml::from_str(
            r#"
taxonomy:
  version: 2
  tiers:
    - { tier: observer, label: Observer }
    - { tier: participant, label: Participant }
    - { tier: partner, label: Partner, aliases: [Associate] }
    - { tier: resident, label: Resident }
  allowed: [partner, resident]
"#,
        )
        .unwrap();

        assert!(parsed.taxonomy.validate().is_ok());
        assert_eq!(parsed.taxonomy.allowed, vec![Tier::Partner, Tier::Resident]);
        assert_eq!(
            parsed.taxonomy.normalize("associate").tier(),
            Some(Tier::Partner)
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BOT_TOKEN", "999:xyz"),
            ("SHEET_ID", "from-env"),
            ("GOOGLE_SERVICE_KEY", "{\"client_email\":\"x\"}"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.store.spreadsheet_id = Some("from-file".to_string());
        config.apply_env_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.bot_token().unwrap(), "999:xyz");
        assert_eq!(config.spreadsheet_id().unwrap(), "from-env");
        assert!(config.service_key().unwrap().contains("client_email"));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut config = Config::default();
        config.telegram.bot_token = Some("file-token".to_string());
        config.apply_env_from(|_| Some("  ".to_string()));
        assert_eq!(config.bot_token().unwrap(), "file-token");
    }

    #[test]
    fn test_validate() {
        assert!(complete().validate().is_ok());

        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::MissingBotToken)
        ));

        let mut config = complete();
        config.store.spreadsheet_id = Some(" ".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSpreadsheetId)
        ));

        let mut config = complete();
        config.store.service_key_json = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingServiceKey)
        ));

        let mut config = complete();
        config.liveness.bind = "not an address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBind(_))));

        let mut config = complete();
        config.keepalive.url = Some("::nope".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeepAliveUrl(_))
        ));

        let mut config = complete();
        config.taxonomy.version = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedTaxonomy { .. })
        ));
    }

    #[test]
    fn test_status_reply() {
        let config = Config::default();
        assert_eq!(config.messages.status_reply("Партнёр"), "Текущий статус: Партнёр");
    }
}
