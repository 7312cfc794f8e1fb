use crate::config::Config;
use crate::keepalive::KeepAliveProbe;
use crate::liveness;
use crate::router::EventRouter;
use crate::store::sheets::ServiceAccountKey;
use crate::store::{SheetsClient, StatusStore};
use crate::transport::updates::translate;
use crate::transport::TelegramClient;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Bot {
    config: Config,
    telegram: Arc<TelegramClient>,
    router: Arc<EventRouter>,
}

/// Store backed by the configured worksheet.
pub fn connect_store(config: &Config) -> anyhow::Result<Arc<StatusStore>> {
    let key = ServiceAccountKey::from_json(&config.service_key()?)?;
    let sheets = SheetsClient::new(
        config.spreadsheet_id()?,
        &config.store.worksheet,
        key,
        Duration::from_secs(config.store.request_timeout_seconds),
    )?;
    Ok(Arc::new(StatusStore::new(
        Arc::new(sheets),
        config.taxonomy.clone(),
    )))
}

pub fn connect_telegram(config: &Config) -> anyhow::Result<TelegramClient> {
    let client = TelegramClient::new(
        &config.telegram.api_base,
        config.bot_token()?,
        Duration::from_secs(config.telegram.request_timeout_seconds),
    )
    .context("Failed to build Telegram client")?;
    Ok(client)
}

impl Bot {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let store = connect_store(&config)?;
        let telegram = Arc::new(connect_telegram(&config)?);
        let router = Arc::new(EventRouter::from_config(
            store,
            telegram.clone(),
            &config,
        ));
        Ok(Bot {
            config,
            telegram,
            router,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let me = self
            .telegram
            .get_me()
            .await
            .context("Telegram rejected the bot token")?;
        log::info!(
            "Authorized as @{} ({})",
            me.username.as_deref().unwrap_or_default(),
            me.id
        );

        if self.config.liveness.enabled {
            let addr = self.config.liveness_addr()?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind liveness endpoint on {addr}"))?;
            tokio::spawn(async move {
                if let Err(e) = liveness::serve(listener).await {
                    log::error!("Liveness endpoint stopped: {e}");
                }
            });
        }

        match &self.config.keepalive.url {
            Some(url) => {
                let probe = KeepAliveProbe::new(
                    url,
                    Duration::from_secs(self.config.keepalive.interval_seconds),
                    Duration::from_secs(self.config.keepalive.timeout_seconds),
                )?;
                tokio::spawn(probe.run());
            }
            None => log::info!("No keep-alive URL configured, self-probing disabled"),
        }

        log::info!("Polling for updates");
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Received shutdown signal, stopping");
                    break;
                }
                polled = self.telegram.get_updates(offset, self.config.telegram.poll_timeout_seconds) => {
                    match polled {
                        Ok(updates) => {
                            for update in updates {
                                offset = Some(update.update_id + 1);
                                if let Some(event) = translate(update) {
                                    log::debug!("Dispatching {} event", event.kind());
                                    self.router.dispatch(event);
                                }
                            }
                        }
                        Err(e) => {
                            log::error!("Failed to fetch updates: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
