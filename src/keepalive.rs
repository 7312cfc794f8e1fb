use reqwest::Client;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Periodic self-request that keeps an idle-suspending host awake.
#[derive(Debug, Clone)]
pub struct KeepAliveProbe {
    client: Client,
    url: String,
    every: Duration,
}

impl KeepAliveProbe {
    pub fn new(url: &str, every: Duration, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("member-gate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            every,
        })
    }

    /// One probe. Failures are reported only at debug level.
    pub async fn probe_once(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log::debug!("Keep-alive {} answered {}", self.url, response.status());
                false
            }
            Err(e) => {
                log::debug!("Keep-alive {} failed: {e}", self.url);
                false
            }
        }
    }

    /// Probes forever. Shares nothing with event handling.
    pub async fn run(self) {
        log::info!("Keep-alive probing {} every {:?}", self.url, self.every);
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the server has time to bind.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.probe_once().await;
        }
    }
}
