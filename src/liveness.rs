use axum::{routing::get, Router};
use tokio::net::TcpListener;

pub const ALIVE: &str = "Bot is alive";

async fn alive() -> &'static str {
    ALIVE
}

pub fn router() -> Router {
    Router::new().route("/", get(alive))
}

/// Serves `GET /` until the process exits.
pub async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Liveness endpoint listening on http://{addr}/");
    }
    axum::serve(listener, router()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keepalive::KeepAliveProbe;
    use std::time::Duration;

    async fn spawn_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener));
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_root_answers_alive() {
        let url = spawn_server().await;

        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), ALIVE);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let url = spawn_server().await;

        let response = reqwest::get(format!("{url}metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_keepalive_probe_succeeds() {
        let url = spawn_server().await;

        let probe =
            KeepAliveProbe::new(&url, Duration::from_secs(60), Duration::from_secs(5)).unwrap();
        assert!(probe.probe_once().await);
    }
}
