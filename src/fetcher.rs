use crate::config::PokemonConfig;
use crate::error::AppError;
use crate::pokemon::{PokemonDetail, PokemonListResponse, PokemonRecord};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Client for the remote Pokémon catalog.
#[derive(Clone)]
pub struct PokemonClient {
    http: reqwest::Client,
    config: PokemonConfig,
}

impl PokemonClient {
    pub fn new(config: PokemonConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                AppError::ConfigError(format!("HTTP client: {}", e))
            })?;

        tracing::info!(
            "Catalog client ready for {} (timeout: {}ms, concurrency: {})",
            config.api_url,
            config.timeout_ms,
            config.max_concurrent_requests
        );
        Ok(Self { http, config })
    }

    /// Fetches up to `limit` Pokémon, preserving the list endpoint's order.
    ///
    /// Detail requests run concurrently, bounded by `max_concurrent_requests`.
    /// Any failed detail request fails the whole catalog and aborts the rest.
    pub async fn fetch_catalog(&self, limit: u32) -> Result<Vec<PokemonRecord>, AppError> {
        let url = format!("{}/pokemon?limit={}", self.base_url(), limit);
        let list: PokemonListResponse = self.get_json(&url).await?;

        let entries: Vec<_> = list.results.into_iter().take(limit as usize).collect();
        let count = entries.len();
        tracing::debug!("Catalog list returned {} entries, fetching details", count);

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let mut tasks = JoinSet::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let client = self.clone();
            let permits = Arc::clone(&permits);
            let detail_url = if entry.url.is_empty() {
                format!("{}/pokemon/{}", self.base_url(), entry.name)
            } else {
                entry.url
            };
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::NetworkError(format!("request limiter closed: {}", e)))?;
                client.fetch_detail(&detail_url).await.map(|record| (index, record))
            });
        }

        // Each task owns one slot, so order survives out-of-order completion.
        let mut slots: Vec<Option<PokemonRecord>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, record))) => slots[index] = Some(record),
                Ok(Err(e)) => {
                    tracing::error!("Catalog fetch aborted: {}", e);
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Detail task failed: {}", e);
                    tasks.abort_all();
                    return Err(AppError::NetworkError(format!("detail task failed: {}", e)));
                }
            }
        }

        let records: Vec<PokemonRecord> = slots.into_iter().flatten().collect();
        tracing::info!("Fetched {} Pokémon", records.len());
        Ok(records)
    }

    pub async fn fetch_detail(&self, url: &str) -> Result<PokemonRecord, AppError> {
        let detail: PokemonDetail = self.get_json(url).await?;
        if detail.id == 0 {
            let error_msg = format!("detail at {} has a non-positive id", url);
            tracing::error!("{}", error_msg);
            return Err(AppError::DecodeError(error_msg));
        }

        let sprite_url = self.config.sprite_url(detail.id);
        let record = PokemonRecord::from_detail(detail, sprite_url);
        tracing::debug!("Fetched Pokémon: {} (ID: {})", record.name, record.id);
        Ok(record)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        tracing::debug!("GET {}", url);

        let response = self.http.get(url).send().await.map_err(|e| {
            tracing::error!("Failed to make HTTP request to {}: {}", url, e);
            AppError::from(e)
        })?;

        if !response.status().is_success() {
            let error_msg = format!("{} returned status: {}", url, response.status());
            tracing::error!("{}", error_msg);
            return Err(AppError::NetworkError(error_msg));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!("Failed to read response body from {}: {}", url, e);
            AppError::from(e)
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!("Failed to parse JSON response from {}: {}", url, e);
            AppError::DecodeError(format!("{}: {}", url, e))
        })
    }

    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn client_for(api_url: &str) -> PokemonClient {
        let mut config = Config::embedded().unwrap().pokemon;
        config.api_url = api_url.to_string();
        PokemonClient::new(config).unwrap()
    }

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let client = client_for("http://localhost:9/api/v2/");
        assert_eq!(client.base_url(), "http://localhost:9/api/v2");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Nothing listens on the discard port.
        let client = client_for("http://127.0.0.1:9/api/v2");
        let result = client.fetch_catalog(3).await;
        assert!(matches!(result, Err(AppError::NetworkError(_))));
    }
}
