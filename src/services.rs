use crate::cache_validator::ValidatedCacheEntry;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{GeoLocation, GoogleGeocodeResponse};
use moka::future::Cache;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Builds a geocodable address from the address fields of a record.
///
/// Returns `None` when the record has no address information at all.
pub fn build_address(data: &Value) -> Option<String> {
    let parts: Vec<&str> = ["direccion", "distrito", "canton", "provincia"]
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        return None;
    }
    Some(format!("{}, Costa Rica", parts.join(", ")))
}

/// Client for the Google Geocoding API.
#[derive(Clone)]
pub struct GeocodingService {
    client: Client,
    base_url: String,
    api_key: String,
    cache: Cache<String, String>,
}

impl GeocodingService {
    /// `None` when `GOOGLE_MAPS_API_KEY` is not configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .google_maps_api_key
            .as_ref()
            .map(|key| Self::new(config.google_maps_base_url.clone(), key.clone()))
    }

    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(86_400))
                .max_capacity(50_000)
                .build(),
        }
    }

    /// Geocodes an address, restricted to the Costa Rica region.
    ///
    /// `Ok(None)` means Google answered but found nothing.
    pub async fn geocode(&self, address: &str) -> Result<Option<GeoLocation>, AppError> {
        let cache_key = address.trim().to_lowercase();
        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Some(location) = ValidatedCacheEntry::open::<Option<GeoLocation>>(&cached) {
                tracing::debug!("Geocoding cache HIT for: {}", address);
                return Ok(location);
            }
        }

        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &format!("{}/maps/api/geocode/json", self.base_url),
            &[
                ("address", address),
                ("region", "cr"),
                ("key", self.api_key.as_str()),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Geocoding address: {}", address);
        tracing::debug!(
            "Geocoding URL: {}/maps/api/geocode/json?address={}&region=cr&key=[REDACTED]",
            self.base_url,
            address
        );

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Geocoding API returned error {}: {}", status, error_text);
            return Err(AppError::ExternalApiError(format!(
                "Geocoding API returned status {}: {}",
                status, error_text
            )));
        }

        let body: GoogleGeocodeResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse geocoding response: {}", e))
        })?;

        let location = match body.status.as_str() {
            "OK" => body.results.into_iter().next().map(|r| GeoLocation {
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
                formatted_address: r.formatted_address,
            }),
            "ZERO_RESULTS" => None,
            other => {
                return Err(AppError::ExternalApiError(format!(
                    "Geocoding API status {}: {}",
                    other,
                    body.error_message.unwrap_or_default()
                )))
            }
        };

        if let Some(sealed) = ValidatedCacheEntry::seal(&location) {
            self.cache.insert(cache_key, sealed).await;
        }

        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn address_joins_present_parts() {
        let data = json!({
            "direccion": "200 m norte de la iglesia",
            "canton": "Escazu",
            "provincia": "San Jose",
            "distrito": ""
        });
        assert_eq!(
            build_address(&data).unwrap(),
            "200 m norte de la iglesia, Escazu, San Jose, Costa Rica"
        );
    }

    #[test]
    fn address_missing_is_none() {
        assert!(build_address(&json!({"nombre": "Maria"})).is_none());
    }
}
