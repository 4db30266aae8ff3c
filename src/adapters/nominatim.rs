use crate::domain::model::{Coordinates, LookupFailure};
use crate::domain::ports::{AddressLookup, ConfigProvider};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = "geo_app";

/// OpenStreetMap Nominatim 搜尋 API 的客戶端。
///
/// Built once per process and shared by every dataset pipeline.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: Client,
    endpoint: String,
    extra_params: Vec<(String, String)>,
}

impl NominatimClient {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(user_agent.to_string());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.to_string(),
            extra_params: Vec::new(),
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        Ok(Self::new(
            config.api_endpoint(),
            config.user_agent(),
            config.request_timeout(),
        )?
        .with_params(config.extra_query_params()))
    }

    /// Adds query parameters sent with every search, e.g. `countrycodes=tr`.
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.extra_params = params;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AddressLookup for NominatimClient {
    async fn lookup(&self, address: &str) -> std::result::Result<Option<Coordinates>, LookupFailure> {
        tracing::debug!("Geocoding request to {} for '{}'", self.endpoint, address);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .query(&self.extra_params)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        tracing::debug!("Geocoding response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupFailure::RateLimited);
        }
        if !status.is_success() {
            return Err(LookupFailure::HttpStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        parse_search_response(&body)
    }
}

fn classify_transport_error(error: reqwest::Error) -> LookupFailure {
    if error.is_timeout() {
        LookupFailure::Timeout
    } else if error.is_decode() {
        LookupFailure::MalformedResponse(error.to_string())
    } else {
        LookupFailure::Network
    }
}

/// 解析 `format=json` 的搜尋結果；只取第一筆
pub fn parse_search_response(body: &str) -> std::result::Result<Option<Coordinates>, LookupFailure> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| LookupFailure::MalformedResponse(e.to_string()))?;

    let hits = value
        .as_array()
        .ok_or_else(|| LookupFailure::MalformedResponse("expected a JSON array".to_string()))?;

    let Some(first) = hits.first() else {
        return Ok(None);
    };

    let lat = coordinate_value(first.get("lat"));
    let lon = coordinate_value(first.get("lon"));
    Ok(match (lat, lon) {
        (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
        _ => None,
    })
}

// Nominatim 以字串回傳座標，其他相容服務可能用數字
fn coordinate_value(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
