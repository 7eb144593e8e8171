//! Carbon intensity API integration

use crate::carbon_aware::types::{CarbonProvider, IntensitySample};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Default per-request timeout for live fetches
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Anything that can produce a current carbon intensity reading.
///
/// Implementations must surface every failure as an error; callers never
/// substitute a default value.
#[async_trait]
pub trait IntensitySource: Send + Sync {
    async fn fetch_current(&self, region: &str) -> Result<IntensitySample>;
}

/// Live carbon intensity API client
#[derive(Clone)]
pub struct CarbonIntensityApi {
    client: Client,
    provider: CarbonProvider,
}

impl CarbonIntensityApi {
    /// Create a client whose requests are bounded by `timeout`
    pub fn new(provider: CarbonProvider, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("HTTP client: {e}")))?;
        Ok(Self { client, provider })
    }

    pub fn provider(&self) -> &CarbonProvider {
        &self.provider
    }

    /// Fetch from the UK National Grid API
    ///
    /// Endpoint: GET {url}/intensity
    async fn fetch_national_grid(&self, base_url: &str) -> Result<f64> {
        let url = format!("{}/intensity", base_url.trim_end_matches('/'));
        debug!("Fetching carbon intensity from {}", url);

        let json: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_national_grid(&json)
    }

    /// Fetch from ElectricityMap for a single zone
    ///
    /// Endpoint: GET {url}/v3/carbon-intensity/latest?zone={region}
    async fn fetch_electricitymap(&self, base_url: &str, token: &str, region: &str) -> Result<f64> {
        let url = format!(
            "{}/v3/carbon-intensity/latest",
            base_url.trim_end_matches('/')
        );
        debug!("Fetching carbon intensity for zone {} from {}", region, url);

        let mut request = self.client.get(&url).query(&[("zone", region)]);
        if !token.is_empty() {
            request = request.header("auth-token", token);
        }

        let json: Value = request.send().await?.error_for_status()?.json().await?;

        json.get("carbonIntensity")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                Error::SourceUnavailable(
                    "ElectricityMap response missing carbonIntensity".to_string(),
                )
            })
    }
}

#[async_trait]
impl IntensitySource for CarbonIntensityApi {
    async fn fetch_current(&self, region: &str) -> Result<IntensitySample> {
        let intensity = match &self.provider {
            CarbonProvider::NationalGrid { url } => self.fetch_national_grid(url).await?,
            CarbonProvider::ElectricityMap { url, token } => {
                self.fetch_electricitymap(url, token, region).await?
            }
            CarbonProvider::Fixed { intensity } => *intensity,
        };

        let intensity = validate_reading(intensity)?;
        info!(
            region,
            intensity,
            provider = self.provider.name(),
            "Fetched carbon intensity"
        );

        Ok(IntensitySample::new(region, None, intensity))
    }
}

/// Extract a reading from `{"data": [{"intensity": {"actual": .., "forecast": ..}}]}`.
///
/// `actual` wins when present and non-null; otherwise `forecast` is used.
pub fn parse_national_grid(json: &Value) -> Result<f64> {
    let intensity = json
        .get("data")
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("intensity"))
        .ok_or_else(|| {
            Error::SourceUnavailable("response missing data[0].intensity".to_string())
        })?;

    let reading = |key: &str| intensity.get(key).and_then(Value::as_f64);

    reading("actual").or_else(|| reading("forecast")).ok_or_else(|| {
        Error::SourceUnavailable("response has neither actual nor forecast intensity".to_string())
    })
}

fn validate_reading(intensity: f64) -> Result<f64> {
    if intensity.is_finite() && intensity >= 0.0 {
        Ok(intensity)
    } else {
        Err(Error::SourceUnavailable(format!(
            "invalid carbon intensity reading: {intensity}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ── parsing ────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_prefers_actual() {
        let body = json!({"data": [{"intensity": {"actual": 150, "forecast": 200}}]});
        assert_eq!(parse_national_grid(&body).unwrap(), 150.0);
    }

    #[test]
    fn test_parse_falls_back_to_forecast_when_actual_null() {
        let body = json!({"data": [{"intensity": {"actual": null, "forecast": 180}}]});
        assert_eq!(parse_national_grid(&body).unwrap(), 180.0);

        let body = json!({"data": [{"intensity": {"forecast": 175}}]});
        assert_eq!(parse_national_grid(&body).unwrap(), 175.0);
    }

    #[test]
    fn test_parse_rejects_missing_readings() {
        let body = json!({"data": [{"intensity": {"index": "high"}}]});
        assert!(matches!(
            parse_national_grid(&body),
            Err(Error::SourceUnavailable(_))
        ));

        let body = json!({"unexpected": "format"});
        assert!(matches!(
            parse_national_grid(&body),
            Err(Error::SourceUnavailable(_))
        ));
    }

    // ── live providers ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_national_grid_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/intensity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": [{"intensity": {"actual": 142, "forecast": 160, "index": "moderate"}}]}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let api = CarbonIntensityApi::new(
            CarbonProvider::NationalGrid { url: server.uri() },
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap();

        let sample = api.fetch_current("GB").await.unwrap();
        assert_eq!(sample.region, "GB");
        assert_eq!(sample.intensity_g_per_kwh, 142.0);
        assert_eq!(sample.hour_of_day, None);
    }

    #[tokio::test]
    async fn test_national_grid_http_error_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/intensity"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = CarbonIntensityApi::new(
            CarbonProvider::NationalGrid { url: server.uri() },
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap();

        let err = api.fetch_current("GB").await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_national_grid_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/intensity"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let api = CarbonIntensityApi::new(
            CarbonProvider::NationalGrid { url: server.uri() },
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap();

        assert!(matches!(
            api.fetch_current("GB").await,
            Err(Error::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_request_timeout_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/intensity"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"intensity": {"actual": 100}}]}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let api = CarbonIntensityApi::new(
            CarbonProvider::NationalGrid { url: server.uri() },
            Duration::from_millis(50),
        )
        .unwrap();

        let err = api.fetch_current("GB").await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_electricitymap_fetch_sends_zone_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/carbon-intensity/latest"))
            .and(query_param("zone", "DE"))
            .and(header("auth-token", "secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"zone": "DE", "carbonIntensity": 310.5})),
            )
            .mount(&server)
            .await;

        let api = CarbonIntensityApi::new(
            CarbonProvider::ElectricityMap {
                url: server.uri(),
                token: "secret".to_string(),
            },
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap();

        let sample = api.fetch_current("DE").await.unwrap();
        assert_eq!(sample.region, "DE");
        assert_eq!(sample.intensity_g_per_kwh, 310.5);
    }

    #[tokio::test]
    async fn test_fixed_provider_rejects_negative() {
        let ok = CarbonIntensityApi::new(
            CarbonProvider::Fixed { intensity: 90.0 },
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap();
        assert_eq!(ok.fetch_current("GB").await.unwrap().intensity_g_per_kwh, 90.0);

        let bad = CarbonIntensityApi::new(
            CarbonProvider::Fixed { intensity: -1.0 },
            DEFAULT_REQUEST_TIMEOUT,
        )
        .unwrap();
        assert!(matches!(
            bad.fetch_current("GB").await,
            Err(Error::SourceUnavailable(_))
        ));
    }
}
