//! Client for the forecast summary function

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Forecast, GridPoint, WeatherError, WeatherSource};
use crate::config::WeatherConfig;

/// POSTs `{nx, ny}` to the function and reads back
/// `{"ok": true, "summary": {"YYYYMMDD": {"rain_condition": 0|1}}}`
pub struct ForecastFunctionClient {
    url: String,
    token: Option<String>,
    http: Client,
}

impl ForecastFunctionClient {
    pub fn from_config(config: &WeatherConfig) -> Result<Self, WeatherError> {
        debug!(url = ?config.function_url, "from_config: called");
        let url = config
            .function_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| WeatherError::NotConfigured("weather.function-url is not set".to_string()))?;

        let token = match config.token_env.as_deref() {
            Some(var) => match std::env::var(var) {
                Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
                _ => {
                    warn!(%var, "from_config: token env var empty, calling function without auth");
                    None
                }
            },
            None => None,
        };

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(WeatherError::Network)?;

        Ok(Self { url, token, http })
    }
}

#[async_trait]
impl WeatherSource for ForecastFunctionClient {
    async fn forecast(&self, grid: GridPoint) -> Result<Forecast, WeatherError> {
        debug!(%grid, url = %self.url, "forecast: called");
        let mut request = self.http.post(&self.url).json(&grid);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%status, "forecast: function error");
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: FunctionResponse = response.json().await?;
        parse_summary(body)
    }
}

#[derive(Debug, Deserialize)]
struct FunctionResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    summary: BTreeMap<String, DaySummary>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DaySummary {
    #[serde(default)]
    rain_condition: i64,
}

/// Accepts `YYYYMMDD` keys and, leniently, `YYYY-MM-DD`
fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(key, "%Y-%m-%d"))
        .ok()
}

fn parse_summary(body: FunctionResponse) -> Result<Forecast, WeatherError> {
    if !body.ok {
        return Err(WeatherError::InvalidResponse(
            body.error.unwrap_or_else(|| "function reported ok=false".to_string()),
        ));
    }

    let mut days = BTreeMap::new();
    for (key, day) in body.summary {
        match parse_date_key(&key) {
            Some(date) => {
                days.insert(date, day.rain_condition == 1);
            }
            None => warn!(%key, "parse_summary: skipping undated summary entry"),
        }
    }
    debug!(days = days.len(), "parse_summary: done");
    Ok(Forecast { days })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Forecast, WeatherError> {
        parse_summary(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_parse_summary() {
        let forecast = parse(
            r#"{"ok": true, "nx": 92, "ny": 131, "summary": {
                "20250819": {"rain_condition": 0},
                "20250820": {"rain_condition": 1},
                "2025-08-21": {"rain_condition": 1},
                "tomorrow": {"rain_condition": 1}
            }}"#,
        )
        .unwrap();

        assert_eq!(forecast.days.len(), 3);
        let rainy = forecast.rainy_dates();
        assert!(rainy.contains(&NaiveDate::from_ymd_opt(2025, 8, 20).unwrap()));
        assert!(rainy.contains(&NaiveDate::from_ymd_opt(2025, 8, 21).unwrap()));
        assert!(!rainy.contains(&NaiveDate::from_ymd_opt(2025, 8, 19).unwrap()));
    }

    #[test]
    fn test_parse_summary_not_ok() {
        let err = parse(r#"{"ok": false, "error": "SERVICE_KEY missing"}"#).unwrap_err();
        assert!(err.to_string().contains("SERVICE_KEY"));
    }

    #[test]
    fn test_parse_empty_summary() {
        let forecast = parse(r#"{"ok": true, "summary": {}}"#).unwrap();
        assert!(forecast.into_signal().is_unavailable());
    }

    #[test]
    fn test_grid_serializes_as_body() {
        let v = serde_json::to_value(GridPoint::new(92, 131)).unwrap();
        assert_eq!(v, serde_json::json!({"nx": 92, "ny": 131}));
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = WeatherConfig::default();
        assert!(matches!(
            ForecastFunctionClient::from_config(&config),
            Err(WeatherError::NotConfigured(_))
        ));
    }
}
