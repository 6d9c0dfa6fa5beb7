//! Weather forecast adapter
//!
//! The forecast comes from an HTTP function that summarizes the national short
//! range forecast per calendar date. Anything short of a usable per-date summary
//! is reported as [`RainSignal::Unavailable`] so callers can degrade.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

mod function;

pub use function::ForecastFunctionClient;

/// Forecast grid coordinate (KMA nx/ny)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub nx: i32,
    pub ny: i32,
}

impl GridPoint {
    pub fn new(nx: i32, ny: i32) -> Self {
        Self { nx, ny }
    }
}

/// Gangneung
impl Default for GridPoint {
    fn default() -> Self {
        Self::new(92, 131)
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.nx, self.ny)
    }
}

/// Per-date rain summary for one grid point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Forecast {
    pub days: BTreeMap<NaiveDate, bool>,
}

impl Forecast {
    pub fn rainy_dates(&self) -> BTreeSet<NaiveDate> {
        self.days.iter().filter(|(_, rain)| **rain).map(|(d, _)| *d).collect()
    }

    /// An empty forecast carries no information and maps to `Unavailable`
    pub fn into_signal(self) -> RainSignal {
        if self.days.is_empty() {
            RainSignal::Unavailable
        } else {
            RainSignal::Dates(self.rainy_dates())
        }
    }
}

/// What the proposal engine knows about rain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RainSignal {
    /// Forecast available; these dates are rainy (possibly none)
    Dates(BTreeSet<NaiveDate>),
    /// No usable forecast
    Unavailable,
}

impl RainSignal {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RainSignal::Unavailable)
    }
}

/// Errors from the forecast source
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Forecast source not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Forecast function returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid forecast response: {0}")]
    InvalidResponse(String),
}

/// Weather forecast provider
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn forecast(&self, grid: GridPoint) -> Result<Forecast, WeatherError>;
}

/// Fetch a forecast and collapse every failure into `Unavailable`
pub async fn fetch_rain_signal(source: &dyn WeatherSource, grid: GridPoint, timeout: Duration) -> RainSignal {
    debug!(%grid, ?timeout, "fetch_rain_signal: called");
    match tokio::time::timeout(timeout, source.forecast(grid)).await {
        Ok(Ok(forecast)) => {
            let signal = forecast.into_signal();
            match &signal {
                RainSignal::Dates(dates) => info!(%grid, rainy = dates.len(), "fetch_rain_signal: forecast received"),
                RainSignal::Unavailable => warn!(%grid, "fetch_rain_signal: forecast had no dated data"),
            }
            signal
        }
        Ok(Err(e)) => {
            warn!(%grid, error = %e, "fetch_rain_signal: forecast failed");
            RainSignal::Unavailable
        }
        Err(_) => {
            warn!(%grid, ?timeout, "fetch_rain_signal: forecast timed out");
            RainSignal::Unavailable
        }
    }
}
