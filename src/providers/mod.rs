//! HTTP clients for the two external health-data providers.
//!
//! Each client decodes provider responses once, at the HTTP boundary, into an
//! explicit outcome type; callers never re-inspect JSON shapes.

pub mod fitbit;
pub mod healthplanet;

pub use fitbit::{FitbitClient, StepsOutcome, TokenPair};
pub use healthplanet::{BodyReading, HealthPlanetClient};

use std::time::Duration;

/// Shared reqwest client settings for provider calls.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("vitalsync/0.1")
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15))
        .build()
        .expect("FATAL: initialize provider HTTP client failed")
}
