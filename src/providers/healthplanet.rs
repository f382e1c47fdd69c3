//! Tanita Health Planet client for same-day body-composition readings.
//!
//! The innerscan endpoint returns a flat list of tagged readings; tag 6021 is
//! weight (kg) and tag 6022 body-fat percentage. Height rides on a top-level
//! field, independent of the list. There is no refresh path for this
//! provider; a rejected token just looks like any other error payload.

use crate::config::Config;
use crate::error::SyncError;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;
use url::Url;

const TAG_WEIGHT: &str = "6021";
const TAG_BODY_FAT: &str = "6022";

/// One accepted same-day reading. Present only when both weight and fat were
/// measured; a partial reading is discarded entirely, height included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyReading {
    pub weight: f64,
    pub fat: f64,
    pub height: f64,
}

#[derive(Clone)]
pub struct HealthPlanetClient {
    http: reqwest::Client,
    api_base: Url,
}

impl HealthPlanetClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            http: super::http_client(),
            api_base: cfg.healthplanet_api_base.clone(),
        }
    }

    /// Fetch readings from today's start through now. `Ok(None)` covers every
    /// no-data condition: provider error, missing list, partial reading.
    pub async fn fetch_today_composition(
        &self,
        access_token: &str,
        today: NaiveDate,
    ) -> Result<Option<BodyReading>, SyncError> {
        let url = self.api_base.join("status/innerscan.json")?;
        let from = format!("{}000000", today.format("%Y%m%d"));
        let text = self
            .http
            .post(url)
            .query(&[
                ("access_token", access_token),
                ("tag", "6021,6022"),
                ("date", "1"),
                ("from", from.as_str()),
                ("to", ""),
            ])
            .send()
            .await?
            .text()
            .await?;
        let Ok(body) = serde_json::from_str::<Value>(&text) else {
            warn!("health planet response was not valid JSON");
            return Ok(None);
        };
        Ok(interpret_innerscan_payload(&body))
    }
}

/// Fold a decoded innerscan payload into at most one reading.
///
/// Entries are scanned in returned order and each matching tag overwrites the
/// previous value, so the last reading per tag wins. The reading is accepted
/// only when both weight and fat resolved positive.
fn interpret_innerscan_payload(body: &Value) -> Option<BodyReading> {
    if body.get("error").is_some() {
        warn!("health planet payload signaled a provider error");
        return None;
    }
    let entries = body.get("data")?.as_array()?;

    let mut weight = 0.0;
    let mut fat = 0.0;
    for entry in entries {
        let Some(keydata) = entry.get("keydata").and_then(numeric) else {
            continue;
        };
        match entry.get("tag").and_then(Value::as_str) {
            Some(TAG_WEIGHT) => weight = keydata,
            Some(TAG_BODY_FAT) => fat = keydata,
            _ => {}
        }
    }

    let height = body.get("height").and_then(numeric).unwrap_or(0.0);

    (weight > 0.0 && fat > 0.0).then_some(BodyReading {
        weight,
        fat,
        height,
    })
}

/// Health Planet encodes measurements as strings; accept raw numbers too.
fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
