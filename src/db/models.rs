use crate::providers::healthplanet::BodyReading;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One registered user's stored provider credentials.
///
/// `id` is the opaque, immutable internal key. Token columns are nullable:
/// an absent access token means the corresponding provider is never called
/// for this user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct UserCredential {
    pub id: i64,
    pub fitbit_user_id: String,
    pub fitbit_access: Option<String>,
    pub fitbit_refresh: Option<String>,
    pub tanita_access: Option<String>,
    // Kept in storage for a possible future Health Planet refresh path,
    // never read by the sync pass.
    pub tanita_refresh: Option<String>,
}

/// The stored daily summary row, keyed by (user, date).
///
/// Metric fields here already carry the storage sentinel: 0 means
/// "not retrieved this pass". Business logic upstream works with optional
/// values and converts only at this boundary, via [`DailySummary::from_parts`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DailySummary {
    pub user_id: i64,
    pub date: NaiveDate,
    pub steps: i64,
    pub weight: f64,
    pub fat: f64,
    pub height: f64,
}

impl DailySummary {
    /// Combine the per-provider fetch results into a storable row, applying
    /// the zero sentinel for anything that was not retrieved.
    pub fn from_parts(
        user_id: i64,
        date: NaiveDate,
        steps: Option<u64>,
        body: Option<BodyReading>,
    ) -> Self {
        Self {
            user_id,
            date,
            steps: steps.map_or(0, |s| s as i64),
            weight: body.map_or(0.0, |b| b.weight),
            fat: body.map_or(0.0, |b| b.fat),
            height: body.map_or(0.0, |b| b.height),
        }
    }
}
