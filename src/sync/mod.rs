//! The per-user synchronization pass.
//!
//! One pass walks every stored credential record in listing order, fetches
//! whatever each provider can deliver, and upserts one summary row per user.
//! Every per-user failure is logged and contained: a broken provider, an
//! expired token that cannot be refreshed, or a failed write never stops the
//! remaining users from being processed.

use crate::db::{DailySummary, HealthStorage, UserCredential};
use crate::error::SyncError;
use crate::providers::fitbit::{FitbitClient, StepsOutcome, TokenPair};
use crate::providers::healthplanet::{BodyReading, HealthPlanetClient};
use chrono::{Local, NaiveDate};
use tracing::{info, warn};

pub struct SyncService {
    storage: HealthStorage,
    fitbit: FitbitClient,
    healthplanet: HealthPlanetClient,
}

impl SyncService {
    pub fn new(
        storage: HealthStorage,
        fitbit: FitbitClient,
        healthplanet: HealthPlanetClient,
    ) -> Self {
        Self {
            storage,
            fitbit,
            healthplanet,
        }
    }

    /// Run one full best-effort sweep over all registered users.
    ///
    /// Only the initial credential listing can fail the pass; with nothing to
    /// iterate there is nothing to degrade to.
    pub async fn run_pass(&self) -> Result<(), SyncError> {
        let credentials = self.storage.list_credentials().await?;
        info!(users = credentials.len(), "starting daily sync pass");

        for cred in &credentials {
            // today is resolved per user so both provider calls for one user
            // share the same calendar day
            let today = Local::now().date_naive();
            self.sync_user(cred, today).await;
        }

        info!("daily sync pass finished");
        Ok(())
    }

    /// Sync a single user for the given day and persist the combined row.
    pub async fn sync_user(&self, cred: &UserCredential, date: NaiveDate) {
        let steps = self.resolve_steps(cred).await;
        let body = self.resolve_composition(cred, date).await;

        let summary = DailySummary::from_parts(cred.id, date, steps, body);
        match self.storage.upsert_summary(&summary).await {
            Ok(()) => info!(
                user_id = cred.id,
                steps = summary.steps,
                weight = summary.weight,
                fat = summary.fat,
                height = summary.height,
                "stored daily summary"
            ),
            Err(e) => warn!(
                user_id = cred.id,
                error = %e,
                "failed to store daily summary"
            ),
        }
    }

    /// Today's steps, or `None` for every degraded condition.
    ///
    /// An expired token triggers exactly one refresh followed by exactly one
    /// retried fetch; a second expiry or any failure on the retry degrades
    /// silently for this pass.
    async fn resolve_steps(&self, cred: &UserCredential) -> Option<u64> {
        let access = cred.fitbit_access.as_deref()?;

        match self.fitbit.fetch_today_steps(&cred.fitbit_user_id, access).await {
            Ok(StepsOutcome::Count(n)) => Some(n),
            Ok(StepsOutcome::NoData) => None,
            Ok(StepsOutcome::Expired) => {
                info!(user_id = cred.id, "fitbit access token expired, refreshing");
                let pair = self.refresh_fitbit(cred).await?;
                match self
                    .fitbit
                    .fetch_today_steps(&cred.fitbit_user_id, &pair.access_token)
                    .await
                {
                    Ok(StepsOutcome::Count(n)) => Some(n),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(user_id = cred.id, error = %e, "retried fitbit steps fetch failed");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(user_id = cred.id, error = %e, "fitbit steps fetch failed");
                None
            }
        }
    }

    /// Exchange and persist a fresh Fitbit token pair, or `None` when the
    /// user has no refresh token or the exchange is rejected. Stored tokens
    /// are left untouched on a failed exchange.
    async fn refresh_fitbit(&self, cred: &UserCredential) -> Option<TokenPair> {
        let refresh = cred.fitbit_refresh.as_deref()?;

        let pair = match self.fitbit.refresh_tokens(refresh).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(user_id = cred.id, error = %e, "fitbit token refresh failed");
                return None;
            }
        };

        // The provider has already rotated the pair at this point; on a write
        // failure the in-memory pair is still good for this pass's retry.
        if let Err(e) = self
            .storage
            .update_fitbit_tokens(cred.id, &pair.access_token, &pair.refresh_token)
            .await
        {
            warn!(user_id = cred.id, error = %e, "failed to persist refreshed fitbit tokens");
        }

        Some(pair)
    }

    async fn resolve_composition(
        &self,
        cred: &UserCredential,
        date: NaiveDate,
    ) -> Option<BodyReading> {
        let access = cred.tanita_access.as_deref()?;

        match self.healthplanet.fetch_today_composition(access, date).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(user_id = cred.id, error = %e, "health planet composition fetch failed");
                None
            }
        }
    }
}
