//! Fitbit Web API client: daily step count plus the reactive refresh-token
//! exchange against the OAuth2 token endpoint.
//!
//! Fitbit signals token expiry inside the response payload (an `errors` list
//! with `errorType = "expired_token"`), not via the transport status, so the
//! body is always decoded and interpreted regardless of the HTTP code.

use crate::config::Config;
use crate::error::SyncError;

use oauth2::{
    AuthUrl, Client as OAuth2Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    RefreshToken, StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

const FITBIT_AUTH_URL: &str = "https://www.fitbit.com/oauth2/authorize";
const EXPIRED_TOKEN: &str = "expired_token";

/// Result of one steps fetch, decoded once from the response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepsOutcome {
    /// Today's step count. An absent result structure counts as zero.
    Count(u64),
    /// The access token was rejected as expired; eligible for one refresh.
    Expired,
    /// Any other provider-side error or unusable payload.
    NoData,
}

/// A freshly exchanged access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct FitbitClient {
    http: reqwest::Client,
    api_base: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl FitbitClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            http: super::http_client(),
            api_base: cfg.fitbit_api_base.clone(),
            token_url: cfg.fitbit_token_url.clone(),
            client_id: cfg.fitbit_client_id.clone(),
            client_secret: cfg.fitbit_client_secret.clone(),
        }
    }

    /// Fetch today's step count for the given Fitbit user.
    ///
    /// Transport failures surface as errors; everything the provider says in
    /// the payload is folded into [`StepsOutcome`].
    pub async fn fetch_today_steps(
        &self,
        fitbit_user_id: &str,
        access_token: &str,
    ) -> Result<StepsOutcome, SyncError> {
        let url = self.api_base.join(&format!(
            "1/user/{fitbit_user_id}/activities/steps/date/today/1d.json"
        ))?;
        let text = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?
            .text()
            .await?;
        let Ok(body) = serde_json::from_str::<Value>(&text) else {
            warn!("fitbit steps response was not valid JSON");
            return Ok(StepsOutcome::NoData);
        };
        Ok(interpret_steps_payload(&body))
    }

    /// Exchange the stored refresh token for a new access/refresh pair.
    ///
    /// One token-endpoint round trip with Basic auth from the app credentials
    /// and a `grant_type=refresh_token` form body. Any rejection maps to an
    /// error; nothing is persisted here.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, SyncError> {
        let client = self.build_oauth2_client()?;
        let token_result: BasicTokenResponse = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await?;
        info!("fitbit access token refreshed successfully");
        Ok(TokenPair {
            access_token: token_result.access_token().secret().clone(),
            // Fitbit rotates the refresh token on every exchange; keep the old
            // one only if the response omits it.
            refresh_token: token_result
                .refresh_token()
                .map_or_else(|| refresh_token.to_string(), |r| r.secret().clone()),
        })
    }

    fn build_oauth2_client(&self) -> Result<FitbitOauth2Client, SyncError> {
        let client = OAuth2Client::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(FITBIT_AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(self.token_url.as_str().to_string())?);
        Ok(client)
    }
}

pub(super) type FitbitOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Fold a decoded steps payload into an outcome.
///
/// `activities-steps` holds one entry per requested day; the single-day query
/// means the first entry is the one that matters. A missing structure is a
/// zero count, not an error.
fn interpret_steps_payload(body: &Value) -> StepsOutcome {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        let expired = errors
            .iter()
            .any(|e| e.get("errorType").and_then(Value::as_str) == Some(EXPIRED_TOKEN));
        if expired {
            return StepsOutcome::Expired;
        }
        return StepsOutcome::NoData;
    }

    let Some(first) = body
        .get("activities-steps")
        .and_then(Value::as_array)
        .and_then(|days| days.first())
    else {
        return StepsOutcome::Count(0);
    };

    match first.get("value") {
        Some(Value::String(s)) => match s.trim().parse::<u64>() {
            Ok(n) => StepsOutcome::Count(n),
            Err(_) => StepsOutcome::NoData,
        },
        Some(Value::Number(n)) => n.as_u64().map_or(StepsOutcome::NoData, StepsOutcome::Count),
        _ => StepsOutcome::Count(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_step_values_coerce_to_integers() {
        let body = json!({ "activities-steps": [ { "value": "4321" } ] });
        assert_eq!(interpret_steps_payload(&body), StepsOutcome::Count(4321));
    }

    #[test]
    fn numeric_step_values_are_accepted() {
        let body = json!({ "activities-steps": [ { "value": 890 } ] });
        assert_eq!(interpret_steps_payload(&body), StepsOutcome::Count(890));
    }

    #[test]
    fn expired_token_error_signals_expiry() {
        let body = json!({
            "errors": [
                { "errorType": "expired_token", "message": "Access token expired" }
            ],
            "success": false
        });
        assert_eq!(interpret_steps_payload(&body), StepsOutcome::Expired);
    }

    #[test]
    fn other_provider_errors_degrade_to_no_data() {
        let body = json!({
            "errors": [ { "errorType": "insufficient_scope", "message": "nope" } ]
        });
        assert_eq!(interpret_steps_payload(&body), StepsOutcome::NoData);
    }

    #[test]
    fn missing_result_structure_counts_as_zero() {
        assert_eq!(interpret_steps_payload(&json!({})), StepsOutcome::Count(0));
        let empty = json!({ "activities-steps": [] });
        assert_eq!(interpret_steps_payload(&empty), StepsOutcome::Count(0));
        let no_value = json!({ "activities-steps": [ {} ] });
        assert_eq!(interpret_steps_payload(&no_value), StepsOutcome::Count(0));
    }

    #[test]
    fn unparsable_step_value_degrades_to_no_data() {
        let body = json!({ "activities-steps": [ { "value": "lots" } ] });
        assert_eq!(interpret_steps_payload(&body), StepsOutcome::NoData);
    }
}
