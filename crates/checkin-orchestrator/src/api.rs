//! HTTP client for the check-in upstream.
//!
//! Every call made here goes through [`with_retry`], so a dropped connection
//! is retried according to the profile's [`RetryPolicy`]. Answers the
//! upstream gives on purpose (no token, missing profile data, a rejected
//! check-in, a refused manifest) come back as `None`, `false` or an
//! `Unavailable` value instead of an error; the runner decides what they mean
//! for the account.
//!
//! # Example
//!
//! ```no_run
//! use checkin_orchestrator::{ApiClient, Profile};
//! use std::path::Path;
//!
//! # async fn example() -> checkin_orchestrator::Result<()> {
//! let profile = Profile::load_from_file(Path::new("profile.toml"))?;
//! let client = ApiClient::new(&profile)?;
//!
//! if let Some(token) = client.fetch_access_token("o1AbC-openid").await? {
//!     println!("score: {}", client.fetch_user_score(&token).await?);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientIdentity, Endpoints, Profile};
use crate::error::{CheckinError, Result};
use crate::retry::{with_retry, RetryPolicy};

/// Per-request timeout; a timeout counts as a transport failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A token is the first run of `A-Z`, `0-9` or `-` wrapped in matching quotes.
static ACCESS_TOKEN_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#""(?P<double>[A-Z0-9-]+)"|'(?P<single>[A-Z0-9-]+)'"#).ok()
});

// ============================================================================
// Domain Types
// ============================================================================

/// Short-lived credential for one account run.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Payload of the check-in submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInData {
    /// Course id, passed through exactly as the upstream sent it.
    pub course: Value,
    /// Node id.
    pub nid: String,
    /// Card number.
    #[serde(rename = "cardNo")]
    pub card_no: String,
}

/// Check-in payload plus the display-only details that came with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInInfo {
    /// What gets submitted.
    pub data: CheckInData,
    /// Title of the current course.
    pub course_title: String,
    /// Titles of the account's group nodes.
    pub groups: Vec<String>,
}

/// Score as reported by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Score(Value);

impl Score {
    /// Wraps an upstream score value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&value_text(&self.0))
    }
}

/// The upstream's answer to a check-in submission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinReceipt {
    /// Application-level status; `200` means accepted.
    pub status: Value,
    /// Human-readable explanation, mostly useful on rejection.
    #[serde(default)]
    pub message: Value,
}

impl JoinReceipt {
    /// Returns `true` if the upstream accepted the check-in.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status.as_f64(), Some(status) if (status - 200.0).abs() < f64::EPSILON)
    }

    /// Status rendered as text.
    #[must_use]
    pub fn status_text(&self) -> String {
        value_text(&self.status)
    }

    /// Message rendered as text.
    #[must_use]
    pub fn message_text(&self) -> String {
        value_text(&self.message)
    }
}

/// Outcome of asking for the reward image manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardManifest {
    /// The manifest was served; image URLs are derived from `uri`.
    Available {
        /// Base URI of the reward assets.
        uri: String,
    },
    /// The endpoint answered with a non-200 HTTP status.
    Unavailable {
        /// HTTP status code returned.
        status: u16,
    },
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LastInfo {
    nid: Option<String>,
    #[serde(rename = "cardNo")]
    card_no: Option<String>,
    #[serde(default)]
    nodes: Option<Vec<Node>>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Course {
    id: Value,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ScoreResult {
    score: Value,
}

#[derive(Debug, Deserialize)]
struct ManifestResult {
    uri: String,
}

// ============================================================================
// Client
// ============================================================================

/// Client for the upstream check-in service.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: Endpoints,
    identity: ClientIdentity,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Creates a client for the given profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized (for
    /// example, when no TLS backend is available).
    pub fn new(profile: &Profile) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_http_client(profile, http))
    }

    /// Creates a client that sends requests through `http`.
    #[must_use]
    pub fn with_http_client(profile: &Profile, http: Client) -> Self {
        Self {
            http,
            endpoints: profile.url.clone(),
            identity: profile.other.clone(),
            policy: profile.retry.policy(),
        }
    }

    /// Overrides the retry policy taken from the profile.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Exchanges an openid for an access token.
    ///
    /// The token endpoint does not return JSON; the token is scraped from the
    /// body with [`extract_access_token`]. No user agent is sent.
    #[instrument(skip_all)]
    pub async fn fetch_access_token(&self, openid: &str) -> Result<Option<AccessToken>> {
        let body = with_retry(&self.policy, "fetch_access_token", || async move {
            let response = self
                .http
                .get(&self.endpoints.access_token)
                .query(&[("appid", self.identity.app_id.as_str()), ("openid", openid)])
                .send()
                .await?;
            Ok(response.text().await?)
        })
        .await?;

        let token = extract_access_token(&body);
        if token.is_some() {
            debug!("Access token acquired");
        } else {
            warn!("No access token in the token response");
        }
        Ok(token)
    }

    /// Resolves the data needed to submit a check-in.
    ///
    /// Node id and card number come from the profile endpoint; when the
    /// server leaves one out (or sends it empty) the matching fallback is
    /// used. Returns `None` without calling the course endpoint if either is
    /// still missing, and `None` if the course endpoint has no current course.
    ///
    /// An empty server value counts as missing. With no fallback configured
    /// this returns `None` instead of submitting the check-in with an empty
    /// node id or card number, which the upstream would accept as-is.
    #[instrument(skip_all)]
    pub async fn fetch_check_in_info(
        &self,
        token: &AccessToken,
        fallback_nid: Option<&str>,
        fallback_card_no: Option<&str>,
    ) -> Result<Option<CheckInInfo>> {
        let Some(last_info) = self
            .get_result::<LastInfo>("fetch_last_info", &self.endpoints.last_info, token)
            .await?
        else {
            warn!("Profile endpoint returned no data");
            return Ok(None);
        };

        let nid = present(last_info.nid).or_else(|| present_str(fallback_nid));
        let card_no = present(last_info.card_no).or_else(|| present_str(fallback_card_no));
        let (Some(nid), Some(card_no)) = (nid, card_no) else {
            warn!("Node id or card number missing after applying account fallbacks");
            return Ok(None);
        };

        let Some(course) = self
            .get_result::<Course>("fetch_current_course", &self.endpoints.current_course, token)
            .await?
        else {
            warn!("Course endpoint returned no current course");
            return Ok(None);
        };

        let groups: Vec<String> = last_info
            .nodes
            .unwrap_or_default()
            .into_iter()
            .map(|node| node.title)
            .collect();

        info!(
            course = %course.title,
            groups = ?groups,
            nid = %nid,
            card_no = %card_no,
            "Check-in info resolved"
        );

        Ok(Some(CheckInInfo {
            data: CheckInData {
                course: course.id,
                nid,
                card_no,
            },
            course_title: course.title,
            groups,
        }))
    }

    /// Reads the account's current score.
    ///
    /// # Errors
    ///
    /// Returns [`CheckinError::MalformedResponse`] if the response has no
    /// `result.score`.
    #[instrument(skip_all)]
    pub async fn fetch_user_score(&self, token: &AccessToken) -> Result<Score> {
        self.get_result::<ScoreResult>("fetch_user_score", &self.endpoints.user_info, token)
            .await?
            .map(|result| Score(result.score))
            .ok_or_else(|| CheckinError::malformed("fetch_user_score", "result is null"))
    }

    /// Submits a check-in and reports whether it was accepted.
    pub async fn submit_check_in(&self, token: &AccessToken, data: &CheckInData) -> Result<bool> {
        Ok(self.submit_check_in_detailed(token, data).await?.is_success())
    }

    /// Submits a check-in and returns the upstream's full answer.
    ///
    /// A non-200 application status is logged and returned, never raised.
    #[instrument(skip_all)]
    pub async fn submit_check_in_detailed(
        &self,
        token: &AccessToken,
        data: &CheckInData,
    ) -> Result<JoinReceipt> {
        let body = with_retry(&self.policy, "submit_check_in", || async move {
            let response = self
                .http
                .post(&self.endpoints.join)
                .query(&[("accessToken", token.as_str())])
                .header(USER_AGENT, self.identity.user_agent.as_str())
                .json(data)
                .send()
                .await?;
            Ok(response.text().await?)
        })
        .await?;

        let receipt: JoinReceipt = parse_json("submit_check_in", &body)?;
        if receipt.is_success() {
            info!("Check-in accepted");
        } else {
            warn!(
                status = %receipt.status_text(),
                message = %receipt.message_text(),
                "Check-in rejected"
            );
        }
        Ok(receipt)
    }

    /// Fetches the reward image manifest for this token.
    ///
    /// The token is appended to the configured URL as-is.
    #[instrument(skip_all)]
    pub async fn fetch_reward_manifest(&self, token: &AccessToken) -> Result<RewardManifest> {
        let url = format!("{}{}", self.endpoints.image, token.as_str());
        let url = url.as_str();

        let (status, body) = with_retry(&self.policy, "fetch_reward_manifest", || async move {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            Ok((status, response.text().await?))
        })
        .await?;

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Reward image manifest refused");
            return Ok(RewardManifest::Unavailable {
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<ManifestResult> = parse_json("fetch_reward_manifest", &body)?;
        let uri = envelope
            .result
            .map(|result| result.uri)
            .ok_or_else(|| CheckinError::malformed("fetch_reward_manifest", "result is null"))?;
        Ok(RewardManifest::Available { uri })
    }

    /// Downloads one reward image. A non-200 status gives `None`.
    #[instrument(skip(self))]
    pub async fn fetch_reward_image(&self, url: &str) -> Result<Option<Vec<u8>>> {
        with_retry(&self.policy, "fetch_reward_image", || async move {
            let response = self.http.get(url).send().await?;
            if response.status() != StatusCode::OK {
                debug!(status = response.status().as_u16(), "Image request refused");
                return Ok(None);
            }
            Ok(Some(response.bytes().await?.to_vec()))
        })
        .await
    }

    /// GETs a JSON endpoint with the token and user agent and returns its
    /// `result` field.
    async fn get_result<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        token: &AccessToken,
    ) -> Result<Option<T>> {
        let body = with_retry(&self.policy, operation, || async move {
            let response = self
                .http
                .get(url)
                .query(&[("accessToken", token.as_str())])
                .header(USER_AGENT, self.identity.user_agent.as_str())
                .send()
                .await?;
            Ok(response.text().await?)
        })
        .await?;

        let envelope: Envelope<T> = parse_json(operation, &body)?;
        Ok(envelope.result)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Finds the access token in a token-endpoint response body.
///
/// # Example
///
/// ```
/// use checkin_orchestrator::extract_access_token;
///
/// let token = extract_access_token("var accessToken = 'AB12-CD34';").unwrap();
/// assert_eq!(token.as_str(), "AB12-CD34");
/// assert!(extract_access_token("no token here").is_none());
/// ```
#[must_use]
pub fn extract_access_token(body: &str) -> Option<AccessToken> {
    let captures = ACCESS_TOKEN_PATTERN.as_ref()?.captures(body)?;
    captures
        .name("double")
        .or_else(|| captures.name("single"))
        .map(|m| AccessToken::new(m.as_str()))
}

fn parse_json<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| CheckinError::malformed(operation, e.to_string()))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn present_str(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Strings render without quotes; everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
