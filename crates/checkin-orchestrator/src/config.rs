//! Configuration types for the check-in orchestrator.
//!
//! Two TOML documents drive a run:
//!
//! - the **profile** (`profile.toml`): upstream endpoints, application id,
//!   user agent, and optional mail relay, output and retry settings;
//! - the **accounts** (`config.toml`): one `[user.<name>]` table per account.
//!
//! Both are loaded once at startup into plain structs that are passed by
//! reference to the components that need them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use checkin_mailer::MailConfig;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{CheckinError, Result};
use crate::retry::RetryPolicy;

/// The default profile file name.
pub const PROFILE_FILE_NAME: &str = "profile.toml";

/// The default accounts file name.
pub const ACCOUNTS_FILE_NAME: &str = "config.toml";

/// Default directory that dated output folders are created under.
fn default_save_root() -> PathBuf {
    PathBuf::from("./end/")
}

/// Default number of attempts for each upstream call.
const fn default_max_attempts() -> u32 {
    3
}

/// Default wait between attempts, in seconds.
const fn default_delay_secs() -> u64 {
    5
}

// ============================================================================
// Profile
// ============================================================================

/// Upstream endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    /// Token exchange endpoint (GET, non-JSON body).
    pub access_token: String,
    /// Profile endpoint returning node id, card number and node titles.
    pub last_info: String,
    /// Current course endpoint.
    pub current_course: String,
    /// Score endpoint.
    pub user_info: String,
    /// Check-in submission endpoint (POST).
    pub join: String,
    /// Reward image manifest endpoint; the access token is appended verbatim.
    pub image: String,
}

/// Identity presented to the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientIdentity {
    /// Application identifier sent with the token exchange.
    #[serde(rename = "wxAppId")]
    pub app_id: String,
    /// HTTP user agent for the JSON endpoints.
    #[serde(rename = "UA")]
    pub user_agent: String,
}

/// Where generated images are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// Root directory; one `YYYY_MM_DD` folder is created beneath it per day.
    #[serde(default = "default_save_root")]
    pub save_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_root: default_save_root(),
        }
    }
}

/// Bounded retry settings for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed wait between attempts, in seconds.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl RetryConfig {
    /// Converts the settings into a [`RetryPolicy`].
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.delay_secs))
    }
}

/// Process-wide settings for talking to the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    /// Named endpoint URLs.
    pub url: Endpoints,

    /// Application id and user agent.
    pub other: ClientIdentity,

    /// Mail relay; confirmation emails are skipped when absent.
    #[serde(default)]
    pub mail: Option<MailConfig>,

    /// Output location.
    #[serde(default)]
    pub output: OutputConfig,

    /// Retry policy for upstream calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct ProfileDocument {
    profile: Profile,
}

impl Profile {
    /// Loads the profile from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns `CheckinError::ConfigNotFound` if the file does not exist,
    /// `CheckinError::ConfigParseError` if it is not a valid profile document,
    /// and `CheckinError::ConfigValidationError` if a value is unusable.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = read_config(path)?;
        Self::parse(&contents, path)
    }

    /// Parses a profile document held in memory.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Self::parse(contents, Path::new("<inline profile>"))
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        let document: ProfileDocument =
            toml::from_str(contents).map_err(|e| CheckinError::config_parse(path, e.to_string()))?;
        let profile = document.profile;
        profile.validate()?;
        Ok(profile)
    }

    /// Validates the profile values.
    ///
    /// Checks that:
    /// - every endpoint URL is non-empty
    /// - the application id is non-empty
    /// - `retry.maxAttempts` is at least 1
    /// - the mail relay, when present, has a host and a username
    pub fn validate(&self) -> Result<()> {
        let endpoints = [
            ("accessToken", &self.url.access_token),
            ("lastInfo", &self.url.last_info),
            ("currentCourse", &self.url.current_course),
            ("userInfo", &self.url.user_info),
            ("join", &self.url.join),
            ("image", &self.url.image),
        ];
        for (name, value) in endpoints {
            if value.trim().is_empty() {
                return Err(CheckinError::config_validation(
                    format!("profile.url.{name} must not be empty"),
                    format!("Set profile.url.{name} to the upstream endpoint in your profile.toml"),
                ));
            }
        }

        if self.other.app_id.trim().is_empty() {
            return Err(CheckinError::config_validation(
                "profile.other.wxAppId must not be empty",
                "Set profile.other.wxAppId in your profile.toml",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(CheckinError::config_validation(
                "profile.retry.maxAttempts must be greater than 0",
                "Set profile.retry.maxAttempts to at least 1 in your profile.toml",
            ));
        }

        if let Some(mail) = &self.mail {
            if mail.host.trim().is_empty() || mail.username.trim().is_empty() {
                return Err(CheckinError::config_validation(
                    "profile.mail requires both host and username",
                    "Fill in profile.mail.host and profile.mail.username, or remove the [profile.mail] table",
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// One account as written in the accounts document.
#[derive(Debug, Clone, Deserialize)]
struct AccountEntry {
    openid: String,
    #[serde(default)]
    nid: Option<String>,
    #[serde(default, rename = "cardNo")]
    card_no: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsDocument {
    #[serde(default)]
    user: IndexMap<String, AccountEntry>,
}

/// One configured user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Display name; also the final image's file stem.
    pub name: String,
    /// Opaque identifier exchanged for an access token.
    pub openid: String,
    /// Fallback node id when the server omits one.
    pub nid: Option<String>,
    /// Fallback card number when the server omits one.
    pub card_no: Option<String>,
    /// Address the confirmation image is sent to.
    pub email: Option<String>,
}

impl Account {
    /// Creates an account with no fallbacks and no email.
    #[must_use]
    pub fn new(name: impl Into<String>, openid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            openid: openid.into(),
            nid: None,
            card_no: None,
            email: None,
        }
    }

    /// Sets the fallback node id.
    #[must_use]
    pub fn with_nid(mut self, nid: impl Into<String>) -> Self {
        self.nid = non_empty(Some(nid.into()));
        self
    }

    /// Sets the fallback card number.
    #[must_use]
    pub fn with_card_no(mut self, card_no: impl Into<String>) -> Self {
        self.card_no = non_empty(Some(card_no.into()));
        self
    }

    /// Sets the confirmation email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = non_empty(Some(email.into()));
        self
    }
}

/// All configured accounts, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accounts {
    /// The accounts.
    pub accounts: Vec<Account>,
}

impl Accounts {
    /// Loads the accounts from a specific file path.
    ///
    /// Empty strings for `nid`, `cardNo` and `email` are treated as unset.
    ///
    /// # Errors
    ///
    /// Same cases as [`Profile::load_from_file`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = read_config(path)?;
        Self::parse(&contents, path)
    }

    /// Parses an accounts document held in memory.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Self::parse(contents, Path::new("<inline accounts>"))
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        let document: AccountsDocument =
            toml::from_str(contents).map_err(|e| CheckinError::config_parse(path, e.to_string()))?;

        let accounts = document
            .user
            .into_iter()
            .map(|(name, entry)| Account {
                name,
                openid: entry.openid.trim().to_string(),
                nid: non_empty(entry.nid),
                card_no: non_empty(entry.card_no),
                email: non_empty(entry.email),
            })
            .collect();

        let accounts = Self { accounts };
        accounts.validate()?;
        Ok(accounts)
    }

    /// Validates the accounts.
    ///
    /// Checks that:
    /// - at least one account is configured
    /// - every account has an openid
    /// - no account name is empty or contains a path separator
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(CheckinError::config_validation(
                "no accounts configured",
                "Add at least one [user.<name>] table with an openid to your config.toml",
            ));
        }

        for account in &self.accounts {
            if account.name.trim().is_empty() || account.name.contains(['/', '\\']) {
                return Err(CheckinError::config_validation(
                    format!("account name '{}' cannot be used as a file name", account.name),
                    "Rename the [user.<name>] table to a plain name without slashes",
                ));
            }
            if account.openid.is_empty() {
                return Err(CheckinError::config_validation(
                    format!("user.{}.openid must not be empty", account.name),
                    format!("Set user.{}.openid in your config.toml", account.name),
                ));
            }
        }

        Ok(())
    }

    /// Keeps only the named accounts, preserving document order.
    ///
    /// Returns the names that matched no account.
    pub fn retain_named(&mut self, names: &[String]) -> Vec<String> {
        let missing = names
            .iter()
            .filter(|name| !self.accounts.iter().any(|a| &a.name == *name))
            .cloned()
            .collect();
        self.accounts.retain(|a| names.contains(&a.name));
        missing
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no accounts are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Iterates over the accounts.
    pub fn iter(&self) -> std::slice::Iter<'_, Account> {
        self.accounts.iter()
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CheckinError::config_not_found(path)
        } else {
            CheckinError::config_parse(path, format!("failed to read file: {e}"))
        }
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
