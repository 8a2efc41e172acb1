//! Check-in Orchestrator
//!
//! Loads the profile and accounts, talks to the upstream check-in service,
//! and drives each account from token exchange to confirmation email.

pub mod api;
pub mod config;
pub mod error;
pub mod retry;
pub mod rewards;
pub mod run_state;
pub mod runner;

pub use api::{
    extract_access_token, AccessToken, ApiClient, CheckInData, CheckInInfo, JoinReceipt,
    RewardManifest, Score,
};
pub use config::{
    Account, Accounts, ClientIdentity, Endpoints, OutputConfig, Profile, RetryConfig,
    ACCOUNTS_FILE_NAME, PROFILE_FILE_NAME,
};
pub use error::{CheckinError, Result};
pub use retry::{with_retry, RetryPolicy};
pub use rewards::{
    download_reward_images, final_image_path, reward_image_url, work_dir_for, DATE_FOLDER_FORMAT,
};
pub use run_state::{AccountRun, BatchSummary, RunStep};
pub use runner::Runner;
