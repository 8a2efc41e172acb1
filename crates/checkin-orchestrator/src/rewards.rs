//! Reward image download.
//!
//! The manifest names a base URI; each of the four reward images lives next
//! to it under `images/`. Downloaded files land in a dated working directory
//! and are handed to [`compose_reward_image`].

use std::path::{Path, PathBuf};

use checkin_imaging::{compose_reward_image, RewardImage};
use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::api::{AccessToken, ApiClient, RewardManifest};
use crate::error::Result;

/// Date format of the per-day output folder.
pub const DATE_FOLDER_FORMAT: &str = "%Y_%m_%d";

/// Returns `<save_root>/<YYYY_MM_DD>` for `date`.
#[must_use]
pub fn work_dir_for(save_root: &Path, date: NaiveDate) -> PathBuf {
    save_root.join(date.format(DATE_FOLDER_FORMAT).to_string())
}

/// Returns where the composited image for `name` is written.
#[must_use]
pub fn final_image_path(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join(format!("{name}.jpg"))
}

/// Derives the download URL of `file_name` from the manifest URI.
///
/// The last `/`-separated segment of `uri` is replaced by `images` and the
/// file name appended.
///
/// ```
/// use checkin_orchestrator::reward_image_url;
///
/// assert_eq!(
///     reward_image_url("https://cdn.example.com/h5/2024/index.html", "end.jpg"),
///     "https://cdn.example.com/h5/2024/images/end.jpg"
/// );
/// ```
#[must_use]
pub fn reward_image_url(uri: &str, file_name: &str) -> String {
    match uri.rsplit_once('/') {
        Some((head, _)) => format!("{head}/images/{file_name}"),
        None => format!("images/{file_name}"),
    }
}

/// Downloads the reward images into `work_dir` and composites them.
///
/// Returns `Ok(None)` when the manifest endpoint refuses the request; nothing
/// is composited in that case. An image that fails to download is logged and
/// skipped, which then surfaces as an imaging error during compositing.
#[instrument(skip(client, token), fields(work_dir = %work_dir.display()))]
pub async fn download_reward_images(
    client: &ApiClient,
    token: &AccessToken,
    work_dir: &Path,
    name: &str,
) -> Result<Option<PathBuf>> {
    tokio::fs::create_dir_all(work_dir).await?;

    let uri = match client.fetch_reward_manifest(token).await? {
        RewardManifest::Available { uri } => uri,
        RewardManifest::Unavailable { status } => {
            warn!(status, "Could not get the reward image manifest");
            return Ok(None);
        }
    };

    for image in RewardImage::ALL {
        let file_name = image.file_name();
        let url = reward_image_url(&uri, file_name);
        match client.fetch_reward_image(&url).await? {
            Some(bytes) => {
                tokio::fs::write(work_dir.join(file_name), bytes).await?;
                info!(file = file_name, "Reward image saved");
            }
            None => warn!(file = file_name, "Failed to download reward image"),
        }
    }

    let work_dir = work_dir.to_path_buf();
    let name = name.to_string();
    let output = tokio::task::spawn_blocking(move || compose_reward_image(&work_dir, &name))
        .await
        .map_err(std::io::Error::other)??;

    Ok(Some(output))
}
