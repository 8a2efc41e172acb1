//! Compositing of downloaded reward images.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, info, instrument};

use crate::layout::OverlayLayout;
use crate::{ImagingError, Result, RewardImage};

/// Composites the reward images found in `work_dir` into `<name>.jpg`.
///
/// The badge, score bar and collect markers are resized relative to the
/// background and alpha-blended onto it. The output keeps the background's
/// dimensions. Once the composite is written, the four source files are
/// removed so the directory only holds final images.
///
/// Returns the path of the written composite.
///
/// # Errors
///
/// Returns [`ImagingError::Open`] if any source is missing or corrupt; in that
/// case nothing is written and no source is removed.
#[instrument(skip(work_dir), fields(work_dir = %work_dir.display()))]
pub fn compose_reward_image(work_dir: &Path, name: &str) -> Result<PathBuf> {
    let mut canvas = open_source(work_dir, RewardImage::Background)?;
    let badge = open_source(work_dir, RewardImage::Badge)?;
    let score_bar = open_source(work_dir, RewardImage::ScoreBar)?;
    let collect_marker = open_source(work_dir, RewardImage::CollectMarker)?;

    let layout = OverlayLayout::for_background(canvas.width(), canvas.height())?;
    debug!(
        width = layout.background_width,
        height = layout.background_height,
        "Compositing reward images"
    );

    for placement in &layout.placements {
        let source = match placement.image {
            RewardImage::Badge => &badge,
            RewardImage::ScoreBar => &score_bar,
            RewardImage::CollectMarker => &collect_marker,
            RewardImage::Background => continue,
        };
        let resized = imageops::resize(
            source,
            placement.width,
            placement.height,
            FilterType::CatmullRom,
        );
        imageops::overlay(
            &mut canvas,
            &resized,
            i64::from(placement.x),
            i64::from(placement.y),
        );
    }

    let output = work_dir.join(format!("{name}.jpg"));
    DynamicImage::ImageRgba8(canvas)
        .to_rgb8()
        .save_with_format(&output, ImageFormat::Jpeg)
        .map_err(|source| ImagingError::Save {
            path: output.clone(),
            source,
        })?;
    info!(path = %output.display(), "Composite image saved");

    for image in RewardImage::ALL {
        std::fs::remove_file(work_dir.join(image.file_name()))?;
    }

    Ok(output)
}

fn open_source(work_dir: &Path, image: RewardImage) -> Result<RgbaImage> {
    let path = work_dir.join(image.file_name());
    image::open(&path)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|source| ImagingError::Open { path, source })
}
