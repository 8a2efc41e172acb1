//! Fixed overlay geometry for the confirmation image.
//!
//! Every offset and size is a fraction of the background's pixel dimensions,
//! truncated toward zero, so the layout holds for any background resolution.

use crate::{ImagingError, RewardImage, Result};

/// Number of collect markers pasted in a row.
pub const COLLECT_MARKER_COUNT: u32 = 5;

/// A single paste of a resized source onto the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Which source image is pasted.
    pub image: RewardImage,
    /// Left edge on the background.
    pub x: u32,
    /// Top edge on the background.
    pub y: u32,
    /// Width the source is resized to.
    pub width: u32,
    /// Height the source is resized to.
    pub height: u32,
}

/// Complete set of placements for one background size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayout {
    /// Background width in pixels.
    pub background_width: u32,
    /// Background height in pixels.
    pub background_height: u32,
    /// Placements in paste order: badge, score bar, then the marker row.
    pub placements: Vec<Placement>,
}

impl OverlayLayout {
    /// Computes the layout for a background of the given size.
    ///
    /// Returns [`ImagingError::BackgroundTooSmall`] when any overlay would be
    /// resized to zero pixels.
    #[allow(clippy::suboptimal_flops)]
    pub fn for_background(width: u32, height: u32) -> Result<Self> {
        let w = f64::from(width);
        let h = f64::from(height);

        let mut placements = vec![
            Placement {
                image: RewardImage::Badge,
                x: truncate(w * 0.32),
                y: truncate(h * 0.86),
                width: truncate(w * 0.346),
                height: truncate(h * 0.08),
            },
            Placement {
                image: RewardImage::ScoreBar,
                x: truncate(w * 0.32),
                y: truncate(h * 0.64),
                width: truncate(w * 0.346),
                height: truncate(h * 0.05),
            },
        ];

        placements.extend((0..COLLECT_MARKER_COUNT).map(|i| Placement {
            image: RewardImage::CollectMarker,
            x: truncate(w * (0.15 + 0.15 * f64::from(i))),
            y: truncate(h * 0.545),
            width: truncate(w * 0.1),
            height: truncate(h * 0.52 * 0.1),
        }));

        if placements.iter().any(|p| p.width == 0 || p.height == 0) {
            return Err(ImagingError::BackgroundTooSmall { width, height });
        }

        Ok(Self {
            background_width: width,
            background_height: height,
            placements,
        })
    }

    /// Returns the placements for one source image.
    pub fn placements_for(&self, image: RewardImage) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(move |p| p.image == image)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate(value: f64) -> u32 {
    value as u32
}
