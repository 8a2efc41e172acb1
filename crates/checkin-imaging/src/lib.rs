//! Check-in Reward Imaging
//!
//! This crate composites the reward images issued by the upstream service after
//! a check-in into a single confirmation image.
//!
//! # Types
//!
//! - [`RewardImage`] - The four named source images and their file names
//! - [`OverlayLayout`] - Where each source lands, relative to the background
//! - [`Placement`] - One resized paste operation
//!
//! # Functions
//!
//! - [`compose_reward_image`] - Composite the sources in a working directory
//!   and remove them afterwards
//!
//! # Example
//!
//! ```rust
//! use checkin_imaging::{OverlayLayout, RewardImage};
//!
//! let layout = OverlayLayout::for_background(1000, 2000).unwrap();
//! let badge = &layout.placements[0];
//! assert_eq!(badge.image, RewardImage::Badge);
//! assert_eq!((badge.x, badge.y, badge.width, badge.height), (320, 1720, 346, 160));
//! ```

mod compose;
mod layout;

pub use compose::compose_reward_image;
pub use layout::{OverlayLayout, Placement, COLLECT_MARKER_COUNT};

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while compositing reward images.
#[derive(Debug, Error)]
pub enum ImagingError {
    /// A source image is missing or could not be decoded.
    #[error("failed to open reward image '{path}': {source}")]
    Open {
        /// Path of the image that failed to open.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The composite could not be encoded or written.
    #[error("failed to save composite image '{path}': {source}")]
    Save {
        /// Destination path of the composite.
        path: PathBuf,
        /// Underlying encoder error.
        #[source]
        source: image::ImageError,
    },

    /// The background is too small for one of the overlays to have a size.
    #[error("background {width}x{height} is too small for the reward layout")]
    BackgroundTooSmall {
        /// Background width in pixels.
        width: u32,
        /// Background height in pixels.
        height: u32,
    },

    /// Failed to remove an intermediate file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for imaging operations.
pub type Result<T> = std::result::Result<T, ImagingError>;

// ============================================================================
// RewardImage
// ============================================================================

/// One of the images the upstream service issues per check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardImage {
    /// Full-size background that every overlay is measured against.
    Background,
    /// Yellow "collected" marker, pasted five times in a row.
    CollectMarker,
    /// Badge pasted near the bottom.
    Badge,
    /// Score bar pasted above the marker row.
    ScoreBar,
}

impl RewardImage {
    /// All reward images, in download order.
    pub const ALL: [Self; 4] = [
        Self::Background,
        Self::CollectMarker,
        Self::Badge,
        Self::ScoreBar,
    ];

    /// File name used both upstream and in the working directory.
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Background => "end.jpg",
            Self::CollectMarker => "collect_yellow.png",
            Self::Badge => "jjh.png",
            Self::ScoreBar => "pinfen.png",
        }
    }
}

impl std::fmt::Display for RewardImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}
