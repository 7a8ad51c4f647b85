//! Region of interest selection
//!
//! Codes are printed on a horizontal band across the container side, so the
//! default region is a wide strip through the middle of the frame.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Rectangle in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the region lies entirely inside a `frame_width` x `frame_height` frame
    pub fn fits(&self, frame_width: u32, frame_height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(frame_width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(frame_height)
    }

    /// Intersect with the frame; `None` if nothing is left
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        let clamped = Region {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        };
        (!clamped.is_empty()).then_some(clamped)
    }
}

/// Default band: 90% wide with 5% side margins, 40% tall starting 30% down
pub fn default_region(frame_width: u32, frame_height: u32) -> Region {
    let pct = |value: u32, percent: u64| (u64::from(value) * percent / 100) as u32;
    Region {
        x: pct(frame_width, 5),
        y: pct(frame_height, 30),
        width: pct(frame_width, 90),
        height: pct(frame_height, 40),
    }
}

/// Region to crop for this frame.
///
/// A user region is returned unchanged when it fits, clamped to the frame when
/// it overhangs, and replaced by the default band when nothing of it is visible.
pub fn active_region(frame_width: u32, frame_height: u32, user_region: Option<Region>) -> Region {
    let Some(region) = user_region else {
        return default_region(frame_width, frame_height);
    };

    if region.fits(frame_width, frame_height) && !region.is_empty() {
        return region;
    }

    match region.clamp_to(frame_width, frame_height) {
        Some(clamped) => {
            warn!(
                "Region {:?} exceeds {}x{} frame, clamped to {:?}",
                region, frame_width, frame_height, clamped
            );
            clamped
        }
        None => {
            warn!(
                "Region {:?} is outside the {}x{} frame, using default region",
                region, frame_width, frame_height
            );
            default_region(frame_width, frame_height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_region_1280x720() {
        let region = active_region(1280, 720, None);
        assert_eq!(region, Region::new(64, 216, 1152, 288));
        assert!(region.fits(1280, 720));
    }

    #[test]
    fn test_default_region_is_centered() {
        let region = default_region(1000, 500);
        let right_margin = 1000 - (region.x + region.width);
        assert_eq!(region.x, right_margin);
    }

    #[test]
    fn test_default_region_odd_sizes_fit() {
        for (w, h) in [(1, 1), (7, 3), (641, 479), (u32::MAX, u32::MAX)] {
            assert!(default_region(w, h).fits(w, h));
        }
    }

    #[test]
    fn test_user_region_returned_unchanged() {
        let user = Region::new(100, 50, 400, 120);
        assert_eq!(active_region(640, 480, Some(user)), user);
        let full = Region::new(0, 0, 640, 480);
        assert_eq!(active_region(640, 480, Some(full)), full);
    }

    #[test]
    fn test_user_region_clamped() {
        let user = Region::new(600, 400, 200, 200);
        assert_eq!(active_region(640, 480, Some(user)), Region::new(600, 400, 40, 80));
    }

    #[test]
    fn test_user_region_outside_falls_back() {
        let user = Region::new(700, 10, 50, 50);
        assert_eq!(active_region(640, 480, Some(user)), default_region(640, 480));
    }

    #[test]
    fn test_fits_does_not_overflow() {
        let region = Region::new(u32::MAX, 0, u32::MAX, 1);
        assert!(!region.fits(u32::MAX, 1));
        assert!(region.clamp_to(100, 100).is_none());
    }
}
