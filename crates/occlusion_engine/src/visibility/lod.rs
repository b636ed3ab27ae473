//! Distance-based level-of-detail selection

use crate::core::config::DEFAULT_LOD_DISTANCE_STEP;
use crate::foundation::math::Vec3;
use crate::scene::volumes::AabbVolume;

/// Picks a LOD index from camera distance
///
/// LOD `i` covers distances `[i * step, (i + 1) * step)`; anything beyond the
/// last level uses the last level. LOD 0 is the nearest and most detailed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodSelector {
    distance_step: f32,
}

impl Default for LodSelector {
    fn default() -> Self {
        Self { distance_step: DEFAULT_LOD_DISTANCE_STEP }
    }
}

impl LodSelector {
    /// Create a selector; non-positive or non-finite steps fall back to the default
    pub fn new(distance_step: f32) -> Self {
        if distance_step.is_finite() && distance_step > 0.0 {
            Self { distance_step }
        } else {
            log::warn!("Ignoring invalid LOD distance step {distance_step}, using {DEFAULT_LOD_DISTANCE_STEP}");
            Self::default()
        }
    }

    /// Distance covered by each level
    pub fn distance_step(&self) -> f32 {
        self.distance_step
    }

    /// LOD index for a distance, or `None` when there are no levels
    pub fn select(&self, distance: f32, lod_count: usize) -> Option<usize> {
        let last = lod_count.checked_sub(1)?;
        // Saturating float-to-int cast: NaN maps to 0, huge values to usize::MAX
        let level = (distance.max(0.0) / self.distance_step).floor() as usize;
        Some(level.min(last))
    }

    /// LOD index for a box seen from `eye`, measured to the box center
    pub fn select_for(&self, eye: &Vec3, bounds: &AabbVolume, lod_count: usize) -> Option<usize> {
        self.select((eye - bounds.center()).norm(), lod_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_bands() {
        let selector = LodSelector::default();

        assert_eq!(selector.select(0.0, 3), Some(0));
        assert_eq!(selector.select(199.9, 3), Some(0));
        assert_eq!(selector.select(200.0, 3), Some(1));
        assert_eq!(selector.select(250.0, 3), Some(1));
        assert_eq!(selector.select(10_000.0, 3), Some(2));
    }

    #[test]
    fn test_no_levels() {
        assert_eq!(LodSelector::default().select(10.0, 0), None);
    }

    #[test]
    fn test_monotonic_in_distance() {
        let selector = LodSelector::new(50.0);
        let mut previous = 0;
        for step in 0..1000 {
            let lod = selector.select(step as f32 * 0.75, 5).unwrap();
            assert!(lod >= previous);
            previous = lod;
        }
        assert_eq!(previous, 4);
    }

    #[test]
    fn test_invalid_step_falls_back() {
        assert_eq!(LodSelector::new(0.0).distance_step(), DEFAULT_LOD_DISTANCE_STEP);
        assert_eq!(LodSelector::new(-3.0).distance_step(), DEFAULT_LOD_DISTANCE_STEP);
    }

    #[test]
    fn test_select_for_measures_to_center() {
        let selector = LodSelector::default();
        let bounds = AabbVolume::from_center_extents(Vec3::new(0.0, 0.0, 250.0), Vec3::repeat(10.0)).unwrap();

        assert_eq!(selector.select_for(&Vec3::zeros(), &bounds, 3), Some(1));
        assert_eq!(selector.select_for(&Vec3::new(0.0, 0.0, 250.0), &bounds, 3), Some(0));
    }
}
