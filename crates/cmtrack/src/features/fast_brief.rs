use image::GrayImage;
use imageproc::corners::corners_fast9;
use rand::prelude::*;

use super::FeatureBackend;
use crate::config::FastBriefConfig;
use crate::geometry::BoundingBox;
use crate::keypoint::{Descriptor, Features, Keypoint};

/// Half-size of the square BRIEF sampling patch.
const HALF_PATCH: i32 = 15;

/// FAST-9 corners described by 256-bit BRIEF on a Gaussian-smoothed frame.
pub struct FastBrief {
    config: FastBriefConfig,
    /// Intensity comparison pairs, offsets relative to the keypoint.
    pattern: Vec<[(i32, i32); 2]>,
}

impl FastBrief {
    pub fn new(config: FastBriefConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.pattern_seed);
        let pattern = (0..Descriptor::BITS)
            .map(|_| {
                let mut offset = || {
                    (
                        rng.gen_range(-HALF_PATCH..=HALF_PATCH),
                        rng.gen_range(-HALF_PATCH..=HALF_PATCH),
                    )
                };
                [offset(), offset()]
            })
            .collect();
        Self { config, pattern }
    }

    pub fn config(&self) -> &FastBriefConfig {
        &self.config
    }

    fn suppress_non_maxima(&self, mut keypoints: Vec<Keypoint>) -> Vec<Keypoint> {
        keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.pt.y.total_cmp(&b.pt.y))
                .then(a.pt.x.total_cmp(&b.pt.x))
        });
        let r2 = self.config.nms_radius * self.config.nms_radius;
        let mut kept: Vec<Keypoint> = Vec::with_capacity(keypoints.len());
        for kp in keypoints {
            if let Some(max) = self.config.max_keypoints {
                if kept.len() >= max {
                    break;
                }
            }
            if r2 > 0.0 && kept.iter().any(|k| (k.pt - kp.pt).norm_squared() <= r2) {
                continue;
            }
            kept.push(kp);
        }
        kept
    }

    fn describe(&self, smoothed: &GrayImage, x: i32, y: i32) -> Descriptor {
        let mut desc = Descriptor::zeros();
        for (bit, [(ax, ay), (bx, by)]) in self.pattern.iter().enumerate() {
            let a = smoothed.get_pixel((x + ax) as u32, (y + ay) as u32)[0];
            let b = smoothed.get_pixel((x + bx) as u32, (y + by) as u32)[0];
            if a < b {
                desc.set_bit(bit);
            }
        }
        desc
    }
}

impl Default for FastBrief {
    fn default() -> Self {
        Self::new(FastBriefConfig::default())
    }
}

impl FeatureBackend for FastBrief {
    fn detect(&self, frame: &GrayImage, region: Option<&BoundingBox>) -> Vec<Keypoint> {
        let candidates: Vec<Keypoint> = corners_fast9(frame, self.config.fast_threshold)
            .into_iter()
            .map(|c| {
                let mut kp = Keypoint::new(c.x as f32, c.y as f32);
                kp.response = c.score;
                kp
            })
            .filter(|kp| region.map_or(true, |r| r.contains_strict(&kp.pt)))
            .collect();
        let n_candidates = candidates.len();
        let keypoints = self.suppress_non_maxima(candidates);
        tracing::trace!(
            candidates = n_candidates,
            kept = keypoints.len(),
            "FAST detection"
        );
        keypoints
    }

    fn compute(&self, frame: &GrayImage, keypoints: &[Keypoint]) -> Features {
        let (w, h) = (frame.width() as i32, frame.height() as i32);
        let mut out = Features::default();
        if w <= 2 * HALF_PATCH || h <= 2 * HALF_PATCH {
            return out;
        }
        let smoothed = if self.config.blur_sigma > 0.0 {
            imageproc::filter::gaussian_blur_f32(frame, self.config.blur_sigma)
        } else {
            frame.clone()
        };
        for kp in keypoints {
            let x = kp.pt.x.round() as i32;
            let y = kp.pt.y.round() as i32;
            if x < HALF_PATCH || y < HALF_PATCH || x + HALF_PATCH >= w || y + HALF_PATCH >= h {
                continue;
            }
            out.push(*kp, self.describe(&smoothed, x, y));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blank_frame, block_texture, frame_with_patch};

    #[test]
    fn blank_frame_has_no_keypoints() {
        let fb = FastBrief::default();
        assert!(fb.detect(&blank_frame(120, 100), None).is_empty());
    }

    #[test]
    fn textured_patch_yields_keypoints_near_patch() {
        let fb = FastBrief::default();
        let patch = block_texture(50, 3);
        let frame = frame_with_patch(300, 240, &patch, [100, 100]);
        let kps = fb.detect(&frame, None);
        assert!(kps.len() >= 10, "only {} keypoints", kps.len());
        for kp in &kps {
            assert!(kp.pt.x >= 96.0 && kp.pt.x <= 154.0);
            assert!(kp.pt.y >= 96.0 && kp.pt.y <= 154.0);
        }
    }

    #[test]
    fn region_restricts_detection() {
        let fb = FastBrief::default();
        let frame = frame_with_patch(300, 240, &block_texture(50, 3), [100, 100]);
        let region = BoundingBox::new(100.0, 100.0, 25.0, 25.0);
        let kps = fb.detect(&frame, Some(&region));
        assert!(kps.iter().all(|kp| region.contains_strict(&kp.pt)));
        assert!(kps.len() < fb.detect(&frame, None).len());
    }

    #[test]
    fn nms_keeps_keypoints_apart() {
        let fb = FastBrief::default();
        let frame = frame_with_patch(300, 240, &block_texture(50, 9), [100, 100]);
        let kps = fb.detect(&frame, None);
        let r = fb.config().nms_radius;
        for (i, a) in kps.iter().enumerate() {
            for b in &kps[i + 1..] {
                assert!((a.pt - b.pt).norm() > r);
            }
        }
    }

    #[test]
    fn compute_drops_border_keypoints() {
        let fb = FastBrief::default();
        let frame = blank_frame(100, 100);
        let kps = [Keypoint::new(2.0, 50.0), Keypoint::new(50.0, 50.0), Keypoint::new(50.0, 90.0)];
        let feats = fb.compute(&frame, &kps);
        assert_eq!(feats.len(), 1);
        assert_eq!(feats.keypoints[0].pt.x, 50.0);
        assert_eq!(feats.keypoints[0].pt.y, 50.0);
    }

    #[test]
    fn descriptors_follow_a_translated_patch() {
        let fb = FastBrief::default();
        let patch = block_texture(50, 3);
        let a = frame_with_patch(300, 240, &patch, [100, 100]);
        let b = frame_with_patch(300, 240, &patch, [120, 100]);
        let fa = fb.detect_and_compute(&a, None);
        let fb_feats = fb.detect_and_compute(&b, None);
        assert_eq!(fa.len(), fb_feats.len());
        for (i, kp) in fa.keypoints.iter().enumerate() {
            let moved = fb_feats.keypoints[i];
            assert_eq!(moved.pt.x, kp.pt.x + 20.0);
            assert_eq!(moved.pt.y, kp.pt.y);
            assert_eq!(fa.descriptors[i], fb_feats.descriptors[i]);
        }
    }

    #[test]
    fn pattern_is_reproducible() {
        let a = FastBrief::default();
        let b = FastBrief::default();
        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.pattern.len(), Descriptor::BITS as usize);
    }
}
