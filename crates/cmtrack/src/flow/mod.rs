//! Frame-to-frame point tracking with forward-backward validation.

mod lucas_kanade;

pub use lucas_kanade::LucasKanade;

use image::GrayImage;
use nalgebra::Point2;

use crate::keypoint::Keypoint;

/// Output of one optical-flow pass, parallel to the input points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowResult {
    /// Tracked locations (meaningless where `status` is false).
    pub points: Vec<Point2<f32>>,
    /// Per-point success flag.
    pub status: Vec<bool>,
}

/// Sparse optical-flow primitive.
pub trait OpticalFlow: Send {
    /// Track `points` from `prev` into `curr`.
    fn track(&self, prev: &GrayImage, curr: &GrayImage, points: &[Point2<f32>]) -> FlowResult;
}

/// Keypoints that survived forward-backward validation.
#[derive(Debug, Clone, Default)]
pub struct TrackedKeypoints {
    /// Surviving keypoints at their new location, class ids preserved.
    pub keypoints: Vec<Keypoint>,
    /// Per-input survival flag.
    pub status: Vec<bool>,
}

/// Advance `keypoints` from `prev` to `curr`, keeping only points whose
/// forward-then-backward round trip returns within `thr_fb` pixels.
pub fn track_forward_backward(
    flow: &dyn OpticalFlow,
    prev: &GrayImage,
    curr: &GrayImage,
    keypoints: &[Keypoint],
    thr_fb: f32,
) -> TrackedKeypoints {
    if keypoints.is_empty() {
        return TrackedKeypoints::default();
    }
    let points: Vec<Point2<f32>> = keypoints.iter().map(|kp| kp.pt).collect();
    let forward = flow.track(prev, curr, &points);
    let backward = flow.track(curr, prev, &forward.points);

    let mut out = TrackedKeypoints {
        keypoints: Vec::with_capacity(keypoints.len()),
        status: Vec::with_capacity(keypoints.len()),
    };
    for (i, kp) in keypoints.iter().enumerate() {
        let advanced = match (
            forward.status.get(i),
            forward.points.get(i),
            backward.status.get(i),
            backward.points.get(i),
        ) {
            (Some(true), Some(fwd), Some(true), Some(back)) if (*back - kp.pt).norm() <= thr_fb => {
                Some(*fwd)
            }
            _ => None,
        };
        out.status.push(advanced.is_some());
        if let Some(pt) = advanced {
            out.keypoints.push(kp.moved_to(pt));
        }
    }
    tracing::trace!(
        input = keypoints.len(),
        kept = out.keypoints.len(),
        "forward-backward flow"
    );
    out
}
