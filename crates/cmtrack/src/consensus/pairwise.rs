//! Scale and rotation from pairwise keypoint geometry.

use crate::config::{Aggregator, ConsensusConfig};
use crate::database::KeypointDatabase;
use crate::geometry::{mean, median, wrap_angle};
use crate::keypoint::Keypoint;

/// Similarity parameters relative to the reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRotation {
    pub scale: f32,
    /// Radians in `(-π, π]`.
    pub rotation: f32,
    /// Pairs that survived the scale-ratio filter.
    pub pairs: usize,
}

/// Estimate scale and rotation from every pair of keypoints with distinct
/// classes.
///
/// Each pair compares its current distance and direction with the reference
/// tables. Pairs whose scale is far from the median scale are dropped, the
/// rest are aggregated with `cfg.aggregator`. Returns `None` with fewer than
/// two keypoints or when no pair has a usable reference distance.
pub fn estimate_scale_rotation(
    db: &KeypointDatabase,
    keypoints: &[Keypoint],
    cfg: &ConsensusConfig,
) -> Option<ScaleRotation> {
    if keypoints.len() < 2 {
        return None;
    }
    if !cfg.estimate_scale && !cfg.estimate_rotation {
        return Some(ScaleRotation {
            scale: 1.0,
            rotation: 0.0,
            pairs: 0,
        });
    }

    let mut scales = Vec::new();
    let mut deltas = Vec::new();
    for (i, a) in keypoints.iter().enumerate() {
        let Some(ca) = a.class_index().filter(|&c| c < db.len()) else {
            continue;
        };
        for b in &keypoints[i + 1..] {
            let Some(cb) = b.class_index().filter(|&c| c < db.len()) else {
                continue;
            };
            if ca == cb {
                continue;
            }
            let ref_dist = db.distance(ca, cb);
            if !(ref_dist.is_finite() && ref_dist > 0.0) {
                continue;
            }
            let v = b.pt - a.pt;
            scales.push(v.norm() / ref_dist);
            deltas.push(wrap_angle(v.y.atan2(v.x) - db.angle(ca, cb)));
        }
    }
    if scales.is_empty() {
        return None;
    }

    let med_scale = median(&mut scales.clone())?;
    let tolerance = cfg.thr_ratio * med_scale;
    let (kept_scales, kept_deltas): (Vec<f32>, Vec<f32>) = scales
        .into_iter()
        .zip(deltas)
        .filter(|(s, _)| (s - med_scale).abs() <= tolerance)
        .unzip();
    let pairs = kept_scales.len();

    let aggregate = |mut values: Vec<f32>| match cfg.aggregator {
        Aggregator::Median => median(&mut values),
        Aggregator::Mean => mean(&values),
    };
    let scale = if cfg.estimate_scale {
        aggregate(kept_scales)?
    } else {
        1.0
    };
    let rotation = if cfg.estimate_rotation {
        aggregate(kept_deltas)?
    } else {
        0.0
    };
    tracing::trace!(pairs, scale, rotation, "pairwise scale/rotation");
    Some(ScaleRotation {
        scale,
        rotation,
        pairs,
    })
}
