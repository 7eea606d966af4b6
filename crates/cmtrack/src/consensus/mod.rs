//! Geometric consensus over classified keypoints.
//!
//! Pipeline:
//! 1. **Pairwise** – scale and rotation from every pair of distinct classes.
//! 2. **Voting** – each keypoint votes for the object center.
//! 3. **Clustering** – single-linkage tree over votes, cut at the outlier
//!    distance; the largest flat cluster is the consensus.

mod cluster;
mod pairwise;
mod voting;

pub use cluster::{dominant_cluster, flat_cut, single_linkage, Cluster};
pub use pairwise::{estimate_scale_rotation, ScaleRotation};
pub use voting::cast_votes;

use nalgebra::{Point2, Vector2};

use crate::config::ConsensusConfig;
use crate::database::KeypointDatabase;
use crate::keypoint::Keypoint;

/// Agreed object pose and the keypoints that support it.
#[derive(Debug, Clone)]
pub struct Consensus {
    /// Mean vote of the dominant cluster.
    pub center: Point2<f32>,
    pub scale: f32,
    pub rotation: f32,
    /// Keypoints whose votes fell in the dominant cluster.
    pub inliers: Vec<Keypoint>,
    /// Remaining keypoints, including unclassified ones.
    pub outliers: Vec<Keypoint>,
    /// Votes of the classified keypoints, in input order.
    pub votes: Vec<Point2<f32>>,
}

/// Estimate center, scale and rotation from `keypoints`.
///
/// Returns `None` when fewer than two keypoints carry a known class, when no
/// pair constrains the geometry, or when the dominant cluster is smaller than
/// `cfg.min_cluster_size`.
pub fn estimate(
    db: &KeypointDatabase,
    keypoints: &[Keypoint],
    cfg: &ConsensusConfig,
) -> Option<Consensus> {
    let (classified, mut outliers): (Vec<Keypoint>, Vec<Keypoint>) = keypoints
        .iter()
        .copied()
        .partition(|kp| kp.class_index().is_some_and(|c| c < db.len()));
    if classified.len() < 2 {
        return None;
    }

    let sr = estimate_scale_rotation(db, &classified, cfg)?;
    let votes = cast_votes(db, &classified, sr.scale, sr.rotation);
    if votes.iter().any(|v| !v.x.is_finite() || !v.y.is_finite()) {
        return None;
    }

    let merges = single_linkage(&votes);
    let labels = flat_cut(&merges, votes.len(), cfg.thr_outlier);
    let (dominant, size) = dominant_cluster(&labels)?;
    if size < cfg.min_cluster_size {
        tracing::trace!(size, "dominant cluster too small");
        return None;
    }

    let mut sum = Vector2::<f32>::zeros();
    let mut inliers = Vec::with_capacity(size);
    for ((kp, vote), &label) in classified.iter().zip(&votes).zip(&labels) {
        if label == dominant {
            sum += vote.coords;
            inliers.push(*kp);
        } else {
            outliers.push(*kp);
        }
    }
    let center = Point2::from(sum / size as f32);

    tracing::trace!(
        inliers = inliers.len(),
        outliers = outliers.len(),
        scale = sr.scale,
        rotation = sr.rotation,
        "consensus"
    );
    Some(Consensus {
        center,
        scale: sr.scale,
        rotation: sr.rotation,
        inliers,
        outliers,
        votes,
    })
}
