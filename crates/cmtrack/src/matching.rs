//! Descriptor correspondence between a frame and the keypoint database.

use nalgebra::Point2;

use crate::config::MatchConfig;
use crate::consensus::Consensus;
use crate::database::KeypointDatabase;
use crate::features::{DescriptorMatch, FeatureBackend};
use crate::geometry::rotate;
use crate::keypoint::{Features, Keypoint};

/// Pose estimated from flow-tracked keypoints before matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    pub center: Point2<f32>,
    pub scale: f32,
    pub rotation: f32,
}

impl From<&Consensus> for Prior {
    fn from(c: &Consensus) -> Self {
        Self {
            center: c.center,
            scale: c.scale,
            rotation: c.rotation,
        }
    }
}

/// Classified keypoints found by descriptor matching.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub keypoints: Vec<Keypoint>,
    /// Matches accepted by the global step.
    pub global: usize,
    /// Matches accepted by the local step.
    pub local: usize,
}

/// Ratio of best to second-best descriptor distance.
///
/// A missing runner-up counts as the maximum distance. Two perfect matches
/// are ambiguous and yield `1`.
fn distance_ratio(best: u32, second: Option<u32>, bits: u32) -> f32 {
    let second = second.unwrap_or(bits);
    if second == 0 {
        1.0
    } else {
        best as f32 / second as f32
    }
}

/// Match `features` against the database.
///
/// The global step compares with every database descriptor (background
/// included) and accepts unambiguous, confident matches to object classes.
/// With a `prior`, a local step compares with the object descriptors only,
/// restricted to classes whose predicted center lies within `radius` of the
/// prior center; an accepted local match replaces earlier matches of the
/// same class.
pub fn match_features(
    backend: &dyn FeatureBackend,
    db: &KeypointDatabase,
    features: &Features,
    prior: Option<&Prior>,
    cfg: &MatchConfig,
    radius: f32,
) -> MatchResult {
    let mut out = MatchResult::default();
    if features.is_empty() {
        return out;
    }
    let bits = backend.descriptor_bits();
    let confidence = |d: u32| 1.0 - d as f32 / bits as f32;

    let global = backend.knn_match(&features.descriptors, db.match_descriptors(), 2);
    let local = match prior {
        Some(_) if cfg.local_matching => {
            backend.knn_match(&features.descriptors, db.selected_descriptors(), db.len())
        }
        _ => Vec::new(),
    };

    for (qi, kp) in features.keypoints.iter().enumerate() {
        if let Some(candidates) = global.get(qi) {
            if let Some(best) = candidates.first() {
                let ratio = distance_ratio(
                    best.distance,
                    candidates.get(1).map(|m| m.distance),
                    bits,
                );
                let class = db.match_classes()[best.train_idx];
                if class >= 0 && ratio < cfg.match_ratio && confidence(best.distance) > cfg.thr_conf
                {
                    out.keypoints.push(kp.with_class(class));
                    out.global += 1;
                }
            }
        }

        let (Some(prior), Some(candidates)) = (prior, local.get(qi)) else {
            continue;
        };
        let mut consistent = candidates
            .iter()
            .filter(|m| predicts_center(db, kp, m, prior, radius));
        let Some(best) = consistent.next() else {
            continue;
        };
        let ratio = distance_ratio(best.distance, consistent.next().map(|m| m.distance), bits);
        if ratio < cfg.match_ratio && confidence(best.distance) > cfg.thr_conf {
            let class = best.train_idx as i32;
            out.keypoints.retain(|k| k.class_id != class);
            out.keypoints.push(kp.with_class(class));
            out.local += 1;
        }
    }
    tracing::trace!(
        detected = features.len(),
        global = out.global,
        local = out.local,
        "descriptor matching"
    );
    out
}

fn predicts_center(
    db: &KeypointDatabase,
    kp: &Keypoint,
    m: &DescriptorMatch,
    prior: &Prior,
    radius: f32,
) -> bool {
    let predicted = kp.pt - rotate(db.spring(m.train_idx), prior.rotation) * prior.scale;
    (predicted - prior.center).norm() < radius
}

/// Append tracked keypoints whose class has no match yet.
pub fn merge_tracked(mut matched: Vec<Keypoint>, tracked: &[Keypoint]) -> Vec<Keypoint> {
    let missing: Vec<Keypoint> = tracked
        .iter()
        .filter(|t| !matched.iter().any(|m| m.class_id == t.class_id))
        .copied()
        .collect();
    matched.extend(missing);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::keypoint::Descriptor;
    use crate::test_utils::{blank_frame, ScriptedBackend};

    /// Three background keypoints followed by four object keypoints; the
    /// descriptor of the `i`-th keypoint has only bit `i` set.
    fn database() -> (ScriptedBackend, KeypointDatabase) {
        let backend = ScriptedBackend(vec![
            Keypoint::new(5.0, 5.0),
            Keypoint::new(150.0, 5.0),
            Keypoint::new(5.0, 150.0),
            Keypoint::new(40.0, 40.0),
            Keypoint::new(60.0, 40.0),
            Keypoint::new(60.0, 60.0),
            Keypoint::new(40.0, 60.0),
        ]);
        let db = KeypointDatabase::build(
            &backend,
            &blank_frame(1, 1),
            BoundingBox::new(30.0, 30.0, 40.0, 40.0),
        )
        .unwrap();
        (backend, db)
    }

    fn bit(i: usize) -> Descriptor {
        let mut d = Descriptor::zeros();
        d.set_bit(i);
        d
    }

    fn features(entries: &[(f32, f32, Descriptor)]) -> Features {
        let mut f = Features::default();
        for &(x, y, d) in entries {
            f.push(Keypoint::new(x, y), d);
        }
        f
    }

    #[test]
    fn global_step_accepts_distinctive_object_matches() {
        let (backend, db) = database();
        // bit 4 -> class 1; bit 1 -> background; zeros -> ambiguous.
        let f = features(&[
            (100.0, 100.0, bit(4)),
            (10.0, 10.0, bit(1)),
            (20.0, 20.0, Descriptor::zeros()),
        ]);
        let res = match_features(&backend, &db, &f, None, &MatchConfig::default(), 20.0);
        assert_eq!(res.global, 1);
        assert_eq!(res.local, 0);
        assert_eq!(res.keypoints.len(), 1);
        assert_eq!(res.keypoints[0].class_id, 1);
        assert_eq!(res.keypoints[0].pt, Point2::new(100.0, 100.0));
    }

    #[test]
    fn low_confidence_is_rejected() {
        let (backend, db) = database();
        let mut d = bit(5);
        for i in 100..170 {
            d.set_bit(i);
        }
        let f = features(&[(0.0, 0.0, d)]);
        let res = match_features(&backend, &db, &f, None, &MatchConfig::default(), 20.0);
        assert!(res.keypoints.is_empty());
    }

    #[test]
    fn local_step_resolves_ambiguity_with_the_prior() {
        let (backend, db) = database();
        // Class 2 has spring (10, 10) from the reference center (50, 50).
        let prior = Prior {
            center: Point2::new(200.0, 120.0),
            scale: 1.0,
            rotation: 0.0,
        };
        let f = features(&[(210.0, 130.0, Descriptor::zeros())]);
        let cfg = MatchConfig::default();
        let without = match_features(&backend, &db, &f, None, &cfg, 20.0);
        assert!(without.keypoints.is_empty());

        let with = match_features(&backend, &db, &f, Some(&prior), &cfg, 20.0);
        assert_eq!(with.local, 1);
        assert_eq!(with.keypoints.len(), 1);
        assert_eq!(with.keypoints[0].class_id, 2);
    }

    #[test]
    fn local_match_replaces_global_match_of_same_class() {
        let (backend, db) = database();
        let prior = Prior {
            center: Point2::new(200.0, 120.0),
            scale: 1.0,
            rotation: 0.0,
        };
        // Far away exact descriptor of class 2, then the spatially consistent one.
        let f = features(&[(400.0, 400.0, bit(5)), (210.0, 130.0, bit(5))]);
        let res = match_features(&backend, &db, &f, Some(&prior), &MatchConfig::default(), 20.0);
        let class2: Vec<&Keypoint> = res.keypoints.iter().filter(|k| k.class_id == 2).collect();
        assert_eq!(class2.len(), 1);
        assert_eq!(class2[0].pt, Point2::new(210.0, 130.0));
    }

    #[test]
    fn merge_appends_only_missing_classes() {
        let matched = vec![Keypoint::new(1.0, 1.0).with_class(0)];
        let tracked = [
            Keypoint::new(2.0, 2.0).with_class(0),
            Keypoint::new(3.0, 3.0).with_class(3),
        ];
        let merged = merge_tracked(matched, &tracked);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].pt, Point2::new(1.0, 1.0));
        assert_eq!(merged[1].class_id, 3);
    }

    #[test]
    fn distance_ratio_edge_cases() {
        assert_eq!(distance_ratio(0, Some(0), 256), 1.0);
        assert_eq!(distance_ratio(2, Some(4), 256), 0.5);
        assert_eq!(distance_ratio(64, None, 256), 0.25);
    }
}
