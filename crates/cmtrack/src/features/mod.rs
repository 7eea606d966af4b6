//! Keypoint detection, description and descriptor matching.
//!
//! The tracker reaches these through [`FeatureBackend`]; [`FastBrief`] is the
//! built-in implementation.

mod fast_brief;

pub use fast_brief::FastBrief;

use image::GrayImage;

use crate::geometry::BoundingBox;
use crate::keypoint::{Descriptor, Features, Keypoint};

/// One nearest-neighbour candidate for a query descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    /// Index into the query descriptors.
    pub query_idx: usize,
    /// Index into the train descriptors.
    pub train_idx: usize,
    /// Hamming distance.
    pub distance: u32,
}

/// Detector, descriptor extractor and matcher used by the tracker.
pub trait FeatureBackend: Send {
    /// Detect keypoints, optionally restricted to the interior of `region`.
    fn detect(&self, frame: &GrayImage, region: Option<&BoundingBox>) -> Vec<Keypoint>;

    /// Describe `keypoints`. Keypoints that cannot be described (e.g. too close
    /// to the border) are dropped from the result.
    fn compute(&self, frame: &GrayImage, keypoints: &[Keypoint]) -> Features;

    /// Up to `k` nearest train descriptors per query, closest first.
    fn knn_match(
        &self,
        query: &[Descriptor],
        train: &[Descriptor],
        k: usize,
    ) -> Vec<Vec<DescriptorMatch>> {
        brute_force_knn(query, train, k)
    }

    /// Descriptor length in bits; normalizes match confidence.
    fn descriptor_bits(&self) -> u32 {
        Descriptor::BITS
    }

    /// Detect and describe in one call.
    fn detect_and_compute(&self, frame: &GrayImage, region: Option<&BoundingBox>) -> Features {
        let keypoints = self.detect(frame, region);
        self.compute(frame, &keypoints)
    }
}

/// Exhaustive Hamming k-nearest-neighbour search.
///
/// Ties are broken by the lower train index.
pub fn brute_force_knn(
    query: &[Descriptor],
    train: &[Descriptor],
    k: usize,
) -> Vec<Vec<DescriptorMatch>> {
    query
        .iter()
        .enumerate()
        .map(|(qi, q)| {
            if k >= train.len() {
                // Every candidate is kept; the stable sort leaves ties in index order.
                let mut all: Vec<DescriptorMatch> = train
                    .iter()
                    .enumerate()
                    .map(|(ti, t)| DescriptorMatch {
                        query_idx: qi,
                        train_idx: ti,
                        distance: q.hamming(t),
                    })
                    .collect();
                all.sort_by_key(|m| m.distance);
                return all;
            }
            let mut best: Vec<DescriptorMatch> = Vec::with_capacity(k + 1);
            for (ti, t) in train.iter().enumerate() {
                let distance = q.hamming(t);
                if best.len() == k && best.last().is_some_and(|m| m.distance <= distance) {
                    continue;
                }
                let pos = best.partition_point(|m| m.distance <= distance);
                best.insert(
                    pos,
                    DescriptorMatch {
                        query_idx: qi,
                        train_idx: ti,
                        distance,
                    },
                );
                best.truncate(k);
            }
            best
        })
        .collect()
}
