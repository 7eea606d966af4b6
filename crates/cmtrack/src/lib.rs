//! cmtrack: consensus-based matching and tracking of a single object.
//!
//! The object is described once by the keypoints inside an initial bounding
//! box. Every following frame runs these stages:
//!
//! 1. **Flow** – forward-backward pyramidal Lucas-Kanade on the active keypoints.
//! 2. **Matching** – FAST/BRIEF descriptors matched globally against the
//!    database and locally around the flow-based prior.
//! 3. **Consensus** – pairwise scale/rotation, center votes, single-linkage
//!    clustering; the dominant cluster is the estimate.
//! 4. **Geometry** – the reference quadrilateral placed by the estimate.
//!
//! # Public API
//! - [`ConsensusTracker`] as the primary entry point
//! - [`TrackerConfig`] and its sections for tuning
//! - [`FeatureBackend`] and [`OpticalFlow`] to swap collaborators
//! - [`FrameReport`] as the serializable per-frame output
//!
//! The consensus building blocks are exposed under [`consensus`] for reuse
//! and benchmarking.

mod config;
pub mod consensus;
mod database;
mod error;
mod features;
mod flow;
mod geometry;
mod keypoint;
mod matching;
mod result;
mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{
    Aggregator, ConsensusConfig, FastBriefConfig, FlowConfig, LucasKanadeConfig, MatchConfig,
    TrackerConfig,
};
pub use database::KeypointDatabase;
pub use error::{ConfigError, InitError};
pub use features::{brute_force_knn, DescriptorMatch, FastBrief, FeatureBackend};
pub use flow::{track_forward_backward, FlowResult, LucasKanade, OpticalFlow, TrackedKeypoints};
pub use geometry::{draw_overlay, rotate, wrap_angle, BoundingBox, Quadrilateral, ReferenceGeometry};
pub use keypoint::{Descriptor, Features, Keypoint, DESCRIPTOR_BYTES, UNCLASSIFIED};
pub use matching::{match_features, merge_tracked, MatchResult, Prior};
pub use result::{FrameCounts, FrameReport, TrackingState};
pub use tracker::ConsensusTracker;
