use crate::geometry::{BoundingBox, Quadrilateral};

/// Lifecycle of a [`crate::ConsensusTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// No reference model yet; frames are ignored.
    #[default]
    Uninitialized,
    /// Reference model built, no frame processed since.
    Initialized,
    /// The last frame produced an estimate.
    Tracking,
    /// The last frame produced no estimate; the box is held.
    Lost,
}

/// Per-stage keypoint counts for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameCounts {
    /// Keypoints detected and described in the frame.
    pub detected: usize,
    /// Accepted global descriptor matches.
    pub matched_global: usize,
    /// Accepted local descriptor matches.
    pub matched_local: usize,
    /// Active keypoints that survived forward-backward flow.
    pub tracked: usize,
    /// Active keypoints carried to the next frame.
    pub active: usize,
    /// Keypoints rejected by the prior or the final consensus.
    pub outliers: usize,
}

/// Serializable summary of one processed frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameReport {
    /// Index of the frame since initialization (the first tracked frame is 1).
    pub frame_index: u64,
    pub state: TrackingState,
    pub has_result: bool,
    /// Estimated object center, present only with a result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    /// Rotation in radians relative to the initial frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    /// Current (or held) axis-aligned box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// Current (or held) quadrilateral.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quadrilateral: Option<Quadrilateral>,
    pub counts: FrameCounts,
}

impl FrameReport {
    /// Report for a frame that was not processed.
    pub fn skipped(frame_index: u64) -> Self {
        Self {
            frame_index,
            state: TrackingState::Uninitialized,
            has_result: false,
            center: None,
            scale: None,
            rotation: None,
            bounding_box: None,
            quadrilateral: None,
            counts: FrameCounts::default(),
        }
    }
}
