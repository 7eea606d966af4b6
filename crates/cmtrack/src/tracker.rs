//! High-level tracking API.
//!
//! [`ConsensusTracker`] owns the reference model and the per-frame state.
//! Initialize once with a bounding box, then feed consecutive frames.

use image::{GrayImage, RgbaImage};
use nalgebra::Point2;

use crate::config::TrackerConfig;
use crate::consensus::{self, Consensus};
use crate::database::KeypointDatabase;
use crate::error::{ConfigError, InitError};
use crate::features::{FastBrief, FeatureBackend};
use crate::flow::{track_forward_backward, LucasKanade, OpticalFlow};
use crate::geometry::{draw_overlay, BoundingBox, Quadrilateral};
use crate::keypoint::Keypoint;
use crate::matching::{match_features, merge_tracked, Prior};
use crate::result::{FrameCounts, FrameReport, TrackingState};

/// Consensus-based matching and tracking of a single object.
///
/// # Examples
///
/// ```no_run
/// use cmtrack::{ConsensusTracker, TrackerConfig};
/// use image::GrayImage;
///
/// let mut tracker = ConsensusTracker::new(TrackerConfig::default()).unwrap();
/// let first = GrayImage::new(640, 480);
/// tracker.initialize(&first, 100.0, 100.0, 50.0, 50.0).unwrap();
/// let next = GrayImage::new(640, 480);
/// let report = tracker.process_frame(&next);
/// println!("has_result={} box={:?}", report.has_result, report.bounding_box);
/// ```
pub struct ConsensusTracker {
    config: TrackerConfig,
    features: Box<dyn FeatureBackend>,
    flow: Box<dyn OpticalFlow>,
    session: Option<Session>,
    last_report: Option<FrameReport>,
}

/// State that exists only between a successful initialization and `reset`.
struct Session {
    db: KeypointDatabase,
    prev_frame: GrayImage,
    active: Vec<Keypoint>,
    outliers: Vec<Keypoint>,
    state: TrackingState,
    frame_index: u64,
    /// Estimate of the last frame, `None` when it had no result.
    estimate: Option<Estimate>,
    /// Last known box and quadrilateral (held while lost).
    bounding_box: BoundingBox,
    quadrilateral: Quadrilateral,
}

#[derive(Debug, Clone, Copy)]
struct Estimate {
    center: Point2<f32>,
    scale: f32,
    rotation: f32,
}

impl ConsensusTracker {
    /// Tracker with the built-in FAST/BRIEF features and Lucas-Kanade flow.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        let features = Box::new(FastBrief::new(config.features.clone()));
        let flow = Box::new(LucasKanade::new(config.flow.lucas_kanade.clone()));
        Self::with_backends(config, features, flow)
    }

    /// Tracker with caller-provided collaborators.
    pub fn with_backends(
        config: TrackerConfig,
        features: Box<dyn FeatureBackend>,
        flow: Box<dyn OpticalFlow>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            features,
            flow,
            session: None,
            last_report: None,
        })
    }

    /// Access the current configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Build the reference model from the `width`×`height` box at `(x, y)`.
    ///
    /// Returns the number of reference keypoints. On error the tracker is
    /// left uninitialized.
    pub fn initialize(
        &mut self,
        gray: &GrayImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<usize, InitError> {
        self.initialize_region(gray, BoundingBox::new(x, y, width, height))
    }

    /// Same as [`Self::initialize`] with a [`BoundingBox`].
    pub fn initialize_region(
        &mut self,
        gray: &GrayImage,
        region: BoundingBox,
    ) -> Result<usize, InitError> {
        self.reset();
        let db = match KeypointDatabase::build(self.features.as_ref(), gray, region) {
            Ok(db) => db,
            Err(e) => {
                tracing::warn!("initialization failed: {e}");
                return Err(e);
            }
        };
        let n = db.len();
        tracing::info!(
            keypoints = n,
            background = db.num_background(),
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "tracker initialized"
        );
        self.session = Some(Session {
            prev_frame: gray.clone(),
            active: db.selected_keypoints().to_vec(),
            outliers: Vec::new(),
            state: TrackingState::Initialized,
            frame_index: 0,
            estimate: None,
            bounding_box: region,
            quadrilateral: db.geometry().initial_quadrilateral(),
            db,
        });
        Ok(n)
    }

    /// Drop the reference model and all per-frame state.
    pub fn reset(&mut self) {
        self.session = None;
        self.last_report = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the last processed frame produced an estimate.
    pub fn has_result(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.estimate.is_some())
    }

    pub fn state(&self) -> TrackingState {
        self.session
            .as_ref()
            .map_or(TrackingState::Uninitialized, |s| s.state)
    }

    /// Current box, held at its last value while the object is lost.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.session.as_ref().map(|s| s.bounding_box)
    }

    /// Current quadrilateral, held at its last value while the object is lost.
    pub fn quadrilateral(&self) -> Option<Quadrilateral> {
        self.session.as_ref().map(|s| s.quadrilateral)
    }

    pub fn center(&self) -> Option<Point2<f32>> {
        self.estimate().map(|e| e.center)
    }

    pub fn scale(&self) -> Option<f32> {
        self.estimate().map(|e| e.scale)
    }

    /// Rotation in radians relative to the initial frame.
    pub fn rotation(&self) -> Option<f32> {
        self.estimate().map(|e| e.rotation)
    }

    /// Keypoints carried into the next frame.
    pub fn active_keypoints(&self) -> &[Keypoint] {
        match &self.session {
            Some(s) => &s.active,
            None => &[],
        }
    }

    /// Keypoints rejected by the consensus steps of the last frame.
    pub fn outliers(&self) -> &[Keypoint] {
        match &self.session {
            Some(s) => &s.outliers,
            None => &[],
        }
    }

    /// Reference model, once initialized.
    pub fn database(&self) -> Option<&KeypointDatabase> {
        self.session.as_ref().map(|s| &s.db)
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    fn estimate(&self) -> Option<Estimate> {
        self.session.as_ref().and_then(|s| s.estimate)
    }

    /// Track the object into `gray`.
    ///
    /// Before initialization this is a no-op returning a skipped report.
    pub fn process_frame(&mut self, gray: &GrayImage) -> FrameReport {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("process_frame called before initialize; frame ignored");
            let report = FrameReport::skipped(0);
            self.last_report = Some(report.clone());
            return report;
        };
        let cfg = &self.config;
        let db = &session.db;
        session.frame_index += 1;
        let mut counts = FrameCounts::default();

        // 1. Advance the active keypoints with forward-backward flow.
        let tracked = track_forward_backward(
            self.flow.as_ref(),
            &session.prev_frame,
            gray,
            &session.active,
            cfg.flow.thr_fb,
        );
        counts.tracked = tracked.keypoints.len();

        // 2. Prior estimate from the tracked keypoints alone.
        // Tracked keypoints outside its dominant cluster are rejected here.
        let prior = consensus::estimate(db, &tracked.keypoints, &cfg.consensus);
        let prior_pose = prior.as_ref().map(Prior::from);
        let (tracked_keypoints, mut rejected) = match prior {
            Some(c) => (c.inliers, c.outliers),
            None => (tracked.keypoints, Vec::new()),
        };

        // 3. Match fresh features, locally around the prior when available.
        let features = self.features.detect_and_compute(gray, None);
        counts.detected = features.len();
        let matches = match_features(
            self.features.as_ref(),
            db,
            &features,
            prior_pose.as_ref(),
            &cfg.matching,
            cfg.consensus.thr_outlier,
        );
        counts.matched_global = matches.global;
        counts.matched_local = matches.local;
        let merged = merge_tracked(matches.keypoints, &tracked_keypoints);

        // 4. Final consensus on the merged set.
        let consensus = consensus::estimate(db, &merged, &cfg.consensus);
        let min_inliers = cfg.min_active_fraction * db.len() as f32;
        match consensus {
            Some(c) if c.inliers.len() as f32 > min_inliers => {
                let Consensus {
                    center,
                    scale,
                    rotation,
                    inliers,
                    outliers,
                    ..
                } = c;
                session.quadrilateral = db.geometry().place(center, scale, rotation);
                session.bounding_box = session.quadrilateral.bounding_box();
                session.estimate = Some(Estimate {
                    center,
                    scale,
                    rotation,
                });
                session.state = TrackingState::Tracking;
                session.active = inliers;
                rejected.extend(outliers);
            }
            other => {
                session.estimate = None;
                session.state = TrackingState::Lost;
                match other {
                    Some(c) => {
                        tracing::debug!(
                            inliers = c.inliers.len(),
                            required = min_inliers,
                            "consensus too weak"
                        );
                        session.active = c.inliers;
                        rejected.extend(c.outliers);
                    }
                    None => {
                        tracing::debug!(candidates = merged.len(), "no consensus");
                        session.active = merged;
                    }
                }
            }
        }
        session.outliers = rejected;

        // 5. The current frame becomes the flow reference.
        session.prev_frame = gray.clone();

        counts.active = session.active.len();
        counts.outliers = session.outliers.len();
        let report = FrameReport {
            frame_index: session.frame_index,
            state: session.state,
            has_result: session.estimate.is_some(),
            center: session.estimate.map(|e| [e.center.x, e.center.y]),
            scale: session.estimate.map(|e| e.scale),
            rotation: session.estimate.map(|e| e.rotation),
            bounding_box: Some(session.bounding_box),
            quadrilateral: Some(session.quadrilateral),
            counts,
        };
        tracing::debug!(
            frame = report.frame_index,
            has_result = report.has_result,
            detected = counts.detected,
            matched = counts.matched_global + counts.matched_local,
            tracked = counts.tracked,
            active = counts.active,
            "frame processed"
        );
        self.last_report = Some(report.clone());
        report
    }

    /// [`Self::process_frame`], then draw the quadrilateral and the active
    /// keypoints onto `canvas` when the frame has a result.
    pub fn process_frame_with_overlay(
        &mut self,
        gray: &GrayImage,
        canvas: &mut RgbaImage,
    ) -> FrameReport {
        let report = self.process_frame(gray);
        if let (true, Some(session)) = (report.has_result, self.session.as_ref()) {
            draw_overlay(canvas, &session.quadrilateral, &session.active);
        }
        report
    }
}

impl Default for ConsensusTracker {
    fn default() -> Self {
        match Self::new(TrackerConfig::default()) {
            Ok(tracker) => tracker,
            Err(e) => unreachable!("default configuration rejected: {e}"),
        }
    }
}
