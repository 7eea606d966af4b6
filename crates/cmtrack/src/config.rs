//! Tracker tuning parameters.
//!
//! Every section derives serde with `#[serde(default)]`, so a JSON file only
//! needs to list the fields it overrides.

use crate::error::ConfigError;

/// Aggregation used for the pairwise scale and rotation populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Median of the surviving pairs (robust to mismatches).
    Median,
    /// Arithmetic mean (diagnostics only; a handful of bad pairs skews it).
    Mean,
}

/// Descriptor matching gates.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum match confidence `1 - d / bits` (exclusive).
    pub thr_conf: f32,
    /// Maximum best/second-best distance ratio (exclusive).
    pub match_ratio: f32,
    /// Run the spatially constrained local matching step when a prior exists.
    pub local_matching: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            thr_conf: 0.75,
            match_ratio: 0.8,
            local_matching: true,
        }
    }
}

/// Pairwise geometry, voting and clustering.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Single-linkage cut distance (pixels) between votes; also the radius
    /// of the local matching window around the prior center.
    pub thr_outlier: f32,
    /// Pairs whose scale deviates from the median by more than
    /// `thr_ratio * median` are excluded before aggregation.
    pub thr_ratio: f32,
    /// Smallest dominant cluster that still yields an estimate.
    pub min_cluster_size: usize,
    /// Estimate scale (otherwise fixed at 1).
    pub estimate_scale: bool,
    /// Estimate rotation (otherwise fixed at 0).
    pub estimate_rotation: bool,
    /// Aggregation over the surviving pairs.
    pub aggregator: Aggregator,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            thr_outlier: 20.0,
            thr_ratio: 0.5,
            min_cluster_size: 2,
            estimate_scale: true,
            estimate_rotation: true,
            aggregator: Aggregator::Median,
        }
    }
}

/// Pyramidal Lucas-Kanade parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LucasKanadeConfig {
    /// Pyramid levels including the full-resolution image.
    pub levels: usize,
    /// Half-size of the square integration window (pixels).
    pub window_radius: usize,
    /// Maximum Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Stop when the update norm falls below this (pixels).
    pub epsilon: f32,
    /// Minimum eigenvalue of the window structure tensor, normalized by the
    /// window area. Flat windows below it fail.
    pub min_eigenvalue: f32,
}

impl Default for LucasKanadeConfig {
    fn default() -> Self {
        Self {
            levels: 4,
            window_radius: 7,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigenvalue: 1e-4,
        }
    }
}

/// Frame-to-frame point tracking.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Maximum forward-backward round-trip error (pixels).
    pub thr_fb: f32,
    /// Default optical-flow backend parameters.
    pub lucas_kanade: LucasKanadeConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            thr_fb: 20.0,
            lucas_kanade: LucasKanadeConfig::default(),
        }
    }
}

/// Default FAST-9 detector and BRIEF descriptor parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FastBriefConfig {
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Non-maximum suppression radius (pixels); `0` disables suppression.
    pub nms_radius: f32,
    /// Keep at most this many strongest keypoints per frame.
    pub max_keypoints: Option<usize>,
    /// Gaussian sigma applied before BRIEF sampling.
    pub blur_sigma: f32,
    /// Seed of the BRIEF sampling pattern.
    pub pattern_seed: u64,
}

impl Default for FastBriefConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            nms_radius: 3.0,
            max_keypoints: Some(2000),
            blur_sigma: 2.0,
            pattern_seed: 0x434d_5401,
        }
    }
}

/// Top-level tracker configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub matching: MatchConfig,
    pub consensus: ConsensusConfig,
    pub flow: FlowConfig,
    pub features: FastBriefConfig,
    /// A frame has a result only if the consensus keeps more than this
    /// fraction of the initial reference keypoints.
    pub min_active_fraction: f32,
}

impl TrackerConfig {
    /// Check every threshold for range and finiteness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("consensus.thr_outlier", self.consensus.thr_outlier)?;
        positive("consensus.thr_ratio", self.consensus.thr_ratio)?;
        at_least(
            "consensus.min_cluster_size",
            self.consensus.min_cluster_size,
            1,
        )?;
        in_range("matching.thr_conf", self.matching.thr_conf, 0.0, 1.0)?;
        positive("matching.match_ratio", self.matching.match_ratio)?;
        in_range("matching.match_ratio", self.matching.match_ratio, 0.0, 1.0)?;
        positive("flow.thr_fb", self.flow.thr_fb)?;
        let lk = &self.flow.lucas_kanade;
        at_least("flow.lucas_kanade.levels", lk.levels, 1)?;
        at_least("flow.lucas_kanade.window_radius", lk.window_radius, 1)?;
        at_least("flow.lucas_kanade.max_iterations", lk.max_iterations, 1)?;
        positive("flow.lucas_kanade.epsilon", lk.epsilon)?;
        in_range(
            "flow.lucas_kanade.min_eigenvalue",
            lk.min_eigenvalue,
            0.0,
            f32::MAX,
        )?;
        in_range("features.nms_radius", self.features.nms_radius, 0.0, f32::MAX)?;
        in_range("features.blur_sigma", self.features.blur_sigma, 0.0, f32::MAX)?;
        if let Some(max) = self.features.max_keypoints {
            at_least("features.max_keypoints", max, 1)?;
        }
        in_range("min_active_fraction", self.min_active_fraction, 0.0, 1.0)?;
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            consensus: ConsensusConfig::default(),
            flow: FlowConfig::default(),
            features: FastBriefConfig::default(),
            min_active_fraction: 0.1,
        }
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive {
            field,
            value: value as f64,
        })
    }
}

fn in_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        })
    }
}

fn at_least(field: &'static str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { field, value, min })
    }
}
