/// Failure to build the reference model from the initialization frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InitError {
    /// The region has a non-positive or non-finite extent.
    InvalidRegion {
        /// Requested width.
        width: f32,
        /// Requested height.
        height: f32,
    },
    /// No keypoint was detected strictly inside the region.
    NoKeypoints {
        /// Keypoints detected over the whole frame (all background).
        detected: usize,
    },
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRegion { width, height } => {
                write!(f, "invalid region: {}x{}", width, height)
            }
            Self::NoKeypoints { detected } => {
                write!(
                    f,
                    "no keypoints inside region ({} detected in frame)",
                    detected
                )
            }
        }
    }
}

impl std::error::Error for InitError {}

/// A tuning parameter is outside its valid range.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Value must be finite and strictly positive.
    NotPositive {
        /// Dotted field path, e.g. `consensus.thr_outlier`.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
    /// Value must lie in the given closed range.
    OutOfRange {
        /// Dotted field path.
        field: &'static str,
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Count must be at least `min`.
    TooSmall {
        /// Dotted field path.
        field: &'static str,
        /// Offending value.
        value: usize,
        /// Minimum accepted value.
        min: usize,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositive { field, value } => {
                write!(f, "{} must be finite and > 0, got {}", field, value)
            }
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{} must be in [{}, {}], got {}", field, min, max, value),
            Self::TooSmall { field, value, min } => {
                write!(f, "{} must be >= {}, got {}", field, min, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
