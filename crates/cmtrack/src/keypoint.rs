//! Keypoints, binary descriptors and aligned feature sets.

use nalgebra::Point2;

/// Class id carried by keypoints that do not correspond to any reference
/// keypoint (background or freshly detected).
pub const UNCLASSIFIED: i32 = -1;

/// Number of bytes in a [`Descriptor`].
pub const DESCRIPTOR_BYTES: usize = 32;

/// A salient image location with detector metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Location in pixel coordinates.
    pub pt: Point2<f32>,
    /// Diameter of the meaningful neighbourhood (pixels).
    pub size: f32,
    /// Orientation in radians, or `-1.0` when not computed.
    pub angle: f32,
    /// Detector response (corner score).
    pub response: f32,
    /// Index of the reference keypoint this point belongs to, or [`UNCLASSIFIED`].
    pub class_id: i32,
}

impl Keypoint {
    /// Unclassified keypoint at `(x, y)` with neutral metadata.
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            pt: Point2::new(x, y),
            size: 7.0,
            angle: -1.0,
            response: 0.0,
            class_id: UNCLASSIFIED,
        }
    }

    /// Copy of `self` labelled with `class_id`.
    pub fn with_class(mut self, class_id: i32) -> Self {
        self.class_id = class_id;
        self
    }

    /// Copy of `self` moved to `pt`, keeping all metadata.
    pub fn moved_to(mut self, pt: Point2<f32>) -> Self {
        self.pt = pt;
        self
    }

    /// Reference class index, `None` for unclassified points.
    pub fn class_index(&self) -> Option<usize> {
        usize::try_from(self.class_id).ok()
    }
}

/// 256-bit binary descriptor compared with the Hamming metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    /// Number of bits in a descriptor.
    pub const BITS: u32 = (DESCRIPTOR_BYTES * 8) as u32;

    /// All-zero descriptor.
    pub fn zeros() -> Self {
        Self([0; DESCRIPTOR_BYTES])
    }

    /// Set bit `index` (0-based, LSB-first within each byte).
    pub fn set_bit(&mut self, index: usize) {
        self.0[index / 8] |= 1 << (index % 8);
    }

    /// Read bit `index`.
    pub fn bit(&self, index: usize) -> bool {
        self.0[index / 8] & (1 << (index % 8)) != 0
    }

    /// Number of differing bits.
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Keypoints and their descriptors, aligned 1:1.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.keypoints.len(), self.descriptors.len());
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, keypoint: Keypoint, descriptor: Descriptor) {
        self.keypoints.push(keypoint);
        self.descriptors.push(descriptor);
    }
}
