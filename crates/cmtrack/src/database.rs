//! Reference model of the tracked object, built once from the first frame.

use image::GrayImage;
use nalgebra::{DMatrix, Point2, Vector2};

use crate::error::InitError;
use crate::features::FeatureBackend;
use crate::geometry::{BoundingBox, ReferenceGeometry};
use crate::keypoint::{Descriptor, Keypoint, UNCLASSIFIED};

/// Keypoints, descriptors and pairwise geometry of the reference object.
///
/// Class `i` refers to the `i`-th selected keypoint. Background keypoints
/// (outside the initial region) only contribute descriptors to the match
/// database, labelled [`UNCLASSIFIED`].
#[derive(Debug, Clone)]
pub struct KeypointDatabase {
    region: BoundingBox,
    geometry: ReferenceGeometry,
    selected: Vec<Keypoint>,
    selected_descriptors: Vec<Descriptor>,
    springs: Vec<Vector2<f32>>,
    /// Background descriptors followed by selected descriptors.
    match_descriptors: Vec<Descriptor>,
    /// Class of each entry in `match_descriptors`.
    match_classes: Vec<i32>,
    distances: DMatrix<f32>,
    angles: DMatrix<f32>,
}

impl KeypointDatabase {
    /// Detect and describe `frame`, then split keypoints into the object
    /// (strictly inside `region`) and the background.
    pub fn build(
        backend: &dyn FeatureBackend,
        frame: &GrayImage,
        region: BoundingBox,
    ) -> Result<Self, InitError> {
        if !region.is_valid() {
            return Err(InitError::InvalidRegion {
                width: region.width,
                height: region.height,
            });
        }

        let features = backend.detect_and_compute(frame, None);
        let mut selected = Vec::new();
        let mut selected_descriptors = Vec::new();
        let mut background_descriptors = Vec::new();
        for (kp, desc) in features.keypoints.iter().zip(features.descriptors.iter()) {
            if region.contains_strict(&kp.pt) {
                selected.push(kp.with_class(selected.len() as i32));
                selected_descriptors.push(*desc);
            } else {
                background_descriptors.push(*desc);
            }
        }
        if selected.is_empty() {
            return Err(InitError::NoKeypoints {
                detected: features.len(),
            });
        }

        let n = selected.len();
        let center = Point2::from(
            selected
                .iter()
                .fold(Vector2::zeros(), |acc: Vector2<f32>, kp| acc + kp.pt.coords)
                / n as f32,
        );
        let springs = selected.iter().map(|kp| kp.pt - center).collect();

        let distances = DMatrix::from_fn(n, n, |i, j| (selected[j].pt - selected[i].pt).norm());
        let angles = DMatrix::from_fn(n, n, |i, j| {
            let v = selected[j].pt - selected[i].pt;
            v.y.atan2(v.x)
        });

        let mut match_classes = vec![UNCLASSIFIED; background_descriptors.len()];
        match_classes.extend(0..n as i32);
        let mut match_descriptors = background_descriptors;
        match_descriptors.extend_from_slice(&selected_descriptors);

        tracing::debug!(
            selected = n,
            background = match_classes.len() - n,
            "keypoint database built"
        );

        Ok(Self {
            region,
            geometry: ReferenceGeometry::new(&region, center),
            selected,
            selected_descriptors,
            springs,
            match_descriptors,
            match_classes,
            distances,
            angles,
        })
    }

    /// Number of reference (selected) keypoints.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Number of background descriptors in the match database.
    pub fn num_background(&self) -> usize {
        self.match_descriptors.len() - self.selected.len()
    }

    /// Region passed at initialization.
    pub fn region(&self) -> &BoundingBox {
        &self.region
    }

    pub fn geometry(&self) -> &ReferenceGeometry {
        &self.geometry
    }

    /// Reference keypoints, labelled with their class.
    pub fn selected_keypoints(&self) -> &[Keypoint] {
        &self.selected
    }

    pub fn selected_descriptors(&self) -> &[Descriptor] {
        &self.selected_descriptors
    }

    /// Background and selected descriptors, used by global matching.
    pub fn match_descriptors(&self) -> &[Descriptor] {
        &self.match_descriptors
    }

    pub fn match_classes(&self) -> &[i32] {
        &self.match_classes
    }

    /// Offset of reference keypoint `class` from the object center.
    pub fn spring(&self, class: usize) -> Vector2<f32> {
        self.springs[class]
    }

    pub fn springs(&self) -> &[Vector2<f32>] {
        &self.springs
    }

    /// Reference distance between classes `a` and `b`.
    pub fn distance(&self, a: usize, b: usize) -> f32 {
        self.distances[(a, b)]
    }

    /// Reference angle of the vector from class `a` to class `b`.
    pub fn angle(&self, a: usize, b: usize) -> f32 {
        self.angles[(a, b)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FastBrief;
    use crate::test_utils::{blank_frame, block_texture, frame_with_patch, ScriptedBackend};
    use approx::assert_relative_eq;

    #[test]
    fn splits_selected_and_background() {
        let backend = ScriptedBackend(vec![
            Keypoint::new(5.0, 5.0),
            Keypoint::new(12.0, 12.0),
            Keypoint::new(18.0, 12.0),
            Keypoint::new(40.0, 40.0),
            Keypoint::new(10.0, 15.0),
        ]);
        let region = BoundingBox::new(10.0, 10.0, 10.0, 10.0);
        let db = KeypointDatabase::build(&backend, &blank_frame(64, 64), region).unwrap();
        // (10, 15) lies on the border and is background.
        assert_eq!(db.len(), 2);
        assert_eq!(db.num_background(), 3);
        assert_eq!(db.match_classes(), &[-1, -1, -1, 0, 1]);
        assert_eq!(db.selected_keypoints()[1].class_id, 1);
        assert_eq!(db.geometry().center, Point2::new(15.0, 12.0));
        assert_eq!(db.spring(0), Vector2::new(-3.0, 0.0));
    }

    #[test]
    fn pairwise_tables_are_consistent() {
        let backend = ScriptedBackend(vec![
            Keypoint::new(11.0, 11.0),
            Keypoint::new(14.0, 15.0),
            Keypoint::new(11.0, 19.0),
        ]);
        let region = BoundingBox::new(10.0, 10.0, 10.0, 10.0);
        let db = KeypointDatabase::build(&backend, &blank_frame(32, 32), region).unwrap();
        assert_relative_eq!(db.distance(0, 1), 5.0);
        assert_relative_eq!(db.distance(1, 0), 5.0);
        assert_relative_eq!(db.distance(2, 2), 0.0);
        assert_relative_eq!(db.angle(0, 2), std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(db.angle(2, 0), -std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn blank_region_is_rejected() {
        let fb = FastBrief::default();
        let err = KeypointDatabase::build(
            &fb,
            &blank_frame(200, 200),
            BoundingBox::new(50.0, 50.0, 50.0, 50.0),
        )
        .unwrap_err();
        assert_eq!(err, InitError::NoKeypoints { detected: 0 });
    }

    #[test]
    fn degenerate_region_is_rejected() {
        let fb = FastBrief::default();
        let frame = blank_frame(64, 64);
        for region in [
            BoundingBox::new(0.0, 0.0, 0.0, 10.0),
            BoundingBox::new(0.0, 0.0, 10.0, -1.0),
            BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0),
        ] {
            assert!(matches!(
                KeypointDatabase::build(&fb, &frame, region),
                Err(InitError::InvalidRegion { .. })
            ));
        }
    }

    #[test]
    fn textured_region_initializes() {
        let fb = FastBrief::default();
        let frame = frame_with_patch(300, 240, &block_texture(50, 3), [100, 100]);
        let db = KeypointDatabase::build(&fb, &frame, BoundingBox::new(100.0, 100.0, 50.0, 50.0))
            .unwrap();
        assert!(db.len() >= 10);
        assert_eq!(db.match_descriptors().len(), db.match_classes().len());
        let quad = db.geometry().initial_quadrilateral();
        assert_relative_eq!(quad.top_left[0], 100.0, epsilon = 1e-3);
        assert_relative_eq!(quad.bottom_right[1], 150.0, epsilon = 1e-3);
    }
}
