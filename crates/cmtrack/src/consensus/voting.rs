use nalgebra::Point2;

use crate::database::KeypointDatabase;
use crate::geometry::rotate;
use crate::keypoint::Keypoint;

/// Object center implied by each keypoint: its location minus its spring,
/// transformed by the estimated similarity.
///
/// Every keypoint must carry a class known to `db`.
pub fn cast_votes(
    db: &KeypointDatabase,
    keypoints: &[Keypoint],
    scale: f32,
    rotation: f32,
) -> Vec<Point2<f32>> {
    keypoints
        .iter()
        .filter_map(|kp| {
            let class = kp.class_index()?;
            Some(kp.pt - rotate(db.spring(class), rotation) * scale)
        })
        .collect()
}
