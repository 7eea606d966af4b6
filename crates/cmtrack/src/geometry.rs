//! 2D helpers and the bounding-quadrilateral reconstructor.
//!
//! The reference rectangle is stored as four corner springs (offsets from the
//! object center in the initial frame). Every later quadrilateral is obtained
//! by rotating and scaling those springs and adding the current center; the
//! springs themselves never change.

use std::f32::consts::PI;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_cross_mut, draw_line_segment_mut};
use nalgebra::{Point2, Vector2};

use crate::keypoint::Keypoint;

/// Rotate `p` by `rad` radians: `x' = x cos − y sin`, `y' = x sin + y cos`.
#[inline]
pub fn rotate(p: Vector2<f32>, rad: f32) -> Vector2<f32> {
    let (s, c) = rad.sin_cos();
    Vector2::new(p.x * c - p.y * s, p.x * s + p.y * c)
}

/// Wrap an angle into `(-π, π]`.
#[inline]
pub fn wrap_angle(rad: f32) -> f32 {
    let mut a = rad % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Median of `values` (mean of the two middle elements for even lengths).
///
/// Reorders the slice. Returns `None` for an empty slice.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(0.5 * (values[mid - 1] + values[mid]))
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Finite position and strictly positive finite extent.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    /// Strict interior test (points on the border are outside).
    pub fn contains_strict(&self, p: &Point2<f32>) -> bool {
        p.x > self.x && p.y > self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }

    /// Smallest box enclosing all `points`, `None` when empty.
    pub fn enclosing(points: &[Point2<f32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// Four tracked corners, clockwise from top-left in the reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Quadrilateral {
    pub top_left: [f32; 2],
    pub top_right: [f32; 2],
    pub bottom_right: [f32; 2],
    pub bottom_left: [f32; 2],
}

impl Quadrilateral {
    pub fn from_points(corners: [Point2<f32>; 4]) -> Self {
        let arr = |p: Point2<f32>| [p.x, p.y];
        Self {
            top_left: arr(corners[0]),
            top_right: arr(corners[1]),
            bottom_right: arr(corners[2]),
            bottom_left: arr(corners[3]),
        }
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let pt = |a: [f32; 2]| Point2::new(a[0], a[1]);
        [
            pt(self.top_left),
            pt(self.top_right),
            pt(self.bottom_right),
            pt(self.bottom_left),
        ]
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::enclosing(&self.corners()).unwrap_or_default()
    }
}

/// Reference rectangle captured at initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGeometry {
    /// Object center in the initialization frame.
    pub center: Point2<f32>,
    /// Corner offsets from `center`: top-left, top-right, bottom-right, bottom-left.
    pub corner_springs: [Vector2<f32>; 4],
}

impl ReferenceGeometry {
    /// Reference geometry centered on the middle of `region`.
    pub fn from_region(region: &BoundingBox) -> Self {
        Self::new(region, region.center())
    }

    /// Reference geometry of `region` with springs measured from `center`.
    pub fn new(region: &BoundingBox, center: Point2<f32>) -> Self {
        let tl = Point2::new(region.x, region.y);
        let tr = Point2::new(region.x + region.width, region.y);
        let br = Point2::new(region.x + region.width, region.y + region.height);
        let bl = Point2::new(region.x, region.y + region.height);
        Self {
            center,
            corner_springs: [tl - center, tr - center, br - center, bl - center],
        }
    }

    /// Place the reference corners at `center`, scaled by `scale` and rotated
    /// by `rotation` radians.
    pub fn place(&self, center: Point2<f32>, scale: f32, rotation: f32) -> Quadrilateral {
        let corners = self
            .corner_springs
            .map(|spring| center + rotate(spring, rotation) * scale);
        Quadrilateral::from_points(corners)
    }

    /// Quadrilateral of the untransformed reference rectangle.
    pub fn initial_quadrilateral(&self) -> Quadrilateral {
        self.place(self.center, 1.0, 0.0)
    }
}

const QUAD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const KEYPOINT_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Draw the quadrilateral edges and the given keypoints onto `canvas`.
pub fn draw_overlay(canvas: &mut RgbaImage, quad: &Quadrilateral, keypoints: &[Keypoint]) {
    let corners = quad.corners();
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), QUAD_COLOR);
    }
    for kp in keypoints {
        draw_cross_mut(
            canvas,
            KEYPOINT_COLOR,
            kp.pt.x.round() as i32,
            kp.pt.y.round() as i32,
        );
    }
}
