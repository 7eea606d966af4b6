use image::{GrayImage, ImageBuffer, Luma};
use nalgebra::{Point2, Vector2};

use super::{FlowResult, OpticalFlow};
use crate::config::LucasKanadeConfig;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Smallest side length of a pyramid level.
const MIN_LEVEL_SIZE: u32 = 16;

/// Pyramidal iterative Lucas-Kanade sparse optical flow.
#[derive(Debug, Clone, Default)]
pub struct LucasKanade {
    config: LucasKanadeConfig,
}

impl LucasKanade {
    pub fn new(config: LucasKanadeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LucasKanadeConfig {
        &self.config
    }

    fn build_pyramid(&self, image: &GrayImage) -> Vec<FloatImage> {
        let base = FloatImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([image.get_pixel(x, y)[0] as f32 / 255.0])
        });
        let mut pyramid = vec![base];
        while pyramid.len() < self.config.levels {
            let Some(prev) = pyramid.last() else { break };
            if prev.width() / 2 < MIN_LEVEL_SIZE || prev.height() / 2 < MIN_LEVEL_SIZE {
                break;
            }
            let next = downsample(prev);
            pyramid.push(next);
        }
        pyramid
    }

    /// Track one point through the pyramid; `None` on failure.
    fn track_point(
        &self,
        prev: &[FloatImage],
        curr: &[FloatImage],
        point: Point2<f32>,
    ) -> Option<Point2<f32>> {
        let (w, h) = prev[0].dimensions();
        if !in_image(point, w, h) {
            return None;
        }
        let r = self.config.window_radius as i32;
        let area = ((2 * r + 1) * (2 * r + 1)) as f32;
        let levels = prev.len().min(curr.len());
        let mut guess = Vector2::<f32>::zeros();

        for level in (0..levels).rev() {
            let scale = (1u32 << level) as f32;
            let p = Point2::new(point.x / scale, point.y / scale);
            let (prev_l, curr_l) = (&prev[level], &curr[level]);

            // Template gradients and structure tensor.
            let mut grads = Vec::with_capacity(area as usize);
            let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);
            for dy in -r..=r {
                for dx in -r..=r {
                    let (x, y) = (p.x + dx as f32, p.y + dy as f32);
                    let ix = 0.5 * (sample(prev_l, x + 1.0, y) - sample(prev_l, x - 1.0, y));
                    let iy = 0.5 * (sample(prev_l, x, y + 1.0) - sample(prev_l, x, y - 1.0));
                    gxx += ix * ix;
                    gxy += ix * iy;
                    gyy += iy * iy;
                    grads.push((ix, iy, sample(prev_l, x, y)));
                }
            }
            let det = gxx * gyy - gxy * gxy;
            let half_trace = 0.5 * (gxx + gyy);
            let min_eig = half_trace - (half_trace * half_trace - det).max(0.0).sqrt();

            if min_eig / area < self.config.min_eigenvalue || det.abs() < f32::EPSILON {
                if level == 0 {
                    return None;
                }
                // Too flat at this resolution; carry the guess down.
                guess *= 2.0;
                continue;
            }

            let mut v = Vector2::<f32>::zeros();
            for _ in 0..self.config.max_iterations {
                let (mut bx, mut by) = (0.0f32, 0.0f32);
                let mut k = 0;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let (ix, iy, template) = grads[k];
                        k += 1;
                        let x = p.x + guess.x + v.x + dx as f32;
                        let y = p.y + guess.y + v.y + dy as f32;
                        let it = template - sample(curr_l, x, y);
                        bx += it * ix;
                        by += it * iy;
                    }
                }
                let delta = Vector2::new((gyy * bx - gxy * by) / det, (gxx * by - gxy * bx) / det);
                if !delta.x.is_finite() || !delta.y.is_finite() {
                    return None;
                }
                v += delta;
                if delta.norm() < self.config.epsilon {
                    break;
                }
            }

            guess += v;
            if level > 0 {
                guess *= 2.0;
            }
        }

        let tracked = point + guess;
        in_image(tracked, w, h).then_some(tracked)
    }
}

impl OpticalFlow for LucasKanade {
    fn track(&self, prev: &GrayImage, curr: &GrayImage, points: &[Point2<f32>]) -> FlowResult {
        if points.is_empty()
            || prev.dimensions() != curr.dimensions()
            || prev.width() == 0
            || prev.height() == 0
        {
            return FlowResult {
                points: points.to_vec(),
                status: vec![false; points.len()],
            };
        }
        let prev_pyr = self.build_pyramid(prev);
        let curr_pyr = self.build_pyramid(curr);
        let mut out = FlowResult {
            points: Vec::with_capacity(points.len()),
            status: Vec::with_capacity(points.len()),
        };
        for &p in points {
            match self.track_point(&prev_pyr, &curr_pyr, p) {
                Some(q) => {
                    out.points.push(q);
                    out.status.push(true);
                }
                None => {
                    out.points.push(p);
                    out.status.push(false);
                }
            }
        }
        out
    }
}

fn in_image(p: Point2<f32>, w: u32, h: u32) -> bool {
    p.x.is_finite()
        && p.y.is_finite()
        && p.x >= 0.0
        && p.y >= 0.0
        && p.x <= (w - 1) as f32
        && p.y <= (h - 1) as f32
}

/// Bilinear sample with edge clamping.
fn sample(img: &FloatImage, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p00 = img.get_pixel(x0, y0)[0];
    let p10 = img.get_pixel(x1, y0)[0];
    let p01 = img.get_pixel(x0, y1)[0];
    let p11 = img.get_pixel(x1, y1)[0];
    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Halve resolution with a 2×2 box filter.
fn downsample(img: &FloatImage) -> FloatImage {
    let (w, h) = img.dimensions();
    FloatImage::from_fn(w / 2, h / 2, |x, y| {
        let (sx, sy) = (2 * x, 2 * y);
        let sum = img.get_pixel(sx, sy)[0]
            + img.get_pixel((sx + 1).min(w - 1), sy)[0]
            + img.get_pixel(sx, (sy + 1).min(h - 1))[0]
            + img.get_pixel((sx + 1).min(w - 1), (sy + 1).min(h - 1))[0];
        Luma([0.25 * sum])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blank_frame, block_texture, blur_gray, frame_with_patch};

    fn textured(origin: [i32; 2]) -> GrayImage {
        blur_gray(
            &frame_with_patch(200, 160, &block_texture(60, 11), origin),
            1.5,
        )
    }

    #[test]
    fn identical_frames_give_zero_flow() {
        let lk = LucasKanade::default();
        let img = textured([60, 50]);
        let pts = [Point2::new(80.0, 70.0), Point2::new(95.5, 88.25)];
        let res = lk.track(&img, &img, &pts);
        assert_eq!(res.status, vec![true, true]);
        for (a, b) in res.points.iter().zip(pts.iter()) {
            assert!((*a - *b).norm() < 0.05, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn recovers_small_translation() {
        let lk = LucasKanade::default();
        let a = textured([60, 50]);
        let b = textured([64, 47]);
        let res = lk.track(&a, &b, &[Point2::new(85.0, 75.0)]);
        assert!(res.status[0]);
        let expected = Point2::new(89.0, 72.0);
        assert!(
            (res.points[0] - expected).norm() < 0.5,
            "tracked to {:?}",
            res.points[0]
        );
    }

    #[test]
    fn flat_window_fails() {
        let lk = LucasKanade::default();
        let img = blank_frame(120, 100);
        let res = lk.track(&img, &img, &[Point2::new(60.0, 50.0)]);
        assert_eq!(res.status, vec![false]);
    }

    #[test]
    fn point_outside_image_fails() {
        let lk = LucasKanade::default();
        let img = textured([60, 50]);
        let res = lk.track(&img, &img, &[Point2::new(-3.0, 40.0), Point2::new(10.0, 500.0)]);
        assert_eq!(res.status, vec![false, false]);
    }

    #[test]
    fn pyramid_stops_at_minimum_size() {
        let lk = LucasKanade::new(LucasKanadeConfig {
            levels: 10,
            ..LucasKanadeConfig::default()
        });
        let pyr = lk.build_pyramid(&blank_frame(64, 40));
        // 64x40 -> 32x20 -> stop (next would be 16x10)
        assert_eq!(pyr.len(), 2);
        assert_eq!(pyr[1].dimensions(), (32, 20));
    }

    #[test]
    fn empty_frames_fail_every_point() {
        let lk = LucasKanade::default();
        let empty = GrayImage::new(0, 0);
        let res = lk.track(&empty, &empty, &[Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)]);
        assert_eq!(res.status, vec![false, false]);
        assert_eq!(res.points.len(), 2);

        let line = GrayImage::new(12, 0);
        let res = lk.track(&line, &line, &[Point2::new(1.0, 0.0)]);
        assert_eq!(res.status, vec![false]);
    }
}
