//! Shared test utilities: synthetic frames with a trackable textured patch.

use image::{GrayImage, Luma};
use nalgebra::Point2;
use rand::prelude::*;

use crate::database::KeypointDatabase;
use crate::features::FeatureBackend;
use crate::geometry::{rotate, BoundingBox};
use crate::keypoint::{Descriptor, Features, Keypoint};

/// Uniform background level of synthetic frames.
pub(crate) const BACKGROUND: u8 = 128;

/// Block size (pixels) of the random texture.
pub(crate) const BLOCK: u32 = 5;

/// Random block texture of `size`×`size` pixels, reproducible from `seed`.
pub(crate) fn block_texture(size: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks = size.div_ceil(BLOCK);
    let levels: Vec<u8> = (0..blocks * blocks)
        .map(|_| if rng.gen_bool(0.5) { rng.gen_range(0..60) } else { rng.gen_range(196..=255) })
        .collect();
    GrayImage::from_fn(size, size, |x, y| {
        Luma([levels[((y / BLOCK) * blocks + x / BLOCK) as usize]])
    })
}

/// Paste `patch` into a uniform frame with its top-left corner at `origin`.
///
/// Parts of the patch falling outside the frame are clipped.
pub(crate) fn frame_with_patch(w: u32, h: u32, patch: &GrayImage, origin: [i32; 2]) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([BACKGROUND]));
    for (px, py, pix) in patch.enumerate_pixels() {
        let x = origin[0] + px as i32;
        let y = origin[1] + py as i32;
        if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
            img.put_pixel(x as u32, y as u32, *pix);
        }
    }
    img
}

/// Uniform frame without any texture.
pub(crate) fn blank_frame(w: u32, h: u32) -> GrayImage {
    GrayImage::from_pixel(w, h, Luma([BACKGROUND]))
}

/// Gaussian-blur a `GrayImage` via `imageproc`.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(img, sigma)
}

/// Feature backend replaying a fixed keypoint list with distinct descriptors.
pub(crate) struct ScriptedBackend(pub Vec<Keypoint>);

impl FeatureBackend for ScriptedBackend {
    fn detect(&self, _frame: &GrayImage, region: Option<&BoundingBox>) -> Vec<Keypoint> {
        self.0
            .iter()
            .filter(|kp| region.map_or(true, |r| r.contains_strict(&kp.pt)))
            .copied()
            .collect()
    }

    fn compute(&self, _frame: &GrayImage, keypoints: &[Keypoint]) -> Features {
        let mut f = Features::default();
        for (i, kp) in keypoints.iter().enumerate() {
            let mut d = Descriptor::zeros();
            d.set_bit(i % Descriptor::BITS as usize);
            f.push(*kp, d);
        }
        f
    }
}

/// Database of `n` random reference keypoints inside `(100, 100, 100, 100)`.
pub(crate) fn synthetic_database(n: usize, seed: u64) -> KeypointDatabase {
    let mut rng = StdRng::seed_from_u64(seed);
    let keypoints = (0..n)
        .map(|_| Keypoint::new(rng.gen_range(102.0..198.0), rng.gen_range(102.0..198.0)))
        .collect();
    let backend = ScriptedBackend(keypoints);
    let region = BoundingBox::new(100.0, 100.0, 100.0, 100.0);
    match KeypointDatabase::build(&backend, &blank_frame(1, 1), region) {
        Ok(db) => db,
        Err(e) => panic!("synthetic database: {e}"),
    }
}

/// Reference keypoints placed around `center` with the given similarity.
pub(crate) fn place_keypoints(
    db: &KeypointDatabase,
    center: Point2<f32>,
    scale: f32,
    rotation: f32,
) -> Vec<Keypoint> {
    db.selected_keypoints()
        .iter()
        .enumerate()
        .map(|(class, kp)| kp.moved_to(center + rotate(db.spring(class), rotation) * scale))
        .collect()
}
