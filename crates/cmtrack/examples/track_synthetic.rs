use cmtrack::{ConsensusTracker, TrackerConfig};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::error::Error;

const W: u32 = 320;
const H: u32 = 240;
const PATCH: u32 = 60;

/// Mid-gray frame with a random block texture whose top-left corner is at
/// `origin`.
fn render(levels: &[u8], origin: (i32, i32)) -> GrayImage {
    let blocks = PATCH / 5;
    GrayImage::from_fn(W, H, |x, y| {
        let (px, py) = (x as i32 - origin.0, y as i32 - origin.1);
        if (0..PATCH as i32).contains(&px) && (0..PATCH as i32).contains(&py) {
            Luma([levels[(py as u32 / 5 * blocks + px as u32 / 5) as usize]])
        } else {
            Luma([128])
        }
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(42);
    let blocks = PATCH / 5;
    let levels: Vec<u8> = (0..blocks * blocks)
        .map(|_| {
            if rng.gen_bool(0.5) {
                rng.gen_range(0..60)
            } else {
                rng.gen_range(196..=255)
            }
        })
        .collect();

    let start = (80, 90);
    let mut tracker = ConsensusTracker::new(TrackerConfig::default())?;
    let n = tracker.initialize(
        &render(&levels, start),
        start.0 as f32,
        start.1 as f32,
        PATCH as f32,
        PATCH as f32,
    )?;
    println!("Initialized with {n} keypoints.");

    for step in 1..=20 {
        let origin = (start.0 + 3 * step, start.1 + step);
        let report = tracker.process_frame(&render(&levels, origin));
        match (report.has_result, report.bounding_box) {
            (true, Some(bb)) => println!(
                "frame {:2}: truth ({}, {}) box ({:.1}, {:.1}) {:.1}x{:.1}, {} active",
                report.frame_index,
                origin.0,
                origin.1,
                bb.x,
                bb.y,
                bb.width,
                bb.height,
                report.counts.active
            ),
            _ => println!("frame {:2}: lost", report.frame_index),
        }
    }

    if let Some(last) = tracker.last_report() {
        println!("{}", serde_json::to_string_pretty(last)?);
    }
    Ok(())
}
