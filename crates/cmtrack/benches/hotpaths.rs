use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cmtrack::consensus::{self, flat_cut, single_linkage};
use cmtrack::{
    BoundingBox, ConsensusConfig, ConsensusTracker, FastBrief, KeypointDatabase, TrackerConfig,
};

/// Random 5 px block texture pasted at `origin` on a mid-gray frame.
fn make_frame(w: u32, h: u32, patch: u32, origin: [u32; 2], seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks = (patch + 4) / 5;
    let levels: Vec<u8> = (0..blocks * blocks)
        .map(|_| {
            if rng.gen_bool(0.5) {
                rng.gen_range(0..60)
            } else {
                rng.gen_range(196..=255)
            }
        })
        .collect();
    GrayImage::from_fn(w, h, |x, y| {
        let (px, py) = (x.wrapping_sub(origin[0]), y.wrapping_sub(origin[1]));
        if px < patch && py < patch {
            Luma([levels[((py / 5) * blocks + px / 5) as usize]])
        } else {
            Luma([128])
        }
    })
}

fn make_votes(n: usize, seed: u64) -> Vec<Point2<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            if i % 5 == 0 {
                Point2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0))
            } else {
                Point2::new(
                    320.0 + rng.gen_range(-3.0..3.0),
                    240.0 + rng.gen_range(-3.0..3.0),
                )
            }
        })
        .collect()
}

fn bench_clustering(c: &mut Criterion) {
    let votes = make_votes(300, 7);

    c.bench_function("single_linkage_300", |b| {
        b.iter(|| {
            let merges = single_linkage(black_box(&votes));
            black_box(flat_cut(&merges, votes.len(), 20.0))
        })
    });
}

fn bench_consensus(c: &mut Criterion) {
    let frame = make_frame(640, 480, 120, [260, 180], 11);
    let region = BoundingBox::new(260.0, 180.0, 120.0, 120.0);
    let db = match KeypointDatabase::build(&FastBrief::default(), &frame, region) {
        Ok(db) => db,
        Err(e) => panic!("bench fixture has no keypoints: {e}"),
    };
    let cfg = ConsensusConfig::default();
    let keypoints = db.selected_keypoints().to_vec();

    c.bench_function(&format!("consensus_estimate_{}kp", keypoints.len()), |b| {
        b.iter(|| black_box(consensus::estimate(&db, black_box(&keypoints), &cfg)))
    });
}

fn bench_frame(c: &mut Criterion) {
    let first = make_frame(640, 480, 120, [260, 180], 11);
    let shifted = make_frame(640, 480, 120, [266, 176], 11);
    let mut tracker = match ConsensusTracker::new(TrackerConfig::default()) {
        Ok(t) => t,
        Err(e) => panic!("default config rejected: {e}"),
    };

    c.bench_function("process_frame_640x480", |b| {
        b.iter(|| {
            if let Err(e) = tracker.initialize(&first, 260.0, 180.0, 120.0, 120.0) {
                panic!("bench fixture has no keypoints: {e}");
            }
            black_box(tracker.process_frame(black_box(&shifted)))
        })
    });
}

criterion_group!(hotpaths, bench_clustering, bench_consensus, bench_frame);
criterion_main!(hotpaths);
