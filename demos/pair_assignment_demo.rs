//! Walk one image through the interaction head in both modes
//!
//! Three detections, one of them a human, and a single ground-truth
//! interaction.  Prints the candidate pairs, the labels they are assigned
//! and the scores an untrained head gives them.

use anyhow::{anyhow, Result};
use clap::Parser;
use ndarray::{array, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ruhoi_interact::{
    BoxPairRoiPooler, Detections, FeatureMaps, InteractionHead, InteractionHeadConfig, InteractionTarget, Mode,
    PairCombine, RoiAlignConfig,
};
use ruhoi_meters::HandyTimer;

#[derive(Parser)]
struct CliArgs {
    #[arg(long, default_value = "0.5")]
    fg_iou_thresh: f32,

    #[arg(long, default_value = "8")]
    num_classes: usize,

    #[arg(long, default_value = "0")]
    seed: u64,

    /// Forward passes to time
    #[arg(long, default_value = "20")]
    rounds: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();

    println!("RuHOI Pair Assignment Demo");
    println!("==========================");

    let detections = Detections::new(
        array![
            [0.0f32, 0.0, 10.0, 10.0],
            [0.0, 0.0, 10.0, 10.0],
            [50.0, 50.0, 60.0, 60.0]
        ],
        array![[0.9f32, 0.1], [0.2, 0.8], [0.3, 0.7]],
    )?;
    let target = InteractionTarget::from_records(&[[0.0, 0.0, 10.0, 10.0]], &[[0.0, 0.0, 10.0, 10.0]], &[5])?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let features = FeatureMaps::single(
        Array3::from_shape_fn((4, 32, 32), |(c, y, x)| ((c * 31 + y * 7 + x) % 13) as f32 / 13.0),
        0.5,
    )?;
    let pooler = BoxPairRoiPooler::new(
        4,
        RoiAlignConfig {
            output_size: (3, 3),
            ..Default::default()
        },
        PairCombine::Concat,
    )?;
    let config = InteractionHeadConfig {
        num_classes: args.num_classes,
        representation_size: 32,
        fg_iou_thresh: args.fg_iou_thresh,
        ..Default::default()
    };
    let head = InteractionHead::with_random_weights(pooler, config, &mut rng)?;
    println!("✓ Built head with {} interaction classes", head.config().num_classes);

    let training = head
        .forward(
            std::slice::from_ref(&features),
            std::slice::from_ref(&detections),
            Some(std::slice::from_ref(&target)),
            Mode::Training,
        )?
        .into_training()
        .ok_or_else(|| anyhow!("training pass returned inference output"))?;

    println!("\nTraining mode (fg_iou_thresh = {}):", args.fg_iou_thresh);
    let image = &training[0];
    for (p, pair) in image.pairs.paired_idx.rows().into_iter().enumerate() {
        let classes: Vec<usize> = image
            .labels
            .row(p)
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(c, _)| c)
            .collect();
        println!("  pair ({}, {}) → labels {:?}", pair[0], pair[1], classes);
    }

    let mut timer = HandyTimer::new();
    let mut inference = Vec::new();
    for _ in 0..args.rounds.max(1) {
        inference = timer.time(|| {
            head.forward(
                std::slice::from_ref(&features),
                std::slice::from_ref(&detections),
                None,
                Mode::Inference,
            )
        })?
        .into_inference()
        .ok_or_else(|| anyhow!("inference pass returned training output"))?;
    }

    println!("\nInference mode (untrained weights):");
    for hoi in inference[0].instances(&detections, 0.6)?.iter().take(5) {
        println!(
            "  human {} – object {}  class {:>3}  score {:.3}",
            hoi.human, hoi.object, hoi.hoi, hoi.score
        );
    }

    println!(
        "\n✓ {} forward passes, mean {:.3} ms, min {:.3} ms, max {:.3} ms",
        timer.len(),
        timer.mean().unwrap_or(0.0) * 1e3,
        timer.min().unwrap_or(0.0) * 1e3,
        timer.max().unwrap_or(0.0) * 1e3,
    );
    Ok(())
}
