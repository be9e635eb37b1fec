//! Summarise a HICO-DET annotation file
//!
//! Usage: hicodet_summary --anno-file anno.json [--root hico_20160224_det/images/train2015]

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use ruhoi_data::HicoDet;
use ruhoi_meters::NumericMeter;

#[derive(Parser)]
struct CliArgs {
    #[arg(long)]
    anno_file: String,

    #[arg(long, default_value = ".")]
    root: String,

    /// Most frequent classes to list
    #[arg(long, default_value = "10")]
    top: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();

    let dataset = HicoDet::load(&args.root, &args.anno_file)
        .await
        .with_context(|| format!("Failed to load annotations from {}", args.anno_file))?;
    print!("{dataset}");
    println!("\tImages without interactions: {}", dataset.empty_ids().len());

    let class_corr = dataset.class_corr();
    let mut counts = vec![0usize; class_corr.len()];
    let mut per_image = NumericMeter::<usize>::new();
    for sample in dataset.iter() {
        per_image.push(sample.annotation.len());
        for &hoi in &sample.annotation.hoi {
            match counts.get_mut(hoi) {
                Some(c) => *c += 1,
                None => warn!("image {} has unknown class {}", sample.image_id, hoi),
            }
        }
    }

    println!(
        "\tInteractions per image: mean {:.2}, min {}, max {}",
        per_image.mean().unwrap_or(0.0),
        per_image.min().unwrap_or(0),
        per_image.max().unwrap_or(0),
    );

    let mut ranked: Vec<(usize, usize)> = counts.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    println!("\nTop {} classes:", args.top);
    for (hoi, n) in ranked.into_iter().take(args.top) {
        let [_, obj, verb] = class_corr[hoi];
        println!("  hoi {hoi:>3} (object {obj:>2}, verb {verb:>3}): {n} instances");
    }
    Ok(())
}
