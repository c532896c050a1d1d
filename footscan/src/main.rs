use anyhow::{Context, Result};
use clap::Parser;

use footscan::FootScanPipeline;

/// Measure a foot from a photograph taken on top of a printed QR marker
#[derive(Parser, Debug)]
#[command(name = "footscan")]
#[command(about = "Measure feet from photos with a QR scale marker", long_about = None)]
struct Args {
    /// Input image file path
    #[arg(short, long)]
    input: String,

    /// Output path for the annotated preview image
    #[arg(short, long, default_value = "preview.png")]
    output: String,

    /// Physical edge length of the printed QR marker in centimeters
    #[arg(short, long, default_value = "5.0")]
    qr_size: f64,

    /// Skip the preview image and print measurements only
    #[arg(short, long)]
    measurements_only: bool,

    /// Print the measurement report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose pipeline diagnostics
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    println!("FootScan - Foot Measurement Tool");
    println!("================================");
    println!("Input: {}", args.input);
    println!("QR marker size: {}cm", args.qr_size);
    println!();

    let pipeline = FootScanPipeline::new();

    println!("Step 1: Measuring...");
    let measurements = pipeline
        .extract_measurements(&args.input, args.qr_size)
        .context("Measurement failed. Make sure the photo is readable and the foot fills the frame.")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&measurements)?);
    } else {
        println!("  Length:       {:.1} cm", measurements.length_cm);
        println!("  Width:        {:.1} cm", measurements.width_cm);
        println!("  Heel to arch: {:.1} cm", measurements.heel_to_arch_cm);
        println!("  Arch to toe:  {:.1} cm", measurements.arch_to_toe_cm);
        println!("  Big toe:      {:.1} cm", measurements.big_toe_length_cm);
        println!(
            "  Scale:        {}",
            if measurements.is_calibrated {
                "QR marker calibration"
            } else {
                "estimated (no usable marker)"
            }
        );
    }

    if args.measurements_only {
        return Ok(());
    }

    println!("\nStep 2: Rendering annotated preview...");
    let png = pipeline
        .measure_foot(&args.input, args.qr_size)
        .context("Preview rendering failed")?;
    std::fs::write(&args.output, &png)
        .with_context(|| format!("Failed to write {}", args.output))?;
    println!("Saved annotated preview to: {}", args.output);

    Ok(())
}
