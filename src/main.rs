use clap::Parser;
use image::ImageReader;
use std::path::PathBuf;

use fhedigit::config::SimulatedLatency;
use fhedigit::{
    HttpClassifier, Orchestrator, PipelineConfig, PipelineRun, PixelBuffer, StartOutcome,
    TransmitOutcome,
};

#[derive(Parser)]
#[command(name = "fhedigit")]
#[command(about = "Classify a hand-drawn digit through the staged remote pipeline")]
struct Cli {
    /// Path to the drawing (any format the image crate decodes)
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Classifier endpoint, overrides the config file
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Stop after the local stages, nothing is sent
    #[arg(long)]
    skip_remote: bool,

    /// Print the normalized vector as JSON
    #[arg(long)]
    dump_vector: bool,

    /// Disable the simulated stage delays
    #[arg(long)]
    no_delay: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(endpoint) = args.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if args.no_delay {
        config = config.with_latency(SimulatedLatency::none());
    }

    log::debug!("Loading image: {:?}", args.image_path);
    let img = ImageReader::open(&args.image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    log::debug!("Image loaded: {}x{}", img.width(), img.height());
    let buffer = PixelBuffer::from_image(&img);

    let classifier = HttpClassifier::from_config(&config.classifier)?;
    let mut orchestrator = Orchestrator::new(classifier, &config);
    if let Some(debug_dir) = args.debug_out {
        orchestrator = orchestrator.with_debug(debug_dir)?;
    }

    let started = orchestrator.start(&buffer).await?;

    // the payload is exactly what gets sent
    if args.dump_vector {
        match orchestrator.run().payload() {
            Some(vector) => println!("{}", serde_json::to_string(vector)?),
            None => println!("[]"),
        }
    }

    if started != StartOutcome::Encrypted {
        print_run(orchestrator.run());
        return Ok(());
    }

    if args.skip_remote {
        print_run(orchestrator.run());
        if let Some(vector) = orchestrator.run().payload() {
            println!("\nInk cells: {} of {}", vector.ink_cells(), vector.len());
            if let Some((x, y)) = vector.centroid() {
                println!("Ink centroid: ({:.1}, {:.1})", x, y);
            }
        }
        return Ok(());
    }

    match orchestrator.advance_to_transmit().await {
        Ok(TransmitOutcome::Classified(_)) => {}
        Ok(TransmitOutcome::Discarded) => return Ok(()),
        Err(e) => {
            print_run(orchestrator.run());
            return Err(e.into());
        }
    }

    let prediction = orchestrator.decrypt().await?;
    print_run(orchestrator.run());

    println!("\n=== Classification Result ===");
    match prediction.confidence {
        Some(confidence) => println!("Digit: {} (confidence: {:.1}%)", prediction.label, confidence),
        None => println!("Digit: {}", prediction.label),
    }

    Ok(())
}

fn print_run(run: &PipelineRun) {
    println!("\n=== Stages ===");
    for stage in run.stages() {
        let elapsed = stage
            .elapsed
            .map(|d| format!("{:.2}s", d.as_secs_f32()))
            .unwrap_or_default();
        println!("  {:<10} {:<10} {:>7}  {}", stage.id, stage.status, elapsed, stage.label);
    }

    println!("\n=== Log ===");
    for entry in run.log() {
        println!("  {}", entry);
    }
}
