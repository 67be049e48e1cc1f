use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pcb_inspect::AppConfig;
use pcb_inspect::detector::OnnxYolo;
use pcb_inspect::evaluation::{Dataset, evaluate};

/// Score the defect detector on a labelled dataset.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ONNX model file; defaults to the configured model
    #[arg(long, value_name = "MODEL")]
    pub model: Option<PathBuf>,
    /// Ultralytics dataset description
    #[arg(long, default_value = "data.yaml", value_name = "FILE")]
    pub data: PathBuf,
    /// Minimum confidence for a prediction to be scored
    #[arg(long, default_value = "0.001", value_name = "THRESHOLD")]
    pub conf: f32,
    /// IoU used for non-maximum suppression
    #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
    pub iou: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load()?;
    if let Some(model) = args.model {
        config.model_path = model;
    }
    config.iou_threshold = args.iou;

    let dataset = Dataset::from_file(&args.data)?;
    if !dataset.names.is_empty() {
        config.class_names = dataset.names.clone();
    }

    info!("model: {}", config.model_path.display());
    info!("dataset: {}", args.data.display());

    let mut model = OnnxYolo::load(&config)
        .with_context(|| format!("loading {}", config.model_path.display()))?;

    let now = std::time::Instant::now();
    let metrics = evaluate(&mut model, &dataset, args.conf)?;
    info!("evaluation finished in {:.2?}", now.elapsed());

    println!("{}", metrics);
    Ok(())
}
