use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ripeness::detection::load_image;
use ripeness::detection::overlay::draw_overlays;
use ripeness::{Config, RecordedLoader, RipenessClassifier};

#[derive(Parser)]
#[command(name = "ripeness")]
#[command(about = "Classify fruit-cluster ripeness from recorded model output")]
struct Cli {
    /// Input image files
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// Recorded detections (JSON) to replay as the model runtime
    #[arg(long, value_name = "JSON", env = "RIPENESS_WEIGHTS_PATH")]
    recorded: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write annotated PNGs to this directory
    #[arg(long, value_name = "DIR")]
    overlay_out: Option<PathBuf>,

    /// Save preprocessing debug images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print the flat per-detection format
    #[arg(long)]
    legacy: bool,

    /// Print the performance summary after all images
    #[arg(long)]
    stats: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ripeness=debug" } else { "ripeness=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(recorded) = &args.recorded {
        config = config.with_weights_path(recorded);
    }

    let mut classifier = RipenessClassifier::new(config, &RecordedLoader)?;

    if args.verbose || args.debug_out.is_some() {
        let mut pipeline = classifier
            .preprocessor()
            .pipeline()
            .clone()
            .with_verbose(args.verbose);
        if let Some(debug_dir) = &args.debug_out {
            pipeline = pipeline.with_debug(debug_dir.clone())?;
        }
        classifier = classifier.with_preprocessing_pipeline(pipeline);
    }

    if let Some(dir) = &args.overlay_out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create overlay directory {}", dir.display()))?;
    }

    let mut outputs = Vec::with_capacity(args.images.len());
    for (item, path) in args.images.iter().enumerate() {
        tracing::info!("classifying {}", path.display());
        let decoded = load_image(path);
        let result = match &decoded {
            Ok(image) => classifier.classify_item(&image.to_rgb8(), item),
            Err(e) => classifier.image_load_failed(path, e),
        };

        if let (Some(dir), Ok(image)) = (&args.overlay_out, &decoded) {
            if result.success {
                let annotated = draw_overlays(&image.to_rgb8(), &result.detections);
                let stem = path.file_stem().map_or_else(
                    || format!("image_{:02}", item + 1),
                    |s| s.to_string_lossy().into_owned(),
                );
                let out = dir.join(format!("{}_overlay.png", stem));
                annotated
                    .save(&out)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                tracing::info!("wrote overlay {}", out.display());
            }
        }

        let value = if args.legacy {
            serde_json::to_value(result.to_legacy())?
        } else {
            serde_json::to_value(&result)?
        };
        outputs.push(value);
    }

    let document = if outputs.len() == 1 {
        outputs.remove(0)
    } else {
        serde_json::Value::Array(outputs)
    };
    println!("{}", serde_json::to_string_pretty(&document)?);

    if args.stats {
        match classifier.performance_stats() {
            Some(summary) => eprintln!("{}", serde_json::to_string_pretty(&summary)?),
            None => eprintln!("no successful classifications recorded"),
        }
    }

    Ok(())
}
