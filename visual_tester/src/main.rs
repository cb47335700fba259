use anyhow::{Context, Result, bail};
use chroma_vision::{ImageSequenceSource, PngSequenceSink, Renderer, TrackerConfig, VisionPipeline};
use std::env;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FRAME_RATE: f64 = 30.0;

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("Usage: visual_tester <input_frame_dir> <output_frame_dir> [config.toml] [frame_rate]");
    }
    let input_dir = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);
    let config = match args.get(3) {
        Some(path) => TrackerConfig::load(Path::new(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => TrackerConfig::default(),
    };
    let frame_rate = match args.get(4) {
        Some(rate) => rate.parse::<f64>().with_context(|| format!("invalid frame rate `{rate}`"))?,
        None => DEFAULT_FRAME_RATE,
    };

    // --- 2. Logging ---
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 3. Frame I/O Initialization ---
    let source = ImageSequenceSource::open(&input_dir, frame_rate)
        .with_context(|| format!("opening frames in {}", input_dir.display()))?;
    let renderer = Renderer::new(config.display.key_color, config.display.mirror_output);
    let mut sink = PngSequenceSink::create(&output_dir, renderer)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    // --- 4. Stop on Ctrl-C ---
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing the current frame");
            let _ = stop_tx.send(true);
        }
    });

    // --- 5. Main Processing Loop ---
    let mut pipeline = VisionPipeline::new(config)?;
    let summary = chroma_vision::run(&mut pipeline, source, &mut sink, stop_rx).await?;

    info!(
        frames = summary.frames,
        written = sink.written(),
        output = %output_dir.display(),
        "processing complete"
    );
    Ok(())
}
