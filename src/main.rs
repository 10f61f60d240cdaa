use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use histoview::gpu::GpuContext;
use histoview::{BackendKind, EnabledLayers, HistogramLayer, HistogramPipeline, HistogramTexture, Settings};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "histoview")]
#[command(version, about = "RGBL image histograms rendered as bar overlays", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BinningArgs {
    /// Number of bins per layer
    #[arg(short, long, value_name = "N")]
    bins: Option<u32>,

    /// Decode sRGB samples to linear values before binning
    #[arg(long, overrides_with = "gamma")]
    linear: bool,

    /// Bin the stored (gamma-encoded) values, overriding the settings file
    #[arg(long, overrides_with = "linear")]
    gamma: bool,

    /// Histogram buffers kept in flight
    #[arg(long, value_name = "N")]
    pool_size: Option<usize>,

    /// Execution backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Settings file (defaults to the per-user settings)
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,
}

impl BinningArgs {
    /// `Some` when either flag was given; the last one on the command line wins.
    fn is_linear(&self) -> Option<bool> {
        match (self.linear, self.gamma) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render the histogram of an image as a PNG overlay
    Render {
        /// Input image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (defaults to <INPUT>_histogram.png)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Layers to draw, e.g. "rgbl", "rgb" or "l"
        #[arg(short, long, value_name = "LAYERS")]
        layers: Option<EnabledLayers>,

        /// Overlay width in pixels
        #[arg(long, value_name = "PX")]
        width: Option<u32>,

        /// Overlay height in pixels
        #[arg(long, value_name = "PX")]
        height: Option<u32>,

        #[command(flatten)]
        binning: BinningArgs,
    },

    /// Print per-bin counts and per-layer maxima
    Stats {
        /// Input image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Only print non-empty bins
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        binning: BinningArgs,
    },

    /// Show GPU adapter information
    Info {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    histoview::logging::init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Render {
            input,
            out,
            layers,
            width,
            height,
            binning,
        } => cmd_render(&input, out, layers, width, height, &binning),
        Commands::Stats {
            input,
            json,
            compact,
            binning,
        } => cmd_stats(&input, json, compact, &binning),
        Commands::Info { json } => cmd_info(json),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Settings file values overridden by command-line flags.
fn resolve_settings(args: &BinningArgs) -> Result<Settings> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load(),
    };

    if let Some(bins) = args.bins {
        settings.bins_count = bins.try_into()?;
    }
    if let Some(is_linear) = args.is_linear() {
        settings.is_linear = is_linear;
    }
    if let Some(pool_size) = args.pool_size {
        settings.buffer_pool_size = pool_size;
    }
    settings.validate()?;
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    Ok(settings)
}

fn build_pipeline(settings: &Settings) -> Result<HistogramPipeline> {
    let mut pipeline = HistogramPipeline::with_backend_kind(settings.backend)
        .context("failed to initialize the histogram backend")?
        .with_pool_size(settings.buffer_pool_size)?;
    pipeline.apply(settings.pipeline_config());
    tracing::info!(backend = pipeline.backend_name(), bins = settings.bins_count.get(), "pipeline ready");
    Ok(pipeline)
}

fn load_texture(input: &Path) -> Result<HistogramTexture> {
    HistogramTexture::load(input).with_context(|| format!("failed to load {}", input.display()))
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}_histogram.png", stem))
}

fn cmd_render(
    input: &Path,
    out: Option<PathBuf>,
    layers: Option<EnabledLayers>,
    width: Option<u32>,
    height: Option<u32>,
    binning: &BinningArgs,
) -> Result<()> {
    let settings = resolve_settings(binning)?;
    let layers = layers.unwrap_or(settings.enabled_layers);
    let width = width.unwrap_or(settings.overlay_width);
    let height = height.unwrap_or(settings.overlay_height);

    let texture = load_texture(input)?;
    let mut pipeline = build_pipeline(&settings)?;

    let geometry = pipeline.process(&texture, layers)?;
    let overlay = pipeline.render(layers, width, height, settings.background)?;

    let output_path = out.unwrap_or_else(|| default_output_path(input));
    overlay
        .save(&output_path)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    println!(
        "{}: {}x{} overlay, {} bins, {} vertices, backend {} -> {}",
        input.display(),
        width,
        height,
        pipeline.bins_count(),
        geometry.len(),
        pipeline.backend_name(),
        output_path.display()
    );
    pipeline.profiler_stats().log();
    Ok(())
}

fn cmd_stats(input: &Path, json: bool, compact: bool, binning: &BinningArgs) -> Result<()> {
    let settings = resolve_settings(binning)?;
    let texture = load_texture(input)?;
    let mut pipeline = build_pipeline(&settings)?;

    pipeline.process(&texture, EnabledLayers::NONE)?;
    let histogram = pipeline.histogram();
    histogram.dump();

    if json {
        println!("{}", serde_json::to_string_pretty(&histogram.snapshot())?);
        return Ok(());
    }

    println!(
        "{} ({}x{}, {} bins, {})",
        input.display(),
        texture.width(),
        texture.height(),
        histogram.bins_count(),
        if pipeline.is_linear() { "linear" } else { "gamma" }
    );
    println!("{:>6} {:>10} {:>10} {:>10} {:>10}", "bin", "red", "green", "blue", "luminance");
    for index in 0..histogram.bins_count().as_usize() {
        let Some([r, g, b, l]) = histogram.bin(index) else {
            continue;
        };
        if compact && r == 0 && g == 0 && b == 0 && l == 0 {
            continue;
        }
        println!("{:>6} {:>10} {:>10} {:>10} {:>10}", index, r, g, b, l);
    }

    let maxima = histogram.max_bin_values();
    println!(
        "{:>6} {:>10} {:>10} {:>10} {:>10}",
        "max",
        maxima.get(HistogramLayer::Red),
        maxima.get(HistogramLayer::Green),
        maxima.get(HistogramLayer::Blue),
        maxima.get(HistogramLayer::Luminance)
    );
    Ok(())
}

fn cmd_info(json: bool) -> Result<()> {
    let context = GpuContext::blocking().context("failed to initialize the GPU")?;
    let info = context.info();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info);
        println!("Binding contract: v{}", histoview::gpu::BINDING_CONTRACT_VERSION);
    }
    Ok(())
}
