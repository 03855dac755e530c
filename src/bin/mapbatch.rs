use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mapbatch", version)]
#[command(about = "Render every feature of a GeoJSON collection to its own PNG")]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one image per feature, an overview image, and a manifest.
    Render(RenderArgs),
    /// List the available style presets.
    Styles(StylesArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input GeoJSON FeatureCollection.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output directory; created if missing.
    #[arg(long)]
    out_dir: PathBuf,

    /// Style preset name.
    #[arg(long, default_value = mapbatch::DEFAULT_STYLE)]
    style: String,

    /// JSON file of extra presets, merged over the built-ins.
    #[arg(long)]
    style_file: Option<PathBuf>,

    /// Feature property holding the label (default: probe common names).
    #[arg(long)]
    label_field: Option<String>,

    /// Render on a worker pool.
    #[arg(long)]
    parallel: bool,

    /// Worker count for --parallel (default: MAPBATCH_THREADS, else one per core).
    #[arg(long)]
    threads: Option<usize>,

    /// Name of the overview image, before sanitizing.
    #[arg(long, default_value = mapbatch::pipeline::DEFAULT_OVERVIEW_NAME)]
    overview_name: String,

    /// File name of the manifest.
    #[arg(long, default_value = mapbatch::pipeline::DEFAULT_MANIFEST_NAME)]
    manifest_name: String,

    /// Heading of the manifest and overview.
    #[arg(long, default_value = mapbatch::pipeline::DEFAULT_TITLE)]
    title: String,

    /// Failures listed in the summary before the rest are counted.
    #[arg(long, default_value_t = mapbatch::manifest::DEFAULT_PREVIEW)]
    preview: usize,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct StylesArgs {
    /// JSON file of extra presets to include.
    #[arg(long)]
    style_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Styles(args) => cmd_styles(args),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_styles(style_file: Option<&Path>) -> anyhow::Result<mapbatch::StyleBook> {
    let book = mapbatch::StyleBook::builtin();
    Ok(match style_file {
        Some(path) => book.merge(mapbatch::StyleBook::from_path(path)?),
        None => book,
    })
}

fn env_threads() -> Option<usize> {
    std::env::var("MAPBATCH_THREADS")
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let book = load_styles(args.style_file.as_deref())?;
    let style = book.get(&args.style)?.clone();

    let label = match args.label_field {
        Some(field) => mapbatch::LabelField::Explicit(field),
        None => mapbatch::LabelField::Probe,
    };
    let collection = mapbatch::FeatureCollection::read_path(&args.in_path, &label)
        .with_context(|| format!("read features from '{}'", args.in_path.display()))?;

    let kind = match args.backend {
        BackendChoice::Cpu => mapbatch::BackendKind::Cpu,
    };
    let backend = mapbatch::create_backend(kind);

    let mut opts = mapbatch::PipelineOptions::new(&args.out_dir).with_style(&args.style, style);
    opts.overview_name = args.overview_name;
    opts.manifest_name = args.manifest_name;
    opts.title = args.title;
    opts.preview = args.preview;
    opts.batch.threading = mapbatch::RenderThreading {
        parallel: args.parallel,
        threads: args.threads.or_else(env_threads),
    };

    let report = mapbatch::run_pipeline(backend.as_ref(), &collection, &opts)?;

    eprintln!("{}", report.summary.console_report());
    let manifest = report.manifest.context("write manifest")?;
    eprintln!(
        "wrote {} ({} images)",
        manifest.path.display(),
        manifest.images_found
    );
    Ok(())
}

fn cmd_styles(args: StylesArgs) -> anyhow::Result<()> {
    let book = load_styles(args.style_file.as_deref())?;
    for (name, style) in book.iter() {
        println!(
            "{name:<12} fill {} edge {} background {} line {}pt {}dpi {}x{}in",
            style.fill_color,
            style.edge_color,
            style.background_color,
            style.line_width,
            style.dpi,
            style.figure_size.0,
            style.figure_size.1
        );
    }
    Ok(())
}
