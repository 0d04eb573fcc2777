/// microstates: load a recording, fit microstate maps, smooth the
/// segmentation and write maps, labels and sequence statistics.
///
/// Output keys (see `io::write_results`):
///   maps                 [K, C]  f64
///   segmentation         [N]     i32  back-fitted labels
///   segmentation_smooth  [N]     i32  after temporal smoothing
///   segmentation_marked  [N]     i32  88 at epoch borders
///   peaks                [P]     i32
///   gev, pps             [1]     f64
///   stationary           [K]     f64
///   transition           [K, K]  f64
///   durations_mean       [K]     f64  seconds
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use microstates::{
    analyze,
    io::{load_recording, write_results, Summary},
    AnalysisConfig, PeakSelection,
};

#[derive(Parser, Debug)]
#[command(name = "microstates", about = "EEG microstate segmentation and sequence statistics")]
struct Args {
    /// Recording in safetensors format (`data`, `sfreq`, optional `ch_names`).
    #[arg(long)]
    input: PathBuf,

    /// Results safetensors path.
    #[arg(long)]
    output: PathBuf,

    /// Optional JSON summary path.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// JSON configuration; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of microstate maps.
    #[arg(long)]
    n_states: Option<usize>,

    /// Number of K-means initialisations.
    #[arg(long)]
    n_inits: Option<usize>,

    /// Base RNG seed (drawn at random if omitted).
    #[arg(long)]
    seed: Option<u64>,

    /// Scale peak topographies to unit norm before clustering.
    #[arg(long)]
    normalize: bool,

    /// Minimum distance between GFP peaks (samples).
    #[arg(long)]
    min_peak_dist: Option<usize>,

    /// Maximum number of GFP peaks (0 = no limit).
    #[arg(long)]
    max_n_peaks: Option<usize>,

    /// Keep a random subset of peaks instead of the earliest ones.
    #[arg(long)]
    random_peaks: bool,

    /// Smoothing half-window (samples).
    #[arg(long)]
    half_window: Option<usize>,

    /// Smoothing penalty weight.
    #[arg(long)]
    lambda: Option<f64>,

    /// Significance level of the symmetry test.
    #[arg(long)]
    alpha: Option<f64>,

    /// Channels to exclude (comma-separated names, or indices if the file
    /// has no channel names).
    #[arg(long, default_value = "")]
    exclude: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut cfg = match &self.config {
            Some(path) => AnalysisConfig::from_json(path)?,
            None => AnalysisConfig::default(),
        };
        let ms = &mut cfg.microstates;
        if let Some(v) = self.n_states { ms.n_states = v; }
        if let Some(v) = self.n_inits { ms.n_inits = v; }
        if self.seed.is_some() { ms.seed = self.seed; }
        if self.normalize { ms.normalize = true; }
        if let Some(v) = self.min_peak_dist { ms.peaks.min_peak_dist = v; }
        if let Some(v) = self.max_n_peaks {
            ms.peaks.max_n_peaks = (v > 0).then_some(v);
        }
        if self.random_peaks { ms.peaks.selection = PeakSelection::Random; }
        if let Some(v) = self.half_window { cfg.smoothing.half_window = v; }
        if let Some(v) = self.lambda { cfg.smoothing.lambda = v; }
        if let Some(v) = self.alpha { cfg.alpha = v; }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(
            args.log_level
                .parse::<tracing_subscriber::filter::LevelFilter>()
                .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO),
        )
        .with_target(false)
        .init();

    let mut cfg = args.analysis_config()?;

    let file = load_recording(&args.input)?;
    let mut rec = file.recording;
    println!("Loaded {} ch × {} samples ({} epochs) @ {} Hz",
        rec.n_channels(), rec.n_samples(), rec.n_epochs(), rec.sfreq());

    let exclude: Vec<String> = args.exclude
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if !exclude.is_empty() {
        rec = if file.ch_names.is_empty() {
            let idx = exclude
                .iter()
                .map(|s| s.parse::<usize>().with_context(|| format!("channel index '{s}'")))
                .collect::<Result<Vec<_>>>()?;
            rec.exclude_channels(&idx)?
        } else {
            rec.exclude_channel_names(&exclude, &file.ch_names)?
        };
        println!("Kept {} channels after exclusion", rec.n_channels());
    }

    // Fix the seed once so the summary can report it.
    cfg.microstates.seed = Some(cfg.microstates.resolve_seed());

    let analysis = analyze(&rec, &cfg)?;
    println!("Fitted {} maps: GEV {:.4} ({} peaks, {:.2} peaks/s)",
        analysis.model.n_states(), analysis.model.gev,
        analysis.model.peaks.len(), analysis.peaks_per_second);
    println!("Symmetry test: T = {:.3}, df = {}, p = {:.3e}",
        analysis.stats.symmetry.statistic,
        analysis.stats.symmetry.df,
        analysis.stats.symmetry.p_value);

    write_results(&args.output, &analysis)?;
    println!("Written → {}", args.output.display());

    if let Some(path) = &args.summary {
        Summary::from_analysis(&analysis, &rec).write_json(path)?;
        println!("Summary → {}", path.display());
    }

    Ok(())
}
