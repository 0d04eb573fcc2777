//! # microstates: EEG microstate segmentation and sequence statistics
//!
//! `microstates` fits a small set of polarity-free prototype topographies to
//! a multichannel EEG recording, labels every sample with its best-matching
//! prototype, smooths the labelling in time and describes the resulting
//! label sequence (occupancy, transitions, reversibility, durations).
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.safetensors   [C, T] or [E, C, T]
//!   │
//!   ├─ io::load_recording()        safetensors reader
//!   ├─ Recording::exclude_*()      drop listed channels
//!   ├─ peaks::gfp_peaks()          GFP local maxima, per epoch
//!   ├─ kmeans::cluster()           polarity-invariant modified K-means,
//!   │                              n_inits runs in parallel, best GEV wins
//!   ├─ segment::backfit()          label every sample by max |r|
//!   ├─ smooth::smooth_labels()     penalised temporal smoothing
//!   ├─ border::mark_borders()      sentinel 88 at epoch edges
//!   └─ sequence::SequenceStats     stationary p, transition T, symmetry
//!        │                         test, durations, entropy
//!        └─→ results.safetensors + summary.json
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use microstates::{analyze, AnalysisConfig, Recording};
//! use ndarray::Array2;
//!
//! let data: Array2<f64> = Array2::zeros((19, 25_000)); // [C, T]
//! let rec = Recording::continuous(data, 250.0).unwrap();
//!
//! let cfg = AnalysisConfig::default();
//! let out = analyze(&rec, &cfg).unwrap();
//! println!("GEV {:.3}, {:.2} peaks/s", out.model.gev, out.peaks_per_second);
//! println!("p(state) = {}", out.stats.stationary);
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use microstates::{backfit, mark_borders, segment, smooth_labels, MicrostateConfig,
//!                   Recording, SequenceStats, SmoothingConfig, BORDER_SENTINEL};
//! use ndarray::Array3;
//!
//! let epochs: Array3<f64> = Array3::zeros((40, 32, 500)); // [E, C, T]
//! let rec = Recording::from_epochs(&epochs, 250.0).unwrap();
//!
//! let model = segment(&rec, &MicrostateConfig { n_states: 5, ..Default::default() }).unwrap();
//! let refit = backfit(&rec, model.maps.view()).unwrap();
//! let smoothed = smooth_labels(&rec, model.maps.view(), &refit.labels,
//!                              &SmoothingConfig::default()).unwrap();
//! let marked = mark_borders(&smoothed.labels, rec.n_epochs(), rec.epoch_len(), 5).unwrap();
//! let stats = SequenceStats::from_marked(&marked, BORDER_SENTINEL, 5, rec.sfreq(), 0.01).unwrap();
//! ```

pub mod border;
pub mod config;
pub mod error;
pub mod io;
pub mod kmeans;
pub mod peaks;
pub mod recording;
pub mod segment;
pub mod sequence;
pub mod smooth;
pub mod topography;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{AnalysisConfig, MicrostateConfig, PeakConfig, PeakSelection, SmoothingConfig};

// error
pub use error::{MicrostateError, Result};

// recording
pub use recording::Recording;

// topography: correlation primitives
pub use topography::{polarity_invariant_correlation, spatial_correlation};

// peaks
pub use peaks::{find_peaks, gfp, gfp_peaks, peaks_per_second};

// kmeans
pub use kmeans::{cluster, ClusterResult, KMeansRun};

// segment
pub use segment::{backfit, segment, MicrostateModel, Segmentation};

// smooth
pub use smooth::{count_runs, smooth, smooth_labels, SmoothResult};

// border
pub use border::{mark_borders, split_at_borders, strip_borders, BORDER_SENTINEL};

// sequence
pub use sequence::{Durations, SequenceStats, SymmetryTest};

/// Everything [`analyze`] produces for one recording.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Fitted maps and the raw back-fitted segmentation.
    pub model: MicrostateModel,
    /// Temporally smoothed segmentation (the input of the statistics).
    pub smoothed: SmoothResult,
    /// `smoothed.labels` with [`BORDER_SENTINEL`] at epoch edges. Equal to
    /// `smoothed.labels` for a continuous recording.
    pub marked: Vec<usize>,
    /// Sequence statistics of the smoothed segmentation.
    pub stats: SequenceStats,
    /// GFP peaks per second of recording.
    pub peaks_per_second: f64,
}

/// Run the **full microstate analysis** on one recording.
///
/// # Pipeline steps
///
/// 1. Validate `cfg`.
/// 2. Fit [`MicrostateConfig::n_states`] maps at the GFP peaks and back-fit
///    them to every sample ([`segment`]).
/// 3. Smooth the segmentation ([`smooth_labels`]).
/// 4. For epoched recordings, mark epoch borders so no transition spans
///    two epochs ([`mark_borders`]).
/// 5. Compute [`SequenceStats`] with the symmetry test at `cfg.alpha`.
///
/// The back-fitted segmentation in `model.segmentation` is left untouched;
/// the smoothed and marked labellings are derived copies.
///
/// # Errors
///
/// Any [`MicrostateError`] raised by a stage: an invalid configuration, an
/// empty recording, or fewer GFP peaks than requested states.
pub fn analyze(recording: &Recording, cfg: &AnalysisConfig) -> Result<Analysis> {
    cfg.validate()?;
    let n_states = cfg.microstates.n_states;

    let model = segment(recording, &cfg.microstates)?;
    let smoothed = smooth_labels(recording, model.maps.view(), &model.segmentation, &cfg.smoothing)?;
    tracing::info!(
        n_iter = smoothed.n_iter,
        converged = smoothed.converged,
        runs_before = count_runs(&model.segmentation),
        runs_after = count_runs(&smoothed.labels),
        "smoothed segmentation"
    );

    let (marked, stats) = if recording.n_epochs() > 1 {
        let marked = mark_borders(&smoothed.labels, recording.n_epochs(), recording.epoch_len(), n_states)?;
        let stats = SequenceStats::from_marked(&marked, BORDER_SENTINEL, n_states, recording.sfreq(), cfg.alpha)?;
        (marked, stats)
    } else {
        let stats = SequenceStats::from_labels(&smoothed.labels, n_states, recording.sfreq(), cfg.alpha)?;
        (smoothed.labels.clone(), stats)
    };

    let peaks_per_second = model.peaks_per_second(recording.sfreq());
    Ok(Analysis { model, smoothed, marked, stats, peaks_per_second })
}
