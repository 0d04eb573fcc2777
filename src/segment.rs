//! Back-fitting prototype maps to every sample.
//!
//! [`backfit`] labels each sample with the map of highest `|r|` (exact ties:
//! lowest index) and reports the GEV over all samples. It is deterministic,
//! so re-running it with the same maps yields the same labels.
//!
//! [`segment`] chains peak picking, modified K-means and back-fitting into
//! the usual single-call entry point.
use ndarray::{Array2, ArrayView2};

use crate::config::MicrostateConfig;
use crate::error::{MicrostateError, Result};
use crate::kmeans::{cluster, ClusterResult};
use crate::peaks::{gfp, peaks_per_second};
use crate::recording::Recording;
use crate::topography::{assign, average_reference, gev, unit_maps};

/// One label per sample plus the GEV of that labelling.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Map index per sample, each in `[0, n_states)`.
    pub labels: Vec<usize>,
    /// GEV over all samples.
    pub gev: f64,
}

/// Label every sample of `recording` with its best-matching map.
///
/// `maps` is `[n_states, C]`; rows need not be normalised or centred.
pub fn backfit(recording: &Recording, maps: ArrayView2<f64>) -> Result<Segmentation> {
    backfit_data(recording.data(), maps)
}

/// [`backfit`] on a bare `[C, N]` matrix.
pub fn backfit_data(data: ArrayView2<f64>, maps: ArrayView2<f64>) -> Result<Segmentation> {
    check_maps(maps, data.nrows())?;
    if data.ncols() == 0 {
        return Err(MicrostateError::insufficient("no samples to segment"));
    }
    let centered = average_reference(data);
    let fit = assign(unit_maps(maps).view(), centered.view());
    let strength = gfp(data);
    Ok(Segmentation { gev: gev(strength.view(), fit.corr.view()), labels: fit.labels })
}

pub(crate) fn check_maps(maps: ArrayView2<f64>, n_channels: usize) -> Result<()> {
    if maps.nrows() == 0 {
        return Err(MicrostateError::invalid_param("maps", "at least one map is required"));
    }
    if maps.ncols() != n_channels {
        return Err(MicrostateError::shape(format!(
            "maps have {} channels, recording has {n_channels}",
            maps.ncols()
        )));
    }
    Ok(())
}

/// Fitted maps together with the segmentation of the whole recording.
#[derive(Debug, Clone, PartialEq)]
pub struct MicrostateModel {
    /// Prototype maps, `[n_states, C]`, unit norm.
    pub maps: Array2<f64>,
    /// GFP peaks used to fit the maps (global sample indices).
    pub peaks: Vec<usize>,
    /// GEV over the peak topographies.
    pub cluster_gev: f64,
    /// Label per sample.
    pub segmentation: Vec<usize>,
    /// GEV over all samples.
    pub gev: f64,
    /// Base seed of the clustering run.
    pub seed: u64,
    /// Whether the winning K-means run converged.
    pub converged: bool,
}

impl MicrostateModel {
    pub fn n_states(&self) -> usize {
        self.maps.nrows()
    }

    /// GFP peaks per second of the segmented recording.
    pub fn peaks_per_second(&self, sfreq: f64) -> f64 {
        peaks_per_second(self.peaks.len(), self.segmentation.len(), sfreq)
    }
}

/// Fit `cfg.n_states` maps at the GFP peaks of `recording` and back-fit
/// them to every sample.
///
/// # Examples
///
/// ```
/// use microstates::{segment, MicrostateConfig, Recording};
/// use ndarray::Array2;
///
/// let data = Array2::from_shape_fn((8, 500), |(c, t)| {
///     ((c as f64 + 1.0) * t as f64 * 0.05).sin()
/// });
/// let rec = Recording::continuous(data, 250.0).unwrap();
/// let cfg = MicrostateConfig { n_states: 3, n_inits: 2, seed: Some(0), ..Default::default() };
/// let model = segment(&rec, &cfg).unwrap();
/// assert_eq!(model.segmentation.len(), 500);
/// assert!(model.segmentation.iter().all(|&l| l < 3));
/// ```
pub fn segment(recording: &Recording, cfg: &MicrostateConfig) -> Result<MicrostateModel> {
    let ClusterResult { maps, gev: cluster_gev, peaks, seed, converged, .. } =
        cluster(recording, cfg)?;
    let seg = backfit(recording, maps.view())?;
    tracing::info!(gev = seg.gev, n_samples = seg.labels.len(), "back-fitted microstate maps");
    Ok(MicrostateModel {
        maps,
        peaks,
        cluster_gev,
        segmentation: seg.labels,
        gev: seg.gev,
        seed,
        converged,
    })
}
