//! Polarity-invariant modified K-means.
//!
//! Fits `n_states` unit prototype maps to GFP-peak topographies. Each
//! initialisation:
//!   1. picks `n_states` distinct peaks as starting maps;
//!   2. assigns every topography to the map with the largest `|r|`;
//!   3. replaces each map by the dominant eigenvector of the scatter matrix
//!      of its members (sign is irrelevant to step 2);
//!   4. stops once the residual variance
//!      `σ² = |Σ‖x‖² − Σ (a_L·x)²| / (P·(C−1))` changes by no more than
//!      `tol · σ²`, or after `max_iter` rounds.
//!
//! The `n_inits` initialisations are independent, run on the rayon pool, and
//! are each seeded with `seed + i`, so the result does not depend on thread
//! scheduling. The run with the highest GEV (ties: lowest index) is kept.
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::MicrostateConfig;
use crate::error::{MicrostateError, Result};
use crate::peaks::{gfp, gfp_peaks};
use crate::recording::Recording;
use crate::topography::{assign, average_reference, dominant_eigenvector, gev, normalize_columns, unit_maps};

/// Outcome of a single K-means initialisation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansRun {
    /// Prototype maps, `[n_states, C]`, unit norm, zero channel mean.
    pub maps: Array2<f64>,
    /// GEV of the fitted topographies.
    pub gev: f64,
    /// Index of the initialisation that produced this run.
    pub init: usize,
    pub n_iter: usize,
    pub converged: bool,
}

/// Best prototype set fitted to the GFP peaks of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResult {
    /// Prototype maps, `[n_states, C]`.
    pub maps: Array2<f64>,
    /// GEV over the peak topographies.
    pub gev: f64,
    /// Global sample indices of the peaks used for fitting.
    pub peaks: Vec<usize>,
    /// Base seed the initialisations were drawn from.
    pub seed: u64,
    /// Winning initialisation.
    pub init: usize,
    pub n_iter: usize,
    pub converged: bool,
}

impl ClusterResult {
    /// Treat a non-converged winning run as an error.
    pub fn ensure_converged(self, max_iter: usize) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(MicrostateError::ConvergenceFailure { stage: "modified k-means", max_iter })
        }
    }
}

/// Pick GFP peaks from `recording` and fit prototype maps to them.
pub fn cluster(recording: &Recording, cfg: &MicrostateConfig) -> Result<ClusterResult> {
    cfg.validate()?;
    let seed = cfg.resolve_seed();
    let peaks = gfp_peaks(recording, &cfg.peaks, seed)?;
    if peaks.len() < cfg.n_states {
        return Err(MicrostateError::insufficient(format!(
            "{} GFP peaks found, {} states requested",
            peaks.len(),
            cfg.n_states
        )));
    }
    let topographies = recording.data().select(Axis(1), &peaks);
    let run = fit(topographies.view(), cfg, seed)?;
    tracing::info!(
        n_peaks = peaks.len(),
        gev = run.gev,
        init = run.init,
        n_iter = run.n_iter,
        "fitted {} microstate maps",
        cfg.n_states
    );
    Ok(ClusterResult {
        maps: run.maps,
        gev: run.gev,
        peaks,
        seed,
        init: run.init,
        n_iter: run.n_iter,
        converged: run.converged,
    })
}

/// Fit `cfg.n_states` maps to the columns of `topographies` ([C, P]).
///
/// # Errors
///
/// * `InsufficientData` if there are no channels or fewer columns than states.
pub fn fit(topographies: ArrayView2<f64>, cfg: &MicrostateConfig, seed: u64) -> Result<KMeansRun> {
    cfg.validate()?;
    let (n_ch, n_topo) = topographies.dim();
    if n_ch == 0 {
        return Err(MicrostateError::insufficient("topographies have no channels"));
    }
    if n_topo < cfg.n_states {
        return Err(MicrostateError::insufficient(format!(
            "{n_topo} topographies cannot seed {} distinct states",
            cfg.n_states
        )));
    }

    let centered = average_reference(topographies);
    let strength = gfp(topographies);
    let mut fit_data = centered;
    if cfg.normalize {
        normalize_columns(&mut fit_data);
    }

    let runs: Vec<KMeansRun> = (0..cfg.n_inits)
        .into_par_iter()
        .map(|init| run_once(&fit_data, &strength, cfg, seed, init))
        .collect();

    let best = runs
        .into_iter()
        .reduce(|best, run| if run.gev > best.gev { run } else { best })
        .ok_or_else(|| MicrostateError::invalid_param("n_inits", "must be >= 1"))?;
    if !best.converged {
        tracing::warn!(
            init = best.init,
            max_iter = cfg.max_iter,
            "modified k-means reached its iteration cap without converging"
        );
    }
    Ok(best)
}

fn run_once(
    x: &Array2<f64>,
    strength: &Array1<f64>,
    cfg: &MicrostateConfig,
    seed: u64,
    init: usize,
) -> KMeansRun {
    let (n_ch, n_topo) = x.dim();
    let k = cfg.n_states;

    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(init as u64));
    let chosen = rand::seq::index::sample(&mut rng, n_topo, k);
    let mut maps = Array2::<f64>::zeros((k, n_ch));
    for (row, idx) in chosen.into_iter().enumerate() {
        maps.row_mut(row).assign(&x.column(idx));
    }
    let mut maps = unit_maps(maps.view());

    let data_sum_sq: f64 = x.iter().map(|v| v * v).sum();
    let dof = (n_topo * n_ch.saturating_sub(1).max(1)) as f64;
    // Residual changes at rounding level count as stable.
    let floor = 1e-12 * data_sum_sq / dof;
    let mut prev_residual = f64::INFINITY;
    let mut converged = false;
    let mut n_iter = 0;

    for iteration in 0..cfg.max_iter {
        n_iter = iteration + 1;
        let labels = assign(maps.view(), x.view()).labels;

        for state in 0..k {
            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter_map(|(t, &l)| (l == state).then_some(t))
                .collect();
            // An emptied cluster keeps its previous map.
            if members.is_empty() {
                continue;
            }
            let sub = x.select(Axis(1), &members);
            if let Some(v) = dominant_eigenvector(sub.view(), maps.row(state)) {
                maps.row_mut(state).assign(&v);
            }
        }

        let activation = maps.dot(x);
        let explained: f64 = activation
            .columns()
            .into_iter()
            .map(|col| col.iter().fold(0.0_f64, |m, a| m.max(a.abs())).powi(2))
            .sum();
        let residual = (data_sum_sq - explained).abs() / dof;
        if (prev_residual - residual).abs() <= cfg.tol * residual + floor {
            converged = true;
            break;
        }
        prev_residual = residual;
    }

    let corr = assign(maps.view(), x.view()).corr;
    let run_gev = gev(strength.view(), corr.view());
    tracing::debug!(init, n_iter, converged, gev = run_gev, "k-means run finished");
    KMeansRun { maps, gev: run_gev, init, n_iter, converged }
}
