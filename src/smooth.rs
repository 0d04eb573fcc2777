//! Penalised temporal smoothing of a segmentation.
//!
//! Each pass relabels every sample `t` with the map `k` minimising
//!
//! ```text
//! cost(k, t) = (‖x_t‖² − (a_k·x_t)²) / (2 σ² (C − 1))  +  λ · D_k(t)
//! ```
//!
//! where `x_t` is the average-referenced topography, `a_k` the unit map,
//! `σ²` the residual variance of the starting labelling and `D_k(t)` the
//! number of samples within `±b` of `t` (same epoch only) whose label is not
//! `k`. The first term is `‖x_t‖²·(1 − r²)` in units of the noise level, so
//! strong, well-fitting samples resist relabelling while weak flicker is
//! absorbed by its neighbours.
//!
//! A pass is one in-order sweep over a private copy of the labelling: each
//! sample sees the labels its left neighbours received earlier in the same
//! sweep. With symmetric windows the total cost
//! `Σ data(L_t, t) + λ · #{disagreeing pairs within b}` is exactly what a
//! single-sample update minimises, so every relabelling lowers it and the
//! sweeps settle. Neighbour agreement is kept as a running count of labels
//! in the sliding window, so a sweep costs `O(N · K)` regardless of `b`.
//!
//! Iteration stops when
//!   * a sweep changes at most `tol · N` labels (converged);
//!   * a sweep would leave more runs than the input segmentation had; the
//!     previous labelling is kept (not converged);
//!   * `max_iter` sweeps have run (not converged).
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::config::SmoothingConfig;
use crate::error::{MicrostateError, Result};
use crate::recording::Recording;
use crate::segment::{backfit, check_maps};
use crate::topography::{average_reference, unit_maps, EPS};

/// Smoothed labelling and how it was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothResult {
    /// Label per sample, same length as the input segmentation.
    pub labels: Vec<usize>,
    /// Number of passes evaluated.
    pub n_iter: usize,
    pub converged: bool,
}

impl SmoothResult {
    /// Treat a non-converged smoothing as an error.
    pub fn ensure_converged(self, max_iter: usize) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(MicrostateError::ConvergenceFailure { stage: "segmentation smoothing", max_iter })
        }
    }
}

/// Back-fit `maps` to `recording`, then smooth the resulting labels.
pub fn smooth(recording: &Recording, maps: ArrayView2<f64>, cfg: &SmoothingConfig) -> Result<SmoothResult> {
    let initial = backfit(recording, maps)?;
    smooth_labels(recording, maps, &initial.labels, cfg)
}

/// Smooth an existing segmentation of `recording`.
pub fn smooth_labels(
    recording: &Recording,
    maps: ArrayView2<f64>,
    initial: &[usize],
    cfg: &SmoothingConfig,
) -> Result<SmoothResult> {
    cfg.validate()?;
    check_maps(maps, recording.n_channels())?;
    let n = recording.n_samples();
    let k = maps.nrows();
    if initial.len() != n {
        return Err(MicrostateError::shape(format!(
            "segmentation has {} labels, recording has {n} samples",
            initial.len()
        )));
    }
    if let Some(&bad) = initial.iter().find(|&&l| l >= k) {
        return Err(MicrostateError::invalid_param(
            "segmentation",
            format!("label {bad} outside [0, {k})"),
        ));
    }

    let costs = match data_costs(recording.data(), maps, initial) {
        Some(c) => c,
        None => {
            tracing::debug!("segmentation already fits exactly, nothing to smooth");
            return Ok(SmoothResult { labels: initial.to_vec(), n_iter: 0, converged: true });
        }
    };
    let bounds: Vec<(usize, usize)> = recording.epoch_bounds().collect();

    let runs_in = count_runs(initial);
    let mut current = initial.to_vec();
    let mut converged = false;
    let mut fragmented = false;
    let mut n_iter = 0;

    for iteration in 0..cfg.max_iter {
        n_iter = iteration + 1;
        let next = relabel_pass(&current, &costs, &bounds, cfg.half_window, cfg.lambda);
        let changed = current.iter().zip(&next).filter(|(a, b)| a != b).count();
        if count_runs(&next) > runs_in {
            tracing::warn!(iteration, changed, "sweep would fragment the input segmentation, keeping the previous labelling");
            fragmented = true;
            break;
        }
        current = next;
        if changed as f64 <= cfg.tol * n as f64 {
            tracing::debug!(iteration, changed, "smoothing converged");
            converged = true;
            break;
        }
    }
    if !converged && !fragmented {
        tracing::warn!(max_iter = cfg.max_iter, "smoothing reached its iteration cap");
    }
    Ok(SmoothResult { labels: current, n_iter, converged })
}

/// Data term of the cost, `[K, N]`. `None` when the starting labelling
/// leaves no residual variance.
fn data_costs(data: ArrayView2<f64>, maps: ArrayView2<f64>, labels: &[usize]) -> Option<Array2<f64>> {
    let (n_ch, n) = data.dim();
    let centered = average_reference(data);
    let activation = unit_maps(maps).dot(&centered); // [K, N]
    let energy: Array1<f64> = centered.map_axis(Axis(0), |col| col.dot(&col));

    let dof = n_ch.saturating_sub(1).max(1) as f64;
    let residual: f64 = labels
        .iter()
        .enumerate()
        .map(|(t, &l)| energy[t] - activation[[l, t]].powi(2))
        .sum::<f64>()
        / (n as f64 * dof);
    let total = energy.sum() / (n as f64 * dof);
    if residual <= EPS * total.max(EPS) {
        return None;
    }

    let scale = 1.0 / (2.0 * residual * dof);
    let mut costs = activation;
    for ((_, t), c) in costs.indexed_iter_mut() {
        *c = (energy[t] - *c * *c).max(0.0) * scale;
    }
    Some(costs)
}

/// One in-order relabelling sweep. `prev` is left untouched; the sweep
/// works on its own copy, so later samples see earlier updates.
fn relabel_pass(
    prev: &[usize],
    costs: &Array2<f64>,
    bounds: &[(usize, usize)],
    b: usize,
    lambda: f64,
) -> Vec<usize> {
    let k = costs.nrows();
    let mut cur = prev.to_vec();
    let mut counts = vec![0usize; k];

    for &(start, end) in bounds {
        let len = end - start;
        counts.iter_mut().for_each(|c| *c = 0);
        // Labels of cur[start + wlo .. start + whi] are tallied in `counts`.
        let (mut wlo, mut whi) = (0, 0);

        for i in 0..len {
            let lo = i.saturating_sub(b);
            let hi = (i + b + 1).min(len);
            while wlo < lo {
                counts[cur[start + wlo]] -= 1;
                wlo += 1;
            }
            while whi < hi {
                counts[cur[start + whi]] += 1;
                whi += 1;
            }

            let t = start + i;
            let own = cur[t];
            let window = hi - lo - 1;
            let cost_of = |s: usize| {
                let agree = counts[s] - usize::from(own == s);
                costs[[s, t]] + lambda * (window - agree) as f64
            };

            // Keep the current label unless another is strictly cheaper.
            let mut best = own;
            let mut best_cost = cost_of(own);
            for s in 0..k {
                let c = cost_of(s);
                if c < best_cost {
                    best = s;
                    best_cost = c;
                }
            }
            if best != own {
                counts[own] -= 1;
                counts[best] += 1;
                cur[t] = best;
            }
        }
    }
    cur
}

/// Number of maximal runs of equal labels.
pub fn count_runs(labels: &[usize]) -> usize {
    if labels.is_empty() {
        return 0;
    }
    1 + labels.windows(2).filter(|w| w[0] != w[1]).count()
}
