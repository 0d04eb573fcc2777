//! Global field power and GFP peak picking.
//!
//! GFP is the population standard deviation across channels at each sample
//! (`ddof = 0`). Topographies are most stable around GFP maxima, so only
//! those samples are handed to the clusterer.
//!
//! Peak picking follows the usual 1-D convention:
//!   1. a sample is a local maximum if it is strictly higher than its left
//!      neighbour and the first differing sample to its right is lower;
//!      flat plateaus are reported at their midpoint (rounded down);
//!   2. peaks are visited from highest to lowest (ties: earlier first) and
//!      every lower peak closer than `min_peak_dist` samples to an accepted
//!      one is discarded.
//!
//! On an epoched [`Recording`] the search runs inside each epoch, so no peak
//! ever sits on an epoch edge or compares against the neighbouring epoch.
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{PeakConfig, PeakSelection};
use crate::error::Result;
use crate::recording::Recording;

/// Per-sample GFP of `data` ([C, N]).
pub fn gfp(data: ArrayView2<f64>) -> Array1<f64> {
    if data.nrows() == 0 {
        return Array1::zeros(data.ncols());
    }
    data.std_axis(Axis(0), 0.0)
}

/// Local maxima of a 1-D signal (plateau midpoints), in ascending order.
pub fn local_maxima(x: ArrayView1<f64>) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let mut i = 1;
    while i < n - 1 {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let right = ahead - 1;
                peaks.push((i + right) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Drop peaks closer than `min_dist` to a higher one.
///
/// `peaks` must be sorted ascending; the result is too.
pub fn select_by_distance(peaks: &[usize], height: ArrayView1<f64>, min_dist: usize) -> Vec<usize> {
    if min_dist <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    // Highest first; stable sort keeps earlier peaks ahead on ties.
    order.sort_by(|&a, &b| height[peaks[b]].total_cmp(&height[peaks[a]]));

    let mut keep = vec![true; peaks.len()];
    for &j in &order {
        if !keep[j] {
            continue;
        }
        let p = peaks[j];
        let mut k = j;
        while k > 0 && p - peaks[k - 1] < min_dist {
            k -= 1;
            keep[k] = false;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - p < min_dist {
            keep[k] = false;
            k += 1;
        }
    }
    peaks.iter().zip(keep).filter_map(|(&p, k)| k.then_some(p)).collect()
}

/// GFP peaks of one continuous `[C, N]` block, before truncation.
pub fn find_peaks(data: ArrayView2<f64>, min_peak_dist: usize) -> Vec<usize> {
    let g = gfp(data);
    let maxima = local_maxima(g.view());
    select_by_distance(&maxima, g.view(), min_peak_dist)
}

/// GFP peaks of a whole recording, as global sample indices.
///
/// Peaks are searched per epoch, then truncated to
/// [`PeakConfig::max_n_peaks`] according to [`PeakConfig::selection`].
/// `seed` is only consumed by [`PeakSelection::Random`].
pub fn gfp_peaks(recording: &Recording, cfg: &PeakConfig, seed: u64) -> Result<Vec<usize>> {
    cfg.validate()?;
    let mut peaks = Vec::new();
    for (e, (start, _)) in recording.epoch_bounds().enumerate() {
        peaks.extend(
            find_peaks(recording.epoch(e), cfg.min_peak_dist)
                .into_iter()
                .map(|p| start + p),
        );
    }
    Ok(truncate_peaks(peaks, cfg, seed))
}

fn truncate_peaks(mut peaks: Vec<usize>, cfg: &PeakConfig, seed: u64) -> Vec<usize> {
    let Some(max_n) = cfg.max_n_peaks else {
        return peaks;
    };
    if peaks.len() <= max_n {
        return peaks;
    }
    tracing::debug!(found = peaks.len(), kept = max_n, policy = ?cfg.selection, "truncating GFP peaks");
    match cfg.selection {
        PeakSelection::Earliest => {
            peaks.truncate(max_n);
            peaks
        }
        PeakSelection::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            // Keep peak sampling independent of the K-means init streams.
            rng.set_stream(1);
            let mut chosen: Vec<usize> = rand::seq::index::sample(&mut rng, peaks.len(), max_n)
                .into_iter()
                .map(|i| peaks[i])
                .collect();
            chosen.sort_unstable();
            chosen
        }
    }
}

/// GFP peaks per second of recording.
pub fn peaks_per_second(n_peaks: usize, n_samples: usize, sfreq: f64) -> f64 {
    if n_samples == 0 {
        return 0.0;
    }
    n_peaks as f64 / (n_samples as f64 / sfreq)
}
