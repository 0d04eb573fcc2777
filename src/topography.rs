//! Polarity-invariant topography comparison.
//!
//! A topography is one column of a `[C, N]` recording. Two topographies are
//! compared through their spatial correlation: both are centred across
//! channels (average reference), then the cosine of the centred vectors is
//! taken. A map and its sign flip describe the same microstate, so every
//! assignment in the crate goes through the absolute value `|r|` computed
//! here, and explained variance through `r²`.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Norms below this are treated as zero (flat topography).
pub(crate) const EPS: f64 = 1e-12;

/// Subtract the mean across channels at each time point.
///
/// `data`: [C, N] → `out[c, n] = data[c, n] − mean(data[:, n])`
pub fn average_reference(data: ArrayView2<f64>) -> Array2<f64> {
    let mut out = data.to_owned();
    if let Some(means) = data.mean_axis(Axis(0)) {
        for mut row in out.rows_mut() {
            row -= &means;
        }
    }
    out
}

/// Scale every column of `data` to unit Euclidean norm. Zero columns stay zero.
pub fn normalize_columns(data: &mut Array2<f64>) {
    for mut col in data.columns_mut() {
        let n = col.dot(&col).sqrt();
        if n > EPS {
            col /= n;
        }
    }
}

/// Centre each row of `maps` ([K, C]) across channels and scale it to unit
/// norm. Rows that are flat after centring become zero.
pub fn unit_maps(maps: ArrayView2<f64>) -> Array2<f64> {
    let mut out = average_reference(maps.t()).reversed_axes();
    for mut row in out.rows_mut() {
        let n = row.dot(&row).sqrt();
        if n > EPS {
            row /= n;
        } else {
            row.fill(0.0);
        }
    }
    out
}

/// Spatial (Pearson) correlation between two topographies.
///
/// Returns `0.0` when either vector is flat or the channel counts differ.
pub fn spatial_correlation(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as f64;
    let ma = a.sum() / n;
    let mb = b.sum() / n;
    let (mut ab, mut aa, mut bb) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (dx, dy) = (x - ma, y - mb);
        ab += dx * dy;
        aa += dx * dx;
        bb += dy * dy;
    }
    let denom = (aa * bb).sqrt();
    if denom > EPS { ab / denom } else { 0.0 }
}

/// `|r|`: identical for a topography and its negation.
pub fn polarity_invariant_correlation(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    spatial_correlation(a, b).abs()
}

/// Best-matching map per topography.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Index of the winning map per column.
    pub labels: Vec<usize>,
    /// `|r|` between each column and its winning map.
    pub corr: Array1<f64>,
}

/// Assign every column of `centered` ([C, N], already average-referenced)
/// to the row of `maps` ([K, C], output of [`unit_maps`]) with the largest
/// `|r|`. Exact ties go to the lowest map index; flat columns get label 0.
pub fn assign(maps: ArrayView2<f64>, centered: ArrayView2<f64>) -> Assignment {
    let activation = maps.dot(&centered); // [K, N]
    let n = centered.ncols();
    let mut labels = Vec::with_capacity(n);
    let mut corr = Array1::<f64>::zeros(n);
    for (t, col) in activation.columns().into_iter().enumerate() {
        let mut best = 0;
        let mut best_abs = f64::NEG_INFINITY;
        for (k, &a) in col.iter().enumerate() {
            if a.abs() > best_abs {
                best = k;
                best_abs = a.abs();
            }
        }
        let x = centered.column(t);
        let norm = x.dot(&x).sqrt();
        labels.push(best);
        corr[t] = if norm > EPS { (best_abs / norm).min(1.0) } else { 0.0 };
    }
    Assignment { labels, corr }
}

/// Global explained variance: `Σ (gfp·r)² / Σ gfp²`. Zero for a flat signal.
pub fn gev(gfp: ArrayView1<f64>, corr: ArrayView1<f64>) -> f64 {
    let total: f64 = gfp.iter().map(|g| g * g).sum();
    if total <= EPS {
        return 0.0;
    }
    gfp.iter().zip(corr.iter()).map(|(g, r)| (g * r).powi(2)).sum::<f64>() / total
}

/// Dominant eigenvector of the scatter matrix `x · xᵀ` of the columns of
/// `x` ([C, n]), by power iteration started from `start`.
///
/// No mean is removed across columns, so a topography and its negation
/// contribute identically. The sign of the result is chosen to agree with
/// `start`. Returns `None` when the scatter matrix is zero.
pub fn dominant_eigenvector(x: ArrayView2<f64>, start: ArrayView1<f64>) -> Option<Array1<f64>> {
    const MAX_POWER_ITER: usize = 1000;
    const POWER_TOL: f64 = 1e-13;

    let scatter = x.dot(&x.t());
    let mut v = start.to_owned();
    let mut norm = v.dot(&v).sqrt();
    if norm <= EPS {
        // Flat start: seed from the strongest column instead.
        let col = x
            .columns()
            .into_iter()
            .max_by(|a, b| a.dot(a).total_cmp(&b.dot(b)))?;
        v = col.to_owned();
        norm = v.dot(&v).sqrt();
        if norm <= EPS {
            return None;
        }
    }
    v /= norm;

    for _ in 0..MAX_POWER_ITER {
        let mut w = scatter.dot(&v);
        let n = w.dot(&w).sqrt();
        if n <= EPS {
            return None;
        }
        w /= n;
        let agreement = w.dot(&v);
        if agreement < 0.0 {
            w.mapv_inplace(|e| -e);
        }
        let done = 1.0 - agreement.abs() < POWER_TOL;
        v = w;
        if done {
            break;
        }
    }
    if v.dot(&start) < 0.0 {
        v.mapv_inplace(|e| -e);
    }
    Some(v)
}
