//! Statistics of a microstate label sequence.
//!
//! Every function takes the sequence as a list of contiguous chunks. Samples
//! are pooled across chunks, but transitions and runs never span two chunks.
//! For continuous data pass a single chunk; for epoched data pass the
//! output of [`split_at_borders`](crate::border::split_at_borders), which
//! drops the border sentinels and every transition touching them.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::border::split_at_borders;
use crate::error::{MicrostateError, Result};

fn check_chunks(chunks: &[&[usize]], n_states: usize) -> Result<usize> {
    if n_states == 0 {
        return Err(MicrostateError::invalid_param("n_states", "must be >= 1"));
    }
    let mut total = 0;
    for chunk in chunks {
        if let Some(&bad) = chunk.iter().find(|&&l| l >= n_states) {
            return Err(MicrostateError::invalid_param(
                "labels",
                format!("label {bad} outside [0, {n_states})"),
            ));
        }
        total += chunk.len();
    }
    if total == 0 {
        return Err(MicrostateError::insufficient("label sequence is empty"));
    }
    Ok(total)
}

/// Empirical occupancy `p[k] = #{t : L_t = k} / N`. Sums to 1.
pub fn stationary_distribution(chunks: &[&[usize]], n_states: usize) -> Result<Array1<f64>> {
    let total = check_chunks(chunks, n_states)?;
    let mut p = Array1::<f64>::zeros(n_states);
    for &l in chunks.iter().flat_map(|c| c.iter()) {
        p[l] += 1.0;
    }
    p /= total as f64;
    Ok(p)
}

/// Raw one-step transition counts `f[i, j] = #{t : L_t = i, L_t+1 = j}`,
/// counted inside each chunk only.
pub fn transition_counts(chunks: &[&[usize]], n_states: usize) -> Result<Array2<f64>> {
    check_chunks(chunks, n_states)?;
    let mut f = Array2::<f64>::zeros((n_states, n_states));
    for chunk in chunks {
        for w in chunk.windows(2) {
            f[[w[0], w[1]]] += 1.0;
        }
    }
    Ok(f)
}

/// Divide each row by its sum. Rows without observations stay all-zero.
pub fn row_normalize(counts: ArrayView2<f64>) -> Array2<f64> {
    let mut t = counts.to_owned();
    for mut row in t.rows_mut() {
        let s = row.sum();
        if s > 0.0 {
            row /= s;
        }
    }
    t
}

/// Empirical transition matrix. Observed rows sum to 1, the others are zero.
pub fn transition_matrix(chunks: &[&[usize]], n_states: usize) -> Result<Array2<f64>> {
    Ok(row_normalize(transition_counts(chunks, n_states)?.view()))
}

/// Likelihood-ratio test of transition symmetry (time reversibility).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetryTest {
    /// `T = 2 Σ_{i≠j} f_ij · ln(2 f_ij / (f_ij + f_ji))`, with `0 · ln 0 = 0`.
    pub statistic: f64,
    /// `K (K − 1) / 2`.
    pub df: usize,
    /// χ²(df) survival function at `statistic`.
    pub p_value: f64,
    pub alpha: f64,
    /// `p_value < alpha`.
    pub reject_symmetry: bool,
}

/// Symmetry test on a `[K, K]` matrix of transition counts.
pub fn symmetry_test_counts(counts: ArrayView2<f64>, alpha: f64) -> Result<SymmetryTest> {
    let (n, m) = counts.dim();
    if n != m {
        return Err(MicrostateError::shape(format!("transition counts are {n} × {m}")));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(MicrostateError::invalid_param("alpha", "must lie in (0, 1)"));
    }
    let mut statistic = 0.0;
    for i in 0..n {
        for j in 0..n {
            let f_ij = counts[[i, j]];
            if i == j || f_ij <= 0.0 {
                continue;
            }
            let f_ji = counts[[j, i]];
            statistic += f_ij * (2.0 * f_ij / (f_ij + f_ji)).ln();
        }
    }
    statistic *= 2.0;

    let df = n * n.saturating_sub(1) / 2;
    let p_value = if df == 0 {
        1.0
    } else {
        let chi2 = ChiSquared::new(df as f64)
            .map_err(|e| MicrostateError::invalid_param("df", e.to_string()))?;
        chi2.sf(statistic.max(0.0))
    };
    Ok(SymmetryTest { statistic, df, p_value, alpha, reject_symmetry: p_value < alpha })
}

/// Symmetry test on a label sequence.
pub fn symmetry_test(chunks: &[&[usize]], n_states: usize, alpha: f64) -> Result<SymmetryTest> {
    let counts = transition_counts(chunks, n_states)?;
    let test = symmetry_test_counts(counts.view(), alpha)?;
    tracing::debug!(
        statistic = test.statistic,
        df = test.df,
        p = test.p_value,
        reject = test.reject_symmetry,
        "transition symmetry test"
    );
    Ok(test)
}

/// Run lengths of every state.
#[derive(Debug, Clone, PartialEq)]
pub struct Durations {
    /// Mean run length per state in seconds; `0.0` for states never visited.
    pub mean: Array1<f64>,
    /// Every run length per state, in samples, in order of occurrence.
    pub runs: Vec<Vec<usize>>,
}

impl Durations {
    /// Number of runs (occurrences) per state.
    pub fn counts(&self) -> Vec<usize> {
        self.runs.iter().map(Vec::len).collect()
    }
}

/// Run lengths per state. Runs end at chunk boundaries.
pub fn durations(chunks: &[&[usize]], n_states: usize, sfreq: f64) -> Result<Durations> {
    check_chunks(chunks, n_states)?;
    if !(sfreq.is_finite() && sfreq > 0.0) {
        return Err(MicrostateError::invalid_param("sfreq", format!("{sfreq} is not a positive rate")));
    }
    let mut runs = vec![Vec::new(); n_states];
    for chunk in chunks {
        let mut iter = chunk.iter();
        let Some(&first) = iter.next() else { continue };
        let (mut state, mut len) = (first, 1);
        for &l in iter {
            if l == state {
                len += 1;
            } else {
                runs[state].push(len);
                state = l;
                len = 1;
            }
        }
        runs[state].push(len);
    }
    let mean = runs
        .iter()
        .map(|r| {
            if r.is_empty() {
                0.0
            } else {
                r.iter().sum::<usize>() as f64 / r.len() as f64 / sfreq
            }
        })
        .collect();
    Ok(Durations { mean, runs })
}

/// Shannon entropy of a distribution, in bits.
pub fn shannon_entropy(p: ArrayView1<f64>) -> f64 {
    -p.iter().filter(|&&v| v > 0.0).map(|&v| v * v.log2()).sum::<f64>()
}

/// Entropy of the uniform distribution over `n_states` symbols, in bits.
pub fn max_entropy(n_states: usize) -> f64 {
    (n_states.max(1) as f64).log2()
}

/// Every descriptor of one label sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStats {
    pub n_states: usize,
    /// Samples the statistics were computed over.
    pub n_samples: usize,
    /// Occupancy per state (also the coverage).
    pub stationary: Array1<f64>,
    pub transition_counts: Array2<f64>,
    pub transition: Array2<f64>,
    pub symmetry: SymmetryTest,
    pub durations: Durations,
    /// Runs per state per second of analysed samples. The denominator is
    /// `n_samples / sfreq`, so border sentinels and trimmed samples do not
    /// count as recording time.
    pub occurrences_per_second: Array1<f64>,
    /// Shannon entropy of `stationary`, in bits.
    pub entropy: f64,
    /// `log2(n_states)`.
    pub max_entropy: f64,
}

impl SequenceStats {
    /// Analyse a set of contiguous chunks.
    pub fn from_chunks(chunks: &[&[usize]], n_states: usize, sfreq: f64, alpha: f64) -> Result<Self> {
        let n_samples = check_chunks(chunks, n_states)?;
        let stationary = stationary_distribution(chunks, n_states)?;
        let counts = transition_counts(chunks, n_states)?;
        let transition = row_normalize(counts.view());
        let symmetry = symmetry_test_counts(counts.view(), alpha)?;
        let durations = durations(chunks, n_states, sfreq)?;
        let seconds = n_samples as f64 / sfreq;
        let occurrences_per_second = durations.counts().iter().map(|&c| c as f64 / seconds).collect();
        let entropy = shannon_entropy(stationary.view());
        Ok(Self {
            n_states,
            n_samples,
            stationary,
            transition_counts: counts,
            transition,
            symmetry,
            durations,
            occurrences_per_second,
            entropy,
            max_entropy: max_entropy(n_states),
        })
    }

    /// Analyse one continuous sequence.
    pub fn from_labels(labels: &[usize], n_states: usize, sfreq: f64, alpha: f64) -> Result<Self> {
        Self::from_chunks(&[labels], n_states, sfreq, alpha)
    }

    /// Analyse a border-marked sequence: sentinels are dropped and no
    /// transition or run crosses them.
    pub fn from_marked(marked: &[usize], sentinel: usize, n_states: usize, sfreq: f64, alpha: f64) -> Result<Self> {
        Self::from_chunks(&split_at_borders(marked, sentinel), n_states, sfreq, alpha)
    }
}
