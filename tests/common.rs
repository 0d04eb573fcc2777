/// Shared helpers: synthetic recordings built from known prototype maps.
use microstates::Recording;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

#[allow(unused)]
/// `n_states` mutually orthogonal, centred maps over `n_channels` channels.
///
/// Map k is `+1` on channel `2k` and `-1` on channel `2k + 1`.
pub fn orthogonal_maps(n_states: usize, n_channels: usize) -> Array2<f64> {
    assert!(n_channels >= 2 * n_states, "need two channels per map");
    Array2::from_shape_fn((n_states, n_channels), |(k, c)| {
        if c == 2 * k {
            1.0
        } else if c == 2 * k + 1 {
            -1.0
        } else {
            0.0
        }
    })
}

#[allow(unused)]
/// A synthetic recording and the state that generated every sample.
pub struct Synthetic {
    pub recording: Recording,
    pub truth: Vec<usize>,
    /// Half-sine envelope value of every sample, in `[0, 1]`.
    pub envelope: Vec<f64>,
}

#[allow(unused)]
/// Concatenate `n_epochs` epochs of `epoch_len` samples. Each epoch is cut
/// into segments of `segment_len` samples; every segment is one randomly
/// chosen map with random polarity under a half-sine envelope, plus
/// Gaussian-ish noise of standard deviation `noise` on every channel.
pub fn synthetic_recording(
    maps: &Array2<f64>,
    n_epochs: usize,
    epoch_len: usize,
    segment_len: usize,
    noise: f64,
    seed: u64,
) -> Synthetic {
    let (n_states, n_ch) = maps.dim();
    let n = n_epochs * epoch_len;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Array2::<f64>::zeros((n_ch, n));
    let mut truth = Vec::with_capacity(n);
    let mut envelope = Vec::with_capacity(n);

    for e in 0..n_epochs {
        let mut i = 0;
        while i < epoch_len {
            let len = segment_len.min(epoch_len - i);
            let state = rng.gen_range(0..n_states);
            let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            for j in 0..len {
                let t = e * epoch_len + i + j;
                let env = (PI * (j as f64 + 0.5) / len as f64).sin();
                for c in 0..n_ch {
                    // Sum of uniforms: cheap, bounded, roughly normal.
                    let u: f64 = (0..4).map(|_| rng.gen::<f64>() - 0.5).sum();
                    data[[c, t]] = sign * env * maps[[state, c]] + noise * u * 3.0_f64.sqrt();
                }
                truth.push(state);
                envelope.push(env);
            }
            i += len;
        }
    }

    let recording = Recording::new(data, epoch_len, 250.0).expect("valid synthetic recording");
    Synthetic { recording, truth, envelope }
}

#[allow(unused)]
/// Absolute spatial correlation between two maps.
pub fn abs_corr(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    microstates::polarity_invariant_correlation(a.view(), b.view())
}

#[allow(unused)]
/// For every true map, the index of the fitted map that matches it best.
pub fn match_maps(truth: &Array2<f64>, fitted: &Array2<f64>) -> Vec<(usize, f64)> {
    truth
        .rows()
        .into_iter()
        .map(|t| {
            fitted
                .rows()
                .into_iter()
                .map(|f| abs_corr(&t.to_owned(), &f.to_owned()))
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, r)| if r > best.1 { (i, r) } else { best })
        })
        .collect()
}
