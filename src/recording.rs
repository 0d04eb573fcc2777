//! Recording value type.
//!
//! A [`Recording`] is a `[C, N]` matrix of samples plus the epoch layout it
//! was cut from. Epoched data `[E, C, T]` is stored concatenated along time
//! (`N = E · T`), so sample `n` belongs to epoch `n / T`. Continuous data is
//! a single epoch spanning the whole matrix.
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::error::{MicrostateError, Result};

/// Channels × samples recording with an epoch layout and sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    data: Array2<f64>,
    epoch_len: usize,
    sfreq: f64,
}

impl Recording {
    /// Wrap one continuous `[C, N]` series.
    pub fn continuous(data: Array2<f64>, sfreq: f64) -> Result<Self> {
        let n = data.ncols();
        Self::new(data, n, sfreq)
    }

    /// Wrap `[C, E·T]` data whose epochs are `epoch_len` samples long.
    pub fn new(data: Array2<f64>, epoch_len: usize, sfreq: f64) -> Result<Self> {
        check_sfreq(sfreq)?;
        let (n_ch, n_t) = data.dim();
        if n_ch == 0 || n_t == 0 {
            return Err(MicrostateError::insufficient(format!(
                "recording is empty ({n_ch} channels × {n_t} samples)"
            )));
        }
        if epoch_len == 0 || n_t % epoch_len != 0 {
            return Err(MicrostateError::shape(format!(
                "{n_t} samples cannot be split into epochs of {epoch_len}"
            )));
        }
        Ok(Self { data, epoch_len, sfreq })
    }

    /// Concatenate `[E, C, T]` epochs along time.
    pub fn from_epochs(epochs: &Array3<f64>, sfreq: f64) -> Result<Self> {
        let (n_e, n_ch, n_t) = epochs.dim();
        let mut data = Array2::<f64>::zeros((n_ch, n_e * n_t));
        for e in 0..n_e {
            data.slice_mut(s![.., e * n_t..(e + 1) * n_t])
                .assign(&epochs.slice(s![e, .., ..]));
        }
        Self::new(data, n_t, sfreq)
    }

    /// Concatenate a list of equal-shape `[C, T]` epochs.
    pub fn from_epoch_list(epochs: &[Array2<f64>], sfreq: f64) -> Result<Self> {
        let first = epochs
            .first()
            .ok_or_else(|| MicrostateError::insufficient("no epochs given"))?;
        let dim = first.dim();
        if let Some((i, ep)) = epochs.iter().enumerate().find(|(_, ep)| ep.dim() != dim) {
            return Err(MicrostateError::shape(format!(
                "epoch {i} has shape {:?}, expected {dim:?}",
                ep.dim()
            )));
        }
        let views: Vec<ArrayView2<f64>> = epochs.iter().map(|e| e.view()).collect();
        let data = ndarray::concatenate(Axis(1), &views)
            .map_err(|e| MicrostateError::shape(e.to_string()))?;
        Self::new(data, dim.1, sfreq)
    }

    /// Cut a continuous `[C, T]` series into non-overlapping windows of
    /// `epoch_len` samples. Trailing samples that don't fill a window are
    /// discarded.
    pub fn epoch_continuous(data: &Array2<f64>, epoch_len: usize, sfreq: f64) -> Result<Self> {
        if epoch_len == 0 {
            return Err(MicrostateError::invalid_param("epoch_len", "must be >= 1"));
        }
        let n_epochs = data.ncols() / epoch_len;
        let kept = data.slice(s![.., ..n_epochs * epoch_len]).to_owned();
        Self::new(kept, epoch_len, sfreq)
    }

    /// `[C, N]` view of all samples.
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_epochs(&self) -> usize {
        self.data.ncols() / self.epoch_len
    }

    pub fn epoch_len(&self) -> usize {
        self.epoch_len
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    /// Recording length in seconds.
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    /// Half-open sample ranges `[start, end)` of each epoch.
    pub fn epoch_bounds(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_epochs()).map(move |e| (e * self.epoch_len, (e + 1) * self.epoch_len))
    }

    /// `[C, T]` view of epoch `e`.
    pub fn epoch(&self, e: usize) -> ArrayView2<'_, f64> {
        self.data.slice(s![.., e * self.epoch_len..(e + 1) * self.epoch_len])
    }

    /// Copy of this recording without the listed channel rows.
    pub fn exclude_channels(&self, exclude: &[usize]) -> Result<Self> {
        let n_ch = self.n_channels();
        if let Some(&bad) = exclude.iter().find(|&&c| c >= n_ch) {
            return Err(MicrostateError::invalid_param(
                "exclude",
                format!("channel {bad} out of range for {n_ch} channels"),
            ));
        }
        let keep: Vec<usize> = (0..n_ch).filter(|c| !exclude.contains(c)).collect();
        Self::new(self.data.select(Axis(0), &keep), self.epoch_len, self.sfreq)
    }

    /// Exclude channels by name.
    ///
    /// Name matching is case-insensitive and ignores spaces
    /// (e.g. `"eeg 053"` matches `"EEG 053"`). Names not found in
    /// `ch_names` are skipped.
    pub fn exclude_channel_names(&self, names: &[String], ch_names: &[String]) -> Result<Self> {
        if ch_names.len() != self.n_channels() {
            return Err(MicrostateError::shape(format!(
                "{} channel names for {} channels",
                ch_names.len(),
                self.n_channels()
            )));
        }
        let norm = |s: &str| s.replace(' ', "").to_lowercase();
        let idx: Vec<usize> = names
            .iter()
            .filter_map(|bad| ch_names.iter().position(|n| norm(n) == norm(bad)))
            .collect();
        self.exclude_channels(&idx)
    }
}

fn check_sfreq(sfreq: f64) -> Result<()> {
    if sfreq.is_finite() && sfreq > 0.0 {
        Ok(())
    } else {
        Err(MicrostateError::invalid_param("sfreq", format!("{sfreq} is not a positive rate")))
    }
}
