//! Safetensors and JSON I/O around the core.
//!
//! Reader: parses a recording stored as safetensors with keys
//!   `data`      [C, T] or [E, C, T]   F32 / F64
//!   `sfreq`     [1]                   F32 / F64
//!   `ch_names`  [n]                   U8, newline-separated (optional)
//!
//! Writer: [`StWriter`] emits F64 / I32 / U8 tensors; [`write_results`] stores
//! the maps, both segmentations and the sequence statistics of an
//! [`Analysis`]. [`Summary`] is the same content as pretty JSON.
use anyhow::{bail, Context, Result};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::recording::Recording;
use crate::Analysis;

// ── Low-level safetensors parser (raw bytes → Vec<f64>) ──────────────────────

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, serde_json::Value>, usize)> {
    if bytes.len() < 8 {
        bail!("safetensors file too small");
    }
    let n = u64::from_le_bytes(bytes[..8].try_into()?) as usize;
    if bytes.len() < 8 + n {
        bail!("safetensors header length {n} exceeds file size");
    }
    let header: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;
    Ok((header, 8 + n))
}

fn tensor_bytes<'a>(bytes: &'a [u8], data_start: usize, entry: &serde_json::Value) -> Result<&'a [u8]> {
    let offsets = entry["data_offsets"].as_array().context("missing data_offsets")?;
    let s = offsets.first().and_then(|v| v.as_u64()).context("bad data_offsets")? as usize;
    let e = offsets.get(1).and_then(|v| v.as_u64()).context("bad data_offsets")? as usize;
    bytes
        .get(data_start + s..data_start + e)
        .context("tensor data out of bounds")
}

fn read_numeric(bytes: &[u8], data_start: usize, entry: &serde_json::Value) -> Result<Vec<f64>> {
    let raw = tensor_bytes(bytes, data_start, entry)?;
    let dtype = entry["dtype"].as_str().context("missing dtype")?;
    Ok(match dtype {
        "F32" => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "F64" => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        other => bail!("unsupported dtype {other} for numeric tensor"),
    })
}

fn shape_of(entry: &serde_json::Value) -> Result<Vec<usize>> {
    entry["shape"]
        .as_array()
        .context("missing shape")?
        .iter()
        .map(|v| v.as_u64().map(|d| d as usize).context("bad shape entry"))
        .collect()
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// A recording loaded from disk, with its channel names if present.
pub struct RecordingFile {
    pub recording: Recording,
    /// Channel names (empty if not saved).
    pub ch_names: Vec<String>,
}

/// Load a recording from safetensors.
pub fn load_recording(path: &Path) -> Result<RecordingFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (header, data_start) = parse_header(&bytes)?;

    let data_entry = header.get("data").context("missing 'data' key")?;
    let shape = shape_of(data_entry)?;
    let values = read_numeric(&bytes, data_start, data_entry)?;

    let sfreq_entry = header.get("sfreq").context("missing 'sfreq' key")?;
    let sfreq = *read_numeric(&bytes, data_start, sfreq_entry)?
        .first()
        .context("empty 'sfreq' tensor")?;

    let recording = match shape.as_slice() {
        &[c, t] => Recording::continuous(Array2::from_shape_vec((c, t), values)?, sfreq)?,
        &[e, c, t] => Recording::from_epochs(&Array3::from_shape_vec((e, c, t), values)?, sfreq)?,
        other => bail!("'data' must be [C, T] or [E, C, T], got {other:?}"),
    };

    let ch_names = match header.get("ch_names") {
        Some(entry) => std::str::from_utf8(tensor_bytes(&bytes, data_start, entry)?)?
            .split('\n')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => vec![],
    };

    Ok(RecordingFile { recording, ch_names })
}

// ── Generic safetensors builder ──────────────────────────────────────────────

/// One named tensor waiting to be written.
struct Tensor {
    name: String,
    dtype: &'static str,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// In-memory safetensors builder for F32, F64, I32 and U8 tensors.
///
/// Tensors are laid out back to back in insertion order after a JSON
/// header padded with spaces to a multiple of 8 bytes.
///
/// ```rust,no_run
/// use microstates::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("gev", &[0.71], &[1]);
/// w.add_labels("segmentation", &[0, 1, 1, 2]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    tensors: Vec<Tensor>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, dtype: &'static str, shape: &[usize], bytes: Vec<u8>) {
        self.tensors.push(Tensor { name: name.to_string(), dtype, shape: shape.to_vec(), bytes });
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        self.push(name, "F32", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        self.push(name, "F64", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        self.push(name, "F64", &[arr.nrows(), arr.ncols()], arr.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        self.push(name, "I32", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    /// Store a label or index sequence as a 1-D I32 tensor.
    pub fn add_labels(&mut self, name: &str, labels: &[usize]) {
        let bytes = labels.iter().flat_map(|&l| (l as i32).to_le_bytes()).collect();
        self.push(name, "I32", &[labels.len()], bytes);
    }

    /// Store strings newline-joined as a 1-D U8 tensor.
    pub fn add_strings(&mut self, name: &str, strings: &[String]) {
        let bytes = strings.join("\n").into_bytes();
        self.push(name, "U8", &[bytes.len()], bytes);
    }

    /// JSON header describing every tensor, space-padded to 8-byte alignment.
    fn header(&self) -> Result<Vec<u8>> {
        let mut offset = 0;
        let map: serde_json::Map<String, serde_json::Value> = self
            .tensors
            .iter()
            .map(|t| {
                let entry = serde_json::json!({
                    "dtype": t.dtype,
                    "shape": t.shape,
                    "data_offsets": [offset, offset + t.bytes.len()],
                });
                offset += t.bytes.len();
                (t.name.clone(), entry)
            })
            .collect();
        let mut header = serde_json::to_vec(&map)?;
        header.resize(header.len().next_multiple_of(8), b' ');
        Ok(header)
    }

    /// The complete file contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = self.header()?;
        let body: usize = self.tensors.iter().map(|t| t.bytes.len()).sum();
        let mut out = Vec::with_capacity(8 + header.len() + body);
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(&header);
        for t in &self.tensors {
            out.extend_from_slice(&t.bytes);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?).with_context(|| format!("writing {}", path.display()))
    }
}

// ── Result writers ───────────────────────────────────────────────────────────

/// Write every array of an [`Analysis`] to `path`.
///
/// Keys:
///   maps                 [K, C]  F64
///   segmentation         [N]     I32
///   segmentation_smooth  [N]     I32
///   segmentation_marked  [N]     I32   (88 at epoch borders)
///   peaks                [P]     I32
///   gev, pps             [1]     F64
///   stationary           [K]     F64
///   transition           [K, K]  F64
///   durations_mean       [K]     F64   (seconds)
pub fn write_results(path: &Path, analysis: &Analysis) -> Result<()> {
    let stats = &analysis.stats;
    let mut w = StWriter::new();
    w.add_f64_arr2("maps", &analysis.model.maps);
    w.add_labels("segmentation", &analysis.model.segmentation);
    w.add_labels("segmentation_smooth", &analysis.smoothed.labels);
    w.add_labels("segmentation_marked", &analysis.marked);
    w.add_labels("peaks", &analysis.model.peaks);
    w.add_f64("gev", &[analysis.model.gev], &[1]);
    w.add_f64("pps", &[analysis.peaks_per_second], &[1]);
    w.add_f64("stationary", &stats.stationary.to_vec(), &[stats.n_states]);
    w.add_f64_arr2("transition", &stats.transition);
    w.add_f64("durations_mean", &stats.durations.mean.to_vec(), &[stats.n_states]);
    w.write(path)
}

/// Scalar and small-array results as plain JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n_states: usize,
    pub n_channels: usize,
    pub n_samples: usize,
    pub n_epochs: usize,
    pub sfreq: f64,
    pub seed: u64,
    pub n_peaks: usize,
    pub peaks_per_second: f64,
    pub cluster_gev: f64,
    pub gev: f64,
    pub kmeans_converged: bool,
    pub smoothing_converged: bool,
    pub stationary: Vec<f64>,
    pub transition: Vec<Vec<f64>>,
    pub symmetry_statistic: f64,
    pub symmetry_df: usize,
    pub symmetry_p_value: f64,
    pub symmetry_rejected: bool,
    pub mean_durations_ms: Vec<f64>,
    pub occurrences_per_second: Vec<f64>,
    pub entropy_bits: f64,
    pub max_entropy_bits: f64,
}

impl Summary {
    pub fn from_analysis(analysis: &Analysis, recording: &Recording) -> Self {
        let stats = &analysis.stats;
        Self {
            n_states: analysis.model.n_states(),
            n_channels: recording.n_channels(),
            n_samples: recording.n_samples(),
            n_epochs: recording.n_epochs(),
            sfreq: recording.sfreq(),
            seed: analysis.model.seed,
            n_peaks: analysis.model.peaks.len(),
            peaks_per_second: analysis.peaks_per_second,
            cluster_gev: analysis.model.cluster_gev,
            gev: analysis.model.gev,
            kmeans_converged: analysis.model.converged,
            smoothing_converged: analysis.smoothed.converged,
            stationary: stats.stationary.to_vec(),
            transition: stats.transition.rows().into_iter().map(|r| r.to_vec()).collect(),
            symmetry_statistic: stats.symmetry.statistic,
            symmetry_df: stats.symmetry.df,
            symmetry_p_value: stats.symmetry.p_value,
            symmetry_rejected: stats.symmetry.reject_symmetry,
            mean_durations_ms: stats.durations.mean.iter().map(|s| s * 1000.0).collect(),
            occurrences_per_second: stats.occurrences_per_second.to_vec(),
            entropy_bits: stats.entropy,
            max_entropy_bits: stats.max_entropy,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoched_recording_roundtrip() {
        let path = std::env::temp_dir().join("microstates_io_epoched.safetensors");
        let data: Vec<f32> = (0..2 * 3 * 4).map(|v| v as f32).collect();
        let mut w = StWriter::new();
        w.add_f32("data", &data, &[2, 3, 4]);
        w.add_f32("sfreq", &[128.0], &[1]);
        w.add_strings("ch_names", &["Fz".into(), "Cz".into(), "Pz".into()]);
        w.write(&path).unwrap();

        let file = load_recording(&path).unwrap();
        let rec = &file.recording;
        assert_eq!(rec.n_channels(), 3);
        assert_eq!(rec.n_epochs(), 2);
        assert_eq!(rec.epoch_len(), 4);
        assert_eq!(rec.sfreq(), 128.0);
        // Epoch 1, channel 2, sample 3 → flat index 1·12 + 2·4 + 3.
        assert_eq!(rec.data()[[2, 7]], 23.0);
        assert_eq!(file.ch_names, vec!["Fz", "Cz", "Pz"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_sfreq_is_an_error() {
        let path = std::env::temp_dir().join("microstates_io_nosfreq.safetensors");
        let mut w = StWriter::new();
        w.add_f64("data", &[0.0; 6], &[2, 3]);
        w.write(&path).unwrap();
        assert!(load_recording(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn header_is_aligned_and_offsets_are_contiguous() {
        let mut w = StWriter::new();
        w.add_labels("labels", &[0, 2, 1]);
        w.add_f64("gev", &[0.5], &[1]);
        w.add_strings("ch_names", &["O1".into()]);
        let bytes = w.to_bytes().unwrap();

        let (header, data_start) = parse_header(&bytes).unwrap();
        assert_eq!((data_start - 8) % 8, 0);
        assert_eq!(bytes.len(), data_start + 12 + 8 + 2);
        assert_eq!(header["labels"]["data_offsets"], serde_json::json!([0, 12]));
        assert_eq!(header["gev"]["data_offsets"], serde_json::json!([12, 20]));
        assert_eq!(read_numeric(&bytes, data_start, &header["gev"]).unwrap(), vec![0.5]);
        assert_eq!(tensor_bytes(&bytes, data_start, &header["ch_names"]).unwrap(), b"O1");
    }

    #[test]
    fn truncated_file_is_an_error() {
        assert!(parse_header(&[1, 2, 3]).is_err());
        let mut bytes = 1000u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(parse_header(&bytes).is_err());
    }
}
