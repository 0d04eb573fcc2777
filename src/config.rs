//! Analysis configuration.
//!
//! [`MicrostateConfig`] holds every tunable parameter of the clustering and
//! back-fitting stages, [`SmoothingConfig`] those of the temporal smoother.
//! [`AnalysisConfig`] bundles both with the significance level of the
//! symmetry test and is what the `microstates` binary reads from JSON.
//!
//! Nothing in the crate reads global state: seeds, peak limits and
//! smoothing weights always arrive through one of these structs.
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{MicrostateError, Result};

/// How excess GFP peaks are discarded when more than
/// [`PeakConfig::max_n_peaks`] are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakSelection {
    /// Keep the first `max_n_peaks` peaks in time.
    #[default]
    Earliest,
    /// Keep a uniform random subset, drawn from [`MicrostateConfig::seed`].
    Random,
}

/// GFP peak picking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum distance in samples between two accepted peaks.
    ///
    /// Lower peaks closer than this to a higher accepted peak are dropped.
    ///
    /// Default: `2`.
    pub min_peak_dist: usize,

    /// Upper bound on the number of peaks handed to the clusterer.
    ///
    /// `None` disables truncation.
    ///
    /// Default: `Some(10_000)`.
    pub max_n_peaks: Option<usize>,

    /// Truncation policy applied when the bound is exceeded.
    ///
    /// Default: [`PeakSelection::Earliest`].
    pub selection: PeakSelection,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_peak_dist: 2,
            max_n_peaks: Some(10_000),
            selection: PeakSelection::Earliest,
        }
    }
}

impl PeakConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_peak_dist == 0 {
            return Err(MicrostateError::invalid_param("min_peak_dist", "must be >= 1"));
        }
        if self.max_n_peaks == Some(0) {
            return Err(MicrostateError::invalid_param("max_n_peaks", "must be >= 1 when set"));
        }
        Ok(())
    }
}

/// Configuration for peak picking, modified K-means and back-fitting.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use microstates::MicrostateConfig;
///
/// let cfg = MicrostateConfig {
///     n_states: 5,
///     seed:     Some(42),
///     ..MicrostateConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrostateConfig {
    /// Number of prototype maps to fit.
    ///
    /// Default: `4`.
    pub n_states: usize,

    /// Number of random initialisations; the run with the highest GEV wins.
    ///
    /// Runs are independent and are executed on the rayon thread pool.
    ///
    /// Default: `10`.
    pub n_inits: usize,

    /// Scale every peak topography to unit norm before fitting.
    ///
    /// Without it, prototypes are dominated by high-GFP peaks. Assignment
    /// itself is scale-invariant and unaffected.
    ///
    /// Default: `false`.
    pub normalize: bool,

    /// Relative residual-variance change below which K-means stops.
    ///
    /// Default: `1e-6`.
    pub tol: f64,

    /// Iteration cap of a single K-means run.
    ///
    /// Default: `1000`.
    pub max_iter: usize,

    /// Base seed. Initialisation `i` uses `seed + i`.
    ///
    /// `None` draws a base seed from the OS generator and logs it.
    ///
    /// Default: `None`.
    pub seed: Option<u64>,

    /// GFP peak picking.
    pub peaks: PeakConfig,
}

impl Default for MicrostateConfig {
    /// 4 states · 10 inits · tol 1e-6 · 1000 iterations · unseeded.
    fn default() -> Self {
        Self {
            n_states: 4,
            n_inits: 10,
            normalize: false,
            tol: 1e-6,
            max_iter: 1000,
            seed: None,
            peaks: PeakConfig::default(),
        }
    }
}

impl MicrostateConfig {
    /// Check every field, returning the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.n_states == 0 {
            return Err(MicrostateError::invalid_param("n_states", "must be >= 1"));
        }
        if self.n_inits == 0 {
            return Err(MicrostateError::invalid_param("n_inits", "must be >= 1"));
        }
        if !(self.tol >= 0.0 && self.tol.is_finite()) {
            return Err(MicrostateError::invalid_param("tol", "must be finite and >= 0"));
        }
        if self.max_iter == 0 {
            return Err(MicrostateError::invalid_param("max_iter", "must be >= 1"));
        }
        self.peaks.validate()
    }

    /// The configured seed, or a fresh one from the OS generator.
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(s) => s,
            None => {
                let s = rand::random::<u64>();
                tracing::info!(seed = s, "no seed configured, drew one");
                s
            }
        }
    }
}

/// Penalised temporal smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Half-width `b` of the neighbourhood window, in samples.
    ///
    /// Default: `3`.
    pub half_window: usize,

    /// Weight `λ` of the non-smoothness penalty.
    ///
    /// `0` disables smoothing: every sample keeps its best-fitting label.
    ///
    /// Default: `5.0`.
    pub lambda: f64,

    /// Fraction of changed labels at or below which a pass counts as stable.
    ///
    /// Default: `1e-6`.
    pub tol: f64,

    /// Cap on the number of relabelling passes.
    ///
    /// Default: `1000`.
    pub max_iter: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { half_window: 3, lambda: 5.0, tol: 1e-6, max_iter: 1000 }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(MicrostateError::invalid_param("lambda", "must be finite and >= 0"));
        }
        if !(self.tol >= 0.0 && self.tol.is_finite()) {
            return Err(MicrostateError::invalid_param("tol", "must be finite and >= 0"));
        }
        if self.max_iter == 0 {
            return Err(MicrostateError::invalid_param("max_iter", "must be >= 1"));
        }
        Ok(())
    }
}

/// Everything the end-to-end analysis needs, loadable from JSON.
///
/// ```
/// use microstates::AnalysisConfig;
///
/// let cfg: AnalysisConfig = serde_json::from_str(r#"{ "alpha": 0.05 }"#).unwrap();
/// assert_eq!(cfg.alpha, 0.05);
/// assert_eq!(cfg.microstates.n_states, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub microstates: MicrostateConfig,
    pub smoothing: SmoothingConfig,
    /// Significance level of the transition symmetry test.
    ///
    /// Default: `0.01`.
    pub alpha: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            microstates: MicrostateConfig::default(),
            smoothing: SmoothingConfig::default(),
            alpha: 0.01,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        self.microstates.validate()?;
        self.smoothing.validate()?;
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(MicrostateError::invalid_param("alpha", "must lie in (0, 1)"));
        }
        Ok(())
    }

    /// Read and validate a JSON configuration file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg: AnalysisConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as pretty-printed JSON.
    pub fn to_json(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_states_rejected() {
        let cfg = MicrostateConfig { n_states: 0, ..MicrostateConfig::default() };
        assert!(matches!(
            cfg.validate(),
            Err(MicrostateError::InvalidParameter { name: "n_states", .. })
        ));
    }

    #[test]
    fn negative_lambda_rejected() {
        let cfg = SmoothingConfig { lambda: -1.0, ..SmoothingConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_peak_distance_rejected() {
        let cfg = PeakConfig { min_peak_dist: 0, ..PeakConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_seed_is_used() {
        let cfg = MicrostateConfig { seed: Some(7), ..MicrostateConfig::default() };
        assert_eq!(cfg.resolve_seed(), 7);
    }

    #[test]
    fn json_roundtrip_through_file() {
        let path = std::env::temp_dir().join("microstates_cfg_roundtrip.json");
        let cfg = AnalysisConfig {
            microstates: MicrostateConfig {
                n_states: 3,
                seed: Some(11),
                peaks: PeakConfig { selection: PeakSelection::Random, ..PeakConfig::default() },
                ..MicrostateConfig::default()
            },
            alpha: 0.05,
            ..AnalysisConfig::default()
        };
        cfg.to_json(&path).unwrap();
        let back = AnalysisConfig::from_json(&path).unwrap();
        assert_eq!(back, cfg);
        let _ = std::fs::remove_file(&path);
    }
}
