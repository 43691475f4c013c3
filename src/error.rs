//! Error type for the detection engine.
//!
//! Every failure is local to a single detection call and aborts it; there is
//! no partial result.  Degenerate statistics (zero spread in the outlier
//! selector) are *not* errors and never show up here.
use thiserror::Error;

use crate::metrics::Metric;

/// Errors raised by the FASTER detection engine.
#[derive(Debug, Error)]
pub enum FasterError {
    /// A detection method other than FASTER was requested.
    #[error("unsupported bad-detection method '{0}': only 'faster' is implemented")]
    UnsupportedMethod(String),

    /// A metric name that does not exist at all.
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    /// A known metric requested at a level whose catalog does not contain it.
    #[error("metric '{metric}' is not available for {level} detection (available: {available})")]
    MetricNotInCatalog {
        metric: Metric,
        level: &'static str,
        available: String,
    },

    /// Reference-distance correction requested without full sensor geometry.
    #[error(
        "cannot correct for distance to reference sensor: channel '{channel}' \
         has no {field} information"
    )]
    MissingGeometry {
        channel: String,
        field: &'static str,
    },

    /// A spectral metric asked for a frequency the estimate cannot resolve.
    #[error(
        "insufficient sample rate ({sfreq} Hz, {n_freqs} frequency bins up to {fmax} Hz) \
         to estimate power at {freq} Hz for the '{metric}' metric; {hint}"
    )]
    InsufficientResolution {
        metric: Metric,
        freq: f64,
        sfreq: f64,
        fmax: f64,
        n_freqs: usize,
        hint: &'static str,
    },

    /// A parameter record failed validation.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam {
        name: &'static str,
        reason: String,
    },

    /// Picks were empty, out of range, or otherwise unusable.
    #[error("invalid channel selection: {0}")]
    InvalidPicks(String),

    /// Array dimensions do not agree with the channel metadata.
    #[error("shape mismatch: {0}")]
    Shape(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FasterError>;
