//! # faster: statistical artifact detection for epoched EEG/MEG
//!
//! `faster` implements the FASTER procedure (Nolan, Whelan & Reilly, 2010)
//! for finding bad channels, bad epochs, bad channels within single epochs,
//! and bad unmixed components.  Every detector follows the same recipe:
//!
//! ```text
//! epochs [E, C, T]
//!   │
//!   ├─ picks → split by sensor kind      mag / grad / eeg scored apart
//!   ├─ metric scores per unit            variance, hurst, line noise …
//!   ├─ reference-distance correction     optional, single-ref EEG only
//!   └─ iterative z-score threshold       |z| > thresh (3 SD by default)
//!        │
//!        └─→ bad channel names / epoch indices / per-epoch name lists
//! ```
//!
//! Spectral metrics use a Welch estimate ([`welch::efficient_welch`]) with
//! power-of-two segments just over ten seconds long.
//!
//! ## Quick start
//!
//! ```no_run
//! use faster::{find_bad_channels, find_bad_epochs, io::load_epochs};
//! use faster::{BadChannelsParams, BadEpochsParams, Method};
//! use std::path::Path;
//!
//! let epochs = load_epochs(Path::new("data/epochs.safetensors")).unwrap();
//!
//! let chans = find_bad_channels(&epochs, None, Method::Faster, &BadChannelsParams::default(), false).unwrap();
//! let bad_epochs = find_bad_epochs(&epochs, None, Method::Faster, &BadEpochsParams::default(), true).unwrap();
//!
//! println!("{}", serde_json::to_string_pretty(&chans).unwrap());
//! println!("{}", serde_json::to_string_pretty(&bad_epochs).unwrap());
//! ```
//!
//! ## Running individual steps
//!
//! ```
//! use faster::metrics::variance;
//! use faster::outliers::{find_outliers, Tail};
//! use ndarray::array;
//!
//! let data = array![[1.0, -1.0, 1.0, -1.0], [2.0, -2.0, 2.0, -2.0], [9.0, -9.0, 9.0, -9.0]];
//! let scores = variance(data.view());
//! let bad = find_outliers(scores.view(), 1.0, 1, Tail::Upper);
//! assert_eq!(bad, vec![2]);
//! ```

pub mod bads;
pub mod config;
pub mod correction;
pub mod error;
pub mod faster;
pub mod info;
pub mod io;
pub mod metrics;
pub mod outliers;
pub mod welch;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// entry points
pub use bads::{find_bad_channels, find_bad_channels_in_epochs, find_bad_components, find_bad_epochs, Bads};

// config
pub use config::{BadChannelsInEpochsParams, BadChannelsParams, BadEpochsParams, ComponentParams, Method};

// errors
pub use error::{FasterError, Result};

// recording model
pub use info::{ChannelInfo, ChannelKind, Epochs};

// metrics + selection
pub use metrics::{Level, Metric};
pub use outliers::{find_outliers, Tail};

// spectra
pub use welch::{efficient_welch, Psd};
