//! Public detection entry points.
//!
//! Each function resolves default picks, dispatches on [`Method`] and shapes
//! the result as either one combined list or one list per metric.
use std::collections::BTreeMap;

use ndarray::ArrayView2;
use serde::Serialize;

use crate::config::{BadChannelsInEpochsParams, BadChannelsParams, BadEpochsParams, ComponentParams, Method};
use crate::error::Result;
use crate::faster;
use crate::info::Epochs;
use crate::metrics::Metric;

/// Detection result.
///
/// `Combined` merges the findings of every metric; `ByMetric` keeps them
/// apart, keyed by the requested metrics only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Bads<T> {
    Combined(Vec<T>),
    ByMetric(BTreeMap<Metric, Vec<T>>),
}

impl<T> Bads<T> {
    pub fn combined(&self) -> Option<&[T]> {
        match self {
            Bads::Combined(v) => Some(v),
            Bads::ByMetric(_) => None,
        }
    }

    pub fn by_metric(&self) -> Option<&BTreeMap<Metric, Vec<T>>> {
        match self {
            Bads::ByMetric(m) => Some(m),
            Bads::Combined(_) => None,
        }
    }
}

/// Union of channel names, in first-seen metric order.
fn union_names(by_metric: &BTreeMap<Metric, Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in by_metric.values().flatten() {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

/// Sorted union of indices.
fn union_indices(by_metric: &BTreeMap<Metric, Vec<usize>>) -> Vec<usize> {
    let mut out: Vec<usize> = by_metric.values().flatten().copied().collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Find bad channels (FASTER step 1).
///
/// `picks` defaults to every MEG and EEG channel, including ones already
/// marked bad.
///
/// # Example
///
/// ```
/// use faster::{find_bad_channels, BadChannelsParams, ChannelInfo, ChannelKind, Epochs, Method};
/// use ndarray::Array3;
///
/// let data = Array3::from_shape_fn((4, 8, 256), |(e, c, t)| {
///     let x = ((e * 131 + c * 17 + t * 7) % 23) as f64 - 11.0;
///     if c == 5 { 40.0 * x } else { x }
/// });
/// let chs = (0..8).map(|i| ChannelInfo::new(format!("EEG{i:03}"), ChannelKind::Eeg)).collect();
/// let epochs = Epochs::new(data, 256.0, chs).unwrap();
///
/// let params = BadChannelsParams { thresh: 2.0, ..Default::default() };
/// let bads = find_bad_channels(&epochs, None, Method::Faster, &params, false).unwrap();
/// assert!(bads.combined().unwrap().contains(&"EEG005".to_string()));
/// ```
pub fn find_bad_channels(
    epochs: &Epochs,
    picks: Option<&[usize]>,
    method: Method,
    params: &BadChannelsParams,
    return_by_metric: bool,
) -> Result<Bads<String>> {
    let picks = match picks {
        Some(p) => p.to_vec(),
        None => epochs.pick_data_channels(false),
    };
    let by_metric = match method {
        Method::Faster => faster::bad_channels(epochs, &picks, params)?,
    };
    Ok(if return_by_metric {
        Bads::ByMetric(by_metric)
    } else {
        Bads::Combined(union_names(&by_metric))
    })
}

/// Find bad epochs (FASTER step 2).
///
/// `picks` defaults to every MEG and EEG channel not listed in
/// [`Epochs::bads`].
pub fn find_bad_epochs(
    epochs: &Epochs,
    picks: Option<&[usize]>,
    method: Method,
    params: &BadEpochsParams,
    return_by_metric: bool,
) -> Result<Bads<usize>> {
    let picks = match picks {
        Some(p) => p.to_vec(),
        None => epochs.pick_data_channels(true),
    };
    let by_metric = match method {
        Method::Faster => faster::bad_epochs(epochs, &picks, params)?,
    };
    Ok(if return_by_metric {
        Bads::ByMetric(by_metric)
    } else {
        Bads::Combined(union_indices(&by_metric))
    })
}

/// Find bad channels within each epoch (FASTER step 4).
///
/// The result holds one list of channel names per epoch.  Combined, a
/// channel is listed when any metric flagged it in that epoch.
pub fn find_bad_channels_in_epochs(
    epochs: &Epochs,
    picks: Option<&[usize]>,
    method: Method,
    params: &BadChannelsInEpochsParams,
    return_by_metric: bool,
) -> Result<Bads<Vec<String>>> {
    let picks = match picks {
        Some(p) => p.to_vec(),
        None => epochs.pick_data_channels(false),
    };
    let masks = match method {
        Method::Faster => faster::bad_channel_in_epoch_masks(epochs, &picks, params)?,
    };
    let names: Vec<&str> = picks.iter().map(|&p| epochs.chs()[p].name.as_str()).collect();

    if return_by_metric {
        return Ok(Bads::ByMetric(
            masks
                .iter()
                .map(|(&metric, mask)| (metric, faster::mask_to_names(mask, &names)))
                .collect(),
        ));
    }
    Ok(Bads::Combined(match faster::combine_masks(masks.values()) {
        Some(mask) => faster::mask_to_names(&mask, &names),
        None => vec![Vec::new(); epochs.n_epochs()],
    }))
}

/// Find bad components (FASTER step 3) among unmixed sources
/// (`[n_components, n_times]`, e.g. ICA sources).
pub fn find_bad_components(
    sources: ArrayView2<f64>,
    sfreq: f64,
    method: Method,
    params: &ComponentParams,
    return_by_metric: bool,
) -> Result<Bads<usize>> {
    let by_metric = match method {
        Method::Faster => faster::bad_components(sources, sfreq, params)?,
    };
    Ok(if return_by_metric {
        Bads::ByMetric(by_metric)
    } else {
        Bads::Combined(union_indices(&by_metric))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_union_keeps_first_seen_order() {
        let mut m = BTreeMap::new();
        m.insert(Metric::Variance, vec!["C3".to_string(), "O1".to_string()]);
        m.insert(Metric::Kurtosis, vec!["O1".to_string(), "Fp1".to_string()]);
        // BTreeMap walks in metric order: variance before kurtosis.
        assert_eq!(union_names(&m), vec!["C3", "O1", "Fp1"]);
    }

    #[test]
    fn index_union_is_sorted_and_unique() {
        let mut m = BTreeMap::new();
        m.insert(Metric::Amplitude, vec![7, 2]);
        m.insert(Metric::Deviation, vec![2, 4]);
        assert_eq!(union_indices(&m), vec![2, 4, 7]);
    }

    #[test]
    fn by_metric_serializes_as_object() {
        let mut m = BTreeMap::new();
        m.insert(Metric::MedianGradient, vec![1usize]);
        let json = serde_json::to_string(&Bads::ByMetric(m)).unwrap();
        assert_eq!(json, r#"{"median_gradient":[1]}"#);
        let json = serde_json::to_string(&Bads::Combined(vec![3usize, 5])).unwrap();
        assert_eq!(json, "[3,5]");
    }
}
