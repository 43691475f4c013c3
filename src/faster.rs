//! FASTER detection steps.
//!
//! Implements steps 1, 2, 3 and 4 of Nolan, Whelan & Reilly (2010),
//! *FASTER: Fully Automated Statistical Thresholding for EEG artifact
//! Rejection*, J. Neurosci. Methods 192(1):152–162:
//!
//! ```text
//! step 1  bad channels              scores over all epochs, concatenated
//! step 2  bad epochs                scores averaged over channels
//! step 3  bad components            scores of unmixed sources
//! step 4  bad channels in epochs    scores per channel per epoch
//! ```
//!
//! Picked channels are split by sensor kind and each kind is scored and
//! thresholded on its own.  Each (kind, metric) unit is independent; with the
//! `parallel` feature they run on the rayon pool, but results are always
//! collected in kind-then-metric order.
use std::collections::BTreeMap;

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use tracing::info;

use crate::config::{BadChannelsInEpochsParams, BadChannelsParams, BadEpochsParams, ComponentParams};
use crate::correction::{distance_correction, reference_angles, remove_quadratic_trend};
use crate::error::Result;
use crate::info::{picks_by_type, ChannelGroup, ChannelInfo, Epochs};
use crate::metrics::Metric;
use crate::outliers::{find_outliers, Tail};

/// Score → outlier settings shared by every step.
#[derive(Debug, Clone, Copy)]
struct Threshold {
    thresh: f64,
    max_iter: usize,
    tail: Tail,
}

impl Threshold {
    fn outliers(&self, scores: ArrayView1<f64>) -> Vec<usize> {
        find_outliers(scores, self.thresh, self.max_iter, self.tail)
    }
}

/// Run `f` over every `(group, metric)` unit, keeping unit order.
fn for_each_unit<T, F>(units: &[(usize, Metric)], f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, Metric) -> Result<T> + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        units.par_iter().map(|&(g, m)| f(g, m)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        units.iter().map(|&(g, m)| f(g, m)).collect()
    }
}

fn units(groups: &[ChannelGroup], metrics: &[Metric]) -> Vec<(usize, Metric)> {
    (0..groups.len())
        .flat_map(|g| metrics.iter().map(move |&m| (g, m)))
        .collect()
}

/// Channel infos of a group's members, in member order.
fn group_chs<'a>(epochs: &'a Epochs, picks: &[usize], group: &ChannelGroup) -> Vec<&'a ChannelInfo> {
    group.members.iter().map(|&m| &epochs.chs()[picks[m]]).collect()
}

/// `[n_picks, n_epochs · n_times]`: picked channels with epochs laid end to end.
fn concatenate_epochs(data: &Array3<f64>, picks: &[usize]) -> Array2<f64> {
    let (n_e, _, n_t) = data.dim();
    let mut out = Array2::<f64>::zeros((picks.len(), n_e * n_t));
    for (mut row, &p) in out.outer_iter_mut().zip(picks) {
        for e in 0..n_e {
            row.slice_mut(s![e * n_t..(e + 1) * n_t])
                .assign(&data.slice(s![e, p, ..]));
        }
    }
    out
}

// ── Step 1: bad channels ─────────────────────────────────────────────────

/// Bad channel names per metric.
///
/// Each channel is scored over all epochs laid end to end.  With
/// `eeg_ref_corr` the scores of every group are corrected for distance to
/// the reference before thresholding.
pub fn bad_channels(
    epochs: &Epochs,
    picks: &[usize],
    params: &BadChannelsParams,
) -> Result<BTreeMap<Metric, Vec<String>>> {
    params.validate()?;
    epochs.validate_picks(picks)?;
    let metrics = params.metrics();
    let threshold = Threshold { thresh: params.thresh, max_iter: params.max_iter, tail: params.tail };

    let data = concatenate_epochs(epochs.data(), picks);
    let groups = picks_by_type(epochs.chs(), picks);
    let units = units(&groups, &metrics);

    let found = for_each_unit(&units, |g, metric| {
        let group = &groups[g];
        let scores = metric.channel_scores(data.select(Axis(0), &group.members).view(), epochs.sfreq())?;
        let scores = if params.eeg_ref_corr {
            distance_correction(&group_chs(epochs, picks, group), scores.view())?
        } else {
            scores
        };
        Ok(threshold
            .outliers(scores.view())
            .into_iter()
            .map(|i| epochs.chs()[picks[group.members[i]]].name.clone())
            .collect::<Vec<String>>())
    })?;

    let mut bads: BTreeMap<Metric, Vec<String>> = BTreeMap::new();
    let mut current = None;
    for (&(g, metric), names) in units.iter().zip(found) {
        if current != Some(g) {
            info!("Bad channel detection on {} channels:", groups[g].kind.as_str().to_uppercase());
            current = Some(g);
        }
        info!("\tBad by {metric}: {names:?}");
        bads.entry(metric).or_default().extend(names);
    }
    Ok(bads)
}

// ── Step 2: bad epochs ───────────────────────────────────────────────────

/// Bad epoch indices per metric.
///
/// Scores are per epoch, averaged over the channels of each group.
pub fn bad_epochs(
    epochs: &Epochs,
    picks: &[usize],
    params: &BadEpochsParams,
) -> Result<BTreeMap<Metric, Vec<usize>>> {
    params.validate()?;
    epochs.validate_picks(picks)?;
    let metrics = params.metrics();
    let threshold = Threshold { thresh: params.thresh, max_iter: params.max_iter, tail: params.tail };

    let data = epochs.data().select(Axis(1), picks);
    let groups = picks_by_type(epochs.chs(), picks);
    let units = units(&groups, &metrics);

    let found = for_each_unit(&units, |g, metric| {
        let scores = metric.epoch_scores(data.select(Axis(1), &groups[g].members).view())?;
        Ok(threshold.outliers(scores.view()))
    })?;

    let mut bads: BTreeMap<Metric, Vec<usize>> = BTreeMap::new();
    let mut current = None;
    for (&(g, metric), idx) in units.iter().zip(found) {
        if current != Some(g) {
            info!("Bad epoch detection on {} channels:", groups[g].kind.as_str().to_uppercase());
            current = Some(g);
        }
        info!("\tBad by {metric}: {idx:?}");
        bads.entry(metric).or_default().extend(idx);
    }
    Ok(bads)
}

// ── Step 3: bad components ───────────────────────────────────────────────

/// Bad component indices per metric.
///
/// `sources` is `[n_components, n_times]`, e.g. ICA sources of the
/// concatenated epochs.  All components form a single group.
pub fn bad_components(
    sources: ArrayView2<f64>,
    sfreq: f64,
    params: &ComponentParams,
) -> Result<BTreeMap<Metric, Vec<usize>>> {
    params.validate()?;
    let metrics = params.metrics();
    let threshold = Threshold { thresh: params.thresh, max_iter: params.max_iter, tail: params.tail };
    let units: Vec<(usize, Metric)> = metrics.iter().map(|&m| (0, m)).collect();

    let found = for_each_unit(&units, |_, metric| {
        let scores = metric.component_scores(sources, sfreq, params.power_gradient_range)?;
        Ok(threshold.outliers(scores.view()))
    })?;

    info!("Bad component detection on {} sources:", sources.nrows());
    let mut bads = BTreeMap::new();
    for (&(_, metric), idx) in units.iter().zip(found) {
        info!("\tBad by {metric}: {idx:?}");
        bads.insert(metric, idx);
    }
    Ok(bads)
}

// ── Step 4: bad channels in epochs ───────────────────────────────────────

/// Per-metric `[n_epochs, n_picks]` masks of channels that are bad within an
/// epoch.  Column `j` is `picks[j]`.
///
/// Every epoch is thresholded on its own; with `eeg_ref_corr` each epoch's
/// channel scores are corrected before thresholding.
pub fn bad_channel_in_epoch_masks(
    epochs: &Epochs,
    picks: &[usize],
    params: &BadChannelsInEpochsParams,
) -> Result<BTreeMap<Metric, Array2<bool>>> {
    params.validate()?;
    epochs.validate_picks(picks)?;
    let metrics = params.metrics();
    let threshold = Threshold { thresh: params.thresh, max_iter: params.max_iter, tail: params.tail };
    let n_e = epochs.n_epochs();

    let data = epochs.data().select(Axis(1), picks);
    let groups = picks_by_type(epochs.chs(), picks);
    let units = units(&groups, &metrics);

    // One list of outlying member positions per epoch.
    let found = for_each_unit(&units, |g, metric| {
        let group = &groups[g];
        let surface = metric.channel_in_epoch_scores(data.select(Axis(1), &group.members).view(), epochs.sfreq())?;
        let angles = if params.eeg_ref_corr {
            Some(reference_angles(&group_chs(epochs, picks, group))?)
        } else {
            None
        };
        Ok(surface
            .outer_iter()
            .map(|scores| match &angles {
                Some(t) => threshold.outliers(remove_quadratic_trend(t, scores).view()),
                None => threshold.outliers(scores),
            })
            .collect::<Vec<Vec<usize>>>())
    })?;

    let mut masks: BTreeMap<Metric, Array2<bool>> = metrics
        .iter()
        .map(|&m| (m, Array2::from_elem((n_e, picks.len()), false)))
        .collect();
    let mut current = None;
    for (&(g, metric), per_epoch) in units.iter().zip(found) {
        let group = &groups[g];
        if current != Some(g) {
            info!("Bad channel-in-epoch detection on {} channels:", group.kind.as_str().to_uppercase());
            current = Some(g);
        }
        let Some(mask) = masks.get_mut(&metric) else { continue };
        for (e, outliers) in per_epoch.into_iter().enumerate() {
            if outliers.is_empty() {
                continue;
            }
            let names: Vec<&str> = outliers
                .iter()
                .map(|&i| epochs.chs()[picks[group.members[i]]].name.as_str())
                .collect();
            info!("Epoch {e}, bad by {metric}:\n\t{names:?}");
            for i in outliers {
                mask[[e, group.members[i]]] = true;
            }
        }
    }
    Ok(masks)
}

/// Per-epoch lists of the picked channel names set in `mask`.
pub fn mask_to_names(mask: &Array2<bool>, names: &[&str]) -> Vec<Vec<String>> {
    mask.outer_iter()
        .map(|row| {
            row.iter()
                .zip(names)
                .filter(|&(&bad, _)| bad)
                .map(|(_, name)| name.to_string())
                .collect()
        })
        .collect()
}

/// Element-wise OR of all masks; `None` when there are none.
pub fn combine_masks<'a>(masks: impl IntoIterator<Item = &'a Array2<bool>>) -> Option<Array2<bool>> {
    masks.into_iter().fold(None, |acc, m| match acc {
        None => Some(m.clone()),
        Some(mut a) => {
            a.zip_mut_with(m, |x, &y| *x |= y);
            Some(a)
        }
    })
}
