//! Iterative z-score outlier selection.
//!
//! Each pass computes mean and (population) standard deviation over the
//! scores that have not been flagged yet, flags every remaining score beyond
//! `thresh` standard deviations, and repeats on the cleaner baseline until a
//! pass flags nothing or `max_iter` passes have run.  With the FASTER
//! default of one pass this is a plain z-score threshold.
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which side of the distribution counts as outlying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tail {
    /// `|z| > thresh`
    #[default]
    Both,
    /// `z > thresh`
    Upper,
    /// `z < -thresh`
    Lower,
}

impl Tail {
    fn exceeds(self, z: f64, thresh: f64) -> bool {
        match self {
            Tail::Both => z.abs() > thresh,
            Tail::Upper => z > thresh,
            Tail::Lower => z < -thresh,
        }
    }
}

/// Indices (ascending) of the outlying entries of `scores`.
///
/// Non-finite scores are left out of the statistics and never flagged.  A
/// pass whose baseline has zero spread (for instance one remaining score)
/// flags nothing and ends the search.
pub fn find_outliers(scores: ArrayView1<f64>, thresh: f64, max_iter: usize, tail: Tail) -> Vec<usize> {
    let n = scores.len();
    let mut flagged = vec![false; n];

    for iteration in 0..max_iter {
        let working: Vec<usize> = (0..n)
            .filter(|&i| !flagged[i] && scores[i].is_finite())
            .collect();
        if working.len() < 2 {
            break;
        }
        let count = working.len() as f64;
        let mean = working.iter().map(|&i| scores[i]).sum::<f64>() / count;
        let var = working
            .iter()
            .map(|&i| (scores[i] - mean).powi(2))
            .sum::<f64>()
            / count;
        let std = var.sqrt();
        if !(std.is_finite() && std > 0.0) {
            break;
        }

        let fresh: Vec<usize> = working
            .into_iter()
            .filter(|&i| tail.exceeds((scores[i] - mean) / std, thresh))
            .collect();
        debug!(iteration, mean, std, n_new = fresh.len(), "outlier pass");
        if fresh.is_empty() {
            break;
        }
        for i in fresh {
            flagged[i] = true;
        }
    }

    flagged
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f)
        .map(|(i, _)| i)
        .collect()
}
