//! Correction for the distance between each electrode and the reference.
//!
//! With a single reference electrode, channels close to the reference record
//! smaller potentials, which biases variance-like scores.  The angular
//! distance of every sensor to its reference is computed on the unit sphere
//! and a quadratic in that angle is regressed out of the scores.
//!
//! Only meaningful for single-electrode references; with an average
//! reference leave the correction disabled.
use ndarray::{Array1, ArrayView1};

use crate::error::{FasterError, Result};
use crate::info::ChannelInfo;

/// Angle spreads below this many radians count as a single distance.
pub const ANGLE_TOLERANCE: f64 = 1e-6;

/// Remove the quadratic trend of `scores` against reference distance.
///
/// `chs[i]` describes the channel that produced `scores[i]`.  Fails when any
/// channel lacks a sensor or reference position.
pub fn distance_correction(chs: &[&ChannelInfo], scores: ArrayView1<f64>) -> Result<Array1<f64>> {
    if chs.len() != scores.len() {
        return Err(FasterError::Shape(format!(
            "{} scores for {} channels",
            scores.len(),
            chs.len()
        )));
    }
    let angles = reference_angles(chs)?;
    Ok(remove_quadratic_trend(&angles, scores))
}

/// Angle (radians) between each sensor and its reference, seen from the
/// head centre.
///
/// `atan2(|a × b|, a · b)` is exact for coincident vectors and keeps full
/// precision for small angles.
pub fn reference_angles(chs: &[&ChannelInfo]) -> Result<Vec<f64>> {
    chs.iter()
        .map(|ch| {
            let pos = unit(ch.pos()).ok_or_else(|| missing(ch, "sensor position"))?;
            let ref_pos = unit(ch.ref_pos()).ok_or_else(|| missing(ch, "reference position"))?;
            let dot: f64 = pos.iter().zip(&ref_pos).map(|(a, b)| a * b).sum();
            let cross = [
                pos[1] * ref_pos[2] - pos[2] * ref_pos[1],
                pos[2] * ref_pos[0] - pos[0] * ref_pos[2],
                pos[0] * ref_pos[1] - pos[1] * ref_pos[0],
            ];
            let sin = cross.iter().map(|x| x * x).sum::<f64>().sqrt();
            Ok(sin.atan2(dot))
        })
        .collect()
}

fn missing(ch: &ChannelInfo, field: &'static str) -> FasterError {
    FasterError::MissingGeometry { channel: ch.name.clone(), field }
}

/// `v / |v|`, or `None` for an all-zero or non-finite vector.
fn unit(v: [f64; 3]) -> Option<[f64; 3]> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }
    Some(v.map(|x| x / norm))
}

/// `y - p(t)` where `p` is the least-squares quadratic through `(t, y)`.
///
/// The fit uses finite scores only; non-finite scores pass through.  When
/// the angles span less than [`ANGLE_TOLERANCE`] only the mean is removed;
/// otherwise the degree drops while the normal equations are singular.
pub fn remove_quadratic_trend(t: &[f64], y: ArrayView1<f64>) -> Array1<f64> {
    let finite: Vec<usize> = (0..y.len()).filter(|&i| y[i].is_finite()).collect();
    if finite.is_empty() {
        return y.to_owned();
    }

    let (t_min, t_max) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| (lo.min(t[i]), hi.max(t[i])));
    let spread = t_max - t_min;
    let max_degree = if spread < ANGLE_TOLERANCE { 0 } else { 2 };

    // Map the angles onto [-1, 1] so the normal equations stay well
    // conditioned.
    let (centre, half) = if max_degree == 0 { (0.0, 1.0) } else { (0.5 * (t_min + t_max), 0.5 * spread) };
    let u = |i: usize| (t[i] - centre) / half;

    let coefs = (0..=max_degree)
        .rev()
        .find_map(|degree| fit_poly(&finite, &u, y, degree))
        .unwrap_or_default();

    Array1::from_iter((0..y.len()).map(|i| y[i] - eval_poly(&coefs, u(i))))
}

/// Normal-equation least squares of degree `degree`; `None` if singular.
///
/// Coefficients are in ascending powers.
fn fit_poly(idx: &[usize], u: &impl Fn(usize) -> f64, y: ArrayView1<f64>, degree: usize) -> Option<Vec<f64>> {
    let k = degree + 1;
    let mut a = vec![vec![0.0; k + 1]; k];
    for &i in idx {
        let ui = u(i);
        let powers: Vec<f64> = (0..k).map(|p| ui.powi(p as i32)).collect();
        for r in 0..k {
            for c in 0..k {
                a[r][c] += powers[r] * powers[c];
            }
            a[r][k] += powers[r] * y[i];
        }
    }
    solve(a)
}

/// Gauss–Jordan on an augmented `k × (k+1)` system with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>) -> Option<Vec<f64>> {
    let k = a.len();
    let scale = (0..k).map(|r| a[r][r].abs()).fold(0.0, f64::max);
    for col in 0..k {
        let pivot = (col..k).max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))?;
        if a[pivot][col].abs() <= 1e-12 * scale.max(f64::MIN_POSITIVE) {
            return None;
        }
        a.swap(col, pivot);
        let p = a[col][col];
        for c in col..=k {
            a[col][c] /= p;
        }
        for r in 0..k {
            if r != col {
                let f = a[r][col];
                for c in col..=k {
                    a[r][c] -= f * a[col][c];
                }
            }
        }
    }
    Some(a.into_iter().map(|row| row[k]).collect())
}

fn eval_poly(coefs: &[f64], u: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, &c| acc * u + c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::ChannelKind;
    use ndarray::array;

    fn eeg(name: &str, pos: [f64; 3], ref_pos: [f64; 3]) -> ChannelInfo {
        ChannelInfo::new(name, ChannelKind::Eeg).with_position(pos, ref_pos)
    }

    #[test]
    fn exact_quadratic_is_removed_completely() {
        let t = [0.1, 0.4, 0.7, 1.0, 1.3, 1.9];
        let y = Array1::from_iter(t.iter().map(|&v| 2.0 - 3.0 * v + 0.5 * v * v));
        let r = remove_quadratic_trend(&t, y.view());
        for &v in r.iter() {
            approx::assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn residual_is_orthogonal_to_trend() {
        let t = [0.2, 0.5, 0.9, 1.1, 1.4, 2.0, 2.6];
        let y = array![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0];
        let r = remove_quadratic_trend(&t, y.view());
        for p in 0..3 {
            let dot: f64 = r.iter().zip(&t).map(|(ri, ti)| ri * ti.powi(p)).sum();
            approx::assert_abs_diff_eq!(dot, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn identical_angles_only_remove_the_mean() {
        let chs: Vec<ChannelInfo> = (0..4)
            .map(|i| {
                let p = [1.0 + i as f64, 0.5, 0.2];
                eeg(&format!("E{i}"), p, p)
            })
            .collect();
        let refs: Vec<&ChannelInfo> = chs.iter().collect();
        let scores = array![1.0, 2.0, 4.0, 9.0];
        let out = distance_correction(&refs, scores.view()).unwrap();
        for (o, s) in out.iter().zip(scores.iter()) {
            approx::assert_abs_diff_eq!(s - o, 4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn coincident_sensor_and_reference_is_a_pure_offset() {
        // Irregular positions whose normalisation does not round cleanly.
        let chs: Vec<ChannelInfo> = (0..16)
            .map(|i| {
                let f = i as f64;
                let p = [0.031 + 0.0117 * f, -0.052 + 0.0071 * f * f / 7.0, 0.083 - 0.0029 * f];
                eeg(&format!("E{i}"), p, p)
            })
            .collect();
        let refs: Vec<&ChannelInfo> = chs.iter().collect();
        assert!(reference_angles(&refs).unwrap().iter().all(|&a| a == 0.0));

        let scores = Array1::from_iter((0..16).map(|i| ((i * 37) % 11) as f64 + 0.25 * i as f64));
        let out = distance_correction(&refs, scores.view()).unwrap();
        let mean = scores.mean().unwrap();
        for (o, s) in out.iter().zip(scores.iter()) {
            approx::assert_abs_diff_eq!(s - o, mean, epsilon = 1e-12);
        }
    }

    #[test]
    fn angle_jitter_below_tolerance_is_ignored() {
        let t: Vec<f64> = (0..8).map(|i| 0.7 + 1e-9 * ((i * 5) % 3) as f64).collect();
        let y = array![1.0, 3.0, 2.0, 8.0, 5.0, 4.0, 6.0, 7.0];
        let r = remove_quadratic_trend(&t, y.view());
        for (ri, yi) in r.iter().zip(y.iter()) {
            approx::assert_abs_diff_eq!(yi - ri, 4.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn small_angles_keep_precision() {
        let a = eeg("C1", [1e-9, 0.0, 1.0], [0.0, 0.0, 1.0]);
        let angle = reference_angles(&[&a]).unwrap()[0];
        approx::assert_relative_eq!(angle, 1e-9, max_relative = 1e-6);
    }

    #[test]
    fn angles_between_unit_vectors() {
        let a = eeg("Cz", [0.0, 0.0, 0.09], [0.0, 0.0, 0.09]);
        let b = eeg("T7", [0.09, 0.0, 0.0], [0.0, 0.0, 0.09]);
        let c = eeg("Iz", [0.0, 0.0, -0.09], [0.0, 0.0, 0.09]);
        let angles = reference_angles(&[&a, &b, &c]).unwrap();
        approx::assert_abs_diff_eq!(angles[0], 0.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(angles[1], std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(angles[2], std::f64::consts::PI, epsilon = 1e-12);
    }

    #[test]
    fn missing_reference_is_an_error() {
        let a = eeg("Fz", [0.0, 0.05, 0.08], [0.0, 0.0, 0.09]);
        let b = eeg("Pz", [0.0, -0.05, 0.08], [0.0, 0.0, 0.0]);
        let err = distance_correction(&[&a, &b], array![1.0, 2.0].view()).unwrap_err();
        match err {
            FasterError::MissingGeometry { channel, field } => {
                assert_eq!(channel, "Pz");
                assert_eq!(field, "reference position");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_sensor_position_is_an_error() {
        let a = ChannelInfo::new("Oz", ChannelKind::Eeg);
        let err = distance_correction(&[&a], array![1.0].view()).unwrap_err();
        assert!(matches!(err, FasterError::MissingGeometry { field: "sensor position", .. }));
    }

    #[test]
    fn non_finite_scores_pass_through() {
        let t = [0.0, 1.0, 2.0, 3.0];
        let y = array![1.0, f64::NAN, 5.0, 7.0];
        let r = remove_quadratic_trend(&t, y.view());
        assert!(r[1].is_nan());
        // Remaining points lie on a line.
        for i in [0, 2, 3] {
            approx::assert_abs_diff_eq!(r[i], 0.0, epsilon = 1e-9);
        }
    }
}
