mod common;
use common::{zero_mean_row, Rng};
use faster::{find_bad_components, ComponentParams, FasterError, Metric, Method};
use ndarray::{s, Array2};

/// Twenty noise sources; source 6 is a spike train.
fn sources() -> Array2<f64> {
    let mut rng = Rng::new(41);
    let mut x = Array2::<f64>::zeros((20, 2000));
    for mut row in x.outer_iter_mut() {
        row.assign(&zero_mean_row(2000, &mut rng));
    }
    x.row_mut(6).fill(0.0);
    x.slice_mut(s![6, ..;200]).fill(100.0);
    x
}

#[test]
fn spiky_source_has_outlying_kurtosis() {
    let params = ComponentParams { use_metrics: Some(vec![Metric::Kurtosis]), ..Default::default() };
    let bads = find_bad_components(sources().view(), 250.0, Method::Faster, &params, false).unwrap();
    assert_eq!(bads.combined().unwrap(), [6]);
}

#[test]
fn default_metrics_run_on_every_source() {
    let bads = find_bad_components(sources().view(), 250.0, Method::Faster, &ComponentParams::default(), true)
        .unwrap();
    let by_metric = bads.by_metric().unwrap();
    let keys: Vec<Metric> = by_metric.keys().copied().collect();
    assert_eq!(
        keys,
        vec![Metric::Hurst, Metric::Kurtosis, Metric::MedianGradient, Metric::PowerGradient]
    );
    assert!(by_metric[&Metric::Kurtosis].contains(&6));
}

#[test]
fn power_gradient_band_must_fit_below_nyquist() {
    let params = ComponentParams {
        use_metrics: Some(vec![Metric::PowerGradient]),
        power_gradient_range: (150.0, 200.0),
        ..Default::default()
    };
    let err = find_bad_components(sources().view(), 250.0, Method::Faster, &params, false).unwrap_err();
    assert!(matches!(
        err,
        FasterError::InsufficientResolution { metric: Metric::PowerGradient, .. }
    ));
}

#[test]
fn single_bin_power_gradient_flags_nothing() {
    // 0.125 Hz bins: [25.0, 25.04) holds one bin, so every slope is NaN.
    let params = ComponentParams {
        use_metrics: Some(vec![Metric::PowerGradient]),
        power_gradient_range: (25.0, 25.04),
        ..Default::default()
    };
    let bads = find_bad_components(sources().view(), 250.0, Method::Faster, &params, false).unwrap();
    assert!(bads.combined().unwrap().is_empty());
}
