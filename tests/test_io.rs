mod common;
use common::{noise_epochs, scale, sphere_channels};
use faster::io::{load_epochs, StWriter};
use faster::{find_bad_channels, BadChannelsParams, ChannelInfo, ChannelKind, Epochs, Metric, Method};

fn tmp(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("faster_test_{}_{name}.safetensors", std::process::id()))
}

#[test]
fn epochs_round_trip_through_safetensors() {
    let mut chs = sphere_channels(&[0.4, 0.8, 1.2]);
    chs.push(ChannelInfo::new("MEG 0111", ChannelKind::Mag));
    chs.push(ChannelInfo::new("MEG 0112", ChannelKind::Grad));
    let epochs = Epochs::new(noise_epochs(3, 5, 64, 51), 128.0, chs)
        .unwrap()
        .with_bads(vec!["EEG002".into()]);

    let path = tmp("roundtrip");
    let mut w = StWriter::new();
    w.add_epochs(&epochs);
    w.write(&path).unwrap();
    let back = load_epochs(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(back.data(), epochs.data());
    assert_eq!(back.sfreq(), 128.0);
    assert_eq!(back.chs(), epochs.chs());
    assert_eq!(back.bads(), epochs.bads());
}

#[test]
fn loaded_file_feeds_detection() {
    let mut data = noise_epochs(5, 16, 200, 52);
    scale(&mut data, None, 12, 100.0);

    let path = tmp("detect");
    let mut w = StWriter::new();
    let flat: Vec<f32> = data.iter().map(|&v| v as f32).collect();
    w.add_f32("data", &flat, &[5, 16, 200]);
    w.add_f64("sfreq", &[200.0], &[1]);
    w.write(&path).unwrap();
    let epochs = load_epochs(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let params = BadChannelsParams { use_metrics: Some(vec![Metric::Variance]), ..Default::default() };
    let bads = find_bad_channels(&epochs, None, Method::Faster, &params, false).unwrap();
    assert_eq!(bads.combined().unwrap(), ["EEG013".to_string()]);
}
