//! Safetensors I/O for epoched recordings.
//!
//! Reader: [`load_epochs`] builds an [`Epochs`] from a file with these
//! tensors:
//!
//! | key | dtype | shape | |
//! |---|---|---|---|
//! | `data` | F32 / F64 | `[E, C, T]` | required |
//! | `sfreq` | F32 / F64 | `[1]` | required |
//! | `ch_loc` | F32 / F64 | `[C, 12]` | zeros if absent |
//! | `ch_kind` | I32 | `[C]` | FIFF kind codes, EEG if absent |
//! | `ch_unit` | I32 | `[C]` | FIFF units, splits mag / grad |
//! | `ch_names` | U8 | `[n]` | newline-separated, `EEG001…` if absent |
//! | `bads` | U8 | `[n]` | newline-separated |
//!
//! Writer: [`StWriter`].
use anyhow::{bail, ensure, Context, Result};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::info::{ChannelInfo, ChannelKind, Epochs, FIFFV_EEG_CH};

// ── Safetensors layout ───────────────────────────────────────────────────────
//
// `[u64 LE header length][JSON header, space padded to 8 bytes][tensor bytes]`
// with one header entry per tensor; offsets are relative to the tensor bytes.

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

impl Entry {
    /// Bytes per element, for the dtypes this module reads and writes.
    fn width(&self) -> Option<usize> {
        match self.dtype.as_str() {
            "F64" => Some(8),
            "F32" | "I32" => Some(4),
            "U8" => Some(1),
            _ => None,
        }
    }

    fn n_elements(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    fn n_bytes(&self) -> usize {
        self.data_offsets[1] - self.data_offsets[0]
    }
}

/// Serialized header, padded to a multiple of 8 bytes.
fn encode_header(entries: &[(&str, Entry)]) -> Result<Vec<u8>> {
    let mut map = serde_json::Map::new();
    for (name, entry) in entries {
        map.insert(name.to_string(), serde_json::to_value(entry)?);
    }
    let mut bytes = serde_json::to_vec(&map)?;
    let pad = (8 - bytes.len() % 8) % 8;
    bytes.resize(bytes.len() + pad, b' ');
    Ok(bytes)
}

// ── Reader ───────────────────────────────────────────────────────────────────

struct StFile {
    bytes: Vec<u8>,
    data_start: usize,
    entries: HashMap<String, Entry>,
}

impl StFile {
    fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        ensure!(bytes.len() >= 8, "safetensors file too small");
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let data_start = usize::try_from(u64::from_le_bytes(len))
            .ok()
            .and_then(|n| n.checked_add(8))
            .filter(|&end| end <= bytes.len())
            .context("safetensors header truncated")?;

        let header: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..data_start]).context("failed to parse safetensors header")?;

        let mut entries = HashMap::new();
        for (key, val) in header {
            if key == "__metadata__" {
                continue;
            }
            let entry: Entry =
                serde_json::from_value(val).with_context(|| format!("bad header entry '{key}'"))?;
            let [start, end] = entry.data_offsets;
            ensure!(start <= end, "tensor '{key}' has data_offsets out of order");
            ensure!(
                data_start.checked_add(end).is_some_and(|e| e <= bytes.len()),
                "tensor '{key}' runs past end of file"
            );
            if let Some(width) = entry.width() {
                let expected = entry.n_elements().and_then(|n| n.checked_mul(width));
                ensure!(
                    expected == Some(entry.n_bytes()),
                    "tensor '{key}' of shape {:?} and dtype {} does not match its {} bytes",
                    entry.shape,
                    entry.dtype,
                    entry.n_bytes()
                );
            }
            entries.insert(key, entry);
        }
        Ok(Self { bytes, data_start, entries })
    }

    fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    fn raw(&self, e: &Entry) -> &[u8] {
        &self.bytes[self.data_start + e.data_offsets[0]..self.data_start + e.data_offsets[1]]
    }

    /// Float tensor widened to f64.
    fn f64s(&self, key: &str) -> Result<(Vec<f64>, Vec<usize>)> {
        let e = self.get(key).with_context(|| format!("missing '{key}' key"))?;
        let raw = self.raw(e);
        let vals: Vec<f64> = match e.dtype.as_str() {
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            other => bail!("'{key}' has dtype {other}, expected F32 or F64"),
        };
        ensure!(Some(vals.len()) == e.n_elements(), "'{key}' element count does not match shape {:?}", e.shape);
        Ok((vals, e.shape.clone()))
    }

    fn i32s(&self, key: &str) -> Result<Vec<i32>> {
        let e = self.get(key).with_context(|| format!("missing '{key}' key"))?;
        ensure!(e.dtype == "I32", "'{key}' has dtype {}, expected I32", e.dtype);
        let vals: Vec<i32> = self
            .raw(e)
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        ensure!(Some(vals.len()) == e.n_elements(), "'{key}' element count does not match shape {:?}", e.shape);
        Ok(vals)
    }

    /// Newline-separated UTF-8 list; empty if the key is absent.
    fn lines(&self, key: &str) -> Result<Vec<String>> {
        let Some(e) = self.get(key) else {
            return Ok(vec![]);
        };
        let text = std::str::from_utf8(self.raw(e)).with_context(|| format!("'{key}' is not UTF-8"))?;
        Ok(text.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

/// Load an epoched recording; see the module docs for the layout.
pub fn load_epochs(path: &Path) -> Result<Epochs> {
    let st = StFile::open(path)?;

    let (data, shape) = st.f64s("data")?;
    ensure!(shape.len() == 3, "'data' must be [E, C, T], got shape {shape:?}");
    let (n_e, n_ch, n_t) = (shape[0], shape[1], shape[2]);
    let data = Array3::from_shape_vec((n_e, n_ch, n_t), data)?;

    let (sfreq, _) = st.f64s("sfreq")?;
    let sfreq = *sfreq.first().context("'sfreq' is empty")?;

    let mut names = st.lines("ch_names")?;
    if names.is_empty() {
        names = (1..=n_ch).map(|i| format!("EEG{i:03}")).collect();
    }
    ensure!(names.len() == n_ch, "{} channel names for {n_ch} channels", names.len());

    let kinds = match st.get("ch_kind") {
        Some(_) => st.i32s("ch_kind")?,
        None => vec![FIFFV_EEG_CH; n_ch],
    };
    let units = match st.get("ch_unit") {
        Some(_) => st.i32s("ch_unit")?,
        None => vec![0; n_ch],
    };
    ensure!(kinds.len() == n_ch && units.len() == n_ch, "'ch_kind'/'ch_unit' must have {n_ch} entries");

    let locs = match st.get("ch_loc") {
        Some(_) => {
            let (v, s) = st.f64s("ch_loc")?;
            ensure!(s == [n_ch, 12], "'ch_loc' must be [{n_ch}, 12], got {s:?}");
            v
        }
        None => vec![0.0; n_ch * 12],
    };

    let chs = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let mut ch = ChannelInfo::new(name, ChannelKind::from_fiff(kinds[i], units[i]));
            ch.loc.copy_from_slice(&locs[i * 12..(i + 1) * 12]);
            ch
        })
        .collect();

    let bads = st.lines("bads")?;
    tracing::info!(
        n_epochs = n_e,
        n_channels = n_ch,
        n_times = n_t,
        sfreq,
        n_bads = bads.len(),
        "loaded {}",
        path.display()
    );
    Ok(Epochs::new(data, sfreq, chs)?.with_bads(bads))
}

// ── Generic safetensors builder ──────────────────────────────────────────────

/// Simple safetensors file writer for F32, F64, I32 and U8 tensors.
///
/// ```rust,no_run
/// use faster::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("data", &[0.0; 2 * 3 * 4], &[2, 3, 4]);
/// w.add_f64("sfreq", &[250.0], &[1]);
/// w.add_lines("ch_names", &["Fz", "Cz", "Pz"]);
/// w.write(Path::new("/tmp/epochs.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    tensors: Vec<(String, &'static str, Vec<usize>, Vec<u8>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, dtype: &'static str, shape: &[usize], bytes: Vec<u8>) {
        self.tensors.push((name.to_string(), dtype, shape.to_vec(), bytes));
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        self.push(name, "F32", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        self.push(name, "F64", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    pub fn add_f64_arr3(&mut self, name: &str, arr: &Array3<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        let (a, b, c) = arr.dim();
        self.add_f64(name, &data, &[a, b, c]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        self.push(name, "I32", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    /// Newline-joined strings as a U8 tensor.
    pub fn add_lines<S: AsRef<str>>(&mut self, name: &str, lines: &[S]) {
        let text = lines.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("\n");
        let bytes = text.into_bytes();
        self.push(name, "U8", &[bytes.len()], bytes);
    }

    /// Write every field of `epochs`.
    pub fn add_epochs(&mut self, epochs: &Epochs) {
        let n_ch = epochs.chs().len();
        self.add_f64_arr3("data", epochs.data());
        self.add_f64("sfreq", &[epochs.sfreq()], &[1]);
        let locs: Vec<f64> = epochs.chs().iter().flat_map(|c| c.loc).collect();
        self.add_f64("ch_loc", &locs, &[n_ch, 12]);
        let (kinds, units): (Vec<i32>, Vec<i32>) = epochs.chs().iter().map(|c| c.kind.to_fiff()).unzip();
        self.add_i32("ch_kind", &kinds, &[n_ch]);
        self.add_i32("ch_unit", &units, &[n_ch]);
        self.add_lines("ch_names", &epochs.ch_names());
        if !epochs.bads().is_empty() {
            self.add_lines("bads", epochs.bads());
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut offset = 0;
        let entries: Vec<(&str, Entry)> = self
            .tensors
            .iter()
            .map(|(name, dtype, shape, bytes)| {
                let entry = Entry {
                    dtype: dtype.to_string(),
                    shape: shape.clone(),
                    data_offsets: [offset, offset + bytes.len()],
                };
                offset += bytes.len();
                (name.as_str(), entry)
            })
            .collect();
        let header = encode_header(&entries)?;

        let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(header.len() as u64).to_le_bytes())?;
        f.write_all(&header)?;
        for (_, _, _, bytes) in &self.tensors {
            f.write_all(bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("faster_io_{}_{name}.safetensors", std::process::id()))
    }

    #[test]
    fn minimal_file_defaults_to_eeg() {
        let path = tmp("minimal");
        let mut w = StWriter::new();
        w.add_f32("data", &[1.0; 2 * 3 * 5], &[2, 3, 5]);
        w.add_f32("sfreq", &[100.0], &[1]);
        w.write(&path).unwrap();

        let epochs = load_epochs(&path).unwrap();
        assert_eq!(epochs.data().dim(), (2, 3, 5));
        assert_eq!(epochs.sfreq(), 100.0);
        assert_eq!(epochs.ch_names(), vec!["EEG001", "EEG002", "EEG003"]);
        assert!(epochs.chs().iter().all(|c| c.kind == ChannelKind::Eeg));
        assert!(epochs.bads().is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_data_is_reported() {
        let path = tmp("nodata");
        let mut w = StWriter::new();
        w.add_f64("sfreq", &[100.0], &[1]);
        w.write(&path).unwrap();
        let err = load_epochs(&path).unwrap_err();
        assert!(err.to_string().contains("'data'"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn channel_name_count_must_match() {
        let path = tmp("names");
        let mut w = StWriter::new();
        w.add_f64("data", &[0.0; 4], &[1, 2, 2]);
        w.add_f64("sfreq", &[10.0], &[1]);
        w.add_lines("ch_names", &["Cz"]);
        w.write(&path).unwrap();
        assert!(load_epochs(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn short_channel_locations_are_rejected() {
        let path = tmp("shortloc");
        let mut w = StWriter::new();
        w.add_f64("data", &[0.0; 2 * 2 * 4], &[2, 2, 4]);
        w.add_f64("sfreq", &[10.0], &[1]);
        w.add_f64("ch_loc", &[0.1, 0.2, 0.3], &[2, 12]);
        w.write(&path).unwrap();
        let err = load_epochs(&path).unwrap_err();
        assert!(err.to_string().contains("'ch_loc'"), "{err}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn huge_header_length_is_rejected() {
        let path = tmp("hugeheader");
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}      ");
        std::fs::write(&path, &bytes).unwrap();
        let err = load_epochs(&path).unwrap_err();
        assert!(err.to_string().contains("truncated"), "{err}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn offsets_past_end_are_rejected() {
        let path = tmp("pastend");
        let header = br#"{"data":{"dtype":"F64","shape":[1,1,1],"data_offsets":[0,8]}}"#;
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(&[0u8; 4]);
        std::fs::write(&path, &bytes).unwrap();
        let err = load_epochs(&path).unwrap_err();
        assert!(err.to_string().contains("past end"), "{err}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn header_is_padded_to_eight_bytes() {
        let entries = [("x", Entry { dtype: "U8".into(), shape: vec![3], data_offsets: [0, 3] })];
        let header = encode_header(&entries).unwrap();
        assert_eq!(header.len() % 8, 0);
        let parsed: HashMap<String, Entry> = serde_json::from_slice(&header).unwrap();
        assert_eq!(parsed["x"].data_offsets, [0, 3]);
    }
}
