use std::collections::HashMap;
use std::f32::consts::TAU;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::unbounded;
use log::{info, warn};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::EngineError;

/// Immutable decoded PCM, mono. Never mutated after load; shared by every
/// voice that plays it.
pub struct SampleBuffer {
  pub data: Vec<f32>,
  pub sample_rate: f32,
}

impl SampleBuffer {
  pub fn frames(&self) -> usize { self.data.len() }

  pub fn duration_seconds(&self) -> f32 {
    if self.sample_rate > 0.0 { self.data.len() as f32 / self.sample_rate } else { 0.0 }
  }

  /// Linear-interpolated read; out-of-range positions are silent.
  #[inline]
  pub fn sample_at(&self, pos: f32) -> f32 {
    if self.data.is_empty() || pos < 0.0 { return 0.0; }
    let idx = pos.floor() as usize;
    if idx >= self.data.len() { return 0.0; }
    let next = (idx + 1).min(self.data.len() - 1);
    let frac = pos - idx as f32;
    let a = self.data[idx];
    let b = self.data[next];
    a + (b - a) * frac
  }
}

/// What to synthesize when a catalog entry cannot be decoded. Derived
/// from the entry name, like the stock pad naming.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackKind {
  Kick,
  Bass,
  Synth,
}

impl FallbackKind {
  pub fn from_name(name: &str) -> Self {
    if name.contains("kick") {
      FallbackKind::Kick
    } else if name.contains("bass") {
      FallbackKind::Bass
    } else {
      FallbackKind::Synth
    }
  }
}

#[derive(Clone, Debug)]
pub struct CatalogEntry {
  pub name: String,
  pub path: PathBuf,
}

impl CatalogEntry {
  pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self { name: name.into(), path: path.into() }
  }
}

/// The ten stock pads of the sample library.
pub fn default_catalog(dir: &Path) -> Vec<CatalogEntry> {
  ["kick1", "kick2", "kick3", "bass1", "bass2", "synth1", "synth2", "fx1", "fx2", "fx3"]
    .iter()
    .map(|name| CatalogEntry::new(*name, dir.join(format!("{name}.wav"))))
    .collect()
}

/// Named sample catalog, populated once at engine start. Entries are
/// either decoded from disk or synthesized; none are ever removed.
pub struct SampleStore {
  samples: HashMap<String, Arc<SampleBuffer>>,
}

impl SampleStore {
  /// Decodes every entry on its own thread and collects results until
  /// the deadline; anything missing or failed by then is synthesized
  /// instead. One bad entry never aborts the rest.
  pub fn load(entries: &[CatalogEntry], sample_rate: f32, timeout: Duration) -> Self {
    let (tx, rx) = unbounded();
    for (idx, entry) in entries.iter().enumerate() {
      let tx = tx.clone();
      let path = entry.path.clone();
      thread::spawn(move || {
        let _ = tx.send((idx, decode_file(&path)));
      });
    }
    drop(tx);

    let mut decoded: Vec<Option<SampleBuffer>> = (0..entries.len()).map(|_| None).collect();
    let deadline = Instant::now() + timeout;
    let mut pending = entries.len();
    while pending > 0 {
      match rx.recv_deadline(deadline) {
        Ok((idx, Ok(buf))) => {
          decoded[idx] = Some(buf);
          pending -= 1;
        }
        Ok((idx, Err(err))) => {
          warn!("sample {} failed to decode: {err:#}", entries[idx].name);
          pending -= 1;
        }
        Err(_) => {
          warn!("sample load timed out with {pending} entries outstanding");
          break;
        }
      }
    }

    let mut samples = HashMap::new();
    for (entry, buf) in entries.iter().zip(decoded) {
      let buf = buf.unwrap_or_else(|| synthesize_fallback(FallbackKind::from_name(&entry.name), sample_rate));
      samples.insert(entry.name.clone(), Arc::new(buf));
    }
    info!("sample store ready: {} entries", samples.len());
    Self { samples }
  }

  /// An empty store; useful when the caller supplies no catalog.
  pub fn empty() -> Self { Self { samples: HashMap::new() } }

  pub fn get(&self, name: &str) -> Result<Arc<SampleBuffer>, EngineError> {
    self.samples.get(name).cloned().ok_or_else(|| EngineError::SampleNotFound(name.to_string()))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> { self.samples.keys().map(|s| s.as_str()) }

  pub fn len(&self) -> usize { self.samples.len() }
  pub fn is_empty(&self) -> bool { self.samples.is_empty() }
}

/// Procedural substitute waveforms. Pure function of kind and sample
/// rate: identical inputs give byte-identical buffers.
pub fn synthesize_fallback(kind: FallbackKind, sample_rate: f32) -> SampleBuffer {
  let duration = match kind {
    FallbackKind::Kick => 0.2,
    FallbackKind::Bass | FallbackKind::Synth => 1.0,
  };
  let frames = (sample_rate * duration) as usize;
  let mut data = vec![0.0f32; frames];
  match kind {
    FallbackKind::Kick => {
      // swept sine: instantaneous frequency 100 * e^(-10t), amp e^(-5t)
      let mut phase = 0.0f32;
      for (i, s) in data.iter_mut().enumerate() {
        let t = i as f32 / sample_rate;
        let freq = 100.0 * (-10.0 * t).exp();
        phase += TAU * freq / sample_rate;
        *s = phase.sin() * (-5.0 * t).exp();
      }
    }
    FallbackKind::Bass => {
      // low fundamental plus a weaker second harmonic
      for (i, s) in data.iter_mut().enumerate() {
        let t = i as f32 / sample_rate;
        let fundamental = (TAU * 50.0 * t).sin() * (-0.5 * t).exp();
        let second = (TAU * 100.0 * t).sin() * (-0.8 * t).exp() * 0.35;
        *s = (fundamental + second) * 0.7;
      }
    }
    FallbackKind::Synth => {
      // two partials with independent decay envelopes
      for (i, s) in data.iter_mut().enumerate() {
        let t = i as f32 / sample_rate;
        let a = (TAU * 200.0 * t).sin() * (-0.2 * t).exp();
        let b = (TAU * 400.0 * t).sin() * (-0.35 * t).exp() * 0.5;
        *s = (a + b) * 0.6;
      }
    }
  }
  SampleBuffer { data, sample_rate }
}

fn decode_file(path: &Path) -> anyhow::Result<SampleBuffer> {
  let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
  let mss = MediaSourceStream::new(Box::new(file), Default::default());
  let mut hint = Hint::new();
  if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
    hint.with_extension(ext);
  }
  let meta_opts: MetadataOptions = Default::default();
  let fmt_opts: FormatOptions = Default::default();
  let probed = symphonia::default::get_probe()
    .format(&hint, mss, &fmt_opts, &meta_opts)
    .context("probe format")?;
  let mut reader = probed.format;
  let track = reader
    .tracks()
    .iter()
    .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
    .context("no supported audio tracks")?;
  let dec_opts: DecoderOptions = Default::default();
  let mut decoder = symphonia::default::get_codecs()
    .make(&track.codec_params, &dec_opts)
    .context("create decoder")?;
  let track_id = track.id;

  let mut data = Vec::<f32>::new();
  let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100) as f32;

  loop {
    let packet = match reader.next_packet() {
      Ok(packet) => packet,
      Err(Error::ResetRequired) => break,
      Err(Error::IoError(_)) => break,
      Err(err) => return Err(err.into()),
    };

    while !reader.metadata().is_latest() { reader.metadata().pop(); }
    if packet.track_id() != track_id { continue; }

    match decoder.decode(&packet).context("decode packet")? {
      AudioBufferRef::F32(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        mixdown(&mut data, b.spec().channels.count(), |ch, i| b.chan(ch)[i], b.frames());
      }
      AudioBufferRef::S16(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        mixdown(&mut data, b.spec().channels.count(), |ch, i| b.chan(ch)[i] as f32 / 32_768.0, b.frames());
      }
      AudioBufferRef::S32(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        mixdown(&mut data, b.spec().channels.count(), |ch, i| b.chan(ch)[i] as f32 / 2_147_483_648.0, b.frames());
      }
      AudioBufferRef::U8(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        mixdown(&mut data, b.spec().channels.count(), |ch, i| (b.chan(ch)[i] as f32 - 128.0) / 128.0, b.frames());
      }
      other => {
        anyhow::bail!("unsupported sample format: {:?}", other.spec());
      }
    }
  }

  if data.is_empty() {
    anyhow::bail!("empty sample");
  }

  // normalize to a consistent pad level
  let peak = data.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
  if peak > 0.0001 {
    let norm = (0.9 / peak).min(2.0);
    for s in &mut data { *s *= norm; }
  }

  Ok(SampleBuffer { data, sample_rate })
}

#[inline]
fn mixdown(out: &mut Vec<f32>, channels: usize, sample: impl Fn(usize, usize) -> f32, frames: usize) {
  if channels == 1 {
    for i in 0..frames { out.push(sample(0, i)); }
  } else if channels >= 2 {
    for i in 0..frames { out.push((sample(0, i) + sample(1, i)) * 0.5); }
  }
}
