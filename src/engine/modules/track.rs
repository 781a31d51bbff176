use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

// Simple 4-point cubic interpolation for high-quality resampling
#[inline]
fn cubic_interpolate(y0: f32, y1: f32, y2: f32, y3: f32, frac: f32) -> f32 {
  let a = y3 - y2 - y0 + y1;
  let b = y0 - y1 - a;
  let c = y2 - y0;
  let d = y1;
  a * frac * frac * frac + b * frac * frac + c * frac + d
}

/// Immutable decoded uploaded-track PCM, interleaved. Shared between the
/// render graph and the export path.
pub struct TrackBuffer {
  pub data: Vec<f32>,
  pub channels: usize,
  pub sample_rate: f32,
}

impl TrackBuffer {
  pub fn frames(&self) -> usize {
    if self.channels == 0 { 0 } else { self.data.len() / self.channels }
  }

  pub fn duration_seconds(&self) -> f64 {
    if self.sample_rate > 0.0 { self.frames() as f64 / f64::from(self.sample_rate) } else { 0.0 }
  }

  #[inline]
  fn chan_sample(&self, frame: usize, ch: usize) -> f32 {
    self.data[frame * self.channels + ch]
  }

  /// Cubic-interpolated stereo read at a fractional frame position.
  /// Mono tracks return the same value on both sides.
  #[inline]
  pub fn frame_at(&self, pos: f64) -> (f32, f32) {
    let frames = self.frames();
    if frames == 0 { return (0.0, 0.0); }
    let i1 = pos.floor() as usize;
    if i1 >= frames { return (0.0, 0.0); }
    let frac = (pos - i1 as f64) as f32;
    let i0 = i1.saturating_sub(1);
    let i2 = (i1 + 1).min(frames - 1);
    let i3 = (i1 + 2).min(frames - 1);
    let right = if self.channels > 1 { 1 } else { 0 };
    let l = cubic_interpolate(
      self.chan_sample(i0, 0),
      self.chan_sample(i1, 0),
      self.chan_sample(i2, 0),
      self.chan_sample(i3, 0),
      frac,
    );
    let r = cubic_interpolate(
      self.chan_sample(i0, right),
      self.chan_sample(i1, right),
      self.chan_sample(i2, right),
      self.chan_sample(i3, right),
      frac,
    );
    (l, r)
  }
}

/// Playback head over the loaded track. Holds at most one track; loading
/// a new one replaces (and thereby stops) the previous one. Playback
/// loops so the master chain keeps a continuous source to mutate.
pub struct TrackPlayer {
  track: Option<Arc<TrackBuffer>>,
  pos: f64,
  playing: bool,
}

impl TrackPlayer {
  pub fn new() -> Self { Self { track: None, pos: 0.0, playing: false } }

  pub fn set_track(&mut self, track: Arc<TrackBuffer>) {
    self.track = Some(track);
    self.pos = 0.0;
    self.playing = true;
  }

  pub fn stop(&mut self) {
    self.playing = false;
    self.track = None;
    self.pos = 0.0;
  }

  pub fn is_playing(&self) -> bool { self.playing && self.track.is_some() }

  /// One stereo frame at the given resampling ratio.
  #[inline]
  pub fn render(&mut self, rate: f64, engine_sr: f32) -> (f32, f32) {
    let Some(track) = self.track.as_ref() else { return (0.0, 0.0) };
    if !self.playing { return (0.0, 0.0); }
    let out = track.frame_at(self.pos);
    self.pos += rate * (f64::from(track.sample_rate) / f64::from(engine_sr));
    let frames = track.frames() as f64;
    if frames > 0.0 {
      while self.pos >= frames { self.pos -= frames; }
    }
    out
  }
}

impl Default for TrackPlayer {
  fn default() -> Self { Self::new() }
}

/// Decodes uploaded bytes into an interleaved track buffer. Channel
/// layouts beyond stereo are folded down to their first two channels.
pub fn decode_track(bytes: &[u8]) -> anyhow::Result<TrackBuffer> {
  let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
  let hint = Hint::new();
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
  let mut channels = 0usize;
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
        channels = b.spec().channels.count().min(2);
        interleave(&mut data, channels, |ch, i| b.chan(ch)[i], b.frames());
      }
      AudioBufferRef::S16(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        channels = b.spec().channels.count().min(2);
        interleave(&mut data, channels, |ch, i| b.chan(ch)[i] as f32 / 32_768.0, b.frames());
      }
      AudioBufferRef::S32(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        channels = b.spec().channels.count().min(2);
        interleave(&mut data, channels, |ch, i| b.chan(ch)[i] as f32 / 2_147_483_648.0, b.frames());
      }
      AudioBufferRef::U8(buf) => {
        let b = buf.as_ref();
        sample_rate = b.spec().rate as f32;
        channels = b.spec().channels.count().min(2);
        interleave(&mut data, channels, |ch, i| (b.chan(ch)[i] as f32 - 128.0) / 128.0, b.frames());
      }
      other => {
        anyhow::bail!("unsupported sample format: {:?}", other.spec());
      }
    }
  }

  if data.is_empty() || channels == 0 {
    anyhow::bail!("no decodable audio frames");
  }

  Ok(TrackBuffer { data, channels, sample_rate })
}

#[inline]
fn interleave(out: &mut Vec<f32>, channels: usize, sample: impl Fn(usize, usize) -> f32, frames: usize) {
  for i in 0..frames {
    for ch in 0..channels {
      out.push(sample(ch, i));
    }
  }
}

/// Encodes a track as 16-bit PCM WAV, entirely in memory.
pub fn encode_wav(track: &TrackBuffer) -> anyhow::Result<Vec<u8>> {
  let spec = hound::WavSpec {
    channels: track.channels as u16,
    sample_rate: track.sample_rate as u32,
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut cursor = Cursor::new(Vec::new());
  {
    let mut writer = hound::WavWriter::new(&mut cursor, spec).context("create wav writer")?;
    for &s in &track.data {
      writer.write_sample((s.clamp(-1.0, 1.0) * 32_767.0) as i16).context("write sample")?;
    }
    writer.finalize().context("finalize wav")?;
  }
  Ok(cursor.into_inner())
}
