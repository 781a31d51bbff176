use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::engine::dsp::filter::Biquad;
use crate::engine::dsp::smooth::Smooth;
use crate::engine::dsp::waveshaper::Waveshaper;
use crate::engine::messages::{EngineMsg, VoiceSetup};
use crate::engine::modules::store::SampleBuffer;
use crate::engine::modules::track::TrackPlayer;
use crate::engine::params::MasterParams;
use crate::engine::state::EngineShared;

/// Mono samples per analyzer chunk shipped to the analysis feed.
pub const TAP_CHUNK: usize = 2048;

/// Shelf dB per unit of `(bass - 100) / 50`; bass 200 boosts +12 dB.
const SHELF_DB_PER_UNIT: f32 = 6.0;

/// One slot of the voice pool. Stage state (shaper curve, filter, gain)
/// is owned by the slot; concurrent triggers never share it.
struct PoolVoice {
  active: bool,
  id: u64,
  buffer: Option<Arc<SampleBuffer>>,
  position: f32,
  step: f32,
  gain: f32,
  start_frame: u64,
  shaper: Waveshaper,
  filter: Biquad,
}

impl PoolVoice {
  fn idle() -> Self {
    Self {
      active: false,
      id: 0,
      buffer: None,
      position: 0.0,
      step: 1.0,
      gain: 0.0,
      start_frame: 0,
      shaper: Waveshaper::bypass(),
      filter: Biquad::new(),
    }
  }

  fn release(&mut self) {
    self.active = false;
    self.buffer = None;
  }
}

/// Frames over which a retuned master filter crossfades in (~6 ms).
const FILTER_XFADE_FRAMES: u32 = 256;

/// The persistent chain for the uploaded track:
/// filter -> distortion -> gain -> analyzer tap.
struct MasterChain {
  params: MasterParams,
  shaper: Waveshaper,
  filt_l: Biquad,
  filt_r: Biquad,
  // outgoing filters kept alive while a retune crossfades in
  prev_l: Biquad,
  prev_r: Biquad,
  xfade: u32,
  gain: Smooth,
  sr: f32,
}

impl MasterChain {
  fn new(sr: f32) -> Self {
    let params = MasterParams::default();
    let mut chain = Self {
      shaper: Waveshaper::new(params.distortion),
      filt_l: Biquad::new(),
      filt_r: Biquad::new(),
      prev_l: Biquad::new(),
      prev_r: Biquad::new(),
      xfade: 0,
      gain: Smooth::new(sr, 12.0),
      params,
      sr,
    };
    chain.gain.jump_to(chain.params.gain());
    chain.retune_immediate();
    chain
  }

  /// Applied at a block boundary. The outgoing filter keeps running and
  /// the retuned one fades in over its state, so a lowpass/low-shelf
  /// mode flip moves the output no faster than ordinary ramping.
  fn set_params(&mut self, params: MasterParams, curve: Arc<Vec<f32>>) {
    self.params = params;
    self.shaper = Waveshaper::from_curve(curve);
    self.prev_l = self.filt_l;
    self.prev_r = self.filt_r;
    self.retune_immediate();
    self.xfade = FILTER_XFADE_FRAMES;
  }

  fn retune_immediate(&mut self) {
    if self.params.bass_boosted() {
      let gain_db = SHELF_DB_PER_UNIT * self.params.shelf_gain();
      self.filt_l.set_lowshelf(self.sr, 250.0, gain_db);
      self.filt_r.set_lowshelf(self.sr, 250.0, gain_db);
    } else {
      self.filt_l.set_lowpass(self.sr, self.params.cutoff_hz, 0.707);
      self.filt_r.set_lowpass(self.sr, self.params.cutoff_hz, 0.707);
    }
  }

  #[inline]
  fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let fl = self.filt_l.process(l);
    let fr = self.filt_r.process(r);
    let (l, r) = if self.xfade > 0 {
      let pl = self.prev_l.process(l);
      let pr = self.prev_r.process(r);
      let t = 1.0 - self.xfade as f32 / FILTER_XFADE_FRAMES as f32;
      self.xfade -= 1;
      (pl + (fl - pl) * t, pr + (fr - pr) * t)
    } else {
      (fl, fr)
    };
    let l = self.shaper.shape(l);
    let r = self.shaper.shape(r);
    let g = self.gain.next(self.params.gain());
    (l * g, r * g)
  }
}

/// Render-side state: the voice pool, the track player, and the master
/// chain. Moves into the audio callback at stream start; headless tests
/// drive it directly.
pub struct EngineGraph {
  sr: f32,
  voices: Vec<PoolVoice>,
  next_steal: usize,
  track: TrackPlayer,
  master: MasterChain,
  shared: Arc<EngineShared>,
  tap_buf: Vec<f32>,
  tap_tx: Option<Sender<Vec<f32>>>,
}

impl EngineGraph {
  pub fn new(sr: f32, max_voices: usize, shared: Arc<EngineShared>) -> Self {
    Self {
      sr,
      voices: (0..max_voices.max(1)).map(|_| PoolVoice::idle()).collect(),
      next_steal: 0,
      track: TrackPlayer::new(),
      master: MasterChain::new(sr),
      shared,
      tap_buf: Vec::with_capacity(TAP_CHUNK),
      tap_tx: None,
    }
  }

  pub fn set_tap_sender(&mut self, tx: Sender<Vec<f32>>) { self.tap_tx = Some(tx); }

  pub fn apply_msg(&mut self, msg: EngineMsg) {
    match msg {
      EngineMsg::Trigger(setup) => self.start_voice(setup),
      EngineMsg::CancelVoice { id } => {
        for v in &mut self.voices {
          if v.active && v.id == id { v.release(); }
        }
      }
      EngineMsg::LoadTrack { track } => {
        // at most one master source; the new track replaces the old
        self.track.set_track(track);
        self.shared.set_master_active(true);
      }
      EngineMsg::StopTrack => {
        self.track.stop();
        self.shared.set_master_active(false);
      }
      EngineMsg::SetMaster { params, curve } => self.master.set_params(params, curve),
    }
  }

  fn start_voice(&mut self, setup: VoiceSetup) {
    // find free slot, else steal round robin
    let slot = match self.voices.iter().position(|v| !v.active) {
      Some(idx) => idx,
      None => {
        let idx = self.next_steal;
        self.next_steal = (self.next_steal + 1) % self.voices.len();
        idx
      }
    };
    let params = setup.params;
    let v = &mut self.voices[slot];
    v.active = true;
    v.id = setup.id;
    v.position = 0.0;
    v.step = (setup.buffer.sample_rate / self.sr).max(0.01) * (params.speed / 100.0);
    v.gain = params.volume / 100.0;
    v.start_frame = setup.start_frame.unwrap_or(0);
    v.shaper = Waveshaper::from_curve(setup.curve);
    v.filter = Biquad::new();
    v.filter.set_lowpass(self.sr, params.filter_hz, 0.707);
    v.buffer = Some(setup.buffer);
  }

  pub fn active_voices(&self) -> usize { self.voices.iter().filter(|v| v.active).count() }

  pub fn track_playing(&self) -> bool { self.track.is_playing() }

  pub fn master_params(&self) -> MasterParams { self.master.params }

  /// One stereo output frame. Voices mix straight to the output; only
  /// the uploaded track runs through the master chain.
  pub fn render_frame(&mut self) -> (f32, f32) {
    let now = self.shared.frames();

    let mut dry = 0.0f32;
    for v in &mut self.voices {
      if !v.active || v.start_frame > now { continue; }
      let Some(buf) = v.buffer.as_ref() else { v.active = false; continue; };
      let s = buf.sample_at(v.position);
      let shaped = v.shaper.shape(s);
      let filtered = v.filter.process(shaped);
      dry += filtered * v.gain;
      v.position += v.step;
      if v.position >= buf.frames() as f32 { v.release(); }
    }

    let (ml, mr) = if self.track.is_playing() {
      let rate = self.master.params.rate_ratio();
      let (l, r) = self.track.render(rate, self.sr);
      let out = self.master.process(l, r);
      self.tap(0.5 * (out.0 + out.1));
      out
    } else {
      (0.0, 0.0)
    };

    self.shared.advance_frames(1);
    (dry + ml, dry + mr)
  }

  fn tap(&mut self, mono: f32) {
    if self.tap_buf.len() < TAP_CHUNK { self.tap_buf.push(mono); }
    if self.tap_buf.len() >= TAP_CHUNK {
      if let Some(tx) = self.tap_tx.as_ref() {
        // non-blocking send of a copy; a slow consumer drops chunks
        let mut out = Vec::with_capacity(TAP_CHUNK);
        out.extend_from_slice(&self.tap_buf);
        let _ = tx.try_send(out);
      }
      self.tap_buf.clear();
    }
  }
}
