use serde::{Deserialize, Serialize};

/// Per-trigger voice parameters. Defaults match the stock sample pads.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerParams {
  /// 0..100 percent.
  pub volume: f32,
  /// Waveshaper drive, 0..100.
  pub distortion: f32,
  /// Playback rate in percent; 100 plays at native pitch and duration.
  pub speed: f32,
  /// Lowpass cutoff in Hz.
  pub filter_hz: f32,
}

impl Default for TriggerParams {
  fn default() -> Self {
    Self { volume: 80.0, distortion: 30.0, speed: 100.0, filter_hz: 2000.0 }
  }
}

impl TriggerParams {
  pub fn clamped(mut self) -> Self {
    self.volume = self.volume.clamp(0.0, 100.0);
    self.distortion = self.distortion.clamp(0.0, 100.0);
    self.speed = self.speed.clamp(25.0, 400.0);
    self.filter_hz = self.filter_hz.clamp(40.0, 20_000.0);
    self
  }
}

/// The long-lived master chain state for the currently loaded track.
/// Committed on the control timeline and shipped whole in a single
/// message, so the renderer never sees a torn update.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MasterParams {
  /// Bass boost, 0..200 with 100 neutral. Anything else flips the master
  /// filter into low-shelf mode around 250 Hz.
  pub bass: f32,
  /// Playback speed in percent.
  pub speed: f32,
  /// Waveshaper drive, 0..100.
  pub distortion: f32,
  /// Pitch offset in semitones, applied on top of speed.
  pub pitch: f32,
  /// Master volume, 0..100 percent.
  pub volume: f32,
  /// Lowpass cutoff in Hz when no bass boost is active.
  pub cutoff_hz: f32,
}

impl Default for MasterParams {
  fn default() -> Self {
    Self { bass: 100.0, speed: 100.0, distortion: 0.0, pitch: 0.0, volume: 100.0, cutoff_hz: 2000.0 }
  }
}

impl MasterParams {
  pub fn apply(&mut self, update: &MasterUpdate) {
    if let Some(v) = update.bass { self.bass = v.clamp(0.0, 200.0); }
    if let Some(v) = update.speed { self.speed = v.clamp(25.0, 400.0); }
    if let Some(v) = update.distortion { self.distortion = v.clamp(0.0, 100.0); }
    if let Some(v) = update.pitch { self.pitch = v.clamp(-24.0, 24.0); }
    if let Some(v) = update.volume { self.volume = v.clamp(0.0, 100.0); }
    if let Some(v) = update.cutoff_hz { self.cutoff_hz = v.clamp(40.0, 20_000.0); }
  }

  /// Shelf gain in boost units; 1.0 at bass = 150.
  #[inline]
  pub fn shelf_gain(&self) -> f32 { (self.bass - 100.0) / 50.0 }

  #[inline]
  pub fn bass_boosted(&self) -> bool { (self.bass - 100.0).abs() > 1e-3 }

  /// Combined resampling ratio from speed percent and semitone offset.
  #[inline]
  pub fn rate_ratio(&self) -> f64 {
    (f64::from(self.speed) / 100.0) * 2f64.powf(f64::from(self.pitch) / 12.0)
  }

  #[inline]
  pub fn gain(&self) -> f32 { self.volume / 100.0 }
}

/// Partial master update; `None` leaves a field untouched.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterUpdate {
  pub bass: Option<f32>,
  pub speed: Option<f32>,
  pub distortion: Option<f32>,
  pub pitch: Option<f32>,
  pub volume: Option<f32>,
  pub cutoff_hz: Option<f32>,
}

/// Engine construction constants. `Default` reproduces the source
/// application's behavior.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Output sample rates to try, in order, before falling back to
  /// whatever the device offers.
  pub preferred_sample_rates: [u32; 2],
  /// Fixed output buffer size; larger reduces underruns.
  pub buffer_frames: u32,
  /// How far ahead of the audio clock the scheduler queues events.
  pub lookahead_seconds: f64,
  /// Scheduler control-loop period.
  pub tick_millis: u64,
  /// Voice pool size; extra triggers steal round-robin.
  pub max_voices: usize,
  /// Bound on catalog loading before fallback synthesis is forced.
  pub load_timeout_millis: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      preferred_sample_rates: [44_100, 48_000],
      buffer_frames: 1024,
      lookahead_seconds: 0.1,
      tick_millis: 50,
      max_voices: 32,
      load_timeout_millis: 3000,
    }
  }
}
