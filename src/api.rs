use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use log::info;

use crate::engine::analysis::{AnalysisFeed, AnalysisSnapshot};
use crate::engine::audio::AudioEngine;
use crate::engine::dsp::waveshaper;
use crate::engine::messages::{EngineMsg, VoiceSetup};
use crate::engine::modules::store::{default_catalog, CatalogEntry, SampleStore};
use crate::engine::modules::track::{self, TrackBuffer};
use crate::engine::params::{EngineConfig, MasterParams, MasterUpdate, TriggerParams};
use crate::engine::scheduler::{FourOnFloor, Pattern, Scheduler};
use crate::engine::state::EngineShared;
use crate::error::EngineError;

/// Identifies a live voice for early cancellation. Triggers are
/// fire-and-forget; this is not a result handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceHandle(u64);

/// Metadata for a successfully decoded uploaded track.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct TrackInfo {
  pub duration_seconds: f64,
  pub sample_rate: f32,
  pub channels: usize,
}

/// In-memory WAV render of the current mix.
pub struct ExportedMix {
  pub wav: Vec<u8>,
  pub info: TrackInfo,
}

/// The engine context: owns the output stream, the sample store, the
/// scheduler, and the analysis feed. Callers hold one of these instead
/// of any process-global state.
pub struct Engine {
  tx: Sender<EngineMsg>,
  audio: AudioEngine,
  shared: Arc<EngineShared>,
  store: Arc<SampleStore>,
  analysis: AnalysisFeed,
  scheduler: Scheduler,
  master: MasterParams,
  current_track: Option<Arc<TrackBuffer>>,
}

impl Engine {
  /// Opens the output stream and loads the stock catalog from
  /// `samples/`. Fails only when no audio backend is available.
  pub fn initialize(config: EngineConfig) -> Result<Self, EngineError> {
    Self::initialize_with_catalog(config, &default_catalog(Path::new("samples")))
  }

  pub fn initialize_with_catalog(config: EngineConfig, catalog: &[CatalogEntry]) -> Result<Self, EngineError> {
    let shared = Arc::new(EngineShared::new());
    let (tap_tx, tap_rx) = unbounded();
    let mut audio = AudioEngine::new(config, shared.clone(), tap_tx)?;
    audio.start()?;
    let sr = audio.sr;
    let store = Arc::new(SampleStore::load(
      catalog,
      sr,
      Duration::from_millis(config.load_timeout_millis),
    ));
    let tx = audio.sender();
    let scheduler = Scheduler::new(
      tx.clone(),
      store.clone(),
      shared.clone(),
      sr,
      config.lookahead_seconds,
      Duration::from_millis(config.tick_millis),
    );
    let analysis = AnalysisFeed::new(tap_rx, sr);
    info!("engine initialized at {sr} Hz with {} samples", store.len());
    Ok(Self {
      tx,
      audio,
      shared,
      store,
      analysis,
      scheduler,
      master: MasterParams::default(),
      current_track: None,
    })
  }

  pub fn sample_rate(&self) -> f32 { self.audio.sr }

  pub fn sample_names(&self) -> Vec<String> {
    self.store.names().map(String::from).collect()
  }

  /// Fire-and-forget trigger. The curve table is built here on the
  /// control timeline; the render side only copies state into a slot.
  pub fn trigger_sample(&self, name: &str, params: TriggerParams) -> Result<VoiceHandle, EngineError> {
    let buffer = self.store.get(name)?;
    let params = params.clamped();
    let id = self.shared.alloc_voice_id();
    let setup = VoiceSetup {
      id,
      buffer,
      curve: Arc::new(waveshaper::build_curve(params.distortion, waveshaper::CURVE_LEN)),
      params,
      start_frame: None,
    };
    let _ = self.tx.send(EngineMsg::Trigger(setup));
    Ok(VoiceHandle(id))
  }

  pub fn cancel_voice(&self, handle: VoiceHandle) {
    let _ = self.tx.send(EngineMsg::CancelVoice { id: handle.0 });
  }

  /// Decodes uploaded bytes and swaps them in as the master source.
  /// Any track already playing is stopped first.
  pub fn load_track(&mut self, bytes: &[u8]) -> Result<TrackInfo, EngineError> {
    let decoded = track::decode_track(bytes).map_err(|e| EngineError::Decode(format!("{e:#}")))?;
    let info = TrackInfo {
      duration_seconds: decoded.duration_seconds(),
      sample_rate: decoded.sample_rate,
      channels: decoded.channels,
    };
    let decoded = Arc::new(decoded);
    self.current_track = Some(decoded.clone());
    let _ = self.tx.send(EngineMsg::LoadTrack { track: decoded });
    Ok(info)
  }

  /// Commits a partial update as one whole-state message, so it is safe
  /// to call at any rate while audio renders.
  pub fn set_master_parameters(&mut self, update: MasterUpdate) {
    self.master.apply(&update);
    let curve = Arc::new(waveshaper::build_curve(self.master.distortion, waveshaper::CURVE_LEN));
    let _ = self.tx.send(EngineMsg::SetMaster { params: self.master, curve });
  }

  pub fn master_parameters(&self) -> MasterParams { self.master }

  pub fn start_scheduler(&mut self, bpm: f32) {
    self.scheduler.start(bpm, Box::new(FourOnFloor::default()));
  }

  pub fn start_scheduler_with_pattern(&mut self, bpm: f32, pattern: Box<dyn Pattern>) {
    self.scheduler.start(bpm, pattern);
  }

  pub fn set_tempo(&self, bpm: f32) { self.scheduler.set_tempo(bpm); }

  pub fn scheduler_running(&self) -> bool { self.scheduler.is_running() }

  pub fn stop_scheduler(&mut self) { self.scheduler.stop(); }

  /// Stops the master source. No new frames come from it once the
  /// render thread applies the message.
  pub fn stop_playback(&mut self) {
    self.current_track = None;
    let _ = self.tx.send(EngineMsg::StopTrack);
  }

  pub fn poll_analysis(&mut self) -> Option<AnalysisSnapshot> {
    self.analysis.poll(self.shared.master_active())
  }

  /// Stub export: encodes the loaded track as 16-bit WAV in memory.
  /// Rendering the effect chain into the export is a collaborator
  /// concern.
  pub fn export_current_mix(&self) -> Result<ExportedMix, EngineError> {
    let current = self
      .current_track
      .as_ref()
      .ok_or_else(|| EngineError::Export("no track loaded".to_string()))?;
    let wav = track::encode_wav(current).map_err(|e| EngineError::Export(format!("{e:#}")))?;
    Ok(ExportedMix {
      wav,
      info: TrackInfo {
        duration_seconds: current.duration_seconds(),
        sample_rate: current.sample_rate,
        channels: current.channels,
      },
    })
  }

  pub fn shutdown(&mut self) {
    self.scheduler.stop();
    self.stop_playback();
    self.audio.stop();
  }
}
