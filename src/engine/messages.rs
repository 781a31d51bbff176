use std::sync::Arc;

use crate::engine::modules::store::SampleBuffer;
use crate::engine::modules::track::TrackBuffer;
use crate::engine::params::{MasterParams, TriggerParams};

/// Everything a pool slot needs to start rendering. Built on the control
/// timeline (including the distortion curve table) so the render callback
/// only moves it into a slot.
pub struct VoiceSetup {
  pub id: u64,
  pub buffer: Arc<SampleBuffer>,
  pub params: TriggerParams,
  pub curve: Arc<Vec<f32>>,
  /// Absolute audio-clock frame to start at; `None` starts immediately.
  pub start_frame: Option<u64>,
}

/// Control-to-render messages. One message is the atomic unit of
/// publication; the renderer drains these at the top of each callback.
pub enum EngineMsg {
  Trigger(VoiceSetup),
  CancelVoice { id: u64 },
  /// Replaces any currently playing track; at most one master source.
  LoadTrack { track: Arc<TrackBuffer> },
  StopTrack,
  /// Whole committed master state plus the curve for its drive setting.
  SetMaster { params: MasterParams, curve: Arc<Vec<f32>> },
}
