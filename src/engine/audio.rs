use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use crate::engine::graph::EngineGraph;
use crate::engine::messages::EngineMsg;
use crate::engine::params::EngineConfig;
use crate::engine::state::EngineShared;
use crate::error::EngineError;

pub struct AudioEngine {
  tx: Sender<EngineMsg>,
  rx: Receiver<EngineMsg>,
  pub sr: f32,
  shared: Arc<EngineShared>,
  tap_tx: Sender<Vec<f32>>,
  stream: Option<cpal::Stream>,
  config: EngineConfig,
}

impl AudioEngine {
  pub fn new(config: EngineConfig, shared: Arc<EngineShared>, tap_tx: Sender<Vec<f32>>) -> Result<Self, EngineError> {
    let (tx, rx) = unbounded();
    // Probe the device up front so backend absence fails initialization,
    // not the first start.
    let (_device, supported) = pick_output_config(&config.preferred_sample_rates)?;
    let sr = supported.sample_rate().0 as f32;
    Ok(Self { tx, rx, sr, shared, tap_tx, stream: None, config })
  }

  pub fn start(&mut self) -> Result<(), EngineError> {
    if self.stream.is_some() { return Ok(()); }
    let (device, supported) = pick_output_config(&self.config.preferred_sample_rates)?;
    let mut cfg: cpal::StreamConfig = supported.into();
    // Request a larger buffer for better stability; reduce underruns
    cfg.buffer_size = cpal::BufferSize::Fixed(self.config.buffer_frames);
    self.sr = cfg.sample_rate.0 as f32;

    let rx = self.rx.clone();
    // Graph state moves into the audio thread.
    let mut graph = EngineGraph::new(self.sr, self.config.max_voices, self.shared.clone());
    graph.set_tap_sender(self.tap_tx.clone());

    let err_fn = |e: cpal::StreamError| log::warn!("stream error: {e}");
    let stream = device.build_output_stream(&cfg, move |data: &mut [f32], _| {
      // Drain messages without blocking (tight cap to avoid starving audio)
      let mut drained = 0usize;
      loop {
        match rx.try_recv() {
          Ok(msg) => graph.apply_msg(msg),
          Err(TryRecvError::Empty) => break,
          Err(TryRecvError::Disconnected) => break,
        }
        drained += 1;
        if drained >= 24 { break; }
      }
      // Render frames
      for frame in data.chunks_mut(2) {
        let (l, r) = graph.render_frame();
        frame[0] = l;
        if frame.len() > 1 { frame[1] = r; }
      }
    }, err_fn, None).map_err(|e| EngineError::Initialization(e.to_string()))?;
    stream.play().map_err(|e| EngineError::Initialization(e.to_string()))?;
    self.stream = Some(stream);
    Ok(())
  }

  pub fn stop(&mut self) {
    self.stream.take();
  }

  pub fn sender(&self) -> Sender<EngineMsg> { self.tx.clone() }
}

fn pick_output_config(prefs: &[u32]) -> Result<(cpal::Device, cpal::SupportedStreamConfig), EngineError> {
  let host = cpal::default_host();
  let device = host
    .default_output_device()
    .ok_or_else(|| EngineError::Initialization("no output device".to_string()))?;
  // Pick a stereo f32 config at a preferred rate, else take what we get
  let mut chosen: Option<cpal::SupportedStreamConfig> = None;
  for &sr in prefs {
    if chosen.is_some() { break; }
    if let Ok(supported) = device.supported_output_configs() {
      for range in supported {
        if range.channels() != 2 { continue; }
        if range.sample_format() != cpal::SampleFormat::F32 { continue; }
        if range.min_sample_rate().0 <= sr && range.max_sample_rate().0 >= sr {
          chosen = Some(range.with_sample_rate(cpal::SampleRate(sr)));
          break;
        }
      }
    }
  }
  if chosen.is_none() {
    if let Ok(supported) = device.supported_output_configs() {
      for range in supported {
        if range.channels() == 2 && range.sample_format() == cpal::SampleFormat::F32 {
          chosen = Some(range.with_max_sample_rate());
          break;
        }
      }
    }
  }
  let config = match chosen {
    Some(cfg) => cfg,
    None => device
      .default_output_config()
      .map_err(|e| EngineError::Initialization(e.to_string()))?,
  };
  Ok((device, config))
}

// Intentionally not Clone; the graph moves into the audio callback.
