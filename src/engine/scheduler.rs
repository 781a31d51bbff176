use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::debug;

use crate::engine::messages::{EngineMsg, VoiceSetup};
use crate::engine::modules::store::SampleStore;
use crate::engine::params::TriggerParams;
use crate::engine::state::EngineShared;
use crate::engine::dsp::waveshaper;

pub const TEMPO_MIN: f32 = 140.0;
pub const TEMPO_MAX: f32 = 220.0;

/// What a pattern wants played on a given beat.
#[derive(Clone, Debug)]
pub struct PatternStep {
  pub sample: String,
  pub params: TriggerParams,
}

/// Beat-content policy. The lookahead mechanism below is the contract;
/// the pattern is swappable.
pub trait Pattern: Send {
  fn step(&mut self, beat: u64) -> Option<PatternStep>;
}

/// Default pattern: a kick on every beat.
pub struct FourOnFloor {
  pub sample: String,
  pub params: TriggerParams,
}

impl Default for FourOnFloor {
  fn default() -> Self {
    Self { sample: "kick1".to_string(), params: TriggerParams::default() }
  }
}

impl Pattern for FourOnFloor {
  fn step(&mut self, _beat: u64) -> Option<PatternStep> {
    Some(PatternStep { sample: self.sample.clone(), params: self.params })
  }
}

/// The lookahead arithmetic, kept free of threads and clocks so the
/// timing grid is testable on its own. `next_event` only ever moves
/// forward, in steps of the current beat interval.
pub struct BeatClock {
  next_event: f64,
  lookahead: f64,
}

impl BeatClock {
  pub fn new(start: f64, lookahead: f64) -> Self {
    Self { next_event: start, lookahead }
  }

  pub fn next_event(&self) -> f64 { self.next_event }

  /// Emits every event inside the lookahead window and advances the
  /// grid. `now` is the audio clock, so control-loop jitter can only
  /// delay how far ahead events queue, never where they land. A tempo
  /// change affects subsequent intervals only.
  pub fn advance(&mut self, now: f64, tempo_bpm: f32, mut emit: impl FnMut(f64)) {
    let interval = 60.0 / f64::from(tempo_bpm.max(1.0));
    while self.next_event < now + self.lookahead {
      emit(self.next_event);
      self.next_event += interval;
    }
  }
}

struct SchedulerShared {
  running: AtomicBool,
  tempo_bits: AtomicU32,
}

impl SchedulerShared {
  fn tempo(&self) -> f32 { f32::from_bits(self.tempo_bits.load(Ordering::Relaxed)) }
  fn set_tempo(&self, bpm: f32) { self.tempo_bits.store(bpm.to_bits(), Ordering::Relaxed); }
}

/// Owns the control-loop worker that turns beats into trigger messages.
/// State machine is Idle -> Running -> Idle; stop is immediate and
/// idempotent.
pub struct Scheduler {
  state: Arc<SchedulerShared>,
  handle: Option<JoinHandle<()>>,
  tx: Sender<EngineMsg>,
  store: Arc<SampleStore>,
  shared: Arc<EngineShared>,
  sr: f32,
  lookahead: f64,
  tick: Duration,
}

impl Scheduler {
  pub fn new(
    tx: Sender<EngineMsg>,
    store: Arc<SampleStore>,
    shared: Arc<EngineShared>,
    sr: f32,
    lookahead: f64,
    tick: Duration,
  ) -> Self {
    let state = Arc::new(SchedulerShared {
      running: AtomicBool::new(false),
      tempo_bits: AtomicU32::new(TEMPO_MIN.to_bits()),
    });
    Self { state, handle: None, tx, store, shared, sr, lookahead, tick }
  }

  pub fn is_running(&self) -> bool { self.state.running.load(Ordering::Acquire) }

  pub fn tempo(&self) -> f32 { self.state.tempo() }

  /// Clamped to the supported tempo range; takes effect on the next
  /// computed interval, never retroactively.
  pub fn set_tempo(&self, bpm: f32) {
    self.state.set_tempo(bpm.clamp(TEMPO_MIN, TEMPO_MAX));
  }

  /// Starting while already running just retunes the tempo.
  pub fn start(&mut self, bpm: f32, mut pattern: Box<dyn Pattern>) {
    self.set_tempo(bpm);
    if self.is_running() { return; }
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
    self.state.running.store(true, Ordering::Release);

    let state = self.state.clone();
    let tx = self.tx.clone();
    let store = self.store.clone();
    let shared = self.shared.clone();
    let sr = self.sr;
    let lookahead = self.lookahead;
    let tick = self.tick;
    self.handle = Some(thread::spawn(move || {
      let mut clock = BeatClock::new(shared.clock_seconds(sr), lookahead);
      let mut beat: u64 = 0;
      while state.running.load(Ordering::Acquire) {
        let now = shared.clock_seconds(sr);
        let tempo = state.tempo();
        clock.advance(now, tempo, |when| {
          if let Some(step) = pattern.step(beat) {
            match store.get(&step.sample) {
              Ok(buffer) => {
                let params = step.params.clamped();
                let setup = VoiceSetup {
                  id: shared.alloc_voice_id(),
                  buffer,
                  curve: Arc::new(waveshaper::build_curve(params.distortion, waveshaper::CURVE_LEN)),
                  params,
                  start_frame: Some((when * f64::from(sr)) as u64),
                };
                let _ = tx.send(EngineMsg::Trigger(setup));
              }
              Err(err) => debug!("scheduler skipped beat {beat}: {err}"),
            }
          }
          beat += 1;
        });
        thread::sleep(tick);
      }
    }));
  }

  /// No further events are scheduled once this returns. Stopping an
  /// idle scheduler is a no-op.
  pub fn stop(&mut self) {
    self.state.running.store(false, Ordering::Release);
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

impl Drop for Scheduler {
  fn drop(&mut self) { self.stop(); }
}
