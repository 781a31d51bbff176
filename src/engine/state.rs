use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// State shared between the control timeline and the render callback.
/// Owned by the engine context and handed around as `Arc` clones; nothing
/// is process-global.
pub struct EngineShared {
  frames: AtomicU64,
  master_active: AtomicBool,
  next_voice_id: AtomicU64,
}

impl EngineShared {
  pub fn new() -> Self {
    Self {
      frames: AtomicU64::new(0),
      master_active: AtomicBool::new(false),
      next_voice_id: AtomicU64::new(1),
    }
  }

  /// Published by the render side once per rendered frame.
  #[inline]
  pub fn advance_frames(&self, n: u64) { self.frames.fetch_add(n, Ordering::Relaxed); }

  #[inline]
  pub fn frames(&self) -> u64 { self.frames.load(Ordering::Relaxed) }

  /// The audio clock in seconds. Scheduling is done against this clock,
  /// never against the control-loop clock.
  #[inline]
  pub fn clock_seconds(&self, sr: f32) -> f64 { self.frames() as f64 / f64::from(sr) }

  pub fn set_master_active(&self, on: bool) { self.master_active.store(on, Ordering::Relaxed); }
  pub fn master_active(&self) -> bool { self.master_active.load(Ordering::Relaxed) }

  pub fn alloc_voice_id(&self) -> u64 { self.next_voice_id.fetch_add(1, Ordering::Relaxed) }
}

impl Default for EngineShared {
  fn default() -> Self { Self::new() }
}
