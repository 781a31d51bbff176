use std::f32::consts::PI;
use std::sync::Arc;

/// Table resolution over the input domain [-1, 1].
pub const CURVE_LEN: usize = 44_100;

/// Saturating soft-clip transfer curve; output magnitude at any fixed
/// input grows monotonically with drive. The table is built on the
/// control timeline and shared read-only, so applying it per sample is
/// allocation-free.
pub fn build_curve(drive: f32, len: usize) -> Vec<f32> {
  let k = drive.max(0.0);
  let deg = PI / 180.0;
  let mut curve = vec![0.0f32; len];
  for (i, c) in curve.iter_mut().enumerate() {
    let x = (i as f32) * 2.0 / (len as f32) - 1.0;
    *c = (3.0 + k) * x * 20.0 * deg / (PI + k * x.abs());
  }
  curve
}

/// Waveshaping stage over a shared curve table. Stateless per sample;
/// each voice slot still owns its own instance so curve swaps on one
/// voice never touch another.
#[derive(Clone)]
pub struct Waveshaper {
  curve: Arc<Vec<f32>>,
}

impl Waveshaper {
  pub fn new(drive: f32) -> Self { Self { curve: Arc::new(build_curve(drive, CURVE_LEN)) } }

  pub fn from_curve(curve: Arc<Vec<f32>>) -> Self { Self { curve } }

  /// Identity transfer; used for idle pool slots.
  pub fn bypass() -> Self { Self { curve: Arc::new(Vec::new()) } }

  #[inline]
  pub fn shape(&self, x: f32) -> f32 {
    let n = self.curve.len();
    if n < 2 { return x; }
    let pos = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * (n - 1) as f32;
    let i = pos.floor() as usize;
    let frac = pos - i as f32;
    let a = self.curve[i];
    let b = self.curve[(i + 1).min(n - 1)];
    a + (b - a) * frac
  }
}
