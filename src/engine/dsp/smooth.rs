pub struct Smooth { pub y: f32, a: f32 }
impl Smooth {
  pub fn new(sr: f32, ms: f32) -> Self {
    let a = (-1.0 / (ms * 0.001 * sr)).exp();
    Self { y: 0.0, a }
  }
  #[inline]
  pub fn set_tau(&mut self, sr: f32, ms: f32) { self.a = (-1.0 / (ms * 0.001 * sr)).exp(); }
  #[inline]
  pub fn jump_to(&mut self, v: f32) { self.y = v; }
  #[inline]
  pub fn next(&mut self, target: f32) -> f32 { self.y = self.a * self.y + (1.0 - self.a) * target; self.y }
}
