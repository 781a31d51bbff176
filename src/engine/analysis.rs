use crossbeam_channel::Receiver;
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

/// Fixed snapshot width.
pub const BIN_COUNT: usize = 128;

const FMIN: f32 = 20.0;
const FMAX: f32 = 20_000.0;
const DB_FLOOR: f32 = -100.0;
const DB_CEIL: f32 = -30.0;

/// One poll's worth of frequency-domain energy: 128 log-spaced bins
/// scaled to 0..255. Recomputed per poll; consumers must not assume it
/// is stable across polls and derive their own aggregates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisSnapshot {
  pub bins: Vec<u8>,
}

/// Consumer end of the master analyzer tap. Polling drains to the
/// newest chunk and never blocks the render side, which only try-sends.
pub struct AnalysisFeed {
  rx: Receiver<Vec<f32>>,
  planner: FftPlanner<f32>,
  last_chunk: Option<Vec<f32>>,
  sr: f32,
}

impl AnalysisFeed {
  pub fn new(rx: Receiver<Vec<f32>>, sr: f32) -> Self {
    Self { rx, planner: FftPlanner::new(), last_chunk: None, sr }
  }

  /// Latest spectrum from the master tap, or `None` when no master
  /// source is playing. Safe to call at high frequency.
  pub fn poll(&mut self, master_active: bool) -> Option<AnalysisSnapshot> {
    while let Ok(chunk) = self.rx.try_recv() {
      self.last_chunk = Some(chunk);
    }
    if !master_active { return None; }
    let chunk = self.last_chunk.as_ref()?;
    Some(compute_snapshot(chunk, self.sr, &mut self.planner))
  }
}

/// FFT magnitude mapped onto log-spaced byte bins, the way the UI meters
/// expect them.
pub fn compute_snapshot(chunk: &[f32], sr: f32, planner: &mut FftPlanner<f32>) -> AnalysisSnapshot {
  let n = chunk.len().max(1);
  let pow2 = n.next_power_of_two().max(4);
  let mut spectrum: Vec<Complex32> = chunk.iter().map(|&x| Complex32::new(x, 0.0)).collect();
  spectrum.resize(pow2, Complex32::new(0.0, 0.0));
  // Hann window to stabilize spectrum
  if n > 1 {
    for i in 0..n {
      let w = 0.5 * (1.0 - (std::f32::consts::TAU * (i as f32) / ((n - 1) as f32)).cos());
      spectrum[i].re *= w;
    }
  }
  let fft = planner.plan_fft_forward(pow2);
  fft.process(&mut spectrum);

  let mut bins = vec![0u8; BIN_COUNT];
  for (i, bin) in bins.iter_mut().enumerate() {
    let t = i as f32 / (BIN_COUNT - 1) as f32;
    let f = FMIN * (FMAX / FMIN).powf(t);
    let k = ((f / sr) * pow2 as f32).round() as usize;
    let k = k.clamp(1, pow2 / 2 - 1);
    let c = spectrum[k];
    let mag = ((c.re * c.re + c.im * c.im).sqrt() / (pow2 as f32)).max(1e-9);
    let db = 20.0 * mag.log10();
    let norm = ((db - DB_FLOOR) / (DB_CEIL - DB_FLOOR)).clamp(0.0, 1.0);
    *bin = (norm * 255.0) as u8;
  }
  AnalysisSnapshot { bins }
}
