use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use gabberbox::engine::modules::store::{synthesize_fallback, CatalogEntry, SampleStore};
use gabberbox::{EngineError, FallbackKind};

const SR: f32 = 44_100.0;

#[test]
fn synthesis_is_deterministic() {
  for kind in [FallbackKind::Kick, FallbackKind::Bass, FallbackKind::Synth] {
    let a = synthesize_fallback(kind, SR);
    let b = synthesize_fallback(kind, SR);
    assert_eq!(a.data.len(), b.data.len());
    let identical = a
      .data
      .iter()
      .zip(b.data.iter())
      .all(|(x, y)| x.to_bits() == y.to_bits());
    assert!(identical, "{kind:?} fallback was not byte-identical");
  }
}

#[test]
fn durations_match_their_kinds() {
  assert_eq!(synthesize_fallback(FallbackKind::Kick, SR).frames(), (SR * 0.2) as usize);
  assert_eq!(synthesize_fallback(FallbackKind::Bass, SR).frames(), SR as usize);
  assert_eq!(synthesize_fallback(FallbackKind::Synth, SR).frames(), SR as usize);
}

#[test]
fn kinds_derive_from_names() {
  assert_eq!(FallbackKind::from_name("kick2"), FallbackKind::Kick);
  assert_eq!(FallbackKind::from_name("bass1"), FallbackKind::Bass);
  assert_eq!(FallbackKind::from_name("synth1"), FallbackKind::Synth);
  assert_eq!(FallbackKind::from_name("fx3"), FallbackKind::Synth);
}

#[test]
fn synthesized_audio_is_in_range_and_decays() {
  for kind in [FallbackKind::Kick, FallbackKind::Bass, FallbackKind::Synth] {
    let buf = synthesize_fallback(kind, SR);
    assert!(buf.data.iter().all(|s| s.abs() <= 1.0), "{kind:?} clipped");
    let head = rms(&buf.data[..1000]);
    let tail = rms(&buf.data[buf.data.len() - 1000..]);
    assert!(head > tail * 1.1, "{kind:?} did not decay: head {head} tail {tail}");
  }
}

fn rms(samples: &[f32]) -> f32 {
  (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn scratch_dir(tag: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("gabberbox_{tag}_{}", std::process::id()));
  let _ = fs::remove_dir_all(&dir);
  fs::create_dir_all(&dir).expect("scratch dir should be creatable");
  dir
}

fn write_test_wav(path: &PathBuf, frames: usize) {
  let spec = hound::WavSpec {
    channels: 1,
    sample_rate: SR as u32,
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut writer = hound::WavWriter::create(path, spec).expect("test wav should be creatable");
  for i in 0..frames {
    let phase = i as f32 / SR * 220.0 * std::f32::consts::TAU;
    writer
      .write_sample((phase.sin() * 0.5 * f32::from(i16::MAX)) as i16)
      .expect("test wav sample write should succeed");
  }
  writer.finalize().expect("test wav finalize should succeed");
}

#[test]
fn one_bad_entry_never_aborts_the_rest() {
  let dir = scratch_dir("store");
  let good = dir.join("kick_good.wav");
  write_test_wav(&good, 500);
  let broken = dir.join("bass_broken.wav");
  fs::write(&broken, b"definitely not a wav file").expect("broken file write");

  let entries = vec![
    CatalogEntry::new("kick_good", &good),
    CatalogEntry::new("bass_broken", &broken),
    CatalogEntry::new("fx_missing", dir.join("nope.wav")),
  ];
  let store = SampleStore::load(&entries, SR, Duration::from_secs(10));
  assert_eq!(store.len(), 3);

  // decoded entry keeps its real length
  let good_buf = store.get("kick_good").expect("good sample present");
  assert_eq!(good_buf.frames(), 500);

  // failures fell back to synthesis of the right kind
  assert_eq!(store.get("bass_broken").unwrap().frames(), SR as usize);
  assert_eq!(store.get("fx_missing").unwrap().frames(), SR as usize);

  let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unknown_names_are_reported_not_synthesized() {
  let store = SampleStore::load(&[], SR, Duration::from_millis(100));
  assert!(store.is_empty());
  match store.get("kick1") {
    Err(EngineError::SampleNotFound(name)) => assert_eq!(name, "kick1"),
    Err(other) => panic!("unexpected error: {other}"),
    Ok(_) => panic!("expected SampleNotFound"),
  }
}
