use std::sync::Arc;

use crossbeam_channel::unbounded;
use gabberbox::engine::analysis::{AnalysisFeed, BIN_COUNT};
use gabberbox::engine::dsp::waveshaper::{build_curve, CURVE_LEN};
use gabberbox::engine::graph::{EngineGraph, TAP_CHUNK};
use gabberbox::engine::messages::EngineMsg;
use gabberbox::engine::modules::track::TrackBuffer;
use gabberbox::engine::state::EngineShared;
use gabberbox::{MasterParams, MasterUpdate};

const SR: f32 = 44_100.0;

fn graph() -> (EngineGraph, Arc<EngineShared>) {
  let shared = Arc::new(EngineShared::new());
  (EngineGraph::new(SR, 8, shared.clone()), shared)
}

fn sine_track(freq: f32, amp: f32, seconds: f32) -> Arc<TrackBuffer> {
  let frames = (SR * seconds) as usize;
  let data = (0..frames)
    .map(|i| (i as f32 / SR * freq * std::f32::consts::TAU).sin() * amp)
    .collect();
  Arc::new(TrackBuffer { data, channels: 1, sample_rate: SR })
}

fn silent_track(frames: usize) -> Arc<TrackBuffer> {
  Arc::new(TrackBuffer { data: vec![0.0; frames], channels: 1, sample_rate: SR })
}

fn master_msg(params: MasterParams) -> EngineMsg {
  EngineMsg::SetMaster { params, curve: Arc::new(build_curve(params.distortion, CURVE_LEN)) }
}

fn updated(update: MasterUpdate) -> MasterParams {
  let mut params = MasterParams::default();
  params.apply(&update);
  params
}

fn rms(samples: &[f32]) -> f32 {
  (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

#[test]
fn second_load_replaces_the_first_source() {
  let (mut graph, shared) = graph();
  graph.apply_msg(EngineMsg::LoadTrack { track: sine_track(440.0, 0.9, 1.0) });
  assert!(graph.track_playing());
  assert!(shared.master_active());

  let mut heard = 0.0f32;
  for _ in 0..500 {
    let (l, _) = graph.render_frame();
    heard = heard.max(l.abs());
  }
  assert!(heard > 0.01, "first track was inaudible");

  // swapping in a silent track must silence the output: exactly one
  // master source, the newer one
  graph.apply_msg(EngineMsg::LoadTrack { track: silent_track(4000) });
  assert!(graph.track_playing());
  for _ in 0..1000 {
    graph.render_frame();
  }
  let mut residue = 0.0f32;
  for _ in 0..2000 {
    let (l, _) = graph.render_frame();
    residue = residue.max(l.abs());
  }
  assert!(residue < 1e-4, "old track still audible: {residue}");
}

#[test]
fn stop_silences_and_clears_the_master_source() {
  let (mut graph, shared) = graph();
  graph.apply_msg(EngineMsg::LoadTrack { track: sine_track(440.0, 0.9, 1.0) });
  for _ in 0..200 {
    graph.render_frame();
  }
  graph.apply_msg(EngineMsg::StopTrack);
  assert!(!graph.track_playing());
  assert!(!shared.master_active());
  for _ in 0..100 {
    let (l, r) = graph.render_frame();
    assert_eq!((l, r), (0.0, 0.0));
  }
}

#[test]
fn bass_boost_switches_to_low_shelf_without_dropout() {
  let (mut graph, _shared) = graph();
  graph.apply_msg(EngineMsg::LoadTrack { track: sine_track(60.0, 0.5, 4.0) });

  // settle, then measure the neutral level
  for _ in 0..8192 {
    graph.render_frame();
  }
  let neutral: Vec<f32> = (0..8192).map(|_| graph.render_frame().0).collect();

  // flip to low-shelf mode mid-flight
  graph.apply_msg(master_msg(updated(MasterUpdate { bass: Some(150.0), ..Default::default() })));

  // the transition itself must not click
  let mut prev = *neutral.last().unwrap();
  let mut transition_jump = 0.0f32;
  let mut boosted_all = Vec::with_capacity(16_384);
  for _ in 0..16_384 {
    let (l, _) = graph.render_frame();
    transition_jump = transition_jump.max((l - prev).abs());
    prev = l;
    boosted_all.push(l);
  }
  assert!(transition_jump < 0.05, "discontinuity of {transition_jump} at mode switch");

  // and a 60 Hz tone sits well under the 250 Hz shelf corner, so it
  // picks up close to the full +6 dB
  let boosted = rms(&boosted_all[8192..]);
  let baseline = rms(&neutral);
  let ratio = boosted / baseline;
  assert!(ratio > 1.5 && ratio < 2.5, "shelf gain ratio {ratio} out of range");
}

#[test]
fn volume_ramps_smoothly_to_silence() {
  let (mut graph, _shared) = graph();
  graph.apply_msg(EngineMsg::LoadTrack { track: sine_track(440.0, 0.8, 2.0) });
  for _ in 0..4096 {
    graph.render_frame();
  }
  graph.apply_msg(master_msg(updated(MasterUpdate { volume: Some(0.0), ..Default::default() })));

  let mut prev = 0.0f32;
  let mut max_jump = 0.0f32;
  let mut first = true;
  for _ in 0..8192 {
    let (l, _) = graph.render_frame();
    if !first { max_jump = max_jump.max((l - prev).abs()); }
    prev = l;
    first = false;
  }
  assert!(max_jump < 0.08, "gain ramp clicked: {max_jump}");
  let mut tail = 0.0f32;
  for _ in 0..1024 {
    let (l, _) = graph.render_frame();
    tail = tail.max(l.abs());
  }
  assert!(tail < 1e-3, "volume zero still audible: {tail}");
}

#[test]
fn analyzer_tap_feeds_the_analysis_poll() {
  let (mut graph, shared) = graph();
  let (tap_tx, tap_rx) = unbounded();
  graph.set_tap_sender(tap_tx);
  let mut feed = AnalysisFeed::new(tap_rx, SR);

  // no master source yet: the sentinel is None
  assert!(feed.poll(shared.master_active()).is_none());

  graph.apply_msg(EngineMsg::LoadTrack { track: sine_track(60.0, 0.8, 2.0) });
  for _ in 0..(TAP_CHUNK * 2) {
    graph.render_frame();
  }

  let snapshot = feed.poll(shared.master_active()).expect("snapshot while playing");
  assert_eq!(snapshot.bins.len(), BIN_COUNT);
  let low = *snapshot.bins[..40].iter().max().unwrap();
  let high = *snapshot.bins[96..].iter().max().unwrap();
  assert!(low > high, "60 Hz energy not concentrated in low bins ({low} vs {high})");

  // stopping flips the feed back to the no-data sentinel
  graph.apply_msg(EngineMsg::StopTrack);
  assert!(feed.poll(shared.master_active()).is_none());
}

#[test]
fn rapid_parameter_updates_never_tear() {
  let (mut graph, _shared) = graph();
  graph.apply_msg(EngineMsg::LoadTrack { track: sine_track(220.0, 0.6, 4.0) });
  // hammer the chain with whole-state updates between single frames
  for step in 0..2000u32 {
    let bass = 100.0 + (step % 100) as f32;
    let volume = 40.0 + (step % 60) as f32;
    graph.apply_msg(master_msg(updated(MasterUpdate {
      bass: Some(bass),
      volume: Some(volume),
      ..Default::default()
    })));
    let (l, r) = graph.render_frame();
    assert!(l.is_finite() && r.is_finite());
    assert!(l.abs() < 4.0 && r.abs() < 4.0);
  }
}
