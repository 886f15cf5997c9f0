//! End-to-end analysis pipeline tests.
//!
//! Runs the full orchestrator - decode boundary, worker thread, FFT,
//! analyzers, feature drain - over synthesized audio and checks the
//! extracted features.

use rhythmtool::prelude::*;
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 44100;

/// Generate a click track: short decaying impulses at a fixed period.
fn click_track(duration_secs: f32, period_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    let mut samples = vec![0.0f32; num_samples];

    let mut time = 0.0;
    while time < duration_secs {
        let pos = (time * SAMPLE_RATE as f32).round() as usize;

        for i in 0..100.min(num_samples.saturating_sub(pos)) {
            samples[pos + i] += (1.0 - i as f32 / 100.0) * 0.9;
        }

        time += period_secs;
    }

    samples
}

/// Generate a sine tone followed by silence.
fn tone_then_silence(frequency: f32, tone_secs: f32, total_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * total_secs) as usize;
    let tone_samples = (SAMPLE_RATE as f32 * tone_secs) as usize;

    (0..num_samples)
        .map(|i| {
            if i < tone_samples {
                let t = i as f32 / SAMPLE_RATE as f32;
                (2.0 * PI * frequency * t).sin() * 0.8
            } else {
                0.0
            }
        })
        .collect()
}

/// Drive the analyzer's foreground loop until the run finishes.
fn drive_to_completion(analyzer: &mut RhythmAnalyzer) {
    for _ in 0..20_000 {
        analyzer.update();

        if matches!(
            analyzer.state(),
            AnalyzerState::Done | AnalyzerState::Aborted
        ) {
            analyzer.update();
            return;
        }

        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    panic!("analysis did not finish in time");
}

/// The concrete silence example: one second of silence produces no
/// onsets, no beats, and one near-zero volume value per interval.
#[test]
fn test_silence_produces_no_features() {
    let mut analyzer = RhythmAnalyzer::default();
    analyzer.add_analysis(OnsetDetector::new());
    analyzer.add_analysis(BeatTracker::new());
    analyzer.add_analysis(VolumeSampler::new());

    let clip = PcmClip::from_mono(vec![0.0; SAMPLE_RATE as usize], SAMPLE_RATE);
    let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();

    drive_to_completion(&mut analyzer);

    assert_eq!(analyzer.state(), AnalyzerState::Done);
    assert_eq!(analyzer.progress(), 1.0);

    assert!(data.track::<Onset>().unwrap().read().is_empty());
    assert!(data.track::<Beat>().unwrap().read().is_empty());

    // 43 hops at 44.1 kHz with hop 1024; one volume value per 4 hops.
    let volume = data.track_named::<Value>("Volume").unwrap();
    let volume = volume.read();
    assert_eq!(volume.len(), 10);

    for value in volume.features() {
        assert!(value.value.abs() < 1e-4, "volume {} on silence", value.value);
    }
}

#[test]
fn test_click_track_onsets_land_on_clicks() {
    let mut analyzer = RhythmAnalyzer::default();
    analyzer.add_analysis(OnsetDetector::new());

    let clip = PcmClip::from_mono(click_track(30.0, 0.5), SAMPLE_RATE);
    let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();

    drive_to_completion(&mut analyzer);

    let onsets = data.track::<Onset>().unwrap();
    let onsets = onsets.read();

    assert!(
        onsets.len() >= 20,
        "expected most of the 60 clicks, found {} onsets",
        onsets.len()
    );

    for onset in onsets.features() {
        // Distance to the nearest click time.
        let phase = (onset.timestamp + 0.25).rem_euclid(0.5) - 0.25;

        assert!(
            phase.abs() < 0.08,
            "onset at {} is {} s away from a click",
            onset.timestamp,
            phase
        );
        assert!(onset.strength > 0.0);
    }
}

#[test]
fn test_click_track_bpm_converges() {
    let mut analyzer = RhythmAnalyzer::default();
    analyzer.add_analysis(BeatTracker::new());

    // Clicks every 0.5 s: 120 BPM, inside the supported 80-160 range.
    let clip = PcmClip::from_mono(click_track(40.0, 0.5), SAMPLE_RATE);
    let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();

    drive_to_completion(&mut analyzer);

    let beats = data.track::<Beat>().unwrap();
    let beats = beats.read();

    assert!(!beats.is_empty(), "expected beats on a click track");

    let settled: Vec<&Beat> = beats
        .features()
        .iter()
        .filter(|beat| beat.timestamp > 20.0)
        .collect();

    assert!(!settled.is_empty(), "expected beats after the warm-up");

    for beat in settled {
        let error = (beat.bpm - 120.0).abs() / 120.0;
        assert!(
            error < 0.02,
            "beat at {} has bpm {}, off by {:.1}%",
            beat.timestamp,
            beat.bpm,
            error * 100.0
        );
    }
}

#[test]
fn test_sustained_tone_yields_its_pitch_class() {
    let mut analyzer = RhythmAnalyzer::default();
    analyzer.add_analysis(Chromagram::new());

    let clip = PcmClip::from_mono(tone_then_silence(440.0, 6.0, 9.0), SAMPLE_RATE);
    let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();

    drive_to_completion(&mut analyzer);

    let chroma = data.track::<Chroma>().unwrap();
    let chroma = chroma.read();

    assert!(!chroma.is_empty(), "expected chroma features for the tone");

    let longest = chroma
        .features()
        .iter()
        .max_by(|a, b| a.length.total_cmp(&b.length))
        .copied()
        .unwrap();

    assert_eq!(longest.note, Note::A);
    assert!(
        longest.length > 2.0,
        "expected a sustained note, got {} s",
        longest.length
    );
}

/// A full run with every analyzer registered: tracks are reachable by
/// name, queries work while results are final, progress ends at 1.
#[test]
fn test_full_pipeline_with_all_analyzers() {
    let mut analyzer = RhythmAnalyzer::default();
    analyzer.add_analysis(OnsetDetector::new());
    analyzer.add_analysis(BeatTracker::new());
    analyzer.add_analysis(Chromagram::new());
    analyzer.add_analysis(Segmenter::new());
    analyzer.add_analysis(VolumeSampler::new());

    // Click track with a tone layered on top, music-like enough for
    // every analyzer to have something to chew on. The tone stops
    // before the clip ends so its chroma note closes and gets emitted.
    let mut samples = click_track(20.0, 0.5);
    let tone = tone_then_silence(220.0, 16.0, 20.0);
    for (s, t) in samples.iter_mut().zip(&tone) {
        *s = (*s + t * 0.4).clamp(-1.0, 1.0);
    }

    let clip = PcmClip::from_mono(samples, SAMPLE_RATE);
    let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();

    drive_to_completion(&mut analyzer);

    assert_eq!(analyzer.state(), AnalyzerState::Done);
    assert_eq!(analyzer.progress(), 1.0);
    assert!(analyzer.is_initialized());

    assert_eq!(data.tracks().len(), 5);

    for name in ["Onsets", "Beats", "Chroma", "Segments", "Volume"] {
        assert!(
            data.tracks().iter().any(|track| track.name() == name),
            "missing track {}",
            name
        );
    }

    // The volume sampler emits one value per complete 4-hop block.
    let total_hops = (20 * SAMPLE_RATE as usize) / 1024;
    let volume = data.track_named::<Value>("Volume").unwrap();
    assert_eq!(volume.read().len(), total_hops / 4);

    // The mix is audible, so volume values are not all zero.
    let mut values = Vec::new();
    data.features_named::<Value>(&mut values, 0.0, 20.0, "Volume");
    assert!(values.iter().any(|value| value.value > 0.01));

    // Intersecting queries see the tone's chroma notes reach into the
    // window even when they started earlier.
    let mut notes = Vec::new();
    data.intersecting_features::<Chroma>(&mut notes, 2.0, 16.0);
    assert!(
        notes.iter().any(|chroma| chroma.note == Note::A),
        "expected the 220 Hz tone's pitch class to intersect the window"
    );
}

#[test]
fn test_abort_midway_then_rerun() {
    let mut analyzer = RhythmAnalyzer::default();
    analyzer.add_analysis(VolumeSampler::new());

    let clip = PcmClip::from_mono(vec![0.0; SAMPLE_RATE as usize * 120], SAMPLE_RATE);
    analyzer.analyze(Box::new(clip), 5.0).unwrap();

    // Service a couple of block requests, then cancel.
    analyzer.update();
    std::thread::sleep(std::time::Duration::from_millis(5));
    analyzer.update();
    analyzer.abort();

    assert_eq!(analyzer.state(), AnalyzerState::Aborted);

    // The same analyzer immediately accepts a fresh run.
    let clip = PcmClip::from_mono(vec![0.0; SAMPLE_RATE as usize], SAMPLE_RATE);
    let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();

    drive_to_completion(&mut analyzer);

    assert_eq!(analyzer.state(), AnalyzerState::Done);
    assert_eq!(data.track_named::<Value>("Volume").unwrap().read().len(), 10);
}
