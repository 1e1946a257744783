//! End-to-end: synthesize a WAV corpus, train, persist, reload, recognize.

use std::f32::consts::PI;
use std::path::Path;

use tempfile::tempdir;

use voicecmd::config::{AppConfig, Strategy};
use voicecmd::audio::load_wav_mono;
use voicecmd::features::FeatureParams;
use voicecmd::model::{ModelError, TrainedModel};
use voicecmd::pipeline::RecognitionPipeline;
use voicecmd::train::Trainer;

const RATE: u32 = 8_000;

fn write_tone(path: &Path, freq: f32, amp: f32, secs: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let len = (secs * RATE as f32) as usize;
    for i in 0..len {
        let s = amp * (2.0 * PI * freq * i as f32 / RATE as f32).sin();
        writer
            .write_sample((s * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize");
}

/// Two labels, five exemplars each, with slight per-file detuning and
/// amplitude spread so the statistics have real variance.
fn build_corpus(root: &Path) {
    for (label, freq) in [("low", 300.0_f32), ("high", 1_800.0)] {
        let dir = root.join(label);
        std::fs::create_dir_all(&dir).expect("mkdir");
        for i in 0..5 {
            write_tone(
                &dir.join(format!("take{i}.wav")),
                freq + i as f32 * 4.0,
                0.3 + i as f32 * 0.05,
                0.4,
            );
        }
    }
}

fn corpus_config(root: &Path, strategy: Strategy) -> AppConfig {
    let mut config = AppConfig::default();
    config.audio.sample_rate = RATE;
    config.audio.clip_samples = 2_048;
    config.audio.lowpass_cutoff_hz = 3_000.0;
    config.classify.strategy = strategy;
    config.training.commands.clear();
    for label in ["low", "high"] {
        config
            .training
            .commands
            .insert(label.to_string(), vec![root.join(label)]);
    }
    config
}

#[test]
fn train_persist_reload_recognize() {
    let dir = tempdir().expect("temp dir");
    build_corpus(dir.path());
    let config = corpus_config(dir.path(), Strategy::NearestCentroid);

    // Train and persist.
    let trainer = Trainer::new(&config).expect("trainer");
    let (model, report) = trainer.train().expect("train");
    assert_eq!(report.labels.len(), 2);
    assert!(report.missing_labels.is_empty());

    let model_file = dir.path().join("commands.json");
    model.save_to(&model_file).expect("save");

    // Reload against the same configuration.
    let expected = FeatureParams::from_config(&config.audio, &config.features);
    let loaded = TrainedModel::load_from(&model_file, &expected).expect("load");
    assert_eq!(model, loaded);

    // Held-out clips (detuned differently from every training file) must
    // come back with the right label.
    let pipeline = RecognitionPipeline::new(&config, loaded).expect("pipeline");
    for (label, freq) in [("low", 310.0_f32), ("high", 1_790.0)] {
        let probe = dir.path().join(format!("probe_{label}.wav"));
        write_tone(&probe, freq, 0.4, 0.4);
        let wave = load_wav_mono(&probe).expect("load probe");

        let result = pipeline.recognize(&wave);
        assert_eq!(result.label(), Some(label), "ranking: {:?}", result.ranking);
        assert!((0.0..=100.0).contains(&result.confidence));
    }
}

#[test]
fn changed_layout_refuses_old_model() {
    let dir = tempdir().expect("temp dir");
    build_corpus(dir.path());
    let config = corpus_config(dir.path(), Strategy::NearestCentroid);

    let trainer = Trainer::new(&config).expect("trainer");
    let (model, _) = trainer.train().expect("train");
    let model_file = dir.path().join("commands.json");
    model.save_to(&model_file).expect("save");

    let mut reconfigured = config.clone();
    reconfigured.features.bands = 16;
    let expected = FeatureParams::from_config(&reconfigured.audio, &reconfigured.features);
    let err = TrainedModel::load_from(&model_file, &expected);
    assert!(matches!(err, Err(ModelError::ConfigMismatch { .. })));
}

#[test]
fn every_vector_strategy_recognizes_the_corpus() {
    let dir = tempdir().expect("temp dir");
    build_corpus(dir.path());

    for strategy in [
        Strategy::GatedZScore,
        Strategy::NearestCentroid,
        Strategy::WeightedMulti,
    ] {
        let config = corpus_config(dir.path(), strategy);
        let trainer = Trainer::new(&config).expect("trainer");
        let (model, _) = trainer.train().expect("train");
        let pipeline = RecognitionPipeline::new(&config, model).expect("pipeline");

        // Probe inside the training detune/amplitude spread so even the
        // strictly gated strategy accepts it.
        let probe = dir.path().join("probe.wav");
        write_tone(&probe, 1_806.0, 0.4, 0.4);
        let wave = load_wav_mono(&probe).expect("load probe");

        let result = pipeline.recognize(&wave);
        assert_eq!(
            result.label(),
            Some("high"),
            "{strategy:?} ranking: {:?}",
            result.ranking
        );
    }
}

/// Shuffled file creation order must not change the model: files are
/// processed in sorted filename order.
#[test]
fn training_is_order_independent() {
    let a = tempdir().expect("temp dir a");
    let b = tempdir().expect("temp dir b");

    // Corpus A written 0..5, corpus B written in reverse.
    for (root, order) in [(a.path(), [0, 1, 2, 3, 4]), (b.path(), [4, 3, 2, 1, 0])] {
        let dir = root.join("low");
        std::fs::create_dir_all(&dir).expect("mkdir");
        for i in order {
            write_tone(
                &dir.join(format!("take{i}.wav")),
                300.0 + i as f32 * 4.0,
                0.3 + i as f32 * 0.05,
                0.4,
            );
        }
    }

    let mut trained = Vec::new();
    for root in [a.path(), b.path()] {
        let mut config = corpus_config(root, Strategy::NearestCentroid);
        config.training.commands.clear();
        config
            .training
            .commands
            .insert("low".to_string(), vec![root.join("low")]);
        let trainer = Trainer::new(&config).expect("trainer");
        let (model, _) = trainer.train().expect("train");
        trained.push(model);
    }

    assert_eq!(trained[0], trained[1]);
}
