//! Command-line front end.
//!
//! Three subcommands:
//!
//! * `voicecmd train` — walk the configured corpus, write `commands.json`.
//! * `voicecmd recognize <wav>` — classify one file, print the ranking.
//! * `voicecmd listen` — stream from the default microphone and print events.
//!
//! Configuration comes from the platform `settings.toml`; a missing file
//! means defaults, a broken one is logged and replaced by defaults.

use std::path::Path;
use std::sync::mpsc;

use anyhow::{bail, Context, Result};

use voicecmd::audio::{load_wav_mono, AudioCapture};
use voicecmd::classify::Outcome;
use voicecmd::config::{AppConfig, AppPaths};
use voicecmd::features::FeatureParams;
use voicecmd::model::TrainedModel;
use voicecmd::pipeline::RecognitionPipeline;
use voicecmd::stream::{RecognizerEvent, StreamingRecognizer};
use voicecmd::train::Trainer;

const USAGE: &str = "usage: voicecmd <train | recognize <wav> | listen>";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("train") => cmd_train(&config),
        Some("recognize") => {
            let path = args.next().context(USAGE)?;
            cmd_recognize(&config, Path::new(&path))
        }
        Some("listen") => cmd_listen(&config),
        _ => bail!(USAGE),
    }
}

// ---------------------------------------------------------------------------
// train
// ---------------------------------------------------------------------------

fn cmd_train(config: &AppConfig) -> Result<()> {
    let trainer = Trainer::new(config)?;
    let (model, report) = trainer.train()?;

    let model_file = AppPaths::new().model_file;
    model.save_to(&model_file)?;

    println!("trained {} labels:", report.labels.len());
    for label in &report.labels {
        println!(
            "  {:<12} {} exemplars ({} skipped)",
            label.label, label.exemplars, label.skipped
        );
    }
    for missing in &report.missing_labels {
        println!("  {missing:<12} omitted (no usable data)");
    }
    println!("model written to {}", model_file.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// recognize
// ---------------------------------------------------------------------------

fn load_pipeline(config: &AppConfig) -> Result<RecognitionPipeline> {
    let expected = FeatureParams::from_config(&config.audio, &config.features);
    let model = TrainedModel::load_from(&AppPaths::new().model_file, &expected)?;
    Ok(RecognitionPipeline::new(config, model)?)
}

fn cmd_recognize(config: &AppConfig, wav: &Path) -> Result<()> {
    let pipeline = load_pipeline(config)?;
    let wave = load_wav_mono(wav)?;
    let result = pipeline.recognize(&wave);

    match &result.outcome {
        Outcome::Accepted { label } => {
            println!("{label}  (confidence {:.0}%)", result.confidence);
        }
        Outcome::Rejected(reason) => println!("none  ({reason})"),
    }
    for (label, score) in &result.ranking {
        println!("  {label:<12} {score:.4}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// listen
// ---------------------------------------------------------------------------

fn cmd_listen(config: &AppConfig) -> Result<()> {
    let pipeline = load_pipeline(config)?;
    let recognizer = StreamingRecognizer::new(pipeline, &config.audio, &config.stream);

    let capture = AudioCapture::new()?;
    // Bound the channel to roughly one ring buffer's worth of chunks; the
    // producer drops chunks rather than block when the worker falls behind.
    let capacity = ((config.stream.ring_secs * 1_000.0 / config.stream.chunk_ms.max(1) as f32)
        .ceil() as usize)
        .max(8);
    let (tx, rx) = mpsc::sync_channel(capacity);
    let _stream = capture.start(tx)?;
    let (handle, events) = recognizer.start(rx);

    println!("listening (ctrl-c to quit)");
    for event in events {
        match event {
            RecognizerEvent::Activity => log::debug!("activity"),
            RecognizerEvent::Silence => log::debug!("silence"),
            RecognizerEvent::Recognized { label, confidence } => {
                println!("{label}  (confidence {confidence:.0}%)");
            }
            RecognizerEvent::Rejected { reason } => {
                println!("none  ({reason})");
            }
            RecognizerEvent::Stopped { reason } => {
                println!("stopped: {reason}");
                break;
            }
        }
    }
    handle.stop();
    Ok(())
}
