//! The streaming recognition worker.
//!
//! [`StreamingRecognizer::start`] spawns one worker thread.  Every tick it
//! drains pending capture chunks into a ring buffer covering the last few
//! seconds, reads the most recent N-sample window, and decides between
//! silence, noise, and a classification attempt.  Events go out over a plain
//! mpsc channel; control (pause / resume / stop) comes in over another.
//!
//! The loop never dies on a per-tick problem: a failed classification resets
//! the debounce state and is logged, nothing more.  Only `stop()`, a dropped
//! handle, or a disconnected capture producer end the worker.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{downmix_mono, AudioChunk, RingBuffer, StreamResampler, Waveform};
use crate::classify::Outcome;
use crate::config::{AudioConfig, StreamConfig};
use crate::pipeline::RecognitionPipeline;

use super::{RecognizerEvent, RecognizerState};

/// Smoothing of the previous-level estimate (old weight / new weight).
const PREV_SMOOTHING: f32 = 0.9;

// ---------------------------------------------------------------------------
// StreamingRecognizer
// ---------------------------------------------------------------------------

enum Control {
    Pause,
    Resume,
    Stop,
}

/// Builder for the streaming worker; consumed by [`StreamingRecognizer::start`].
pub struct StreamingRecognizer {
    pipeline: RecognitionPipeline,
    sample_rate: u32,
    clip_samples: usize,
    config: StreamConfig,
}

impl StreamingRecognizer {
    pub fn new(pipeline: RecognitionPipeline, audio: &AudioConfig, config: &StreamConfig) -> Self {
        Self {
            pipeline,
            sample_rate: audio.sample_rate,
            clip_samples: audio.clip_samples,
            config: config.clone(),
        }
    }

    /// Spawn the worker consuming `chunks`.
    ///
    /// The chunk channel is the capture boundary: production code hands it
    /// the receiver half of [`crate::audio::AudioCapture::start`]'s channel,
    /// tests feed it synthetic chunks.  Returns the control handle and the
    /// event stream.
    pub fn start(
        self,
        chunks: Receiver<AudioChunk>,
    ) -> (RecognizerHandle, Receiver<RecognizerEvent>) {
        let (control_tx, control_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(RecognizerState::Listening));

        let ring_capacity =
            ((self.config.ring_secs * self.sample_rate as f32) as usize).max(self.clip_samples);

        let worker = Worker {
            pipeline: self.pipeline,
            sample_rate: self.sample_rate,
            clip_samples: self.clip_samples,
            config: self.config,
            chunks,
            control: control_rx,
            events: event_tx,
            state: Arc::clone(&state),
            ring: RingBuffer::new(ring_capacity),
            resampler: None,
            noise_floor: 0.0,
            prev_level: 0.0,
            was_active: false,
            silent_ticks: 0,
            silence_emitted: false,
            last_attempt: None,
            pending_label: None,
            pending_count: 0,
        };

        let join = thread::spawn(move || worker.run());

        (
            RecognizerHandle {
                control: control_tx,
                state,
                worker: Some(join),
            },
            event_rx,
        )
    }
}

// ---------------------------------------------------------------------------
// RecognizerHandle
// ---------------------------------------------------------------------------

/// Control handle for a running streaming worker.
///
/// Dropping the handle stops the worker and waits for it to finish.
pub struct RecognizerHandle {
    control: Sender<Control>,
    state: Arc<Mutex<RecognizerState>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RecognizerHandle {
    /// Suspend recognition; audio keeps draining so the ring buffer stays
    /// current, but no classification runs.  Lets the consumer do its own
    /// blocking work without hearing itself.
    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    /// Resume recognition after [`RecognizerHandle::pause`].
    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    /// Current worker state.
    pub fn state(&self) -> RecognizerState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Stop the worker and wait for it; returns within roughly one tick.
    pub fn stop(mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(join) = self.worker.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RecognizerHandle {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(join) = self.worker.take() {
            let _ = join.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    pipeline: RecognitionPipeline,
    sample_rate: u32,
    clip_samples: usize,
    config: StreamConfig,
    chunks: Receiver<AudioChunk>,
    control: Receiver<Control>,
    events: Sender<RecognizerEvent>,
    state: Arc<Mutex<RecognizerState>>,

    ring: RingBuffer<f32>,
    resampler: Option<StreamResampler>,
    noise_floor: f32,
    prev_level: f32,
    was_active: bool,
    silent_ticks: u32,
    silence_emitted: bool,
    last_attempt: Option<Instant>,
    pending_label: Option<String>,
    pending_count: u32,
}

enum LoopStep {
    Continue,
    Shutdown(String),
}

impl Worker {
    fn run(mut self) {
        let tick = Duration::from_millis(self.config.tick_ms.max(1));
        log::info!(
            "streaming recognizer started (tick {:?}, window {} samples)",
            tick,
            self.clip_samples
        );

        loop {
            thread::sleep(tick);

            if let LoopStep::Shutdown(reason) = self.handle_control() {
                self.shutdown(reason);
                return;
            }
            if let LoopStep::Shutdown(reason) = self.drain_chunks() {
                self.shutdown(reason);
                return;
            }

            if self.current_state() == RecognizerState::Listening {
                self.tick();
            }
        }
    }

    fn handle_control(&mut self) -> LoopStep {
        loop {
            match self.control.try_recv() {
                Ok(Control::Pause) => self.set_state(RecognizerState::Suspended),
                Ok(Control::Resume) => self.set_state(RecognizerState::Listening),
                Ok(Control::Stop) => return LoopStep::Shutdown("stop requested".into()),
                Err(TryRecvError::Empty) => return LoopStep::Continue,
                Err(TryRecvError::Disconnected) => {
                    return LoopStep::Shutdown("control handle dropped".into())
                }
            }
        }
    }

    fn drain_chunks(&mut self) -> LoopStep {
        loop {
            match self.chunks.try_recv() {
                Ok(chunk) => {
                    let mono = downmix_mono(&chunk.samples, chunk.channels);
                    // One resampler for the life of the stream, so the
                    // interpolation stays continuous across chunk seams.
                    let samples = self.resampler_for(chunk.sample_rate).process(&mono);
                    self.ring.push_slice(&samples);
                }
                Err(TryRecvError::Empty) => return LoopStep::Continue,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("capture producer disconnected");
                    return LoopStep::Shutdown("capture device lost".into());
                }
            }
        }
    }

    fn resampler_for(&mut self, source_rate: u32) -> &mut StreamResampler {
        let stale = self
            .resampler
            .as_ref()
            .map_or(true, |r| r.source_rate() != source_rate);
        if stale {
            self.resampler = None;
        }
        let target_rate = self.sample_rate;
        self.resampler
            .get_or_insert_with(|| StreamResampler::new(source_rate, target_rate))
    }

    /// One recognition tick: level measurement, silence tracking, activity
    /// detection, and (throttled, debounced) classification.
    fn tick(&mut self) {
        let window = self.ring.latest(self.clip_samples);
        if window.len() < self.clip_samples {
            return; // not enough audio buffered yet
        }

        let level = rms(&window);
        let dbfs = 20.0 * level.max(1e-12).log10();

        if dbfs < self.config.silence_db {
            self.silent_ticks += 1;
            let held = self.silent_ticks as f32 * self.config.tick_ms as f32 / 1_000.0;
            if held >= self.config.silence_hold_secs && !self.silence_emitted {
                self.emit(RecognizerEvent::Silence);
                self.silence_emitted = true;
                self.reset_debounce();
            }
            self.update_levels(level);
            self.was_active = false;
            return;
        }
        self.silent_ticks = 0;
        self.silence_emitted = false;

        let threshold = (self.noise_floor * self.config.activity_noise_factor)
            .max(self.prev_level * self.config.activity_rise_factor);
        let active = level > threshold;
        self.update_levels(level);

        if active && !self.was_active {
            self.emit(RecognizerEvent::Activity);
        }
        self.was_active = active;
        if !active {
            return;
        }

        // Throttle classification to once per cooldown.
        let cooldown = Duration::from_secs_f32(self.config.cooldown_secs.max(0.0));
        if let Some(last) = self.last_attempt {
            if last.elapsed() < cooldown {
                return;
            }
        }
        self.last_attempt = Some(Instant::now());

        let wave = Waveform::new(window, self.sample_rate);
        let result = self.pipeline.recognize(&wave);
        match result.outcome {
            Outcome::Accepted { label } => {
                if self.pending_label.as_deref() == Some(label.as_str()) {
                    self.pending_count += 1;
                } else {
                    self.pending_label = Some(label.clone());
                    self.pending_count = 1;
                }

                if self.pending_count >= self.config.debounce_ticks.max(1) {
                    log::info!("recognized '{label}' ({:.0}%)", result.confidence);
                    self.emit(RecognizerEvent::Recognized {
                        label,
                        confidence: result.confidence,
                    });
                    self.reset_debounce();
                }
            }
            Outcome::Rejected(reason) => {
                log::debug!("classification rejected: {reason}");
                self.emit(RecognizerEvent::Rejected { reason });
                self.reset_debounce();
            }
        }
    }

    fn update_levels(&mut self, level: f32) {
        let a = self.config.noise_ewma;
        self.noise_floor = a * self.noise_floor + (1.0 - a) * level;
        self.prev_level = PREV_SMOOTHING * self.prev_level + (1.0 - PREV_SMOOTHING) * level;
    }

    fn reset_debounce(&mut self) {
        self.pending_label = None;
        self.pending_count = 0;
    }

    fn emit(&self, event: RecognizerEvent) {
        let _ = self.events.send(event);
    }

    fn current_state(&self) -> RecognizerState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: RecognizerState) {
        match self.state.lock() {
            Ok(mut s) => *s = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn shutdown(&self, reason: String) {
        log::info!("streaming recognizer stopped: {reason}");
        self.set_state(RecognizerState::Idle);
        self.emit(RecognizerEvent::Stopped { reason });
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Strategy};
    use crate::features::FeatureExtractor;
    use crate::model::{CommandModel, TrainedModel};
    use crate::audio::Preprocessor;
    use std::collections::BTreeMap;
    use std::f32::consts::PI;

    const RATE: u32 = 8_000;
    const CLIP: usize = 1_024;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.sample_rate = RATE;
        config.audio.clip_samples = CLIP;
        config.audio.lowpass_cutoff_hz = 3_000.0;
        config.classify.strategy = Strategy::NearestCentroid;
        config.stream.ring_secs = 1.0;
        config.stream.tick_ms = 10;
        config.stream.silence_hold_secs = 0.1;
        config.stream.cooldown_secs = 0.02;
        config.stream.debounce_ticks = 1;
        config
    }

    fn tone_samples(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.3 * (2.0 * PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    fn build_recognizer(config: &AppConfig) -> StreamingRecognizer {
        let preprocessor = Preprocessor::new(&config.audio);
        let extractor = FeatureExtractor::new(&config.audio, &config.features).expect("extractor");

        let mut commands = BTreeMap::new();
        for (label, freq) in [("low", 300.0_f32), ("high", 1_800.0)] {
            let clip = preprocessor.process(&Waveform::new(tone_samples(freq, 2 * CLIP), RATE));
            commands.insert(
                label.to_string(),
                CommandModel {
                    mean: extractor.extract(&clip.samples).values,
                    std: vec![0.01; config.features.bands],
                    count: 1,
                    patterns: None,
                },
            );
        }
        let model = TrainedModel::new(extractor.params(), commands);
        let pipeline = RecognitionPipeline::new(config, model).expect("pipeline");
        StreamingRecognizer::new(pipeline, &config.audio, &config.stream)
    }

    fn chunk(samples: Vec<f32>) -> AudioChunk {
        AudioChunk {
            samples,
            sample_rate: RATE,
            channels: 1,
        }
    }

    fn drain(rx: &Receiver<RecognizerEvent>) -> Vec<RecognizerEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    /// A stream of pure silence must emit `Silence` and nothing else.
    #[test]
    fn silent_stream_emits_only_silence() {
        let config = test_config();
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel(64);
        let (handle, events) = recognizer.start(chunks);

        // ~0.6 s of zeros in 50 ms chunks.
        for _ in 0..12 {
            tx.send(chunk(vec![0.0; 400])).expect("send");
            thread::sleep(Duration::from_millis(50));
        }
        handle.stop();

        let events = drain(&events);
        assert!(
            events.iter().any(|e| *e == RecognizerEvent::Silence),
            "no Silence in {events:?}"
        );
        for e in &events {
            assert!(
                matches!(e, RecognizerEvent::Silence | RecognizerEvent::Stopped { .. }),
                "unexpected event {e:?}"
            );
        }
    }

    #[test]
    fn tone_stream_is_recognized() {
        let config = test_config();
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel(64);
        let (handle, events) = recognizer.start(chunks);

        let tone = tone_samples(300.0, 400);
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut recognized = None;
        'outer: while Instant::now() < deadline {
            tx.send(chunk(tone.clone())).expect("send");
            thread::sleep(Duration::from_millis(40));
            for e in drain(&events) {
                if let RecognizerEvent::Recognized { label, .. } = e {
                    recognized = Some(label);
                    break 'outer;
                }
            }
        }
        handle.stop();

        assert_eq!(recognized.as_deref(), Some("low"));
    }

    #[test]
    fn stop_ends_worker_promptly() {
        let config = test_config();
        let recognizer = build_recognizer(&config);

        let (_tx, chunks) = mpsc::sync_channel::<AudioChunk>(8);
        let (handle, events) = recognizer.start(chunks);
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_millis(500));

        let events = drain(&events);
        assert!(events
            .iter()
            .any(|e| matches!(e, RecognizerEvent::Stopped { .. })));
    }

    #[test]
    fn producer_disconnect_stops_worker() {
        let config = test_config();
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel::<AudioChunk>(8);
        let (handle, events) = recognizer.start(chunks);
        drop(tx); // capture device lost

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut stopped = false;
        while Instant::now() < deadline && !stopped {
            thread::sleep(Duration::from_millis(20));
            stopped = drain(&events)
                .iter()
                .any(|e| matches!(e, RecognizerEvent::Stopped { .. }));
        }
        assert!(stopped);
        assert_eq!(handle.state(), RecognizerState::Idle);
    }

    #[test]
    fn pause_suppresses_recognition() {
        let config = test_config();
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel(64);
        let (handle, events) = recognizer.start(chunks);
        handle.pause();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.state(), RecognizerState::Suspended);

        let tone = tone_samples(300.0, 400);
        for _ in 0..10 {
            tx.send(chunk(tone.clone())).expect("send");
            thread::sleep(Duration::from_millis(30));
        }

        for e in drain(&events) {
            assert!(
                !matches!(
                    e,
                    RecognizerEvent::Recognized { .. } | RecognizerEvent::Activity
                ),
                "event {e:?} while suspended"
            );
        }

        handle.resume();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.state(), RecognizerState::Listening);
        handle.stop();
    }

    /// Keep the activity detector wide open so the only thing standing
    /// between a tone and a `Recognized` event is the cooldown/debounce pair.
    fn always_active(config: &mut AppConfig) {
        config.stream.noise_ewma = 1.0; // noise floor pinned at zero
        config.stream.activity_rise_factor = 0.0;
    }

    /// With a two-tick debounce one accepted decision is not enough; the same
    /// label has to win twice in a row before `Recognized` goes out.
    #[test]
    fn debounce_requires_consecutive_matches() {
        // Cooldown far longer than the test, so at most one classification
        // can ever run: the two-tick debounce must stay pending throughout.
        let mut config = test_config();
        always_active(&mut config);
        config.stream.debounce_ticks = 2;
        config.stream.cooldown_secs = 30.0;
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel(64);
        let (handle, events) = recognizer.start(chunks);
        let tone = tone_samples(300.0, 400);
        for _ in 0..20 {
            tx.send(chunk(tone.clone())).expect("send");
            thread::sleep(Duration::from_millis(30));
        }
        handle.stop();

        let events = drain(&events);
        assert!(
            events.iter().any(|e| *e == RecognizerEvent::Activity),
            "tone was never heard: {events:?}"
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, RecognizerEvent::Recognized { .. })),
            "single decision passed a two-tick debounce: {events:?}"
        );

        // Short cooldown: back-to-back matching decisions satisfy it.
        let mut config = test_config();
        always_active(&mut config);
        config.stream.debounce_ticks = 2;
        config.stream.cooldown_secs = 0.02;
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel(64);
        let (handle, events) = recognizer.start(chunks);
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut recognized = None;
        'outer: while Instant::now() < deadline {
            tx.send(chunk(tone.clone())).expect("send");
            thread::sleep(Duration::from_millis(30));
            for e in drain(&events) {
                if let RecognizerEvent::Recognized { label, .. } = e {
                    recognized = Some(label);
                    break 'outer;
                }
            }
        }
        handle.stop();
        assert_eq!(recognized.as_deref(), Some("low"));
    }

    /// Classification is throttled: `Recognized` events for a sustained tone
    /// arrive no closer together than the cooldown.
    #[test]
    fn cooldown_spaces_recognitions() {
        let mut config = test_config();
        always_active(&mut config);
        config.stream.cooldown_secs = 0.4;
        let recognizer = build_recognizer(&config);

        let (tx, chunks) = mpsc::sync_channel(64);
        let (handle, events) = recognizer.start(chunks);

        // Pre-fill the ring with tone; the worker keeps re-reading the same
        // full window, so recognitions continue at the cooldown pace.
        let tone = tone_samples(300.0, 400);
        for _ in 0..30 {
            tx.send(chunk(tone.clone())).expect("send");
        }

        let mut stamps = Vec::new();
        while stamps.len() < 3 {
            match events.recv_timeout(Duration::from_secs(2)) {
                Ok(RecognizerEvent::Recognized { .. }) => stamps.push(Instant::now()),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        handle.stop();
        drop(tx);

        assert!(
            stamps.len() >= 2,
            "expected repeated recognitions, got {}",
            stamps.len()
        );
        for pair in stamps.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            // Allow a little receive-side jitter below the 400 ms floor.
            assert!(gap >= Duration::from_millis(300), "gap {gap:?}");
        }
    }
}
