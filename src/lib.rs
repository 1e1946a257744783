//! Fixed-vocabulary voice command recognition.
//!
//! Short (~1 s) utterances are classified into a small set of commands using
//! hand-engineered band-energy features and distance matching — no learned
//! weights anywhere.
//!
//! # Data flow
//!
//! ```text
//! raw audio ──► audio::Preprocessor ──► features::FeatureExtractor ──┬─► train::Trainer (batch)
//!                                                                    └─► classify::Classifier (inference)
//! ```
//!
//! [`stream::StreamingRecognizer`] wraps capture plus that pipeline in a
//! tick loop with activity detection, debouncing and cooldown, emitting
//! [`stream::RecognizerEvent`]s to the consumer.  What a recognized label
//! triggers downstream is entirely the consumer's business.
//!
//! # Typical use
//!
//! Train once over a directory-per-label WAV corpus, persist the model as
//! JSON, then recognize single clips ([`pipeline::RecognitionPipeline`]) or
//! listen continuously ([`stream::StreamingRecognizer`]).  Training and
//! inference must share the same [`config::AppConfig`]; the model file
//! embeds the feature layout and loading verifies it.

pub mod audio;
pub mod classify;
pub mod config;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod stream;
pub mod train;
