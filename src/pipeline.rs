//! The end-to-end recognition pipeline.
//!
//! [`RecognitionPipeline`] bundles preprocessing, feature extraction and
//! classification behind one call, so the CLI and the streaming recognizer
//! share the exact numeric path the trainer used.

use crate::audio::{Preprocessor, Waveform};
use crate::classify::{Classifier, RecognitionResult};
use crate::config::AppConfig;
use crate::features::{temporal_profile, FeatureError, FeatureExtractor, FeatureVector};
use crate::model::TrainedModel;

/// Waveform in, [`RecognitionResult`] out.
pub struct RecognitionPipeline {
    preprocessor: Preprocessor,
    extractor: FeatureExtractor,
    classifier: Classifier,
    profile_len: usize,
}

impl RecognitionPipeline {
    /// Assemble the pipeline from configuration and a loaded model.
    ///
    /// The model must have been validated against the same configuration
    /// (see [`TrainedModel::load_from`]); the pipeline trusts the caller on
    /// that.
    pub fn new(config: &AppConfig, model: TrainedModel) -> Result<Self, FeatureError> {
        Ok(Self {
            preprocessor: Preprocessor::new(&config.audio),
            extractor: FeatureExtractor::new(&config.audio, &config.features)?,
            classifier: Classifier::new(model, config.classify.clone()),
            profile_len: config.features.profile_len,
        })
    }

    /// Preprocess one clip and return its band-energy vector.
    pub fn features_for(&self, wave: &Waveform) -> FeatureVector {
        let clip = self.preprocessor.process(wave);
        self.extractor.extract(&clip.samples)
    }

    /// Run the full chain: preprocess, extract, classify.
    pub fn recognize(&self, wave: &Waveform) -> RecognitionResult {
        let clip = self.preprocessor.process(wave);
        let query = self.extractor.extract(&clip.samples);
        let profile = temporal_profile(&clip.samples, self.profile_len);
        self.classifier.decide_with_profile(&query, &profile)
    }

    /// The labels this pipeline can recognize.
    pub fn labels(&self) -> Vec<String> {
        self.classifier
            .model()
            .labels()
            .map(str::to_string)
            .collect()
    }
}
