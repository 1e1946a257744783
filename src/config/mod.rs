//! Configuration module for the voice-command recognizer.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AlignPolicy, AppConfig, AudioConfig, ClassifyConfig, DistanceMetric, FeatureConfig,
    FeatureVariant, Normalization, Strategy, StreamConfig, TrainingConfig, WindowKind,
};
