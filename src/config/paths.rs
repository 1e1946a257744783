//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voicecmd\
//!   macOS:   ~/Library/Application Support/voicecmd/
//!   Linux:   ~/.config/voicecmd/
//!
//! Data dir (trained model):
//!   Windows: %LOCALAPPDATA%\voicecmd\
//!   macOS:   ~/Library/Application Support/voicecmd/
//!   Linux:   ~/.local/share/voicecmd/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for trained model files.
    pub data_dir: PathBuf,
    /// Full path to the trained model (`commands.json`).
    pub model_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voicecmd";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let model_file = data_dir.join("commands.json");

        Self {
            config_dir,
            settings_file,
            data_dir,
            model_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
