//! Application configuration: engine settings, batch settings and default
//! download parameters, loadable from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::params::DownloadParameters;

/// Directory name used under the platform configuration directory.
const APP_DIR: &str = "vidbatch";

/// Settings for the yt-dlp engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit path to the `yt-dlp` executable; `PATH` lookup when unset.
    pub ytdlp_path: Option<PathBuf>,
    /// Passed to `--ffmpeg-location` when set.
    pub ffmpeg_location: Option<PathBuf>,
    pub socket_timeout_secs: u64,
    /// Upper bound for one metadata fetch.
    pub metadata_timeout_secs: u64,
    /// yt-dlp output template, relative to the output directory.
    pub output_template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_location: None,
            socket_timeout_secs: 30,
            metadata_timeout_secs: 120,
            output_template: "%(title)s [%(id)s].%(ext)s".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path of the `yt-dlp` executable.
    #[must_use]
    pub fn with_ytdlp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ytdlp_path = Some(path.into());
        self
    }

    /// Sets the ffmpeg location handed to yt-dlp.
    #[must_use]
    pub fn with_ffmpeg_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_location = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_socket_timeout(mut self, secs: u64) -> Self {
        self.socket_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_metadata_timeout(mut self, secs: u64) -> Self {
        self.metadata_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }
}

/// Settings for batch orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of events kept in the progress log.
    pub log_capacity: usize,
    /// Buffer size of the batch event channel.
    pub event_capacity: usize,
    /// Directory downloads are written to.
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            log_capacity: crate::progress::DEFAULT_LOG_CAPACITY,
            event_capacity: 256,
            output_dir: PathBuf::from("."),
        }
    }
}

impl BatchConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub batch: BatchConfig,
    /// Parameters used when the front-end does not override them.
    pub defaults: DownloadParameters,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the configuration file, if the platform has a config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Loads the configuration file from [`AppConfig::default_path`].
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> crate::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Loads configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::QualityTarget;
    use std::io::Write;

    #[test]
    fn default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.socket_timeout_secs, 30);
        assert_eq!(config.metadata_timeout_secs, 120);
        assert!(config.ytdlp_path.is_none());
        assert!(config.output_template.contains("%(ext)s"));
    }

    #[test]
    fn default_batch_config() {
        let config = BatchConfig::default();
        assert_eq!(config.log_capacity, 100);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.output_dir, PathBuf::from("."));
    }

    #[test]
    fn builder_pattern() {
        let engine = EngineConfig::new()
            .with_ytdlp_path("/opt/yt-dlp")
            .with_ffmpeg_location("/opt/ffmpeg")
            .with_socket_timeout(5)
            .with_metadata_timeout(10)
            .with_output_template("%(id)s.%(ext)s");
        assert_eq!(engine.ytdlp_path, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(engine.ffmpeg_location, Some(PathBuf::from("/opt/ffmpeg")));
        assert_eq!(engine.socket_timeout_secs, 5);
        assert_eq!(engine.metadata_timeout_secs, 10);
        assert_eq!(engine.output_template, "%(id)s.%(ext)s");

        let batch = BatchConfig::new()
            .with_log_capacity(10)
            .with_event_capacity(4)
            .with_output_dir("/tmp/out");
        assert_eq!(batch.log_capacity, 10);
        assert_eq!(batch.event_capacity, 4);
        assert_eq!(batch.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn app_config_round_trips_through_toml() {
        let mut config = AppConfig::default();
        config.defaults = DownloadParameters::new().with_quality(QualityTarget::ExactHeight(720));
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_from_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[engine]\nsocket_timeout_secs = 5\n\n[defaults]\nquality_target = \"worst\"\nembed_thumbnail = true"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.engine.socket_timeout_secs, 5);
        assert_eq!(config.engine.metadata_timeout_secs, 120);
        assert_eq!(config.batch, BatchConfig::default());
        assert_eq!(config.defaults.quality_target, QualityTarget::Worst);
        assert!(config.defaults.embed_thumbnail);
        assert_eq!(config.defaults.preferred_container, "mp4");
    }

    #[test]
    fn load_from_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine\nbroken").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppConfig::load_from(&dir.path().join("absent.toml")),
            Err(crate::Error::Io(_))
        ));
    }

    #[test]
    fn default_path_is_namespaced() {
        if let Some(path) = AppConfig::default_path() {
            assert!(path.ends_with("vidbatch/config.toml"));
        }
    }
}
