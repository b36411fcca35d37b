//! Settings loading and config file resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV_VAR: &str = "MOSYNC_CONFIG";

const MIN_RATE: f64 = 0.25;
const MAX_RATE: f64 = 4.0;

/// Seek convergence settings
///
/// A seek is considered converged when the measured device position is
/// within `threshold_secs` of the requested position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekSettings {
    pub threshold_secs: f64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for SeekSettings {
    fn default() -> Self {
        Self {
            threshold_secs: 0.25,
            max_attempts: 4,
            retry_delay_ms: 100,
        }
    }
}

/// Media-overlay playback settings
///
/// Loaded from TOML; every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Continue into the next chapter when the current one finishes
    pub auto_advance: bool,
    /// Bypass units whose epubType is listed in `skippables`
    pub enable_skip: bool,
    pub skippables: Vec<String>,
    /// Allow `escape()` out of structures listed in `escapables`
    pub enable_escape: bool,
    pub escapables: Vec<String>,
    /// epubType scope at which highlighting may change (e.g. "sentence")
    pub granularity: Option<String>,
    /// Ask the host to bring the active unit into view
    pub auto_page_turn: bool,
    pub rate: f64,
    pub volume: f64,
    /// Silent dwell on documents without narration
    pub blank_page_dwell_ms: u64,
    /// Slack below `clipBegin` before a position counts as "before the clip"
    pub position_tolerance_secs: f64,
    /// Device errors tolerated per unit before playback is stopped
    pub device_retry_limit: u32,
    pub seek: SeekSettings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            auto_advance: true,
            enable_skip: false,
            skippables: Vec::new(),
            enable_escape: true,
            escapables: Vec::new(),
            granularity: None,
            auto_page_turn: true,
            rate: 1.0,
            volume: 1.0,
            blank_page_dwell_ms: 2000,
            position_tolerance_secs: 0.05,
            device_retry_limit: 2,
            seek: SeekSettings::default(),
        }
    }
}

impl PlayerSettings {
    /// Parse settings from TOML text and normalize out-of-range values
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: PlayerSettings = toml::from_str(content)?;
        Ok(settings.normalized())
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded settings from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Resolve and load settings, falling back to defaults when no file exists
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => Self::load(&path),
            None => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Clamp values into their valid ranges, logging every correction
    pub fn normalized(mut self) -> Self {
        if !self.rate.is_finite() || !(MIN_RATE..=MAX_RATE).contains(&self.rate) {
            let clamped = if self.rate.is_finite() {
                self.rate.clamp(MIN_RATE, MAX_RATE)
            } else {
                1.0
            };
            warn!("Playback rate {} out of range, using {}", self.rate, clamped);
            self.rate = clamped;
        }
        if !self.volume.is_finite() || !(0.0..=1.0).contains(&self.volume) {
            let clamped = if self.volume.is_finite() {
                self.volume.clamp(0.0, 1.0)
            } else {
                1.0
            };
            warn!("Volume {} out of range, using {}", self.volume, clamped);
            self.volume = clamped;
        }
        if !self.position_tolerance_secs.is_finite() || self.position_tolerance_secs < 0.0 {
            warn!(
                "Position tolerance {} invalid, using 0",
                self.position_tolerance_secs
            );
            self.position_tolerance_secs = 0.0;
        }
        if !self.seek.threshold_secs.is_finite() || self.seek.threshold_secs <= 0.0 {
            let fallback = SeekSettings::default().threshold_secs;
            warn!(
                "Seek threshold {} invalid, using {}",
                self.seek.threshold_secs, fallback
            );
            self.seek.threshold_secs = fallback;
        }
        if self.seek.max_attempts == 0 {
            warn!("Seek max_attempts of 0 raised to 1");
            self.seek.max_attempts = 1;
        }
        if let Some(granularity) = &self.granularity {
            if granularity.trim().is_empty() {
                self.granularity = None;
            }
        }
        self
    }
}

/// Settings file resolution, in priority order:
/// 1. Command-line path (highest priority)
/// 2. `MOSYNC_CONFIG` environment variable
/// 3. `<config dir>/mosync/config.toml`
///
/// Returns `None` when none of these names an existing file; callers then
/// use compiled defaults.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    let user_config = default_config_file()?;
    user_config.exists().then_some(user_config)
}

/// Platform config location (`~/.config/mosync/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mosync").join("config.toml"))
}

/// Write settings back out as TOML
pub fn save_settings(path: &Path, settings: &PlayerSettings) -> Result<()> {
    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
