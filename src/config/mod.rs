//! Application Configuration
//!
//! Scanner settings stored in TOML format. Values are read once at startup
//! and are read-only to the scanning core.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::analysis::code::{PREFIX_LEN, SUFFIX_LEN};
use crate::analysis::{CandidateStrategy, GrammarValidator, Vocabulary};
use crate::vision::Region;

/// Prefixes accepted out of the box
pub const DEFAULT_PREFIXES: [&str; 3] = ["AKE", "PMC", "RKN"];
/// Suffixes accepted out of the box
pub const DEFAULT_SUFFIXES: [&str; 5] = ["CI", "BR", "CX", "JL", "NH"];

/// Accepted range for the recognition interval in milliseconds
pub const INTERVAL_RANGE_MS: (u64, u64) = (100, 2000);
/// Accepted range for the voting window capacity
pub const WINDOW_RANGE: (usize, usize) = (1, 32);
/// Accepted range for the preprocessing upscale factor
pub const SCALE_RANGE: (u32, u32) = (1, 4);

/// Configuration values that cannot be used as given
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("focus threshold must be a finite number >= 0, got {0}")]
    FocusThreshold(f64),
    #[error("{field} must be a finite number > 0, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("vocabulary {kind} {entry:?} must be exactly {len} ASCII letters")]
    VocabularyEntry {
        kind: &'static str,
        entry: String,
        len: usize,
    },
    #[error("vocabulary has no {0}")]
    EmptyVocabulary(&'static str),
    #[error("region must have a non-zero width and height")]
    EmptyRegion,
}

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Admission and voting settings
    pub scan: ScanSettings,
    /// Settings forwarded to the recognition engine
    pub engine: EngineSettings,
    /// Image transform applied to the region before recognition
    pub preprocess: OcrPreprocessing,
    /// Valid prefixes and suffixes
    pub vocabulary: VocabularySettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// User-selected region of interest in frame pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

/// Frame admission and voting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Minimum spacing between recognitions in milliseconds
    pub interval_ms: u64,
    /// Minimum sharpness score for a frame to be recognized
    pub focus_threshold: f64,
    /// Number of recent observations that vote
    pub window_capacity: usize,
    /// How a frame with several candidates is resolved
    pub candidate_strategy: CandidateStrategy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: 400,
            focus_threshold: 80.0,
            window_capacity: 5,
            candidate_strategy: CandidateStrategy::FirstMatch,
        }
    }
}

/// Recognition engine parameters, passed through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Page segmentation mode ("7" = single text line)
    pub page_seg_mode: String,
    /// Engine mode ("1" = neural net only)
    pub engine_mode: String,
    /// Characters the engine may emit
    pub char_whitelist: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_seg_mode: "7".to_string(),
            engine_mode: "1".to_string(),
            char_whitelist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
        }
    }
}

/// Image preprocessing settings for OCR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrPreprocessing {
    /// Apply any preprocessing at all
    pub enabled: bool,
    /// Contrast factor around mid-gray (1.0 = unchanged)
    pub contrast: f32,
    /// Brightness multiplier (1.0 = unchanged)
    pub brightness: f32,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Sharpen strength (0.0 = off)
    pub sharpen: f32,
    /// Invert colors (light text on dark plates)
    pub invert: bool,
    /// Integer upscale factor
    pub scale: u32,
}

impl Default for OcrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: true,
            contrast: 2.0,
            brightness: 1.2,
            grayscale: false,
            sharpen: 0.0,
            invert: false,
            scale: 1,
        }
    }
}

/// Closed code vocabularies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularySettings {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for VocabularySettings {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect(),
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl VocabularySettings {
    /// Build the validator for these vocabularies
    pub fn validator(&self) -> GrammarValidator {
        GrammarValidator::new(Vocabulary::new(&self.prefixes, &self.suffixes))
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject unusable values and clamp range-limited ones
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let scan = &mut self.scan;
        if !scan.focus_threshold.is_finite() || scan.focus_threshold < 0.0 {
            return Err(ConfigError::FocusThreshold(scan.focus_threshold));
        }
        scan.interval_ms = clamp_logged("scan.interval_ms", scan.interval_ms, INTERVAL_RANGE_MS);
        scan.window_capacity = clamp_logged("scan.window_capacity", scan.window_capacity, WINDOW_RANGE);

        let pp = &mut self.preprocess;
        for (field, value) in [("preprocess.contrast", pp.contrast), ("preprocess.brightness", pp.brightness)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if !pp.sharpen.is_finite() || pp.sharpen < 0.0 {
            return Err(ConfigError::NonPositive {
                field: "preprocess.sharpen",
                value: pp.sharpen,
            });
        }
        pp.scale = clamp_logged("preprocess.scale", pp.scale, SCALE_RANGE);

        let vocab = &mut self.vocabulary;
        vocab.prefixes = normalize_entries("prefix", &vocab.prefixes, PREFIX_LEN)?;
        vocab.suffixes = normalize_entries("suffix", &vocab.suffixes, SUFFIX_LEN)?;

        if let Some(region) = &self.region {
            if region.width == 0 || region.height == 0 {
                return Err(ConfigError::EmptyRegion);
            }
        }

        Ok(self)
    }
}

fn clamp_logged<T: PartialOrd + Copy + std::fmt::Display>(field: &str, value: T, (lo, hi): (T, T)) -> T {
    let clamped = if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    };
    if clamped != value {
        warn!("{} = {} out of range {}..={}, using {}", field, value, lo, hi, clamped);
    }
    clamped
}

fn normalize_entries(kind: &'static str, entries: &[String], len: usize) -> Result<Vec<String>, ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::EmptyVocabulary(kind));
    }
    entries
        .iter()
        .map(|entry| {
            let upper = entry.trim().to_ascii_uppercase();
            if upper.len() == len && upper.bytes().all(|b| b.is_ascii_uppercase()) {
                Ok(upper)
            } else {
                Err(ConfigError::VocabularyEntry {
                    kind,
                    entry: entry.clone(),
                    len,
                })
            }
        })
        .collect()
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "uldscanner", "ULDScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Default location of the config file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

/// Load and validate configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config.validated()?)
}

/// Save configuration to file, creating parent directories
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.scan.interval_ms, 400);
        assert!((config.scan.focus_threshold - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.scan.window_capacity, 5);
        assert_eq!(config.scan.candidate_strategy, CandidateStrategy::FirstMatch);

        assert_eq!(config.engine.page_seg_mode, "7");
        assert_eq!(config.engine.engine_mode, "1");

        assert!(config.preprocess.enabled);
        assert!((config.preprocess.contrast - 2.0).abs() < 0.01);
        assert!((config.preprocess.brightness - 1.2).abs() < 0.01);

        assert_eq!(config.vocabulary.prefixes, vec!["AKE", "PMC", "RKN"]);
        assert!(config.region.is_none());
        assert!(AppConfig::default().validated().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.region = Some(Region::new(10, 20, 300, 80));
        config.scan.candidate_strategy = CandidateStrategy::PreferDirect;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[scan]\ninterval_ms = 250\n").unwrap();
        assert_eq!(parsed.scan.interval_ms, 250);
        assert_eq!(parsed.scan.window_capacity, 5);
        assert_eq!(parsed.engine, EngineSettings::default());
    }

    #[test]
    fn test_interval_is_clamped() {
        let mut config = AppConfig::default();
        config.scan.interval_ms = 5;
        assert_eq!(config.clone().validated().unwrap().scan.interval_ms, 100);
        config.scan.interval_ms = 60_000;
        assert_eq!(config.validated().unwrap().scan.interval_ms, 2000);
    }

    #[test]
    fn test_window_and_scale_are_clamped() {
        let mut config = AppConfig::default();
        config.scan.window_capacity = 0;
        config.preprocess.scale = 9;
        let config = config.validated().unwrap();
        assert_eq!(config.scan.window_capacity, 1);
        assert_eq!(config.preprocess.scale, 4);
    }

    #[test]
    fn test_bad_focus_threshold() {
        let mut config = AppConfig::default();
        config.scan.focus_threshold = f64::NAN;
        assert!(matches!(config.validated(), Err(ConfigError::FocusThreshold(_))));
    }

    #[test]
    fn test_vocabulary_entries_are_normalized() {
        let mut config = AppConfig::default();
        config.vocabulary.prefixes = vec!["ake".into(), " pmc ".into()];
        let config = config.validated().unwrap();
        assert_eq!(config.vocabulary.prefixes, vec!["AKE", "PMC"]);
        assert!(config.vocabulary.validator().is_valid("PMC12345CI"));
    }

    #[test]
    fn test_unreachable_vocabulary_entry_rejected() {
        let mut config = AppConfig::default();
        config.vocabulary.prefixes.push("LD3".into());
        assert_eq!(
            config.validated(),
            Err(ConfigError::VocabularyEntry {
                kind: "prefix",
                entry: "LD3".into(),
                len: 3,
            })
        );

        let mut config = AppConfig::default();
        config.vocabulary.suffixes = vec![];
        assert_eq!(config.validated(), Err(ConfigError::EmptyVocabulary("suffix")));
    }

    #[test]
    fn test_empty_region_rejected() {
        let mut config = AppConfig::default();
        config.region = Some(Region::new(0, 0, 0, 10));
        assert_eq!(config.validated(), Err(ConfigError::EmptyRegion));
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.scan.focus_threshold = 42.5;

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_values() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[vocabulary]\nsuffixes = [\"C1\"]").unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("suffix"));
    }
}
