use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub embedding: EmbeddingConfig,
    pub matching: MatchingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_path: PathBuf,
}

/// How a login picks a winner among gallery entries that pass the identity test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Highest similarity wins; ties keep the earlier name.
    Best,
    /// First passing entry in name order wins.
    First,
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::Best => write!(f, "best"),
            MatchPolicy::First => write!(f, "first"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Cosine similarity at or above which two embeddings are the same person
    pub threshold: f32,
    #[serde(default = "default_policy")]
    pub policy: MatchPolicy,
}

fn default_policy() -> MatchPolicy {
    MatchPolicy::Best
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub gallery_dir: PathBuf,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
    pub log_path: PathBuf,
}

fn default_image_extension() -> String {
    "jpg".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Reject captures without a detectable face instead of storing a dead entry
    pub require_face: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self { require_face: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    pub refresh_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { refresh_ms: 20 }
    }
}

impl Config {
    /// Load configuration with fallback chain:
    /// 1. ./facegate.toml (working directory)
    /// 2. ~/.config/facegate/facegate.toml (user)
    /// 3. Compiled defaults
    pub fn load() -> Result<Self, ConfigError> {
        let mut candidates = vec![PathBuf::from("facegate.toml")];
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("facegate")
                    .join("facegate.toml"),
            );
        }
        Self::load_from_candidates(&candidates)
    }

    /// Load the first candidate file that exists, or the defaults if none do.
    ///
    /// A file that exists but cannot be read or parsed is an error, never a
    /// silent fall-through.
    pub fn load_from_candidates(candidates: &[PathBuf]) -> Result<Self, ConfigError> {
        for path in candidates {
            match Self::load_from_path(path) {
                Ok(config) => {
                    log::debug!("Loaded configuration from {}", path.display());
                    config.validate()?;
                    return Ok(config);
                }
                Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    log::error!("Failed to load {}: {}", path.display(), e);
                    return Err(e);
                }
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Validation(
                "Camera dimensions must be non-zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::Validation(
                "Detection confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.matching.threshold) {
            return Err(ConfigError::Validation(
                "Matching threshold must be between -1.0 and 1.0".to_string(),
            ));
        }

        if self.storage.gallery_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Gallery directory cannot be empty".to_string(),
            ));
        }

        if self.storage.log_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Log path cannot be empty".to_string(),
            ));
        }

        let ext = &self.storage.image_extension;
        if ext.is_empty() || ext.starts_with('.') || ext.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "Image extension must be a bare extension like \"jpg\", got {:?}",
                ext
            )));
        }
        if image::ImageFormat::from_extension(ext).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unsupported image extension: {}",
                ext
            )));
        }

        if self.preview.refresh_ms == 0 {
            return Err(ConfigError::Validation(
                "Preview refresh interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                device: "/dev/video0".to_string(),
                width: 640,
                height: 480,
            },
            detection: DetectionConfig {
                model_path: PathBuf::from("models/scrfd_500m.onnx"),
                confidence_threshold: 0.5,
            },
            embedding: EmbeddingConfig {
                model_path: PathBuf::from("models/arcface_mobilefacenet.onnx"),
            },
            matching: MatchingConfig {
                threshold: 0.4,
                policy: MatchPolicy::Best,
            },
            storage: StorageConfig {
                gallery_dir: PathBuf::from("./db"),
                image_extension: default_image_extension(),
                log_path: PathBuf::from("./log.txt"),
            },
            registration: RegistrationConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}
