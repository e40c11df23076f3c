use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ScanError};

/// Top-level configuration for a [`crate::ScanSdk`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub session: SessionConfig,
    pub target: TargetRegionConfig,
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
    pub face: FaceCaptureConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub executor_thread_name: String,
    /// Give up on a camera provider that never reports ready.
    pub provider_timeout_ms: Option<u64>,
}

/// Fixed target oval, expressed relative to the analysed frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetRegionConfig {
    pub center_x: f32,
    pub center_y: f32,
    pub width_ratio: f32,
    pub height_ratio: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: Option<PathBuf>,
    pub subfolder: String,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub result_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaceCaptureConfig {
    pub mirror_and_rotate: bool,
}

pub const DEFAULT_SUBFOLDER: &str = "ScannedFaceImage";

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            executor_thread_name: "scankit-session".to_string(),
            provider_timeout_ms: None,
        }
    }
}

impl Default for TargetRegionConfig {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.5,
            width_ratio: 0.6,
            height_ratio: 0.75,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            result_delay_ms: 500,
        }
    }
}

impl Default for FaceCaptureConfig {
    fn default() -> Self {
        Self {
            mirror_and_rotate: true,
        }
    }
}

impl StorageConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            subfolder: DEFAULT_SUBFOLDER.to_string(),
            jpeg_quality: 100,
        }
    }

    /// Directory captured images are written to.
    pub fn scan_dir(&self) -> Result<PathBuf> {
        let root = self
            .cache_dir
            .as_ref()
            .ok_or(ScanError::UninitializedDependency("cache directory"))?;
        let subfolder = if self.subfolder.is_empty() {
            DEFAULT_SUBFOLDER
        } else {
            &self.subfolder
        };
        Ok(root.join(subfolder))
    }

    pub fn quality(&self) -> u8 {
        match self.jpeg_quality {
            0 => 100,
            q => q.min(100),
        }
    }
}

impl SessionConfig {
    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout_ms.map(Duration::from_millis)
    }
}

impl DeliveryConfig {
    pub fn result_delay(&self) -> Duration {
        Duration::from_millis(self.result_delay_ms)
    }
}

impl ScanConfig {
    /// Configuration with every default and the given cache directory.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::new(cache_dir),
            ..Self::default()
        }
    }

    /// Load from a TOML file, with `SCANKIT`-prefixed environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("SCANKIT").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
