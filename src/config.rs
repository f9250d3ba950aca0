//! Session configuration
//!
//! Supplied once at construction and immutable for a session's lifetime.

use crate::error::{ErrorKind, SessionError};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "AR_SESSION_CONFIG";

/// Which physical camera feeds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    #[default]
    Default,
    Back,
    Front,
}

impl CameraFacing {
    /// Front-facing video is horizontally mirrored by the engine
    pub fn is_mirrored(&self) -> bool {
        matches!(self, CameraFacing::Front)
    }
}

/// Requested screen orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScreenOrientation {
    #[default]
    Portrait,
    Landscape,
    Sensor,
    FullSensor,
}

impl ScreenOrientation {
    /// Plain sensor orientation is widened to full-sensor so all four rotations are allowed.
    pub fn resolved(self) -> Self {
        match self {
            ScreenOrientation::Sensor => ScreenOrientation::FullSensor,
            other => other,
        }
    }
}

/// Camera capture mode handed to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    #[default]
    Default,
    OptimizeSpeed,
    OptimizeQuality,
}

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera used by `start`
    pub camera_facing: CameraFacing,
    /// Device screen orientation
    pub orientation: ScreenOrientation,
    /// Near clip plane
    pub near_plane: f32,
    /// Far clip plane
    pub far_plane: f32,
    /// Stereo viewer (headset) active
    pub stereo_viewer: bool,
    /// Camera video mode
    pub video_mode: VideoMode,
    /// Tracker data set to load
    pub dataset: String,
    /// Hint passed to the tracker after it starts
    pub max_simultaneous_targets: u32,
    /// Uniform scale applied to the rendered model
    pub model_scale: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_facing: CameraFacing::Default,
            orientation: ScreenOrientation::Portrait,
            near_plane: 1.0,
            far_plane: 1000.0,
            stereo_viewer: false,
            video_mode: VideoMode::Default,
            dataset: "StonesAndChips.xml".to_string(),
            max_simultaneous_targets: 1,
            model_scale: 0.2,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SessionConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration with precedence: explicit path > env var > default location > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config
            .validate()
            .map_err(anyhow::Error::new)
            .context("Invalid session configuration")?;
        Ok(config)
    }

    /// `<config_dir>/ar-session/session.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ar-session").map(|dirs| dirs.config_dir().join("session.toml"))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(self.far_plane > self.near_plane) {
            return Err(SessionError::new(
                ErrorKind::InvalidConfiguration,
                format!(
                    "Far plane ({}) should be greater than near plane ({})",
                    self.far_plane, self.near_plane
                ),
            ));
        }
        if !(self.model_scale > 0.0) {
            return Err(SessionError::new(
                ErrorKind::InvalidConfiguration,
                format!("Model scale must be positive, got {}", self.model_scale),
            ));
        }
        Ok(())
    }
}
