//! Configuration system for termimg
//!
//! Loads configuration from TOML file at `~/.config/termimg/config.toml`.
//! A missing default file means built-in defaults; nothing is written.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub overlay: OverlayConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

/// Where a loaded configuration came from
///
/// Loading runs before logging is set up, so the caller reports this once
/// the subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at the default location
    Defaults(PathBuf),
}

impl Config {
    /// Load configuration from `explicit`, or the default location
    ///
    /// A missing default file yields the defaults. A missing explicit file,
    /// or any file that fails to parse, is an error.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        match explicit {
            Some(path) => Ok((Self::read(path)?, ConfigSource::File(path.to_path_buf()))),
            None => Self::load_or_default(&Self::config_path()?),
        }
    }

    fn load_or_default(path: &Path) -> Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }
        Ok((Self::read(path)?, ConfigSource::File(path.to_path_buf())))
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("termimg");

        Ok(config_dir.join("config.toml"))
    }

    /// Control socket path: `$TERMIMG_SOCKET`, then the config file, then the default
    pub fn socket_path(&self) -> PathBuf {
        termimg_ipc::socket_path_or(&self.control.socket_path)
    }
}

/// Control endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Datagram socket the client sends commands to
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(termimg_ipc::DEFAULT_SOCKET_PATH),
        }
    }
}

/// Overlay window configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Border around the image in pixels
    pub border_width: u16,
    /// Pixel value shown before the first image is bound
    pub background_pixel: u32,
    /// Resampling filter used when shrinking images
    pub filter: ScaleFilter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ScaleFilter> for FilterType {
    fn from(filter: ScaleFilter) -> Self {
        match filter {
            ScaleFilter::Nearest => FilterType::Nearest,
            ScaleFilter::Triangle => FilterType::Triangle,
            ScaleFilter::CatmullRom => FilterType::CatmullRom,
            ScaleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Terminal lookup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory holding the pseudo-terminal slave nodes
    pub pts_dir: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pts_dir: PathBuf::from("/dev/pts"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, used when `RUST_LOG` is unset
    pub filter: Option<String>,
}
