//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use haboob_volume::{MarchParams, VolumeParams};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory name under the platform config root.
pub const APP_NAME: &str = "haboob";

const CONFIG_FILE: &str = "config.ron";

/// Platform config directory for the renderer, e.g. `~/.config/haboob`.
///
/// Falls back to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Output image settings.
    pub output: OutputConfig,
    /// Density, march, optics and proxy parameters.
    pub volume: VolumeParams,
    /// Camera and sun.
    pub scene: SceneConfig,
    pub debug: DebugConfig,
}

/// Output image configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Lit target width in pixels.
    pub width: u32,
    /// Lit target height in pixels.
    pub height: u32,
    /// Ray buffer size as a fraction of the lit target (0.5 = half resolution).
    pub ray_scale: f32,
    /// Beer shadow map edge length in texels.
    pub shadow_resolution: u32,
    /// Where the rendered PNG is written.
    pub path: PathBuf,
}

/// Camera and light placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub camera_position: [f32; 3],
    pub camera_target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Direction the sunlight travels.
    pub light_direction: [f32; 3],
    pub light_color: [f32; 3],
    pub light_intensity: f32,
    pub ambient: [f32; 3],
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            volume: VolumeParams {
                march: MarchParams {
                    iterations: 64,
                    ..MarchParams::default()
                },
                ..VolumeParams::default()
            },
            scene: SceneConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            ray_scale: 0.5,
            shadow_resolution: 256,
            path: PathBuf::from("haboob.png"),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            camera_position: [5.0, 2.0, 8.0],
            camera_target: [0.0, 0.0, 0.0],
            fov_y_degrees: 45.0,
            near: 0.05,
            far: 100.0,
            light_direction: [0.3, -1.0, -0.6],
            light_color: [1.0, 0.96, 0.90],
            light_intensity: 1.0,
            ambient: [0.35, 0.42, 0.55],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let write_error = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_error)?;

        // Volume parameters nest four deep (volume.density.radial.*).
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, serialized).map_err(write_error)?;
        Ok(())
    }

    /// Re-read the file: `Some(new_config)` if it differs from `self`, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
