//! Configuration for the haboob renderer.
//!
//! Settings persist to disk as RON. CLI arguments parsed with clap override the
//! loaded values for a single run.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{APP_NAME, Config, DebugConfig, OutputConfig, SceneConfig, default_config_dir};
pub use error::ConfigError;
